use crate::{DocStore, DocTx};
use docflow_types::FlowResult;

/// Unit-of-work scope for transaction-optional operations.
///
/// Every mutating operation accepts an optional caller-supplied unit of
/// work. With `Some`, the operation participates in the caller's unit and
/// commit/rollback stay with the caller, so several operations can compose
/// into one larger atomic step. With `None`, the scope opens its own unit
/// of work and [`TxScope::finish`] settles exactly that handle.
pub enum TxScope<'a> {
    /// Participating in a caller-owned unit of work.
    Caller(&'a mut dyn DocTx),
    /// Operating a locally opened unit of work.
    Local(Box<dyn DocTx>),
}

impl<'a> TxScope<'a> {
    /// Wrap the caller's unit of work, or open a fresh one from `store`.
    pub async fn open(
        store: &dyn DocStore,
        outer: Option<&'a mut dyn DocTx>,
    ) -> FlowResult<TxScope<'a>> {
        match outer {
            Some(tx) => Ok(Self::Caller(tx)),
            None => Ok(Self::Local(store.begin().await?)),
        }
    }

    /// The active unit of work.
    pub fn tx(&mut self) -> &mut dyn DocTx {
        match self {
            Self::Caller(tx) => &mut **tx,
            Self::Local(tx) => tx.as_mut(),
        }
    }

    /// Settle the scope around `result`.
    ///
    /// A locally opened unit of work is committed when `result` is `Ok` and
    /// rolled back when it is `Err`. A caller-owned unit is left untouched
    /// either way. The operation's error always wins: a failed rollback is
    /// logged and the original error returned.
    pub async fn finish<T>(self, result: FlowResult<T>) -> FlowResult<T> {
        match self {
            Self::Caller(_) => result,
            Self::Local(tx) => match result {
                Ok(value) => {
                    tx.commit().await?;
                    Ok(value)
                }
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        tracing::warn!(error = %rollback_err, "rollback failed after operation error");
                    }
                    Err(err)
                }
            },
        }
    }
}
