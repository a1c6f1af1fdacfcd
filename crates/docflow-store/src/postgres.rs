//! PostgreSQL adapter for docflow storage.
//!
//! The transactional source-of-truth backend. A unit of work maps to one
//! database transaction. The Created → Applied event flip is a conditional
//! UPDATE: the row lock serializes concurrent applications of the same
//! event, and the loser observes zero affected rows after the winner
//! commits, surfacing `AlreadyApplied`.

use crate::traits::{DocStore, DocTx, ListWindow};
use async_trait::async_trait;
use chrono::Utc;
use docflow_types::{
    DocActionId, DocEvent, DocStateId, DocTypeId, EventId, EventStatus, FlowError, FlowResult,
    GroupId, IntentId, Node, NodeId, NodeKind, NotificationIntent, TransitionTable, Workflow,
    WorkflowId,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{PgConnection, Postgres, Row, Transaction};
use std::collections::BTreeMap;

/// PostgreSQL-backed docflow storage adapter.
#[derive(Clone)]
pub struct PostgresDocStore {
    pool: PgPool,
}

impl PostgresDocStore {
    /// Connect to PostgreSQL and initialize the required schema.
    pub async fn connect(database_url: &str) -> FlowResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> FlowResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| FlowError::Store(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create an adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> FlowResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> FlowResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS wf_workflows (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                doctype_id BIGINT NOT NULL,
                docstate_id BIGINT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS wf_workflow_nodes (
                id BIGSERIAL PRIMARY KEY,
                doctype_id BIGINT NOT NULL,
                docstate_id BIGINT NOT NULL,
                workflow_id BIGINT NOT NULL REFERENCES wf_workflows (id),
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                UNIQUE (doctype_id, docstate_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS wf_docstate_transitions (
                doctype_id BIGINT NOT NULL,
                from_state_id BIGINT NOT NULL,
                docaction_id BIGINT NOT NULL,
                to_state_id BIGINT NOT NULL,
                PRIMARY KEY (doctype_id, from_state_id, docaction_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS wf_docevents (
                id BIGSERIAL PRIMARY KEY,
                doctype_id BIGINT NOT NULL,
                docstate_id BIGINT NOT NULL,
                docaction_id BIGINT NOT NULL,
                status TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS wf_notifications (
                id BIGSERIAL PRIMARY KEY,
                docevent_id BIGINT NOT NULL REFERENCES wf_docevents (id),
                docstate_id BIGINT NOT NULL,
                group_id BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_wf_nodes_workflow
                ON wf_workflow_nodes (workflow_id)",
            "CREATE INDEX IF NOT EXISTS idx_wf_notifications_event
                ON wf_notifications (docevent_id)",
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| FlowError::Store(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl DocStore for PostgresDocStore {
    async fn begin(&self) -> FlowResult<Box<dyn DocTx>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| FlowError::Store(e.to_string()))?;
        Ok(Box::new(PostgresTx { tx }))
    }

    async fn workflow(&self, id: WorkflowId) -> FlowResult<Option<Workflow>> {
        let row = sqlx::query(
            "SELECT id, name, doctype_id, docstate_id FROM wf_workflows WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FlowError::Store(e.to_string()))?;

        row.map(workflow_row_to_record).transpose()
    }

    async fn workflow_by_name(&self, name: &str) -> FlowResult<Option<Workflow>> {
        let row = sqlx::query(
            "SELECT id, name, doctype_id, docstate_id FROM wf_workflows WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FlowError::Store(e.to_string()))?;

        row.map(workflow_row_to_record).transpose()
    }

    async fn list_workflows(&self, window: ListWindow) -> FlowResult<Vec<Workflow>> {
        let rows = if window.limit == 0 {
            sqlx::query(
                r#"
                SELECT id, name, doctype_id, docstate_id
                  FROM wf_workflows
                 WHERE id >= $1
                 ORDER BY id ASC
                "#,
            )
            .bind(window.from.0)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| FlowError::Store(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT id, name, doctype_id, docstate_id
                  FROM wf_workflows
                 WHERE id >= $1
                 ORDER BY id ASC
                 LIMIT $2
                "#,
            )
            .bind(window.from.0)
            .bind(to_i64(window.limit)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| FlowError::Store(e.to_string()))?
        };

        rows.into_iter().map(workflow_row_to_record).collect()
    }

    async fn node_by_state(
        &self,
        doctype: DocTypeId,
        state: DocStateId,
    ) -> FlowResult<Option<Node>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| FlowError::Store(e.to_string()))?;
        fetch_node_by_state(&mut conn, doctype, state).await
    }

    async fn nodes_of_workflow(&self, workflow: WorkflowId) -> FlowResult<Vec<Node>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| FlowError::Store(e.to_string()))?;

        let rows = sqlx::query(
            r#"
            SELECT id, doctype_id, docstate_id, workflow_id, name, kind
              FROM wf_workflow_nodes
             WHERE workflow_id = $1
             ORDER BY id ASC
            "#,
        )
        .bind(workflow.0)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| FlowError::Store(e.to_string()))?;

        let mut nodes = Vec::with_capacity(rows.len());
        for row in rows {
            let mut node = node_row_to_record(row)?;
            node.transitions = fetch_transitions(&mut conn, node.doctype, node.state).await?;
            nodes.push(node);
        }
        Ok(nodes)
    }

    async fn event(&self, id: EventId) -> FlowResult<Option<DocEvent>> {
        let row = sqlx::query(
            "SELECT id, doctype_id, docstate_id, docaction_id, status FROM wf_docevents WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FlowError::Store(e.to_string()))?;

        row.map(event_row_to_record).transpose()
    }

    async fn notifications_for_event(
        &self,
        event: EventId,
    ) -> FlowResult<Vec<NotificationIntent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, docevent_id, docstate_id, group_id, created_at
              FROM wf_notifications
             WHERE docevent_id = $1
             ORDER BY id ASC
            "#,
        )
        .bind(event.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| FlowError::Store(e.to_string()))?;

        rows.into_iter().map(intent_row_to_record).collect()
    }
}

struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl DocTx for PostgresTx {
    async fn insert_workflow(
        &mut self,
        name: &str,
        doctype: DocTypeId,
        begin_state: DocStateId,
    ) -> FlowResult<WorkflowId> {
        let row = sqlx::query(
            r#"
            INSERT INTO wf_workflows (name, doctype_id, docstate_id)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(doctype.0)
        .bind(begin_state.0)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_conflict)?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| FlowError::Store(e.to_string()))?;
        Ok(WorkflowId(id))
    }

    async fn insert_node(
        &mut self,
        doctype: DocTypeId,
        state: DocStateId,
        workflow: WorkflowId,
        name: &str,
        kind: NodeKind,
    ) -> FlowResult<NodeId> {
        let row = sqlx::query(
            r#"
            INSERT INTO wf_workflow_nodes (doctype_id, docstate_id, workflow_id, name, kind)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(doctype.0)
        .bind(state.0)
        .bind(workflow.0)
        .bind(name)
        .bind(node_kind_to_str(kind))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_conflict)?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| FlowError::Store(e.to_string()))?;
        Ok(NodeId(id))
    }

    async fn insert_transition(
        &mut self,
        doctype: DocTypeId,
        from_state: DocStateId,
        action: DocActionId,
        to_state: DocStateId,
    ) -> FlowResult<()> {
        sqlx::query(
            r#"
            INSERT INTO wf_docstate_transitions (doctype_id, from_state_id, docaction_id, to_state_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(doctype.0)
        .bind(from_state.0)
        .bind(action.0)
        .bind(to_state.0)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(())
    }

    async fn insert_event(
        &mut self,
        doctype: DocTypeId,
        state: DocStateId,
        action: DocActionId,
    ) -> FlowResult<EventId> {
        let row = sqlx::query(
            r#"
            INSERT INTO wf_docevents (doctype_id, docstate_id, docaction_id, status)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(doctype.0)
        .bind(state.0)
        .bind(action.0)
        .bind(event_status_to_str(EventStatus::Created))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| FlowError::Store(e.to_string()))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| FlowError::Store(e.to_string()))?;
        Ok(EventId(id))
    }

    async fn mark_event_applied(&mut self, event: EventId) -> FlowResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE wf_docevents
               SET status = $1
             WHERE id = $2
               AND status = $3
            "#,
        )
        .bind(event_status_to_str(EventStatus::Applied))
        .bind(event.0)
        .bind(event_status_to_str(EventStatus::Created))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| FlowError::Store(e.to_string()))?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT id FROM wf_docevents WHERE id = $1")
                .bind(event.0)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| FlowError::Store(e.to_string()))?
                .is_some();
            if exists {
                return Err(FlowError::AlreadyApplied(event));
            }
            return Err(FlowError::EventNotFound(event));
        }

        Ok(())
    }

    async fn record_notification(
        &mut self,
        event: EventId,
        new_state: DocStateId,
        group: GroupId,
    ) -> FlowResult<NotificationIntent> {
        let created_at = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO wf_notifications (docevent_id, docstate_id, group_id, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(event.0)
        .bind(new_state.0)
        .bind(group.0)
        .bind(created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| FlowError::Store(e.to_string()))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| FlowError::Store(e.to_string()))?;
        Ok(NotificationIntent {
            id: IntentId(id),
            event,
            new_state,
            group,
            created_at,
        })
    }

    async fn node_by_state(
        &mut self,
        doctype: DocTypeId,
        state: DocStateId,
    ) -> FlowResult<Option<Node>> {
        fetch_node_by_state(&mut self.tx, doctype, state).await
    }

    async fn commit(self: Box<Self>) -> FlowResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| FlowError::Store(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> FlowResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| FlowError::Store(e.to_string()))
    }
}

async fn fetch_node_by_state(
    conn: &mut PgConnection,
    doctype: DocTypeId,
    state: DocStateId,
) -> FlowResult<Option<Node>> {
    let row = sqlx::query(
        r#"
        SELECT id, doctype_id, docstate_id, workflow_id, name, kind
          FROM wf_workflow_nodes
         WHERE doctype_id = $1 AND docstate_id = $2
        "#,
    )
    .bind(doctype.0)
    .bind(state.0)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| FlowError::Store(e.to_string()))?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut node = node_row_to_record(row)?;
    node.transitions = fetch_transitions(conn, doctype, state).await?;
    Ok(Some(node))
}

async fn fetch_transitions(
    conn: &mut PgConnection,
    doctype: DocTypeId,
    from_state: DocStateId,
) -> FlowResult<TransitionTable> {
    let rows = sqlx::query(
        r#"
        SELECT docaction_id, to_state_id
          FROM wf_docstate_transitions
         WHERE doctype_id = $1 AND from_state_id = $2
        "#,
    )
    .bind(doctype.0)
    .bind(from_state.0)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| FlowError::Store(e.to_string()))?;

    let mut routes = BTreeMap::new();
    for row in rows {
        let action: i64 = row
            .try_get("docaction_id")
            .map_err(|e| FlowError::Store(e.to_string()))?;
        let to_state: i64 = row
            .try_get("to_state_id")
            .map_err(|e| FlowError::Store(e.to_string()))?;
        routes.insert(DocActionId(action), DocStateId(to_state));
    }
    Ok(TransitionTable::from(routes))
}

fn workflow_row_to_record(row: sqlx::postgres::PgRow) -> FlowResult<Workflow> {
    Ok(Workflow {
        id: WorkflowId(
            row.try_get("id")
                .map_err(|e| FlowError::Store(e.to_string()))?,
        ),
        name: row
            .try_get("name")
            .map_err(|e| FlowError::Store(e.to_string()))?,
        doctype: DocTypeId(
            row.try_get("doctype_id")
                .map_err(|e| FlowError::Store(e.to_string()))?,
        ),
        begin_state: DocStateId(
            row.try_get("docstate_id")
                .map_err(|e| FlowError::Store(e.to_string()))?,
        ),
    })
}

fn node_row_to_record(row: sqlx::postgres::PgRow) -> FlowResult<Node> {
    let kind: String = row
        .try_get("kind")
        .map_err(|e| FlowError::Store(e.to_string()))?;

    Ok(Node {
        id: NodeId(
            row.try_get("id")
                .map_err(|e| FlowError::Store(e.to_string()))?,
        ),
        doctype: DocTypeId(
            row.try_get("doctype_id")
                .map_err(|e| FlowError::Store(e.to_string()))?,
        ),
        state: DocStateId(
            row.try_get("docstate_id")
                .map_err(|e| FlowError::Store(e.to_string()))?,
        ),
        workflow: WorkflowId(
            row.try_get("workflow_id")
                .map_err(|e| FlowError::Store(e.to_string()))?,
        ),
        name: row
            .try_get("name")
            .map_err(|e| FlowError::Store(e.to_string()))?,
        kind: parse_node_kind(&kind)?,
        transitions: TransitionTable::new(),
    })
}

fn event_row_to_record(row: sqlx::postgres::PgRow) -> FlowResult<DocEvent> {
    let status: String = row
        .try_get("status")
        .map_err(|e| FlowError::Store(e.to_string()))?;

    Ok(DocEvent {
        id: EventId(
            row.try_get("id")
                .map_err(|e| FlowError::Store(e.to_string()))?,
        ),
        doctype: DocTypeId(
            row.try_get("doctype_id")
                .map_err(|e| FlowError::Store(e.to_string()))?,
        ),
        state: DocStateId(
            row.try_get("docstate_id")
                .map_err(|e| FlowError::Store(e.to_string()))?,
        ),
        action: DocActionId(
            row.try_get("docaction_id")
                .map_err(|e| FlowError::Store(e.to_string()))?,
        ),
        status: parse_event_status(&status)?,
    })
}

fn intent_row_to_record(row: sqlx::postgres::PgRow) -> FlowResult<NotificationIntent> {
    Ok(NotificationIntent {
        id: IntentId(
            row.try_get("id")
                .map_err(|e| FlowError::Store(e.to_string()))?,
        ),
        event: EventId(
            row.try_get("docevent_id")
                .map_err(|e| FlowError::Store(e.to_string()))?,
        ),
        new_state: DocStateId(
            row.try_get("docstate_id")
                .map_err(|e| FlowError::Store(e.to_string()))?,
        ),
        group: GroupId(
            row.try_get("group_id")
                .map_err(|e| FlowError::Store(e.to_string()))?,
        ),
        created_at: row
            .try_get("created_at")
            .map_err(|e| FlowError::Store(e.to_string()))?,
    })
}

fn node_kind_to_str(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Start => "start",
        NodeKind::Normal => "normal",
        NodeKind::End => "end",
    }
}

fn parse_node_kind(raw: &str) -> FlowResult<NodeKind> {
    match raw {
        "start" => Ok(NodeKind::Start),
        "normal" => Ok(NodeKind::Normal),
        "end" => Ok(NodeKind::End),
        other => Err(FlowError::Store(format!(
            "unknown node kind `{other}` in storage"
        ))),
    }
}

fn event_status_to_str(status: EventStatus) -> &'static str {
    match status {
        EventStatus::Created => "created",
        EventStatus::Applied => "applied",
    }
}

fn parse_event_status(raw: &str) -> FlowResult<EventStatus> {
    match raw {
        "created" => Ok(EventStatus::Created),
        "applied" => Ok(EventStatus::Applied),
        other => Err(FlowError::Store(format!(
            "unknown event status `{other}` in storage"
        ))),
    }
}

fn map_sqlx_conflict(err: sqlx::Error) -> FlowError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return FlowError::Duplicate(db_err.message().to_string());
        }
    }
    FlowError::Store(err.to_string())
}

fn to_i64(value: usize) -> FlowResult<i64> {
    i64::try_from(value)
        .map_err(|_| FlowError::InvalidArgument("window limit too large".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kind_string_roundtrip() {
        for kind in [NodeKind::Start, NodeKind::Normal, NodeKind::End] {
            let parsed = parse_node_kind(node_kind_to_str(kind)).unwrap();
            assert_eq!(kind, parsed);
        }
        assert!(parse_node_kind("sideways").is_err());
    }

    #[test]
    fn event_status_string_roundtrip() {
        for status in [EventStatus::Created, EventStatus::Applied] {
            let parsed = parse_event_status(event_status_to_str(status)).unwrap();
            assert_eq!(status, parsed);
        }
        assert!(parse_event_status("pending").is_err());
    }
}
