//! Docflow storage seam.
//!
//! This crate defines the transactional storage contract the engine runs
//! against:
//! - `DocStore`: committed reads plus `begin()` for opening a unit of work
//! - `DocTx`: one atomic unit of work, definition and event mutations that
//!   commit or roll back together
//! - `TxScope`: caller-supplied vs locally-opened unit-of-work handling
//! - backends: deterministic in-memory (tests, demos) and PostgreSQL
//!   (source of truth)
//!
//! Design stance:
//! - Postgres is the transactional source of truth; the memory backend is a
//!   single-writer stand-in with the same conflict semantics.
//! - Uniqueness rules (workflow name, node placement, transition key) and
//!   the Created → Applied event flip are enforced here, not only by the
//!   engine's pre-checks.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod config;
pub mod memory;
pub mod postgres;
mod scope;
mod traits;

pub use config::{bootstrap, StoreConfig};
pub use scope::TxScope;
pub use traits::{DocStore, DocTx, ListWindow};
