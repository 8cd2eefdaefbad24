//! caia-reconcile
//!
//! Key-based snapshot reconciliation with a denied-key cooldown.
//!
//! Given a previous and a current snapshot of a record set, the engine decides
//! per key whether the record is new, modified, deleted, or still denied by the
//! downstream system and waiting out its cooldown before resubmission.
//!
//! Deterministic, pure logic. No IO. No clock: `now` is always an argument.
//! Callers must serialize runs that share one persisted ledger.

mod cooldown;
mod engine;
mod error;
mod index;
mod ledger;
pub mod snapshot_adapter;
mod types;

pub use cooldown::{partition, CooldownDecision, CooldownPartition, DenialCooldownPolicy};
pub use engine::{diff, reconcile, KeySetDiff};
pub use error::ReconcileError;
pub use index::KeyIndex;
pub use ledger::{format_denial_timestamp, parse_denial_timestamp, DenialLedger};
pub use types::*;
