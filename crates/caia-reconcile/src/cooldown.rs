//! Denial cooldown: when may a previously denied key be resubmitted?
//!
//! # Invariants
//!
//! - **Strictly greater**: a key is resubmitted only when the time since its
//!   last denial is *greater than* the cooldown. Elapsed == cooldown keeps the
//!   key denied.
//! - **Timestamps are never refreshed**: a key that stays denied carries its
//!   original ledger timestamp string, byte for byte.
//! - **Corrupt entries abort**: an unparsable timestamp fails the whole call
//!   with [`ReconcileError::CorruptLedgerEntry`]; nothing is silently dropped.
//! - **Pure, no clock**: `now` is always supplied by the caller.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use crate::{DenialLedger, ReconcileError};

/// Decision for a single denied key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CooldownDecision {
    /// Cooldown has elapsed; the key goes back into `new_entries`.
    Resubmit,
    /// Still cooling down. Carries time left for logging.
    StillDenied { remaining: Duration },
}

impl CooldownDecision {
    pub fn is_resubmit(&self) -> bool {
        matches!(self, CooldownDecision::Resubmit)
    }
}

/// Outcome of partitioning candidate keys.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CooldownPartition {
    pub resubmit_keys: BTreeSet<String>,
    pub still_denied_keys: BTreeSet<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DenialCooldownPolicy {
    cooldown: Duration,
}

impl DenialCooldownPolicy {
    pub fn new(cooldown_seconds: u64) -> Self {
        // Anything past i64::MAX seconds is "forever" for practical purposes.
        let secs = i64::try_from(cooldown_seconds).unwrap_or(i64::MAX);
        let cooldown = Duration::try_seconds(secs).unwrap_or(Duration::MAX);
        Self { cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Decide for one key denied at `denied_at`.
    pub fn check(&self, denied_at: DateTime<Utc>, now: DateTime<Utc>) -> CooldownDecision {
        let elapsed = now.signed_duration_since(denied_at);
        if elapsed > self.cooldown {
            CooldownDecision::Resubmit
        } else {
            CooldownDecision::StillDenied {
                remaining: self
                    .cooldown
                    .checked_sub(&elapsed)
                    .unwrap_or(Duration::MAX),
            }
        }
    }

    /// Split `candidate_keys` into keys to resubmit and keys still denied.
    ///
    /// Candidates absent from the ledger are ignored; the engine never
    /// produces them.
    pub fn partition<'a, I>(
        &self,
        candidate_keys: I,
        ledger: &DenialLedger,
        now: DateTime<Utc>,
    ) -> Result<CooldownPartition, ReconcileError>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut out = CooldownPartition::default();
        for key in candidate_keys {
            let Some(denied_at) = ledger.denied_at(key)? else {
                continue;
            };
            match self.check(denied_at, now) {
                CooldownDecision::Resubmit => {
                    out.resubmit_keys.insert(key.clone());
                }
                CooldownDecision::StillDenied { remaining } => {
                    tracing::debug!(
                        key = %key,
                        remaining_secs = remaining.num_seconds(),
                        "denied key still cooling down"
                    );
                    out.still_denied_keys.insert(key.clone());
                }
            }
        }
        Ok(out)
    }
}

/// Free-function form of [`DenialCooldownPolicy::partition`].
pub fn partition<'a, I>(
    candidate_keys: I,
    ledger: &DenialLedger,
    now: DateTime<Utc>,
    cooldown_seconds: u64,
) -> Result<CooldownPartition, ReconcileError>
where
    I: IntoIterator<Item = &'a String>,
{
    DenialCooldownPolicy::new(cooldown_seconds).partition(candidate_keys, ledger, now)
}
