/*
 * quota.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Mailcode, a mailbox verification-code relay.
 *
 * Mailcode is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Mailcode is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Mailcode.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Usage quota: per (owner, requester, command) counters under a lifetime or windowed limit.

use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::store::{StoreError, UsageRecord, UsageStore};

/// Limit attached to an account. No limit means unmetered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub limit: Option<NonZeroU32>,
    /// Window length. Absent with a limit means a lifetime budget.
    pub period_hours: Option<NonZeroU32>,
}

impl QuotaPolicy {
    pub const UNLIMITED: QuotaPolicy = QuotaPolicy {
        limit: None,
        period_hours: None,
    };

    fn period(&self) -> Option<Duration> {
        self.period_hours.map(|h| Duration::hours(i64::from(h.get())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaOutcome {
    /// `remaining` is `None` for unmetered accounts.
    Allowed { remaining: Option<u32> },
    DeniedLifetime,
    DeniedUntil { seconds_remaining: u64 },
}

impl QuotaOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaOutcome::Allowed { .. })
    }
}

/// Gates and records consumption. Every operation is one load-mutate-save of the usage
/// document under the ledger's lock.
pub struct QuotaLedger {
    store: Arc<dyn UsageStore>,
    lock: Mutex<()>,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Whether one more use is allowed now. Establishes or rolls over the window for windowed
    /// policies but never counts a use.
    pub fn check(
        &self,
        owner: &str,
        requester: &str,
        command: &str,
        policy: &QuotaPolicy,
        now: DateTime<Utc>,
    ) -> Result<QuotaOutcome, StoreError> {
        let Some(limit) = policy.limit else {
            return Ok(QuotaOutcome::Allowed { remaining: None });
        };
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut index = self.store.load_usage()?;
        let outcome = match policy.period() {
            None => {
                let count = index.record(owner, requester, command).map_or(0, |r| r.count);
                if count >= limit.get() {
                    QuotaOutcome::DeniedLifetime
                } else {
                    QuotaOutcome::Allowed {
                        remaining: Some(limit.get() - count),
                    }
                }
            }
            Some(period) => {
                let record = index.record_mut(owner, requester, command);
                let before = record.clone();
                roll_window(record, period, now);
                let outcome = windowed_outcome(record, limit, now);
                if *record != before {
                    self.store.save_usage(&index)?;
                }
                outcome
            }
        };
        if !outcome.is_allowed() {
            log::info!("[quota] {} denied {} for {}: {:?}", owner, command, requester, outcome);
        }
        Ok(outcome)
    }

    /// Count one successful use and return the allowance left afterwards (`None` when unmetered).
    pub fn consume(
        &self,
        owner: &str,
        requester: &str,
        command: &str,
        policy: &QuotaPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, StoreError> {
        let Some(limit) = policy.limit else {
            return Ok(None);
        };
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut index = self.store.load_usage()?;
        let record = index.record_mut(owner, requester, command);
        if let Some(period) = policy.period() {
            roll_window(record, period, now);
        }
        record.count = record.count.saturating_add(1);
        let remaining = limit.get().saturating_sub(record.count);
        self.store.save_usage(&index)?;
        Ok(Some(remaining))
    }

    /// Check and, when allowed, consume in one step. The reported remaining allowance is
    /// the one left after this use.
    pub fn check_and_consume(
        &self,
        owner: &str,
        requester: &str,
        command: &str,
        policy: &QuotaPolicy,
        now: DateTime<Utc>,
    ) -> Result<QuotaOutcome, StoreError> {
        match self.check(owner, requester, command, policy, now)? {
            QuotaOutcome::Allowed { .. } => {
                let remaining = self.consume(owner, requester, command, policy, now)?;
                Ok(QuotaOutcome::Allowed { remaining })
            }
            denied => Ok(denied),
        }
    }
}

/// Open a window on first use, or start a fresh one once `now` is past the current reset time.
fn roll_window(record: &mut UsageRecord, period: Duration, now: DateTime<Utc>) {
    match record.reset_time {
        None => record.reset_time = Some(now + period),
        Some(reset) if now > reset => {
            record.count = 0;
            record.reset_time = Some(now + period);
        }
        Some(_) => {}
    }
}

fn windowed_outcome(record: &UsageRecord, limit: NonZeroU32, now: DateTime<Utc>) -> QuotaOutcome {
    if record.count < limit.get() {
        return QuotaOutcome::Allowed {
            remaining: Some(limit.get() - record.count),
        };
    }
    let seconds_remaining = record
        .reset_time
        .map_or(0, |reset| (reset - now).num_seconds().max(0) as u64);
    QuotaOutcome::DeniedUntil { seconds_remaining }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn ledger() -> (Arc<MemoryStore>, QuotaLedger) {
        let store = Arc::new(MemoryStore::new());
        let ledger = QuotaLedger::new(store.clone());
        (store, ledger)
    }

    fn policy(limit: u32, period_hours: Option<u32>) -> QuotaPolicy {
        QuotaPolicy {
            limit: NonZeroU32::new(limit),
            period_hours: period_hours.and_then(NonZeroU32::new),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn unlimited_never_touches_the_store() {
        let (store, ledger) = ledger();
        for _ in 0..5 {
            let outcome = ledger
                .check_and_consume("o", "r", "c", &QuotaPolicy::UNLIMITED, t0())
                .unwrap();
            assert_eq!(outcome, QuotaOutcome::Allowed { remaining: None });
        }
        assert!(store.load_usage().unwrap().is_empty());
    }

    #[test]
    fn lifetime_budget_denies_after_limit() {
        let (store, ledger) = ledger();
        let p = policy(2, None);
        assert_eq!(
            ledger.check_and_consume("o", "r", "c", &p, t0()).unwrap(),
            QuotaOutcome::Allowed { remaining: Some(1) }
        );
        assert_eq!(
            ledger.check_and_consume("o", "r", "c", &p, t0()).unwrap(),
            QuotaOutcome::Allowed { remaining: Some(0) }
        );
        let much_later = t0() + Duration::days(400);
        assert_eq!(
            ledger.check_and_consume("o", "r", "c", &p, much_later).unwrap(),
            QuotaOutcome::DeniedLifetime
        );
        let usage = store.load_usage().unwrap();
        let record = usage.record("o", "r", "c").unwrap();
        assert_eq!(record.count, 2);
        assert!(record.reset_time.is_none());
    }

    #[test]
    fn three_lifetime_uses_then_denied_without_counting() {
        let (store, ledger) = ledger();
        let p = policy(3, None);
        let outcomes: Vec<_> = (0..4)
            .map(|i| {
                ledger
                    .check_and_consume("o", "r", "c", &p, t0() + Duration::minutes(i))
                    .unwrap()
            })
            .collect();
        assert_eq!(
            outcomes,
            vec![
                QuotaOutcome::Allowed { remaining: Some(2) },
                QuotaOutcome::Allowed { remaining: Some(1) },
                QuotaOutcome::Allowed { remaining: Some(0) },
                QuotaOutcome::DeniedLifetime,
            ]
        );
        assert_eq!(store.load_usage().unwrap().record("o", "r", "c").unwrap().count, 3);
    }

    #[test]
    fn two_per_hour_denies_at_ten_minutes_and_resets_after_the_hour() {
        let (store, ledger) = ledger();
        let p = policy(2, Some(1));
        assert!(ledger.check_and_consume("o", "r", "c", &p, t0()).unwrap().is_allowed());
        assert!(ledger.check_and_consume("o", "r", "c", &p, t0()).unwrap().is_allowed());

        let ten = t0() + Duration::minutes(10);
        assert_eq!(
            ledger.check_and_consume("o", "r", "c", &p, ten).unwrap(),
            QuotaOutcome::DeniedUntil {
                seconds_remaining: 50 * 60
            }
        );

        let sixty_one = t0() + Duration::minutes(61);
        assert_eq!(
            ledger.check_and_consume("o", "r", "c", &p, sixty_one).unwrap(),
            QuotaOutcome::Allowed { remaining: Some(1) }
        );
        let usage = store.load_usage().unwrap();
        let record = usage.record("o", "r", "c").unwrap();
        assert_eq!(record.count, 1);
        assert_eq!(record.reset_time, Some(sixty_one + Duration::hours(1)));
    }

    #[test]
    fn check_alone_does_not_consume() {
        let (_store, ledger) = ledger();
        let p = policy(1, None);
        for _ in 0..3 {
            assert_eq!(
                ledger.check("o", "r", "c", &p, t0()).unwrap(),
                QuotaOutcome::Allowed { remaining: Some(1) }
            );
        }
        assert_eq!(ledger.consume("o", "r", "c", &p, t0()).unwrap(), Some(0));
        assert_eq!(ledger.check("o", "r", "c", &p, t0()).unwrap(), QuotaOutcome::DeniedLifetime);
    }

    #[test]
    fn window_denies_with_seconds_then_resets() {
        let (store, ledger) = ledger();
        let p = policy(1, Some(24));
        assert!(ledger.check_and_consume("o", "r", "c", &p, t0()).unwrap().is_allowed());

        let one_hour_in = t0() + Duration::hours(1);
        assert_eq!(
            ledger.check_and_consume("o", "r", "c", &p, one_hour_in).unwrap(),
            QuotaOutcome::DeniedUntil {
                seconds_remaining: 23 * 3600
            }
        );

        let after = t0() + Duration::hours(24) + Duration::seconds(1);
        assert_eq!(
            ledger.check_and_consume("o", "r", "c", &p, after).unwrap(),
            QuotaOutcome::Allowed { remaining: Some(0) }
        );
        let usage = store.load_usage().unwrap();
        let record = usage.record("o", "r", "c").unwrap();
        assert_eq!(record.count, 1);
        assert_eq!(record.reset_time, Some(after + Duration::hours(24)));
    }

    #[test]
    fn window_is_fixed_once_established() {
        let (store, ledger) = ledger();
        let p = policy(3, Some(1));
        ledger.check_and_consume("o", "r", "c", &p, t0()).unwrap();
        ledger
            .check_and_consume("o", "r", "c", &p, t0() + Duration::minutes(30))
            .unwrap();
        let usage = store.load_usage().unwrap();
        assert_eq!(
            usage.record("o", "r", "c").unwrap().reset_time,
            Some(t0() + Duration::hours(1))
        );
    }

    #[test]
    fn counters_are_per_requester_and_command() {
        let (_store, ledger) = ledger();
        let p = policy(1, None);
        assert!(ledger.check_and_consume("o", "alice", "c", &p, t0()).unwrap().is_allowed());
        assert!(ledger.check_and_consume("o", "bob", "c", &p, t0()).unwrap().is_allowed());
        assert!(ledger.check_and_consume("o", "alice", "d", &p, t0()).unwrap().is_allowed());
        assert!(!ledger.check_and_consume("o", "alice", "c", &p, t0()).unwrap().is_allowed());
    }
}
