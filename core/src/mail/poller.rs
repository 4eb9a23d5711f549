/*
 * poller.rs
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

//! Code poller: ask the mailbox repeatedly until a code arrives or the deadline passes.
//!
//! Mail failures never escape: every attempt that does not find a code is logged and
//! retried, so a broken mailbox looks to the caller exactly like a quiet one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;

use super::session::MailSession;
use super::{FetchOutcome, FoundCode};

/// Pause between two looks into the mailbox.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);
/// How long a requester waits before being told no code arrived.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// (owner, email)
type CursorKey = (String, String);

/// Polls through a `MailSession` and remembers, per owner and mailbox, the last message UID it
/// handed out. Cursors live only as long as the process.
pub struct CodePoller {
    mail: Arc<dyn MailSession>,
    cursors: Mutex<HashMap<CursorKey, u32>>,
    cancel: CancellationToken,
}

impl CodePoller {
    pub fn new(mail: Arc<dyn MailSession>, cancel: CancellationToken) -> Self {
        Self {
            mail,
            cursors: Mutex::new(HashMap::new()),
            cancel,
        }
    }

    pub fn mail(&self) -> &Arc<dyn MailSession> {
        &self.mail
    }

    /// Last UID delivered for this mailbox, if any.
    pub fn cursor(&self, owner: &str, email: &str) -> Option<u32> {
        self.cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(owner.to_string(), email.to_string()))
            .copied()
    }

    /// Drop the cursor of a mailbox that is no longer registered.
    pub fn forget(&self, owner: &str, email: &str) {
        self.cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(owner.to_string(), email.to_string()));
    }

    /// Wait up to `POLL_TIMEOUT` for a code newer than the cursor, advancing the cursor when one
    /// is returned.
    pub async fn poll_account(&self, owner: &str, email: &str, password: &str) -> Option<FoundCode> {
        let last_seen = self.cursor(owner, email);
        let found = self.wait_for_code(email, password, last_seen, POLL_TIMEOUT).await?;
        self.cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((owner.to_string(), email.to_string()), found.uid);
        Some(found)
    }

    /// Poll every `POLL_INTERVAL` until a code is found, `wait` has elapsed, or the poller is
    /// cancelled. Each attempt is cut off at the deadline.
    pub async fn wait_for_code(
        &self,
        email: &str,
        password: &str,
        last_seen: Option<u32>,
        wait: Duration,
    ) -> Option<FoundCode> {
        let deadline = Instant::now() + wait;
        let mut attempts = 0u32;
        loop {
            let now = Instant::now();
            if now >= deadline || self.cancel.is_cancelled() {
                break;
            }
            attempts += 1;
            let attempt = self.mail.fetch_latest_code(email, password, last_seen);
            match timeout(deadline - now, attempt).await {
                Ok(FetchOutcome::Found(found)) => return Some(found),
                Ok(FetchOutcome::NotFound) => {}
                Ok(FetchOutcome::Failed(e)) => {
                    log::debug!("[poller] attempt {} on {}: {}", attempts, email, e);
                }
                Err(_) => {
                    log::debug!("[poller] attempt {} on {} cut off at deadline", attempts, email);
                    break;
                }
            }
            let wake = (Instant::now() + POLL_INTERVAL).min(deadline);
            tokio::select! {
                _ = sleep_until(wake) => {}
                _ = self.cancel.cancelled() => break,
            }
        }
        log::info!("[poller] no code in {} after {} attempts", email, attempts);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::MailError;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Mailbox whose latest message has `latest_uid` (if any) and which answers like the real
    /// session: nothing when the cursor already points at it.
    struct FakeMailbox {
        latest_uid: Mutex<Option<u32>>,
        calls: AtomicU32,
        fail: bool,
    }

    impl FakeMailbox {
        fn new(latest_uid: Option<u32>) -> Self {
            Self {
                latest_uid: Mutex::new(latest_uid),
                calls: AtomicU32::new(0),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl MailSession for FakeMailbox {
        async fn verify_credentials(&self, _email: &str, _password: &str) -> Result<(), MailError> {
            Ok(())
        }

        async fn fetch_latest_code(&self, _email: &str, _password: &str, last_seen: Option<u32>) -> FetchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return FetchOutcome::Failed(MailError::Credential("NO".into()));
            }
            match *self.latest_uid.lock().unwrap() {
                Some(uid) if Some(uid) != last_seen => FetchOutcome::Found(FoundCode {
                    code: format!("CODE{}", uid),
                    sent_at: Utc.with_ymd_and_hms(2025, 10, 14, 6, 30, 0).unwrap(),
                    uid,
                }),
                _ => FetchOutcome::NotFound,
            }
        }
    }

    fn poller(mailbox: Arc<FakeMailbox>) -> CodePoller {
        CodePoller::new(mailbox, CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn empty_mailbox_times_out() {
        let mailbox = Arc::new(FakeMailbox::new(None));
        let poller = poller(mailbox.clone());
        let start = Instant::now();
        let found = poller.wait_for_code("me@gmail.com", "pw", None, POLL_TIMEOUT).await;
        assert_eq!(found, None);
        let elapsed = start.elapsed();
        assert!(elapsed >= POLL_TIMEOUT, "returned early: {:?}", elapsed);
        assert!(elapsed <= POLL_TIMEOUT + POLL_INTERVAL, "overran: {:?}", elapsed);
        assert_eq!(mailbox.calls.load(Ordering::SeqCst), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_mailbox_looks_like_timeout() {
        let mailbox = Arc::new(FakeMailbox {
            fail: true,
            ..FakeMailbox::new(Some(3))
        });
        let poller = poller(mailbox);
        assert_eq!(poller.poll_account("owner", "me@gmail.com", "pw").await, None);
        assert_eq!(poller.cursor("owner", "me@gmail.com"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cursor_suppresses_redelivery_until_new_mail() {
        let mailbox = Arc::new(FakeMailbox::new(Some(7)));
        let poller = poller(mailbox.clone());

        let first = poller.poll_account("owner", "me@gmail.com", "pw").await.unwrap();
        assert_eq!(first.code, "CODE7");
        assert_eq!(poller.cursor("owner", "me@gmail.com"), Some(7));

        // Same latest message: nothing new within the window.
        assert_eq!(poller.poll_account("owner", "me@gmail.com", "pw").await, None);
        assert_eq!(poller.cursor("owner", "me@gmail.com"), Some(7));

        // A different owner registered the same mailbox: its cursor is independent.
        assert_eq!(poller.poll_account("other", "me@gmail.com", "pw").await.unwrap().uid, 7);

        *mailbox.latest_uid.lock().unwrap() = Some(8);
        let next = poller.poll_account("owner", "me@gmail.com", "pw").await.unwrap();
        assert_eq!(next.code, "CODE8");
        assert_eq!(poller.cursor("owner", "me@gmail.com"), Some(8));
    }

    #[tokio::test(start_paused = true)]
    async fn found_immediately_does_not_sleep() {
        let mailbox = Arc::new(FakeMailbox::new(Some(1)));
        let poller = poller(mailbox.clone());
        let start = Instant::now();
        assert!(poller.wait_for_code("me@gmail.com", "pw", None, POLL_TIMEOUT).await.is_some());
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(mailbox.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_sleep() {
        let mailbox = Arc::new(FakeMailbox::new(None));
        let cancel = CancellationToken::new();
        let poller = CodePoller::new(mailbox.clone(), cancel.clone());
        let start = Instant::now();
        let waiter = poller.wait_for_code("me@gmail.com", "pw", None, POLL_TIMEOUT);
        let canceller = async {
            tokio::time::sleep(Duration::from_secs(7)).await;
            cancel.cancel();
        };
        let (found, ()) = tokio::join!(waiter, canceller);
        assert_eq!(found, None);
        assert_eq!(start.elapsed(), Duration::from_secs(7));
        assert_eq!(mailbox.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn forget_drops_cursor() {
        let poller = poller(Arc::new(FakeMailbox::new(None)));
        poller
            .cursors
            .lock()
            .unwrap()
            .insert(("owner".into(), "me@gmail.com".into()), 4);
        poller.forget("owner", "me@gmail.com");
        assert_eq!(poller.cursor("owner", "me@gmail.com"), None);
    }
}
