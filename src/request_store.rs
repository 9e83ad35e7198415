// Ephemeral request store
//
// Holds pending two-phase requests (propose a quality now, fetch later)
// behind short random tokens. Tokens are single-use, bound to the requester
// that created them and expire after a TTL. Process memory only.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;

pub type RequesterId = i64;

const TOKEN_LEN: usize = 12;

/// Time source, injectable for tests
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestToken {
    pub token: String,
    pub url: String,
    pub requester_id: RequesterId,
    pub created_at: OffsetDateTime,
}

/// Every failed redemption looks the same to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenRedemptionError {
    #[error("request expired")]
    Expired,
}

impl TokenRedemptionError {
    pub fn user_message(&self) -> &'static str {
        "This request has expired, please send the link again."
    }
}

pub struct RequestStore {
    entries: Mutex<HashMap<String, RequestToken>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl RequestStore {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RequestToken>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_expired(&self, entry: &RequestToken, now: OffsetDateTime) -> bool {
        now - entry.created_at > self.ttl
    }

    /// Store a URL for `requester_id` and return its token.
    pub fn put(&self, url: &str, requester_id: RequesterId) -> String {
        let now = self.clock.now();
        let mut entries = self.lock();
        entries.retain(|_, entry| !self.is_expired(entry, now));

        let token = loop {
            let candidate = generate_token();
            if !entries.contains_key(&candidate) {
                break candidate;
            }
        };

        entries.insert(
            token.clone(),
            RequestToken {
                token: token.clone(),
                url: url.to_string(),
                requester_id,
                created_at: now,
            },
        );
        tracing::debug!(requester_id, pending = entries.len(), "Stored request token");
        token
    }

    /// Redeem a token. Check and removal happen under one lock.
    ///
    /// A foreign requester gets `None` and leaves the entry in place for its
    /// owner; an expired entry is dropped on sight.
    pub fn take(&self, token: &str, requester_id: RequesterId) -> Option<String> {
        let now = self.clock.now();
        let mut entries = self.lock();

        let entry = entries.get(token)?;
        if self.is_expired(entry, now) {
            entries.remove(token);
            return None;
        }
        if entry.requester_id != requester_id {
            tracing::warn!(requester_id, "Token redemption by foreign requester");
            return None;
        }
        entries.remove(token).map(|entry| entry.url)
    }

    /// `take` with the uniform error the delivery side reports.
    pub fn redeem(&self, token: &str, requester_id: RequesterId) -> Result<String, TokenRedemptionError> {
        self.take(token, requester_id)
            .ok_or(TokenRedemptionError::Expired)
    }

    /// Drop expired entries, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Periodic sweep for idle processes; lazy sweeping on `put` already
    /// bounds memory under load.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = self.sweep();
                if removed > 0 {
                    tracing::debug!(removed, "Swept expired request tokens");
                }
            }
        })
    }
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}
