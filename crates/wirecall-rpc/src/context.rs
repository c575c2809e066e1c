use std::collections::HashMap;
use std::time::{Duration, Instant};

use wirecall_frame::{parse_timeout, REQUEST_TIMEOUT_KEY};

/// Caller-side call context: an optional deadline plus request metadata.
///
/// The deadline is enforced locally by the waiting caller; metadata is
/// copied into every request header sent under this context.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    metadata: HashMap<String, String>,
}

impl Context {
    /// A context with no deadline and no metadata.
    pub fn background() -> Self {
        Self::default()
    }

    /// Tighten the deadline to at most `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let at = Instant::now()
            .checked_add(timeout)
            .unwrap_or_else(far_future);
        self.with_deadline(at)
    }

    /// Tighten the deadline to at most `deadline`. An earlier existing
    /// deadline wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` without one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|at| Instant::now() >= at)
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }
}

fn far_future() -> Instant {
    // Roughly 30 years; enough to mean "no practical deadline".
    Instant::now() + Duration::from_secs(30 * 365 * 24 * 60 * 60)
}

/// What a handler knows about the request it is serving.
#[derive(Debug, Clone)]
pub struct RequestContext {
    seq: u64,
    service: String,
    method: String,
    metadata: HashMap<String, String>,
    peer: String,
}

impl RequestContext {
    pub(crate) fn new(
        seq: u64,
        service: String,
        method: String,
        metadata: HashMap<String, String>,
        peer: String,
    ) -> Self {
        Self {
            seq,
            service,
            method,
            metadata,
            peer,
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Remote address of the connection the request arrived on.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// The per-call timeout the client advertised, if any.
    ///
    /// Advisory only: the client enforces its own deadline regardless.
    pub fn timeout(&self) -> Option<Duration> {
        self.metadata
            .get(REQUEST_TIMEOUT_KEY)
            .and_then(|value| parse_timeout(value))
    }
}
