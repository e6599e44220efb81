use crate::client::policy::{CompletionPolicy, ReconnectPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle timestamps for a single request, indexed by wire sequence id.
///
/// All timestamps are epoch milliseconds. `received_ms` carries the
/// server-reported timestamp from the response envelope; `finish_ms` is
/// stamped locally when the matching response arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestRecord {
    pub sequence: usize,
    pub start_ms: i64,
    pub received_ms: Option<i64>,
    pub finish_ms: Option<i64>,
}

impl RequestRecord {
    pub fn started(sequence: usize, start_ms: i64) -> Self {
        Self {
            sequence,
            start_ms,
            received_ms: None,
            finish_ms: None,
        }
    }

    /// A record only counts as successful once all three timestamps are set.
    pub fn is_complete(&self) -> bool {
        self.received_ms.is_some() && self.finish_ms.is_some()
    }

    pub fn round_trip_ms(&self) -> Option<i64> {
        self.finish_ms.map(|finish| finish - self.start_ms)
    }
}

/// Connection lifecycle states.
///
/// `GaveUp` is terminal: the reconnect budget was exhausted and the slot will
/// never come up. `Disconnected` is terminal only after an explicit close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
    GaveUp,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Closed | ConnectionState::GaveUp
        )
    }
}

/// Inbound response envelope. Extra fields are ignored; a frame without `c`
/// and `ts` is discarded by the reader.
///
/// `ts` is accepted as any JSON number because the benchmarked server is free
/// to report fractional milliseconds.
#[derive(Debug, Deserialize)]
pub struct ResponseEnvelope {
    pub c: u64,
    pub ts: f64,
}

/// Per-connection settings, shared by every client in the pool.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Full `ws://host:port` target.
    pub url: String,
    /// Cadence of the `{"c":0}` heartbeat probe.
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectPolicy,
    pub completion: CompletionPolicy,
}

impl ClientSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat_interval: Duration::from_secs(5),
            reconnect: ReconnectPolicy::default(),
            completion: CompletionPolicy::default(),
        }
    }
}
