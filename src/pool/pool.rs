use crate::client::{ClientConnection, ClientSettings, RequestRecord};
use crate::pool::error::{PoolError, PoolResult};
use crate::progress::ProgressGauge;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Creates and tracks the client population across rounds.
///
/// Connections are created once per slot at the first round that needs them
/// and reused for every later round; the pool only ever grows until the
/// final shutdown.
pub struct ConnectionPool {
    settings: ClientSettings,
    /// Clients added per round.
    connection_interval: usize,
    /// Requests per client per round.
    request_interval: usize,
    clients: Vec<Arc<ClientConnection>>,
    /// One flag per slot of the cumulative expected population. A slot is
    /// marked exactly once, when its first connect resolves.
    presence: Vec<bool>,
    connect_gauge: Arc<ProgressGauge>,
    request_gauge: Arc<ProgressGauge>,
    /// Wall-clock span of the most recent ramp-up.
    ramp_up: Duration,
}

impl ConnectionPool {
    pub fn new(
        settings: ClientSettings,
        connection_interval: usize,
        request_interval: usize,
        connect_gauge: Arc<ProgressGauge>,
        request_gauge: Arc<ProgressGauge>,
    ) -> Self {
        Self {
            settings,
            connection_interval,
            request_interval,
            clients: Vec::new(),
            presence: Vec::new(),
            connect_gauge,
            request_gauge,
            ramp_up: Duration::ZERO,
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn ramp_up(&self) -> Duration {
        self.ramp_up
    }

    pub fn clients(&self) -> &[Arc<ClientConnection>] {
        &self.clients
    }

    /// Ramp the population up for `round` and wait until every slot of the
    /// cumulative expected population is present.
    ///
    /// The new slots `interval*round .. interval*(round+1)` are connected
    /// concurrently; resolution is blocked by a gap at any slot index,
    /// including one left by an earlier round. Returns the ramp-up duration.
    /// A client whose reconnect budget is exhausted fails the round instead
    /// of stalling it forever.
    pub async fn create_connections(&mut self, round: usize) -> PoolResult<Duration> {
        let existing = self.connection_interval * round;
        let total = self.connection_interval * (round + 1);

        self.presence.resize(total, false);
        self.connect_gauge.set_total(total as u64);

        let started = Instant::now();

        let mut pending = FuturesUnordered::new();
        for slot in existing..total {
            let client = Arc::new(ClientConnection::new(
                slot,
                self.settings.clone(),
                self.connect_gauge.clone(),
                self.request_gauge.clone(),
            ));
            self.clients.push(client.clone());
            pending.push(async move { (slot, client.connect().await) });
        }

        while !self.all_present() {
            match pending.next().await {
                Some((slot, result)) => {
                    result?;
                    self.presence[slot] = true;
                }
                // every connect resolved yet a slot is still missing
                None => return Err(PoolError::IncompleteRound),
            }
        }

        self.ramp_up = started.elapsed();
        Ok(self.ramp_up)
    }

    /// Fire this round's burst on every tracked client and collect the
    /// timelines positionally. Resolves only once every position holds a
    /// finished timeline.
    pub async fn send_requests(&mut self, round: usize) -> PoolResult<Vec<Vec<RequestRecord>>> {
        let population = self.connection_interval * (round + 1);

        self.request_gauge.reset();
        self.request_gauge
            .set_total((self.request_interval * self.clients.len()) as u64);

        let mut timelines: Vec<Option<Vec<RequestRecord>>> = vec![None; population];

        let mut pending = FuturesUnordered::new();
        for (index, client) in self.clients.iter().enumerate() {
            let client = client.clone();
            let burst = self.request_interval;
            pending.push(async move { (index, client.send_burst(burst).await) });
        }

        while timelines.iter().any(|slot| slot.is_none()) {
            match pending.next().await {
                Some((index, timeline)) => timelines[index] = Some(timeline),
                None => return Err(PoolError::IncompleteRound),
            }
        }

        Ok(timelines.into_iter().flatten().collect())
    }

    /// Close every tracked connection and wait for each acknowledgment, with
    /// a per-connection timeout. Intended only for final process shutdown.
    pub async fn shutdown(&self, timeout: Duration) {
        let closing = self.clients.iter().map(|client| {
            let client = client.clone();
            async move {
                if let Err(err) = client.close(timeout).await {
                    tracing::warn!(slot = client.slot(), "close not acknowledged: {err}");
                }
            }
        });
        futures_util::future::join_all(closing).await;
    }

    /// True only when every slot of the cumulative population has arrived.
    fn all_present(&self) -> bool {
        !self.presence.is_empty() && self.presence.iter().all(|present| *present)
    }
}
