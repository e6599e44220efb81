use crate::client::error::{ClientError, ClientResult};
use crate::client::history::CountHistory;
use crate::client::types::{ClientSettings, ConnectionState, RequestRecord, ResponseEnvelope};
use crate::progress::ProgressGauge;
use backoff::backoff::Backoff;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why a connected session ended.
enum SessionEnd {
    /// Transport fault; counted and followed by a reconnect.
    Faulted(String),
    /// Clean or server-initiated close.
    Closed,
}

/// One simulated client.
///
/// Owns the WebSocket transport for a single population slot, keeps it alive
/// across reconnects while `keep_alive` holds, sends the periodic heartbeat,
/// and matches inbound responses against the current round's request
/// timeline.
pub struct ClientConnection {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    slot: usize,
    settings: ClientSettings,
    keep_alive: AtomicBool,
    connect_fails: AtomicU64,
    connection_errors: AtomicU64,
    success_count: AtomicU64,
    /// Current round's timeline, indexed by wire sequence id.
    records: Mutex<Vec<RequestRecord>>,
    /// Success-counter snapshots for stall detection. Never cleared between
    /// rounds.
    history: Mutex<CountHistory>,
    /// Write handle into the live session, absent while disconnected.
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    state_tx: watch::Sender<ConnectionState>,
    last_error: Mutex<Option<ClientError>>,
    connect_gauge: Arc<ProgressGauge>,
    request_gauge: Arc<ProgressGauge>,
}

impl ClientConnection {
    pub fn new(
        slot: usize,
        settings: ClientSettings,
        connect_gauge: Arc<ProgressGauge>,
        request_gauge: Arc<ProgressGauge>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let stall_window = settings.completion.stall_window;

        Self {
            inner: Arc::new(Inner {
                slot,
                settings,
                keep_alive: AtomicBool::new(true),
                connect_fails: AtomicU64::new(0),
                connection_errors: AtomicU64::new(0),
                success_count: AtomicU64::new(0),
                records: Mutex::new(Vec::new()),
                history: Mutex::new(CountHistory::new(stall_window)),
                outbound: Mutex::new(None),
                state_tx,
                last_error: Mutex::new(None),
                connect_gauge,
                request_gauge,
            }),
            task: Mutex::new(None),
        }
    }

    pub fn slot(&self) -> usize {
        self.inner.slot
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state_tx.borrow().clone()
    }

    /// Number of rejected connect attempts so far.
    pub fn connect_fails(&self) -> u64 {
        self.inner.connect_fails.load(Ordering::Relaxed)
    }

    /// Number of post-connect transport faults so far.
    pub fn connection_errors(&self) -> u64 {
        self.inner.connection_errors.load(Ordering::Relaxed)
    }

    /// Successful requests in the current round.
    pub fn success_count(&self) -> u64 {
        self.inner.success_count.load(Ordering::Relaxed)
    }

    /// Start the connection and wait until the transport is up.
    ///
    /// Spawns the supervisor task on first use; it keeps reconnecting in the
    /// background for as long as `keep_alive` holds. Returns an error only
    /// when the reconnect budget is exhausted.
    pub async fn connect(&self) -> ClientResult<()> {
        let mut state_rx = self.inner.state_tx.subscribe();
        {
            let mut task = self.task.lock();
            if task.is_none() {
                let inner = self.inner.clone();
                *task = Some(tokio::spawn(inner.run()));
            }
        }

        loop {
            let state = state_rx.borrow_and_update().clone();
            match state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::GaveUp => return Err(self.inner.take_last_error()),
                _ => {}
            }
            if state_rx.changed().await.is_err() {
                return Err(ClientError::Closed);
            }
        }
    }

    /// Fire one round's burst of `n` requests and wait for the timeline.
    ///
    /// Resets the round's records and success counter, issues the requests
    /// with sequence ids `0..n`, then polls the completion heuristic until it
    /// fires. A send on a disconnected transport leaves that record
    /// unfinished; the heuristic's caps still bound the wait.
    pub async fn send_burst(&self, n: usize) -> Vec<RequestRecord> {
        let policy = self.inner.settings.completion.clone();

        self.inner.success_count.store(0, Ordering::Relaxed);
        self.inner.records.lock().clear();

        for sequence in 0..n {
            self.inner
                .records
                .lock()
                .push(RequestRecord::started(sequence, Utc::now().timestamp_millis()));
            if !self.inner.send_frame(sequence) {
                tracing::debug!(
                    slot = self.inner.slot,
                    "request {sequence} dropped while disconnected"
                );
            }
        }

        let expected = n as u64;
        let mut polls: u64 = 0;
        loop {
            tokio::time::sleep(policy.poll_interval).await;

            let success = self.inner.success_count.load(Ordering::Relaxed);
            let all_finished = self
                .inner
                .records
                .lock()
                .iter()
                .all(|record| record.finish_ms.is_some());
            let stalled = self.inner.history.lock().peek_oldest() == Some(success);
            let done = policy.is_complete(all_finished, success, expected, stalled, polls);

            // the snapshot is recorded even on the final poll
            self.inner.history.lock().push(success);
            if done {
                break;
            }
            polls += 1;
        }

        self.inner.records.lock().clone()
    }

    /// Shut the connection down and wait for the acknowledgment.
    ///
    /// Clears `keep_alive` (which also stops the heartbeat with the
    /// session), sends a close frame, and awaits the supervisor's terminal
    /// state. A session that never acknowledges within `timeout` is aborted.
    pub async fn close(&self, timeout: Duration) -> ClientResult<()> {
        self.inner.keep_alive.store(false, Ordering::Relaxed);
        {
            let outbound = self.inner.outbound.lock();
            if let Some(tx) = outbound.as_ref() {
                let _ = tx.send(Message::Close(None));
            }
        }

        let mut state_rx = self.inner.state_tx.subscribe();
        let acked = tokio::time::timeout(timeout, async {
            loop {
                if state_rx.borrow_and_update().is_terminal() {
                    return;
                }
                if state_rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;

        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        match acked {
            Ok(()) => Ok(()),
            Err(_) => Err(ClientError::CloseTimeout(timeout)),
        }
    }
}

impl Inner {
    /// Supervisor loop: connect, drive the session, reconnect on faults and
    /// unexpected closes until shut down or the reconnect budget runs out.
    async fn run(self: Arc<Self>) {
        while self.keep_alive.load(Ordering::Relaxed) {
            self.set_state(ConnectionState::Connecting);

            let stream = match self.establish().await {
                Ok(stream) => stream,
                // shutdown raced the reconnect
                Err(ClientError::Closed) => break,
                Err(err) => {
                    tracing::error!(slot = self.slot, "reconnect abandoned: {err}");
                    *self.last_error.lock() = Some(err);
                    self.set_state(ConnectionState::GaveUp);
                    return;
                }
            };

            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            *self.outbound.lock() = Some(outbound_tx);
            self.seed_probe_record();
            self.connect_gauge.incr();
            self.set_state(ConnectionState::Connected);

            let end = self.drive(stream, outbound_rx).await;

            *self.outbound.lock() = None;
            self.connect_gauge.decr();

            match end {
                SessionEnd::Faulted(reason) => {
                    self.connection_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(slot = self.slot, "transport fault, reconnecting: {reason}");
                }
                SessionEnd::Closed => {
                    if self.keep_alive.load(Ordering::Relaxed) {
                        self.set_state(ConnectionState::Closed);
                        tracing::warn!(slot = self.slot, "connection closed, reconnecting");
                    }
                }
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Connect with exponential backoff until the budget is spent.
    async fn establish(&self) -> ClientResult<WsStream> {
        let mut schedule = self.settings.reconnect.backoff();
        let mut attempts: u64 = 0;

        loop {
            if !self.keep_alive.load(Ordering::Relaxed) {
                return Err(ClientError::Closed);
            }
            match connect_async(self.settings.url.as_str()).await {
                Ok((stream, _response)) => return Ok(stream),
                Err(err) => {
                    attempts += 1;
                    self.connect_fails.fetch_add(1, Ordering::Relaxed);
                    match schedule.next_backoff() {
                        Some(delay) => {
                            tracing::warn!(
                                slot = self.slot,
                                "connect failed (attempt {attempts}), retrying in {delay:?}: {err}"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            return Err(ClientError::RetriesExhausted {
                                attempts,
                                last_error: err.to_string(),
                            })
                        }
                    }
                }
            }
        }
    }

    /// One connected session: reader, heartbeat, and outbound writer share a
    /// select loop until the transport ends.
    async fn drive(
        &self,
        stream: WsStream,
        mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    ) -> SessionEnd {
        let (mut write, mut read) = stream.split();

        // first heartbeat fires one full interval after connect
        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + self.settings.heartbeat_interval,
            self.settings.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Closed,
                    Some(Ok(_)) => {} // binary/ping/pong are not part of the protocol
                    Some(Err(tungstenite::Error::ConnectionClosed))
                    | Some(Err(tungstenite::Error::AlreadyClosed)) => return SessionEnd::Closed,
                    Some(Err(err)) => return SessionEnd::Faulted(err.to_string()),
                },
                _ = heartbeat.tick() => {
                    let probe = serde_json::json!({ "c": 0 }).to_string();
                    if let Err(err) = write.send(Message::Text(probe.into())).await {
                        return SessionEnd::Faulted(err.to_string());
                    }
                }
                queued = outbound_rx.recv() => match queued {
                    Some(message) => {
                        let closing = matches!(message, Message::Close(_));
                        if let Err(err) = write.send(message).await {
                            return if closing {
                                SessionEnd::Closed
                            } else {
                                SessionEnd::Faulted(err.to_string())
                            };
                        }
                        // after a close frame, keep reading until the server
                        // acknowledges with its own
                    }
                    None => return SessionEnd::Closed,
                },
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let envelope: ResponseEnvelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::debug!(slot = self.slot, "discarding unparseable frame: {err}");
                return;
            }
        };
        self.apply_response(
            envelope.c as usize,
            envelope.ts as i64,
            Utc::now().timestamp_millis(),
        );
    }

    /// First matching response wins. Unknown sequence ids and responses for
    /// already-finished records are discarded; the server answers sequence 0
    /// both on connect and per round, so duplicates are expected traffic.
    fn apply_response(&self, sequence: usize, server_ts: i64, now_ms: i64) {
        let mut records = self.records.lock();
        let Some(record) = records.get_mut(sequence) else {
            return;
        };
        if record.received_ms.is_some() || record.finish_ms.is_some() {
            return;
        }
        record.received_ms = Some(server_ts);
        record.finish_ms = Some(now_ms);
        drop(records);

        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.request_gauge.incr();
    }

    /// The server greets a fresh connection with a `c=0` response, so a
    /// start stamp must exist for it to land on. Only an empty timeline is
    /// seeded; a reconnect mid-round must not clobber live records.
    fn seed_probe_record(&self) {
        let mut records = self.records.lock();
        if records.is_empty() {
            records.push(RequestRecord::started(0, Utc::now().timestamp_millis()));
        }
    }

    /// Queue one `{"c":<sequence>}` request into the live session. Returns
    /// false while disconnected.
    fn send_frame(&self, sequence: usize) -> bool {
        let outbound = self.outbound.lock();
        match outbound.as_ref() {
            Some(tx) => {
                let frame = serde_json::json!({ "c": sequence }).to_string();
                tx.send(Message::Text(frame.into())).is_ok()
            }
            None => false,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let _ = self.state_tx.send_replace(state);
    }

    fn take_last_error(&self) -> ClientError {
        self.last_error.lock().take().unwrap_or(ClientError::Closed)
    }
}
