//! The connection worker.
//!
//! One background task holds a single long-lived connection to the resolved
//! stream URL and watches whether bytes keep arriving. Holding one connection
//! open avoids the connection-setup churn that short polling probes inflict
//! on small streaming appliances; layering an elapsed-time check under the
//! transport timeout turns "no data for too long" into an explicit threshold
//! independent of the transport's own timeout granularity.
//!
//! The worker is self-healing. Every I/O failure, empty read, or protracted
//! silence folds into the same path: publish an offline transition (if
//! currently online), wait out the reconnect delay, try again. The only way
//! it stops is cancellation through its [`WorkerHandle`].

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::TryStreamExt;
use reqwest::{Client, Response, header};
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{EventSender, StreamEvent};

/// Connect timeout for the live stream connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on one connection attempt, covering the TCP connect and the
/// wait for response headers. Without it a server that accepts and then never
/// answers would pin the worker on a dead attempt forever.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on one read attempt; between reads the worker re-checks the
/// silence threshold and the cancellation token.
pub const READ_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// User agent sent on every outbound request.
pub const USER_AGENT: &str = concat!("icemon/", env!("CARGO_PKG_VERSION"), " StreamMonitor");

/// Read size: large enough to amortize per-read overhead, small enough not to
/// buffer meaningful amounts of audio before noticing silence.
const CHUNK_SIZE: usize = 4096;

/// Immutable parameters handed to the worker at spawn time.
///
/// The worker never reads configuration from anywhere else; the coordinator
/// owns the settings store.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Resolved stream URL (playlist indirection already applied).
    pub url: String,
    /// Maximum tolerated data silence before the stream counts as offline.
    pub offline_threshold: Duration,
    /// Pause between a failure and the next connection attempt.
    pub reconnect_delay: Duration,
    /// Read poll granularity; tests shorten this.
    pub read_poll_interval: Duration,
    /// Bound on one connection attempt; tests shorten this.
    pub response_timeout: Duration,
}

impl WorkerConfig {
    pub fn new(url: String, offline_threshold: Duration, reconnect_delay: Duration) -> Self {
        Self {
            url,
            offline_threshold,
            reconnect_delay,
            read_poll_interval: READ_POLL_INTERVAL,
            response_timeout: RESPONSE_TIMEOUT,
        }
    }
}

/// Coordinator-side handle to a running worker.
pub struct WorkerHandle {
    token: CancellationToken,
    online: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Last state the worker published.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Request stop and wait for the worker to finish, bounded by `grace`.
    ///
    /// The worker observes cancellation at the next read/timeout boundary or
    /// immediately during a reconnect wait. If it still has not finished
    /// within `grace` the task is aborted. Either way, no event is emitted
    /// after this returns.
    pub async fn shutdown(self, grace: Duration) {
        self.token.cancel();

        let mut join = self.join;
        match timeout(grace, &mut join).await {
            Ok(Ok(())) => debug!("connection worker stopped"),
            Ok(Err(e)) => warn!(error = %e, "connection worker task failed"),
            Err(_) => {
                warn!(
                    grace_secs = grace.as_secs(),
                    "connection worker did not stop in time, aborting"
                );
                join.abort();
            }
        }
    }
}

/// How one connection attempt (or established connection) ended.
enum ConnectionEnd {
    /// Cancellation was observed; exit without emitting anything.
    Stopped,
    /// Connect error, read error, empty read, or silence past the threshold.
    Lost(String),
}

pub struct ConnectionWorker {
    config: WorkerConfig,
    client: Client,
    token: CancellationToken,
    online: Arc<AtomicBool>,
    /// Loop-local state authority; `online` mirrors it for the coordinator.
    is_online: bool,
    events: EventSender,
}

impl ConnectionWorker {
    /// Spawn the worker task and return the coordinator-side handle.
    pub fn spawn(config: WorkerConfig, client: Client, events: EventSender) -> WorkerHandle {
        let token = CancellationToken::new();
        let online = Arc::new(AtomicBool::new(false));

        let worker = ConnectionWorker {
            config,
            client,
            token: token.clone(),
            online: online.clone(),
            is_online: false,
            events,
        };
        let join = tokio::spawn(worker.run());

        WorkerHandle {
            token,
            online,
            join,
        }
    }

    async fn run(mut self) {
        info!(url = %self.config.url, "connection worker started");

        while !self.token.is_cancelled() {
            match self.watch_connection().await {
                ConnectionEnd::Stopped => break,
                ConnectionEnd::Lost(reason) => {
                    // A stop that raced the failure wins: exit silently.
                    if self.token.is_cancelled() {
                        break;
                    }
                    self.publish_offline(&reason);

                    tokio::select! {
                        _ = self.token.cancelled() => break,
                        _ = sleep(self.config.reconnect_delay) => {}
                    }
                }
            }
        }

        debug!(url = %self.config.url, "connection worker exiting");
    }

    /// Open the connection and read until it dies or stop is requested.
    async fn watch_connection(&mut self) -> ConnectionEnd {
        let response = tokio::select! {
            _ = self.token.cancelled() => return ConnectionEnd::Stopped,
            opened = self.open_stream() => match opened {
                Ok(response) => response,
                Err(reason) => return ConnectionEnd::Lost(reason),
            },
        };

        self.publish_online();

        let stream = response.bytes_stream().map_err(io::Error::other);
        let mut reader = StreamReader::new(stream);
        let mut buf = [0u8; CHUNK_SIZE];
        let mut last_data = Instant::now();

        loop {
            let attempt = tokio::select! {
                _ = self.token.cancelled() => return ConnectionEnd::Stopped,
                read = timeout(self.config.read_poll_interval, reader.read(&mut buf)) => read,
            };

            match attempt {
                // Chunk contents are never interpreted, only their arrival.
                Ok(Ok(n)) if n > 0 => last_data = Instant::now(),
                Ok(Ok(_)) => return ConnectionEnd::Lost("stream ended (empty read)".to_string()),
                Ok(Err(e)) => return ConnectionEnd::Lost(format!("read error: {e}")),
                Err(_) => {
                    // No data inside this poll window; only protracted
                    // silence counts as a failure.
                    let silent = last_data.elapsed();
                    if silent > self.config.offline_threshold {
                        return ConnectionEnd::Lost(format!(
                            "no data for {:.1}s (threshold {:.1}s)",
                            silent.as_secs_f64(),
                            self.config.offline_threshold.as_secs_f64()
                        ));
                    }
                }
            }
        }
    }

    async fn open_stream(&self) -> Result<Response, String> {
        debug!(url = %self.config.url, "opening stream connection");

        let request = self
            .client
            .get(&self.config.url)
            .header(header::ACCEPT, "*/*")
            .header(header::CONNECTION, "keep-alive")
            .send();

        let response = match timeout(self.config.response_timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(format!("connect error: {e}")),
            Err(_) => {
                return Err(format!(
                    "no response within {:.1}s",
                    self.config.response_timeout.as_secs_f64()
                ));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(format!("unexpected HTTP {status}"));
        }

        Ok(response)
    }

    fn publish_online(&mut self) {
        if self.is_online {
            return;
        }
        self.is_online = true;
        self.online.store(true, Ordering::Release);
        info!(url = %self.config.url, "stream online");
        // A closed channel means the coordinator is gone; the worker will be
        // cancelled shortly, nothing to do about it here.
        let _ = self.events.send(StreamEvent::online_now());
    }

    fn publish_offline(&mut self, reason: &str) {
        if !self.is_online {
            debug!(url = %self.config.url, reason, "connection attempt failed");
            return;
        }
        self.is_online = false;
        self.online.store(false, Ordering::Release);
        warn!(url = %self.config.url, reason, "stream offline");
        let _ = self.events.send(StreamEvent::offline_now());
    }
}
