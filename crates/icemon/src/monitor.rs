//! The monitor coordinator.
//!
//! Owns the configuration, the resolved URL, and the connection worker's
//! lifecycle. Worker events are drained on the caller's execution context via
//! [`StreamMonitor::pump_events`], so controller callbacks never race with
//! coordinator state. The coordinator never blocks on stream I/O; everything
//! network-bound about the live connection happens inside the worker.
//!
//! Lifetime contract: the owner calls [`StreamMonitor::stop`] before dropping
//! the monitor; drop itself does not wait for the worker.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::{MonitorSettings, SettingsStore};
use crate::error::MonitorError;
use crate::events::{self, EventReceiver, StreamEvent};
use crate::resolver;
use crate::worker::{CONNECT_TIMEOUT, ConnectionWorker, USER_AGENT, WorkerConfig, WorkerHandle};

/// Bounded wait for the worker to wind down during `stop()`.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// The external on-air display controller.
///
/// These two callbacks are the only calls the monitor makes outward at
/// runtime. They run on the coordinator's execution context, inside
/// [`StreamMonitor::pump_events`] or [`StreamMonitor::stop`].
pub trait OnAirController: Send {
    /// Stream came online: reset the presentation timer and activate the
    /// on-air indicator.
    fn stream_online(&mut self);

    /// Stream went offline: deactivate the on-air indicator.
    fn stream_offline(&mut self);
}

/// Liveness monitor for a single configured stream.
pub struct StreamMonitor<C: OnAirController> {
    settings: MonitorSettings,
    store: Arc<dyn SettingsStore>,
    client: Client,
    /// Effective stream URL; absent until a successful resolution.
    resolved_url: Option<String>,
    /// Present iff a connection worker is currently active.
    worker: Option<(WorkerHandle, EventReceiver)>,
    controller: C,
}

impl<C: OnAirController> StreamMonitor<C> {
    /// Create a monitor: load settings from the store and build the shared
    /// HTTP client. Does not start monitoring; call [`start`](Self::start).
    pub fn new(store: Arc<dyn SettingsStore>, controller: C) -> Result<Self, MonitorError> {
        let settings = MonitorSettings::load(store.as_ref());
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            settings,
            store,
            client,
            resolved_url: None,
            worker: None,
            controller,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Last state the active worker published; false with no worker.
    pub fn is_online(&self) -> bool {
        self.worker
            .as_ref()
            .map(|(handle, _)| handle.is_online())
            .unwrap_or(false)
    }

    /// Whether a connection worker is currently active.
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Effective stream URL from the last successful resolution, if any.
    pub fn resolved_url(&self) -> Option<&str> {
        self.resolved_url.as_deref()
    }

    /// Start monitoring.
    ///
    /// No-op (with a log line) when monitoring is disabled, no URL is
    /// configured, a worker is already active, or playlist resolution fails.
    /// Resolution failures are not retried on a timer; call
    /// [`restart`](Self::restart) after fixing the settings.
    pub async fn start(&mut self) {
        if !self.settings.enabled {
            debug!("stream monitoring disabled, not starting");
            return;
        }
        if self.settings.stream_url.is_empty() {
            warn!("no stream URL configured, cannot start monitoring");
            return;
        }
        if self.worker.is_some() {
            debug!("stream monitor already running");
            return;
        }

        if self.resolved_url.is_none() {
            match resolver::resolve(&self.client, &self.settings.stream_url).await {
                Ok(url) => self.resolved_url = Some(url),
                Err(e) => {
                    warn!(
                        url = %self.settings.stream_url,
                        error = %e,
                        "failed to resolve stream URL, monitoring not started"
                    );
                    return;
                }
            }
        }
        let Some(url) = self.resolved_url.clone() else {
            return;
        };

        info!(url = %url, "starting stream monitoring");

        let config = WorkerConfig::new(
            url,
            self.settings.offline_threshold,
            self.settings.reconnect_delay,
        );
        let (tx, rx) = events::channel();
        let handle = ConnectionWorker::spawn(config, self.client.clone(), tx);
        self.worker = Some((handle, rx));
    }

    /// Stop monitoring. Idempotent.
    ///
    /// Signals the worker, waits up to [`STOP_GRACE`] for it to finish, then
    /// delivers any transitions it emitted before stopping. After this
    /// returns, no event from the stopped worker is ever dispatched.
    pub async fn stop(&mut self) {
        let Some((handle, mut rx)) = self.worker.take() else {
            return;
        };

        debug!("stopping stream monitoring");
        handle.shutdown(STOP_GRACE).await;

        while let Ok(event) = rx.try_recv() {
            self.dispatch(event);
        }
    }

    /// Stop, reload settings from the store, and start again if still
    /// enabled and configured. The resolution cache is cleared, so playlist
    /// URLs are re-resolved.
    pub async fn restart(&mut self) {
        info!("restarting stream monitoring");
        self.stop().await;

        self.settings = MonitorSettings::load(self.store.as_ref());
        self.resolved_url = None;

        if self.settings.enabled && !self.settings.stream_url.is_empty() {
            self.start().await;
        }
    }

    /// Drain pending worker events and dispatch them to the controller, in
    /// emission order. Non-blocking; the owner calls this from its own loop.
    pub fn pump_events(&mut self) {
        loop {
            let event = match self.worker.as_mut() {
                Some((_, rx)) => match rx.try_recv() {
                    Ok(event) => event,
                    Err(_) => break,
                },
                None => break,
            };
            self.dispatch(event);
        }
    }

    fn dispatch(&mut self, event: StreamEvent) {
        info!("{}", event.description());
        match event {
            StreamEvent::Online { .. } => self.controller.stream_online(),
            StreamEvent::Offline { .. } => self.controller.stream_offline(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::time::sleep;

    use crate::config::{KEY_ENABLED, KEY_RECONNECT_DELAY, KEY_URL};
    use crate::test_support::init_tracing;

    /// Mutable in-memory settings store; tests change values between
    /// restarts the way an operator would edit settings externally.
    #[derive(Default)]
    struct TestStore(Mutex<HashMap<String, String>>);

    impl TestStore {
        fn set(&self, key: &str, value: &str) {
            self.0
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
        }
    }

    impl SettingsStore for TestStore {
        fn value(&self, key: &str) -> Option<String> {
            self.0.lock().unwrap().get(key).cloned()
        }
    }

    /// Records controller callbacks for later inspection.
    #[derive(Clone, Default)]
    struct RecordingController(Arc<Mutex<Vec<&'static str>>>);

    impl RecordingController {
        fn calls(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().clone()
        }
    }

    impl OnAirController for RecordingController {
        fn stream_online(&mut self) {
            self.0.lock().unwrap().push("online");
        }

        fn stream_offline(&mut self) {
            self.0.lock().unwrap().push("offline");
        }
    }

    fn store_with(pairs: &[(&str, &str)]) -> Arc<TestStore> {
        let store = TestStore::default();
        for (key, value) in pairs {
            store.set(key, value);
        }
        Arc::new(store)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            sleep(Duration::from_millis(50)).await;
        }
        panic!("condition not met within 5s");
    }

    /// Icecast-ish fixture: serves one connection, sends a few chunks, then
    /// closes.
    async fn stream_server(chunks: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\n\r\n")
                .await;
            for _ in 0..chunks {
                if socket.write_all(&[0u8; 512]).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
                sleep(Duration::from_millis(50)).await;
            }
        });
        format!("http://{addr}/stream")
    }

    /// One-shot playlist server.
    async fn playlist_server(status_line: &str, body: &str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "{status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}/live.m3u")
    }

    #[tokio::test]
    async fn test_disabled_does_not_start() {
        init_tracing();

        let store = store_with(&[(KEY_ENABLED, "false"), (KEY_URL, "http://host/live")]);
        let mut monitor = StreamMonitor::new(store, RecordingController::default()).unwrap();

        assert!(!monitor.is_enabled());
        monitor.start().await;
        assert!(!monitor.is_running());
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn test_empty_url_does_not_start() {
        init_tracing();

        let store = store_with(&[(KEY_URL, "")]);
        let mut monitor = StreamMonitor::new(store, RecordingController::default()).unwrap();

        assert!(monitor.is_enabled());
        monitor.start().await;
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_failed_resolution_does_not_start() {
        init_tracing();

        let url = playlist_server("HTTP/1.1 404 Not Found", "").await;
        let store = store_with(&[(KEY_URL, &url)]);
        let mut monitor = StreamMonitor::new(store, RecordingController::default()).unwrap();

        monitor.start().await;
        assert!(!monitor.is_running());
        assert!(monitor.resolved_url().is_none());
    }

    #[tokio::test]
    async fn test_playlist_scenario_resolves_first_entry() {
        init_tracing();

        let url = playlist_server("HTTP/1.1 200 OK", "#EXTM3U\n#EXTINF:-1,Title\nhttp://host/live\n")
            .await;
        let store = store_with(&[(KEY_URL, &url), (KEY_RECONNECT_DELAY, "1")]);
        let mut monitor = StreamMonitor::new(store, RecordingController::default()).unwrap();

        monitor.start().await;
        assert_eq!(monitor.resolved_url(), Some("http://host/live"));
        // The worker is up even though its target is unreachable; it just
        // stays offline and retries at its pace.
        assert!(monitor.is_running());
        assert!(!monitor.is_online());

        monitor.stop().await;
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_online_offline_flow_dispatches_in_order() {
        init_tracing();

        let url = stream_server(3).await;
        let store = store_with(&[(KEY_URL, &url)]);
        let controller = RecordingController::default();
        let mut monitor = StreamMonitor::new(store, controller.clone()).unwrap();

        monitor.start().await;
        assert!(monitor.is_running());

        {
            let m = &monitor;
            wait_until(|| m.is_online()).await;
        }
        monitor.pump_events();
        assert_eq!(controller.calls(), vec!["online"]);

        // Server closes after its chunks; EOF folds into an offline
        // transition.
        {
            let m = &monitor;
            wait_until(|| !m.is_online()).await;
        }
        monitor.pump_events();
        assert_eq!(controller.calls(), vec!["online", "offline"]);

        monitor.stop().await;
        assert_eq!(controller.calls(), vec!["online", "offline"]);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_delivers_pending_events() {
        init_tracing();

        let url = stream_server(200).await;
        let store = store_with(&[(KEY_URL, &url)]);
        let controller = RecordingController::default();
        let mut monitor = StreamMonitor::new(store, controller.clone()).unwrap();

        monitor.start().await;
        {
            let m = &monitor;
            wait_until(|| m.is_online()).await;
        }

        // The online transition is still queued; stop must deliver it.
        monitor.stop().await;
        assert_eq!(controller.calls(), vec!["online"]);
        assert!(!monitor.is_running());
        assert!(!monitor.is_online());

        monitor.stop().await;
        assert_eq!(controller.calls(), vec!["online"]);
    }

    #[tokio::test]
    async fn test_restart_reloads_settings_and_keeps_one_worker() {
        init_tracing();

        let first = stream_server(200).await;
        let store = store_with(&[(KEY_URL, &first)]);
        let controller = RecordingController::default();
        let mut monitor = StreamMonitor::new(store.clone(), controller.clone()).unwrap();

        monitor.start().await;
        assert_eq!(monitor.resolved_url(), Some(first.as_str()));

        let second = stream_server(200).await;
        store.set(KEY_URL, &second);

        monitor.restart().await;
        assert!(monitor.is_running());
        assert_eq!(monitor.resolved_url(), Some(second.as_str()));

        monitor.stop().await;
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_restart_into_disabled_stays_stopped() {
        init_tracing();

        let url = stream_server(200).await;
        let store = store_with(&[(KEY_URL, &url)]);
        let mut monitor =
            StreamMonitor::new(store.clone(), RecordingController::default()).unwrap();

        monitor.start().await;
        assert!(monitor.is_running());

        store.set(KEY_ENABLED, "false");
        monitor.restart().await;
        assert!(!monitor.is_running());
        assert!(!monitor.is_enabled());
    }

    #[tokio::test]
    async fn test_start_twice_is_a_no_op() {
        init_tracing();

        let url = stream_server(200).await;
        let store = store_with(&[(KEY_URL, &url)]);
        let controller = RecordingController::default();
        let mut monitor = StreamMonitor::new(store, controller.clone()).unwrap();

        monitor.start().await;
        {
            let m = &monitor;
            wait_until(|| m.is_online()).await;
        }
        monitor.start().await;
        monitor.pump_events();

        // A second start must not have spawned a second worker; exactly one
        // online transition was ever emitted.
        assert_eq!(controller.calls(), vec!["online"]);

        monitor.stop().await;
    }
}
