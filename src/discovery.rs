use crate::connection::Connection;
use crate::error::{Result, YeegoError};
use crate::events::EventSender;
use crate::light::Light;
use crate::registry::{Registry, Upsert};
use crate::types::DiscoveredLight;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Finds lights on the network
#[async_trait]
pub trait Discoverer: Send + Sync + 'static {
    /// Search for `duration` and return every light matching `filter`
    ///
    /// Must be callable repeatedly; each call starts from scratch.
    async fn search(&self, duration: Duration, filter: &str) -> Result<Vec<DiscoveredLight>>;
}

/// Opens control links to lights
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connect to `light`, publishing its unclaimed messages on `events`
    async fn connect(&self, light: &Light, events: EventSender) -> Result<Connection>;
}

/// Discovery scanner
///
/// Owns the merge/connect policy and the rescan cadence. The packet exchange
/// itself is left to the [`Discoverer`].
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use yeego::{events, Registry, Scanner, SsdpDiscoverer, TcpConnector};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let registry = Registry::new();
///     let (events_tx, _events_rx) = events::channel(256);
///     let mut scanner = Scanner::new(
///         SsdpDiscoverer::new(),
///         TcpConnector::default(),
///         registry.clone(),
///         events_tx,
///         Duration::from_secs(3),
///         "",
///     );
///
///     scanner.initial_scan().await?;
///     scanner.start(Duration::from_secs(60), None);
///
///     for light in registry.list().await {
///         println!("Found light {} at {}", light.id(), light.location().await);
///     }
///
///     scanner.stop().await;
///     Ok(())
/// }
/// ```
pub struct Scanner<D, C> {
    context: Arc<ScanContext<D, C>>,
    stop_tx: Option<broadcast::Sender<()>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

struct ScanContext<D, C> {
    discoverer: D,
    connector: C,
    registry: Registry,
    events: EventSender,
    search_duration: Duration,
    filter: String,
}

impl<D: Discoverer, C: Connector> Scanner<D, C> {
    pub fn new(
        discoverer: D,
        connector: C,
        registry: Registry,
        events: EventSender,
        search_duration: Duration,
        filter: impl Into<String>,
    ) -> Self {
        Self {
            context: Arc::new(ScanContext {
                discoverer,
                connector,
                registry,
                events,
                search_duration,
                filter: filter.into(),
            }),
            stop_tx: None,
            task_handle: None,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.context.registry
    }

    /// Run the startup scan
    ///
    /// Fails with [`YeegoError::Discovery`] if the search itself fails;
    /// lights that cannot be connected are logged and skipped.
    pub async fn initial_scan(&self) -> Result<usize> {
        tracing::info!(
            "Initial lights search for {:?}",
            self.context.search_duration
        );
        let found = self.context.scan().await?;
        tracing::info!("Found {} lights", found);
        Ok(found)
    }

    /// Run one scan-and-merge pass outside the periodic loop
    pub async fn rescan(&self) -> Result<usize> {
        self.context.scan().await
    }

    /// Merge a single light as if a scan had reported it
    pub async fn merge(&self, found: DiscoveredLight) {
        self.context.merge(found).await
    }

    /// Start the periodic rescan task
    ///
    /// Every `interval` the search is repeated; failures are logged and the
    /// loop carries on. Advertisements, when given, are merged as they arrive.
    /// Restarts the task if it is already running.
    pub fn start(
        &mut self,
        interval: Duration,
        advertisements: Option<mpsc::Receiver<DiscoveredLight>>,
    ) {
        self.signal_stop();

        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        self.stop_tx = Some(stop_tx);

        let context = self.context.clone();
        let mut advertisements = advertisements;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        tracing::info!("Scanner stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match context.scan().await {
                            Ok(found) => tracing::debug!("Rescan found {} light(s)", found),
                            Err(e) => tracing::warn!("Rescan failed: {}", e),
                        }
                    }
                    found = next_advertisement(&mut advertisements) => {
                        context.merge(found).await;
                    }
                }
            }
        });

        self.task_handle = Some(handle);
    }

    /// Stop the periodic task
    ///
    /// The registry and any open connections are kept.
    pub async fn stop(&mut self) {
        self.signal_stop();
        if let Some(mut handle) = self.task_handle.take() {
            // A scan in progress only notices the signal when it finishes
            if tokio::time::timeout(Duration::from_millis(500), &mut handle)
                .await
                .is_err()
            {
                handle.abort();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn signal_stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl<D, C> Drop for Scanner<D, C> {
    fn drop(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

impl<D: Discoverer, C: Connector> ScanContext<D, C> {
    async fn scan(&self) -> Result<usize> {
        let found = self
            .discoverer
            .search(self.search_duration, &self.filter)
            .await
            .map_err(|e| match e {
                YeegoError::Discovery(_) => e,
                other => YeegoError::Discovery(other.to_string()),
            })?;

        let count = found.len();
        join_all(found.into_iter().map(|light| self.merge(light))).await;
        Ok(count)
    }

    async fn merge(&self, found: DiscoveredLight) {
        if !found.matches(&self.filter) {
            tracing::debug!("Skipping {} (filtered)", found.id);
            return;
        }

        let Upsert { light, .. } = self.registry.upsert(found).await;
        if let Err(e) = self.ensure_connected(&light).await {
            let location = light.location().await;
            tracing::warn!("Error connecting to {} at {}: {}", light.id(), location, e);
        }
    }

    /// Connect `light` unless it already has a live connection
    async fn ensure_connected(&self, light: &Light) -> Result<bool> {
        let _connecting = light.lock_connect().await;
        if light.is_connected().await {
            return Ok(false);
        }
        if light.connection_lost().await {
            tracing::info!("Connection to {} was lost, reconnecting", light.id());
        }

        let conn = self.connector.connect(light, self.events.clone()).await?;
        let name = light.name().await;
        tracing::info!("Light {} named {:?} connected", light.id(), name);
        light.set_connection(conn).await;
        Ok(true)
    }
}

/// Next advertisement, or never if there is no (longer a) listener
async fn next_advertisement(
    advertisements: &mut Option<mpsc::Receiver<DiscoveredLight>>,
) -> DiscoveredLight {
    if let Some(rx) = advertisements.as_mut() {
        if let Some(found) = rx.recv().await {
            return found;
        }
        tracing::warn!("Advertisement listener ended");
        *advertisements = None;
    }
    std::future::pending().await
}
