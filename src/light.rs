use crate::connection::Connection;
use crate::types::{DeviceId, DiscoveredLight, LightInfo, LightState};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};

/// Handle for one known light
///
/// Owned by the registry. The connection slot is the only path for commands
/// to this device; `None` means known but not connected.
pub struct Light {
    id: DeviceId,
    info: RwLock<LightInfo>,
    state: Arc<RwLock<LightState>>,
    connection: Mutex<Option<Arc<Connection>>>,
    /// Serializes connect attempts; the slot itself is only locked to read or swap
    connect_lock: Mutex<()>,
}

/// Point-in-time view of a light, as served over HTTP
#[derive(Debug, Clone, Serialize)]
pub struct LightSnapshot {
    pub id: DeviceId,
    #[serde(flatten)]
    pub info: LightInfo,
    #[serde(flatten)]
    pub state: LightState,
    pub connected: bool,
}

impl Light {
    pub(crate) fn new(found: DiscoveredLight) -> Self {
        Self {
            id: found.id,
            info: RwLock::new(found.info),
            state: Arc::new(RwLock::new(found.state)),
            connection: Mutex::new(None),
            connect_lock: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `host:port` of the control socket
    pub async fn location(&self) -> String {
        self.info.read().await.location.clone()
    }

    pub async fn name(&self) -> String {
        self.state.read().await.name.clone()
    }

    /// Property bag shared with the connection reader
    pub fn state_handle(&self) -> Arc<RwLock<LightState>> {
        self.state.clone()
    }

    pub async fn state(&self) -> LightState {
        self.state.read().await.clone()
    }

    /// Merge a fresh discovery result; the connection is left untouched
    pub(crate) async fn merge(&self, found: DiscoveredLight) {
        *self.info.write().await = found.info;
        *self.state.write().await = found.state;
    }

    /// The open connection, if any
    pub async fn connection(&self) -> Option<Arc<Connection>> {
        self.connection
            .lock()
            .await
            .as_ref()
            .filter(|conn| !conn.is_closed())
            .cloned()
    }

    pub async fn is_connected(&self) -> bool {
        self.connection().await.is_some()
    }

    /// Claim the right to open a connection to this light
    ///
    /// Holding the guard across the attempt keeps concurrent scans from
    /// opening a second link to the same device. Readers of the slot never
    /// wait on it.
    pub(crate) async fn lock_connect(&self) -> MutexGuard<'_, ()> {
        self.connect_lock.lock().await
    }

    /// Whether a link was opened once and has since closed
    pub(crate) async fn connection_lost(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(|conn| conn.is_closed())
    }

    pub(crate) async fn set_connection(&self, conn: Connection) {
        *self.connection.lock().await = Some(Arc::new(conn));
    }

    /// Get a consistent snapshot for rendering
    pub async fn snapshot(&self) -> LightSnapshot {
        LightSnapshot {
            id: self.id.clone(),
            info: self.info.read().await.clone(),
            state: self.state.read().await.clone(),
            connected: self.is_connected().await,
        }
    }
}

impl std::fmt::Debug for Light {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Light").field("id", &self.id).finish_non_exhaustive()
    }
}
