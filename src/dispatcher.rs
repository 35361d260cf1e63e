use crate::error::YeegoError;
use crate::events::{DeviceEvent, EventReceiver};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Counters kept by the dispatcher
#[derive(Debug, Default)]
pub struct DispatchStats {
    notifications: AtomicU64,
    orphaned_results: AtomicU64,
    dropped: AtomicU64,
}

impl DispatchStats {
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    /// Results nobody was waiting for
    pub fn orphaned_results(&self) -> u64 {
        self.orphaned_results.load(Ordering::Relaxed)
    }

    /// Messages overwritten before the dispatcher got to them
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Background task draining the event channel
///
/// Light state is already updated by the connections, so for now every
/// message is only logged.
pub struct Dispatcher {
    stats: Arc<DispatchStats>,
    stop_tx: Option<broadcast::Sender<()>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Dispatcher {
    /// Start draining `events`
    pub fn spawn(mut events: EventReceiver) -> Self {
        let stats = Arc::new(DispatchStats::default());
        let (stop_tx, mut stop_rx) = broadcast::channel(1);

        let task_stats = stats.clone();
        let handle = tokio::spawn(async move {
            tracing::info!("Messages receiver started");
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        tracing::info!("Messages receiver stopped");
                        break;
                    }
                    received = events.recv() => match received {
                        Ok(event) => dispatch(&task_stats, event),
                        Err(YeegoError::Lagged(missed)) => {
                            tracing::warn!("Dispatcher lagged, {} message(s) dropped", missed);
                            task_stats.dropped.fetch_add(missed, Ordering::Relaxed);
                        }
                        Err(e) => {
                            tracing::info!("Messages receiver ended: {}", e);
                            break;
                        }
                    }
                }
            }
        });

        Self {
            stats,
            stop_tx: Some(stop_tx),
            task_handle: Some(handle),
        }
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }

    /// Signal the task to stop and wait briefly for it
    pub async fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.task_handle.take() {
            let _ = tokio::time::timeout(Duration::from_millis(500), handle).await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

fn dispatch(stats: &DispatchStats, event: DeviceEvent) {
    match event {
        DeviceEvent::Notification {
            device_id,
            method,
            params,
        } => {
            stats.notifications.fetch_add(1, Ordering::Relaxed);
            tracing::info!(device_id = %device_id, method = %method, params = ?params, "Notification");
        }
        DeviceEvent::Result { device_id, reply } => {
            stats.orphaned_results.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                device_id = %device_id,
                request_id = reply.id,
                error = ?reply.error,
                "Orphaned result, no request was waiting"
            );
        }
    }
}
