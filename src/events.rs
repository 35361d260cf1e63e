use crate::error::{Result, YeegoError};
use crate::protocol::CommandReply;
use crate::types::DeviceId;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

/// Message published by a device connection
///
/// Only results that no pending request claimed end up here.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Reply with no waiter (late, or never awaited)
    Result {
        device_id: DeviceId,
        reply: CommandReply,
    },

    /// Unsolicited state change
    Notification {
        device_id: DeviceId,
        method: String,
        params: Map<String, Value>,
    },
}

impl DeviceEvent {
    pub fn device_id(&self) -> &str {
        match self {
            DeviceEvent::Result { device_id, .. } => device_id,
            DeviceEvent::Notification { device_id, .. } => device_id,
        }
    }
}

/// Sending half shared by every device connection
pub type EventSender = broadcast::Sender<DeviceEvent>;

/// Create the shared event channel
///
/// Producers never wait: once `capacity` messages are buffered the oldest
/// ones are overwritten and a lagging receiver is told how many it missed.
pub fn channel(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = broadcast::channel(capacity.max(1));
    (tx, EventReceiver::new(rx))
}

/// Receiver for device events
pub struct EventReceiver {
    rx: broadcast::Receiver<DeviceEvent>,
}

impl EventReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<DeviceEvent>) -> Self {
        Self { rx }
    }

    /// Subscribe a new receiver to an existing channel
    pub fn subscribe(tx: &EventSender) -> Self {
        Self::new(tx.subscribe())
    }

    /// Receive the next event
    pub async fn recv(&mut self) -> Result<DeviceEvent> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => YeegoError::ChannelClosed,
            broadcast::error::RecvError::Lagged(n) => YeegoError::Lagged(n),
        })
    }

    /// Take the next queued event if there is one
    ///
    /// `Ok(None)` means the channel is open but currently drained.
    pub fn try_recv(&mut self) -> Result<Option<DeviceEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(YeegoError::ChannelClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => Err(YeegoError::Lagged(n)),
        }
    }
}

/// Publish an event, ignoring the case where nobody is listening
pub(crate) fn publish(tx: &EventSender, event: DeviceEvent) {
    if tx.send(event).is_err() {
        tracing::trace!("No event receivers, dropping message");
    }
}
