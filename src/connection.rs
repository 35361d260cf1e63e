use crate::error::{Result, YeegoError};
use crate::events::{self, DeviceEvent, EventSender};
use crate::protocol::{CommandReply, CommandRequest, Incoming};
use crate::types::{DeviceId, LightState, RequestId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::time::timeout;

/// Connection state shared with the reader task
struct ConnectionState {
    /// Requests waiting for a reply, keyed by request id
    pending_requests: HashMap<RequestId, oneshot::Sender<CommandReply>>,
    /// Channel for sending outgoing lines
    line_tx: mpsc::UnboundedSender<String>,
}

/// Control link to one light
///
/// Every reply read from the socket goes to exactly one place: the pending
/// request with the same id if it is still waiting, the event channel otherwise.
pub struct Connection {
    device_id: DeviceId,
    state: Arc<Mutex<ConnectionState>>,
    next_id: AtomicU32,
    closed: Arc<AtomicBool>,
}

impl Connection {
    /// Start the reader and writer tasks for an already-open stream
    ///
    /// `props` notifications are applied to `light_state` before they are
    /// published on `events`.
    pub fn spawn<S>(
        stream: S,
        device_id: impl Into<DeviceId>,
        light_state: Arc<RwLock<LightState>>,
        events: EventSender,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let device_id = device_id.into();
        let (read_half, mut write_half) = tokio::io::split(stream);
        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();

        let state = Arc::new(Mutex::new(ConnectionState {
            pending_requests: HashMap::new(),
            line_tx,
        }));
        let closed = Arc::new(AtomicBool::new(false));

        // Forward outgoing lines to the socket; one writer serializes all senders
        let writer_closed = closed.clone();
        let writer_id = device_id.clone();
        let write_handle = tokio::spawn(async move {
            while let Some(line) = line_rx.recv().await {
                if let Err(e) = write_half.write_all(line.as_bytes()).await {
                    tracing::error!("Failed to send to {}: {}", writer_id, e);
                    break;
                }
            }
            writer_closed.store(true, Ordering::SeqCst);
        });

        let reader_state = state.clone();
        let reader_closed = closed.clone();
        let reader_id = device_id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if let Err(e) =
                            Self::handle_line(&reader_state, &light_state, &events, &reader_id, &line).await
                        {
                            tracing::warn!("Bad message from {}: {}", reader_id, e);
                        }
                    }
                    Ok(None) => {
                        tracing::info!("Connection to {} closed", reader_id);
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Read error from {}: {}", reader_id, e);
                        break;
                    }
                }
            }

            // Dropping the senders wakes every waiter with a closed error
            reader_closed.store(true, Ordering::SeqCst);
            reader_state.lock().await.pending_requests.clear();
            write_handle.abort();
        });

        Self {
            device_id,
            state,
            next_id: AtomicU32::new(1),
            closed,
        }
    }

    /// Route one incoming line
    async fn handle_line(
        state: &Arc<Mutex<ConnectionState>>,
        light_state: &Arc<RwLock<LightState>>,
        events: &EventSender,
        device_id: &str,
        line: &str,
    ) -> Result<()> {
        tracing::debug!("Received from {}: {}", device_id, line);

        match Incoming::parse(line)? {
            Incoming::Reply(reply) => {
                let waiter = state.lock().await.pending_requests.remove(&reply.id);
                let unclaimed = match waiter {
                    Some(tx) => tx.send(reply).err(),
                    None => Some(reply),
                };
                // The waiter is gone (timed out), fall through to the dispatcher
                if let Some(reply) = unclaimed {
                    events::publish(
                        events,
                        DeviceEvent::Result {
                            device_id: device_id.to_string(),
                            reply,
                        },
                    );
                }
            }
            Incoming::Notification { method, params } => {
                if method == "props" {
                    light_state.write().await.apply_props(&params);
                }
                events::publish(
                    events,
                    DeviceEvent::Notification {
                        device_id: device_id.to_string(),
                        method,
                        params,
                    },
                );
            }
        }

        Ok(())
    }

    /// Send a command and register a pending request for its reply
    ///
    /// Returns as soon as the command is queued; use [`PendingRequest::wait`]
    /// to block for the reply.
    pub async fn send_command(&self, method: &str, params: Vec<Value>) -> Result<PendingRequest> {
        if self.is_closed() {
            return Err(YeegoError::Transport(format!("connection to {} is closed", self.device_id)));
        }

        let request_id = self.next_request_id();
        let line = CommandRequest::new(request_id, method, params).to_line()?;
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.state.lock().await;
            state.pending_requests.insert(request_id, tx);

            tracing::debug!("Sending to {}: {}", self.device_id, line.trim_end());

            if state.line_tx.send(line).is_err() {
                state.pending_requests.remove(&request_id);
                return Err(YeegoError::Transport(format!("connection to {} is closed", self.device_id)));
            }
        }

        Ok(PendingRequest {
            id: request_id,
            device_id: self.device_id.clone(),
            rx,
            state: self.state.clone(),
        })
    }

    /// Send a command and wait for its reply
    pub async fn request(&self, method: &str, params: Vec<Value>, wait: Duration) -> Result<Vec<Value>> {
        self.send_command(method, params).await?.wait(wait).await
    }

    /// Monotonic, never zero; ids only have to be unique among this link's outstanding requests
    fn next_request_id(&self) -> RequestId {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Whether the socket has been closed by either side
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of requests still waiting for a reply
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending_requests.len()
    }
}

/// Wait state for one outstanding command
///
/// Dropping it, waited on or not, releases the request's slot; a reply that
/// arrives afterwards is published as an unclaimed result.
pub struct PendingRequest {
    id: RequestId,
    device_id: DeviceId,
    rx: oneshot::Receiver<CommandReply>,
    state: Arc<Mutex<ConnectionState>>,
}

impl PendingRequest {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Wait up to `wait` for the matching reply
    ///
    /// A device-reported failure becomes [`YeegoError::Device`]. On timeout the
    /// slot is released, so a late reply is published as an unclaimed result.
    pub async fn wait(mut self, wait: Duration) -> Result<Vec<Value>> {
        match timeout(wait, &mut self.rx).await {
            Ok(Ok(reply)) => match reply.error {
                Some(error) => Err(YeegoError::Device(error)),
                None => Ok(reply.result.unwrap_or_default()),
            },
            Ok(Err(_)) => Err(YeegoError::ConnectionClosed),
            Err(_) => {
                self.state.lock().await.pending_requests.remove(&self.id);
                tracing::debug!("Request {} to {} timed out", self.id, self.device_id);
                Err(YeegoError::Timeout)
            }
        }
    }
}

impl Drop for PendingRequest {
    // Covers waits that were cancelled or never started
    fn drop(&mut self) {
        let id = self.id;
        match self.state.try_lock() {
            Ok(mut state) => {
                state.pending_requests.remove(&id);
            }
            Err(_) => {
                let state = self.state.clone();
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        state.lock().await.pending_requests.remove(&id);
                    });
                }
            }
        }
    }
}
