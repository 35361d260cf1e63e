use crate::connection::Connection;
use crate::discovery::Connector;
use crate::error::{Result, YeegoError};
use crate::events::EventSender;
use crate::light::Light;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens the TCP control socket advertised by a light
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, light: &Light, events: EventSender) -> Result<Connection> {
        let location = light.location().await;
        tracing::info!("Connecting to {} at {}", light.id(), location);

        let stream = match timeout(self.connect_timeout, TcpStream::connect(&location)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(YeegoError::Connect(format!("{}: {}", location, e))),
            Err(_) => {
                return Err(YeegoError::Connect(format!(
                    "{}: no answer within {:?}",
                    location, self.connect_timeout
                )))
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not set TCP_NODELAY for {}: {}", location, e);
        }

        Ok(Connection::spawn(stream, light.id(), light.state_handle(), events))
    }
}
