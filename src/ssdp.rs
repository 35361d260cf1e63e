//! SSDP discovery of Yeelight devices
//!
//! Lights answer an `M-SEARCH` for `wifi_bulb` on port 1982 and also multicast
//! `NOTIFY` advertisements on their own when they power up or change state.
//! Both carry the full device description in their headers.

use crate::discovery::Discoverer;
use crate::error::{Result, YeegoError};
use crate::types::{DeviceId, DiscoveredLight, LightInfo, LightState};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

const MULTICAST_IP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
const SSDP_PORT: u16 = 1982;
const SEARCH_TARGET: &str = "wifi_bulb";
const LOCATION_SCHEME: &str = "yeelight://";

/// SSDP client for light discovery
#[derive(Debug, Clone)]
pub struct SsdpDiscoverer {
    target: SocketAddr,
}

impl SsdpDiscoverer {
    /// Discoverer that searches the standard multicast group
    pub fn new() -> Self {
        Self {
            target: SocketAddr::V4(SocketAddrV4::new(MULTICAST_IP, SSDP_PORT)),
        }
    }

    /// Discoverer that sends its searches to `target` instead
    pub fn with_target(target: SocketAddr) -> Self {
        Self { target }
    }

    fn search_request(&self) -> String {
        format!(
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: {}\r\n\
             MAN: \"ssdp:discover\"\r\n\
             ST: {}\r\n\
             \r\n",
            self.target, SEARCH_TARGET
        )
    }

    /// Listen for `NOTIFY` advertisements on the multicast group
    ///
    /// Returns a receiver of every light that announces itself. The listener
    /// runs until the receiver is dropped and a further packet arrives.
    pub async fn advertisements(&self) -> Result<mpsc::Receiver<DiscoveredLight>> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, SSDP_PORT))
            .await
            .map_err(|e| YeegoError::Discovery(format!("Failed to bind SSDP monitor: {}", e)))?;
        socket
            .join_multicast_v4(MULTICAST_IP, Ipv4Addr::UNSPECIFIED)
            .map_err(|e| YeegoError::Discovery(format!("Failed to join multicast group: {}", e)))?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            tracing::info!("SSDP monitor started");
            let mut buffer = [0u8; 2048];
            loop {
                let (size, from) = match socket.recv_from(&mut buffer).await {
                    Ok(received) => received,
                    Err(e) => {
                        tracing::error!("SSDP monitor socket error: {}", e);
                        break;
                    }
                };
                let Some(found) = std::str::from_utf8(&buffer[..size])
                    .ok()
                    .and_then(parse_message)
                else {
                    continue;
                };

                tracing::debug!("Advertisement from {} ({})", found.id, from);
                if tx.send(found).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

impl Default for SsdpDiscoverer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Discoverer for SsdpDiscoverer {
    async fn search(&self, duration: Duration, filter: &str) -> Result<Vec<DiscoveredLight>> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|e| YeegoError::Discovery(format!("Failed to bind UDP socket: {}", e)))?;

        socket
            .send_to(self.search_request().as_bytes(), self.target)
            .await
            .map_err(|e| YeegoError::Discovery(format!("Failed to send M-SEARCH: {}", e)))?;

        // Lights may answer more than once; keep the latest answer per id
        let mut found: BTreeMap<DeviceId, DiscoveredLight> = BTreeMap::new();
        let deadline = Instant::now() + duration;
        let mut buffer = [0u8; 2048];

        loop {
            let (size, from) = match timeout_at(deadline, socket.recv_from(&mut buffer)).await {
                Err(_) => break,
                Ok(Ok(received)) => received,
                Ok(Err(e)) => {
                    return Err(YeegoError::Discovery(format!("Socket error: {}", e)));
                }
            };

            match std::str::from_utf8(&buffer[..size]).ok().and_then(parse_message) {
                Some(light) if light.matches(filter) => {
                    tracing::debug!("Search response from {} ({})", light.id, from);
                    found.insert(light.id.clone(), light);
                }
                Some(light) => tracing::debug!("Skipping {} (filtered)", light.id),
                None => tracing::trace!("Ignoring unrecognised packet from {}", from),
            }
        }

        Ok(found.into_values().collect())
    }
}

/// Parse a search response or `NOTIFY` advertisement
///
/// Returns `None` for anything that is not a light description, including
/// other `M-SEARCH` requests seen on the group.
fn parse_message(message: &str) -> Option<DiscoveredLight> {
    let mut lines = message.lines();
    let start = lines.next()?.trim();
    if !(start.starts_with("HTTP/1.1 200") || start.starts_with("NOTIFY")) {
        return None;
    }

    let mut id = None;
    let mut info = LightInfo::default();
    let mut state = LightState::default();

    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        match key.as_str() {
            "id" => id = Some(value.to_string()),
            "location" => {
                info.location = value
                    .strip_prefix(LOCATION_SCHEME)
                    .unwrap_or(value)
                    .to_string();
            }
            "model" => info.model = value.to_string(),
            "fw_ver" => info.fw_ver = value.to_string(),
            "support" => {
                info.support = value.split_whitespace().map(str::to_string).collect();
            }
            other => {
                state.apply_property(other, &Value::from(value));
            }
        }
    }

    let id = id.filter(|id| !id.is_empty())?;
    if info.location.is_empty() {
        return None;
    }

    Some(DiscoveredLight { id, info, state })
}
