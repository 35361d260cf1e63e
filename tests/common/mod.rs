//! Shared mocks for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use yeego::{
    Connection, Connector, DiscoveredLight, Discoverer, EventSender, Light, LightInfo, LightState,
    Result, YeegoError,
};

/// How a mock light answers commands
#[derive(Debug, Clone)]
pub enum Behavior {
    /// `{"id":N,"result":["ok"]}` straight away
    ReplyOk,
    /// `{"id":N,"result":["ok"]}` after a delay
    ReplyOkAfter(Duration),
    /// `{"id":N,"error":{...}}`
    ReplyError { code: i64, message: String },
    /// Never answers
    Silent,
}

/// Observations of one mock light
#[derive(Clone, Default)]
pub struct MockDevice {
    requests: Arc<Mutex<Vec<Value>>>,
    writer: Arc<tokio::sync::Mutex<Option<tokio::io::WriteHalf<DuplexStream>>>>,
}

impl MockDevice {
    /// Every request received so far
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Write a raw line to the connection, as the device would
    pub async fn push_line(&self, line: &str) {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().expect("device is closed");
        writer.write_all(line.as_bytes()).await.unwrap();
        writer.write_all(b"\r\n").await.unwrap();
    }

    /// Close the device side of the connection
    pub async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }
}

/// Run a mock light on `stream`
pub fn spawn_device(stream: DuplexStream, behavior: Behavior) -> MockDevice {
    let (read_half, write_half) = tokio::io::split(stream);
    let device = MockDevice {
        requests: Arc::default(),
        writer: Arc::new(tokio::sync::Mutex::new(Some(write_half))),
    };

    let task_device = device.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let request: Value = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(_) => continue,
            };
            task_device.requests.lock().unwrap().push(request.clone());

            let id = request["id"].clone();
            let reply = match &behavior {
                Behavior::Silent => continue,
                Behavior::ReplyOk | Behavior::ReplyOkAfter(_) => json!({"id": id, "result": ["ok"]}),
                Behavior::ReplyError { code, message } => {
                    json!({"id": id, "error": {"code": code, "message": message}})
                }
            };

            let delay = match &behavior {
                Behavior::ReplyOkAfter(delay) => Some(*delay),
                _ => None,
            };
            let replier = task_device.clone();
            tokio::spawn(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                let mut writer = replier.writer.lock().await;
                if let Some(writer) = writer.as_mut() {
                    let _ = writer.write_all(format!("{}\r\n", reply).as_bytes()).await;
                }
            });
        }
    });

    device
}

/// Connector that hands out in-memory links to mock lights
#[derive(Clone, Default)]
pub struct MockConnector {
    behaviors: Arc<Mutex<HashMap<String, Behavior>>>,
    devices: Arc<Mutex<HashMap<String, MockDevice>>>,
    connects: Arc<Mutex<HashMap<String, usize>>>,
    refuse: Arc<Mutex<Vec<String>>>,
    connect_delay: Arc<Mutex<Duration>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(self, id: &str, behavior: Behavior) -> Self {
        self.behaviors.lock().unwrap().insert(id.to_string(), behavior);
        self
    }

    /// Make connection attempts to `id` fail
    pub fn refusing(self, id: &str) -> Self {
        self.refuse.lock().unwrap().push(id.to_string());
        self
    }

    /// Stall every later connection attempt for `delay`
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = delay;
    }

    pub fn device(&self, id: &str) -> Option<MockDevice> {
        self.devices.lock().unwrap().get(id).cloned()
    }

    pub fn connect_count(&self, id: &str) -> usize {
        self.connects.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, light: &Light, events: EventSender) -> Result<Connection> {
        let id = light.id().to_string();
        *self.connects.lock().unwrap().entry(id.clone()).or_default() += 1;

        let delay = *self.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.refuse.lock().unwrap().contains(&id) {
            return Err(YeegoError::Connect(format!("{} refused", id)));
        }

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or(Behavior::ReplyOk);

        let (client, server) = tokio::io::duplex(8192);
        let device = spawn_device(server, behavior);
        self.devices.lock().unwrap().insert(id.clone(), device);

        Ok(Connection::spawn(client, id, light.state_handle(), events))
    }
}

/// Discoverer returning a configurable list of lights
#[derive(Clone, Default)]
pub struct MockDiscoverer {
    lights: Arc<Mutex<Vec<DiscoveredLight>>>,
    fail: Arc<AtomicBool>,
    searches: Arc<AtomicUsize>,
}

impl MockDiscoverer {
    pub fn new(lights: Vec<DiscoveredLight>) -> Self {
        Self {
            lights: Arc::new(Mutex::new(lights)),
            ..Default::default()
        }
    }

    pub fn set_lights(&self, lights: Vec<DiscoveredLight>) {
        *self.lights.lock().unwrap() = lights;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Discoverer for MockDiscoverer {
    async fn search(&self, _duration: Duration, filter: &str) -> Result<Vec<DiscoveredLight>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(YeegoError::Discovery("network unreachable".to_string()));
        }
        Ok(self
            .lights
            .lock()
            .unwrap()
            .iter()
            .filter(|light| light.matches(filter))
            .cloned()
            .collect())
    }
}

/// A discovered light with the given id and name
pub fn found(id: &str, name: &str) -> DiscoveredLight {
    DiscoveredLight {
        id: id.to_string(),
        info: LightInfo {
            location: format!("10.0.0.{}:55443", id.len()),
            model: "color".to_string(),
            fw_ver: "18".to_string(),
            support: vec!["toggle".to_string(), "set_bright".to_string()],
        },
        state: LightState {
            name: name.to_string(),
            power: true,
            bright: 50,
            ..Default::default()
        },
    }
}

/// Poll `condition` until it holds or a second has passed
pub async fn eventually<F: FnMut() -> bool>(mut condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
