use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Light identifier as advertised by the device (e.g. `0x000000000015243f`)
pub type DeviceId = String;

/// Per-connection request identifier
pub type RequestId = u32;

/// Structured error reported by a device in reply to a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceErrorPayload {
    pub code: i64,
    pub message: String,
}

/// Mutable property bag of a light
///
/// Filled from discovery headers and kept current by `props` notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightState {
    pub name: String,
    pub power: bool,

    /// Brightness percentage (1-100)
    pub bright: u8,

    /// 1 = RGB, 2 = colour temperature, 3 = HSV
    pub color_mode: u8,

    /// Colour temperature in Kelvin
    pub ct: u32,

    /// Packed 0xRRGGBB value
    pub rgb: u32,

    pub hue: u16,
    pub sat: u8,
}

impl LightState {
    /// Apply a single named property, returning whether it was recognised
    ///
    /// Devices send numbers both as JSON numbers and as decimal strings.
    pub fn apply_property(&mut self, key: &str, value: &Value) -> bool {
        match key {
            "name" => {
                self.name = value_as_string(value);
            }
            "power" => {
                self.power = value_as_string(value) == "on";
            }
            "bright" => match value_as_u64(value) {
                Some(v) => self.bright = v.min(100) as u8,
                None => return false,
            },
            "color_mode" => match value_as_u64(value) {
                Some(v) => self.color_mode = v.min(u8::MAX as u64) as u8,
                None => return false,
            },
            "ct" => match value_as_u64(value) {
                Some(v) => self.ct = v.min(u32::MAX as u64) as u32,
                None => return false,
            },
            "rgb" => match value_as_u64(value) {
                Some(v) => self.rgb = (v & 0xFF_FF_FF) as u32,
                None => return false,
            },
            "hue" => match value_as_u64(value) {
                Some(v) => self.hue = v.min(359) as u16,
                None => return false,
            },
            "sat" => match value_as_u64(value) {
                Some(v) => self.sat = v.min(100) as u8,
                None => return false,
            },
            _ => return false,
        }
        true
    }

    /// Apply every recognised entry of a `props` notification
    pub fn apply_props(&mut self, params: &serde_json::Map<String, Value>) {
        for (key, value) in params {
            if !self.apply_property(key, value) {
                tracing::trace!("Ignoring property {}={}", key, value);
            }
        }
    }
}

fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Static description of a light, refreshed on every rediscovery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightInfo {
    /// `host:port` of the device's control socket
    pub location: String,
    pub model: String,
    pub fw_ver: String,

    /// Methods the device accepts
    #[serde(default)]
    pub support: Vec<String>,
}

/// A light as reported by one discovery response or advertisement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLight {
    pub id: DeviceId,
    pub info: LightInfo,
    pub state: LightState,
}

impl DiscoveredLight {
    /// Whether this light matches a discovery filter
    ///
    /// An empty filter matches everything; otherwise the id, model or name
    /// must contain the filter, ignoring case.
    pub fn matches(&self, filter: &str) -> bool {
        let filter = filter.trim().to_lowercase();
        if filter.is_empty() {
            return true;
        }
        [&self.id, &self.info.model, &self.state.name]
            .iter()
            .any(|field| field.to_lowercase().contains(&filter))
    }
}

/// Transition used by commands that accept an effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    duration_ms: u32,
}

/// Shortest smooth transition a device accepts
const MIN_SMOOTH_MS: u32 = 30;

impl Transition {
    /// Instant change
    pub const SUDDEN: Transition = Transition { duration_ms: 0 };

    /// Build a transition; 0 is instant, anything else is a smooth change of at least 30 ms
    pub fn from_millis(duration_ms: u32) -> Self {
        if duration_ms == 0 {
            Self::SUDDEN
        } else {
            Self {
                duration_ms: duration_ms.max(MIN_SMOOTH_MS),
            }
        }
    }

    /// Effect name as expected on the wire
    pub fn effect(&self) -> &'static str {
        if self.duration_ms == 0 {
            "sudden"
        } else {
            "smooth"
        }
    }

    pub fn duration_ms(&self) -> u32 {
        self.duration_ms
    }

    /// The `effect, duration` pair appended to command params
    pub fn params(&self) -> [Value; 2] {
        [Value::from(self.effect()), Value::from(self.duration_ms)]
    }
}

impl Default for Transition {
    fn default() -> Self {
        Self::SUDDEN
    }
}
