use crate::error::{Result, YeegoError};
use crate::registry::Registry;
use crate::types::{DeviceId, Transition};
use serde_json::Value;
use std::time::Duration;

/// How long a command waits for its reply by default
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

const INVALID_VALUE: &str = "invalid value";
const INVALID_COMMAND: &str = "invalid command";

/// A validated command, ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Toggle,
    Brightness { value: u8, transition: Transition },
    Name(String),
    Power { on: bool, transition: Transition },
    ColorTemperature { kelvin: u32, transition: Transition },
    Rgb { rgb: u32, transition: Transition },
}

impl Command {
    /// Parse a command name and value as they appear in a URL
    ///
    /// Known names are `brightness`, `setname`, `power`, `ct` and `rgb`.
    pub fn parse(command: &str, value: &str, transition: Transition) -> Result<Self> {
        match command {
            "brightness" => Self::brightness(value, transition),
            "setname" => Self::name(value),
            "power" => Self::power(value, transition),
            "ct" => Self::color_temperature(value, transition),
            "rgb" => Self::rgb(value, transition),
            _ => Err(YeegoError::InvalidParameter(INVALID_COMMAND.to_string())),
        }
    }

    /// Brightness percentage, 1 to 100
    pub fn brightness(value: &str, transition: Transition) -> Result<Self> {
        let value: i64 = value.trim().parse().map_err(|_| invalid_value())?;
        if !(1..=100).contains(&value) {
            return Err(invalid_value());
        }
        Ok(Command::Brightness {
            value: value as u8,
            transition,
        })
    }

    pub fn name(value: &str) -> Result<Self> {
        let name = value.trim();
        if name.is_empty() {
            return Err(invalid_value());
        }
        Ok(Command::Name(name.to_string()))
    }

    /// `on` or `off`
    pub fn power(value: &str, transition: Transition) -> Result<Self> {
        let on = match value.trim().to_ascii_lowercase().as_str() {
            "on" => true,
            "off" => false,
            _ => return Err(invalid_value()),
        };
        Ok(Command::Power { on, transition })
    }

    /// Colour temperature in Kelvin, 1700 to 6500
    pub fn color_temperature(value: &str, transition: Transition) -> Result<Self> {
        let kelvin: u32 = value.trim().parse().map_err(|_| invalid_value())?;
        if !(1700..=6500).contains(&kelvin) {
            return Err(invalid_value());
        }
        Ok(Command::ColorTemperature { kelvin, transition })
    }

    /// Six hex digits, `RRGGBB`, optionally prefixed with `0x` or `#`
    pub fn rgb(value: &str, transition: Transition) -> Result<Self> {
        let hex = value.trim();
        let hex = hex
            .strip_prefix("0x")
            .or_else(|| hex.strip_prefix('#'))
            .unwrap_or(hex);
        if hex.len() != 6 {
            return Err(invalid_value());
        }
        let rgb = u32::from_str_radix(hex, 16).map_err(|_| invalid_value())?;
        Ok(Command::Rgb { rgb, transition })
    }

    /// Method name on the wire
    pub fn method(&self) -> &'static str {
        match self {
            Command::Toggle => "toggle",
            Command::Brightness { .. } => "set_bright",
            Command::Name(_) => "set_name",
            Command::Power { .. } => "set_power",
            Command::ColorTemperature { .. } => "set_ct_abx",
            Command::Rgb { .. } => "set_rgb",
        }
    }

    pub fn params(&self) -> Vec<Value> {
        let with_transition = |first: Value, transition: &Transition| {
            let [effect, duration] = transition.params();
            vec![first, effect, duration]
        };

        match self {
            Command::Toggle => vec![],
            Command::Brightness { value, transition } => with_transition(Value::from(*value), transition),
            Command::Name(name) => vec![Value::from(name.as_str())],
            Command::Power { on, transition } => {
                with_transition(Value::from(if *on { "on" } else { "off" }), transition)
            }
            Command::ColorTemperature { kelvin, transition } => with_transition(Value::from(*kelvin), transition),
            Command::Rgb { rgb, transition } => with_transition(Value::from(*rgb), transition),
        }
    }
}

fn invalid_value() -> YeegoError {
    YeegoError::InvalidParameter(INVALID_VALUE.to_string())
}

/// Synchronous-looking command API over the registry
///
/// Each call validates its input, sends one command with a fresh request id
/// and waits up to the command timeout for the matching reply. On success
/// the light's id is returned.
#[derive(Clone)]
pub struct LightController {
    registry: Registry,
    timeout: Duration,
}

impl LightController {
    pub fn new(registry: Registry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn toggle(&self, id: &str) -> Result<DeviceId> {
        self.send(id, Command::Toggle).await
    }

    pub async fn set_brightness(&self, id: &str, value: &str, duration_ms: u32) -> Result<DeviceId> {
        let command = Command::brightness(value, Transition::from_millis(duration_ms))?;
        self.send(id, command).await
    }

    /// Rename a light
    ///
    /// The device applies names without a transition, `duration_ms` is not sent.
    pub async fn set_name(&self, id: &str, name: &str, _duration_ms: u32) -> Result<DeviceId> {
        let command = Command::name(name)?;
        self.send(id, command).await
    }

    pub async fn set_power(&self, id: &str, value: &str, duration_ms: u32) -> Result<DeviceId> {
        let command = Command::power(value, Transition::from_millis(duration_ms))?;
        self.send(id, command).await
    }

    pub async fn set_color_temperature(&self, id: &str, value: &str, duration_ms: u32) -> Result<DeviceId> {
        let command = Command::color_temperature(value, Transition::from_millis(duration_ms))?;
        self.send(id, command).await
    }

    pub async fn set_rgb(&self, id: &str, value: &str, duration_ms: u32) -> Result<DeviceId> {
        let command = Command::rgb(value, Transition::from_millis(duration_ms))?;
        self.send(id, command).await
    }

    /// Run a command named in a URL
    pub async fn execute(&self, id: &str, command: &str, value: &str, duration_ms: u32) -> Result<DeviceId> {
        let command = Command::parse(command, value, Transition::from_millis(duration_ms))?;
        self.send(id, command).await
    }

    /// Send an already validated command and wait for its reply
    pub async fn send(&self, id: &str, command: Command) -> Result<DeviceId> {
        let light = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| YeegoError::NotFound(id.to_string()))?;

        let conn = light
            .connection()
            .await
            .ok_or_else(|| YeegoError::Transport(format!("light {} is not connected", id)))?;

        let pending = conn
            .send_command(command.method(), command.params())
            .await
            .map_err(|e| match e {
                YeegoError::Transport(_) => e,
                other => YeegoError::Transport(other.to_string()),
            })?;
        let request_id = pending.id();

        match pending.wait(self.timeout).await {
            Ok(_) => Ok(light.id().to_string()),
            Err(YeegoError::Timeout) => {
                tracing::warn!("Timeout waiting for reply {} from {}", request_id, id);
                Err(YeegoError::Timeout)
            }
            Err(YeegoError::Device(error)) => {
                tracing::warn!("Error received from {}: {} ({})", id, error.message, error.code);
                Err(YeegoError::Device(error))
            }
            Err(YeegoError::ConnectionClosed) => Err(YeegoError::Transport(format!(
                "connection to {} closed while waiting for reply",
                id
            ))),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn brightness_rejects_out_of_range_and_garbage() {
        for value in ["-1", "abc", "0", "101", ""] {
            let result = Command::brightness(value, Transition::SUDDEN);
            assert!(
                matches!(result, Err(YeegoError::InvalidParameter(ref msg)) if msg == "invalid value"),
                "{value} should be rejected"
            );
        }
        assert_eq!(
            Command::brightness("50", Transition::SUDDEN).unwrap().params(),
            vec![json!(50), json!("sudden"), json!(0)]
        );
    }

    #[test]
    fn parse_maps_url_names() {
        let smooth = Transition::from_millis(500);
        assert_eq!(Command::parse("setname", "Desk", smooth).unwrap(), Command::Name("Desk".to_string()));
        assert_eq!(
            Command::parse("power", "OFF", smooth).unwrap().params(),
            vec![json!("off"), json!("smooth"), json!(500)]
        );
        assert_eq!(Command::parse("ct", "2700", smooth).unwrap().method(), "set_ct_abx");
        assert!(Command::parse("ct", "9000", smooth).is_err());
        assert_eq!(
            Command::parse("rgb", "#ff8800", smooth).unwrap(),
            Command::Rgb { rgb: 0xFF8800, transition: smooth }
        );
        assert!(Command::parse("rgb", "fff", smooth).is_err());
        assert!(matches!(
            Command::parse("blink", "1", smooth),
            Err(YeegoError::InvalidParameter(ref msg)) if msg == "invalid command"
        ));
    }

    #[test]
    fn name_has_no_transition() {
        assert_eq!(Command::name(" Porch ").unwrap().params(), vec![json!("Porch")]);
        assert!(Command::name("   ").is_err());
    }

    #[tokio::test]
    async fn unknown_light_is_not_found() {
        let controller = LightController::new(Registry::new(), DEFAULT_COMMAND_TIMEOUT);
        assert!(matches!(controller.toggle("missing").await, Err(YeegoError::NotFound(_))));
    }
}
