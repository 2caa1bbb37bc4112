use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Default location of the bridge configuration.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/cgateweb/cgateweb.toml";

/// The bridge options, frozen at startup.
///
/// Loaded from `cgateweb.toml`, then overridden by environment variables.
/// Every option has a default, so a missing file is not an error; unknown
/// keys are rejected.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// MQTT broker as `host:port`.
    pub mqtt: String,
    pub mqttusername: Option<String>,
    pub mqttpassword: Option<String>,

    /// C-Gate server address.
    pub cbusip: String,
    pub cbuscommandport: u16,
    pub cbuseventport: u16,

    /// The C-Gate project name used on every object path.
    pub cbusname: String,
    pub cgateusername: Option<String>,
    pub cgatepassword: Option<String>,

    /// Minimum delay between dispatches on each outbound queue (ms).
    pub messageinterval: u64,
    pub reconnectinitialdelay: u64,
    pub reconnectmaxdelay: u64,

    /// Publish `cbus/read/...` topics retained.
    pub retainreads: bool,

    /// `N` or `N/A` scope of the bulk level fetch.
    pub getallnetapp: Option<String>,
    pub getallonstart: bool,
    /// Repeat the bulk level fetch every so many seconds.
    pub getallperiod: Option<u64>,

    pub ha_discovery_enabled: bool,
    pub ha_discovery_prefix: String,
    pub ha_discovery_networks: Vec<String>,
    pub ha_discovery_cover_app_id: Option<String>,
    pub ha_discovery_switch_app_id: Option<String>,
    pub ha_discovery_relay_app_id: Option<String>,
    pub ha_discovery_pir_app_id: Option<String>,

    /// Report informational events, not only warnings.
    pub logging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            mqtt: String::from("localhost:1883"),
            mqttusername: None,
            mqttpassword: None,
            cbusip: String::from("127.0.0.1"),
            cbuscommandport: 20023,
            cbuseventport: 20025,
            cbusname: String::from("CLIPSAL"),
            cgateusername: None,
            cgatepassword: None,
            messageinterval: 200,
            reconnectinitialdelay: 1_000,
            reconnectmaxdelay: 60_000,
            retainreads: true,
            getallnetapp: None,
            getallonstart: false,
            getallperiod: None,
            ha_discovery_enabled: false,
            ha_discovery_prefix: String::from("homeassistant"),
            ha_discovery_networks: Vec::new(),
            ha_discovery_cover_app_id: None,
            ha_discovery_switch_app_id: None,
            ha_discovery_relay_app_id: None,
            ha_discovery_pir_app_id: None,
            logging: true,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    FileParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid mqtt address {value:?}: expected host:port")]
    InvalidMqttAddress { value: String },

    #[error("Invalid getallnetapp {value:?}: expected a network or network/application")]
    InvalidNetApp { value: String },

    #[error("{field} must not be zero")]
    ZeroValue { field: &'static str },
}

impl Settings {
    /// Load the settings from `path`, apply environment overrides and
    /// validate the result. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Settings, Vec<SettingsError>> {
        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| {
                vec![SettingsError::FileRead {
                    path: path.display().to_string(),
                    source,
                }]
            })?;
            toml::from_str(&content).map_err(|source| {
                vec![SettingsError::FileParse {
                    path: path.display().to_string(),
                    source,
                }]
            })?
        } else {
            Settings::default()
        };

        settings.apply_env_overrides(std::env::vars());
        settings.validate()?;
        Ok(settings)
    }

    /// Apply the recognized environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self, vars: impl Iterator<Item = (String, String)>) {
        for (key, value) in vars {
            match key.as_str() {
                "MQTT_HOST" => self.mqtt = value,
                "MQTT_USERNAME" => self.mqttusername = Some(value),
                "MQTT_PASSWORD" => self.mqttpassword = Some(value),
                "CGATE_IP" => self.cbusip = value,
                "CGATE_USERNAME" => self.cgateusername = Some(value),
                "CGATE_PASSWORD" => self.cgatepassword = Some(value),
                "CGATE_PROJECT" => self.cbusname = value,
                _ => (),
            }
        }
    }

    /// Check every option the bridge relies on, reporting all problems at once.
    pub fn validate(&self) -> Result<(), Vec<SettingsError>> {
        let mut errors = Vec::new();

        if self.mqtt_host_port().is_none() {
            errors.push(SettingsError::InvalidMqttAddress {
                value: self.mqtt.clone(),
            });
        }
        if self.messageinterval == 0 {
            errors.push(SettingsError::ZeroValue {
                field: "messageinterval",
            });
        }
        if self.reconnectinitialdelay == 0 {
            errors.push(SettingsError::ZeroValue {
                field: "reconnectinitialdelay",
            });
        }
        if let Some(netapp) = &self.getallnetapp {
            if !is_valid_netapp(netapp) {
                errors.push(SettingsError::InvalidNetApp {
                    value: netapp.clone(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The broker address split into host and port.
    pub fn mqtt_host_port(&self) -> Option<(String, u16)> {
        let (host, port) = self.mqtt.rsplit_once(':')?;
        if host.is_empty() {
            return None;
        }
        let port: u16 = port.parse().ok()?;
        Some((host.to_string(), port))
    }

    /// The network part of `getallnetapp`, used as the fallback discovery network.
    pub fn getall_network(&self) -> Option<String> {
        let netapp = self.getallnetapp.as_ref()?;
        let network = netapp.split('/').next()?;
        (!network.is_empty()).then(|| network.to_string())
    }

    pub fn message_interval(&self) -> Duration {
        Duration::from_millis(self.messageinterval)
    }

    pub fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnectinitialdelay)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnectmaxdelay)
    }
}

fn is_valid_netapp(netapp: &str) -> bool {
    let parts: Vec<&str> = netapp.split('/').collect();
    matches!(parts.len(), 1 | 2)
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.bytes().all(|byte| byte.is_ascii_digit()))
}
