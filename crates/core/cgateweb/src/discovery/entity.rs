use crate::address::GroupAddress;
use crate::labels::DeviceKind;
use serde::Serialize;

/// A Home Assistant MQTT-discovery config payload.
///
/// One struct covers the light, cover, switch and binary_sensor components;
/// unused fields stay unserialized so the payload bytes are stable for a
/// given entity.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DiscoveryPayload {
    pub name: String,
    pub unique_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_off: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness_state_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness_command_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness_scale: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_position_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_stop: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_open: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_closed: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,

    pub device: DeviceBlock,
}

/// The device every cgateweb entity is attached to.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeviceBlock {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: String,
}

impl Default for DeviceBlock {
    fn default() -> Self {
        DeviceBlock {
            identifiers: vec!["cgateweb".to_string()],
            name: "cgateweb".to_string(),
            manufacturer: "Clipsal C-Bus via cgateweb".to_string(),
        }
    }
}

/// The discovery unique id of a group.
pub fn unique_id(addr: &GroupAddress) -> String {
    format!(
        "cgateweb_{}_{}_{}",
        addr.network(),
        addr.application(),
        addr.group()
    )
}

/// The retained config topic of an entity.
pub fn config_topic(prefix: &str, component: &str, unique_id: &str) -> String {
    format!("{prefix}/{component}/{unique_id}/config")
}

impl DiscoveryPayload {
    /// Build the config payload announcing `addr` as the given kind.
    pub fn for_group(
        kind: DeviceKind,
        addr: &GroupAddress,
        name: String,
        object_id: Option<String>,
    ) -> DiscoveryPayload {
        let read = |leaf: &str| Some(format!("cbus/read/{addr}/{leaf}"));
        let write = |leaf: &str| Some(format!("cbus/write/{addr}/{leaf}"));

        let mut payload = DiscoveryPayload {
            name,
            unique_id: unique_id(addr),
            object_id,
            state_topic: None,
            command_topic: None,
            payload_on: None,
            payload_off: None,
            brightness_state_topic: None,
            brightness_command_topic: None,
            brightness_scale: None,
            position_topic: None,
            set_position_topic: None,
            payload_stop: None,
            position_open: None,
            position_closed: None,
            device_class: None,
            device: DeviceBlock::default(),
        };

        match kind {
            DeviceKind::Light => {
                payload.state_topic = read("state");
                payload.command_topic = write("switch");
                payload.payload_on = Some("ON".to_string());
                payload.payload_off = Some("OFF".to_string());
                payload.brightness_state_topic = read("level");
                payload.brightness_command_topic = write("ramp");
                payload.brightness_scale = Some(100);
            }
            DeviceKind::Cover => {
                payload.position_topic = read("position");
                payload.set_position_topic = write("position");
                payload.command_topic = write("stop");
                payload.payload_stop = Some("STOP".to_string());
                payload.position_open = Some(100);
                payload.position_closed = Some(0);
                payload.device_class = Some("shutter".to_string());
            }
            DeviceKind::Switch | DeviceKind::Relay => {
                payload.state_topic = read("state");
                payload.command_topic = write("switch");
                payload.payload_on = Some("ON".to_string());
                payload.payload_off = Some("OFF".to_string());
            }
            DeviceKind::Pir => {
                // Read-only: a movement sensor takes no commands
                payload.state_topic = read("state");
                payload.payload_on = Some("ON".to_string());
                payload.payload_off = Some("OFF".to_string());
                payload.device_class = Some("motion".to_string());
            }
        }

        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_include;
    use serde_json::json;

    fn addr(key: &str) -> GroupAddress {
        key.parse().expect("a valid address")
    }

    fn as_json(payload: &DiscoveryPayload) -> serde_json::Value {
        serde_json::to_value(payload).expect("serializable payload")
    }

    #[test]
    fn a_light_announces_switch_and_brightness_topics() {
        let payload = DiscoveryPayload::for_group(
            DeviceKind::Light,
            &addr("254/56/10"),
            "Kitchen".to_string(),
            None,
        );

        assert_json_include!(
            actual: as_json(&payload),
            expected: json!({
                "name": "Kitchen",
                "unique_id": "cgateweb_254_56_10",
                "state_topic": "cbus/read/254/56/10/state",
                "command_topic": "cbus/write/254/56/10/switch",
                "payload_on": "ON",
                "payload_off": "OFF",
                "brightness_state_topic": "cbus/read/254/56/10/level",
                "brightness_command_topic": "cbus/write/254/56/10/ramp",
                "brightness_scale": 100,
            })
        );
    }

    #[test]
    fn a_cover_announces_position_and_stop_topics() {
        let payload = DiscoveryPayload::for_group(
            DeviceKind::Cover,
            &addr("254/203/15"),
            "Blind".to_string(),
            None,
        );

        assert_json_include!(
            actual: as_json(&payload),
            expected: json!({
                "device_class": "shutter",
                "position_topic": "cbus/read/254/203/15/position",
                "set_position_topic": "cbus/write/254/203/15/position",
                "command_topic": "cbus/write/254/203/15/stop",
                "payload_stop": "STOP",
                "position_open": 100,
                "position_closed": 0,
            })
        );
        assert!(payload.state_topic.is_none());
        assert!(payload.brightness_command_topic.is_none());
    }

    #[test]
    fn a_pir_is_a_read_only_motion_sensor() {
        let payload = DiscoveryPayload::for_group(
            DeviceKind::Pir,
            &addr("254/202/3"),
            "Hall PIR".to_string(),
            None,
        );

        assert_eq!(payload.device_class.as_deref(), Some("motion"));
        assert!(payload.command_topic.is_none());
        assert_eq!(
            payload.state_topic.as_deref(),
            Some("cbus/read/254/202/3/state")
        );
    }

    #[test]
    fn an_entity_id_override_becomes_the_object_id() {
        let payload = DiscoveryPayload::for_group(
            DeviceKind::Light,
            &addr("254/56/10"),
            "Kitchen".to_string(),
            Some("kitchen_main".to_string()),
        );
        assert_eq!(payload.object_id.as_deref(), Some("kitchen_main"));
    }

    #[test]
    fn serialization_is_stable_for_a_given_entity() {
        let make = || {
            DiscoveryPayload::for_group(
                DeviceKind::Light,
                &addr("254/56/10"),
                "Kitchen".to_string(),
                None,
            )
        };
        assert_eq!(
            serde_json::to_string(&make()).unwrap(),
            serde_json::to_string(&make()).unwrap()
        );
    }

    #[test]
    fn config_topics_follow_the_discovery_prefix() {
        assert_eq!(
            config_topic("homeassistant", "light", &unique_id(&addr("254/56/10"))),
            "homeassistant/light/cgateweb_254_56_10/config"
        );
    }
}
