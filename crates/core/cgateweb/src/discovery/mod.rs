//! Home Assistant MQTT discovery, driven off parsed TREEXML plus the label
//! overlay.

pub mod entity;
pub mod tree;

use crate::address::GroupAddress;
use crate::cgate::wire::CGateCommand;
use crate::labels::DeviceKind;
use crate::labels::LabelOverlay;
use crate::settings::Settings;
use self::entity::config_topic;
use self::entity::unique_id;
use self::entity::DiscoveryPayload;
use mqtt_channel::Message;
use mqtt_channel::Topic;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tracing::info;
use tracing::warn;

/// The fixed C-Bus lighting application id.
pub const LIGHTING_APP_ID: &str = "56";

/// Generates the retained Home Assistant discovery configs for the groups
/// found in a network tree.
///
/// The generator remembers which config topics it announced so that a
/// later pass can invalidate the ones that became stale (excluded groups,
/// type overrides moving an entity to another component).
pub struct HaDiscoveryGenerator {
    prefix: String,
    networks: Vec<String>,
    cover_app_id: Option<String>,
    switch_app_id: Option<String>,
    relay_app_id: Option<String>,
    pir_app_id: Option<String>,
    known_configs: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct PassStats {
    entities: usize,
    custom_labels: usize,
    tree_labels: usize,
    fallback_names: usize,
}

impl HaDiscoveryGenerator {
    /// Build the generator, unless discovery is disabled or no network is
    /// configured to walk.
    pub fn from_settings(settings: &Settings) -> Option<HaDiscoveryGenerator> {
        if !settings.ha_discovery_enabled {
            return None;
        }

        let networks = if settings.ha_discovery_networks.is_empty() {
            settings.getall_network().into_iter().collect()
        } else {
            settings.ha_discovery_networks.clone()
        };
        if networks.is_empty() {
            warn!("HA discovery is enabled but no discovery network is configured");
            return None;
        }

        Some(HaDiscoveryGenerator {
            prefix: settings.ha_discovery_prefix.clone(),
            networks,
            cover_app_id: settings.ha_discovery_cover_app_id.clone(),
            switch_app_id: settings.ha_discovery_switch_app_id.clone(),
            relay_app_id: settings.ha_discovery_relay_app_id.clone(),
            pir_app_id: settings.ha_discovery_pir_app_id.clone(),
            known_configs: HashMap::new(),
        })
    }

    /// The TREEXML requests that start a discovery pass.
    pub fn tree_requests(&self) -> Vec<CGateCommand> {
        self.networks
            .iter()
            .map(|network| CGateCommand::TreeXml {
                network: network.clone(),
            })
            .collect()
    }

    /// Walk one parsed tree and produce the retained config messages.
    ///
    /// The caller passes the overlay snapshot taken at the start of the
    /// pass, so a reload during the walk cannot mix two overlays.
    pub fn messages_from_tree(
        &mut self,
        network: &str,
        root: &Value,
        overlay: &LabelOverlay,
    ) -> Vec<Message> {
        let started = Instant::now();
        let mut messages = Vec::new();
        let mut stats = PassStats::default();

        let Some(node) = tree::resolve_network_node(root, network) else {
            warn!("No node for network {network} in the TREEXML reply, skipping discovery");
            return messages;
        };

        let target_apps = self.target_apps();
        let unit_groups = tree::collect_unit_groups(node, &target_apps);

        let mut seen = Vec::new();
        for unit_group in &unit_groups {
            seen.push(format!(
                "{network}/{}/{}",
                unit_group.app_id, unit_group.group
            ));
            self.synthesize(
                network,
                &unit_group.app_id,
                &unit_group.group,
                unit_group.label.as_deref(),
                overlay,
                &mut messages,
                &mut stats,
            );
        }

        // The flat tree shape omits groups not bound to a physical unit;
        // labelled lighting groups are still controllable, so announce them.
        for key in overlay.labels.keys() {
            let Some((group_network, group)) = parse_lighting_key(key) else {
                continue;
            };
            if group_network != network || seen.iter().any(|s| s == key) {
                continue;
            }
            self.synthesize(
                network,
                LIGHTING_APP_ID,
                group,
                None,
                overlay,
                &mut messages,
                &mut stats,
            );
        }

        info!(
            "HA discovery for network {network}: {} entities ({} custom labels, {} tree labels, {} fallback names) in {}ms",
            stats.entities,
            stats.custom_labels,
            stats.tree_labels,
            stats.fallback_names,
            started.elapsed().as_millis()
        );

        messages
    }

    #[allow(clippy::too_many_arguments)]
    fn synthesize(
        &mut self,
        network: &str,
        app_id: &str,
        group: &str,
        tree_label: Option<&str>,
        overlay: &LabelOverlay,
        messages: &mut Vec<Message>,
        stats: &mut PassStats,
    ) {
        let Ok(addr) = GroupAddress::new(network, app_id, group) else {
            warn!("Skipping non-numeric group {network}/{app_id}/{group} found in the tree");
            return;
        };
        let key = addr.key();
        let uid = unique_id(&addr);

        if overlay.is_excluded(&key) {
            // Invalidate a previously announced config exactly once
            if let Some(stale_topic) = self.known_configs.remove(&uid) {
                messages.push(empty_config(&stale_topic));
            }
            return;
        }

        let default_kind = self.kind_for_app(app_id);
        let kind = overlay.resolved_override(&key).unwrap_or(default_kind);

        let name = if let Some(label) = overlay.label_for(&key) {
            stats.custom_labels += 1;
            label.to_string()
        } else if let Some(label) = tree_label {
            stats.tree_labels += 1;
            label.to_string()
        } else {
            stats.fallback_names += 1;
            format!("CBus {} {key}", kind.type_name())
        };

        let object_id = overlay.entity_id_for(&key).map(String::from);
        let payload = DiscoveryPayload::for_group(kind, &addr, name, object_id);
        let topic = config_topic(&self.prefix, kind.component(), &uid);

        // An override that moves the entity to another component leaves a
        // stale config behind on the default component's topic.
        if kind.component() != default_kind.component() {
            messages.push(empty_config(&config_topic(
                &self.prefix,
                default_kind.component(),
                &uid,
            )));
        }
        if let Some(previous) = self.known_configs.insert(uid, topic.clone()) {
            if previous != topic {
                messages.push(empty_config(&previous));
            }
        }

        let config = serde_json::to_string(&payload).unwrap_or_default();
        messages.push(Message::new(&Topic::new_unchecked(&topic), config).with_retain());
        stats.entities += 1;
    }

    fn kind_for_app(&self, app_id: &str) -> DeviceKind {
        let matches = |configured: &Option<String>| configured.as_deref() == Some(app_id);
        if matches(&self.cover_app_id) {
            DeviceKind::Cover
        } else if matches(&self.switch_app_id) {
            DeviceKind::Switch
        } else if matches(&self.relay_app_id) {
            DeviceKind::Relay
        } else if matches(&self.pir_app_id) {
            DeviceKind::Pir
        } else {
            DeviceKind::Light
        }
    }

    /// Lighting plus every configured special application, de-duplicated.
    fn target_apps(&self) -> Vec<String> {
        let mut apps = vec![LIGHTING_APP_ID.to_string()];
        for configured in [
            &self.cover_app_id,
            &self.switch_app_id,
            &self.relay_app_id,
            &self.pir_app_id,
        ]
        .into_iter()
        .flatten()
        {
            if !apps.contains(configured) {
                apps.push(configured.clone());
            }
        }
        apps
    }
}

fn empty_config(topic: &str) -> Message {
    Message::new(&Topic::new_unchecked(topic), "").with_retain()
}

/// Split an overlay key of the lighting application into network and group.
fn parse_lighting_key(key: &str) -> Option<(&str, &str)> {
    match key.split('/').collect::<Vec<_>>()[..] {
        [network, app, group] if app == LIGHTING_APP_ID => Some((network, group)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn discovery_settings() -> Settings {
        Settings {
            ha_discovery_enabled: true,
            ha_discovery_networks: vec!["254".to_string()],
            ha_discovery_cover_app_id: Some("203".to_string()),
            ..Settings::default()
        }
    }

    fn generator() -> HaDiscoveryGenerator {
        HaDiscoveryGenerator::from_settings(&discovery_settings()).expect("discovery enabled")
    }

    fn sample_tree() -> Value {
        json!({
            "Network": {
                "NetworkNumber": "254",
                "Unit": [
                    {
                        "Application": {
                            "ApplicationAddress": "56",
                            "Group": [
                                {"GroupAddress": "10", "Label": "Kitchen"},
                                {"GroupAddress": "11", "Label": "Living"},
                                {"GroupAddress": "12", "Label": "Bedroom"}
                            ]
                        }
                    },
                    {
                        "Application": {
                            "ApplicationAddress": "203",
                            "Group": [
                                {"GroupAddress": "15"},
                                {"GroupAddress": "16"},
                                {"GroupAddress": "17"},
                                {"GroupAddress": "20"}
                            ]
                        }
                    }
                ]
            }
        })
    }

    fn topics(messages: &[Message]) -> Vec<&str> {
        messages
            .iter()
            .map(|message| message.topic.name.as_str())
            .collect()
    }

    fn payload_json(message: &Message) -> Value {
        serde_json::from_str(message.payload_str().expect("utf8")).expect("json payload")
    }

    #[test]
    fn discovery_requires_an_enabled_flag_and_a_network() {
        assert!(HaDiscoveryGenerator::from_settings(&Settings::default()).is_none());

        let no_network = Settings {
            ha_discovery_enabled: true,
            ..Settings::default()
        };
        assert!(HaDiscoveryGenerator::from_settings(&no_network).is_none());

        let from_getall = Settings {
            ha_discovery_enabled: true,
            getallnetapp: Some("254/56".to_string()),
            ..Settings::default()
        };
        let generator = HaDiscoveryGenerator::from_settings(&from_getall).expect("generator");
        assert_eq!(
            generator.tree_requests(),
            vec![CGateCommand::TreeXml {
                network: "254".to_string()
            }]
        );
    }

    #[test]
    fn a_structured_tree_yields_lights_and_covers() {
        let mut generator = generator();
        let messages =
            generator.messages_from_tree("254", &sample_tree(), &LabelOverlay::default());

        assert_eq!(
            topics(&messages),
            vec![
                "homeassistant/light/cgateweb_254_56_10/config",
                "homeassistant/light/cgateweb_254_56_11/config",
                "homeassistant/light/cgateweb_254_56_12/config",
                "homeassistant/cover/cgateweb_254_203_15/config",
                "homeassistant/cover/cgateweb_254_203_16/config",
                "homeassistant/cover/cgateweb_254_203_17/config",
                "homeassistant/cover/cgateweb_254_203_20/config",
            ]
        );
        assert!(messages.iter().all(|message| message.retain));

        let kitchen = payload_json(&messages[0]);
        assert_eq!(kitchen["name"], json!("Kitchen"));

        let cover = payload_json(&messages[3]);
        assert_eq!(cover["device_class"], json!("shutter"));
        assert_eq!(
            cover["position_topic"],
            json!("cbus/read/254/203/15/position")
        );
    }

    #[test]
    fn discovery_is_idempotent_for_the_same_tree_and_overlay() {
        let mut generator = generator();
        let overlay = LabelOverlay::default();

        let first = generator.messages_from_tree("254", &sample_tree(), &overlay);
        let second = generator.messages_from_tree("254", &sample_tree(), &overlay);

        assert_eq!(first, second);
    }

    #[test]
    fn excluded_groups_are_skipped_and_stale_configs_cleared_once() {
        let mut generator = generator();
        let first_pass =
            generator.messages_from_tree("254", &sample_tree(), &LabelOverlay::default());
        assert_eq!(first_pass.len(), 7);

        let overlay = LabelOverlay {
            exclude: ["254/56/11".to_string()].into(),
            ..LabelOverlay::default()
        };

        let second_pass = generator.messages_from_tree("254", &sample_tree(), &overlay);
        let clears: Vec<&Message> = second_pass
            .iter()
            .filter(|message| message.payload.is_empty())
            .collect();
        assert_eq!(clears.len(), 1);
        assert_eq!(
            clears[0].topic.name,
            "homeassistant/light/cgateweb_254_56_11/config"
        );
        assert!(clears[0].retain);

        // The clear happens exactly once
        let third_pass = generator.messages_from_tree("254", &sample_tree(), &overlay);
        assert!(third_pass.iter().all(|message| !message.payload.is_empty()));
        assert!(!topics(&third_pass)
            .iter()
            .any(|topic| topic.contains("cgateweb_254_56_11")));
    }

    #[test]
    fn a_type_override_moves_the_entity_and_clears_the_default_topic() {
        let mut generator = generator();
        let overlay = LabelOverlay {
            labels: [("254/56/10".to_string(), "Kitchen Blind".to_string())].into(),
            type_overrides: [("254/56/10".to_string(), "cover".to_string())].into(),
            exclude: ["254/56/11".to_string()].into(),
            ..LabelOverlay::default()
        };

        let messages = generator.messages_from_tree("254", &sample_tree(), &overlay);

        // The stale light config is emptied, the cover config is published
        let empty_light = messages
            .iter()
            .find(|message| message.topic.name == "homeassistant/light/cgateweb_254_56_10/config")
            .expect("a stale-clear for the default component");
        assert!(empty_light.payload.is_empty());

        let cover = messages
            .iter()
            .find(|message| message.topic.name == "homeassistant/cover/cgateweb_254_56_10/config")
            .expect("the overridden cover config");
        let payload = payload_json(cover);
        assert_eq!(payload["name"], json!("Kitchen Blind"));
        assert_eq!(payload["device_class"], json!("shutter"));

        // The excluded group appears nowhere
        assert!(!topics(&messages)
            .iter()
            .any(|topic| topic.contains("cgateweb_254_56_11")));
    }

    #[test]
    fn labelled_groups_missing_from_the_tree_are_supplemented() {
        let mut generator = generator();
        let overlay = LabelOverlay {
            labels: [
                ("254/56/40".to_string(), "Garden".to_string()),
                ("253/56/1".to_string(), "Other network".to_string()),
                ("254/203/40".to_string(), "Not lighting".to_string()),
            ]
            .into(),
            ..LabelOverlay::default()
        };

        let messages = generator.messages_from_tree("254", &sample_tree(), &overlay);
        let garden = messages
            .iter()
            .find(|message| message.topic.name == "homeassistant/light/cgateweb_254_56_40/config")
            .expect("the supplemented light");
        assert_eq!(payload_json(garden)["name"], json!("Garden"));

        // Neither the other network's group nor the non-lighting key appear
        assert!(!topics(&messages).iter().any(|t| t.contains("253")));
        assert!(!topics(&messages)
            .iter()
            .any(|t| t.contains("cgateweb_254_203_40")));
    }

    #[test]
    fn groups_without_any_label_get_a_fallback_name() {
        let mut generator = generator();
        let messages =
            generator.messages_from_tree("254", &sample_tree(), &LabelOverlay::default());

        let cover = payload_json(&messages[3]);
        assert_eq!(cover["name"], json!("CBus Cover 254/203/15"));
    }

    #[test]
    fn an_unresolvable_network_yields_no_messages() {
        let mut generator = generator();
        let tree = json!({"Network": {"NetworkNumber": "9"}});
        assert!(generator
            .messages_from_tree("254", &tree, &LabelOverlay::default())
            .is_empty());
    }
}
