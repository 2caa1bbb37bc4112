use cgate_channel::LinkEvent;
use cgateweb::bridge::Bridge;
use cgateweb::bridge::BridgeError;
use cgateweb::bridge::LinkEndpoints;
use cgateweb::bridge::MqttEndpoints;
use cgateweb::labels::LabelOverlay;
use cgateweb::settings::Settings;
use futures::channel::mpsc as mqtt_mpsc;
use mqtt_channel::Message;
use mqtt_channel::MqttError;
use mqtt_channel::Topic;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const TIMEOUT: Duration = Duration::from_secs(5);

/// A bridge wired to in-memory endpoints: the test plays the broker and
/// both C-Gate ports.
struct TestBridge {
    mqtt_in: mqtt_mpsc::UnboundedSender<Message>,
    mqtt_out: mqtt_mpsc::UnboundedReceiver<Message>,
    #[allow(dead_code)]
    mqtt_errors: mqtt_mpsc::UnboundedSender<MqttError>,
    command_lines: mpsc::UnboundedSender<String>,
    command_out: mpsc::UnboundedReceiver<String>,
    command_events: mpsc::UnboundedSender<LinkEvent>,
    event_lines: mpsc::UnboundedSender<String>,
    event_events: mpsc::UnboundedSender<LinkEvent>,
    #[allow(dead_code)]
    shutdown: oneshot::Sender<()>,
    #[allow(dead_code)]
    handle: JoinHandle<Result<(), BridgeError>>,
}

fn bridge_settings() -> Settings {
    Settings {
        cbusname: "HOME".to_string(),
        messageinterval: 1,
        ..Settings::default()
    }
}

fn start_bridge(settings: Settings) -> TestBridge {
    let (mqtt_in, received) = mqtt_mpsc::unbounded();
    let (published, mqtt_out) = mqtt_mpsc::unbounded();
    let (mqtt_errors, errors) = mqtt_mpsc::unbounded();

    let (command_lines, lines) = mpsc::unbounded_channel();
    let (commands, command_out) = mpsc::unbounded_channel();
    let (command_events, events) = mpsc::unbounded_channel();
    let command = LinkEndpoints {
        lines,
        commands,
        events,
    };

    let (event_lines, lines) = mpsc::unbounded_channel();
    let (event_commands, _event_out) = mpsc::unbounded_channel();
    let (event_events, events) = mpsc::unbounded_channel();
    let event = LinkEndpoints {
        lines,
        commands: event_commands,
        events,
    };

    let mqtt = MqttEndpoints {
        received,
        published,
        errors,
    };

    let (_labels_tx, labels_rx) = mpsc::channel(1);
    let bridge = Bridge::new(
        settings,
        LabelOverlay::default(),
        mqtt,
        command,
        event,
        labels_rx,
    );

    let (shutdown, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(bridge.run(async {
        let _ = shutdown_rx.await;
    }));

    TestBridge {
        mqtt_in,
        mqtt_out,
        mqtt_errors,
        command_lines,
        command_out,
        command_events,
        event_lines,
        event_events,
        shutdown,
        handle,
    }
}

impl TestBridge {
    fn connect_links(&self) {
        self.command_events
            .send(LinkEvent::Connected)
            .expect("bridge alive");
        self.event_events
            .send(LinkEvent::Connected)
            .expect("bridge alive");
    }

    fn publish(&self, topic: &str, payload: &str) {
        let message = Message::new(&Topic::new_unchecked(topic), payload);
        self.mqtt_in.unbounded_send(message).expect("bridge alive");
    }

    async fn next_command(&mut self) -> String {
        timeout(TIMEOUT, self.command_out.recv())
            .await
            .expect("no C-Gate command within timeout")
            .expect("bridge alive")
    }

    async fn next_mqtt(&mut self) -> Message {
        use futures::StreamExt;
        timeout(TIMEOUT, self.mqtt_out.next())
            .await
            .expect("no MQTT message within timeout")
            .expect("bridge alive")
    }
}

#[tokio::test]
async fn the_event_link_coming_up_enables_events() {
    let mut bridge = start_bridge(bridge_settings());
    bridge.connect_links();

    assert_eq!(bridge.next_command().await, "EVENT ON\n");
}

#[tokio::test]
async fn a_switch_on_message_becomes_a_single_cgate_command() {
    let mut bridge = start_bridge(bridge_settings());
    bridge.connect_links();
    assert_eq!(bridge.next_command().await, "EVENT ON\n");

    bridge.publish("cbus/write/254/56/10/switch", "ON");
    assert_eq!(bridge.next_command().await, "ON //HOME/254/56/10\n");
}

#[tokio::test]
async fn a_timed_ramp_scales_the_percentage() {
    let mut bridge = start_bridge(bridge_settings());
    bridge.connect_links();
    assert_eq!(bridge.next_command().await, "EVENT ON\n");

    bridge.publish("cbus/write/254/56/11/ramp", "75,4s");
    assert_eq!(bridge.next_command().await, "RAMP //HOME/254/56/11 191 4s\n");
}

#[tokio::test]
async fn increase_ramps_relative_to_the_reported_level() {
    let mut bridge = start_bridge(bridge_settings());
    bridge.connect_links();
    assert_eq!(bridge.next_command().await, "EVENT ON\n");

    bridge.publish("cbus/write/254/56/14/ramp", "INCREASE");
    assert_eq!(bridge.next_command().await, "GET //HOME/254/56/14 level\n");

    bridge
        .command_lines
        .send("300 //HOME/254/56/14 level=100".to_string())
        .expect("bridge alive");

    assert_eq!(bridge.next_command().await, "RAMP //HOME/254/56/14 126\n");
}

#[tokio::test]
async fn an_event_ramp_publishes_retained_state_and_level() {
    let mut bridge = start_bridge(bridge_settings());
    bridge.connect_links();

    bridge
        .event_lines
        .send("lighting ramp 254/56/7 128".to_string())
        .expect("bridge alive");

    let state = bridge.next_mqtt().await;
    assert_eq!(state.topic.name, "cbus/read/254/56/7/state");
    assert_eq!(state.payload_str().unwrap(), "ON");
    assert!(state.retain);

    let level = bridge.next_mqtt().await;
    assert_eq!(level.topic.name, "cbus/read/254/56/7/level");
    assert_eq!(level.payload_str().unwrap(), "50");
    assert!(level.retain);
}

#[tokio::test]
async fn event_port_comments_are_ignored() {
    let mut bridge = start_bridge(bridge_settings());
    bridge.connect_links();

    bridge
        .event_lines
        .send("# comment from cgate".to_string())
        .expect("bridge alive");
    bridge
        .event_lines
        .send("lighting off 254/56/7".to_string())
        .expect("bridge alive");

    let state = bridge.next_mqtt().await;
    assert_eq!(state.payload_str().unwrap(), "OFF");
}

#[tokio::test]
async fn getall_on_start_fetches_every_level_once_connected() {
    let settings = Settings {
        getallnetapp: Some("254/56".to_string()),
        getallonstart: true,
        ..bridge_settings()
    };
    let mut bridge = start_bridge(settings);
    bridge.connect_links();

    assert_eq!(bridge.next_command().await, "EVENT ON\n");
    assert_eq!(bridge.next_command().await, "GET //HOME/254/56/* level\n");
}

#[tokio::test]
async fn a_tree_reply_publishes_the_tree_and_discovery_configs() {
    let settings = Settings {
        ha_discovery_enabled: true,
        ha_discovery_networks: vec!["254".to_string()],
        ..bridge_settings()
    };
    let mut bridge = start_bridge(settings);
    bridge.connect_links();

    assert_eq!(bridge.next_command().await, "EVENT ON\n");
    // The all-connected initialization requests the tree
    assert_eq!(bridge.next_command().await, "TREEXML 254\n");

    for line in [
        "343-254",
        "347-<Network><NetworkNumber>254</NetworkNumber>",
        "347-<Unit><Application><ApplicationAddress>56</ApplicationAddress>",
        "347-<Group><GroupAddress>10</GroupAddress><Label>Kitchen</Label></Group>",
        "347-</Application></Unit></Network>",
        "344-254",
    ] {
        bridge
            .command_lines
            .send(line.to_string())
            .expect("bridge alive");
    }

    let tree = bridge.next_mqtt().await;
    assert_eq!(tree.topic.name, "cbus/read/254///tree");
    assert!(tree.retain);
    let parsed: serde_json::Value = serde_json::from_str(tree.payload_str().unwrap()).unwrap();
    assert_eq!(parsed["Network"]["NetworkNumber"], "254");

    let config = bridge.next_mqtt().await;
    assert_eq!(
        config.topic.name,
        "homeassistant/light/cgateweb_254_56_10/config"
    );
    assert!(config.retain);
    let payload: serde_json::Value = serde_json::from_str(config.payload_str().unwrap()).unwrap();
    assert_eq!(payload["name"], "Kitchen");
}

#[tokio::test]
async fn the_bridge_announce_topic_retriggers_discovery() {
    let settings = Settings {
        ha_discovery_enabled: true,
        ha_discovery_networks: vec!["254".to_string()],
        ..bridge_settings()
    };
    let mut bridge = start_bridge(settings);
    bridge.connect_links();

    assert_eq!(bridge.next_command().await, "EVENT ON\n");
    assert_eq!(bridge.next_command().await, "TREEXML 254\n");

    bridge.publish("cbus/write/bridge/announce", "");
    assert_eq!(bridge.next_command().await, "TREEXML 254\n");
}

#[tokio::test]
async fn invalid_messages_are_dropped_without_side_effects() {
    let mut bridge = start_bridge(bridge_settings());
    bridge.connect_links();
    assert_eq!(bridge.next_command().await, "EVENT ON\n");

    bridge.publish("cbus/write/254/56/10/switch", "MAYBE");
    bridge.publish("cbus/write/254/56/10/blink", "ON");
    bridge.publish("cbus/write/254/56/10/switch", "OFF");

    // Only the valid command reaches C-Gate
    assert_eq!(bridge.next_command().await, "OFF //HOME/254/56/10\n");
}
