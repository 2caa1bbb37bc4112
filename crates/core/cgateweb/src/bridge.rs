use crate::address::clamp_raw;
use crate::address::GroupAddress;
use crate::cgate::command::CommandResponse;
use crate::cgate::command::CommandResponseProcessor;
use crate::cgate::event::parse_event_line;
use crate::cgate::wire::CGateCommand;
use crate::discovery::tree::tree_to_json;
use crate::discovery::HaDiscoveryGenerator;
use crate::labels::LabelOverlay;
use crate::level_bus::LevelBus;
use crate::settings::Settings;
use crate::state::StatePublisher;
use crate::translator::translate;
use crate::translator::BridgeAction;
use cgate_channel::CGateConnection;
use cgate_channel::LinkEvent;
use cgate_channel::LinkKind;
use cgate_channel::ReconnectPolicy;
use futures::StreamExt;
use mqtt_channel::Connection;
use mqtt_channel::Message;
use mqtt_channel::MqttError;
use mqtt_channel::Topic;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use throttler::QueueDriver;
use throttler::ThrottledQueue;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

/// How long a freshly initialized bridge ignores all-connected re-entries.
pub const REINIT_DEBOUNCE: Duration = Duration::from_secs(10);

const HELLO_TOPIC: &str = "hello/cgateweb";

#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Mqtt(#[from] MqttError),

    #[error("MQTT authentication failed")]
    NotAuthorized(#[source] MqttError),

    #[error("The MQTT connection closed unexpectedly")]
    MqttConnectionLost,

    #[error("Invalid MQTT broker address {value:?}")]
    InvalidMqttAddress { value: String },
}

/// The MQTT side of the bridge, as channels.
pub struct MqttEndpoints {
    pub received: mqtt_channel::UnboundedReceiver<Message>,
    pub published: mqtt_channel::UnboundedSender<Message>,
    pub errors: mqtt_channel::UnboundedReceiver<MqttError>,
}

impl From<Connection> for MqttEndpoints {
    fn from(connection: Connection) -> Self {
        MqttEndpoints {
            received: connection.received,
            published: connection.published,
            errors: connection.errors,
        }
    }
}

/// One C-Gate link, as channels.
pub struct LinkEndpoints {
    pub lines: mpsc::UnboundedReceiver<String>,
    pub commands: mpsc::UnboundedSender<String>,
    pub events: mpsc::UnboundedReceiver<LinkEvent>,
}

impl From<CGateConnection> for LinkEndpoints {
    fn from(connection: CGateConnection) -> Self {
        LinkEndpoints {
            lines: connection.lines,
            commands: connection.commands,
            events: connection.events,
        }
    }
}

/// Wires the MQTT session, the two C-Gate links, the throttled queues and
/// the processors; owns readiness and the bridge lifecycle.
pub struct Bridge {
    core: Core,
    mqtt: MqttEndpoints,
    command: LinkEndpoints,
    event: LinkEndpoints,
    labels_rx: mpsc::Receiver<LabelOverlay>,
}

impl Bridge {
    /// Connect to the broker and open both C-Gate links.
    ///
    /// An MQTT authentication refusal surfaces here as a fatal error.
    pub async fn connect(
        settings: Settings,
        overlay: LabelOverlay,
        labels_rx: mpsc::Receiver<LabelOverlay>,
    ) -> Result<Bridge, BridgeError> {
        let (host, port) =
            settings
                .mqtt_host_port()
                .ok_or_else(|| BridgeError::InvalidMqttAddress {
                    value: settings.mqtt.clone(),
                })?;

        let hello = Topic::new_unchecked(HELLO_TOPIC);
        let last_will = Message::new(&hello, "Offline");
        let mut mqtt_config = mqtt_channel::Config::new(host, port)
            .with_session_name("cgateweb")
            .with_subscriptions(vec!["cbus/write/#", "cbus/write/bridge/announce"].try_into()?)
            .with_initial_message(move || Message::new(&hello, "Online"))
            .with_last_will_message(last_will);
        if let (Some(username), Some(password)) = (&settings.mqttusername, &settings.mqttpassword) {
            mqtt_config = mqtt_config.with_credentials(username, password);
        }
        let mqtt = Connection::new(&mqtt_config).await?;

        let reconnect = ReconnectPolicy::new(
            settings.reconnect_initial_delay(),
            settings.reconnect_max_delay(),
        );
        let command = CGateConnection::new(
            &cgate_channel::Config::new(
                settings.cbusip.clone(),
                settings.cbuscommandport,
                LinkKind::Command,
            )
            .with_reconnect(reconnect.clone()),
        );
        let event = CGateConnection::new(
            &cgate_channel::Config::new(
                settings.cbusip.clone(),
                settings.cbuseventport,
                LinkKind::Event,
            )
            .with_reconnect(reconnect),
        );

        Ok(Bridge::new(
            settings,
            overlay,
            mqtt.into(),
            command.into(),
            event.into(),
            labels_rx,
        ))
    }

    /// Wire the bridge around already-established endpoints.
    pub fn new(
        settings: Settings,
        overlay: LabelOverlay,
        mqtt: MqttEndpoints,
        command: LinkEndpoints,
        event: LinkEndpoints,
        labels_rx: mpsc::Receiver<LabelOverlay>,
    ) -> Bridge {
        let level_bus = Arc::new(LevelBus::new());
        let cgate_queue = ThrottledQueue::new();
        let mqtt_queue = ThrottledQueue::new();

        let publisher = StatePublisher::new(
            settings.retainreads,
            settings.ha_discovery_cover_app_id.clone(),
            mqtt_queue.clone(),
            level_bus.clone(),
        );
        let discovery = HaDiscoveryGenerator::from_settings(&settings);

        let core = Core {
            settings,
            cgate_queue,
            mqtt_queue,
            command_sender: command.commands.clone(),
            publisher,
            processor: CommandResponseProcessor::new(),
            discovery,
            level_bus,
            overlay: Arc::new(overlay),
            // The MQTT handshake completed before the bridge was built
            readiness: Readiness::new(true),
        };

        Bridge {
            core,
            mqtt,
            command,
            event,
            labels_rx,
        }
    }

    /// Run the bridge until `shutdown` resolves or a fatal error occurs.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), BridgeError> {
        let Bridge {
            mut core,
            mut mqtt,
            mut command,
            mut event,
            mut labels_rx,
        } = self;

        // The queue drivers pace everything going out
        let interval = core.settings.message_interval();
        let command_sender = command.commands.clone();
        let cgate_driver = tokio::spawn(
            QueueDriver::new(core.cgate_queue.clone(), interval, move |line| {
                command_sender.send(line)
            })
            .run(),
        );
        let published = mqtt.published.clone();
        let mqtt_driver = tokio::spawn(
            QueueDriver::new(core.mqtt_queue.clone(), interval, move |message| {
                published.unbounded_send(message)
            })
            .run(),
        );

        let mut getall: Option<Interval> = None;
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break Ok(());
                }

                message = mqtt.received.next() => match message {
                    Some(message) => core.handle_mqtt_message(message),
                    None => break Err(BridgeError::MqttConnectionLost),
                },

                Some(err) = mqtt.errors.next() => {
                    if err.is_fatal() {
                        error!("Fatal MQTT error: {err}");
                        break Err(BridgeError::NotAuthorized(err));
                    }
                    warn!("MQTT error: {err}");
                }

                Some(line) = command.lines.recv() => core.handle_command_line(&line),
                Some(link_event) = command.events.recv() => {
                    core.handle_link_event(LinkKind::Command, link_event, &mut getall);
                }

                Some(line) = event.lines.recv() => core.handle_event_line(&line),
                Some(link_event) = event.events.recv() => {
                    core.handle_link_event(LinkKind::Event, link_event, &mut getall);
                }

                Some(overlay) = labels_rx.recv() => core.handle_labels_changed(overlay),

                _ = next_getall(&mut getall) => core.enqueue_getall(),
            }
        };

        core.shutdown();
        cgate_driver.abort();
        mqtt_driver.abort();
        result
    }
}

/// Everything the event loop dispatches into.
struct Core {
    settings: Settings,
    cgate_queue: ThrottledQueue<String>,
    mqtt_queue: ThrottledQueue<Message>,
    command_sender: mpsc::UnboundedSender<String>,
    publisher: StatePublisher,
    processor: CommandResponseProcessor,
    discovery: Option<HaDiscoveryGenerator>,
    level_bus: Arc<LevelBus>,
    overlay: Arc<LabelOverlay>,
    readiness: Readiness,
}

impl Core {
    fn handle_mqtt_message(&mut self, message: Message) {
        match translate(&message) {
            Ok(actions) => {
                for action in actions {
                    self.execute(action);
                }
            }
            Err(err) => warn!("Dropping message on {}: {err}", message.topic.name),
        }
    }

    fn execute(&mut self, action: BridgeAction) {
        match action {
            BridgeAction::Send(command) => self.send(command),
            BridgeAction::RampAfterLevel { addr, delta } => self.arm_ramp_after_level(addr, delta),
            BridgeAction::HaltRamp(addr) => self.halt_ramp(addr),
            BridgeAction::TriggerDiscovery => self.trigger_discovery(),
        }
    }

    fn send(&self, command: CGateCommand) {
        self.cgate_queue.add(command.to_line(&self.settings.cbusname));
    }

    /// Ramp relative to the next level C-Gate reports for the group.
    fn arm_ramp_after_level(&self, addr: GroupAddress, delta: i16) {
        let receiver = self.level_bus.subscribe_once(&addr);
        let queue = self.cgate_queue.clone();
        let project = self.settings.cbusname.clone();
        tokio::spawn(async move {
            // An orphaned subscription resolves to an error and ends here
            if let Ok(raw) = receiver.await {
                let target = clamp_raw(raw as i16 + delta);
                let ramp = CGateCommand::Ramp {
                    addr,
                    raw: target,
                    time: None,
                };
                queue.add(ramp.to_line(&project));
            }
        });
    }

    /// Best-effort stop: re-target the ramp at the current level.
    fn halt_ramp(&mut self, addr: GroupAddress) {
        match self.publisher.last_level(&addr) {
            Some(raw) => self.send(CGateCommand::Ramp {
                addr,
                raw,
                time: None,
            }),
            None => {
                // Never seen a level for this group: ask for one first
                self.send(CGateCommand::GetLevel(addr.clone()));
                self.arm_ramp_after_level(addr, 0);
            }
        }
    }

    fn trigger_discovery(&mut self) {
        match &self.discovery {
            Some(discovery) => {
                let requests = discovery.tree_requests();
                for request in requests {
                    self.send(request);
                }
            }
            None => debug!("HA discovery is disabled, ignoring the trigger"),
        }
    }

    fn handle_command_line(&mut self, line: &str) {
        match self.processor.process_line(line) {
            Some(CommandResponse::LevelUpdate { addr, raw }) => {
                self.publisher.level_changed(&addr, raw)
            }
            Some(CommandResponse::GroupEvent(update)) => self.publisher.group_changed(&update),
            Some(CommandResponse::TreeComplete { network, xml }) => {
                self.handle_tree(&network, &xml)
            }
            None => (),
        }
    }

    fn handle_tree(&mut self, network: &str, xml: &str) {
        match tree_to_json(xml) {
            Ok(root) => {
                let topic = Topic::new_unchecked(&format!("cbus/read/{network}///tree"));
                self.mqtt_queue
                    .add(Message::new(&topic, root.to_string()).with_retain());

                if let Some(discovery) = &mut self.discovery {
                    // One overlay snapshot for the whole pass
                    let overlay = self.overlay.clone();
                    for message in discovery.messages_from_tree(network, &root, &overlay) {
                        self.mqtt_queue.add(message);
                    }
                }
            }
            Err(err) => error!("Discarding the TREEXML reply for network {network}: {err}"),
        }
    }

    fn handle_event_line(&mut self, line: &str) {
        match parse_event_line(line) {
            Ok(Some(update)) => self.publisher.group_changed(&update),
            Ok(None) => (),
            Err(err) => warn!("Dropping event line {line:?}: {err}"),
        }
    }

    fn handle_link_event(&mut self, kind: LinkKind, event: LinkEvent, getall: &mut Option<Interval>) {
        match event {
            LinkEvent::Connected => {
                self.readiness.set_link(kind, true);

                if kind == LinkKind::Command {
                    if let (Some(username), Some(password)) =
                        (&self.settings.cgateusername, &self.settings.cgatepassword)
                    {
                        // Authenticate ahead of anything already queued
                        let login = CGateCommand::Login {
                            username: username.clone(),
                            password: password.clone(),
                        };
                        let _ = self.command_sender.send(login.to_line(&self.settings.cbusname));
                    }
                }
                if kind == LinkKind::Event {
                    self.send(CGateCommand::EventOn);
                }

                if self.readiness.should_init(Instant::now()) {
                    self.on_all_connected(getall);
                }
            }
            LinkEvent::Closed { had_error } => {
                warn!("C-Gate {kind} link lost (error: {had_error})");
                self.readiness.set_link(kind, false);
            }
        }
    }

    fn on_all_connected(&mut self, getall: &mut Option<Interval>) {
        info!("MQTT and both C-Gate links are up");

        if self.settings.getallonstart {
            self.enqueue_getall();
        }
        if let Some(seconds) = self.settings.getallperiod {
            let period = Duration::from_secs(seconds);
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Replaces any interval from a previous initialization
            *getall = Some(interval);
        }
        self.trigger_discovery();
    }

    fn enqueue_getall(&self) {
        if let Some(netapp) = &self.settings.getallnetapp {
            self.send(CGateCommand::GetAllLevels {
                netapp: netapp.clone(),
            });
        }
    }

    fn handle_labels_changed(&mut self, overlay: LabelOverlay) {
        info!("Label overlay reloaded");
        self.overlay = Arc::new(overlay);
        self.trigger_discovery();
    }

    fn shutdown(&mut self) {
        let dropped = self.cgate_queue.clear() + self.mqtt_queue.clear();
        if dropped > 0 {
            info!("Dropped {dropped} queued messages on shutdown");
        }
    }
}

async fn next_getall(getall: &mut Option<Interval>) {
    match getall {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Tracks which of the three connections are up, and debounces the
/// all-connected initialization.
#[derive(Debug)]
struct Readiness {
    mqtt: bool,
    command: bool,
    event: bool,
    last_init: Option<Instant>,
}

impl Readiness {
    fn new(mqtt: bool) -> Readiness {
        Readiness {
            mqtt,
            command: false,
            event: false,
            last_init: None,
        }
    }

    fn set_link(&mut self, kind: LinkKind, connected: bool) {
        match kind {
            LinkKind::Command => self.command = connected,
            LinkKind::Event => self.event = connected,
        }
    }

    fn all_connected(&self) -> bool {
        self.mqtt && self.command && self.event
    }

    /// True when entering all-connected outside the debounce window;
    /// records the initialization time.
    fn should_init(&mut self, now: Instant) -> bool {
        if !self.all_connected() {
            return false;
        }
        match self.last_init {
            Some(last) if now.duration_since(last) < REINIT_DEBOUNCE => false,
            _ => {
                self.last_init = Some(now);
                true
            }
        }
    }
}
