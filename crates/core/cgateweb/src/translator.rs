use crate::address::raw_from_percent;
use crate::address::AddressError;
use crate::address::GroupAddress;
use crate::cgate::wire::CGateCommand;
use mqtt_channel::Message;

/// Relative step applied by an INCREASE/DECREASE ramp, in raw level units.
pub const RAMP_STEP: i16 = 26;

/// What the bridge must do in response to one inbound MQTT message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeAction {
    /// Queue a command towards C-Gate.
    Send(CGateCommand),

    /// Once the next level report for `addr` arrives, ramp to
    /// `level + delta` (clamped to the raw range).
    RampAfterLevel { addr: GroupAddress, delta: i16 },

    /// Stop a running ramp by re-targeting it at the current level.
    HaltRamp(GroupAddress),

    /// Re-announce every known group through Home Assistant discovery.
    TriggerDiscovery,
}

/// A parsed `cbus/write/...` topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTopic {
    Switch(GroupAddress),
    Ramp(GroupAddress),
    Position(GroupAddress),
    Stop(GroupAddress),
    GetAll { netapp: String },
    GetTree { network: String },
    Announce,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TranslateError {
    #[error("Not a cbus write topic: {topic}")]
    NotAWriteTopic { topic: String },

    #[error("Unknown command {command:?} on topic {topic}")]
    UnknownCommand { command: String, topic: String },

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("Invalid payload {payload:?} for a {command} command")]
    InvalidPayload {
        command: &'static str,
        payload: String,
    },

    #[error("Non UTF-8 payload on topic {topic}")]
    NonUtf8Payload { topic: String },
}

impl WriteTopic {
    /// Parse a subscribed topic name.
    pub fn parse(topic: &str) -> Result<WriteTopic, TranslateError> {
        if topic == "cbus/write/bridge/announce" {
            return Ok(WriteTopic::Announce);
        }

        let reject = || TranslateError::NotAWriteTopic {
            topic: topic.to_string(),
        };

        let parts: Vec<&str> = topic.split('/').collect();
        let [prefix, channel, network, application, group, command] = parts[..] else {
            return Err(reject());
        };
        if prefix != "cbus" || channel != "write" {
            return Err(reject());
        }

        match command {
            "switch" => Ok(WriteTopic::Switch(GroupAddress::new(
                network,
                application,
                group,
            )?)),
            "ramp" => Ok(WriteTopic::Ramp(GroupAddress::new(
                network,
                application,
                group,
            )?)),
            "position" => Ok(WriteTopic::Position(GroupAddress::new(
                network,
                application,
                group,
            )?)),
            "stop" => Ok(WriteTopic::Stop(GroupAddress::new(
                network,
                application,
                group,
            )?)),
            // The group part is irrelevant for a bulk fetch and may be empty
            "getall" => {
                numeric(network)?;
                numeric(application)?;
                Ok(WriteTopic::GetAll {
                    netapp: format!("{network}/{application}"),
                })
            }
            "gettree" => {
                numeric(network)?;
                Ok(WriteTopic::GetTree {
                    network: network.to_string(),
                })
            }
            other => Err(TranslateError::UnknownCommand {
                command: other.to_string(),
                topic: topic.to_string(),
            }),
        }
    }
}

fn numeric(token: &str) -> Result<(), AddressError> {
    if token.is_empty() || !token.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(AddressError::NonNumericPart {
            token: token.to_string(),
        });
    }
    Ok(())
}

/// Translate one inbound MQTT message into the actions it requires.
///
/// Unknown commands and invalid payloads are errors; the caller logs and
/// drops them.
pub fn translate(message: &Message) -> Result<Vec<BridgeAction>, TranslateError> {
    let topic = message.topic.name.as_str();
    let write = WriteTopic::parse(topic)?;
    let payload = message
        .payload_str()
        .map_err(|_| TranslateError::NonUtf8Payload {
            topic: topic.to_string(),
        })?
        .trim();

    match write {
        WriteTopic::Switch(addr) => match payload {
            "ON" => Ok(vec![BridgeAction::Send(CGateCommand::TurnOn(addr))]),
            "OFF" => Ok(vec![BridgeAction::Send(CGateCommand::TurnOff(addr))]),
            other => Err(invalid("switch", other)),
        },

        WriteTopic::Ramp(addr) => match payload {
            "ON" => Ok(vec![BridgeAction::Send(CGateCommand::TurnOn(addr))]),
            "OFF" => Ok(vec![BridgeAction::Send(CGateCommand::TurnOff(addr))]),
            "INCREASE" => Ok(vec![
                BridgeAction::Send(CGateCommand::GetLevel(addr.clone())),
                BridgeAction::RampAfterLevel {
                    addr,
                    delta: RAMP_STEP,
                },
            ]),
            "DECREASE" => Ok(vec![
                BridgeAction::Send(CGateCommand::GetLevel(addr.clone())),
                BridgeAction::RampAfterLevel {
                    addr,
                    delta: -RAMP_STEP,
                },
            ]),
            other => {
                let (raw, time) = parse_ramp_payload(other)?;
                Ok(vec![BridgeAction::Send(CGateCommand::Ramp {
                    addr,
                    raw,
                    time,
                })])
            }
        },

        WriteTopic::Position(addr) => {
            let raw = parse_percent(payload).ok_or_else(|| invalid("position", payload))?;
            Ok(vec![BridgeAction::Send(CGateCommand::Ramp {
                addr,
                raw,
                time: None,
            })])
        }

        WriteTopic::Stop(addr) => match payload {
            "STOP" => Ok(vec![BridgeAction::HaltRamp(addr)]),
            other => Err(invalid("stop", other)),
        },

        // The payload is ignored for queries
        WriteTopic::GetAll { netapp } => {
            Ok(vec![BridgeAction::Send(CGateCommand::GetAllLevels {
                netapp,
            })])
        }
        WriteTopic::GetTree { network } => {
            Ok(vec![BridgeAction::Send(CGateCommand::TreeXml { network })])
        }
        WriteTopic::Announce => Ok(vec![BridgeAction::TriggerDiscovery]),
    }
}

fn invalid(command: &'static str, payload: &str) -> TranslateError {
    TranslateError::InvalidPayload {
        command,
        payload: payload.to_string(),
    }
}

/// `<pct>` or `<pct>,<time>`, the percentage clamped into 0..=100.
fn parse_ramp_payload(payload: &str) -> Result<(u8, Option<String>), TranslateError> {
    let (percent, time) = match payload.split_once(',') {
        None => (payload, None),
        Some((percent, time)) => {
            let time = time.trim();
            if time.is_empty() {
                return Err(invalid("ramp", payload));
            }
            (percent, Some(time.to_string()))
        }
    };

    let raw = parse_percent(percent.trim()).ok_or_else(|| invalid("ramp", payload))?;
    Ok((raw, time))
}

fn parse_percent(input: &str) -> Option<u8> {
    let percent: i64 = input.parse().ok()?;
    Some(raw_from_percent(percent.clamp(0, 100) as u8))
}
