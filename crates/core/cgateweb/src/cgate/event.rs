use crate::address::AddressError;
use crate::address::GroupAddress;
use crate::address::LEVEL_OFF;
use crate::address::LEVEL_ON;

/// A logical state change reported for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupUpdate {
    pub addr: GroupAddress,
    pub action: GroupAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupAction {
    On,
    Off,
    /// Ramping towards the given raw target level.
    Ramp(u8),
}

impl GroupUpdate {
    /// The raw level this update settles the group at.
    pub fn raw_level(&self) -> u8 {
        match self.action {
            GroupAction::On => LEVEL_ON,
            GroupAction::Off => LEVEL_OFF,
            GroupAction::Ramp(level) => level,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum EventParseError {
    #[error("Unsupported device type {device:?}")]
    UnsupportedDevice { device: String },

    #[error("Unknown action {action:?}")]
    UnknownAction { action: String },

    #[error("Missing {field} in event line")]
    MissingField { field: &'static str },

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("Invalid ramp level {value:?}")]
    InvalidLevel { value: String },
}

/// Parse one event-port line.
///
/// Comments (and blank lines) yield `Ok(None)`. Lines for devices other
/// than lighting, or with an unparsable shape, are errors the caller is
/// expected to log and drop.
pub fn parse_event_line(line: &str) -> Result<Option<GroupUpdate>, EventParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut tokens = line.split_whitespace();
    let device = tokens.next().ok_or(EventParseError::MissingField {
        field: "device type",
    })?;
    if device != "lighting" {
        return Err(EventParseError::UnsupportedDevice {
            device: device.to_string(),
        });
    }

    let action = tokens
        .next()
        .ok_or(EventParseError::MissingField { field: "action" })?;
    let addr: GroupAddress = tokens
        .next()
        .ok_or(EventParseError::MissingField { field: "address" })?
        .parse()?;

    let action = match action {
        "on" => GroupAction::On,
        "off" => GroupAction::Off,
        "ramp" => {
            let value = tokens
                .next()
                .ok_or(EventParseError::MissingField { field: "ramp level" })?;
            let level = value.parse().map_err(|_| EventParseError::InvalidLevel {
                value: value.to_string(),
            })?;
            GroupAction::Ramp(level)
        }
        other => {
            return Err(EventParseError::UnknownAction {
                action: other.to_string(),
            })
        }
    };

    Ok(Some(GroupUpdate { addr, action }))
}
