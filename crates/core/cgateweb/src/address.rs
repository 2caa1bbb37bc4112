use std::fmt;
use std::str::FromStr;

/// Full scale of a C-Bus level.
pub const LEVEL_ON: u8 = 255;
pub const LEVEL_OFF: u8 = 0;

/// A C-Bus group address: `network/application/group`.
///
/// Each part is kept as the decimal token C-Gate sent, so nothing is lost to
/// number coercion and comparisons stay textual.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupAddress {
    network: String,
    application: String,
    group: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid C-Bus address {input:?}: expected network/application/group")]
    MalformedAddress { input: String },

    #[error("Invalid C-Bus address part {token:?}: expected a decimal number")]
    NonNumericPart { token: String },
}

impl GroupAddress {
    pub fn new(network: &str, application: &str, group: &str) -> Result<GroupAddress, AddressError> {
        for token in [network, application, group] {
            if token.is_empty() || !token.bytes().all(|byte| byte.is_ascii_digit()) {
                return Err(AddressError::NonNumericPart {
                    token: token.to_string(),
                });
            }
        }
        Ok(GroupAddress {
            network: network.to_string(),
            application: application.to_string(),
            group: group.to_string(),
        })
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// The `N/A/G` key used in topics and in the label overlay.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl FromStr for GroupAddress {
    type Err = AddressError;

    fn from_str(input: &str) -> Result<GroupAddress, AddressError> {
        match input.split('/').collect::<Vec<_>>()[..] {
            [network, application, group] => GroupAddress::new(network, application, group),
            _ => Err(AddressError::MalformedAddress {
                input: input.to_string(),
            }),
        }
    }
}

impl fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.network, self.application, self.group)
    }
}

/// The percentage shown on MQTT for a raw C-Bus level.
pub fn percent_from_raw(raw: u8) -> u8 {
    ((raw as f64) * 100.0 / 255.0).round() as u8
}

/// The raw C-Bus level for a percentage, clamped to 0..=100 first.
pub fn raw_from_percent(percent: u8) -> u8 {
    ((percent.min(100) as f64) * 255.0 / 100.0).round() as u8
}

/// Clamp an arithmetic level result back into the raw 0..=255 range.
pub fn clamp_raw(level: i16) -> u8 {
    level.clamp(LEVEL_OFF as i16, LEVEL_ON as i16) as u8
}
