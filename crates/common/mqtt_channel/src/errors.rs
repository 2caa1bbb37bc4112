use rumqttc::ConnAck;
use rumqttc::ConnectReturnCode;
use rumqttc::SubAck;
use rumqttc::SubscribeReasonCode;

/// An MQTT related error
#[derive(thiserror::Error, Debug)]
pub enum MqttError {
    #[error("Invalid topic name: {name:?}")]
    InvalidTopic { name: String },

    #[error("Invalid topic filter: {pattern:?}")]
    InvalidFilter { pattern: String },

    #[error("MQTT client error: {0}")]
    ClientError(#[from] rumqttc::ClientError),

    #[error("MQTT connection error: {0}")]
    ConnectionError(#[from] rumqttc::ConnectionError),

    #[error("MQTT broker refused the connection: bad credentials or not authorized")]
    NotAuthorized,

    #[error("MQTT broker refused the connection: {reason}")]
    ConnectionRefused { reason: String },

    #[error("MQTT broker rejected a subscription")]
    SubscriptionFailure,

    #[error("Invalid UTF8 payload: {from}: {input_excerpt}...")]
    InvalidUtf8Payload {
        input_excerpt: String,
        from: std::str::Utf8Error,
    },

    #[error(
        "The read channel of the connection has been closed and no more messages can be received"
    )]
    ReadOnClosedConnection,

    #[error(
        "The send channel of the connection has been closed and no more messages can be published"
    )]
    SendOnClosedConnection,
}

impl MqttError {
    /// A fatal error cannot be recovered by waiting or reconnecting:
    /// the broker actively refuses this client.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MqttError::NotAuthorized)
    }

    /// Map a broker CONNACK to the error it carries, if any.
    pub fn maybe_connection_error(ack: &ConnAck) -> Option<MqttError> {
        match ack.code {
            ConnectReturnCode::Success => None,
            ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized => {
                Some(MqttError::NotAuthorized)
            }
            code => Some(MqttError::ConnectionRefused {
                reason: format!("{code:?}"),
            }),
        }
    }

    /// Map a broker SUBACK to the error it carries, if any.
    pub fn maybe_subscription_error(ack: &SubAck) -> Option<MqttError> {
        ack.return_codes
            .iter()
            .any(|code| matches!(code, SubscribeReasonCode::Failure))
            .then_some(MqttError::SubscriptionFailure)
    }

    pub fn new_invalid_utf8_payload(bytes: &[u8], from: std::str::Utf8Error) -> MqttError {
        const EXCERPT_LEN: usize = 80;
        let index = from.valid_up_to();
        let input = std::str::from_utf8(&bytes[..index]).unwrap_or("");

        MqttError::InvalidUtf8Payload {
            input_excerpt: MqttError::input_prefix(input, EXCERPT_LEN),
            from,
        }
    }

    fn input_prefix(input: &str, len: usize) -> String {
        input
            .chars()
            .filter(|c| !c.is_whitespace())
            .take(len)
            .collect()
    }
}

impl From<futures::channel::mpsc::SendError> for MqttError {
    fn from(_: futures::channel::mpsc::SendError) -> Self {
        MqttError::SendOnClosedConnection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connack(code: ConnectReturnCode) -> ConnAck {
        ConnAck {
            session_present: false,
            code,
        }
    }

    #[test]
    fn a_successful_connack_is_not_an_error() {
        assert!(MqttError::maybe_connection_error(&connack(ConnectReturnCode::Success)).is_none());
    }

    #[test]
    fn auth_failures_are_fatal() {
        let bad_credentials =
            MqttError::maybe_connection_error(&connack(ConnectReturnCode::BadUserNamePassword))
                .unwrap();
        assert!(bad_credentials.is_fatal());

        let not_authorized =
            MqttError::maybe_connection_error(&connack(ConnectReturnCode::NotAuthorized)).unwrap();
        assert!(not_authorized.is_fatal());
    }

    #[test]
    fn other_refusals_are_not_fatal() {
        let unavailable =
            MqttError::maybe_connection_error(&connack(ConnectReturnCode::ServiceUnavailable))
                .unwrap();
        assert!(!unavailable.is_fatal());
    }

    #[test]
    fn rejected_subscriptions_are_reported() {
        let ack = SubAck {
            pkid: 1,
            return_codes: vec![
                SubscribeReasonCode::Success(rumqttc::QoS::AtMostOnce),
                SubscribeReasonCode::Failure,
            ],
        };
        assert!(MqttError::maybe_subscription_error(&ack).is_some());
    }
}
