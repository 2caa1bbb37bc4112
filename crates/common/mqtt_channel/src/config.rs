use crate::Message;
use crate::TopicFilter;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::sync::Arc;

/// Configuration of an MQTT connection
#[derive(Debug, Clone)]
pub struct Config {
    /// The struct containing all the necessary properties to connect to a broker.
    pub broker: BrokerConfig,

    /// The session name to be used on connect
    ///
    /// If no session name is provided, a random one will be created on connect,
    /// and the session will be clean on connect.
    ///
    /// Default: None
    pub session_name: Option<String>,

    /// The list of topics to subscribe to on connect
    ///
    /// Default: An empty topic list
    pub subscriptions: TopicFilter,

    /// Clean the MQTT session upon connect if set to `true`.
    ///
    /// Default: `false`.
    pub clean_session: bool,

    /// Capacity of the internal message queues
    ///
    /// Default: `1024`.
    pub queue_capacity: usize,

    /// LastWill message for the client
    ///
    /// Default: None
    pub last_will_message: Option<Message>,

    /// A message published on each (re)connection.
    ///
    /// Default: None
    pub initial_message: Option<InitMessageFn>,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// MQTT host to connect to
    ///
    /// Default: "localhost"
    pub host: String,

    /// MQTT port to connect to
    ///
    /// Default: 1883
    pub port: u16,

    /// Optional username/password authentication
    ///
    /// Default: None
    pub credentials: Option<Credentials>,
}

/// Username/password passed through to the broker.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Clone)]
pub struct InitMessageFn {
    initfn: Arc<dyn Fn() -> Message + Send + Sync>,
}

impl InitMessageFn {
    pub fn new(call_back: impl Fn() -> Message + Sync + Send + 'static) -> InitMessageFn {
        InitMessageFn {
            initfn: Arc::new(call_back),
        }
    }

    pub fn new_init_message(&self) -> Message {
        (*self.initfn)()
    }
}

impl Debug for InitMessageFn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Init message creation function")
    }
}

/// By default a client connects the local MQTT broker.
impl Default for Config {
    fn default() -> Self {
        Config {
            broker: BrokerConfig {
                host: String::from("localhost"),
                port: 1883,
                credentials: None,
            },
            session_name: None,
            subscriptions: TopicFilter::empty(),
            clean_session: false,
            queue_capacity: 1024,
            last_will_message: None,
            initial_message: None,
        }
    }
}

impl Config {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Config::default().with_host(host).with_port(port)
    }

    /// Set a custom host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.broker.host = host.into();
        self
    }

    /// Set a custom port
    pub fn with_port(mut self, port: u16) -> Self {
        self.broker.port = port;
        self
    }

    /// Authenticate with the given username and password
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.broker.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Set the session name
    pub fn with_session_name(self, name: impl Into<String>) -> Self {
        Self {
            session_name: Some(name.into()),
            ..self
        }
    }

    /// Add a list of topics to subscribe to on connect
    ///
    /// Can be called several times to subscribe to many topics.
    pub fn with_subscriptions(mut self, topics: TopicFilter) -> Self {
        self.subscriptions.add_all(topics);
        self
    }

    /// Set the clean_session flag
    pub fn with_clean_session(self, flag: bool) -> Self {
        Self {
            clean_session: flag,
            ..self
        }
    }

    /// Set the queue capacity
    pub fn with_queue_capacity(self, queue_capacity: usize) -> Self {
        Self {
            queue_capacity,
            ..self
        }
    }

    /// Set the last will message, published when the connection is closed.
    pub fn with_last_will_message(self, lwm: Message) -> Self {
        Self {
            last_will_message: Some(lwm),
            ..self
        }
    }

    /// Set the initial message, published on each (re)connection.
    pub fn with_initial_message(
        self,
        initial_message: impl Fn() -> Message + Send + Sync + 'static,
    ) -> Self {
        Self {
            initial_message: Some(InitMessageFn::new(initial_message)),
            ..self
        }
    }

    /// Wrap this config into an internal set of options for `rumqttc`.
    pub fn rumqttc_options(&self) -> rumqttc::MqttOptions {
        let id = match &self.session_name {
            None => std::iter::repeat_with(fastrand::lowercase)
                .take(10)
                .collect(),
            Some(name) => name.clone(),
        };

        let broker = &self.broker;
        let mut mqtt_options = rumqttc::MqttOptions::new(id, &broker.host, broker.port);

        if self.session_name.is_none() {
            // There is no point to have a session with a random name that will not be reused.
            mqtt_options.set_clean_session(true);
        } else {
            mqtt_options.set_clean_session(self.clean_session);
        }

        if let Some(credentials) = &broker.credentials {
            mqtt_options.set_credentials(credentials.username.clone(), credentials.password.clone());
        }

        if let Some(lwm) = &self.last_will_message {
            let last_will = rumqttc::LastWill::new(
                lwm.topic.name.clone(),
                lwm.payload.clone(),
                lwm.qos,
                lwm.retain,
            );
            mqtt_options.set_last_will(last_will);
        }

        mqtt_options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Topic;

    #[test]
    fn a_named_session_is_not_clean_by_default() {
        let config = Config::new("localhost", 1883).with_session_name("cgateweb");
        let options = config.rumqttc_options();

        assert_eq!(options.client_id(), "cgateweb");
        assert!(!options.clean_session());
    }

    #[test]
    fn an_anonymous_session_is_always_clean() {
        let config = Config::new("localhost", 1883);
        let options = config.rumqttc_options();

        assert_eq!(options.client_id().len(), 10);
        assert!(options.clean_session());
    }

    #[test]
    fn credentials_are_passed_through() {
        let config = Config::new("broker.local", 1883).with_credentials("user", "pass");
        let options = config.rumqttc_options();

        assert_eq!(
            options.credentials(),
            Some(rumqttc::Login::new("user", "pass"))
        );
    }

    #[test]
    fn credentials_never_leak_in_debug_output() {
        let config = Config::new("broker.local", 1883).with_credentials("user", "secret");
        let debugged = format!("{config:?}");

        assert!(debugged.contains("user"));
        assert!(!debugged.contains("secret"));
    }

    #[test]
    fn the_last_will_is_registered() {
        let hello = Topic::new("hello/cgateweb").unwrap();
        let config =
            Config::new("localhost", 1883).with_last_will_message(Message::new(&hello, "Offline"));
        let options = config.rumqttc_options();

        let last_will = options.last_will().expect("a last will");
        assert_eq!(last_will.topic, "hello/cgateweb");
    }
}
