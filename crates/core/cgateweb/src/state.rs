use crate::address::percent_from_raw;
use crate::address::GroupAddress;
use crate::cgate::event::GroupUpdate;
use crate::level_bus::LevelBus;
use mqtt_channel::Message;
use mqtt_channel::Topic;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use throttler::ThrottledQueue;

/// Latest known state of one group, kept only in memory: the retained MQTT
/// messages are the durable copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupState {
    pub level: u8,
    pub logical: LogicalState,
    pub last_seen: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalState {
    On,
    Off,
}

/// Publishes the retained `cbus/read/...` topics for every state change and
/// feeds the internal level bus.
pub struct StatePublisher {
    retain_reads: bool,
    cover_app_id: Option<String>,
    queue: ThrottledQueue<Message>,
    level_bus: Arc<LevelBus>,
    states: HashMap<GroupAddress, GroupState>,
}

impl StatePublisher {
    pub fn new(
        retain_reads: bool,
        cover_app_id: Option<String>,
        queue: ThrottledQueue<Message>,
        level_bus: Arc<LevelBus>,
    ) -> StatePublisher {
        StatePublisher {
            retain_reads,
            cover_app_id,
            queue,
            level_bus,
            states: HashMap::new(),
        }
    }

    /// Handle a state change reported on either C-Gate port.
    pub fn group_changed(&mut self, update: &GroupUpdate) {
        self.level_changed(&update.addr, update.raw_level());
    }

    /// Handle a level report for one group.
    pub fn level_changed(&mut self, addr: &GroupAddress, raw: u8) {
        let logical = if raw > 0 {
            LogicalState::On
        } else {
            LogicalState::Off
        };
        self.states.insert(
            addr.clone(),
            GroupState {
                level: raw,
                logical,
                last_seen: Instant::now(),
            },
        );

        self.level_bus.publish(addr, raw);

        let state = match logical {
            LogicalState::On => "ON",
            LogicalState::Off => "OFF",
        };
        let percent = percent_from_raw(raw).to_string();

        self.enqueue(addr, "state", state);
        self.enqueue(addr, "level", &percent);
        if self
            .cover_app_id
            .as_deref()
            .is_some_and(|cover| addr.application() == cover)
        {
            self.enqueue(addr, "position", &percent);
        }
    }

    /// The last level seen for a group, if any.
    pub fn last_level(&self, addr: &GroupAddress) -> Option<u8> {
        self.states.get(addr).map(|state| state.level)
    }

    fn enqueue(&self, addr: &GroupAddress, leaf: &str, payload: &str) {
        let topic = Topic::new_unchecked(&format!("cbus/read/{addr}/{leaf}"));
        let message = Message::new(&topic, payload).with_retain_flag(self.retain_reads);
        self.queue.add(message);
    }
}
