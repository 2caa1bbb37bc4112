use crate::address::GroupAddress;
use std::sync::Mutex;
use tokio::sync::oneshot;

/// In-process one-shot distribution of group level reports.
///
/// INCREASE/DECREASE and cover stop handling need the *next* level C-Gate
/// reports for a group. A subscription is removed after its first delivery;
/// if no level ever arrives the subscription is dropped harmlessly with its
/// receiver.
#[derive(Debug, Default)]
pub struct LevelBus {
    waiters: Mutex<Vec<(GroupAddress, oneshot::Sender<u8>)>>,
}

impl LevelBus {
    pub fn new() -> LevelBus {
        LevelBus::default()
    }

    /// Register interest in the next level report for `addr`.
    pub fn subscribe_once(&self, addr: &GroupAddress) -> oneshot::Receiver<u8> {
        let (sender, receiver) = oneshot::channel();
        self.waiters().push((addr.clone(), sender));
        receiver
    }

    /// Deliver a level report to every one-shot subscriber of `addr`.
    pub fn publish(&self, addr: &GroupAddress, raw: u8) {
        let mut waiters = self.waiters();
        let mut index = 0;
        while index < waiters.len() {
            if waiters[index].0 == *addr {
                let (_, sender) = waiters.swap_remove(index);
                // A dropped receiver is a subscriber that stopped caring.
                let _ = sender.send(raw);
            } else {
                index += 1;
            }
        }
    }

    fn waiters(&self) -> std::sync::MutexGuard<'_, Vec<(GroupAddress, oneshot::Sender<u8>)>> {
        match self.waiters.lock() {
            Ok(waiters) => waiters,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(key: &str) -> GroupAddress {
        key.parse().expect("a valid address")
    }

    #[tokio::test]
    async fn a_subscription_receives_the_next_matching_level() {
        let bus = LevelBus::new();
        let receiver = bus.subscribe_once(&addr("254/56/14"));

        bus.publish(&addr("254/56/14"), 100);
        assert_eq!(receiver.await, Ok(100));
    }

    #[tokio::test]
    async fn levels_for_other_groups_are_not_delivered() {
        let bus = LevelBus::new();
        let mut receiver = bus.subscribe_once(&addr("254/56/14"));

        bus.publish(&addr("254/56/15"), 42);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn a_subscription_is_one_shot() {
        let bus = LevelBus::new();
        let receiver = bus.subscribe_once(&addr("254/56/14"));

        bus.publish(&addr("254/56/14"), 10);
        bus.publish(&addr("254/56/14"), 20);

        assert_eq!(receiver.await, Ok(10));
        assert!(bus.waiters().is_empty());
    }

    #[tokio::test]
    async fn all_waiting_subscribers_of_a_group_are_served() {
        let bus = LevelBus::new();
        let first = bus.subscribe_once(&addr("254/56/14"));
        let second = bus.subscribe_once(&addr("254/56/14"));

        bus.publish(&addr("254/56/14"), 77);
        assert_eq!(first.await, Ok(77));
        assert_eq!(second.await, Ok(77));
    }

    #[test]
    fn an_orphaned_subscription_is_harmless() {
        let bus = LevelBus::new();
        let receiver = bus.subscribe_once(&addr("254/56/14"));
        drop(receiver);

        // Delivery to the dropped receiver is simply ignored
        bus.publish(&addr("254/56/14"), 1);
        assert!(bus.waiters().is_empty());
    }
}
