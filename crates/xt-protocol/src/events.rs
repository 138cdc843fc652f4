/// Group event bus — coordination events for UI-side consumers.
///
/// One bus per process (see [`GroupEventBus::global`]), events scoped by
/// group name. Subscribers only see events for the group they asked for.
use std::sync::OnceLock;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

const BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupEventKind {
    /// A peer in this context took over the group's master slot.
    MasterAppointed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEvent {
    pub group: String,
    pub kind: GroupEventKind,
}

impl GroupEvent {
    pub fn master_appointed(group: &str) -> Self {
        Self {
            group: group.to_string(),
            kind: GroupEventKind::MasterAppointed,
        }
    }
}

#[derive(Clone)]
pub struct GroupEventBus {
    tx: broadcast::Sender<GroupEvent>,
}

impl Default for GroupEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupEventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// The process-wide bus peers publish on unless given another.
    pub fn global() -> &'static GroupEventBus {
        static GLOBAL: OnceLock<GroupEventBus> = OnceLock::new();
        GLOBAL.get_or_init(GroupEventBus::new)
    }

    /// Publish an event. Returns how many subscribers were listening.
    pub fn publish(&self, event: GroupEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self, group: &str) -> GroupSubscription {
        GroupSubscription {
            group: group.to_string(),
            rx: self.tx.subscribe(),
        }
    }
}

/// Events of one group.
pub struct GroupSubscription {
    group: String,
    rx: broadcast::Receiver<GroupEvent>,
}

impl GroupSubscription {
    /// Wait for the next event of this group. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<GroupEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.group == self.group => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(group = %self.group, lagged = n, "group event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-published event of this group, without waiting.
    pub fn try_recv(&mut self) -> Option<GroupEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.group == self.group => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(n)) => {
                    tracing::warn!(group = %self.group, lagged = n, "group event subscriber lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scoped_by_group() {
        let bus = GroupEventBus::new();
        let mut good = bus.subscribe("good");
        let mut evil = bus.subscribe("evil");

        assert_eq!(bus.publish(GroupEvent::master_appointed("good")), 2);

        assert_eq!(
            good.recv().await,
            Some(GroupEvent::master_appointed("good"))
        );
        assert_eq!(evil.try_recv(), None);
    }

    #[test]
    fn publish_without_subscribers() {
        let bus = GroupEventBus::new();
        assert_eq!(bus.publish(GroupEvent::master_appointed("x")), 0);
    }

    #[test]
    fn global_is_shared() {
        let a = GroupEventBus::global();
        let mut sub = a.subscribe("global-test-group");
        GroupEventBus::global().publish(GroupEvent::master_appointed("global-test-group"));
        assert_eq!(sub.try_recv().map(|e| e.kind), Some(GroupEventKind::MasterAppointed));
    }
}
