//! Sink for operator-visible events.

use crate::model::{Event, ResourceKey};

/// Records events about a resource. Must not fail the caller.
pub trait Recorder: Send + Sync {
    fn record(&self, event: Event);

    /// Drops every event of a resource that no longer exists.
    fn forget(&self, key: &ResourceKey);
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;
    use crate::model::{EventReason, EventType};

    #[derive(Debug, Default)]
    pub struct MemoryRecorder(Mutex<Vec<Event>>);

    impl MemoryRecorder {
        pub fn events(&self) -> Vec<Event> {
            self.0.lock().unwrap().clone()
        }

        pub fn reasons(&self) -> Vec<EventReason> {
            self.events().into_iter().map(|e| e.reason).collect()
        }

        pub fn count(&self, event_type: EventType) -> usize {
            self.events()
                .iter()
                .filter(|e| e.event_type == event_type)
                .count()
        }
    }

    impl Recorder for MemoryRecorder {
        fn record(&self, event: Event) {
            self.0.lock().unwrap().push(event);
        }

        fn forget(&self, key: &ResourceKey) {
            self.0.lock().unwrap().retain(|e| &e.key != key);
        }
    }
}
