//! Thread-safe handle for queueing events.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use ripple_core::event::Event;
use ripple_core::key::{ChannelRef, EventChannel};

use crate::error::EngineError;

/// Queues events for the next event phase.
///
/// Cloning is cheap and every clone feeds the same queue, so handles can be
/// moved into other threads or captured by callbacks. Only channels with at
/// least one subscriber accept events.
#[derive(Clone)]
pub struct EventInjector {
    queue: Arc<Mutex<Vec<Event>>>,
    subscribed: Arc<HashMap<&'static str, ChannelRef>>,
}

impl EventInjector {
    pub(crate) fn new(subscribed: HashMap<&'static str, ChannelRef>) -> Self {
        Self {
            queue: Arc::new(Mutex::new(Vec::new())),
            subscribed: Arc::new(subscribed),
        }
    }

    /// Queue `value` on `channel`.
    pub fn inject<E: Send + Sync + 'static>(
        &self,
        channel: &EventChannel<E>,
        value: E,
    ) -> Result<(), EngineError> {
        let registered = self
            .subscribed
            .get(channel.name())
            .ok_or_else(|| EngineError::UnsubscribedChannel(channel.name().to_owned()))?;
        if registered.event_type != TypeId::of::<E>() {
            return Err(EngineError::ChannelTypeMismatch {
                channel: channel.name().to_owned(),
                expected: registered.event_type_name,
                found: std::any::type_name::<E>(),
            });
        }
        self.queue.lock().push(Event::new(channel, value));
        Ok(())
    }

    /// Number of events waiting for the next event phase.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Take every queued event, in injection order.
    pub(crate) fn drain(&self) -> Vec<Event> {
        std::mem::take(&mut *self.queue.lock())
    }
}

impl fmt::Debug for EventInjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut channels: Vec<_> = self.subscribed.keys().collect();
        channels.sort();
        f.debug_struct("EventInjector")
            .field("channels", &channels)
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static WORDS: EventChannel<String> = EventChannel::new("WORDS");
    static WORDS_AS_NUMBERS: EventChannel<u32> = EventChannel::new("WORDS");
    static SILENT: EventChannel<String> = EventChannel::new("SILENT");

    fn injector() -> EventInjector {
        EventInjector::new(HashMap::from([(WORDS.name(), WORDS.erased())]))
    }

    #[test]
    fn inject_then_drain_keeps_order() {
        let injector = injector();
        injector.inject(&WORDS, "a".to_owned()).unwrap();
        injector.inject(&WORDS, "b".to_owned()).unwrap();
        assert_eq!(injector.pending(), 2);

        let drained = injector.drain();
        let values: Vec<_> = drained
            .iter()
            .filter_map(|e| e.value(&WORDS).cloned())
            .collect();
        assert_eq!(values, vec!["a", "b"]);
        assert_eq!(injector.pending(), 0);
    }

    #[test]
    fn clones_share_the_queue_across_threads() {
        let injector = injector();
        let remote = injector.clone();
        std::thread::spawn(move || remote.inject(&WORDS, "far".to_owned()))
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(injector.pending(), 1);
    }

    #[test]
    fn unsubscribed_channel_is_rejected() {
        let err = injector().inject(&SILENT, "x".to_owned()).unwrap_err();
        assert!(matches!(err, EngineError::UnsubscribedChannel(ref name) if name == "SILENT"));
    }

    #[test]
    fn wrong_payload_type_is_rejected() {
        let err = injector().inject(&WORDS_AS_NUMBERS, 3).unwrap_err();
        assert!(matches!(err, EngineError::ChannelTypeMismatch { .. }));
    }
}
