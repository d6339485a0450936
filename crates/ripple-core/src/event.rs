//! Transient events delivered through channels.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::key::EventChannel;

/// A value injected into a channel.
///
/// Events live from injection until the event phase of the next tick. The
/// payload is shared, so fanning one event out to several subscribers does
/// not copy it.
#[derive(Clone)]
pub struct Event {
    channel: &'static str,
    payload: Arc<dyn Any + Send + Sync>,
}

impl Event {
    /// Wrap a payload for the given channel.
    pub fn new<E: Send + Sync + 'static>(channel: &EventChannel<E>, value: E) -> Self {
        Self {
            channel: channel.name(),
            payload: Arc::new(value),
        }
    }

    /// Name of the channel this event was injected into.
    pub fn channel(&self) -> &'static str {
        self.channel
    }

    /// Whether this event belongs to `channel`.
    pub fn is_on<E>(&self, channel: &EventChannel<E>) -> bool {
        self.channel == channel.name()
    }

    /// The payload, if this event belongs to `channel`.
    pub fn value<E: 'static>(&self, channel: &EventChannel<E>) -> Option<&E> {
        if self.is_on(channel) {
            self.payload.downcast_ref::<E>()
        } else {
            None
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
