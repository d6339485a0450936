//! Typed identity tokens for entities and event channels.
//!
//! An [`EntityKey<K, S>`] names an entity and carries its element key type `K`
//! and state type `S` as compile-time witnesses. An [`EventChannel<E>`] names a
//! channel and carries its payload type `E`. Both compare and hash by name
//! only, so two tokens with the same name refer to the same registration.
//!
//! The erased forms ([`EntityRef`], [`ChannelRef`]) keep the name together
//! with the `TypeId`s of the witnesses. The engine compares them once, when
//! the graph is assembled, so that typed lookups never need to guess.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

// ---------------------------------------------------------------------------
// Element bounds
// ---------------------------------------------------------------------------

/// Bound for element keys.
///
/// `Ord` gives every entity a deterministic processing order for its
/// elements.
pub trait ElementKey: Clone + Ord + fmt::Debug + 'static {}

impl<T: Clone + Ord + fmt::Debug + 'static> ElementKey for T {}

/// Bound for element states. `PartialEq` is what lets an unchanged state
/// register as "nothing happened".
pub trait ElementState: PartialEq + fmt::Debug + 'static {}

impl<T: PartialEq + fmt::Debug + 'static> ElementState for T {}

// ---------------------------------------------------------------------------
// ErasedKey
// ---------------------------------------------------------------------------

/// An element key with its concrete type hidden.
///
/// Used for references that cross entity boundaries, where the referring
/// entity does not know the key type of the referenced one.
pub trait ErasedKey: Any + fmt::Debug {
    /// Borrow as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Clone into a fresh box.
    fn clone_erased(&self) -> Box<dyn ErasedKey>;
}

impl<T: ElementKey> ErasedKey for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_erased(&self) -> Box<dyn ErasedKey> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ErasedKey> {
    fn clone(&self) -> Self {
        (**self).clone_erased()
    }
}

impl dyn ErasedKey {
    /// Downcast to a concrete key type.
    pub fn downcast_ref<K: 'static>(&self) -> Option<&K> {
        self.as_any().downcast_ref::<K>()
    }
}

// ---------------------------------------------------------------------------
// EntityKey
// ---------------------------------------------------------------------------

/// Identity of an entity: a unique name plus key and state type witnesses.
///
/// ```
/// use ripple_core::key::EntityKey;
///
/// static COUNTER: EntityKey<String, i64> = EntityKey::new("COUNTER");
/// assert_eq!(COUNTER.name(), "COUNTER");
/// ```
pub struct EntityKey<K, S> {
    name: &'static str,
    _types: PhantomData<fn() -> (K, S)>,
}

impl<K, S> EntityKey<K, S> {
    /// Create a token. Usable in `static` and `const` items.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _types: PhantomData,
        }
    }

    /// The entity name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<K: 'static, S: 'static> EntityKey<K, S> {
    /// The erased reference used when declaring dependencies.
    pub fn erased(&self) -> EntityRef {
        EntityRef {
            name: self.name,
            key_type: TypeId::of::<K>(),
            state_type: TypeId::of::<S>(),
            key_type_name: std::any::type_name::<K>(),
            state_type_name: std::any::type_name::<S>(),
        }
    }
}

impl<K, S> Clone for EntityKey<K, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, S> Copy for EntityKey<K, S> {}

impl<K, S> PartialEq for EntityKey<K, S> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<K, S> Eq for EntityKey<K, S> {}

impl<K, S> Hash for EntityKey<K, S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl<K, S> fmt::Debug for EntityKey<K, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKey({})", self.name)
    }
}

impl<K, S> fmt::Display for EntityKey<K, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ---------------------------------------------------------------------------
// EntityRef
// ---------------------------------------------------------------------------

/// An [`EntityKey`] with its type witnesses recorded as runtime data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityRef {
    /// Entity name.
    pub name: &'static str,
    /// `TypeId` of the element key type.
    pub key_type: TypeId,
    /// `TypeId` of the element state type.
    pub state_type: TypeId,
    /// `std::any::type_name` of the key type, for error messages.
    pub key_type_name: &'static str,
    /// `std::any::type_name` of the state type, for error messages.
    pub state_type_name: &'static str,
}

impl EntityRef {
    /// Whether both references carry the same key and state types.
    pub fn same_types(&self, other: &EntityRef) -> bool {
        self.key_type == other.key_type && self.state_type == other.state_type
    }

    /// `"<key> -> <state>"`, for diagnostics.
    pub fn signature(&self) -> String {
        format!("{} -> {}", self.key_type_name, self.state_type_name)
    }
}

// ---------------------------------------------------------------------------
// EventChannel
// ---------------------------------------------------------------------------

/// Identity of an event channel: a unique name plus the payload type.
pub struct EventChannel<E> {
    name: &'static str,
    _payload: PhantomData<fn() -> E>,
}

impl<E> EventChannel<E> {
    /// Create a token. Usable in `static` and `const` items.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _payload: PhantomData,
        }
    }

    /// The channel name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<E: 'static> EventChannel<E> {
    /// The erased reference used when declaring subscriptions.
    pub fn erased(&self) -> ChannelRef {
        ChannelRef {
            name: self.name,
            event_type: TypeId::of::<E>(),
            event_type_name: std::any::type_name::<E>(),
        }
    }
}

impl<E> Clone for EventChannel<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for EventChannel<E> {}

impl<E> PartialEq for EventChannel<E> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<E> Eq for EventChannel<E> {}

impl<E> Hash for EventChannel<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl<E> fmt::Debug for EventChannel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventChannel({})", self.name)
    }
}

impl<E> fmt::Display for EventChannel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ---------------------------------------------------------------------------
// ChannelRef
// ---------------------------------------------------------------------------

/// An [`EventChannel`] with its payload type recorded as runtime data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelRef {
    /// Channel name.
    pub name: &'static str,
    /// `TypeId` of the payload type.
    pub event_type: TypeId,
    /// `std::any::type_name` of the payload type, for error messages.
    pub event_type_name: &'static str,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tokens_compare_by_name() {
        let a: EntityKey<String, i64> = EntityKey::new("A");
        let a2: EntityKey<String, i64> = EntityKey::new("A");
        let b: EntityKey<String, i64> = EntityKey::new("B");
        assert_eq!(a, a2);
        assert_ne!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(a2);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn erased_ref_records_types() {
        let a: EntityKey<String, i64> = EntityKey::new("A");
        let wrong: EntityKey<u32, i64> = EntityKey::new("A");
        let r = a.erased();
        assert_eq!(r.name, "A");
        assert_eq!(r.key_type, TypeId::of::<String>());
        assert!(r.same_types(&a.erased()));
        assert!(!r.same_types(&wrong.erased()));
        assert!(r.signature().contains("String"));
    }

    #[test]
    fn channel_ref_records_payload() {
        let words: EventChannel<String> = EventChannel::new("WORDS");
        let r = words.erased();
        assert_eq!(r.name, "WORDS");
        assert_eq!(r.event_type, TypeId::of::<String>());
        assert_eq!(format!("{words}"), "WORDS");
    }

    #[test]
    fn erased_key_downcast_and_clone() {
        let key: Box<dyn ErasedKey> = Box::new("x".to_owned());
        let copy = key.clone();
        assert_eq!(copy.downcast_ref::<String>().map(String::as_str), Some("x"));
        assert!(copy.downcast_ref::<u32>().is_none());
        assert_eq!(format!("{copy:?}"), "\"x\"");
    }
}
