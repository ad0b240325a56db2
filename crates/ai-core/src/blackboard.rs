use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BbKey<T: 'static> {
    id: u64,
    _phantom: PhantomData<fn() -> T>,
}

impl<T: 'static> Copy for BbKey<T> {}

impl<T: 'static> Clone for BbKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: 'static> BbKey<T> {
    pub const fn new(id: u64) -> Self {
        Self {
            id,
            _phantom: PhantomData,
        }
    }

    pub fn id(self) -> u64 {
        self.id
    }
}

/// Stored values are clonable so a blackboard can be copied per tree instance.
trait BbValue: Any {
    fn clone_value(&self) -> Box<dyn BbValue>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any + Clone> BbValue for T {
    fn clone_value(&self) -> Box<dyn BbValue> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Typed key-value store shared by the nodes of one tree instance.
///
/// Observers subscribe to key ids with an opaque subscriber id. Any write to a subscribed key
/// (`set`, `get_mut`, `remove`) queues the subscriber; [`Blackboard::take_notified`] drains the
/// queue. Reads never notify.
#[derive(Default)]
pub struct Blackboard {
    values: BTreeMap<u64, Box<dyn BbValue>>,
    subscribers: BTreeMap<u64, BTreeSet<u64>>,
    notified: BTreeSet<u64>,
}

impl Clone for Blackboard {
    /// Copies the stored values only. Subscriptions belong to the tree instance that made them.
    fn clone(&self) -> Self {
        Self {
            values: self
                .values
                .iter()
                .map(|(id, value)| (*id, (**value).clone_value()))
                .collect(),
            subscribers: BTreeMap::new(),
            notified: BTreeSet::new(),
        }
    }
}

impl std::fmt::Debug for Blackboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blackboard")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .field("subscribers", &self.subscribers)
            .field("notified", &self.notified)
            .finish()
    }
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        let ids: Vec<u64> = self.values.keys().copied().collect();
        for id in ids {
            self.touch(id);
        }
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains<T: 'static>(&self, key: BbKey<T>) -> bool {
        self.values.contains_key(&key.id)
    }

    pub fn set<T: Clone + 'static>(&mut self, key: BbKey<T>, value: T) {
        self.values.insert(key.id, Box::new(value));
        self.touch(key.id);
    }

    pub fn get<T: 'static>(&self, key: BbKey<T>) -> Option<&T> {
        let value = self.values.get(&key.id)?;
        (**value).as_any().downcast_ref::<T>().or_else(|| {
            panic!(
                "blackboard type mismatch for key id={} (stored type differs from requested)",
                key.id
            )
        })
    }

    pub fn get_mut<T: 'static>(&mut self, key: BbKey<T>) -> Option<&mut T> {
        if !self.values.contains_key(&key.id) {
            return None;
        }
        self.touch(key.id);
        let value = self.values.get_mut(&key.id)?;
        (**value).as_any_mut().downcast_mut::<T>().or_else(|| {
            panic!(
                "blackboard type mismatch for key id={} (stored type differs from requested)",
                key.id
            )
        })
    }

    pub fn remove<T: 'static>(&mut self, key: BbKey<T>) -> Option<T> {
        let value = self.values.remove(&key.id)?;
        self.touch(key.id);
        value.into_any().downcast::<T>().map(|b| *b).ok().or_else(|| {
            panic!(
                "blackboard type mismatch for key id={} (stored type differs from requested)",
                key.id
            )
        })
    }

    /// Register `subscriber` for changes to the key with id `key_id`.
    pub fn subscribe(&mut self, key_id: u64, subscriber: u64) {
        self.subscribers.entry(key_id).or_default().insert(subscriber);
    }

    pub fn unsubscribe(&mut self, key_id: u64, subscriber: u64) {
        if let Some(set) = self.subscribers.get_mut(&key_id) {
            set.remove(&subscriber);
            if set.is_empty() {
                self.subscribers.remove(&key_id);
            }
        }
    }

    pub fn is_subscribed(&self, key_id: u64, subscriber: u64) -> bool {
        self.subscribers
            .get(&key_id)
            .is_some_and(|set| set.contains(&subscriber))
    }

    /// Drain the subscribers notified since the last call, in ascending id order.
    pub fn take_notified(&mut self) -> BTreeSet<u64> {
        std::mem::take(&mut self.notified)
    }

    fn touch(&mut self, key_id: u64) {
        if let Some(set) = self.subscribers.get(&key_id) {
            self.notified.extend(set.iter().copied());
        }
    }
}
