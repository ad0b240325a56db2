//! Conditional aborts: decorators gated by a condition that can preempt running branches.

use std::fmt;

use ai_core::{BbKey, Blackboard, DeterministicRng};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bt::{BtContext, Condition};
use crate::node::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AbortPolicy {
    /// The condition only gates entry.
    #[default]
    None,
    /// While inactive, preempt lower-priority siblings once the condition becomes true.
    LowerPriority,
    /// While active, abort the own branch once the condition becomes false.
    SelfOnly,
    Both,
}

impl AbortPolicy {
    pub fn aborts_self(self) -> bool {
        matches!(self, AbortPolicy::SelfOnly | AbortPolicy::Both)
    }

    pub fn aborts_lower_priority(self) -> bool {
        matches!(self, AbortPolicy::LowerPriority | AbortPolicy::Both)
    }

    /// Nodes with this policy are observers and get re-evaluated every tick.
    pub fn observes(self) -> bool {
        self != AbortPolicy::None
    }
}

pub struct ConditionalAbort {
    condition: Box<dyn Condition>,
    policy: AbortPolicy,
    watched: Vec<u64>,
    observing: bool,
    active: bool,
}

impl ConditionalAbort {
    pub fn new(condition: Box<dyn Condition>, policy: AbortPolicy) -> Self {
        let watched = condition.watched_keys();
        Self {
            condition,
            policy,
            watched,
            observing: false,
            active: false,
        }
    }

    pub fn policy(&self) -> AbortPolicy {
        self.policy
    }

    /// Keys whose changes trigger re-evaluation. Empty means polled every tick.
    pub fn watched_keys(&self) -> &[u64] {
        &self.watched
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    /// `true` while the node is on its iterator's stack.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn check(&mut self, cx: &mut BtContext<'_>) -> bool {
        self.condition.check(cx)
    }

    pub(crate) fn enter(&mut self) {
        self.active = true;
    }

    /// Returns `true` when the node should stop observing on exit. Lower-priority observers
    /// keep watching until their composite parent exits.
    pub(crate) fn exit(&mut self) -> bool {
        self.active = false;
        !self.policy.aborts_lower_priority()
    }

    pub(crate) fn start_observing(&mut self, blackboard: &mut Blackboard, id: NodeId) {
        if self.observing || !self.policy.observes() {
            return;
        }
        self.observing = true;
        for &key in &self.watched {
            blackboard.subscribe(key, id as u64);
        }
    }

    pub(crate) fn stop_observing(&mut self, blackboard: &mut Blackboard, id: NodeId) {
        if !self.observing {
            return;
        }
        self.observing = false;
        for &key in &self.watched {
            blackboard.unsubscribe(key, id as u64);
        }
    }

    pub(crate) fn fresh(&self) -> Self {
        Self::new(self.condition.clone_condition(), self.policy)
    }
}

impl fmt::Debug for ConditionalAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalAbort")
            .field("policy", &self.policy)
            .field("watched", &self.watched)
            .field("observing", &self.observing)
            .field("active", &self.active)
            .finish()
    }
}

/// Tests a blackboard value. A missing key is passed to the predicate as `None`.
pub struct KeyCondition<T: 'static, F> {
    key: BbKey<T>,
    predicate: F,
}

impl<T, F> KeyCondition<T, F>
where
    T: 'static,
    F: Fn(Option<&T>) -> bool + Clone + 'static,
{
    pub fn new(key: BbKey<T>, predicate: F) -> Self {
        Self { key, predicate }
    }
}

impl<T: 'static> KeyCondition<T, fn(Option<&T>) -> bool> {
    /// Holds while `key` is present.
    pub fn is_set(key: BbKey<T>) -> Self {
        Self {
            key,
            predicate: |value| value.is_some(),
        }
    }
}

impl<T: 'static, F: Clone> Clone for KeyCondition<T, F> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            predicate: self.predicate.clone(),
        }
    }
}

impl<T, F> Condition for KeyCondition<T, F>
where
    T: 'static,
    F: Fn(Option<&T>) -> bool + Clone + 'static,
{
    fn check(&mut self, cx: &mut BtContext<'_>) -> bool {
        (self.predicate)(cx.blackboard.get(self.key))
    }

    fn watched_keys(&self) -> Vec<u64> {
        vec![self.key.id()]
    }
}

/// Holds with the given probability, drawn from the tree's RNG on every check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chance {
    pub probability: f32,
}

impl Chance {
    pub fn new(probability: f32) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
        }
    }
}

impl Condition for Chance {
    fn check(&mut self, cx: &mut BtContext<'_>) -> bool {
        cx.rng.next_f32_unit() < self.probability
    }
}

/// Closure condition. Polled every tick unless it declares the keys it reads.
#[derive(Clone)]
pub struct Predicate<F> {
    f: F,
    watched: Vec<u64>,
}

impl<F> Predicate<F>
where
    F: FnMut(&mut BtContext<'_>) -> bool + Clone + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            watched: Vec::new(),
        }
    }

    pub fn watching(mut self, keys: &[u64]) -> Self {
        self.watched.extend_from_slice(keys);
        self
    }
}

impl<F> Condition for Predicate<F>
where
    F: FnMut(&mut BtContext<'_>) -> bool + Clone + 'static,
{
    fn check(&mut self, cx: &mut BtContext<'_>) -> bool {
        (self.f)(cx)
    }

    fn watched_keys(&self) -> Vec<u64> {
        self.watched.clone()
    }
}

#[cfg(test)]
mod tests {
    use ai_core::{SplitMix64, TickContext};

    use super::*;

    const HUNGRY: BbKey<bool> = BbKey::new(7);

    fn check(condition: &mut dyn Condition, blackboard: &mut Blackboard) -> bool {
        let tick = TickContext::default();
        let mut rng = SplitMix64::new(1);
        let mut cx = BtContext {
            tick: &tick,
            blackboard,
            rng: &mut rng,
            node: 0,
        };
        condition.check(&mut cx)
    }

    #[test]
    fn key_condition_reads_blackboard() {
        let mut bb = Blackboard::new();
        let mut cond = KeyCondition::new(HUNGRY, |v: Option<&bool>| v.copied().unwrap_or(false));
        assert!(!check(&mut cond, &mut bb));
        bb.set(HUNGRY, true);
        assert!(check(&mut cond, &mut bb));
        assert_eq!(cond.watched_keys(), vec![7]);

        let mut set = KeyCondition::is_set(HUNGRY);
        assert!(check(&mut set, &mut bb));
    }

    #[test]
    fn observing_subscribes_watched_keys() {
        let mut bb = Blackboard::new();
        let mut abort = ConditionalAbort::new(
            Box::new(KeyCondition::is_set(HUNGRY)),
            AbortPolicy::LowerPriority,
        );
        abort.start_observing(&mut bb, 3);
        assert!(bb.is_subscribed(7, 3));
        bb.set(HUNGRY, false);
        assert!(bb.take_notified().contains(&3));

        assert!(!abort.exit());
        abort.stop_observing(&mut bb, 3);
        assert!(!bb.is_subscribed(7, 3));
    }

    #[test]
    fn chance_extremes_are_deterministic() {
        let mut bb = Blackboard::new();
        assert!(!check(&mut Chance::new(0.0), &mut bb));
        assert!(check(&mut Chance::new(1.0), &mut bb));
    }

    #[test]
    fn none_policy_never_observes() {
        let mut bb = Blackboard::new();
        let mut abort =
            ConditionalAbort::new(Box::new(KeyCondition::is_set(HUNGRY)), AbortPolicy::None);
        abort.start_observing(&mut bb, 1);
        assert!(!abort.is_observing());
        assert!(!bb.is_subscribed(7, 1));
    }
}
