//! # Conditions
//!
//! Set-by-type helpers over an ordered list of status conditions.
//!
//! - At most one condition per type; setting a condition replaces the existing one.
//! - `lastTransitionTime` moves only when `status` changes.
//! - A condition is fresh only when its `observedGeneration` equals the
//!   object's current generation.

mod ready;

pub use ready::{ready_condition, ReadyConditionBuilder};

use crate::crd::{Condition, ConditionStatus};
use kube::Resource;

/// Condition type written by every reconciler on every pass
pub const READY: &str = "Ready";

/// Access to a resource's status conditions
pub trait HasConditions {
    fn conditions(&self) -> &[Condition];
    /// Mutable access; creates the status substructure when absent
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;
}

/// Generation bookkeeping for a resource
pub trait HasGeneration: Resource {
    /// Generation assigned by the store, 0 when the store has not set one
    fn generation(&self) -> i64 {
        self.meta().generation.unwrap_or_default()
    }

    fn observed_generation(&self) -> Option<i64>;

    fn set_observed_generation(&mut self, generation: i64);
}

/// Find a condition by type
pub fn find<'a>(conditions: &'a [Condition], r#type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == r#type)
}

/// Set a condition, replacing any existing condition of the same type
///
/// The transition time of the existing condition is kept when only the reason,
/// message or observed generation change.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.r#type == condition.r#type) {
        Some(existing) => {
            if existing.status == condition.status && existing.last_transition_time.is_some() {
                condition.last_transition_time = existing.last_transition_time.clone();
            } else {
                condition.last_transition_time = Some(now());
            }
            *existing = condition;
        }
        None => {
            condition.last_transition_time = Some(now());
            conditions.push(condition);
        }
    }
}

/// Set a condition only when no condition of that type exists yet
///
/// Returns `true` when the condition was added.
pub fn set_condition_if_absent(conditions: &mut Vec<Condition>, condition: Condition) -> bool {
    if find(conditions, &condition.r#type).is_some() {
        return false;
    }
    set_condition(conditions, condition);
    true
}

/// Remove the condition of the given type; returns `true` if one was removed
pub fn remove_condition(conditions: &mut Vec<Condition>, r#type: &str) -> bool {
    let before = conditions.len();
    conditions.retain(|c| c.r#type != r#type);
    conditions.len() != before
}

/// Whether a condition was computed from the given generation
pub fn is_fresh(condition: &Condition, generation: i64) -> bool {
    condition.observed_generation == generation
}

/// Whether the object carries a fresh condition of the given type with the given status
///
/// Stale conditions (from an older generation) never match.
pub fn has_fresh_status<K>(obj: &K, r#type: &str, status: ConditionStatus) -> bool
where
    K: HasConditions + HasGeneration,
{
    find(obj.conditions(), r#type)
        .is_some_and(|c| c.status == status && is_fresh(c, obj.generation()))
}

/// Whether the object carries a fresh `True` condition of the given type
pub fn is_true_and_fresh<K>(obj: &K, r#type: &str) -> bool
where
    K: HasConditions + HasGeneration,
{
    has_fresh_status(obj, r#type, ConditionStatus::True)
}

/// Whether the object's Ready condition is True and fresh
pub fn is_ready<K>(obj: &K) -> bool
where
    K: HasConditions + HasGeneration,
{
    is_true_and_fresh(obj, READY)
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
