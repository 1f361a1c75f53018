//! Evaluation seam between stored entries and caller-visible values.

use beacon_core::{ConfigValue, ResolvedContext, ResolvedEntry, WeightedValue};

/// Turns a resolved entry plus the caller's context into a value.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, entry: &ResolvedEntry, context: &ResolvedContext) -> Option<ConfigValue>;
}

/// Context-free evaluation.
///
/// Feature flags evaluate to their `enabled` switch, weighted sets to their
/// heaviest member (first one on ties), everything else to itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticEvaluator;

impl Evaluator for StaticEvaluator {
    fn evaluate(&self, entry: &ResolvedEntry, _context: &ResolvedContext) -> Option<ConfigValue> {
        match &entry.entry.value {
            ConfigValue::FeatureFlag(flag) => Some(ConfigValue::Bool(flag.enabled)),
            ConfigValue::WeightedValues(members) => members
                .iter()
                .fold(None, |best: Option<&WeightedValue>, m| match best {
                    Some(b) if b.weight >= m.weight => Some(b),
                    _ => Some(m),
                })
                .map(|m| m.value.clone()),
            other => Some(other.clone()),
        }
    }
}
