//! Per-call batch planning for multi-key operations.

use std::collections::HashMap;

/// Ephemeral grouping of `{server → [keys]}` for one multi-key call.
///
/// Built by routing each key through a per-key function (in practice the
/// candidate walk, which consults connectivity and health), so two keys end
/// up in the same group exactly when the same server will serve them. Keys
/// the router cannot place land in `unroutable`; callers fail those without
/// touching the other groups. Never persisted.
#[derive(Debug, Default)]
pub struct BatchPlan {
    groups: Vec<(String, Vec<String>)>,
    unroutable: Vec<String>,
}

impl BatchPlan {
    /// Group `keys` by the server `route` assigns them.
    ///
    /// Group order follows first appearance, and keys keep their call order
    /// within a group, so the pipelined commands hit each server in the
    /// order the caller issued them.
    pub fn build<I, K, F>(keys: I, mut route: F) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
        F: FnMut(&str) -> Option<String>,
    {
        let mut plan = BatchPlan::default();
        let mut index: HashMap<String, usize> = HashMap::new();

        for key in keys {
            let key = key.into();
            match route(&key) {
                Some(tag) => {
                    let slot = *index.entry(tag.clone()).or_insert_with(|| {
                        plan.groups.push((tag, Vec::new()));
                        plan.groups.len() - 1
                    });
                    plan.groups[slot].1.push(key);
                }
                None => plan.unroutable.push(key),
            }
        }

        plan
    }

    /// Per-server groups, in first-appearance order.
    pub fn groups(&self) -> &[(String, Vec<String>)] {
        &self.groups
    }

    /// Keys that no server could be found for.
    pub fn unroutable(&self) -> &[String] {
        &self.unroutable
    }

    /// Consume the plan into its groups.
    pub fn into_groups(self) -> Vec<(String, Vec<String>)> {
        self.groups
    }

    pub fn is_fully_routed(&self) -> bool {
        self.unroutable.is_empty()
    }
}
