//! Dependency resolver: orders one peer group's aliases
//!
//! Given a set of peer aliases and, for each, the subset of its declared
//! dependencies that resolve to *other aliases in the same group*, produce a
//! linear order in which every alias appears after everything it depends on.
//! Declared dependencies that resolve outside the group (to an ancestor, a
//! runtime input, or the enclosing node's own `args`) never appear here —
//! they're already available by construction and impose no ordering
//! constraint within this group.

use std::collections::{HashMap, HashSet};

/// Topologically order `aliases`, where `deps[alias]` lists the in-group
/// aliases that must be emitted before `alias`.
///
/// Returns `Err` with the set of aliases still unresolved if a full pass
/// emits nothing — an unresolvable cycle among this group's peers.
pub fn topo_order(
    aliases: &[String],
    deps: &HashMap<String, Vec<String>>,
) -> Result<Vec<String>, Vec<String>> {
    let mut remaining: Vec<String> = aliases.to_vec();
    let mut emitted: HashSet<String> = HashSet::new();
    let mut order = Vec::with_capacity(aliases.len());

    while !remaining.is_empty() {
        let mut progressed = false;
        let mut next_remaining = Vec::new();

        for alias in &remaining {
            let ready = deps
                .get(alias)
                .map(|ds| ds.iter().all(|d| emitted.contains(d)))
                .unwrap_or(true);
            if ready {
                emitted.insert(alias.clone());
                order.push(alias.clone());
                progressed = true;
            } else {
                next_remaining.push(alias.clone());
            }
        }

        if !progressed {
            return Err(next_remaining);
        }
        remaining = next_remaining;
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_linear_chain() {
        let aliases = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut deps = HashMap::new();
        deps.insert("b".to_string(), vec!["a".to_string()]);
        deps.insert("c".to_string(), vec!["b".to_string()]);
        let order = topo_order(&aliases, &deps).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn detects_cycle() {
        let aliases = vec!["a".to_string(), "b".to_string()];
        let mut deps = HashMap::new();
        deps.insert("a".to_string(), vec!["b".to_string()]);
        deps.insert("b".to_string(), vec!["a".to_string()]);
        let err = topo_order(&aliases, &deps).unwrap_err();
        assert_eq!(err.len(), 2);
    }
}
