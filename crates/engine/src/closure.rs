//! Reachability closures over directed edge sets.
//!
//! One breadth-first traversal serves both relations the engine cares
//! about: node parent→child subtrees and manager→report subordinate
//! chains. The traversal is seen-set guarded, so a malformed relation
//! containing a cycle degrades to a finite closure instead of looping.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Build an adjacency map from (from, to) pairs, once per traversal.
pub fn adjacency_from_pairs<I>(pairs: I) -> BTreeMap<String, Vec<String>>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut edges: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (from, to) in pairs {
        edges.entry(from).or_default().push(to);
    }
    edges
}

/// All ids reachable from the roots over the edge relation, including the
/// roots themselves. A missing or empty edge set means "no descendants".
pub fn build_closure(
    roots: impl IntoIterator<Item = String>,
    edges: &BTreeMap<String, Vec<String>>,
) -> BTreeSet<String> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    for root in roots {
        if seen.insert(root.clone()) {
            queue.push_back(root);
        }
    }

    while let Some(current) = queue.pop_front() {
        if let Some(children) = edges.get(&current) {
            for child in children {
                if seen.insert(child.clone()) {
                    queue.push_back(child.clone());
                }
            }
        }
    }

    seen
}

/// The subtree rooted at one node, root included.
pub fn subtree_ids(root: &str, edges: &BTreeMap<String, Vec<String>>) -> BTreeSet<String> {
    build_closure([root.to_string()], edges)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
