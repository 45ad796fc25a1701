//! Backtrackable dependency tracking.
//!
//! Bound changes carry an opaque set of caller-supplied identifiers so that
//! an unsatisfiable outcome can be explained in the caller's terms. Sets are
//! built as a DAG of leaf and join nodes in an arena; `None` is the empty
//! set and joins absorb it. Scopes truncate the arena: every node created
//! after a `push_scope` is discarded by the matching `pop_scope`, which
//! keeps the store in lock-step with the solver trail.

use hashbrown::HashSet;

/// Handle to a dependency set node. `Option<DepRef>` is the set itself,
/// with `None` as the empty set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepRef(u32);

#[derive(Debug, Clone, Copy)]
enum DepNode {
    Leaf(u32),
    Join(DepRef, DepRef),
}

/// Arena of dependency nodes with scoped truncation.
#[derive(Debug, Default)]
pub struct DepStore {
    nodes: Vec<DepNode>,
    scopes: Vec<u32>,
}

impl DepStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A singleton set carrying `id`.
    pub fn leaf(&mut self, id: u32) -> DepRef {
        let r = DepRef(self.nodes.len() as u32);
        self.nodes.push(DepNode::Leaf(id));
        r
    }

    /// Union of two sets; `None` operands are absorbed.
    pub fn join(&mut self, a: Option<DepRef>, b: Option<DepRef>) -> Option<DepRef> {
        match (a, b) {
            (None, d) | (d, None) => d,
            (Some(a), Some(b)) => {
                let r = DepRef(self.nodes.len() as u32);
                self.nodes.push(DepNode::Join(a, b));
                Some(r)
            }
        }
    }

    /// Open a scope; nodes created from here on die with it.
    pub fn push_scope(&mut self) {
        self.scopes.push(self.nodes.len() as u32);
    }

    /// Close the `n` most recent scopes, discarding their nodes.
    pub fn pop_scope(&mut self, n: usize) {
        debug_assert!(n <= self.scopes.len());
        let keep = self.scopes.len() - n;
        let mark = self.scopes[keep];
        self.scopes.truncate(keep);
        self.nodes.truncate(mark as usize);
    }

    /// Flatten the union of `roots` into a deduplicated list of leaf ids,
    /// appended to `out` in discovery order.
    pub fn linearize_into(&self, roots: &[Option<DepRef>], out: &mut Vec<u32>) {
        let mut todo: Vec<DepRef> = roots.iter().copied().flatten().collect();
        let mut seen_nodes: HashSet<u32> = HashSet::new();
        let mut seen_ids: HashSet<u32> = HashSet::new();
        while let Some(d) = todo.pop() {
            if !seen_nodes.insert(d.0) {
                continue;
            }
            match self.nodes[d.0 as usize] {
                DepNode::Leaf(id) => {
                    if seen_ids.insert(id) {
                        out.push(id);
                    }
                }
                DepNode::Join(a, b) => {
                    todo.push(a);
                    todo.push(b);
                }
            }
        }
    }

    /// Number of live nodes (for scope bookkeeping tests).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Is the arena empty?
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Discard everything.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.scopes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(store: &DepStore, root: Option<DepRef>) -> Vec<u32> {
        let mut out = Vec::new();
        store.linearize_into(&[root], &mut out);
        out.sort_unstable();
        out
    }

    #[test]
    fn join_absorbs_empty() {
        let mut s = DepStore::new();
        let a = Some(s.leaf(1));
        assert_eq!(s.join(None, a), a);
        assert_eq!(s.join(a, None), a);
        assert_eq!(s.join(None, None), None);
    }

    #[test]
    fn linearize_deduplicates() {
        let mut s = DepStore::new();
        let a = Some(s.leaf(1));
        let b = Some(s.leaf(2));
        let ab = s.join(a, b);
        let aba = s.join(ab, a);
        assert_eq!(ids(&s, aba), vec![1, 2]);
    }

    #[test]
    fn linearize_shared_diamond() {
        let mut s = DepStore::new();
        let a = Some(s.leaf(7));
        let l8 = Some(s.leaf(8));
        let l = s.join(a, l8);
        let r9 = Some(s.leaf(9));
        let r = s.join(a, r9);
        let top = s.join(l, r);
        assert_eq!(ids(&s, top), vec![7, 8, 9]);
    }

    #[test]
    fn scopes_truncate() {
        let mut s = DepStore::new();
        let a = Some(s.leaf(1));
        s.push_scope();
        let b = Some(s.leaf(2));
        let _ = s.join(a, b);
        s.push_scope();
        let _ = s.leaf(3);
        assert_eq!(s.len(), 4);
        s.pop_scope(2);
        assert_eq!(s.len(), 1);
        assert_eq!(ids(&s, a), vec![1]);
    }
}
