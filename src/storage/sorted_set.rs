//! Ordered Set Engine
//!
//! An AVL tree ordered by score, where each tree node groups every member
//! name sharing that score. The tree is generic over a node-capability trait
//! rather than being specialized to floats, and a secondary name index gives
//! O(log N) score lookup and update by member name. Ascending traversal
//! yields non-decreasing scores; ties come out in lexicographic name order.

use hashbrown::HashMap;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Capability set required of a tree node value: ordering, a score, and a
/// mutable set of member names grouped under that score.
pub trait TreeVal {
    fn compare(&self, other: &Self) -> Ordering;
    fn score(&self) -> f64;
    fn names(&self) -> &BTreeSet<String>;
    fn add_name(&mut self, name: String);
    fn delete_name(&mut self, name: &str);
    fn is_empty(&self) -> bool;
}

#[derive(Debug)]
struct AvlNode<T> {
    value: T,
    height: i64,
    left: Option<Box<AvlNode<T>>>,
    right: Option<Box<AvlNode<T>>>,
}

impl<T> AvlNode<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            height: 1,
            left: None,
            right: None,
        }
    }
}

/// Self-balancing binary search tree with name-grouping merge on equal
/// compare. Balance factor stays in {-1, 0, 1} after every public call.
#[derive(Debug)]
pub struct AvlTree<T> {
    root: Option<Box<AvlNode<T>>>,
    len: usize,
}

fn height<T>(node: &Option<Box<AvlNode<T>>>) -> i64 {
    node.as_ref().map_or(0, |n| n.height)
}

fn update_height<T>(node: &mut AvlNode<T>) {
    node.height = 1 + height(&node.left).max(height(&node.right));
}

fn balance_factor<T>(node: &AvlNode<T>) -> i64 {
    height(&node.left) - height(&node.right)
}

fn rotate_right<T>(mut node: Box<AvlNode<T>>) -> Box<AvlNode<T>> {
    let mut pivot = node.left.take().expect("left-heavy node has a left child");
    node.left = pivot.right.take();
    update_height(&mut node);
    pivot.right = Some(node);
    update_height(&mut pivot);
    pivot
}

fn rotate_left<T>(mut node: Box<AvlNode<T>>) -> Box<AvlNode<T>> {
    let mut pivot = node.right.take().expect("right-heavy node has a right child");
    node.right = pivot.left.take();
    update_height(&mut node);
    pivot.left = Some(node);
    update_height(&mut pivot);
    pivot
}

/// Restore the AVL invariant at `node` after a child changed, rotating
/// bottom-up exactly like the insert/delete paths expect.
fn rebalance<T>(mut node: Box<AvlNode<T>>) -> Box<AvlNode<T>> {
    update_height(&mut node);
    let bf = balance_factor(&node);
    if bf > 1 {
        if balance_factor(node.left.as_ref().expect("left child")) < 0 {
            let left = node.left.take().expect("left child");
            node.left = Some(rotate_left(left));
        }
        return rotate_right(node);
    }
    if bf < -1 {
        if balance_factor(node.right.as_ref().expect("right child")) > 0 {
            let right = node.right.take().expect("right child");
            node.right = Some(rotate_right(right));
        }
        return rotate_left(node);
    }
    node
}

impl<T: TreeVal> AvlTree<T> {
    pub fn new() -> Self {
        Self { root: None, len: 0 }
    }

    /// Number of tree nodes (distinct scores), not member names.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a value; when a node comparing equal already exists the names
    /// merge into it instead of adding a node. Returns true when a new node
    /// was created.
    pub fn insert(&mut self, value: T) -> bool {
        let mut added = false;
        self.root = Some(insert_node(self.root.take(), value, &mut added));
        if added {
            self.len += 1;
        }
        added
    }

    /// Remove the names carried by `target` from the node comparing equal to
    /// it. The node itself is deleted, and the tree rebalanced, only when no
    /// names remain. Returns true when a node was structurally deleted.
    pub fn remove(&mut self, target: &T) -> bool {
        let mut deleted = false;
        self.root = remove_node(self.root.take(), target, &mut deleted);
        if deleted {
            self.len -= 1;
        }
        deleted
    }

    pub fn get(&self, probe: &T) -> Option<&T> {
        let mut node = self.root.as_deref();
        while let Some(n) = node {
            match probe.compare(&n.value) {
                Ordering::Less => node = n.left.as_deref(),
                Ordering::Greater => node = n.right.as_deref(),
                Ordering::Equal => return Some(&n.value),
            }
        }
        None
    }

    /// In-order traversal; the visitor returns false to stop early.
    pub fn ascend(&self, visit: &mut impl FnMut(&T) -> bool) {
        visit_in_order(&self.root, visit);
    }

    #[cfg(test)]
    fn assert_balanced(&self) {
        fn check<T>(node: &Option<Box<AvlNode<T>>>) -> i64 {
            match node {
                None => 0,
                Some(n) => {
                    let lh = check(&n.left);
                    let rh = check(&n.right);
                    assert!((lh - rh).abs() <= 1, "balance factor out of range");
                    assert_eq!(n.height, 1 + lh.max(rh), "stale height");
                    n.height
                }
            }
        }
        check(&self.root);
    }
}

fn insert_node<T: TreeVal>(
    node: Option<Box<AvlNode<T>>>,
    value: T,
    added: &mut bool,
) -> Box<AvlNode<T>> {
    let mut n = match node {
        None => {
            *added = true;
            return Box::new(AvlNode::new(value));
        }
        Some(n) => n,
    };
    match value.compare(&n.value) {
        Ordering::Less => {
            n.left = Some(insert_node(n.left.take(), value, added));
        }
        Ordering::Greater => {
            n.right = Some(insert_node(n.right.take(), value, added));
        }
        Ordering::Equal => {
            for name in value.names().iter().cloned() {
                n.value.add_name(name);
            }
            *added = false;
            return n;
        }
    }
    rebalance(n)
}

fn remove_node<T: TreeVal>(
    node: Option<Box<AvlNode<T>>>,
    target: &T,
    deleted: &mut bool,
) -> Option<Box<AvlNode<T>>> {
    let mut n = node?;
    match target.compare(&n.value) {
        Ordering::Less => {
            n.left = remove_node(n.left.take(), target, deleted);
        }
        Ordering::Greater => {
            n.right = remove_node(n.right.take(), target, deleted);
        }
        Ordering::Equal => {
            for name in target.names().iter() {
                n.value.delete_name(name);
            }
            if !n.value.is_empty() {
                // Names remain grouped here; no structural change.
                return Some(n);
            }
            *deleted = true;
            match (n.left.take(), n.right.take()) {
                (None, right) => return right,
                (left, None) => return left,
                (left, Some(right)) => {
                    let (successor, rest) = take_min(right);
                    n.value = successor;
                    n.left = left;
                    n.right = rest;
                }
            }
        }
    }
    Some(rebalance(n))
}

/// Detach the minimum value of a subtree, rebalancing along the way back up.
fn take_min<T: TreeVal>(mut node: Box<AvlNode<T>>) -> (T, Option<Box<AvlNode<T>>>) {
    match node.left.take() {
        None => (node.value, node.right.take()),
        Some(left) => {
            let (min, rest) = take_min(left);
            node.left = rest;
            (min, Some(rebalance(node)))
        }
    }
}

fn visit_in_order<T>(node: &Option<Box<AvlNode<T>>>, visit: &mut impl FnMut(&T) -> bool) -> bool {
    match node {
        None => true,
        Some(n) => {
            visit_in_order(&n.left, visit) && visit(&n.value) && visit_in_order(&n.right, visit)
        }
    }
}

/// One tree node's value: a score and the member names grouped under it.
#[derive(Debug, Clone)]
pub struct ScoreNode {
    score: f64,
    names: BTreeSet<String>,
}

impl ScoreNode {
    pub fn single(score: f64, name: &str) -> Self {
        let mut names = BTreeSet::new();
        names.insert(name.to_string());
        Self { score, names }
    }
}

impl TreeVal for ScoreNode {
    fn compare(&self, other: &Self) -> Ordering {
        self.score.total_cmp(&other.score)
    }

    fn score(&self) -> f64 {
        self.score
    }

    fn names(&self) -> &BTreeSet<String> {
        &self.names
    }

    fn add_name(&mut self, name: String) {
        self.names.insert(name);
    }

    fn delete_name(&mut self, name: &str) {
        self.names.remove(name);
    }

    fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// The ordered set proper: the score tree plus the member-name index.
#[derive(Debug)]
pub struct SortedSet {
    tree: AvlTree<ScoreNode>,
    index: HashMap<String, f64>,
}

impl SortedSet {
    pub fn new() -> Self {
        Self {
            tree: AvlTree::new(),
            index: HashMap::new(),
        }
    }

    /// Member count (not node count).
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.tree.len()
    }

    pub fn score(&self, member: &str) -> Option<f64> {
        self.index.get(member).copied()
    }

    /// Insert or move `member` to `score`. Returns true when the member was
    /// not present before.
    pub fn insert(&mut self, member: &str, score: f64) -> bool {
        let newly_added = match self.index.get(member).copied() {
            Some(old) if old == score => return false,
            Some(old) => {
                self.tree.remove(&ScoreNode::single(old, member));
                false
            }
            None => true,
        };
        self.tree.insert(ScoreNode::single(score, member));
        self.index.insert(member.to_string(), score);
        newly_added
    }

    pub fn remove(&mut self, member: &str) -> bool {
        match self.index.remove(member) {
            Some(score) => {
                self.tree.remove(&ScoreNode::single(score, member));
                true
            }
            None => false,
        }
    }

    /// Visit `(score, names)` groups in ascending score order.
    pub fn ascend(&self, mut visit: impl FnMut(f64, &BTreeSet<String>) -> bool) {
        self.tree.ascend(&mut |node| visit(node.score(), node.names()));
    }

    /// All members in ascending score order, ties in name order.
    pub fn members_in_order(&self) -> Vec<(String, f64)> {
        let mut out = Vec::with_capacity(self.len());
        self.ascend(|score, names| {
            for name in names {
                out.push((name.clone(), score));
            }
            true
        });
        out
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        self.tree.assert_balanced();
        // Every indexed member appears in the node holding its score.
        for (name, &score) in &self.index {
            let node = self
                .tree
                .get(&ScoreNode::single(score, name))
                .expect("indexed score has a node");
            assert!(node.names().contains(name), "index points at wrong node");
            assert_eq!(node.score(), score);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_order() {
        let mut set = SortedSet::new();
        assert!(set.insert("hero", 555.0));
        assert!(set.insert("ggbob", 333.0));
        assert!(set.insert("jeff", 444.0));
        let members: Vec<String> = set.members_in_order().into_iter().map(|(m, _)| m).collect();
        assert_eq!(members, vec!["ggbob", "jeff", "hero"]);
        set.assert_consistent();
    }

    #[test]
    fn test_move_member() {
        let mut set = SortedSet::new();
        set.insert("ggbob", 333.0);
        set.insert("hero", 555.0);
        // Second insert of an existing member moves it, adds nothing.
        assert!(!set.insert("ggbob", 999.0));
        assert_eq!(set.score("ggbob"), Some(999.0));
        let members: Vec<String> = set.members_in_order().into_iter().map(|(m, _)| m).collect();
        assert_eq!(members, vec!["hero", "ggbob"]);
        set.assert_consistent();
    }

    #[test]
    fn test_tied_scores_group_in_one_node() {
        let mut set = SortedSet::new();
        set.insert("a", 7.0);
        set.insert("b", 7.0);
        set.insert("c", 7.0);
        assert_eq!(set.len(), 3);
        assert_eq!(set.node_count(), 1);
        // Removing a subset of names keeps the node.
        assert!(set.remove("b"));
        assert_eq!(set.node_count(), 1);
        assert!(set.remove("a"));
        assert!(set.remove("c"));
        assert_eq!(set.node_count(), 0);
        set.assert_consistent();
    }

    #[test]
    fn test_balance_under_sequential_insert() {
        let mut set = SortedSet::new();
        for i in 0..512 {
            set.insert(&format!("m{}", i), i as f64);
            set.assert_consistent();
        }
        for i in (0..512).step_by(2) {
            assert!(set.remove(&format!("m{}", i)));
        }
        set.assert_consistent();
        assert_eq!(set.len(), 256);
    }

    #[test]
    fn test_remove_missing_member() {
        let mut set = SortedSet::new();
        set.insert("a", 1.0);
        assert!(!set.remove("b"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_ascending_scores_never_decrease() {
        let mut set = SortedSet::new();
        let scores = [5.0, -3.5, 0.0, 12.25, -3.5, 7.0, 99.0, 0.5];
        for (i, &s) in scores.iter().enumerate() {
            set.insert(&format!("m{}", i), s);
        }
        let ordered = set.members_in_order();
        for pair in ordered.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
        set.assert_consistent();
    }
}
