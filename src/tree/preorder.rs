//! Preorder addressing of an implicit tree.
//!
//! Values are 1-based (`1..=m`) and `0` stands for "no node". Heap indices are
//! 1-based as well: the root is 1 and node `p` has children `2p` and `2p+1`.
//! Visiting heap indices `1, 2, 3, ...` and letting the node at each index
//! broadcast in turn gives every tree node its own slot, and a searcher that
//! waits for the heap index of its next node never waits for a slot that has
//! already passed.
//!
//! The iterated-height helpers describe the group structure used by
//! regrouping: groups at round `i` have `iterated_height(m, i)` members.

use super::inorder::{height, left_size, right_size};

/// Value at the root of a tree with `m` nodes
pub fn root(m: usize) -> usize {
    left_size(m) + 1
}

/// Walks from the root to value `x`.
///
/// Returns the size of the subtree rooted at `x` and its heap index, or `None`
/// when `x` is not a node of the tree.
fn walk(m: usize, x: usize) -> Option<(usize, usize)> {
    if x == 0 || x > m {
        return None;
    }
    let mut value = root(m);
    let mut size = m;
    let mut index = 1;
    while value != x {
        if x < value {
            index *= 2;
            size = left_size(size);
            value = value - size + left_size(size);
        } else {
            index = 2 * index + 1;
            size = right_size(size);
            value += left_size(size) + 1;
        }
    }
    Some((size, index))
}

/// Value of the left child of `x`, or 0 if it has none
pub fn left_child_value(m: usize, x: usize) -> usize {
    match walk(m, x) {
        Some((size, _)) => {
            let sub = left_size(size);
            if sub == 0 {
                0
            } else {
                x - sub + left_size(sub)
            }
        }
        None => 0,
    }
}

/// Value of the right child of `x`, or 0 if it has none
pub fn right_child_value(m: usize, x: usize) -> usize {
    match walk(m, x) {
        Some((size, _)) => {
            let sub = right_size(size);
            if sub == 0 {
                0
            } else {
                x + root(sub)
            }
        }
        None => 0,
    }
}

/// Heap index of value `x`, or 0 if `x` is not a node
pub fn preorder_index(m: usize, x: usize) -> usize {
    walk(m, x).map_or(0, |(_, index)| index)
}

/// Value stored at heap index `p`, or 0 if there is no such node.
///
/// Descends along the bits of `p` below its leading one: 0 goes left, 1 goes
/// right.
pub fn postorder_to_inorder_value(m: usize, p: usize) -> usize {
    if p == 0 || p > m {
        return 0;
    }
    let mut value = root(m);
    let mut size = m;
    for bit in (0..super::floor_log2(p)).rev() {
        if p & (1 << bit) == 0 {
            size = left_size(size);
            if size == 0 {
                return 0;
            }
            value = value - size + left_size(size);
        } else {
            size = right_size(size);
            if size == 0 {
                return 0;
            }
            value += left_size(size) + 1;
        }
    }
    value
}

/// Group size at regrouping round `i`: `m` for round 0, then the height of
/// the previous round's group size
pub fn iterated_height(m: usize, i: usize) -> usize {
    let mut size = m;
    for _ in 0..i {
        size = height(size) as usize;
    }
    size
}

/// Number of groups at round `i`
pub fn group_count(m: usize, i: usize) -> usize {
    super::ceil_div(m, iterated_height(m, i))
}

/// First round whose groups have at most two members
pub fn l_star(m: usize) -> usize {
    let mut i = 0;
    while iterated_height(m, i) > 2 {
        i += 1;
    }
    i
}

/// 1-based position of member `k` of group `j` at round `i`
pub fn alpha(m: usize, i: usize, j: usize, k: usize) -> usize {
    (j - 1) * iterated_height(m, i) + k
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::inorder::osb;
    use proptest::prelude::*;

    #[test]
    fn test_small_tree() {
        // 3 nodes: 2 at the root, 1 and 3 below
        assert_eq!(root(3), 2);
        assert_eq!(left_child_value(3, 2), 1);
        assert_eq!(right_child_value(3, 2), 3);
        assert_eq!(left_child_value(3, 1), 0);
        assert_eq!(preorder_index(3, 2), 1);
        assert_eq!(preorder_index(3, 1), 2);
        assert_eq!(preorder_index(3, 3), 3);
        assert_eq!(preorder_index(3, 0), 0);
        assert_eq!(postorder_to_inorder_value(3, 2), 1);
        assert_eq!(postorder_to_inorder_value(3, 4), 0);
    }

    #[test]
    fn test_children_follow_heap_indices() {
        for m in 1..300 {
            for x in 1..=m {
                let p = preorder_index(m, x);
                let left = left_child_value(m, x);
                let right = right_child_value(m, x);
                if left != 0 {
                    assert!(left < x);
                    assert_eq!(preorder_index(m, left), 2 * p);
                }
                if right != 0 {
                    assert!(right > x);
                    assert_eq!(preorder_index(m, right), 2 * p + 1);
                }
            }
        }
    }

    #[test]
    fn test_iterated_heights() {
        assert_eq!(iterated_height(16, 0), 16);
        assert_eq!(iterated_height(16, 1), 5);
        assert_eq!(iterated_height(16, 2), 3);
        assert_eq!(iterated_height(16, 3), 2);
        assert_eq!(l_star(16), 3);
        assert_eq!(l_star(2), 0);
        assert_eq!(group_count(16, 1), 4);
        assert_eq!(group_count(0, 1), 0);
        assert_eq!(alpha(16, 1, 2, 3), 8);
    }

    proptest! {
        #[test]
        fn prop_heap_index_round_trip(m in 1usize..3000, seed in 0usize..3000) {
            let p = seed % m + 1;
            let x = postorder_to_inorder_value(m, p);
            prop_assert!(x >= 1 && x <= m);
            prop_assert_eq!(preorder_index(m, x), p);
        }

        #[test]
        fn prop_families_agree(m in 1usize..3000, seed in 0usize..3000) {
            let p = seed % m + 1;
            prop_assert_eq!(postorder_to_inorder_value(m, p), osb(m, p - 1) + 1);
        }
    }
}
