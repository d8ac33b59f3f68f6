//! Inorder addressing of an implicit tree.
//!
//! Values `0..m` are placed so that an inorder walk visits them in increasing
//! order. Nodes are addressed by heap index: the root is 0 and node `y` has
//! children `2y+1` and `2y+2`. [`bso`] maps a value to the heap index holding
//! it and [`osb`] maps back.

use super::{floor_log2, pow2};

/// Number of levels of a tree with `m` nodes
pub fn height(m: usize) -> u32 {
    usize::BITS - m.leading_zeros()
}

/// Nodes of a complete tree with `h` levels, `h <= usize::BITS`
pub fn full_size(h: u32) -> usize {
    match h {
        0 => 0,
        _ => usize::MAX >> (usize::BITS - h),
    }
}

/// Leaves missing from the last level
pub fn missing_leaves(m: usize) -> usize {
    full_size(height(m)) - m
}

/// Nodes in the left subtree of the root
pub fn left_size(m: usize) -> usize {
    if m <= 1 {
        return 0;
    }
    let h = height(m);
    full_size(h - 1) - missing_leaves(m).saturating_sub(pow2(h - 2))
}

/// Nodes in the right subtree of the root
pub fn right_size(m: usize) -> usize {
    if m == 0 {
        return 0;
    }
    m - 1 - left_size(m)
}

pub fn left_child(y: usize) -> usize {
    2 * y + 1
}

pub fn right_child(y: usize) -> usize {
    2 * y + 2
}

/// Parent heap index; the root is its own parent
pub fn parent(y: usize) -> usize {
    if y == 0 {
        0
    } else {
        (y - 1) / 2
    }
}

/// Depth of heap index `y`, the root being level 0
pub fn level(y: usize) -> u32 {
    floor_log2(y + 1)
}

/// Offset of `y` within its level
pub fn position_in_level(y: usize) -> usize {
    y - full_size(level(y))
}

/// Heap index of the `pos`-th node of level `l`
pub fn heap_index_at(l: u32, pos: usize) -> usize {
    full_size(l) + pos
}

/// Nodes present on level `l` of a tree with `m` nodes
pub fn level_size(m: usize, l: u32) -> usize {
    let h = height(m);
    if l >= h {
        0
    } else if l == h - 1 {
        pow2(l) - missing_leaves(m)
    } else {
        pow2(l)
    }
}

/// Heap index holding value `x`. Identity outside `0..m`.
pub fn bso(m: usize, x: usize) -> usize {
    if x >= m {
        return x;
    }
    let mut y = 0;
    let mut value = left_size(m);
    let mut size = m;
    while value != x {
        if x < value {
            y = left_child(y);
            size = left_size(size);
            value = value - size + left_size(size);
        } else {
            y = right_child(y);
            size = right_size(size);
            value = value + left_size(size) + 1;
        }
    }
    y
}

/// Value stored at heap index `y`. Identity outside `0..m`.
pub fn osb(m: usize, y: usize) -> usize {
    if y >= m {
        return y;
    }
    let depth = level(y);
    let mut pos = position_in_level(y);
    let mut half = if depth > 0 { pow2(depth - 1) } else { 0 };
    let mut value = left_size(m);
    let mut size = m;
    for _ in 0..depth {
        if pos < half {
            size = left_size(size);
            value = value - size + left_size(size);
        } else {
            size = right_size(size);
            value = value + left_size(size) + 1;
            pos -= half;
        }
        half /= 2;
    }
    value
}
