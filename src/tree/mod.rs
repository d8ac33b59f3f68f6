//! Implicit balanced binary trees
//!
//! A tree of `m` nodes is never stored. Its shape is fixed by `m` alone: the
//! left and right subtrees split the remaining nodes so that the tree stays
//! height-balanced and missing leaves sit at the right end of the last level.
//! Every function here is pure integer arithmetic running in O(log m).
//!
//! Two addressing schemes are provided:
//!
//! - [`inorder`]: 0-based values, heap indices with children `2y+1` and `2y+2`.
//! - [`preorder`]: 1-based values, heap indices with children `2p` and `2p+1`,
//!   used to derive collision-free broadcast schedules.

pub mod inorder;
pub mod preorder;

/// `2^exp`
pub fn pow2(exp: u32) -> usize {
    1usize << exp
}

/// Smallest `i` with `2^i >= x`
pub fn ceil_log2(x: usize) -> u32 {
    if x <= 1 {
        0
    } else {
        usize::BITS - (x - 1).leading_zeros()
    }
}

/// Largest `i` with `2^i <= x`; zero for `x <= 1`
pub fn floor_log2(x: usize) -> u32 {
    if x <= 1 {
        0
    } else {
        usize::BITS - 1 - x.leading_zeros()
    }
}

/// `ceil(a / b)`, zero when `b` is zero
pub fn ceil_div(a: usize, b: usize) -> usize {
    if b == 0 {
        0
    } else {
        (a + b - 1) / b
    }
}
