use crate::models::{Quad, QuadHash};

/// Maps a quad to its point in the 4-D unit cube: the positions of `c`
/// and `d` after affine normalization against the `a`-`b` bounding box.
///
/// The encoding is invariant under translation and under independent
/// rescaling of either axis, which is what makes catalog lookups robust
/// to time- and pitch-shifted queries. Returns `None` for a degenerate
/// box (`b.x == a.x` or `b.y == a.y`); quads that satisfy the ordering
/// invariant never are.
pub fn quad_hash(q: &Quad) -> Option<QuadHash> {
    if q.b.x == q.a.x || q.b.y == q.a.y {
        return None;
    }
    let width = f64::from(q.b.x) - f64::from(q.a.x);
    let height = f64::from(q.b.y) - f64::from(q.a.y);
    Some(QuadHash {
        xc: (f64::from(q.c.x) - f64::from(q.a.x)) / width,
        yc: (f64::from(q.c.y) - f64::from(q.a.y)) / height,
        xd: (f64::from(q.d.x) - f64::from(q.a.x)) / width,
        yd: (f64::from(q.d.y) - f64::from(q.a.y)) / height,
    })
}
