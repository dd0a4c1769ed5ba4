use std::collections::HashMap;

use crate::models::{FingerprintParams, Peak, Quad};
use crate::spectrum::Spectrogram;

/// Width of the time-axis partitions used to cap quad density (about one
/// second of frames).
pub const PARTITION_WIDTH: u32 = 250;

/// Enumerates every valid quad of a peak list, taking each peak in turn
/// as the root. `peaks` must be sorted ascending by `x`, then `y`.
pub fn enumerate_quads(peaks: &[Peak], params: &FingerprintParams) -> Vec<Quad> {
    let mut all = Vec::new();
    for &root in peaks {
        quads_for_root(root, peaks, params, &mut all);
    }
    all
}

/// Finds the valid quads anchored at `root`.
///
/// Candidate points are the peaks inside the target window
/// `[root.x + c - r/2, root.x + c + r/2]`, located by binary search on
/// the x-sorted list. Fewer than three windowed peaks produce nothing.
/// All x-sorted triples `(C, D, B)` are tried; a triple is kept when the
/// quad ordering holds. Each combination is visited once, so a quad is
/// never emitted twice for the same root.
pub fn quads_for_root(root: Peak, peaks: &[Peak], params: &FingerprintParams, out: &mut Vec<Quad>) {
    let windowed = window_peaks(root, peaks, params);
    if windowed.len() < 3 {
        return;
    }
    for i in 0..windowed.len() {
        for j in i + 1..windowed.len() {
            for k in j + 1..windowed.len() {
                let (c, d, b) = (windowed[i], windowed[j], windowed[k]);
                if is_valid(root, c, d, b) {
                    out.push(Quad::new(root, c, d, b));
                }
            }
        }
    }
}

fn window_peaks<'a>(root: Peak, peaks: &'a [Peak], params: &FingerprintParams) -> &'a [Peak] {
    let start = i64::from(root.x) + i64::from(params.c) - i64::from(params.r / 2);
    let end = start + i64::from(params.r);
    let lo = peaks.partition_point(|p| i64::from(p.x) < start);
    let hi = peaks.partition_point(|p| i64::from(p.x) <= end);
    &peaks[lo..hi]
}

/// The quad ordering invariant:
/// `a.x < c.x <= d.x <= b.x`, `a.y < c.y < b.y`, `a.y < d.y <= b.y`.
fn is_valid(a: Peak, c: Peak, d: Peak, b: Peak) -> bool {
    a.x < c.x
        && c.x <= d.x
        && d.x <= b.x
        && a.y < c.y
        && c.y < b.y
        && a.y < d.y
        && d.y <= b.y
}

/// Caps quad density per unit time: partitions quads by `a.x` into
/// 250-frame bins and keeps the `cap` spectrally strongest per bin, where
/// strength is the summed spectrogram magnitude under `c` and `d`. Ties
/// resolve toward earlier enumeration order, and the survivors keep their
/// enumeration order.
pub fn strongest_per_partition(quads: Vec<Quad>, spec: &Spectrogram, cap: usize) -> Vec<Quad> {
    let mut by_partition: HashMap<u32, Vec<usize>> = HashMap::new();
    for (i, q) in quads.iter().enumerate() {
        by_partition.entry(q.a.x / PARTITION_WIDTH).or_default().push(i);
    }

    let mut keep = Vec::new();
    for indices in by_partition.values_mut() {
        indices.sort_by(|&i, &j| {
            strength(&quads[j], spec)
                .total_cmp(&strength(&quads[i], spec))
                .then(i.cmp(&j))
        });
        keep.extend(indices.iter().take(cap).copied());
    }
    keep.sort_unstable();
    keep.into_iter().map(|i| quads[i]).collect()
}

fn strength(q: &Quad, spec: &Spectrogram) -> f64 {
    spec.value(q.c.x, q.c.y) + spec.value(q.d.x, q.d.y)
}
