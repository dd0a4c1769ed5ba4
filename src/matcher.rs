use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::index::RangeIndex;
use crate::models::{Match, MatchCandidate, MatcherConfig, Quad, RecordId};
use crate::storage::Catalog;

/// Cooperative cancellation flag for a running query. Cancelling is not
/// an error: the query returns whatever it has verified so far.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// One filtered hash hit: the estimated alignment of the query within a
/// reference, plus the scale factors that produced it.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CandidateHit {
    pub offset: f64,
    pub s_time: f64,
    pub s_freq: f64,
}

/// The query pipeline: per-hash range queries, the four candidate filter
/// tests, temporal histogram binning, scale outlier removal, and peak
/// verification. Stateless across queries; all tunables come from the
/// [`MatcherConfig`].
pub struct Matcher<'a> {
    index: &'a dyn RangeIndex,
    catalog: &'a dyn Catalog,
    config: MatcherConfig,
}

impl<'a> Matcher<'a> {
    pub fn new(index: &'a dyn RangeIndex, catalog: &'a dyn Catalog, config: MatcherConfig) -> Self {
        Matcher { index, catalog, config }
    }

    pub fn query(&self, fp: &Fingerprint) -> Result<Vec<Match>> {
        self.query_with_cancel(fp, &CancelToken::new())
    }

    /// Runs the full pipeline. The token is checked at stage boundaries
    /// and between per-candidate verifications; once it trips, the
    /// matches verified so far are returned.
    pub fn query_with_cancel(&self, fp: &Fingerprint, cancel: &CancelToken) -> Result<Vec<Match>> {
        let buckets = self.gather(fp)?;
        log::debug!("stage 1: hits for {} record(s)", buckets.len());
        if cancel.is_cancelled() {
            return Ok(Vec::new());
        }

        let mut candidates = Vec::new();
        for (record_id, hits) in buckets {
            let bins = bin_offsets(&hits, &self.config);
            candidates.extend(candidates_from_bins(record_id, bins, &self.config));
        }
        log::debug!("stages 2-3: {} candidate cluster(s)", candidates.len());
        if cancel.is_cancelled() {
            return Ok(Vec::new());
        }

        let mut matches = Vec::new();
        for cand in &candidates {
            if cancel.is_cancelled() {
                break;
            }
            let v_score = self.verify(fp, cand)?;
            if v_score < self.config.v_threshold {
                continue;
            }
            let Some(title) = self.catalog.title(cand.record_id)? else {
                log::warn!("candidate points at unknown record {}", cand.record_id);
                continue;
            };
            matches.push(Match {
                title,
                record_id: cand.record_id,
                offset: cand.offset,
                num_matches: cand.num_matches,
                s_time: cand.s_time,
                s_freq: cand.s_freq,
                v_score,
            });
        }

        matches.sort_by(|a, b| {
            b.v_score
                .total_cmp(&a.v_score)
                .then(b.num_matches.cmp(&a.num_matches))
                .then(a.record_id.cmp(&b.record_id))
        });
        Ok(matches)
    }

    /// Stage 1: for every query hash, range-query the index with an
    /// ε-box, resolve each hit to its stored quad, and keep the ones
    /// passing the filter tests, bucketed per record.
    fn gather(&self, fp: &Fingerprint) -> Result<BTreeMap<RecordId, Vec<CandidateHit>>> {
        let eps = self.config.epsilon;
        let mut buckets: BTreeMap<RecordId, Vec<CandidateHit>> = BTreeMap::new();
        for (hash, quad) in fp.hashes.iter().zip(&fp.quads) {
            let point = hash.as_array();
            let lo = point.map(|v| v - eps);
            let hi = point.map(|v| v + eps);
            for quad_id in self.index.range_query(lo, hi) {
                let Some(row) = self.catalog.quad_row(quad_id)? else {
                    continue;
                };
                if let Some(hit) = filter_candidate(quad, &row.quad, &self.config) {
                    buckets.entry(row.record_id).or_default().push(hit);
                }
            }
        }
        Ok(buckets)
    }

    /// Stage 4: fetch the reference peaks within the lookup horizon past
    /// the estimated offset, map each into query coordinates, and count
    /// how many are corroborated by a query peak. The score is the
    /// corroborated fraction.
    fn verify(&self, fp: &Fingerprint, cand: &MatchCandidate) -> Result<f64> {
        let ref_peaks = self.catalog.peaks_between(
            cand.record_id,
            cand.offset,
            cand.offset + self.config.lookup_horizon,
        )?;
        if ref_peaks.is_empty() {
            return Ok(0.0);
        }

        let mut validated = 0usize;
        for rp in &ref_peaks {
            let px = (f64::from(rp.x) - cand.offset as f64) / cand.s_freq;
            let py = f64::from(rp.y) / cand.s_time;
            if self.query_peak_near(fp, px, py) {
                validated += 1;
            }
        }
        Ok(validated as f64 / ref_peaks.len() as f64)
    }

    /// Is any query peak within the verification tolerances of `(px, py)`?
    /// The query peak list is x-sorted, so the x-window is located by
    /// binary search.
    fn query_peak_near(&self, fp: &Fingerprint, px: f64, py: f64) -> bool {
        let x_lo = px - self.config.e_x;
        let x_hi = px + self.config.e_x;
        let start = fp.peaks.partition_point(|p| f64::from(p.x) < x_lo);
        fp.peaks[start..]
            .iter()
            .take_while(|p| f64::from(p.x) <= x_hi)
            .any(|p| (f64::from(p.y) - py).abs() <= self.config.e_y)
    }
}

/// The four filter tests of stage 1. `None` means the candidate is
/// rejected; division by zero or any other non-finite intermediate
/// rejects silently, because the bound checks fail for NaN and infinity.
pub(crate) fn filter_candidate(qq: &Quad, cq: &Quad, config: &MatcherConfig) -> Option<CandidateHit> {
    let lo = 1.0 / (1.0 + config.e);
    let hi = 1.0 / (1.0 - config.e);
    let within = |v: f64| v >= lo && v <= hi;

    // Rough pitch coherence of the roots.
    let rough_pitch = f64::from(qq.a.y) / f64::from(cq.a.y);
    if !within(rough_pitch) {
        return None;
    }

    // Time- and frequency-scale between the bounding boxes.
    let s_time =
        (f64::from(qq.b.x) - f64::from(qq.a.x)) / (f64::from(cq.b.x) - f64::from(cq.a.x));
    if !within(s_time) {
        return None;
    }
    let s_freq =
        (f64::from(qq.b.y) - f64::from(qq.a.y)) / (f64::from(cq.b.y) - f64::from(cq.a.y));
    if !within(s_freq) {
        return None;
    }

    // Fine pitch coherence once the scale estimate is known.
    if (f64::from(qq.a.y) - f64::from(cq.a.y) * s_freq).abs() > config.e_fine {
        return None;
    }

    let offset = f64::from(cq.a.x) - f64::from(qq.a.x) / s_time;
    if !offset.is_finite() {
        return None;
    }
    Some(CandidateHit { offset, s_time, s_freq })
}

/// Stage 2: histogram the offsets of one record's hits into
/// `binwidth`-frame bins (floored toward -inf) and drop bins that are too
/// thin to be a real alignment.
pub(crate) fn bin_offsets(
    hits: &[CandidateHit],
    config: &MatcherConfig,
) -> BTreeMap<i64, Vec<(f64, f64)>> {
    let width = config.binwidth as f64;
    let mut bins: BTreeMap<i64, Vec<(f64, f64)>> = BTreeMap::new();
    for hit in hits {
        let key = (hit.offset / width).floor() as i64 * config.binwidth;
        bins.entry(key).or_default().push((hit.s_time, hit.s_freq));
    }
    bins.retain(|_, entries| entries.len() >= config.min_bin_size);
    bins
}

/// Stage 3: within each surviving bin, drop scale outliers, re-check the
/// bin size, and summarize the survivors into match candidates, strongest
/// cluster first.
fn candidates_from_bins(
    record_id: RecordId,
    bins: BTreeMap<i64, Vec<(f64, f64)>>,
    config: &MatcherConfig,
) -> Vec<MatchCandidate> {
    let mut out = Vec::new();
    for (bin_offset, entries) in bins {
        let kept = prune_outliers(&entries);
        if kept.len() < config.min_bin_size {
            continue;
        }
        let n = kept.len() as f64;
        let s_time = kept.iter().map(|e| e.0).sum::<f64>() / n;
        let s_freq = kept.iter().map(|e| e.1).sum::<f64>() / n;
        out.push(MatchCandidate {
            record_id,
            offset: bin_offset,
            num_matches: kept.len(),
            s_time,
            s_freq,
        });
    }
    out.sort_by(|a, b| b.num_matches.cmp(&a.num_matches).then(a.offset.cmp(&b.offset)));
    out
}

/// Keeps the entries within two standard deviations of the mean on both
/// scale axes. An axis with zero spread rejects nothing; with the strict
/// comparison it would otherwise empty the bin.
pub(crate) fn prune_outliers(entries: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let (mean_t, sd_t) = mean_std(entries.iter().map(|e| e.0));
    let (mean_f, sd_f) = mean_std(entries.iter().map(|e| e.1));
    let inlier = |v: f64, mean: f64, sd: f64| sd == 0.0 || (v - mean).abs() < 2.0 * sd;
    entries
        .iter()
        .copied()
        .filter(|&(t, f)| inlier(t, mean_t, sd_t) && inlier(f, mean_f, sd_f))
        .collect()
}

fn mean_std(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let n = values.clone().count();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.clone().sum::<f64>() / n as f64;
    let var = values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
    (mean, var.sqrt())
}
