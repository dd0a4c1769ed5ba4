use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Row id of a record in the catalog.
pub type RecordId = i64;

/// Row id of a stored quad; the spatial index links back to the catalog
/// through this id alone.
pub type QuadId = i64;

/// A local time-frequency maximum of the spectrogram.
/// `x` is the STFT frame index, `y` the frequency bin.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Peak {
    pub x: u32,
    pub y: u32,
}

impl Peak {
    pub fn new(x: u32, y: u32) -> Self {
        Peak { x, y }
    }
}

/// Four peaks forming a valid quad: `a` is the root, `b` the far corner,
/// `c` and `d` the interior points.
///
/// Every quad handed out by this crate satisfies
/// `a.x < c.x <= d.x <= b.x`, `a.y < c.y < b.y` and `a.y < d.y <= b.y`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quad {
    pub a: Peak,
    pub c: Peak,
    pub d: Peak,
    pub b: Peak,
}

impl Quad {
    pub fn new(a: Peak, c: Peak, d: Peak, b: Peak) -> Self {
        Quad { a, c, d, b }
    }
}

/// Translation- and scale-invariant hash of a quad: the positions of `c`
/// and `d` after affine normalization against the `a`-`b` bounding box.
/// All four components lie in [0, 1].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct QuadHash {
    pub xc: f64,
    pub yc: f64,
    pub xd: f64,
    pub yd: f64,
}

impl QuadHash {
    pub fn as_array(&self) -> [f64; 4] {
        [self.xc, self.yc, self.xd, self.yd]
    }
}

/// A stored quad together with its catalog ids, as fetched back for a
/// range-query hit. Coordinates are the un-normalized originals so the
/// matcher can recover offsets and scale factors.
#[derive(Clone, Copy, Debug)]
pub struct QuadRow {
    pub quad_id: QuadId,
    pub record_id: RecordId,
    pub quad: Quad,
}

/// A time-aligned cluster of filtered hash hits for one record.
///
/// `offset` is the estimated start of the query within the reference, in
/// reference frame units; `s_time` and `s_freq` are the mean scale factors
/// of the surviving cluster entries.
#[derive(Clone, Debug)]
pub struct MatchCandidate {
    pub record_id: RecordId,
    pub offset: i64,
    pub num_matches: usize,
    pub s_time: f64,
    pub s_freq: f64,
}

/// A verified match returned by a query.
#[derive(Serialize, Clone, Debug)]
pub struct Match {
    pub title: String,
    pub record_id: RecordId,
    /// Estimated start of the query within the reference, in frames.
    pub offset: i64,
    /// Size of the cluster that produced this match.
    pub num_matches: usize,
    pub s_time: f64,
    pub s_freq: f64,
    /// Ratio of reference peaks near `offset` corroborated by a query peak.
    pub v_score: f64,
}

/// The two fingerprint parameter presets. The catalog holds Reference
/// fingerprints; incoming clips are fingerprinted as Query.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FpType {
    Reference,
    Query,
}

impl FpType {
    pub fn params(&self) -> FingerprintParams {
        match self {
            FpType::Reference => FingerprintParams::reference(),
            FpType::Query => FingerprintParams::query(),
        }
    }
}

impl fmt::Display for FpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FpType::Reference => write!(f, "Reference"),
            FpType::Query => write!(f, "Query"),
        }
    }
}

impl FromStr for FpType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "reference" | "Reference" => Ok(FpType::Reference),
            "query" | "Query" => Ok(FpType::Query),
            other => Err(Error::InvalidFpType(other.to_string())),
        }
    }
}

/// Tunables for one fingerprint type.
///
/// `q` caps how many quads survive per unit-time partition, `r` and `c`
/// place the target window along the time axis, and `w`/`h` are the
/// max-filter footprint used during peak extraction. The Reference and
/// Query presets are a matched pair: the query window strictly encloses
/// the reference window, which is what lets a query clip re-enumerate the
/// quads the catalog was built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FingerprintParams {
    /// Per-partition quad cap.
    pub q: usize,
    /// Target window width, in frames.
    pub r: u32,
    /// Target window offset from the root, in frames.
    pub c: u32,
    /// Max-filter width (frames).
    pub w: usize,
    /// Max-filter height (bins).
    pub h: usize,
}

impl FingerprintParams {
    pub fn reference() -> Self {
        FingerprintParams { q: 9, r: 200, c: 325, w: 150, h: 75 }
    }

    pub fn query() -> Self {
        FingerprintParams { q: 500, r: 345, c: 360, w: 125, h: 60 }
    }
}

/// Matcher tunables, lifted out of the pipeline stages. The defaults are
/// the values the engine was calibrated with; every field can be adjusted
/// per engine.
#[derive(Clone, Copy, Debug)]
pub struct MatcherConfig {
    /// Half-width of the range-query box around each query hash.
    pub epsilon: f64,
    /// Scale tolerance of the candidate filter tests.
    pub e: f64,
    /// Absolute tolerance of the fine pitch-coherence test, in bins.
    pub e_fine: f64,
    /// Offset histogram bin width, in frames.
    pub binwidth: i64,
    /// Minimum entries a histogram bin needs to survive, before and after
    /// outlier removal.
    pub min_bin_size: usize,
    /// Peak-verification search half-width along the time axis, in frames.
    pub e_x: f64,
    /// Peak-verification search half-height along the frequency axis.
    pub e_y: f64,
    /// How far past the estimated offset reference peaks are fetched for
    /// verification, in frames.
    pub lookup_horizon: i64,
    /// Minimum verification score for a candidate to become a match.
    pub v_threshold: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig {
            epsilon: 0.01,
            e: 0.2,
            e_fine: 1.8,
            binwidth: 20,
            min_bin_size: 4,
            e_x: 18.0,
            e_y: 12.0,
            lookup_horizon: 3750,
            v_threshold: 0.5,
        }
    }
}
