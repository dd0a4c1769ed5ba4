//! Quad-based audio fingerprinting and matching.
//!
//! A catalog of reference recordings is indexed by geometric quads of
//! spectral peaks; each quad hashes into a translation- and
//! scale-invariant point in [0,1]^4. Query clips are fingerprinted the
//! same way, candidate quads are gathered with ε-box range queries, and
//! a filter / histogram / outlier-removal / peak-verification pipeline
//! turns the raw hits into verified matches that survive moderate
//! time- and pitch-scale distortion.

pub mod audio;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod hash;
pub mod index;
pub mod matcher;
pub mod models;
pub mod quads;
pub mod spectrum;
pub mod storage;

pub use audio::{AudioLoader, LoadOptions};
pub use engine::Engine;
pub use error::{Error, Result};
pub use fingerprint::Fingerprint;
pub use matcher::{CancelToken, Matcher};
pub use models::{
    FingerprintParams, FpType, Match, MatchCandidate, MatcherConfig, Peak, Quad, QuadHash,
};
pub use spectrum::Spectrogram;
