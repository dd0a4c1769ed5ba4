use crate::models::FpType;

/// Everything that can go wrong while fingerprinting, storing, or
/// matching. Degenerate match candidates are not represented here; the
/// matcher silently rejects those.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The clip is too short for the configured target window, or a
    /// requested snip exceeds the clip duration.
    #[error("audio too short: {0}")]
    InvalidAudioLength(String),

    /// Peak extraction found fewer than four peaks.
    #[error("only {0} peaks found, at least 4 are needed to form quads")]
    TooFewPeaks(usize),

    /// Peaks were present but no triple validated into a quad.
    #[error("no valid quads could be formed")]
    NoQuadsFound,

    /// A fingerprint type name that is neither `reference` nor `query`.
    #[error("invalid fingerprint type {0:?}, expected \"reference\" or \"query\"")]
    InvalidFpType(String),

    /// A Query fingerprint was offered for storage, or a Reference
    /// fingerprint was used to query.
    #[error("expected a {expected} fingerprint, got {actual}")]
    WrongFingerprintType { expected: FpType, actual: FpType },

    /// The decoder produced audio the engine cannot fingerprint.
    #[error("unsupported audio: {0}")]
    UnsupportedAudio(String),

    #[error("wav decode failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("catalog store: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
