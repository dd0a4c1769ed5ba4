use crate::error::{Error, Result};
use crate::hash::quad_hash;
use crate::models::{FingerprintParams, FpType, Peak, Quad, QuadHash};
use crate::quads::{enumerate_quads, strongest_per_partition};
use crate::spectrum::{find_peaks, stft, Spectrogram};

/// The fingerprint of one recording or one query clip: its spectral
/// peaks, the selected quads, and their hashes. `hashes[i]` always
/// belongs to `quads[i]`.
#[derive(Clone, Debug)]
pub struct Fingerprint {
    pub fp_type: FpType,
    pub params: FingerprintParams,
    /// All extracted peaks, sorted ascending by `x`, then `y`.
    pub peaks: Vec<Peak>,
    pub quads: Vec<Quad>,
    pub hashes: Vec<QuadHash>,
}

impl Fingerprint {
    /// Fingerprints a clip of mono 16 kHz samples with the preset for
    /// `fp_type`.
    pub fn from_samples(samples: &[f64], fp_type: FpType) -> Result<Self> {
        Self::from_samples_with(samples, fp_type, fp_type.params())
    }

    pub fn from_samples_with(
        samples: &[f64],
        fp_type: FpType,
        params: FingerprintParams,
    ) -> Result<Self> {
        let spec = stft(samples);
        if spec.frames() <= params.c as usize {
            return Err(Error::InvalidAudioLength(format!(
                "spectrogram of {} frames cannot reach the target window at offset {}",
                spec.frames(),
                params.c
            )));
        }
        let peaks = find_peaks(&spec, params.w, params.h);
        log::debug!("extracted {} peaks from {} frames", peaks.len(), spec.frames());
        Self::from_peaks_with(peaks, &spec, fp_type, params)
    }

    /// Builds a fingerprint from an already-extracted peak list, the seam
    /// for callers that bring their own DSP front end.
    pub fn from_peaks(peaks: Vec<Peak>, spec: &Spectrogram, fp_type: FpType) -> Result<Self> {
        Self::from_peaks_with(peaks, spec, fp_type, fp_type.params())
    }

    pub fn from_peaks_with(
        mut peaks: Vec<Peak>,
        spec: &Spectrogram,
        fp_type: FpType,
        params: FingerprintParams,
    ) -> Result<Self> {
        peaks.sort_unstable();
        if peaks.len() < 4 {
            return Err(Error::TooFewPeaks(peaks.len()));
        }

        let candidates = enumerate_quads(&peaks, &params);
        if candidates.is_empty() {
            return Err(Error::NoQuadsFound);
        }
        let selected = strongest_per_partition(candidates, spec, params.q);

        let mut quads = Vec::with_capacity(selected.len());
        let mut hashes = Vec::with_capacity(selected.len());
        for quad in selected {
            // The ordering invariant rules degenerate boxes out, but the
            // hash stays the authority on what it can encode.
            if let Some(hash) = quad_hash(&quad) {
                quads.push(quad);
                hashes.push(hash);
            }
        }
        log::debug!("{} quads selected for {fp_type} fingerprint", quads.len());

        Ok(Fingerprint { fp_type, params, peaks, quads, hashes })
    }
}
