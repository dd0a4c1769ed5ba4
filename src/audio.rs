use std::path::Path;

use crate::error::{Error, Result};

/// Sample rate the engine operates at. Input at any other rate must be
/// resampled by the caller before it reaches the loader.
pub const SAMPLE_RATE: u32 = 16_000;

/// Options for [`AudioLoader::load_wav`].
#[derive(Clone, Copy, Debug)]
pub struct LoadOptions {
    /// Apply loudness normalization toward `target_dbfs`.
    pub normalize: bool,
    /// Loudness target, dBFS relative to full scale.
    pub target_dbfs: f64,
    /// Keep only the first `snip` seconds of the clip.
    pub snip: Option<f64>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions { normalize: true, target_dbfs: -20.0, snip: None }
    }
}

/// Loads audio files and normalizes them into the shape the
/// fingerprinting front end expects: mono f64 samples in [-1, 1] at
/// 16 kHz.
pub struct AudioLoader;

impl AudioLoader {
    /// Loads a WAV file and returns its samples.
    ///
    /// Multi-channel input is downmixed by per-frame averaging. Sample
    /// rates other than 16 kHz are rejected; resampling is the caller's
    /// job.
    pub fn load_wav(path: impl AsRef<Path>, opts: &LoadOptions) -> Result<Vec<f64>> {
        let path = path.as_ref();
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        log::debug!(
            "{}: {} Hz, {} channel(s), {} bit",
            path.display(),
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample
        );

        if spec.sample_rate != SAMPLE_RATE {
            return Err(Error::UnsupportedAudio(format!(
                "{} is sampled at {} Hz, expected {} Hz",
                path.display(),
                spec.sample_rate,
                SAMPLE_RATE
            )));
        }

        // Convert samples to f64 in [-1, 1] based on the stored format.
        let samples: Vec<f64> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map(f64::from))
                .collect::<std::result::Result<_, _>>()?,
            hound::SampleFormat::Int => match spec.bits_per_sample {
                16 => reader
                    .samples::<i16>()
                    .map(|s| s.map(|s| f64::from(s) / f64::from(i16::MAX)))
                    .collect::<std::result::Result<_, _>>()?,
                24 => reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| f64::from(s) / f64::from(1i32 << 23)))
                    .collect::<std::result::Result<_, _>>()?,
                32 => reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| f64::from(s) / f64::from(i32::MAX)))
                    .collect::<std::result::Result<_, _>>()?,
                other => {
                    return Err(Error::UnsupportedAudio(format!(
                        "unsupported bit depth: {other}"
                    )))
                }
            },
        };

        let mut samples = downmix(samples, spec.channels as usize);

        if opts.normalize {
            apply_gain(&mut samples, opts.target_dbfs);
        }

        if let Some(snip) = opts.snip {
            let duration = samples.len() as f64 / f64::from(SAMPLE_RATE);
            if snip > duration {
                return Err(Error::InvalidAudioLength(format!(
                    "snip of {snip:.1}s exceeds the {duration:.1}s clip"
                )));
            }
            samples.truncate((snip * f64::from(SAMPLE_RATE)) as usize);
        }

        log::debug!(
            "loaded {} samples ({:.2}s)",
            samples.len(),
            samples.len() as f64 / f64::from(SAMPLE_RATE)
        );
        Ok(samples)
    }
}

fn downmix(samples: Vec<f64>, channels: usize) -> Vec<f64> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f64>() / frame.len() as f64)
        .collect()
}

/// Scales the clip so its RMS loudness lands on `target_dbfs`.
fn apply_gain(samples: &mut [f64], target_dbfs: f64) {
    let sum_sq: f64 = samples.iter().map(|s| s * s).sum();
    if sum_sq == 0.0 {
        return;
    }
    let rms = (sum_sq / samples.len() as f64).sqrt();
    let current_dbfs = 20.0 * rms.log10();
    let gain = 10f64.powf((target_dbfs - current_dbfs) / 20.0);
    for s in samples.iter_mut() {
        *s *= gain;
    }
}
