use std::collections::VecDeque;

use rustfft::{num_complex::Complex, FftPlanner};

use crate::models::Peak;

/// STFT frame size in samples (128 ms at 16 kHz).
pub const FRAME_SIZE: usize = 1024;
/// STFT hop size in samples (4 ms per frame).
pub const HOP_SIZE: usize = 32;

const DB_REFERENCE: f64 = 1e-5;

/// A magnitude spectrogram in decibels. Row `x` is one STFT frame, column
/// `y` one frequency bin.
#[derive(Clone, Debug)]
pub struct Spectrogram {
    frames: Vec<Vec<f64>>,
}

impl Spectrogram {
    /// Wraps a pre-computed frame matrix; used by callers that bring
    /// their own DSP front end.
    pub fn from_frames(frames: Vec<Vec<f64>>) -> Self {
        Spectrogram { frames }
    }

    /// Number of frames (time steps).
    pub fn frames(&self) -> usize {
        self.frames.len()
    }

    /// Number of frequency bins per frame.
    pub fn bins(&self) -> usize {
        self.frames.first().map_or(0, Vec::len)
    }

    /// Magnitude at frame `x`, bin `y`; out-of-range positions read as 0.
    pub fn value(&self, x: u32, y: u32) -> f64 {
        self.frames
            .get(x as usize)
            .and_then(|row| row.get(y as usize))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Short-time Fourier transform of a clip.
///
/// Frames of 1024 samples are taken every 32 samples under a Hanning
/// window, with the clip front-padded by half a frame and back-padded by
/// a full frame of silence so every hop yields a complete frame.
/// Magnitudes are converted to decibels against a 1e-5 reference;
/// all-zero bins clamp to 0 instead of -inf.
pub fn stft(samples: &[f64]) -> Spectrogram {
    let front = FRAME_SIZE / 2;
    let mut padded = Vec::with_capacity(samples.len() + front + FRAME_SIZE);
    padded.resize(front, 0.0);
    padded.extend_from_slice(samples);

    let cols = if padded.len() > FRAME_SIZE {
        (padded.len() - FRAME_SIZE).div_ceil(HOP_SIZE) + 1
    } else {
        1
    };
    padded.resize(padded.len() + FRAME_SIZE, 0.0);

    let window = hanning(FRAME_SIZE);
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(FRAME_SIZE);

    let mut frames = Vec::with_capacity(cols);
    let mut buffer = vec![Complex::new(0.0, 0.0); FRAME_SIZE];
    for col in 0..cols {
        let start = col * HOP_SIZE;
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = Complex::new(padded[start + i] * window[i], 0.0);
        }
        fft.process(&mut buffer);

        // Real input: keep the non-redundant half plus the Nyquist bin.
        let bins = buffer[..FRAME_SIZE / 2 + 1]
            .iter()
            .map(|c| {
                let mag = c.norm();
                if mag == 0.0 {
                    0.0
                } else {
                    20.0 * (mag / DB_REFERENCE).log10()
                }
            })
            .collect();
        frames.push(bins);
    }
    Spectrogram { frames }
}

fn hanning(n: usize) -> Vec<f64> {
    let denom = (n - 1) as f64;
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / denom).cos())
        .collect()
}

/// Extracts the local maxima of a spectrogram.
///
/// A cell is a peak when it equals the `w` x `h` sliding maximum at its
/// position and that maximum differs from the 3x3 sliding minimum, which
/// rejects flat regions such as silence. The result is sorted ascending
/// by `x`, then `y`.
pub fn find_peaks(spec: &Spectrogram, w: usize, h: usize) -> Vec<Peak> {
    let maxima = filter_2d(&spec.frames, w, h, Extreme::Max);
    let minima = filter_2d(&spec.frames, 3, 3, Extreme::Min);

    let mut peaks = Vec::new();
    for (x, row) in spec.frames.iter().enumerate() {
        for (y, &v) in row.iter().enumerate() {
            if v == maxima[x][y] && maxima[x][y] != minima[x][y] {
                peaks.push(Peak::new(x as u32, y as u32));
            }
        }
    }
    peaks
}

#[derive(Clone, Copy, PartialEq)]
enum Extreme {
    Max,
    Min,
}

/// Order-statistic filter over a rectangular footprint, separated into a
/// per-row sweep (height) and a per-column sweep (width). Borders clamp
/// to the array edge.
fn filter_2d(frames: &[Vec<f64>], w: usize, h: usize, ext: Extreme) -> Vec<Vec<f64>> {
    let by_rows: Vec<Vec<f64>> = frames.iter().map(|r| sliding_extreme(r, h, ext)).collect();
    let nx = by_rows.len();
    let ny = by_rows.first().map_or(0, Vec::len);
    if nx == 0 || ny == 0 {
        return by_rows;
    }

    let mut out = vec![vec![0.0; ny]; nx];
    let mut column = vec![0.0; nx];
    for y in 0..ny {
        for x in 0..nx {
            column[x] = by_rows[x][y];
        }
        let swept = sliding_extreme(&column, w, ext);
        for x in 0..nx {
            out[x][y] = swept[x];
        }
    }
    out
}

/// Monotonic-deque sliding extreme. For an even `size` the window leans
/// left, covering `[i - size/2, i + size - size/2 - 1]`.
fn sliding_extreme(vals: &[f64], size: usize, ext: Extreme) -> Vec<f64> {
    let n = vals.len();
    let left = size / 2;
    let right = size - left - 1;

    let dominates = |a: f64, b: f64| match ext {
        Extreme::Max => a >= b,
        Extreme::Min => a <= b,
    };

    let mut out = Vec::with_capacity(n);
    let mut deque: VecDeque<usize> = VecDeque::new();
    let mut admitted = 0;
    for i in 0..n {
        let hi = (i + right).min(n - 1);
        while admitted <= hi {
            while let Some(&back) = deque.back() {
                if dominates(vals[admitted], vals[back]) {
                    deque.pop_back();
                } else {
                    break;
                }
            }
            deque.push_back(admitted);
            admitted += 1;
        }
        let lo = i.saturating_sub(left);
        while let Some(&front) = deque.front() {
            if front < lo {
                deque.pop_front();
            } else {
                break;
            }
        }
        out.push(vals[deque[0]]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hanning_is_symmetric_and_zero_edged() {
        let w = hanning(8);
        assert!(w[0].abs() < 1e-12);
        assert!(w[7].abs() < 1e-12);
        for i in 0..4 {
            assert!((w[i] - w[7 - i]).abs() < 1e-12);
        }
    }

    #[test]
    fn stft_frame_count_and_bins() {
        // 1024 samples, front-padded to 1536: ceil(512 / 32) + 1 frames.
        let spec = stft(&vec![0.5; 1024]);
        assert_eq!(spec.frames(), 17);
        assert_eq!(spec.bins(), FRAME_SIZE / 2 + 1);
    }

    #[test]
    fn stft_of_silence_is_all_zero() {
        let spec = stft(&vec![0.0; 2048]);
        for x in 0..spec.frames() {
            for y in 0..spec.bins() {
                assert_eq!(spec.value(x as u32, y as u32), 0.0);
            }
        }
    }

    #[test]
    fn sliding_max_handles_even_windows() {
        let vals = [1.0, 5.0, 2.0, 4.0];
        // size 2 covers [i-1, i].
        assert_eq!(sliding_extreme(&vals, 2, Extreme::Max), vec![1.0, 5.0, 5.0, 4.0]);
    }

    #[test]
    fn sliding_min_matches_brute_force() {
        let vals = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0];
        let got = sliding_extreme(&vals, 3, Extreme::Min);
        for i in 0..vals.len() {
            let lo = i.saturating_sub(1);
            let hi = (i + 1).min(vals.len() - 1);
            let want = vals[lo..=hi].iter().cloned().fold(f64::INFINITY, f64::min);
            assert_eq!(got[i], want);
        }
    }

    #[test]
    fn isolated_maximum_is_a_peak() {
        let mut frames = vec![vec![0.0; 5]; 5];
        frames[2][3] = 6.0;
        let spec = Spectrogram::from_frames(frames);
        assert_eq!(find_peaks(&spec, 3, 3), vec![Peak::new(2, 3)]);
    }

    #[test]
    fn flat_region_yields_no_peaks() {
        let spec = Spectrogram::from_frames(vec![vec![1.5; 6]; 6]);
        assert!(find_peaks(&spec, 3, 3).is_empty());
    }

    #[test]
    fn out_of_range_reads_are_zero() {
        let spec = Spectrogram::from_frames(vec![vec![2.0; 2]; 2]);
        assert_eq!(spec.value(10, 10), 0.0);
    }
}
