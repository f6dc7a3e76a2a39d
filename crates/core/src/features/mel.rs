//! Spectral building blocks shared by the MFCC extractor and the display
//! spectrogram.
//!
//! The conventions follow the common speech-feature defaults: centered frames
//! with zero padding, a periodic Hann window, a Slaney-style mel scale with
//! area-normalised triangles, decibel conversion with an 80 dB floor and an
//! orthonormal DCT-II.

use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

/// Smallest power considered before taking the logarithm.
pub const AMIN: f32 = 1e-10;
/// Dynamic range kept below the loudest bin.
pub const TOP_DB: f32 = 80.0;

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1_000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Slaney mel scale: linear below 1 kHz, logarithmic above.
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Periodic Hann window (the DFT-even variant used for spectral analysis).
pub fn hann_window(len: usize) -> Vec<f32> {
    if len == 1 {
        return vec![1.0];
    }
    let n = len as f64;
    (0..len)
        .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f64 / n).cos()) as f32)
        .collect()
}

/// Number of frames a centered STFT yields for `len` input samples.
pub fn frame_count(len: usize, n_fft: usize, hop: usize) -> usize {
    let padded = len + 2 * (n_fft / 2);
    if padded < n_fft || hop == 0 {
        0
    } else {
        1 + (padded - n_fft) / hop
    }
}

/// Power spectrogram `|STFT|^2` with shape `(n_fft / 2 + 1, n_frames)`.
///
/// The signal is zero-padded by `n_fft / 2` on both sides so that frame `t`
/// is centered on sample `t * hop`.
pub fn power_spectrogram(signal: &[f32], n_fft: usize, hop: usize) -> Array2<f32> {
    let n_freqs = n_fft / 2 + 1;
    let n_frames = frame_count(signal.len(), n_fft, hop);
    let mut power = Array2::<f32>::zeros((n_freqs, n_frames));
    if n_frames == 0 {
        return power;
    }

    let pad = n_fft / 2;
    let mut padded = vec![0.0f32; signal.len() + 2 * pad];
    padded[pad..pad + signal.len()].copy_from_slice(signal);

    let window = hann_window(n_fft);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut scratch = vec![Complex::new(0.0f32, 0.0f32); fft.get_inplace_scratch_len()];
    let mut buffer = vec![Complex::new(0.0f32, 0.0f32); n_fft];

    for t in 0..n_frames {
        let start = t * hop;
        let frame = &padded[start..start + n_fft];
        for ((dst, &x), &w) in buffer.iter_mut().zip(frame).zip(&window) {
            *dst = Complex::new(x * w, 0.0);
        }
        fft.process_with_scratch(&mut buffer, &mut scratch);
        for (k, c) in buffer.iter().take(n_freqs).enumerate() {
            power[[k, t]] = c.norm_sqr();
        }
    }

    power
}

/// Triangular mel filters with shape `(n_mels, n_fft / 2 + 1)`, spanning
/// 0 Hz to Nyquist. Each triangle is scaled by `2 / bandwidth` so the
/// filters have roughly constant energy per band.
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Array2<f32> {
    let n_freqs = n_fft / 2 + 1;
    let sr = f64::from(sample_rate);
    let fft_freqs: Vec<f64> = (0..n_freqs)
        .map(|k| k as f64 * sr / n_fft as f64)
        .collect();

    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(sr / 2.0);
    let step = (mel_max - mel_min) / (n_mels + 1) as f64;
    let mel_hz: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + step * i as f64))
        .collect();

    let mut weights = Array2::<f32>::zeros((n_mels, n_freqs));
    for m in 0..n_mels {
        let (left, center, right) = (mel_hz[m], mel_hz[m + 1], mel_hz[m + 2]);
        let lower_width = center - left;
        let upper_width = right - center;
        let enorm = 2.0 / (right - left);
        for (k, &f) in fft_freqs.iter().enumerate() {
            let lower = (f - left) / lower_width;
            let upper = (right - f) / upper_width;
            let w = lower.min(upper).max(0.0);
            weights[[m, k]] = (w * enorm) as f32;
        }
    }
    weights
}

/// Converts power to decibels: `10 * log10(max(S, AMIN) / reference)`, then
/// floors everything more than `top_db` below the maximum.
pub fn power_to_db(power: &Array2<f32>, reference: f32, top_db: Option<f32>) -> Array2<f32> {
    let ref_db = 10.0 * reference.abs().max(AMIN).log10();
    let mut db = power.mapv(|p| 10.0 * p.max(AMIN).log10() - ref_db);
    if let Some(range) = top_db {
        let peak = db.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let floor = peak - range;
        db.mapv_inplace(|v| v.max(floor));
    }
    db
}

/// Orthonormal DCT-II basis, truncated to the first `n_out` rows.
pub fn dct_matrix(n_out: usize, n_in: usize) -> Array2<f32> {
    let n = n_in as f64;
    let mut basis = Array2::<f32>::zeros((n_out, n_in));
    for k in 0..n_out {
        let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
        for i in 0..n_in {
            let angle = PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n);
            basis[[k, i]] = (scale * angle.cos()) as f32;
        }
    }
    basis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mel_scale_round_trips_at_known_points() {
        assert!((hz_to_mel(1_000.0) - 15.0).abs() < 1e-12);
        assert!((hz_to_mel(200.0) - 3.0).abs() < 1e-12);
        for hz in [0.0, 440.0, 999.0, 4_000.0, 11_025.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 1e-6, "hz={hz}");
        }
    }

    #[test]
    fn hann_is_periodic() {
        let w = hann_window(4);
        assert_eq!(w.len(), 4);
        assert!(w[0].abs() < 1e-7);
        assert!((w[1] - 0.5).abs() < 1e-6);
        assert!((w[2] - 1.0).abs() < 1e-6);
        assert!((w[3] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn centered_frame_count() {
        assert_eq!(frame_count(24_000, 200, 80), 301);
        assert_eq!(frame_count(48_000, 400, 160), 301);
        assert_eq!(frame_count(132_300, 1102, 441), 301);
        assert_eq!(frame_count(0, 3, 1), 0);
    }

    #[test]
    fn sine_energy_lands_in_expected_bin() {
        let sr = 8_000.0f32;
        let n_fft = 256;
        let freq = 1_000.0f32;
        let signal: Vec<f32> = (0..2_048)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr).sin())
            .collect();
        let power = power_spectrogram(&signal, n_fft, 128);
        let frame = power.column(power.ncols() / 2);
        let peak = frame
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |acc, (k, &p)| if p > acc.1 { (k, p) } else { acc })
            .0;
        assert_eq!(peak, 32); // 1 kHz * 256 / 8 kHz
    }

    #[test]
    fn filterbank_shape_and_nonnegative() {
        let fb = mel_filterbank(16_000, 400, 128);
        assert_eq!(fb.dim(), (128, 201));
        assert!(fb.iter().all(|&w| w >= 0.0));
        let top_band_weight: f32 = fb.row(127).sum();
        assert!(top_band_weight > 0.0);
    }

    #[test]
    fn db_conversion_floors_quiet_bins() {
        let power = Array2::from_shape_vec((1, 3), vec![1.0, 1e-12, 0.1]).unwrap();
        let db = power_to_db(&power, 1.0, Some(TOP_DB));
        assert!(db[[0, 0]].abs() < 1e-6);
        assert!((db[[0, 1]] + 80.0).abs() < 1e-4);
        assert!((db[[0, 2]] + 10.0).abs() < 1e-4);
    }

    #[test]
    fn dct_rows_are_orthonormal() {
        let basis = dct_matrix(8, 8);
        for a in 0..8 {
            for b in 0..8 {
                let dot: f32 = basis.row(a).dot(&basis.row(b));
                let expected = if a == b { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-5, "rows {a},{b}: {dot}");
            }
        }
    }
}
