//! # Matched-filter rolling sum
//!
//! Gaussian-weighted rolling **sum** of a signal-to-noise series, used as the detection
//! statistic (figure of merit, FOM) of the pipeline.
//!
//! ## Algorithm
//! -----------------
//! For a kernel of width `sigma_kern` days and an averaged light curve of bin size `bin`:
//!
//! ```text
//! sigma_bins  = round(sigma_kern / bin)          (>= 1)
//! window      = 6 * sigma_bins
//! half_window = floor(window / 2) + 1
//! w[k]        = exp(-0.5 * ((k - (window - 1) / 2) / sigma_bins)^2),  k = 0..window
//! ```
//!
//! The series is zero-padded by `half_window` on both ends so the edge samples see a
//! truncated (never wrapped) window. The output for sample `i` is the centred weighted sum
//!
//! ```text
//! S[i] = Σ_k padded[i + half_window + offset - window + 1 + k] * w[k],   offset = (window - 1) / 2
//! ```
//!
//! The weights are not normalized: the statistic grows with the number of points under a
//! brightening, which is what a matched filter for point-like events wants.
//!
//! ## Edge correction
//! -----------------
//! [`RollingSum::compute`] also runs the same sum over an all-ones series and rescales the raw
//! sum by `max(norm) / norm[i]`, compensating for the truncated support near the ends.
//!
//! ## See also
//! ------------
//! * [`crate::injection`] – reruns the sum over a series with injected flux.
use crate::{
    constants::{Days, MaskBits, WINDOW_SIGMAS},
    light_curve::LightCurve,
    simdetec_errors::SimDetecError,
};

/// Gaussian matched-filter kernel expressed in light-curve bins.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    /// Kernel width in days, as requested by the caller
    pub sigma_kern: Days,
    /// Kernel width in bins
    pub sigma_bins: usize,
    /// Number of samples in the window
    pub window: usize,
    /// Zero padding applied on each side of the series
    pub half_window: usize,
    weights: Vec<f64>,
}

impl GaussianKernel {
    /// Build the kernel for a given width and light-curve bin size
    ///
    /// Arguments
    /// -----------------
    /// * `sigma_kern`: kernel width in days
    /// * `mjd_bin_size`: bin size of the averaged light curve, in days
    ///
    /// Return
    /// ----------
    /// * `Err(SimDetecError::InvalidConfiguration)` when the width rounds to less than one bin
    pub fn new(sigma_kern: Days, mjd_bin_size: Days) -> Result<Self, SimDetecError> {
        if !(mjd_bin_size.is_finite() && mjd_bin_size > 0.0) {
            return Err(SimDetecError::InvalidConfiguration(format!(
                "MJD bin size must be > 0, got {mjd_bin_size}"
            )));
        }
        let sigma_bins = (sigma_kern / mjd_bin_size).round();
        if !(sigma_bins.is_finite() && sigma_bins >= 1.0) {
            return Err(SimDetecError::InvalidConfiguration(format!(
                "kernel size {sigma_kern} days is smaller than one {mjd_bin_size} day bin"
            )));
        }
        let sigma_bins = sigma_bins as usize;
        let window = WINDOW_SIGMAS * sigma_bins;
        let half_window = window / 2 + 1;

        let center = (window as f64 - 1.0) / 2.0;
        let sigma = sigma_bins as f64;
        let weights = (0..window)
            .map(|k| {
                let n = (k as f64 - center) / sigma;
                (-0.5 * n * n).exp()
            })
            .collect();

        Ok(GaussianKernel {
            sigma_kern,
            sigma_bins,
            window,
            half_window,
            weights,
        })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

/// Gaussian-weighted centred rolling sum of `series` with zero padding at both ends.
///
/// The output has the same length as the input. A NaN in the input only contaminates the
/// samples whose window covers it.
pub fn rolling_sum(series: &[f64], kernel: &GaussianKernel) -> Vec<f64> {
    let n = series.len();
    let hw = kernel.half_window;
    let window = kernel.window;
    let offset = (window - 1) / 2;

    // padded[p] = series[p - hw] for p in hw..hw + n, zero elsewhere
    let value_at = |p: usize| -> f64 {
        if p >= hw && p < hw + n {
            series[p - hw]
        } else {
            0.0
        }
    };

    (0..n)
        .map(|i| {
            let end = i + hw + offset; // inclusive end of the window in padded coordinates
            let start = end + 1 - window;
            kernel
                .weights
                .iter()
                .enumerate()
                .map(|(k, w)| value_at(start + k) * w)
                .sum()
        })
        .collect()
}

/// Baseline detection statistic of a light curve for one kernel.
///
/// `snr` is `flux / dflux` at usable measurements and exactly `0.0` elsewhere, `sum` is the raw
/// rolling sum of `snr` and `sum_norm` the edge-corrected version.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingSum {
    pub kernel: GaussianKernel,
    pub snr: Vec<f64>,
    pub sum: Vec<f64>,
    pub sum_norm: Vec<f64>,
}

impl RollingSum {
    /// Compute the rolling sum of a light curve
    ///
    /// Arguments
    /// -----------------
    /// * `lc`: the light curve
    /// * `kernel`: the matched-filter kernel
    /// * `flag`: quality bits excluding a measurement from the SNR
    ///
    /// Return
    /// ----------
    /// * `Err(SimDetecError::InsufficientData)` if no measurement is usable
    pub fn compute(
        lc: &LightCurve,
        kernel: &GaussianKernel,
        flag: MaskBits,
    ) -> Result<Self, SimDetecError> {
        let good_ix = lc.unmasked_indices(flag);
        if good_ix.is_empty() {
            return Err(SimDetecError::InsufficientData(format!(
                "light curve {} has no unmasked measurement for a rolling sum",
                lc.control_index
            )));
        }

        let mut snr = vec![0.0; lc.len()];
        for &i in &good_ix {
            snr[i] = lc.flux[i] / lc.dflux[i];
        }

        let sum = rolling_sum(&snr, kernel);
        let norm = rolling_sum(&vec![1.0; lc.len()], kernel);
        let norm_max = norm.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let sum_norm = sum
            .iter()
            .zip(&norm)
            .map(|(s, n)| s / n * norm_max)
            .collect();

        Ok(RollingSum {
            kernel: kernel.clone(),
            snr,
            sum,
            sum_norm,
        })
    }

    pub fn sigma_kern(&self) -> Days {
        self.kernel.sigma_kern
    }
}
