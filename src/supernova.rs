//! # Supernova and control light curves prepared for injection
//!
//! [`SimDetecLightCurve`] couples a background [`LightCurve`] with its derived detection
//! state: the baseline [`RollingSum`] of the active kernel and the set of measurements
//! eligible as injection times. [`SimDetecSupernova`] owns the supernova light curve
//! (control index 0) and its controls (1..=N).
//!
//! ## Derived state
//! -----------------
//! The rolling sum is a value replaced as a whole: applying a new kernel drops the previous
//! sum, so no statistic computed with one kernel can be mixed with another. Injected curves
//! are built by [`crate::injection`] as separate values and never written back here.
use rand::Rng;
use rayon::prelude::*;

use crate::{
    constants::{Days, MaskBits, MJD},
    light_curve::{eligible_indices, reader::LightCurveProvider, LightCurve, ValidSeasons},
    rolling_sum::{GaussianKernel, RollingSum},
    simdetec_errors::SimDetecError,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SimDetecLightCurve {
    lc: LightCurve,
    rolling: Option<RollingSum>,
    valid_ix: Vec<usize>,
}

impl SimDetecLightCurve {
    /// Wrap a light curve; every measurement starts as an eligible injection time.
    pub fn new(lc: LightCurve) -> Self {
        let valid_ix = (0..lc.len()).collect();
        SimDetecLightCurve {
            lc,
            rolling: None,
            valid_ix,
        }
    }

    pub fn light_curve(&self) -> &LightCurve {
        &self.lc
    }

    pub fn control_index(&self) -> usize {
        self.lc.control_index
    }

    pub fn rolling_sum(&self) -> Option<&RollingSum> {
        self.rolling.as_ref()
    }

    /// Kernel of the last applied rolling sum, if any.
    pub fn active_kernel(&self) -> Option<&GaussianKernel> {
        self.rolling.as_ref().map(|r| &r.kernel)
    }

    /// Apply a rolling sum of width `sigma_kern` days, replacing any previous one
    ///
    /// Arguments
    /// -----------------
    /// * `sigma_kern`: kernel width in days, converted to bins with the light curve bin size
    /// * `flag`: quality bits excluding a measurement from the SNR
    ///
    /// Return
    /// ----------
    /// * A reference to the new [`RollingSum`], or the kernel / data error
    pub fn apply_rolling_sum(
        &mut self,
        sigma_kern: Days,
        flag: MaskBits,
    ) -> Result<&RollingSum, SimDetecError> {
        let kernel = GaussianKernel::new(sigma_kern, self.lc.mjd_bin_size)?;
        self.apply_kernel(&kernel, flag)
    }

    /// Same as [`Self::apply_rolling_sum`] with an already built kernel.
    pub fn apply_kernel(
        &mut self,
        kernel: &GaussianKernel,
        flag: MaskBits,
    ) -> Result<&RollingSum, SimDetecError> {
        self.rolling = None;
        let rolling = RollingSum::compute(&self.lc, kernel, flag)?;
        Ok(self.rolling.insert(rolling))
    }

    pub fn remove_rolling_sum(&mut self) {
        self.rolling = None;
    }

    /// Restrict the eligible injection times to `mjd <= mjd0` and to the observation seasons.
    pub fn set_valid_seasons_ix(&mut self, mjd0: Option<MJD>, seasons: Option<&ValidSeasons>) {
        self.valid_ix = eligible_indices(&self.lc, mjd0, seasons);
    }

    pub fn valid_indices(&self) -> &[usize] {
        &self.valid_ix
    }

    /// Draw the bin MJD of a random eligible measurement.
    pub fn random_valid_mjd<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<MJD, SimDetecError> {
        if self.valid_ix.is_empty() {
            return Err(SimDetecError::InsufficientData(format!(
                "light curve {} has no eligible injection time",
                self.lc.control_index
            )));
        }
        let ix = self.valid_ix[rng.random_range(0..self.valid_ix.len())];
        Ok(self.lc.mjd_bin[ix])
    }
}

/// Supernova light curve and its control light curves, indexed by control index.
#[derive(Debug, Clone)]
pub struct SimDetecSupernova {
    pub tnsname: String,
    pub mjd_bin_size: Days,
    curves: Vec<SimDetecLightCurve>,
}

impl SimDetecSupernova {
    /// Build from already loaded curves; `curves[i]` becomes control index `i`.
    pub fn from_curves(tnsname: impl Into<String>, mjd_bin_size: Days, curves: Vec<LightCurve>) -> Self {
        let curves = curves
            .into_iter()
            .enumerate()
            .map(|(i, mut lc)| {
                lc.control_index = i;
                SimDetecLightCurve::new(lc)
            })
            .collect();
        SimDetecSupernova {
            tnsname: tnsname.into(),
            mjd_bin_size,
            curves,
        }
    }

    /// Load the supernova and every control light curve from a provider.
    pub fn load_all<P: LightCurveProvider + ?Sized>(provider: &P) -> Result<Self, SimDetecError> {
        let curves = (0..=provider.num_controls())
            .map(|ix| provider.load(ix))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_curves(
            provider.tnsname(),
            provider.mjd_bin_size(),
            curves,
        ))
    }

    /// Number of control light curves (the supernova excluded).
    pub fn num_controls(&self) -> usize {
        self.curves.len().saturating_sub(1)
    }

    pub fn get(&self, control_index: usize) -> Result<&SimDetecLightCurve, SimDetecError> {
        self.curves
            .get(control_index)
            .ok_or(SimDetecError::MissingLightCurve(control_index))
    }

    pub fn curves(&self) -> &[SimDetecLightCurve] {
        &self.curves
    }

    /// Apply the kernel to every loaded light curve.
    pub fn apply_rolling_sums(
        &mut self,
        kernel: &GaussianKernel,
        flag: MaskBits,
    ) -> Result<(), SimDetecError> {
        let all: Vec<usize> = (0..self.curves.len()).collect();
        self.apply_rolling_sums_to(kernel, flag, &all)
    }

    /// Apply the kernel to the listed light curves only, in parallel.
    pub fn apply_rolling_sums_to(
        &mut self,
        kernel: &GaussianKernel,
        flag: MaskBits,
        control_indices: &[usize],
    ) -> Result<(), SimDetecError> {
        if let Some(&missing) = control_indices.iter().find(|&&ix| ix >= self.curves.len()) {
            return Err(SimDetecError::MissingLightCurve(missing));
        }
        self.curves
            .par_iter_mut()
            .filter(|c| control_indices.contains(&c.control_index()))
            .try_for_each(|c| c.apply_kernel(kernel, flag).map(|_| ()))
    }

    pub fn remove_rolling_sums(&mut self) {
        self.curves
            .iter_mut()
            .for_each(SimDetecLightCurve::remove_rolling_sum);
    }

    pub fn set_valid_seasons_ix(&mut self, mjd0: Option<MJD>, seasons: Option<&ValidSeasons>) {
        self.curves
            .iter_mut()
            .for_each(|c| c.set_valid_seasons_ix(mjd0, seasons));
    }
}
