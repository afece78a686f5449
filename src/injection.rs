//! # Injection of synthetic signals into background light curves
//!
//! Given a background light curve, a [`SignalModel`] and a peak time, [`inject`] builds an
//! [`InjectedCurve`]: the background flux with the model added at usable measurements and
//! the matched-filter statistic recomputed over the result.
//!
//! ## Semantics
//! -----------------
//! For the usable indices `G` of the quality flag (see [`LightCurve::is_usable`]):
//!
//! ```text
//! flux_sim[i]    = flux[i] + model(mjd[i])      i ∈ G
//! flux_sim[i]    = flux[i]                      otherwise
//! snr_sim[i]     = flux_sim[i] / dflux[i]       i ∈ G, 0 otherwise
//! snr_sim_sum    = rolling_sum(snr_sim, kernel)
//! ```
//!
//! The raw (not edge-corrected) rolling sum is the statistic of injected curves. The
//! background light curve is only borrowed, so any number of trials may share it.
use crate::{
    constants::{Magnitude, MaskBits, MicroJansky, MJD},
    light_curve::LightCurve,
    rolling_sum::{rolling_sum, GaussianKernel},
    signal_model::SignalModel,
    simdetec_errors::SimDetecError,
    supernova::SimDetecLightCurve,
};

/// Light curve with an injected signal and its detection statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectedCurve {
    pub control_index: usize,
    pub peak_mjd: MJD,
    pub sigma_kern: f64,
    pub mjd_bin: Vec<MJD>,
    pub flux_sim: Vec<MicroJansky>,
    pub snr_sim: Vec<f64>,
    pub snr_sim_sum: Vec<f64>,
}

/// Inject a signal using the kernel of the curve's active rolling sum
///
/// Arguments
/// -----------------
/// * `curve`: background light curve with an applied rolling sum
/// * `model`: the signal model
/// * `peak_mjd`: peak time of the injected signal
/// * `peak_appmag`: peak magnitude override forwarded to the model
/// * `flag`: quality bits excluding a measurement from the injection
///
/// Return
/// ----------
/// * `Err(SimDetecError::NoActiveKernel)` if no rolling sum was applied to `curve`
/// * otherwise see [`inject_with_kernel`]
pub fn inject(
    curve: &SimDetecLightCurve,
    model: &dyn SignalModel,
    peak_mjd: MJD,
    peak_appmag: Option<Magnitude>,
    flag: MaskBits,
) -> Result<InjectedCurve, SimDetecError> {
    let kernel = curve.active_kernel().ok_or(SimDetecError::NoActiveKernel)?;
    inject_with_kernel(curve.light_curve(), kernel, model, peak_mjd, peak_appmag, flag)
}

/// Inject a signal into `lc` and rerun the rolling sum with an explicit kernel.
///
/// Fails with [`SimDetecError::InsufficientData`] when `lc` has no usable measurement, and
/// forwards the model evaluation errors.
pub fn inject_with_kernel(
    lc: &LightCurve,
    kernel: &GaussianKernel,
    model: &dyn SignalModel,
    peak_mjd: MJD,
    peak_appmag: Option<Magnitude>,
    flag: MaskBits,
) -> Result<InjectedCurve, SimDetecError> {
    let good_ix = lc.unmasked_indices(flag);
    if good_ix.is_empty() {
        return Err(SimDetecError::InsufficientData(format!(
            "light curve {} has no unmasked measurement to inject {} into",
            lc.control_index,
            model.name()
        )));
    }

    let times: Vec<MJD> = good_ix.iter().map(|&i| lc.mjd[i]).collect();
    let sim_flux = model.evaluate(&times, Some(peak_mjd), peak_appmag)?;

    let mut flux_sim = lc.flux.clone();
    let mut snr_sim = vec![0.0; lc.len()];
    for (&i, sim) in good_ix.iter().zip(&sim_flux) {
        flux_sim[i] += sim;
        snr_sim[i] = flux_sim[i] / lc.dflux[i];
    }
    let snr_sim_sum = rolling_sum(&snr_sim, kernel);

    Ok(InjectedCurve {
        control_index: lc.control_index,
        peak_mjd,
        sigma_kern: kernel.sigma_kern,
        mjd_bin: lc.mjd_bin.clone(),
        flux_sim,
        snr_sim,
        snr_sim_sum,
    })
}

impl InjectedCurve {
    /// Maximum of the injected statistic among measurements with bin MJD in `[low, high]`
    ///
    /// Return
    /// ----------
    /// * `(mjd_bin, value)` of the first maximum; NaN values are skipped
    /// * `Err(SimDetecError::EmptyTimeWindow)` if no measurement with a finite statistic lies
    ///   in the window
    pub fn get_max_statistic(&self, low: MJD, high: MJD) -> Result<(MJD, f64), SimDetecError> {
        self.mjd_bin
            .iter()
            .zip(&self.snr_sim_sum)
            .filter(|(&t, v)| t >= low && t <= high && !v.is_nan())
            .fold(None, |best: Option<(MJD, f64)>, (&t, &v)| match best {
                Some((_, b)) if b >= v => best,
                _ => Some((t, v)),
            })
            .ok_or(SimDetecError::EmptyTimeWindow { low, high })
    }
}
