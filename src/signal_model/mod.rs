//! # Synthetic transient signals
//!
//! A [`SignalModel`] produces the flux of a synthetic transient at arbitrary times, given a
//! peak time and optionally a peak apparent magnitude. Two variants are provided:
//!
//! * [`gaussian::Gaussian`] – parametric Gaussian bump with independent rise and decline widths,
//! * [`template::TemplateModel`] – empirical (time, magnitude) light curve loaded from a file,
//!   rescaled and shifted onto the requested peak.
//!
//! Both are immutable once built and evaluate to exactly `0.0` outside their support. Both
//! fail with [`SimDetecError::MissingPeakTime`] when no peak time is supplied.
//!
//! ## See also
//! ------------
//! * [`crate::injection`] – adds a model to a background light curve.
//! * [`crate::simdetec_loop::TrialGenerator`] – draws random models for the Monte Carlo sweep.
pub mod gaussian;
pub mod interpolate;
pub mod template;

use std::fmt;

use crate::{
    constants::{Days, Magnitude, MicroJansky, MJD},
    simdetec_errors::SimDetecError,
};

/// Model parameters recorded alongside every trial row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModelParameters {
    /// Timescale of the injected signal in days, when the model has one
    pub sigma_sim: Option<Days>,
}

pub trait SignalModel: fmt::Display + Send + Sync {
    fn name(&self) -> &str;

    /// Simulated flux in µJy at each of `mjds`
    ///
    /// Arguments
    /// -----------------
    /// * `mjds`: evaluation times
    /// * `peak_mjd`: time of the peak; required
    /// * `peak_appmag`: peak apparent magnitude overriding the model's own, for the models
    ///   that support rescaling
    ///
    /// Return
    /// ----------
    /// * One flux per input time, `0.0` outside the model support
    /// * `Err(SimDetecError::MissingPeakTime)` if `peak_mjd` is `None`
    fn evaluate(
        &self,
        mjds: &[MJD],
        peak_mjd: Option<MJD>,
        peak_appmag: Option<Magnitude>,
    ) -> Result<Vec<MicroJansky>, SimDetecError>;

    fn row_parameters(&self) -> ModelParameters;

    /// Peak apparent magnitude the model evaluates to when no override is given.
    fn peak_appmag(&self) -> Option<Magnitude>;

    fn timescale(&self) -> Option<Days> {
        self.row_parameters().sigma_sim
    }
}
