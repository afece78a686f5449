//! # Simulated-detection sweep
//!
//! [`SimDetecLoop`] drives the Monte Carlo injection-recovery sweep over a
//! [`SimDetecSupernova`]: for every kernel size and every peak amplitude of the grid it runs
//! `num_iterations` trials, each injecting a random signal into a random control curve at a
//! random eligible time and recording the best detection statistic around the peak.
//!
//! ## Flow
//! -----------------
//! 1. **Setup** – eligible controls are `1..=num_controls` minus the skipped ones. Each must
//!    hold at least one usable measurement and one eligible injection time (before `mjd0`,
//!    inside the observation seasons), otherwise the run aborts with
//!    [`SimDetecError::InsufficientData`] before any trial.
//! 2. **Per kernel** – the baseline rolling sum is applied to every eligible control.
//! 3. **Per amplitude** – all trials of the block are planned sequentially from the caller's
//!    RNG, then executed in parallel with `rayon`. Each trial writes its own slot of a fresh
//!    [`SimDetecTable`], which is saved once the block completes.
//! 4. **Finalize** – when requested, the [`EfficiencyTable`] is computed and saved.
//!
//! Planning draws every random number up front, so a given seed yields the same tables on
//! any number of threads.
//!
//! ## Trial sources
//! -----------------
//! What a trial injects is decided by a [`TrialGenerator`]:
//! * [`GaussianTrialGenerator`] – symmetric Gaussian with a timescale drawn from the kernel's
//!   `sigma_sims`, statistic searched within ±`sigma_sim` of the peak.
//! * [`TemplateTrialGenerator`] – one empirical template rescaled to the block amplitude,
//!   statistic searched within a fixed half-window.
//!
//! A trial whose injection fails is stored as a sentinel row (no statistic), logged and
//! counted in [`SweepSummary::failed_trials`]. Setup and configuration errors abort the run.
use std::{
    fmt,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use ahash::RandomState;
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use ordered_float::OrderedFloat;
use rand::Rng;
use rayon::prelude::*;
use std::collections::HashMap;

use crate::{
    constants::{Days, Magnitude, MicroJansky, EFFICIENCY_FILENAME, MJD},
    efficiency_table::EfficiencyTable,
    injection::inject,
    progress::{fmt_dur, BlockProgress},
    rolling_sum::GaussianKernel,
    settings::{KernelSettings, SimDetecParams},
    signal_model::{gaussian::Gaussian, template::TemplateModel, SignalModel},
    sim_detec_table::{SimDetecTable, SimDetecTables, TrialOutcome},
    simdetec_errors::SimDetecError,
    supernova::{SimDetecLightCurve, SimDetecSupernova},
};

/// Minimum wall-clock time between two cancellation polls.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Source of the random signals injected by the sweep.
pub trait TrialGenerator: Sync {
    /// Reject parameters this generator cannot run with. Called once by [`SimDetecLoop::new`].
    fn check(&self, _params: &SimDetecParams) -> Result<(), SimDetecError> {
        Ok(())
    }

    /// Draw the signal model of one trial
    ///
    /// Arguments
    /// -----------------
    /// * `kernel`: settings of the kernel being swept
    /// * `peak_appmag`: peak apparent magnitude of the amplitude block
    /// * `rng`: the sweep's random source
    ///
    /// Return
    /// ----------
    /// * A model shared by every trial of the block that drew the same parameters
    fn generate_random_simulation<R: Rng + ?Sized>(
        &self,
        kernel: &KernelSettings,
        peak_appmag: Magnitude,
        rng: &mut R,
    ) -> Result<Arc<dyn SignalModel>, SimDetecError>;

    /// Peak time of one trial, a random eligible bin of `curve` by default.
    fn generate_peak_mjd<R: Rng + ?Sized>(
        &self,
        curve: &SimDetecLightCurve,
        rng: &mut R,
    ) -> Result<MJD, SimDetecError> {
        curve.random_valid_mjd(rng)
    }

    /// Window `[low, high]` searched for the maximum statistic, `peak ± timescale` by default.
    fn max_fom_window(&self, model: &dyn SignalModel, peak_mjd: MJD) -> (MJD, MJD) {
        let half = model.timescale().unwrap_or(0.0);
        (peak_mjd - half, peak_mjd + half)
    }

    /// Peak magnitude passed to the model at injection time; `None` keeps the model's own.
    fn peak_appmag_override(&self, _peak_appmag: Magnitude) -> Option<Magnitude> {
        None
    }
}

#[derive(Debug, Default)]
struct GaussianCache {
    peak_appmag: Option<OrderedFloat<Magnitude>>,
    models: HashMap<OrderedFloat<Days>, Arc<Gaussian>, RandomState>,
}

/// Symmetric Gaussian trials with a timescale drawn uniformly from the kernel's `sigma_sims`.
///
/// Models are cached per timescale for the current amplitude, so a block allocates at most
/// one model per configured timescale.
#[derive(Debug, Default)]
pub struct GaussianTrialGenerator {
    cache: Mutex<GaussianCache>,
}

impl GaussianTrialGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn model(&self, sigma_sim: Days, peak_appmag: Magnitude) -> Result<Arc<Gaussian>, SimDetecError> {
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mag = OrderedFloat(peak_appmag);
        if cache.peak_appmag != Some(mag) {
            cache.models.clear();
            cache.peak_appmag = Some(mag);
        }
        if let Some(model) = cache.models.get(&OrderedFloat(sigma_sim)) {
            return Ok(Arc::clone(model));
        }
        let model = Arc::new(Gaussian::new(sigma_sim, peak_appmag)?);
        cache
            .models
            .insert(OrderedFloat(sigma_sim), Arc::clone(&model));
        Ok(model)
    }
}

impl TrialGenerator for GaussianTrialGenerator {
    fn check(&self, params: &SimDetecParams) -> Result<(), SimDetecError> {
        match params.kernels.iter().find(|k| k.sigma_sims.is_empty()) {
            Some(k) => Err(SimDetecError::InvalidConfiguration(format!(
                "kernel {} has no simulation timescale (sigma_sims) to draw from",
                k.sigma_kern
            ))),
            None => Ok(()),
        }
    }

    fn generate_random_simulation<R: Rng + ?Sized>(
        &self,
        kernel: &KernelSettings,
        peak_appmag: Magnitude,
        rng: &mut R,
    ) -> Result<Arc<dyn SignalModel>, SimDetecError> {
        if kernel.sigma_sims.is_empty() {
            return Err(SimDetecError::InvalidConfiguration(format!(
                "kernel {} has no simulation timescale (sigma_sims) to draw from",
                kernel.sigma_kern
            )));
        }
        let sigma_sim = kernel.sigma_sims[rng.random_range(0..kernel.sigma_sims.len())];
        let model: Arc<dyn SignalModel> = self.model(sigma_sim, peak_appmag)?;
        Ok(model)
    }
}

/// Trials injecting one empirical template, rescaled to the amplitude of each block.
#[derive(Debug, Clone)]
pub struct TemplateTrialGenerator {
    model: Arc<TemplateModel>,
    half_window: Days,
}

impl TemplateTrialGenerator {
    /// Arguments
    /// -----------------
    /// * `model`: the template; its own peak magnitude is overridden block by block
    /// * `half_window`: half-width in days of the window searched around the peak
    pub fn new(model: TemplateModel, half_window: Days) -> Result<Self, SimDetecError> {
        if !(half_window.is_finite() && half_window > 0.0) {
            return Err(SimDetecError::InvalidConfiguration(format!(
                "max FOM half-window must be a positive number of days, got {half_window}"
            )));
        }
        Ok(TemplateTrialGenerator {
            model: Arc::new(model),
            half_window,
        })
    }

    pub fn model(&self) -> &TemplateModel {
        &self.model
    }

    pub fn half_window(&self) -> Days {
        self.half_window
    }
}

impl TrialGenerator for TemplateTrialGenerator {
    fn check(&self, params: &SimDetecParams) -> Result<(), SimDetecError> {
        match params.kernels.iter().find(|k| !k.sigma_sims.is_empty()) {
            Some(k) => Err(SimDetecError::InvalidConfiguration(format!(
                "kernel {} lists sigma_sims, but template trials have no timescale; leave it empty",
                k.sigma_kern
            ))),
            None => Ok(()),
        }
    }

    fn generate_random_simulation<R: Rng + ?Sized>(
        &self,
        _kernel: &KernelSettings,
        _peak_appmag: Magnitude,
        _rng: &mut R,
    ) -> Result<Arc<dyn SignalModel>, SimDetecError> {
        let model: Arc<dyn SignalModel> = self.model.clone();
        Ok(model)
    }

    fn max_fom_window(&self, _model: &dyn SignalModel, peak_mjd: MJD) -> (MJD, MJD) {
        (peak_mjd - self.half_window, peak_mjd + self.half_window)
    }

    fn peak_appmag_override(&self, peak_appmag: Magnitude) -> Option<Magnitude> {
        Some(peak_appmag)
    }
}

/// A trial whose random draws are fixed.
struct TrialPlan {
    index: usize,
    control_index: usize,
    model: Arc<dyn SignalModel>,
    peak_mjd: MJD,
}

/// Outcome of a sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    /// Trial tables saved, in sweep order
    pub tables_written: Vec<Utf8PathBuf>,
    pub trials_run: usize,
    /// Trials stored as sentinel rows after a failed injection
    pub failed_trials: usize,
    /// The sweep stopped early on a cancellation request
    pub interrupted: bool,
    pub efficiencies: Option<EfficiencyTable>,
}

impl fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SweepSummary(tables={}, trials={}, failed={}, interrupted={}, efficiencies={})",
            self.tables_written.len(),
            self.trials_run,
            self.failed_trials,
            self.interrupted,
            self.efficiencies.is_some()
        )
    }
}

/// Monte Carlo injection-recovery sweep over kernels and peak amplitudes.
#[derive(Debug)]
pub struct SimDetecLoop<G: TrialGenerator> {
    params: SimDetecParams,
    generator: G,
}

impl<G: TrialGenerator> SimDetecLoop<G> {
    /// Pair validated parameters with a trial source. Fails if the generator rejects them.
    pub fn new(params: SimDetecParams, generator: G) -> Result<Self, SimDetecError> {
        generator.check(&params)?;
        Ok(SimDetecLoop { params, generator })
    }

    pub fn params(&self) -> &SimDetecParams {
        &self.params
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Run the full sweep, see [`SimDetecLoop::run_with_cancel`].
    pub fn run<R: Rng + ?Sized>(
        &self,
        sn: &mut SimDetecSupernova,
        rng: &mut R,
        tables_dir: &Utf8Path,
    ) -> Result<SweepSummary, SimDetecError> {
        self.run_with_cancel(sn, rng, tables_dir, || false)
    }

    /// Run the sweep, stopping between amplitude blocks once `should_cancel` returns `true`
    ///
    /// Arguments
    /// -----------------
    /// * `sn`: the supernova and its control curves; rolling sums are (re)applied in place
    /// * `rng`: random source of every trial draw
    /// * `tables_dir`: directory receiving the trial tables and the efficiency table
    /// * `should_cancel`: polled before each block, at most every 20 ms
    ///
    /// Return
    /// ----------
    /// * The [`SweepSummary`]; blocks completed before a cancellation are saved and listed,
    ///   and no efficiency table is computed for an interrupted sweep
    /// * `Err(SimDetecError::InsufficientData)` if an eligible control cannot host a trial
    /// * `Err(SimDetecError::InvalidConfiguration)` if the curves' bin size differs from the
    ///   parameters'
    /// * I/O and CSV errors of the table persistence
    pub fn run_with_cancel<R, F>(
        &self,
        sn: &mut SimDetecSupernova,
        rng: &mut R,
        tables_dir: &Utf8Path,
        mut should_cancel: F,
    ) -> Result<SweepSummary, SimDetecError>
    where
        R: Rng + ?Sized,
        F: FnMut() -> bool,
    {
        let params = &self.params;
        let eligible = self.setup(sn)?;
        std::fs::create_dir_all(tables_dir)?;

        let (peak_appmags, peak_fluxes) = params.peak_grid();
        info!(
            "Starting sweep of {} for {} kernel(s) x {} amplitude(s) x {} iteration(s) over {} control(s)",
            sn.tnsname,
            params.kernels.len(),
            peak_appmags.len(),
            params.num_iterations,
            eligible.len()
        );
        info!("{params:#}");

        let mut summary = SweepSummary::default();
        let mut tables = SimDetecTables::new();
        let mut progress = BlockProgress::new(params.kernels.len() * peak_appmags.len());
        let mut last_poll: Option<Instant> = None;

        'sweep: for kernel_settings in &params.kernels {
            let kernel = GaussianKernel::new(kernel_settings.sigma_kern, params.mjd_bin_size)?;
            info!(
                "Applying rolling sum with kernel {} days ({} bins) to {} control light curve(s)",
                kernel.sigma_kern,
                kernel.sigma_bins,
                eligible.len()
            );
            sn.apply_rolling_sums_to(&kernel, params.flag, &eligible)?;

            for (&peak_appmag, &peak_flux) in peak_appmags.iter().zip(&peak_fluxes) {
                if last_poll.is_none_or(|t| t.elapsed() >= POLL_INTERVAL) {
                    last_poll = Some(Instant::now());
                    if should_cancel() {
                        warn!(
                            "Sweep interrupted before kernel {} at peak mag {peak_appmag:.2}; {} table(s) saved",
                            kernel.sigma_kern,
                            summary.tables_written.len()
                        );
                        summary.interrupted = true;
                        break 'sweep;
                    }
                }

                let (table, failed) =
                    self.run_block(sn, kernel_settings, peak_appmag, peak_flux, &eligible, rng)?;
                let path = table.save(tables_dir)?;
                let elapsed = progress.block_done(&format!(
                    "kern {} / mag {peak_appmag:.2}",
                    kernel.sigma_kern
                ));
                info!(
                    "Saved {} trials for kernel {} at peak mag {peak_appmag:.2} to {path} ({})",
                    table.len(),
                    kernel.sigma_kern,
                    fmt_dur(elapsed)
                );

                summary.trials_run += table.len();
                summary.failed_trials += failed;
                summary.tables_written.push(path);
                if params.compute_efficiencies {
                    tables.insert(table);
                }
            }
        }
        progress.finish();

        if summary.failed_trials > 0 {
            warn!(
                "{} of {} trial(s) failed and were stored without a statistic",
                summary.failed_trials, summary.trials_run
            );
        }

        if params.compute_efficiencies {
            if summary.interrupted {
                warn!("Skipping efficiencies of an interrupted sweep");
            } else {
                let mut efficiencies = EfficiencyTable::new(&params.kernels, &peak_appmags);
                efficiencies.compute(&tables, params.observation_seasons.as_ref())?;
                let path = efficiencies.save(tables_dir, EFFICIENCY_FILENAME)?;
                info!("Efficiencies saved to {path}:\n{efficiencies}");
                summary.efficiencies = Some(efficiencies);
            }
        }

        info!("{summary}");
        Ok(summary)
    }

    /// Restrict injection times and check every eligible control; returns their indices.
    fn setup(&self, sn: &mut SimDetecSupernova) -> Result<Vec<usize>, SimDetecError> {
        let params = &self.params;
        if (sn.mjd_bin_size - params.mjd_bin_size).abs() > f64::EPSILON {
            return Err(SimDetecError::InvalidConfiguration(format!(
                "light curves of {} are binned over {} days but the sweep expects {} days",
                sn.tnsname, sn.mjd_bin_size, params.mjd_bin_size
            )));
        }

        let eligible = params.eligible_controls(sn.num_controls());
        if eligible.is_empty() {
            return Err(SimDetecError::InsufficientData(format!(
                "{} has no eligible control light curve ({} controls, skipped {:?})",
                sn.tnsname,
                sn.num_controls(),
                params.skip_control_ix
            )));
        }

        if params.mjd0.is_none() {
            warn!(
                "No MJD0 given for {}; injections may land after the transient starts",
                sn.tnsname
            );
        }
        sn.remove_rolling_sums();
        sn.set_valid_seasons_ix(params.mjd0, params.observation_seasons.as_ref());

        for &ix in &eligible {
            let curve = sn.get(ix)?;
            if curve.light_curve().unmasked_indices(params.flag).is_empty() {
                return Err(SimDetecError::InsufficientData(format!(
                    "control light curve {ix} of {} has no usable measurement",
                    sn.tnsname
                )));
            }
            if curve.valid_indices().is_empty() {
                return Err(SimDetecError::InsufficientData(format!(
                    "control light curve {ix} of {} has no eligible injection time",
                    sn.tnsname
                )));
            }
        }
        Ok(eligible)
    }

    /// Plan, execute and record the trials of one `(kernel, amplitude)` block.
    fn run_block<R: Rng + ?Sized>(
        &self,
        sn: &SimDetecSupernova,
        kernel: &KernelSettings,
        peak_appmag: Magnitude,
        peak_flux: MicroJansky,
        eligible: &[usize],
        rng: &mut R,
    ) -> Result<(SimDetecTable, usize), SimDetecError> {
        info!(
            "Commencing {} iterations for kernel {} at peak mag {peak_appmag:.2} (flux {peak_flux:.2} uJy)",
            self.params.num_iterations, kernel.sigma_kern
        );

        let mut plans = Vec::with_capacity(self.params.num_iterations);
        for index in 0..self.params.num_iterations {
            let control_index = eligible[rng.random_range(0..eligible.len())];
            let model = self
                .generator
                .generate_random_simulation(kernel, peak_appmag, rng)?;
            let peak_mjd = self.generator.generate_peak_mjd(sn.get(control_index)?, rng)?;
            debug!(
                "trial {index}: control {control_index}, {}, peak MJD {peak_mjd:.2}",
                model
            );
            plans.push(TrialPlan {
                index,
                control_index,
                model,
                peak_mjd,
            });
        }

        let outcomes: Vec<(usize, Result<TrialOutcome, SimDetecError>)> = plans
            .par_iter()
            .map(|plan| (plan.index, self.run_trial(sn, plan, peak_appmag)))
            .collect();

        let mut table = SimDetecTable::new(kernel.sigma_kern, peak_appmag);
        table.setup(self.params.num_iterations);

        let mut failed = 0;
        for ((index, outcome), plan) in outcomes.into_iter().zip(&plans) {
            let outcome = outcome.unwrap_or_else(|err| {
                warn!(
                    "Trial {index} (control {}, peak MJD {:.2}) failed: {err}",
                    plan.control_index, plan.peak_mjd
                );
                failed += 1;
                TrialOutcome {
                    control_index: plan.control_index,
                    max_fom: None,
                    max_fom_mjd: None,
                    sigma_sim: plan.model.timescale(),
                    peak_mjd: plan.peak_mjd,
                }
            });
            table.set_trial(index, outcome)?;
        }
        Ok((table, failed))
    }

    fn run_trial(
        &self,
        sn: &SimDetecSupernova,
        plan: &TrialPlan,
        peak_appmag: Magnitude,
    ) -> Result<TrialOutcome, SimDetecError> {
        let curve = sn.get(plan.control_index)?;
        let model = plan.model.as_ref();
        let injected = inject(
            curve,
            model,
            plan.peak_mjd,
            self.generator.peak_appmag_override(peak_appmag),
            self.params.flag,
        )?;
        let (low, high) = self.generator.max_fom_window(model, plan.peak_mjd);
        let (max_fom_mjd, max_fom) = injected.get_max_statistic(low, high)?;
        Ok(TrialOutcome {
            control_index: plan.control_index,
            max_fom: Some(max_fom),
            max_fom_mjd: Some(max_fom_mjd),
            sigma_sim: model.timescale(),
            peak_mjd: plan.peak_mjd,
        })
    }
}

/// Recompute the efficiency table from the trial tables saved in `tables_dir`
///
/// Every `(kernel, amplitude)` table of `params` must exist. The result is saved as
/// [`EFFICIENCY_FILENAME`] next to the trial tables.
pub fn efficiencies_from_tables(
    params: &SimDetecParams,
    tables_dir: &Utf8Path,
) -> Result<EfficiencyTable, SimDetecError> {
    let (peak_appmags, _) = params.peak_grid();
    info!(
        "Loading {} trial table(s) from {tables_dir}",
        params.kernels.len() * peak_appmags.len()
    );
    let tables = SimDetecTables::load_all(tables_dir, &params.sigma_kerns(), &peak_appmags)?;
    let mut efficiencies = EfficiencyTable::new(&params.kernels, &peak_appmags);
    efficiencies.compute(&tables, params.observation_seasons.as_ref())?;
    let path = efficiencies.save(tables_dir, EFFICIENCY_FILENAME)?;
    info!("Efficiencies saved to {path}:\n{efficiencies}");
    Ok(efficiencies)
}
