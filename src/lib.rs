//! # simdetec
//!
//! Monte Carlo injection-recovery of synthetic transients in forced-photometry light curves.
//!
//! Synthetic signals ([`SignalModel`]) are injected into the control light curves of a
//! supernova at random eligible times, the matched-filter rolling sum is rerun, and the best
//! detection statistic around each injected peak is stored in per-amplitude trial tables.
//! The fraction of trials over a detection threshold gives the detection efficiency.
//!
//! ```rust,no_run
//! use camino::Utf8Path;
//! use rand::{rngs::StdRng, SeedableRng};
//! use simdetec::{
//!     AveragedLightCurveDir, GaussianTrialGenerator, SimDetecLoop, SimDetecParams,
//!     SimDetecSupernova,
//! };
//!
//! # fn main() -> Result<(), simdetec::SimDetecError> {
//! let provider = AveragedLightCurveDir::new("/data/atlas", "2023ixf", "o", 1.0, 8);
//! let mut sn = SimDetecSupernova::load_all(&provider)?;
//!
//! let params = SimDetecParams::builder()
//!     .kernel(5.0, vec![2.0, 10.0, 30.0], vec![3.0, 5.0])
//!     .num_iterations(1000)
//!     .mjd0(Some(60083.0))
//!     .compute_efficiencies(true)
//!     .build()?;
//!
//! let sweep = SimDetecLoop::new(params, GaussianTrialGenerator::new())?;
//! let mut rng = StdRng::seed_from_u64(42);
//! let summary = sweep.run(&mut sn, &mut rng, Utf8Path::new("/data/tables"))?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```
pub mod constants;
pub mod conversion;
pub mod efficiency_table;
pub mod injection;
pub mod light_curve;
pub mod progress;
pub mod rolling_sum;
pub mod settings;
pub mod signal_model;
pub mod sim_detec_table;
pub mod simdetec_errors;
pub mod simdetec_loop;
pub mod supernova;

pub use conversion::{flux_to_mag, mag_to_flux, peak_grid};
pub use efficiency_table::EfficiencyTable;
pub use injection::{inject, inject_with_kernel, InjectedCurve};
pub use light_curve::{
    reader::{AveragedLightCurveDir, LightCurveProvider},
    LightCurve, Measurement, ValidSeasons,
};
pub use rolling_sum::{rolling_sum, GaussianKernel, RollingSum};
pub use settings::{KernelSettings, SimDetecParams, SimDetecParamsBuilder, SimulationSettings};
pub use signal_model::{gaussian::Gaussian, template::TemplateModel, ModelParameters, SignalModel};
pub use sim_detec_table::{SimDetecTable, SimDetecTables, TableKey, TrialColumn, TrialOutcome};
pub use simdetec_errors::SimDetecError;
pub use simdetec_loop::{
    efficiencies_from_tables, GaussianTrialGenerator, SimDetecLoop, SweepSummary,
    TemplateTrialGenerator, TrialGenerator,
};
pub use supernova::{SimDetecLightCurve, SimDetecSupernova};
