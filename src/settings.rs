//! # Sweep parameters and settings file
//!
//! This module defines [`SimDetecParams`], the validated configuration of a simulated
//! detection sweep, its builder, and [`SimulationSettings`], the JSON settings file read by the
//! `simdetec` binary.
//!
//! ## Parameters
//! -----------------
//! * one [`KernelSettings`] entry per rolling-sum kernel size, holding the timescales drawn for
//!   the injected Gaussians and the detection thresholds used by the efficiency table,
//! * the peak amplitude grid (`peak_mag_min` → `peak_mag_max`, `n_peaks` values),
//! * the number of trials per `(kernel, amplitude)` pair,
//! * the light curve bin size and quality flag,
//! * the optional onset time `mjd0`, observation seasons and skipped controls.
//!
//! ## Example
//!
//! ```rust,no_run
//! use simdetec::settings::SimDetecParams;
//!
//! let params = SimDetecParams::builder()
//!     .kernel(5.0, vec![2.0, 5.0, 20.0], vec![3.0, 5.0])
//!     .peak_mags(22.0, 17.0)
//!     .n_peaks(6)
//!     .num_iterations(1000)
//!     .mjd0(Some(60000.0))
//!     .compute_efficiencies(true)
//!     .build()
//!     .unwrap();
//! println!("{params:#}");
//! ```
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    constants::{
        Days, Magnitude, MaskBits, MicroJansky, DEFAULT_BADDAY_FLAG, DEFAULT_NUM_ITERATIONS,
        DEFAULT_N_PEAKS, DEFAULT_PEAK_MAG_MAX, DEFAULT_PEAK_MAG_MIN, MJD,
    },
    conversion::peak_grid,
    light_curve::ValidSeasons,
    rolling_sum::GaussianKernel,
    simdetec_errors::SimDetecError,
};

/// Settings of one rolling-sum kernel size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelSettings {
    /// Kernel width in days
    pub sigma_kern: Days,
    /// Timescales (days) of the injected Gaussians
    #[serde(default)]
    pub sigma_sims: Vec<Days>,
    /// Detection thresholds on the max FOM
    #[serde(default)]
    pub fom_limits: Vec<f64>,
}

impl KernelSettings {
    pub fn new(sigma_kern: Days, sigma_sims: Vec<Days>, fom_limits: Vec<f64>) -> Self {
        KernelSettings {
            sigma_kern,
            sigma_sims,
            fom_limits,
        }
    }
}

/// Configuration of a simulated-detection sweep. Build it with [`SimDetecParams::builder`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimDetecParams {
    pub kernels: Vec<KernelSettings>,
    pub peak_mag_min: Magnitude,
    pub peak_mag_max: Magnitude,
    pub n_peaks: usize,
    pub num_iterations: usize,
    pub mjd_bin_size: Days,
    pub flag: MaskBits,
    pub mjd0: Option<MJD>,
    pub observation_seasons: Option<ValidSeasons>,
    pub skip_control_ix: Vec<usize>,
    pub compute_efficiencies: bool,
}

impl Default for SimDetecParams {
    fn default() -> Self {
        SimDetecParams {
            kernels: Vec::new(),
            peak_mag_min: DEFAULT_PEAK_MAG_MIN,
            peak_mag_max: DEFAULT_PEAK_MAG_MAX,
            n_peaks: DEFAULT_N_PEAKS,
            num_iterations: DEFAULT_NUM_ITERATIONS,
            mjd_bin_size: 1.0,
            flag: DEFAULT_BADDAY_FLAG,
            mjd0: None,
            observation_seasons: None,
            skip_control_ix: Vec::new(),
            compute_efficiencies: false,
        }
    }
}

impl SimDetecParams {
    pub fn builder() -> SimDetecParamsBuilder {
        SimDetecParamsBuilder::new()
    }

    /// Peak magnitudes and fluxes of the amplitude grid.
    pub fn peak_grid(&self) -> (Vec<Magnitude>, Vec<MicroJansky>) {
        peak_grid(self.peak_mag_min, self.peak_mag_max, self.n_peaks)
    }

    pub fn sigma_kerns(&self) -> Vec<Days> {
        self.kernels.iter().map(|k| k.sigma_kern).collect()
    }

    pub fn kernel(&self, sigma_kern: Days) -> Option<&KernelSettings> {
        self.kernels.iter().find(|k| k.sigma_kern == sigma_kern)
    }

    /// Control indices trials may be injected into.
    pub fn eligible_controls(&self, num_controls: usize) -> Vec<usize> {
        (1..=num_controls)
            .filter(|ix| !self.skip_control_ix.contains(ix))
            .collect()
    }
}

/// Builder for [`SimDetecParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct SimDetecParamsBuilder {
    params: SimDetecParams,
    seasons: Option<Vec<(MJD, MJD)>>,
}

impl SimDetecParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a kernel size with its timescales and detection thresholds.
    pub fn kernel(mut self, sigma_kern: Days, sigma_sims: Vec<Days>, fom_limits: Vec<f64>) -> Self {
        self.params
            .kernels
            .push(KernelSettings::new(sigma_kern, sigma_sims, fom_limits));
        self
    }
    pub fn kernels(mut self, kernels: Vec<KernelSettings>) -> Self {
        self.params.kernels = kernels;
        self
    }
    pub fn peak_mags(mut self, peak_mag_min: Magnitude, peak_mag_max: Magnitude) -> Self {
        self.params.peak_mag_min = peak_mag_min;
        self.params.peak_mag_max = peak_mag_max;
        self
    }
    pub fn n_peaks(mut self, v: usize) -> Self {
        self.params.n_peaks = v;
        self
    }
    pub fn num_iterations(mut self, v: usize) -> Self {
        self.params.num_iterations = v;
        self
    }
    pub fn mjd_bin_size(mut self, v: Days) -> Self {
        self.params.mjd_bin_size = v;
        self
    }
    pub fn flag(mut self, v: MaskBits) -> Self {
        self.params.flag = v;
        self
    }
    pub fn mjd0(mut self, v: Option<MJD>) -> Self {
        self.params.mjd0 = v;
        self
    }
    pub fn observation_seasons(mut self, v: Option<Vec<(MJD, MJD)>>) -> Self {
        self.seasons = v;
        self
    }
    pub fn skip_control_ix(mut self, v: Vec<usize>) -> Self {
        self.params.skip_control_ix = v;
        self
    }
    pub fn compute_efficiencies(mut self, v: bool) -> Self {
        self.params.compute_efficiencies = v;
        self
    }

    /// Finalize the builder and produce a [`SimDetecParams`] instance.
    ///
    /// Validation rules
    /// -----------------
    /// * `mjd_bin_size > 0`, `num_iterations >= 1`, `n_peaks >= 1`, finite peak magnitudes.
    /// * At least one kernel; kernel sizes are distinct and cover at least one light curve bin.
    /// * Timescales are strictly positive and thresholds finite.
    /// * With `compute_efficiencies`, every kernel has at least one threshold.
    /// * `mjd0` is finite when given; every observation season has `start <= end`.
    ///
    /// Returns
    /// -----------------
    /// * `Err(SimDetecError::InvalidConfiguration)` naming the first rule that fails.
    pub fn build(self) -> Result<SimDetecParams, SimDetecError> {
        let invalid = |msg: String| Err(SimDetecError::InvalidConfiguration(msg));
        let mut params = self.params;

        if !(params.mjd_bin_size.is_finite() && params.mjd_bin_size > 0.0) {
            return invalid(format!("mjd_bin_size must be > 0, got {}", params.mjd_bin_size));
        }
        if params.num_iterations == 0 {
            return invalid("num_iterations must be >= 1".into());
        }
        if params.n_peaks == 0 {
            return invalid("n_peaks must be >= 1".into());
        }
        if !(params.peak_mag_min.is_finite() && params.peak_mag_max.is_finite()) {
            return invalid("peak magnitudes must be finite".into());
        }
        if params.kernels.is_empty() {
            return invalid("at least one kernel size (sigma_kern) is required".into());
        }

        for (i, k) in params.kernels.iter().enumerate() {
            GaussianKernel::new(k.sigma_kern, params.mjd_bin_size)?;
            if params.kernels[..i]
                .iter()
                .any(|other| other.sigma_kern == k.sigma_kern)
            {
                return invalid(format!("duplicate kernel size sigma_kern={}", k.sigma_kern));
            }
            if let Some(s) = k.sigma_sims.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
                return invalid(format!(
                    "sigma_sims must be > 0, got {s} for sigma_kern={}",
                    k.sigma_kern
                ));
            }
            if k.fom_limits.iter().any(|l| !l.is_finite()) {
                return invalid(format!("fom_limits must be finite for sigma_kern={}", k.sigma_kern));
            }
            if params.compute_efficiencies && k.fom_limits.is_empty() {
                return invalid(format!(
                    "efficiency calculation requested, but no FOM limits provided for sigma_kern={}",
                    k.sigma_kern
                ));
            }
        }

        if params.mjd0.is_some_and(|m| !m.is_finite()) {
            return invalid("mjd0 must be finite".into());
        }
        params.observation_seasons = self.seasons.map(ValidSeasons::new).transpose()?;

        Ok(params)
    }
}

impl fmt::Display for SimDetecParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seasons = self
            .observation_seasons
            .as_ref()
            .map_or_else(|| "none".to_string(), |s| format!("{:?}", s.ranges()));
        let mjd0 = self
            .mjd0
            .map_or_else(|| "none".to_string(), |m| format!("{m:.2}"));

        if f.alternate() {
            const PARAM_COL: usize = 44;
            writeln!(f, "Simulated Detection Parameters")?;
            writeln!(f, "------------------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = " ".repeat(PARAM_COL.saturating_sub(s.len()).max(1));
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Amplitude grid]")?;
            line!("peak_mag_min   = {:.2}", self.peak_mag_min, "Faintest peak magnitude")?;
            line!("peak_mag_max   = {:.2}", self.peak_mag_max, "Brightest peak magnitude")?;
            line!("n_peaks        = {}", self.n_peaks, "Number of peak magnitudes")?;
            line!("num_iterations = {}", self.num_iterations, "Trials per kernel and magnitude")?;

            writeln!(f, "\n[Light curves]")?;
            line!("mjd_bin_size   = {:.2} d", self.mjd_bin_size, "Averaging bin size")?;
            line!("flag           = {:#x}", self.flag, "Quality bits excluded from injections")?;
            line!("mjd0           = {}", mjd0, "Transient onset")?;
            line!("seasons        = {}", seasons, "Observation seasons")?;
            line!("skip_control_ix= {:?}", self.skip_control_ix, "Controls never sampled")?;

            writeln!(f, "\n[Kernels]")?;
            for k in &self.kernels {
                line!(
                    "sigma_kern     = {}",
                    k.sigma_kern,
                    format!("sigma_sims={:?} fom_limits={:?}", k.sigma_sims, k.fom_limits)
                )?;
            }
            line!(
                "efficiencies   = {}",
                self.compute_efficiencies,
                "Compute efficiencies from FOM limits"
            )?;
            Ok(())
        } else {
            write!(
                f,
                "SimDetecParams(sigma_kerns={:?}, peak_mag={:.2}→{:.2} x{}, num_iterations={}, bin={:.2}d, flag={:#x}, mjd0={}, seasons={})",
                self.sigma_kerns(),
                self.peak_mag_min,
                self.peak_mag_max,
                self.n_peaks,
                self.num_iterations,
                self.mjd_bin_size,
                self.flag,
                mjd0,
                seasons,
            )
        }
    }
}

// -------------------------------------------------------------------------------------------------
// JSON settings file
// -------------------------------------------------------------------------------------------------

/// Quality flag written either as an integer or as a hexadecimal string (`"0x800000"`).
fn deserialize_flag<'de, D>(deserializer: D) -> Result<MaskBits, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Int(MaskBits),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Int(v) => Ok(v),
        Flag::Text(s) => {
            let s = s.trim();
            let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => MaskBits::from_str_radix(hex, 16),
                None => s.parse::<MaskBits>(),
            };
            parsed.map_err(serde::de::Error::custom)
        }
    }
}

fn default_badday_flag() -> MaskBits {
    DEFAULT_BADDAY_FLAG
}
fn default_bin_size() -> Days {
    1.0
}
fn default_filt() -> String {
    "o".to_string()
}
fn default_num_iterations() -> usize {
    DEFAULT_NUM_ITERATIONS
}
fn default_peak_mag_min() -> Magnitude {
    DEFAULT_PEAK_MAG_MIN
}
fn default_peak_mag_max() -> Magnitude {
    DEFAULT_PEAK_MAG_MAX
}
fn default_n_peaks() -> usize {
    DEFAULT_N_PEAKS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnSettings {
    pub tnsname: String,
    pub num_controls: usize,
    #[serde(default = "default_bin_size")]
    pub mjd_bin_size: Days,
    #[serde(default = "default_filt")]
    pub filt: String,
    #[serde(default = "default_badday_flag", deserialize_with = "deserialize_flag")]
    pub badday_flag: MaskBits,
    #[serde(default)]
    pub mjd0: Option<MJD>,
}

/// Content of a `simulation_settings.json` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Directory holding `{tnsname}/` light curve directories
    pub data_dir: Utf8PathBuf,
    /// Directory trial and efficiency tables are written to
    pub tables_dir: Utf8PathBuf,
    #[serde(default = "default_num_iterations")]
    pub num_iterations: usize,
    #[serde(default)]
    pub observation_seasons: Vec<(MJD, MJD)>,
    #[serde(default)]
    pub skip_control_ix: Vec<usize>,
    pub sn_settings: SnSettings,
    pub sim_settings: Vec<KernelSettings>,
    #[serde(default = "default_peak_mag_min")]
    pub peak_mag_min: Magnitude,
    #[serde(default = "default_peak_mag_max")]
    pub peak_mag_max: Magnitude,
    #[serde(default = "default_n_peaks")]
    pub n_peaks: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SimulationSettings {
    pub fn from_json(content: &str) -> Result<Self, SimDetecError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: &Utf8Path) -> Result<Self, SimDetecError> {
        log::info!("Loading config file at {path}");
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Convert to validated sweep parameters
    ///
    /// Arguments
    /// -----------------
    /// * `use_seasons`: restrict injections to the configured observation seasons
    /// * `mjd0`: onset time overriding the one of `sn_settings`
    /// * `efficiencies`: compute the efficiency table at the end of the sweep
    ///
    /// Return
    /// ----------
    /// * `Err(SimDetecError::InvalidConfiguration)` if seasons are requested but none are
    ///   configured, or if the builder validation fails
    pub fn to_params(
        &self,
        use_seasons: bool,
        mjd0: Option<MJD>,
        efficiencies: bool,
    ) -> Result<SimDetecParams, SimDetecError> {
        if use_seasons && self.observation_seasons.is_empty() {
            return Err(SimDetecError::InvalidConfiguration(
                "fill out observation_seasons in the config file before restricting to seasons"
                    .into(),
            ));
        }
        SimDetecParams::builder()
            .kernels(self.sim_settings.clone())
            .peak_mags(self.peak_mag_min, self.peak_mag_max)
            .n_peaks(self.n_peaks)
            .num_iterations(self.num_iterations)
            .mjd_bin_size(self.sn_settings.mjd_bin_size)
            .flag(self.sn_settings.badday_flag)
            .mjd0(mjd0.or(self.sn_settings.mjd0))
            .observation_seasons(use_seasons.then(|| self.observation_seasons.clone()))
            .skip_control_ix(self.skip_control_ix.clone())
            .compute_efficiencies(efficiencies)
            .build()
    }
}

#[cfg(test)]
mod settings_test {
    use super::*;

    const SETTINGS: &str = r#"{
        "data_dir": "/data/atlas",
        "tables_dir": "/data/tables",
        "num_iterations": 200,
        "observation_seasons": [[58800, 58900], [59150.5, 59260]],
        "skip_control_ix": [3, 7],
        "sn_settings": {
            "tnsname": "2023ixf",
            "num_controls": 8,
            "mjd_bin_size": 1.0,
            "filt": "o",
            "badday_flag": "0x800000"
        },
        "sim_settings": [
            {"sigma_kern": 5, "sigma_sims": [2, 5, 20], "fom_limits": [3, 5]},
            {"sigma_kern": 15, "sigma_sims": [10, 30], "fom_limits": []}
        ]
    }"#;

    #[test]
    fn test_settings_json() {
        let settings = SimulationSettings::from_json(SETTINGS).unwrap();
        assert_eq!(settings.data_dir.as_str(), "/data/atlas");
        assert_eq!(settings.sn_settings.badday_flag, 0x800000);
        assert_eq!(settings.sim_settings[0].sigma_sims, vec![2.0, 5.0, 20.0]);
        assert_eq!(settings.n_peaks, DEFAULT_N_PEAKS);
        assert_eq!(settings.seed, None);

        let params = settings.to_params(true, Some(60100.0), false).unwrap();
        assert_eq!(params.sigma_kerns(), vec![5.0, 15.0]);
        assert_eq!(params.num_iterations, 200);
        assert_eq!(params.mjd0, Some(60100.0));
        assert_eq!(params.eligible_controls(8), vec![1, 2, 4, 5, 6, 8]);
        assert!(params.observation_seasons.unwrap().contains(59200.0));

        // efficiencies need FOM limits for every kernel
        assert!(matches!(
            settings.to_params(false, None, true),
            Err(SimDetecError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_integer_flag() {
        let json = SETTINGS.replace("\"0x800000\"", "8388608");
        let settings = SimulationSettings::from_json(&json).unwrap();
        assert_eq!(settings.sn_settings.badday_flag, 0x800000);
        assert!(SimulationSettings::from_json("{}").is_err());
    }

    #[test]
    fn test_seasons_required() {
        let json = SETTINGS.replace("[[58800, 58900], [59150.5, 59260]]", "[]");
        let settings = SimulationSettings::from_json(&json).unwrap();
        assert!(settings.to_params(true, None, false).is_err());
        assert!(settings.to_params(false, None, false).unwrap().observation_seasons.is_none());
    }

    #[test]
    fn test_builder_validation() {
        let base = || SimDetecParams::builder().kernel(5.0, vec![2.0], vec![3.0]);
        assert!(base().build().is_ok());
        assert!(SimDetecParams::builder().build().is_err());
        assert!(base().num_iterations(0).build().is_err());
        assert!(base().n_peaks(0).build().is_err());
        assert!(base().mjd_bin_size(0.0).build().is_err());
        assert!(base().kernel(5.0, vec![1.0], vec![]).build().is_err());
        assert!(base().kernel(0.2, vec![1.0], vec![]).build().is_err());
        assert!(base().kernel(3.0, vec![-1.0], vec![]).build().is_err());
        assert!(base()
            .observation_seasons(Some(vec![(2.0, 1.0)]))
            .build()
            .is_err());
        assert!(base().kernel(3.0, vec![1.0], vec![]).compute_efficiencies(true).build().is_err());
    }

    #[test]
    fn test_display() {
        let params = SimDetecParams::builder()
            .kernel(5.0, vec![2.0], vec![3.0])
            .build()
            .unwrap();
        let short = format!("{params}");
        assert!(short.starts_with("SimDetecParams(sigma_kerns=[5.0]"));
        let long = format!("{params:#}");
        assert!(long.contains("[Kernels]"));
        assert!(long.contains("flag           = 0x800000"));
    }
}
