//! # Constants and type aliases for simdetec
//!
//! This module centralizes the **photometric constants**, **sampling defaults**, and **common
//! type aliases** used by the simulated-detection engine.
//!
//! ## Overview
//!
//! - AB magnitude zero point for µJy fluxes
//! - Sampling of the parametric Gaussian signal model
//! - Default quality-mask flag and sweep defaults
//! - Type aliases documenting units at call sites

// -------------------------------------------------------------------------------------------------
// Photometry
// -------------------------------------------------------------------------------------------------

/// Zero point of the AB magnitude scale when fluxes are expressed in µJy
pub const AB_ZERO_POINT_UJY: f64 = 23.9;

/// Pogson ratio used by the magnitude scale
pub const POGSON: f64 = -2.5;

// -------------------------------------------------------------------------------------------------
// Signal model sampling
// -------------------------------------------------------------------------------------------------

/// Half span (days) of the sampled Gaussian model around its peak
pub const GAUSSIAN_HALF_SPAN: f64 = 100.0;

/// Sampling step (days) of the Gaussian model
pub const GAUSSIAN_STEP: f64 = 0.01;

// -------------------------------------------------------------------------------------------------
// Rolling sum
// -------------------------------------------------------------------------------------------------

/// Width of the matched-filter window in units of the kernel sigma
pub const WINDOW_SIGMAS: usize = 6;

// -------------------------------------------------------------------------------------------------
// Sweep defaults
// -------------------------------------------------------------------------------------------------

/// Bad-day flag set by the averaging stage, the default quality mask for injections
pub const DEFAULT_BADDAY_FLAG: u32 = 0x800000;

/// Faintest peak magnitude of the default amplitude grid
pub const DEFAULT_PEAK_MAG_MIN: f64 = 23.0;

/// Brightest peak magnitude of the default amplitude grid
pub const DEFAULT_PEAK_MAG_MAX: f64 = 16.0;

/// Number of peak magnitudes in the default amplitude grid
pub const DEFAULT_N_PEAKS: usize = 20;

/// Default number of Monte Carlo trials per (kernel, amplitude) pair
pub const DEFAULT_NUM_ITERATIONS: usize = 50_000;

/// Default file name of the persisted efficiency table
pub const EFFICIENCY_FILENAME: &str = "efficiencies.txt";

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Modified Julian Date (days)
pub type MJD = f64;
/// Flux density in micro-Jansky
pub type MicroJansky = f64;
/// AB apparent magnitude
pub type Magnitude = f64;
/// Duration in days
pub type Days = f64;
/// Quality bitmask of a measurement (0 = fully good)
pub type MaskBits = u32;
