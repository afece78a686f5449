//! # Light curve providers
//!
//! The simulation loop reads background light curves through the [`LightCurveProvider`]
//! trait. [`AveragedLightCurveDir`] implements it on the directory layout written by the
//! ATLAS averaging stage:
//!
//! ```text
//! {dir}/{tnsname}/{tnsname}.{filt}.{bin:.2}days.lc.txt                     supernova
//! {dir}/{tnsname}/controls/{tnsname}_i{index:03}.{filt}.{bin:.2}days.lc.txt  control light curves
//! ```
//!
//! Files are whitespace-separated tables with a header line. Columns `MJD`, `uJy` and
//! `duJy` are required; `MJDbin` falls back to `MJD` and `Mask` falls back to 0. Any other
//! column is ignored.
use camino::{Utf8Path, Utf8PathBuf};
use log::info;

use super::{LightCurve, Measurement};
use crate::{
    constants::{Days, MaskBits},
    simdetec_errors::SimDetecError,
};

/// Source of the supernova and control light curves of one target.
pub trait LightCurveProvider {
    /// Name of the target (e.g. a TNS designation such as `2023ixf`)
    fn tnsname(&self) -> &str;

    /// Number of control light curves available (indices 1..=N)
    fn num_controls(&self) -> usize;

    /// Averaging bin size in days of the provided light curves
    fn mjd_bin_size(&self) -> Days;

    /// Load the light curve at `control_index` (0 = supernova)
    fn load(&self, control_index: usize) -> Result<LightCurve, SimDetecError>;
}

/// Averaged light curves stored on disk in the ATLAS directory layout.
#[derive(Debug, Clone)]
pub struct AveragedLightCurveDir {
    pub data_dir: Utf8PathBuf,
    pub tnsname: String,
    pub filt: String,
    pub mjd_bin_size: Days,
    pub num_controls: usize,
}

impl AveragedLightCurveDir {
    pub fn new(
        data_dir: impl Into<Utf8PathBuf>,
        tnsname: impl Into<String>,
        filt: impl Into<String>,
        mjd_bin_size: Days,
        num_controls: usize,
    ) -> Self {
        AveragedLightCurveDir {
            data_dir: data_dir.into(),
            tnsname: tnsname.into(),
            filt: filt.into(),
            mjd_bin_size,
            num_controls,
        }
    }

    /// Path of the light curve file for a control index (0 = supernova).
    pub fn filename(&self, control_index: usize) -> Utf8PathBuf {
        let tns = &self.tnsname;
        let suffix = format!("{}.{:.2}days.lc.txt", self.filt, self.mjd_bin_size);
        if control_index == 0 {
            self.data_dir.join(tns).join(format!("{tns}.{suffix}"))
        } else {
            self.data_dir
                .join(tns)
                .join("controls")
                .join(format!("{tns}_i{control_index:03}.{suffix}"))
        }
    }
}

impl LightCurveProvider for AveragedLightCurveDir {
    fn tnsname(&self) -> &str {
        &self.tnsname
    }

    fn num_controls(&self) -> usize {
        self.num_controls
    }

    fn mjd_bin_size(&self) -> Days {
        self.mjd_bin_size
    }

    fn load(&self, control_index: usize) -> Result<LightCurve, SimDetecError> {
        let path = self.filename(control_index);
        info!("Loading light curve {control_index:03} from {path}");
        read_light_curve(&path, control_index, self.mjd_bin_size)
    }
}

/// Read a whitespace-separated light curve file.
pub fn read_light_curve(
    path: &Utf8Path,
    control_index: usize,
    mjd_bin_size: Days,
) -> Result<LightCurve, SimDetecError> {
    let content = std::fs::read_to_string(path)?;
    parse_light_curve(&content, control_index, mjd_bin_size)
        .map_err(|e| SimDetecError::LightCurveFormat(format!("{path}: {e}")))
}

fn parse_value(field: &str) -> Result<f64, String> {
    match field {
        "NaN" | "nan" | "NA" | "None" | "-" => Ok(f64::NAN),
        _ => field
            .parse::<f64>()
            .map_err(|_| format!("invalid number {field:?}")),
    }
}

fn parse_mask(field: &str) -> Result<MaskBits, String> {
    if let Some(hex) = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
    {
        return MaskBits::from_str_radix(hex, 16).map_err(|_| format!("invalid mask {field:?}"));
    }
    // masks written from float columns look like "8388608.0"
    let value = parse_value(field)?;
    if value.is_nan() {
        return Ok(0);
    }
    if value < 0.0 || value.fract() != 0.0 || value > MaskBits::MAX as f64 {
        return Err(format!("invalid mask {field:?}"));
    }
    Ok(value as MaskBits)
}

/// Parse the content of a whitespace-separated light curve table.
pub fn parse_light_curve(
    content: &str,
    control_index: usize,
    mjd_bin_size: Days,
) -> Result<LightCurve, String> {
    let mut lines = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));

    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| "empty light curve file".to_string())?
        .split_whitespace()
        .collect();
    let column = |name: &str| header.iter().position(|h| *h == name);
    let required = |name: &str| column(name).ok_or_else(|| format!("missing column {name}"));

    let mjd_col = required("MJD")?;
    let flux_col = required("uJy")?;
    let dflux_col = required("duJy")?;
    let bin_col = column("MJDbin");
    let mask_col = column("Mask");

    let rows = lines
        .enumerate()
        .map(|(n, line)| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != header.len() {
                return Err(format!(
                    "row {} has {} fields, header has {}",
                    n + 1,
                    fields.len(),
                    header.len()
                ));
            }
            let mjd = parse_value(fields[mjd_col])?;
            Ok(Measurement {
                mjd,
                mjd_bin: bin_col.map_or(Ok(mjd), |c| parse_value(fields[c]))?,
                flux: parse_value(fields[flux_col])?,
                dflux: parse_value(fields[dflux_col])?,
                mask: mask_col.map_or(Ok(0), |c| parse_mask(fields[c]))?,
            })
        })
        .collect::<Result<Vec<_>, String>>()?;

    Ok(LightCurve::from_measurements(
        control_index,
        mjd_bin_size,
        rows,
    ))
}
