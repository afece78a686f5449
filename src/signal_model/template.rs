use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use log::info;

use super::{interpolate::linear_interpolate, ModelParameters, SignalModel};
use crate::{
    constants::{Magnitude, MicroJansky, MJD},
    conversion::mag_to_flux,
    simdetec_errors::SimDetecError,
};

/// Empirical light curve template loaded from a (time, magnitude) table.
///
/// Evaluation puts the brightest sample on the requested peak time and rescales the flux so
/// that this sample matches the requested peak magnitude. The loaded samples are never
/// modified; every evaluation works on a scaled copy.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateModel {
    pub name: String,
    pub path: Utf8PathBuf,
    times: Vec<MJD>,
    mags: Vec<Magnitude>,
    flux: Vec<MicroJansky>,
    peak_ix: usize,
    /// Default peak magnitude used when evaluation gives none
    pub peak_appmag: Option<Magnitude>,
}

impl TemplateModel {
    /// Load a template from a whitespace-separated two-column file
    ///
    /// Arguments
    /// -----------------
    /// * `path`: file with one `time magnitude` pair per line; blank lines and lines starting
    ///   with `#` are skipped
    /// * `peak_appmag`: default peak magnitude, `None` to keep the template's own amplitude
    ///
    /// Return
    /// ----------
    /// * `Err(SimDetecError::InvalidTemplate)` if the file cannot be read or does not hold at
    ///   least two valid samples
    pub fn load(path: &Utf8Path, peak_appmag: Option<Magnitude>) -> Result<Self, SimDetecError> {
        info!("Loading model light curve at {path}");
        let content = std::fs::read_to_string(path).map_err(|e| SimDetecError::InvalidTemplate {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        Self::from_table(path, &content, peak_appmag)
    }

    /// Parse a template from the content of a two-column table; `path` labels errors.
    pub fn from_table(
        path: impl Into<Utf8PathBuf>,
        content: &str,
        peak_appmag: Option<Magnitude>,
    ) -> Result<Self, SimDetecError> {
        let path = path.into();
        let invalid = |reason: String| SimDetecError::InvalidTemplate {
            path: path.clone(),
            reason,
        };

        let mut samples = content
            .lines()
            .enumerate()
            .map(|(n, line)| (n + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
            .map(|(n, line)| {
                let fields: Vec<&str> = line.split_whitespace().collect();
                let [time, mag] = fields.as_slice() else {
                    return Err(invalid(format!(
                        "line {n}: expected 2 columns, found {}",
                        fields.len()
                    )));
                };
                let parse = |field: &str| {
                    field
                        .parse::<f64>()
                        .ok()
                        .filter(|v| v.is_finite())
                        .ok_or_else(|| invalid(format!("line {n}: invalid number {field:?}")))
                };
                Ok((parse(*time)?, parse(*mag)?))
            })
            .collect::<Result<Vec<(MJD, Magnitude)>, SimDetecError>>()?;

        if samples.len() < 2 {
            return Err(invalid(format!(
                "at least 2 samples required, found {}",
                samples.len()
            )));
        }
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));

        let (times, mags): (Vec<MJD>, Vec<Magnitude>) = samples.into_iter().unzip();
        let flux = mags.iter().map(|&m| mag_to_flux(m)).collect();
        let peak_ix = mags
            .iter()
            .enumerate()
            .fold(0, |best, (i, m)| if *m < mags[best] { i } else { best });

        Ok(TemplateModel {
            name: "Pre-SN Outburst Model".to_string(),
            path,
            times,
            mags,
            flux,
            peak_ix,
            peak_appmag,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Magnitude of the brightest template sample.
    pub fn native_peak_appmag(&self) -> Magnitude {
        self.mags[self.peak_ix]
    }

    /// Time of the brightest template sample, in the template's own time axis.
    pub fn native_peak_mjd(&self) -> MJD {
        self.times[self.peak_ix]
    }

    /// Time span of the template.
    pub fn duration(&self) -> f64 {
        self.times[self.times.len() - 1] - self.times[0]
    }

    /// Peak magnitude an evaluation with `requested` produces.
    pub fn peak_appmag_for(&self, requested: Option<Magnitude>) -> Magnitude {
        requested
            .or(self.peak_appmag)
            .unwrap_or_else(|| self.native_peak_appmag())
    }
}

impl SignalModel for TemplateModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        mjds: &[MJD],
        peak_mjd: Option<MJD>,
        peak_appmag: Option<Magnitude>,
    ) -> Result<Vec<MicroJansky>, SimDetecError> {
        let peak_mjd = peak_mjd.ok_or(SimDetecError::MissingPeakTime)?;
        let scale = mag_to_flux(self.peak_appmag_for(peak_appmag)) / self.flux[self.peak_ix];

        // evaluation times mapped onto the template's time axis
        let shift = self.native_peak_mjd() - peak_mjd;
        let local: Vec<MJD> = mjds.iter().map(|t| t + shift).collect();

        Ok(linear_interpolate(&self.times, &self.flux, &local)
            .into_iter()
            .map(|f| f * scale)
            .collect())
    }

    fn row_parameters(&self) -> ModelParameters {
        ModelParameters::default()
    }

    fn peak_appmag(&self) -> Option<Magnitude> {
        Some(self.peak_appmag_for(None))
    }
}

impl fmt::Display for TemplateModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Simulation of type {} with peak app mag {:.2}",
            self.name,
            self.peak_appmag_for(None)
        )
    }
}
