//! # Efficiency table
//!
//! Recovery percentages aggregated from the trial tables, one row per
//! `(sigma_kern, peak_appmag, sigma_sim)` combination and one column per detection threshold.
//!
//! ## Layout
//! -----------------
//! Rows are ordered kernel first, then peak magnitude, then timescale. A kernel with no
//! configured timescale gets one row per magnitude with an undefined `sigma_sim`, which
//! selects every trial of the table.
//!
//! ```text
//! sigma_kern peak_appmag peak_flux sigma_sim pct_detec_3.00 pct_detec_5.00 ...
//! ```
//!
//! The threshold columns are the union of the thresholds of all kernels, in first-seen order;
//! a row holds `NaN` for a threshold its kernel does not use or when no trial matched.
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use itertools::iproduct;
use log::info;
use regex::Regex;

use crate::{
    constants::{Days, Magnitude, MicroJansky},
    conversion::mag_to_flux,
    light_curve::ValidSeasons,
    settings::KernelSettings,
    sim_detec_table::{SimDetecTables, TrialColumn},
    simdetec_errors::SimDetecError,
};

const BASE_COLUMNS: [&str; 4] = ["sigma_kern", "peak_appmag", "peak_flux", "sigma_sim"];
const PCT_PREFIX: &str = "pct_detec_";

/// Name of the efficiency column of a threshold.
pub fn pct_column(fom_limit: f64) -> String {
    format!("{PCT_PREFIX}{fom_limit:.2}")
}

fn same_limit(a: f64, b: f64) -> bool {
    pct_column(a) == pct_column(b)
}

#[derive(Debug, Clone, PartialEq)]
pub struct EfficiencyRow {
    pub sigma_kern: Days,
    pub peak_appmag: Magnitude,
    pub peak_flux: MicroJansky,
    pub sigma_sim: Option<Days>,
    /// One percentage per column of [`EfficiencyTable::fom_limits`]
    pub pct_detec: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EfficiencyTable {
    kernels: Vec<KernelSettings>,
    peak_appmags: Vec<Magnitude>,
    fom_limits: Vec<f64>,
    rows: Vec<EfficiencyRow>,
}

impl EfficiencyTable {
    /// Blank table over `kernels × peak_appmags × sigma_sims`.
    pub fn new(kernels: &[KernelSettings], peak_appmags: &[Magnitude]) -> Self {
        let mut fom_limits: Vec<f64> = Vec::new();
        for &limit in kernels.iter().flat_map(|k| &k.fom_limits) {
            if !fom_limits.iter().any(|&l| same_limit(l, limit)) {
                fom_limits.push(limit);
            }
        }

        let rows = kernels
            .iter()
            .flat_map(|k| {
                let sims: Vec<Option<Days>> = if k.sigma_sims.is_empty() {
                    vec![None]
                } else {
                    k.sigma_sims.iter().copied().map(Some).collect()
                };
                iproduct!(peak_appmags.iter().copied(), sims).map(move |(mag, sigma_sim)| {
                    EfficiencyRow {
                        sigma_kern: k.sigma_kern,
                        peak_appmag: mag,
                        peak_flux: mag_to_flux(mag),
                        sigma_sim,
                        pct_detec: Vec::new(),
                    }
                })
            })
            .map(|mut row| {
                row.pct_detec = vec![None; fom_limits.len()];
                row
            })
            .collect();

        EfficiencyTable {
            kernels: kernels.to_vec(),
            peak_appmags: peak_appmags.to_vec(),
            fom_limits,
            rows,
        }
    }

    pub fn rows(&self) -> &[EfficiencyRow] {
        &self.rows
    }

    pub fn fom_limits(&self) -> &[f64] {
        &self.fom_limits
    }

    pub fn kernels(&self) -> &[KernelSettings] {
        &self.kernels
    }

    pub fn column_names(&self) -> Vec<String> {
        BASE_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.fom_limits.iter().map(|&l| pct_column(l)))
            .collect()
    }

    fn limit_index(&self, fom_limit: f64) -> Result<usize, SimDetecError> {
        self.fom_limits
            .iter()
            .position(|&l| same_limit(l, fom_limit))
            .ok_or(SimDetecError::UnknownFomLimit(fom_limit))
    }

    /// Recovery percentage of one row and threshold, if computed.
    pub fn get(
        &self,
        sigma_kern: Days,
        peak_appmag: Magnitude,
        sigma_sim: Option<Days>,
        fom_limit: f64,
    ) -> Result<Option<f64>, SimDetecError> {
        let j = self.limit_index(fom_limit)?;
        Ok(self
            .rows
            .iter()
            .find(|r| {
                r.sigma_kern == sigma_kern
                    && (r.peak_appmag - peak_appmag).abs() < 5e-3
                    && r.sigma_sim == sigma_sim
            })
            .and_then(|r| r.pct_detec[j]))
    }

    /// Fill every threshold column from the trial tables
    ///
    /// Arguments
    /// -----------------
    /// * `tables`: trial tables of every `(kernel, magnitude)` pair of the table
    /// * `seasons`: if given, only trials peaking inside an observation season count
    ///
    /// Return
    /// ----------
    /// * `Err(SimDetecError::TableNotFound)` if a trial table is missing
    pub fn compute(
        &mut self,
        tables: &SimDetecTables,
        seasons: Option<&ValidSeasons>,
    ) -> Result<(), SimDetecError> {
        info!("Calculating efficiencies");
        let kernels = &self.kernels;
        let fom_limits = &self.fom_limits;
        for row in self.rows.iter_mut() {
            let kernel_limits = kernels
                .iter()
                .find(|k| k.sigma_kern == row.sigma_kern)
                .map(|k| k.fom_limits.as_slice())
                .unwrap_or_default();
            let filter = row.sigma_sim.map(|s| (TrialColumn::SigmaSim, s));

            for (j, &limit) in fom_limits.iter().enumerate() {
                row.pct_detec[j] = if kernel_limits.iter().any(|&l| same_limit(l, limit)) {
                    tables.get_efficiency(row.sigma_kern, row.peak_appmag, limit, seasons, filter)?
                } else {
                    None
                };
            }
        }
        Ok(())
    }

    /// Rows of a kernel and / or timescale, restricted to one threshold when given
    ///
    /// Return
    /// ----------
    /// * `Err(SimDetecError::UnknownFomLimit)` if `fom_limit` is not a column of the table
    pub fn get_subset(
        &self,
        sigma_kern: Option<Days>,
        fom_limit: Option<f64>,
        sigma_sim: Option<Days>,
    ) -> Result<EfficiencyTable, SimDetecError> {
        let columns: Vec<usize> = match fom_limit {
            Some(limit) => vec![self.limit_index(limit)?],
            None => (0..self.fom_limits.len()).collect(),
        };
        let rows = self
            .rows
            .iter()
            .filter(|r| sigma_kern.is_none_or(|k| r.sigma_kern == k))
            .filter(|r| sigma_sim.is_none_or(|s| r.sigma_sim == Some(s)))
            .map(|r| EfficiencyRow {
                pct_detec: columns.iter().map(|&j| r.pct_detec[j]).collect(),
                ..r.clone()
            })
            .collect();

        Ok(EfficiencyTable {
            kernels: self
                .kernels
                .iter()
                .filter(|k| sigma_kern.is_none_or(|s| k.sigma_kern == s))
                .cloned()
                .collect(),
            peak_appmags: self.peak_appmags.clone(),
            fom_limits: columns.iter().map(|&j| self.fom_limits[j]).collect(),
            rows,
        })
    }

    /// Append the rows of `other`, taking the union of kernels, magnitudes and thresholds.
    pub fn merge(&mut self, other: EfficiencyTable) {
        for k in other.kernels {
            match self.kernels.iter_mut().find(|s| s.sigma_kern == k.sigma_kern) {
                Some(existing) => {
                    for s in k.sigma_sims {
                        if !existing.sigma_sims.contains(&s) {
                            existing.sigma_sims.push(s);
                        }
                    }
                    for l in k.fom_limits {
                        if !existing.fom_limits.iter().any(|&e| same_limit(e, l)) {
                            existing.fom_limits.push(l);
                        }
                    }
                }
                None => self.kernels.push(k),
            }
        }
        for m in other.peak_appmags {
            if !self.peak_appmags.iter().any(|&p| (p - m).abs() < 5e-3) {
                self.peak_appmags.push(m);
            }
        }

        let mapping: Vec<usize> = other
            .fom_limits
            .iter()
            .map(|&l| match self.limit_index(l) {
                Ok(j) => j,
                Err(_) => {
                    self.fom_limits.push(l);
                    for row in self.rows.iter_mut() {
                        row.pct_detec.push(None);
                    }
                    self.fom_limits.len() - 1
                }
            })
            .collect();

        let width = self.fom_limits.len();
        self.rows.extend(other.rows.into_iter().map(|r| {
            let mut pct_detec = vec![None; width];
            for (&j, v) in mapping.iter().zip(&r.pct_detec) {
                pct_detec[j] = *v;
            }
            EfficiencyRow { pct_detec, ..r }
        }));
    }

    /// Write the table as space-delimited text to `tables_dir/filename`.
    pub fn save(&self, tables_dir: &Utf8Path, filename: &str) -> Result<Utf8PathBuf, SimDetecError> {
        std::fs::create_dir_all(tables_dir)?;
        let path = tables_dir.join(filename);
        info!("Saving efficiency table to {path}");

        let nan = |v: Option<f64>| v.map_or_else(|| "NaN".to_string(), |x| x.to_string());
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .from_path(&path)?;
        writer.write_record(self.column_names())?;
        for row in &self.rows {
            let record = [
                row.sigma_kern.to_string(),
                row.peak_appmag.to_string(),
                row.peak_flux.to_string(),
                nan(row.sigma_sim),
            ]
            .into_iter()
            .chain(row.pct_detec.iter().map(|&v| nan(v)));
            writer.write_record(record)?;
        }
        writer.flush()?;
        Ok(path)
    }

    /// Read a table written by [`EfficiencyTable::save`].
    ///
    /// The kernels, timescales and magnitudes are rebuilt from the rows; the thresholds of a
    /// kernel are the columns holding at least one value in its rows.
    pub fn load(tables_dir: &Utf8Path, filename: &str) -> Result<Self, SimDetecError> {
        let path = tables_dir.join(filename);
        if !path.is_file() {
            return Err(SimDetecError::TableNotFound(path.to_string()));
        }
        info!("Loading efficiency table from {path}");
        let format_err = |msg: String| SimDetecError::TableFormat(format!("{path}: {msg}"));

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b' ')
            .trim(csv::Trim::All)
            .from_path(&path)?;
        let headers = reader.headers()?.clone();

        let base: Vec<usize> = BASE_COLUMNS
            .iter()
            .map(|name| {
                headers
                    .iter()
                    .position(|h| h == *name)
                    .ok_or_else(|| format_err(format!("missing column {name}")))
            })
            .collect::<Result<_, _>>()?;

        let pct_re = Regex::new(r"^pct_detec_(-?\d+(?:\.\d+)?)$")?;
        let mut pct_cols = Vec::new();
        let mut fom_limits = Vec::new();
        for (i, h) in headers.iter().enumerate() {
            if let Some(caps) = pct_re.captures(h) {
                let limit = caps[1]
                    .parse::<f64>()
                    .map_err(|e| format_err(format!("column {h}: {e}")))?;
                pct_cols.push(i);
                fom_limits.push(limit);
            }
        }

        let parse = |field: &str| -> Result<Option<f64>, SimDetecError> {
            match field {
                "" | "NaN" | "nan" | "None" => Ok(None),
                s => s
                    .parse::<f64>()
                    .map(|v| (!v.is_nan()).then_some(v))
                    .map_err(|_| format_err(format!("invalid number {s:?}"))),
            }
        };
        let required = |field: &str| {
            parse(field)?.ok_or_else(|| format_err(format!("missing required value {field:?}")))
        };

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let field = |i: usize| record.get(i).unwrap_or("");
            rows.push(EfficiencyRow {
                sigma_kern: required(field(base[0]))?,
                peak_appmag: required(field(base[1]))?,
                peak_flux: required(field(base[2]))?,
                sigma_sim: parse(field(base[3]))?,
                pct_detec: pct_cols
                    .iter()
                    .map(|&i| parse(field(i)))
                    .collect::<Result<_, _>>()?,
            });
        }

        let mut kernels: Vec<KernelSettings> = Vec::new();
        let mut peak_appmags: Vec<Magnitude> = Vec::new();
        for row in &rows {
            if !peak_appmags.iter().any(|&p| (p - row.peak_appmag).abs() < 5e-3) {
                peak_appmags.push(row.peak_appmag);
            }
            let kernel = match kernels.iter().position(|k| k.sigma_kern == row.sigma_kern) {
                Some(i) => &mut kernels[i],
                None => {
                    kernels.push(KernelSettings::new(row.sigma_kern, Vec::new(), Vec::new()));
                    let last = kernels.len() - 1;
                    &mut kernels[last]
                }
            };
            if let Some(s) = row.sigma_sim {
                if !kernel.sigma_sims.contains(&s) {
                    kernel.sigma_sims.push(s);
                }
            }
            for (j, v) in row.pct_detec.iter().enumerate() {
                if v.is_some() && !kernel.fom_limits.iter().any(|&l| same_limit(l, fom_limits[j])) {
                    kernel.fom_limits.push(fom_limits[j]);
                }
            }
        }

        Ok(EfficiencyTable {
            kernels,
            peak_appmags,
            fom_limits,
            rows,
        })
    }
}

impl fmt::Display for EfficiencyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nan = |v: Option<f64>, prec: usize| {
            v.map_or_else(|| "NaN".to_string(), |x| format!("{x:.prec$}"))
        };
        let header = self.column_names();
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|r| {
                [
                    r.sigma_kern.to_string(),
                    format!("{:.2}", r.peak_appmag),
                    format!("{:.2}", r.peak_flux),
                    nan(r.sigma_sim, 1),
                ]
                .into_iter()
                .chain(r.pct_detec.iter().map(|&v| nan(v, 2)))
                .collect()
            })
            .collect();

        let widths: Vec<usize> = (0..header.len())
            .map(|j| {
                cells
                    .iter()
                    .map(|row| row[j].len())
                    .chain(std::iter::once(header[j].len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let write_line = |f: &mut fmt::Formatter<'_>, line: &[String]| -> fmt::Result {
            for (j, cell) in line.iter().enumerate() {
                if j > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{cell:>width$}", width = widths[j])?;
            }
            writeln!(f)
        };

        write_line(f, header.as_slice())?;
        for row in &cells {
            write_line(f, row.as_slice())?;
        }
        Ok(())
    }
}
