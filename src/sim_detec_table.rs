//! # Simulated-detection trial tables
//!
//! One [`SimDetecTable`] stores the Monte Carlo trials of one `(sigma_kern, peak_appmag)`
//! pair: a pre-sized list of [`TrialRecord`] rows, one per iteration, overwritten in place by
//! [`SimDetecTable::set_trial`]. [`SimDetecTables`] maps [`TableKey`]s to tables.
//!
//! ## Keys
//! -----------------
//! The peak magnitude of a key is rounded to two decimals and stored as an integer
//! number of centi-magnitudes, so `19.999` and `20.001` select the same table while `19.99`
//! and `20.01` do not. File names are derived from the key:
//!
//! ```text
//! {tables_dir}/simdetec_{sigma_kern}_{peak_appmag:.2}.txt
//! ```
//!
//! ## File format
//! -----------------
//! Space-delimited text with a header line. Columns, in order:
//!
//! ```text
//! sigma_kern peak_appmag peak_flux control_index max_fom max_fom_mjd sigma_sim peak_mjd
//! ```
//!
//! Values never set (slots of unrun trials, failed trials) are written as `NaN`. The last
//! two columns may be absent when reading.
use std::collections::HashMap;

use ahash::RandomState;
use camino::{Utf8Path, Utf8PathBuf};
use log::{info, warn};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    constants::{Days, Magnitude, MicroJansky, MJD},
    conversion::{flux_to_mag, mag_to_flux},
    light_curve::ValidSeasons,
    simdetec_errors::SimDetecError,
};

pub const TRIAL_COLUMNS: [&str; 8] = [
    "sigma_kern",
    "peak_appmag",
    "peak_flux",
    "control_index",
    "max_fom",
    "max_fom_mjd",
    "sigma_sim",
    "peak_mjd",
];

/// Identity of a trial table: kernel size and peak magnitude rounded to 0.01 mag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableKey {
    pub sigma_kern: OrderedFloat<Days>,
    pub peak_centimag: i64,
}

impl TableKey {
    pub fn new(sigma_kern: Days, peak_appmag: Magnitude) -> Self {
        TableKey {
            sigma_kern: OrderedFloat(sigma_kern),
            peak_centimag: (peak_appmag * 100.0).round() as i64,
        }
    }

    pub fn from_peak_flux(sigma_kern: Days, peak_flux: MicroJansky) -> Result<Self, SimDetecError> {
        Ok(Self::new(sigma_kern, flux_to_mag(peak_flux)?))
    }

    pub fn peak_appmag(&self) -> Magnitude {
        self.peak_centimag as f64 / 100.0
    }

    /// File stem of the table, e.g. `simdetec_5.0_20.00`.
    pub fn file_stem(&self) -> String {
        format!("simdetec_{:?}_{:.2}", self.sigma_kern.0, self.peak_appmag())
    }

    pub fn filename(&self, tables_dir: &Utf8Path) -> Utf8PathBuf {
        tables_dir.join(format!("{}.txt", self.file_stem()))
    }
}

fn serialize_nan<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) if !v.is_nan() => serializer.serialize_f64(*v),
        _ => serializer.serialize_str("NaN"),
    }
}

fn deserialize_nan<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let field = String::deserialize(deserializer)?;
    match field.trim() {
        "" | "NaN" | "nan" | "None" => Ok(None),
        s => s
            .parse::<f64>()
            .map(|v| (!v.is_nan()).then_some(v))
            .map_err(serde::de::Error::custom),
    }
}

fn serialize_nan_index<S: Serializer>(
    value: &Option<usize>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_u64(*v as u64),
        None => serializer.serialize_str("NaN"),
    }
}

// integer columns holding NaN are written as floats, e.g. "3.0"
fn deserialize_nan_index<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<usize>, D::Error> {
    match deserialize_nan(deserializer)? {
        None => Ok(None),
        Some(v) if v >= 0.0 && v.fract() == 0.0 => Ok(Some(v as usize)),
        Some(v) => Err(serde::de::Error::custom(format!(
            "invalid control index {v}"
        ))),
    }
}

/// One row of a trial table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub sigma_kern: Days,
    pub peak_appmag: Magnitude,
    pub peak_flux: MicroJansky,
    #[serde(
        serialize_with = "serialize_nan_index",
        deserialize_with = "deserialize_nan_index"
    )]
    pub control_index: Option<usize>,
    #[serde(serialize_with = "serialize_nan", deserialize_with = "deserialize_nan")]
    pub max_fom: Option<f64>,
    #[serde(serialize_with = "serialize_nan", deserialize_with = "deserialize_nan")]
    pub max_fom_mjd: Option<MJD>,
    #[serde(
        default,
        serialize_with = "serialize_nan",
        deserialize_with = "deserialize_nan"
    )]
    pub sigma_sim: Option<Days>,
    #[serde(
        default,
        serialize_with = "serialize_nan",
        deserialize_with = "deserialize_nan"
    )]
    pub peak_mjd: Option<MJD>,
}

impl TrialRecord {
    /// Row of a slot whose trial has not run yet.
    pub fn blank(sigma_kern: Days, peak_appmag: Magnitude, peak_flux: MicroJansky) -> Self {
        TrialRecord {
            sigma_kern,
            peak_appmag,
            peak_flux,
            control_index: None,
            max_fom: None,
            max_fom_mjd: None,
            sigma_sim: None,
            peak_mjd: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.max_fom.is_some()
    }
}

/// Result of one trial, as recorded by [`SimDetecTable::set_trial`].
///
/// `max_fom` and `max_fom_mjd` are `None` for a trial whose injection failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialOutcome {
    pub control_index: usize,
    pub max_fom: Option<f64>,
    pub max_fom_mjd: Option<MJD>,
    pub sigma_sim: Option<Days>,
    pub peak_mjd: MJD,
}

/// Trial columns usable as a recovery-fraction filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialColumn {
    SigmaSim,
    ControlIndex,
    PeakMjd,
}

impl TrialColumn {
    fn value(&self, row: &TrialRecord) -> Option<f64> {
        match self {
            TrialColumn::SigmaSim => row.sigma_sim,
            TrialColumn::ControlIndex => row.control_index.map(|i| i as f64),
            TrialColumn::PeakMjd => row.peak_mjd,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimDetecTable {
    pub sigma_kern: Days,
    pub peak_appmag: Magnitude,
    pub peak_flux: MicroJansky,
    rows: Vec<TrialRecord>,
}

impl SimDetecTable {
    pub fn new(sigma_kern: Days, peak_appmag: Magnitude) -> Self {
        SimDetecTable {
            sigma_kern,
            peak_appmag,
            peak_flux: mag_to_flux(peak_appmag),
            rows: Vec::new(),
        }
    }

    pub fn from_peak_flux(sigma_kern: Days, peak_flux: MicroJansky) -> Result<Self, SimDetecError> {
        Ok(SimDetecTable {
            sigma_kern,
            peak_appmag: flux_to_mag(peak_flux)?,
            peak_flux,
            rows: Vec::new(),
        })
    }

    pub fn key(&self) -> TableKey {
        TableKey::new(self.sigma_kern, self.peak_appmag)
    }

    /// Allocate `num_iterations` blank trial slots, dropping any previous rows.
    pub fn setup(&mut self, num_iterations: usize) {
        self.rows = vec![
            TrialRecord::blank(self.sigma_kern, self.peak_appmag, self.peak_flux);
            num_iterations
        ];
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[TrialRecord] {
        &self.rows
    }

    /// Number of rows holding a recorded statistic.
    pub fn num_completed(&self) -> usize {
        self.rows.iter().filter(|r| r.is_completed()).count()
    }

    /// Overwrite the trial slot at `index`.
    pub fn set_trial(&mut self, index: usize, outcome: TrialOutcome) -> Result<(), SimDetecError> {
        let n = self.rows.len();
        let row = self.rows.get_mut(index).ok_or_else(|| {
            SimDetecError::TableFormat(format!(
                "trial index {index} out of range for a table of {n} rows"
            ))
        })?;
        row.control_index = Some(outcome.control_index);
        row.max_fom = outcome.max_fom;
        row.max_fom_mjd = outcome.max_fom_mjd;
        row.sigma_sim = outcome.sigma_sim;
        row.peak_mjd = Some(outcome.peak_mjd);
        Ok(())
    }

    pub fn filename(&self, tables_dir: &Utf8Path) -> Utf8PathBuf {
        self.key().filename(tables_dir)
    }

    /// Write the table to `tables_dir`, creating the directory if needed.
    pub fn save(&self, tables_dir: &Utf8Path) -> Result<Utf8PathBuf, SimDetecError> {
        std::fs::create_dir_all(tables_dir)?;
        let path = self.filename(tables_dir);
        info!("Saving SimDetecTable {} to {path}", self.key().file_stem());

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .from_path(&path)?;
        writer.write_record(TRIAL_COLUMNS)?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(path)
    }

    /// Read the table of `(sigma_kern, peak_appmag)` from `tables_dir`
    ///
    /// Return
    /// ----------
    /// * `Err(SimDetecError::TableNotFound)` if the file does not exist
    /// * `Err(SimDetecError::TableFormat)` if a row belongs to another kernel or magnitude
    pub fn load(
        tables_dir: &Utf8Path,
        sigma_kern: Days,
        peak_appmag: Magnitude,
    ) -> Result<Self, SimDetecError> {
        let mut table = SimDetecTable::new(sigma_kern, peak_appmag);
        let path = table.filename(tables_dir);
        if !path.is_file() {
            return Err(SimDetecError::TableNotFound(path.to_string()));
        }
        info!("Loading SimDetecTable {} from {path}", table.key().file_stem());

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b' ')
            .trim(csv::Trim::All)
            .from_path(&path)?;
        table.rows = reader
            .deserialize::<TrialRecord>()
            .collect::<Result<Vec<_>, csv::Error>>()?;

        let key = table.key();
        if let Some(row) = table
            .rows
            .iter()
            .find(|r| TableKey::new(r.sigma_kern, r.peak_appmag) != key)
        {
            return Err(SimDetecError::TableFormat(format!(
                "{path}: row with sigma_kern={} peak_appmag={} in table {}",
                row.sigma_kern,
                row.peak_appmag,
                key.file_stem()
            )));
        }
        Ok(table)
    }

    /// Percentage of trials recovered above a detection threshold
    ///
    /// Arguments
    /// -----------------
    /// * `fom_limit`: detection threshold on the max statistic
    /// * `seasons`: if given, only trials whose peak MJD lies in a season are selected
    /// * `filter`: if given, only trials whose column equals the value are selected
    ///
    /// Return
    /// ----------
    /// * `Some(100 * detected / selected)` among the selected trials holding a statistic
    /// * `None` when no trial is selected
    pub fn get_efficiency(
        &self,
        fom_limit: f64,
        seasons: Option<&ValidSeasons>,
        filter: Option<(TrialColumn, f64)>,
    ) -> Option<f64> {
        let (selected, detected) = self
            .rows
            .iter()
            .filter(|r| r.is_completed())
            .filter(|r| filter.is_none_or(|(col, value)| col.value(r) == Some(value)))
            .filter(|r| {
                seasons.is_none_or(|s| r.peak_mjd.is_some_and(|mjd| s.contains(mjd)))
            })
            .fold((0usize, 0usize), |(n, k), r| {
                let hit = r.max_fom.is_some_and(|fom| fom >= fom_limit);
                (n + 1, k + usize::from(hit))
            });

        if selected == 0 {
            warn!(
                "No trials selected in {} for FOM limit {fom_limit:.2} (filter {filter:?}); efficiency undefined",
                self.key().file_stem()
            );
            return None;
        }
        Some(100.0 * detected as f64 / selected as f64)
    }
}

/// Collection of trial tables indexed by [`TableKey`].
#[derive(Debug, Clone, Default)]
pub struct SimDetecTables {
    tables: HashMap<TableKey, SimDetecTable, RandomState>,
}

impl SimDetecTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Create (or reset) the table of a pair with `num_iterations` blank slots.
    pub fn setup(
        &mut self,
        sigma_kern: Days,
        peak_appmag: Magnitude,
        num_iterations: usize,
    ) -> &mut SimDetecTable {
        let mut table = SimDetecTable::new(sigma_kern, peak_appmag);
        table.setup(num_iterations);
        let slot = self
            .tables
            .entry(table.key())
            .or_insert_with(|| SimDetecTable::new(sigma_kern, peak_appmag));
        *slot = table;
        slot
    }

    pub fn insert(&mut self, table: SimDetecTable) -> Option<SimDetecTable> {
        self.tables.insert(table.key(), table)
    }

    pub fn get(&self, sigma_kern: Days, peak_appmag: Magnitude) -> Option<&SimDetecTable> {
        self.tables.get(&TableKey::new(sigma_kern, peak_appmag))
    }

    fn get_or_err(&self, key: TableKey) -> Result<&SimDetecTable, SimDetecError> {
        self.tables
            .get(&key)
            .ok_or_else(|| SimDetecError::TableNotFound(key.file_stem()))
    }

    /// Keys of all tables, sorted by kernel then magnitude.
    pub fn keys(&self) -> Vec<TableKey> {
        let mut keys: Vec<TableKey> = self.tables.keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn set_trial(
        &mut self,
        sigma_kern: Days,
        peak_appmag: Magnitude,
        index: usize,
        outcome: TrialOutcome,
    ) -> Result<(), SimDetecError> {
        let key = TableKey::new(sigma_kern, peak_appmag);
        self.tables
            .get_mut(&key)
            .ok_or_else(|| SimDetecError::TableNotFound(key.file_stem()))?
            .set_trial(index, outcome)
    }

    pub fn get_efficiency(
        &self,
        sigma_kern: Days,
        peak_appmag: Magnitude,
        fom_limit: f64,
        seasons: Option<&ValidSeasons>,
        filter: Option<(TrialColumn, f64)>,
    ) -> Result<Option<f64>, SimDetecError> {
        Ok(self
            .get_or_err(TableKey::new(sigma_kern, peak_appmag))?
            .get_efficiency(fom_limit, seasons, filter))
    }

    /// Load the tables of every `(kernel, magnitude)` pair; a missing table is an error.
    pub fn load_all(
        tables_dir: &Utf8Path,
        sigma_kerns: &[Days],
        peak_appmags: &[Magnitude],
    ) -> Result<Self, SimDetecError> {
        let mut tables = SimDetecTables::new();
        for &kern in sigma_kerns {
            for &mag in peak_appmags {
                tables.insert(SimDetecTable::load(tables_dir, kern, mag)?);
            }
        }
        Ok(tables)
    }

    pub fn save(
        &self,
        sigma_kern: Days,
        peak_appmag: Magnitude,
        tables_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, SimDetecError> {
        self.get_or_err(TableKey::new(sigma_kern, peak_appmag))?
            .save(tables_dir)
    }

    pub fn save_all(&self, tables_dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, SimDetecError> {
        self.keys()
            .into_iter()
            .map(|key| self.get_or_err(key)?.save(tables_dir))
            .collect()
    }
}

#[cfg(test)]
mod sim_detec_table_test {
    use super::*;
    use approx::assert_relative_eq;

    fn outcome(control_index: usize, max_fom: f64, sigma_sim: f64, peak_mjd: f64) -> TrialOutcome {
        TrialOutcome {
            control_index,
            max_fom: Some(max_fom),
            max_fom_mjd: Some(peak_mjd.round()),
            sigma_sim: Some(sigma_sim),
            peak_mjd,
        }
    }

    #[test]
    fn test_key_stability() {
        assert_eq!(TableKey::new(5.0, 19.999), TableKey::new(5.0, 20.001));
        assert_ne!(TableKey::new(5.0, 19.99), TableKey::new(5.0, 20.01));
        assert_ne!(TableKey::new(5.0, 20.0), TableKey::new(3.0, 20.0));
        assert_eq!(TableKey::new(5.0, 19.999).file_stem(), "simdetec_5.0_20.00");
        assert_eq!(
            TableKey::from_peak_flux(5.0, mag_to_flux(18.5)).unwrap(),
            TableKey::new(5.0, 18.5)
        );

        let mut tables = SimDetecTables::new();
        tables.setup(5.0, 19.999, 3);
        assert_eq!(tables.get(5.0, 20.001).unwrap().len(), 3);
        assert!(tables.get(5.0, 20.01).is_none());
    }

    #[test]
    fn test_set_trial() {
        let mut table = SimDetecTable::new(5.0, 20.0);
        table.setup(2);
        table.set_trial(1, outcome(4, 12.5, 2.0, 59001.3)).unwrap();

        let row = table.rows()[1];
        assert_eq!(row.control_index, Some(4));
        assert_eq!(row.max_fom, Some(12.5));
        assert_eq!(row.peak_mjd, Some(59001.3));
        assert!(!table.rows()[0].is_completed());
        assert_eq!(table.num_completed(), 1);
        assert!(matches!(
            table.set_trial(2, outcome(1, 1.0, 2.0, 1.0)),
            Err(SimDetecError::TableFormat(_))
        ));
    }

    #[test]
    fn test_save_load_partial_table() {
        let dir = tempfile::tempdir().unwrap();
        let tables_dir = Utf8Path::from_path(dir.path()).unwrap();

        let mut table = SimDetecTable::new(5.0, 20.0);
        table.setup(100);
        for i in 0..50 {
            table
                .set_trial(i, outcome(1 + i % 8, i as f64 * 0.5, 2.0, 59000.0 + i as f64))
                .unwrap();
        }
        let path = table.save(tables_dir).unwrap();
        assert!(path.as_str().ends_with("simdetec_5.0_20.00.txt"));

        let loaded = SimDetecTable::load(tables_dir, 5.0, 20.0).unwrap();
        assert_eq!(loaded.len(), 100);
        assert_eq!(loaded.num_completed(), 50);
        assert_eq!(loaded.rows(), table.rows());

        let blank = loaded.rows()[75];
        assert_eq!(blank.sigma_kern, 5.0);
        assert_eq!(blank.peak_appmag, 20.0);
        assert_relative_eq!(blank.peak_flux, mag_to_flux(20.0));
        assert_eq!(blank.control_index, None);
        assert_eq!(blank.max_fom, None);
        assert_eq!(blank.max_fom_mjd, None);

        let header = std::fs::read_to_string(&path).unwrap();
        assert!(header.starts_with(
            "sigma_kern peak_appmag peak_flux control_index max_fom max_fom_mjd sigma_sim peak_mjd"
        ));
    }

    #[test]
    fn test_load_six_column_table() {
        let dir = tempfile::tempdir().unwrap();
        let tables_dir = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::write(
            tables_dir.join("simdetec_3.0_18.00.txt"),
            "sigma_kern peak_appmag peak_flux control_index max_fom max_fom_mjd\n\
             3.0 18.0 229.08676527677744 2.0 17.5 59001.0\n\
             3.0 18.0 229.08676527677744 NaN NaN NaN\n",
        )
        .unwrap();
        let table = SimDetecTable::load(tables_dir, 3.0, 18.0).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].control_index, Some(2));
        assert_eq!(table.rows()[0].sigma_sim, None);
        assert_eq!(table.get_efficiency(10.0, None, None), Some(100.0));
    }

    #[test]
    fn test_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        let tables_dir = Utf8Path::from_path(dir.path()).unwrap();
        assert!(matches!(
            SimDetecTable::load(tables_dir, 5.0, 20.0),
            Err(SimDetecError::TableNotFound(_))
        ));
        assert!(SimDetecTables::load_all(tables_dir, &[5.0], &[20.0]).is_err());
    }

    #[test]
    fn test_efficiency() {
        let mut table = SimDetecTable::new(5.0, 20.0);
        table.setup(6);
        table.set_trial(0, outcome(1, 10.0, 2.0, 59000.0)).unwrap();
        table.set_trial(1, outcome(2, 3.0, 2.0, 59100.0)).unwrap();
        table.set_trial(2, outcome(3, 8.0, 4.0, 59000.5)).unwrap();
        table.set_trial(3, outcome(4, 1.0, 4.0, 59200.0)).unwrap();
        // failed trial: never selected
        table
            .set_trial(
                4,
                TrialOutcome {
                    control_index: 5,
                    max_fom: None,
                    max_fom_mjd: None,
                    sigma_sim: Some(2.0),
                    peak_mjd: 59000.0,
                },
            )
            .unwrap();

        assert_eq!(table.get_efficiency(5.0, None, None), Some(50.0));
        assert_eq!(table.get_efficiency(0.0, None, None), Some(100.0));
        assert_eq!(table.get_efficiency(100.0, None, None), Some(0.0));
        assert_eq!(
            table.get_efficiency(5.0, None, Some((TrialColumn::SigmaSim, 4.0))),
            Some(50.0)
        );
        assert_eq!(
            table.get_efficiency(5.0, None, Some((TrialColumn::ControlIndex, 1.0))),
            Some(100.0)
        );

        let seasons = ValidSeasons::new(vec![(58990.0, 59010.0)]).unwrap();
        assert_eq!(table.get_efficiency(5.0, Some(&seasons), None), Some(100.0));
        assert_eq!(
            table.get_efficiency(5.0, Some(&seasons), Some((TrialColumn::SigmaSim, 8.0))),
            None
        );

        let empty = SimDetecTable::new(5.0, 20.0);
        assert_eq!(empty.get_efficiency(5.0, None, None), None);
    }

    #[test]
    fn test_tables_collection() {
        let dir = tempfile::tempdir().unwrap();
        let tables_dir = Utf8Path::from_path(dir.path()).unwrap();

        let mut tables = SimDetecTables::new();
        for mag in [20.0, 18.0] {
            tables.setup(3.0, mag, 2);
            tables.set_trial(3.0, mag, 0, outcome(1, 9.0, 2.0, 59000.0)).unwrap();
        }
        assert!(tables.set_trial(4.0, 20.0, 0, outcome(1, 9.0, 2.0, 1.0)).is_err());
        assert_eq!(
            tables.get_efficiency(3.0, 18.0, 5.0, None, None).unwrap(),
            Some(100.0)
        );
        assert!(tables.get_efficiency(3.0, 17.0, 5.0, None, None).is_err());

        assert_eq!(tables.save_all(tables_dir).unwrap().len(), 2);
        let loaded = SimDetecTables::load_all(tables_dir, &[3.0], &[18.0, 20.0]).unwrap();
        assert_eq!(loaded.keys(), tables.keys());
        assert_eq!(loaded.get(3.0, 20.0), tables.get(3.0, 20.0));
    }
}
