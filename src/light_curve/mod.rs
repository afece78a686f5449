//! # Averaged light curves
//!
//! Column store for the forced-photometry light curves consumed by the simulation engine:
//! one supernova light curve (control index 0) and a ring of control light curves
//! (indices 1..=N) measured at nearby sky positions.
//!
//! ## Data model
//! -----------------
//! A [`LightCurve`] holds parallel, time-ordered columns:
//!
//! ```text
//! mjd      MJD of the (averaged) measurement
//! mjd_bin  MJD of the averaging bin, used to pick injection times and report maxima
//! flux     flux in µJy
//! dflux    flux uncertainty in µJy
//! mask     quality bitmask (0 = fully good)
//! ```
//!
//! Derived columns (signal-to-noise ratio, rolling sums, injected flux) are **not** stored
//! here; they are computed into separate values by [`crate::rolling_sum`] and
//! [`crate::injection`] so they can never go stale.
//!
//! ## Usable measurements
//! -----------------
//! A measurement is usable for a quality flag when `(mask & flag) == 0` and its flux and
//! uncertainty are finite with a strictly positive uncertainty. Empty averaging bins are
//! stored with NaN flux and are therefore never usable.
pub mod reader;

use crate::{
    constants::{Days, MaskBits, MicroJansky, MJD},
    simdetec_errors::SimDetecError,
};

/// A single row of a light curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub mjd: MJD,
    pub mjd_bin: MJD,
    pub flux: MicroJansky,
    pub dflux: MicroJansky,
    pub mask: MaskBits,
}

/// Time-ordered light curve stored column-wise.
#[derive(Debug, Clone, PartialEq)]
pub struct LightCurve {
    /// 0 for the supernova, 1..=N for the control light curves
    pub control_index: usize,
    /// Averaging bin size in days
    pub mjd_bin_size: Days,
    pub mjd: Vec<MJD>,
    pub mjd_bin: Vec<MJD>,
    pub flux: Vec<MicroJansky>,
    pub dflux: Vec<MicroJansky>,
    pub mask: Vec<MaskBits>,
}

impl LightCurve {
    /// Build a light curve from its rows; rows are sorted by MJD.
    pub fn from_measurements(
        control_index: usize,
        mjd_bin_size: Days,
        mut rows: Vec<Measurement>,
    ) -> Self {
        rows.sort_by(|a, b| a.mjd.total_cmp(&b.mjd));
        LightCurve {
            control_index,
            mjd_bin_size,
            mjd: rows.iter().map(|r| r.mjd).collect(),
            mjd_bin: rows.iter().map(|r| r.mjd_bin).collect(),
            flux: rows.iter().map(|r| r.flux).collect(),
            dflux: rows.iter().map(|r| r.dflux).collect(),
            mask: rows.iter().map(|r| r.mask).collect(),
        }
    }

    /// Build a light curve from parallel columns
    ///
    /// Arguments
    /// -----------------
    /// * `control_index`: 0 for the supernova, otherwise the control index
    /// * `mjd_bin_size`: averaging bin size in days
    /// * `mjd`, `flux`, `dflux`, `mask`: time-ordered columns of equal length
    ///
    /// The bin MJD column is set equal to `mjd`.
    ///
    /// Return
    /// ----------
    /// * `Err(SimDetecError::LightCurveFormat)` if the columns differ in length
    pub fn from_columns(
        control_index: usize,
        mjd_bin_size: Days,
        mjd: Vec<MJD>,
        flux: Vec<MicroJansky>,
        dflux: Vec<MicroJansky>,
        mask: Vec<MaskBits>,
    ) -> Result<Self, SimDetecError> {
        let n = mjd.len();
        if flux.len() != n || dflux.len() != n || mask.len() != n {
            return Err(SimDetecError::LightCurveFormat(format!(
                "column lengths differ for light curve {control_index}: mjd={n}, uJy={}, duJy={}, Mask={}",
                flux.len(),
                dflux.len(),
                mask.len()
            )));
        }
        Ok(LightCurve {
            control_index,
            mjd_bin_size,
            mjd_bin: mjd.clone(),
            mjd,
            flux,
            dflux,
            mask,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mjd.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mjd.is_empty()
    }

    pub fn measurement(&self, index: usize) -> Option<Measurement> {
        (index < self.len()).then(|| Measurement {
            mjd: self.mjd[index],
            mjd_bin: self.mjd_bin[index],
            flux: self.flux[index],
            dflux: self.dflux[index],
            mask: self.mask[index],
        })
    }

    /// Is the measurement at `index` usable for the given quality flag?
    #[inline]
    pub fn is_usable(&self, index: usize, flag: MaskBits) -> bool {
        self.mask[index] & flag == 0
            && self.flux[index].is_finite()
            && self.dflux[index].is_finite()
            && self.dflux[index] > 0.0
    }

    /// Indices of the measurements usable for the given quality flag.
    pub fn unmasked_indices(&self, flag: MaskBits) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.is_usable(i, flag)).collect()
    }

    /// Indices whose bin MJD lies in `[low, high]`.
    pub fn indices_in_range(&self, low: MJD, high: MJD) -> Vec<usize> {
        self.mjd_bin
            .iter()
            .enumerate()
            .filter(|(_, &t)| t >= low && t <= high)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Observation seasons: inclusive `[start, end]` MJD ranges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidSeasons(Vec<(MJD, MJD)>);

impl ValidSeasons {
    /// Build the season list, rejecting ranges with `start > end`.
    pub fn new(ranges: Vec<(MJD, MJD)>) -> Result<Self, SimDetecError> {
        if let Some((start, end)) = ranges.iter().find(|(s, e)| !(s <= e)) {
            return Err(SimDetecError::InvalidConfiguration(format!(
                "observation season [{start}, {end}] ends before it starts"
            )));
        }
        Ok(ValidSeasons(ranges))
    }

    pub fn contains(&self, mjd: MJD) -> bool {
        self.0.iter().any(|&(start, end)| mjd >= start && mjd <= end)
    }

    pub fn ranges(&self) -> &[(MJD, MJD)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Measurements eligible as injection times.
///
/// Arguments
/// -----------------
/// * `lc`: the light curve
/// * `mjd0`: transient onset; only measurements with `mjd <= mjd0` are kept (all if `None`)
/// * `seasons`: if given, the bin MJD must also fall inside one of the seasons
///
/// Return
/// ----------
/// * The eligible indices, in time order
pub fn eligible_indices(
    lc: &LightCurve,
    mjd0: Option<MJD>,
    seasons: Option<&ValidSeasons>,
) -> Vec<usize> {
    (0..lc.len())
        .filter(|&i| mjd0.is_none_or(|onset| lc.mjd[i] <= onset))
        .filter(|&i| seasons.is_none_or(|s| s.contains(lc.mjd_bin[i])))
        .collect()
}

#[cfg(test)]
mod light_curve_test {
    use super::*;

    fn toy_curve() -> LightCurve {
        LightCurve::from_columns(
            3,
            1.0,
            vec![58990.0, 58991.0, 58992.0, 58993.0, 58994.0],
            vec![10.0, f64::NAN, -4.0, 8.0, 2.0],
            vec![2.0, 2.0, 2.0, 0.0, 2.0],
            vec![0, 0, 0x800000, 0, 0x1],
        )
        .unwrap()
    }

    #[test]
    fn test_unmasked_indices() {
        let lc = toy_curve();
        // NaN flux, zero uncertainty and flagged rows are excluded
        assert_eq!(lc.unmasked_indices(0x800000), vec![0, 4]);
        assert_eq!(lc.unmasked_indices(0x800001), vec![0]);
        assert_eq!(lc.unmasked_indices(0), vec![0, 2, 4]);
    }

    #[test]
    fn test_column_lengths() {
        let err = LightCurve::from_columns(1, 1.0, vec![1.0, 2.0], vec![1.0], vec![1.0], vec![0]);
        assert!(matches!(err, Err(SimDetecError::LightCurveFormat(_))));
    }

    #[test]
    fn test_sorted_rows() {
        let rows = vec![
            Measurement {
                mjd: 2.0,
                mjd_bin: 2.0,
                flux: 1.0,
                dflux: 1.0,
                mask: 0,
            },
            Measurement {
                mjd: 1.0,
                mjd_bin: 1.0,
                flux: 5.0,
                dflux: 1.0,
                mask: 0,
            },
        ];
        let lc = LightCurve::from_measurements(0, 1.0, rows);
        assert_eq!(lc.mjd, vec![1.0, 2.0]);
        assert_eq!(lc.flux, vec![5.0, 1.0]);
        assert_eq!(lc.measurement(1).unwrap().flux, 1.0);
        assert!(lc.measurement(2).is_none());
    }

    #[test]
    fn test_eligible_indices() {
        let lc = toy_curve();
        assert_eq!(eligible_indices(&lc, None, None), vec![0, 1, 2, 3, 4]);
        assert_eq!(eligible_indices(&lc, Some(58992.0), None), vec![0, 1, 2]);

        let seasons = ValidSeasons::new(vec![(58991.0, 58991.5), (58993.0, 59000.0)]).unwrap();
        assert_eq!(eligible_indices(&lc, None, Some(&seasons)), vec![1, 3, 4]);
        assert_eq!(
            eligible_indices(&lc, Some(58993.0), Some(&seasons)),
            vec![1, 3]
        );
        assert!(ValidSeasons::new(vec![(2.0, 1.0)]).is_err());
    }

    #[test]
    fn test_indices_in_range() {
        let lc = toy_curve();
        assert_eq!(lc.indices_in_range(58991.0, 58993.0), vec![1, 2, 3]);
        assert!(lc.indices_in_range(59100.0, 59200.0).is_empty());
    }
}
