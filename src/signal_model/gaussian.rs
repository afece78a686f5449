use std::fmt;

use super::{interpolate::linear_interpolate, ModelParameters, SignalModel};
use crate::{
    constants::{Days, Magnitude, MicroJansky, GAUSSIAN_HALF_SPAN, GAUSSIAN_STEP, MJD},
    conversion::mag_to_flux,
    simdetec_errors::SimDetecError,
};

/// Gaussian bump sampled on a fixed grid around its peak.
///
/// The grid covers `[-100, 100)` days with a 0.01 day step. Samples before the peak follow a
/// Gaussian of width `rise_sigma`, samples from the peak on one of width `decline_sigma`,
/// both of height `mag_to_flux(peak_appmag)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Gaussian {
    pub rise_sigma: Days,
    pub decline_sigma: Days,
    pub peak_appmag: Magnitude,
    offsets: Vec<Days>,
    flux: Vec<MicroJansky>,
}

impl Gaussian {
    /// Symmetric Gaussian of width `sigma` days.
    pub fn new(sigma: Days, peak_appmag: Magnitude) -> Result<Self, SimDetecError> {
        Self::asymmetric(sigma, sigma, peak_appmag)
    }

    /// Gaussian with distinct rise and decline widths
    ///
    /// Arguments
    /// -----------------
    /// * `rise_sigma`: width in days of the rising half
    /// * `decline_sigma`: width in days of the declining half
    /// * `peak_appmag`: apparent magnitude at the peak
    ///
    /// Return
    /// ----------
    /// * `Err(SimDetecError::InvalidConfiguration)` if a width is not strictly positive or the
    ///   magnitude is not finite
    pub fn asymmetric(
        rise_sigma: Days,
        decline_sigma: Days,
        peak_appmag: Magnitude,
    ) -> Result<Self, SimDetecError> {
        if !(rise_sigma > 0.0 && decline_sigma > 0.0) {
            return Err(SimDetecError::InvalidConfiguration(format!(
                "Gaussian widths must be > 0, got rise={rise_sigma} decline={decline_sigma}"
            )));
        }
        if !peak_appmag.is_finite() {
            return Err(SimDetecError::InvalidConfiguration(format!(
                "Gaussian peak magnitude must be finite, got {peak_appmag}"
            )));
        }

        let amplitude = mag_to_flux(peak_appmag);
        let n_half = (GAUSSIAN_HALF_SPAN / GAUSSIAN_STEP).round() as i64;
        let (offsets, flux) = (-n_half..n_half)
            .map(|k| {
                let x = k as f64 * GAUSSIAN_STEP;
                let sigma = if k < 0 { rise_sigma } else { decline_sigma };
                (x, amplitude * (-0.5 * (x / sigma).powi(2)).exp())
            })
            .unzip();

        Ok(Gaussian {
            rise_sigma,
            decline_sigma,
            peak_appmag,
            offsets,
            flux,
        })
    }

    pub fn peak_flux(&self) -> MicroJansky {
        mag_to_flux(self.peak_appmag)
    }
}

impl SignalModel for Gaussian {
    fn name(&self) -> &str {
        "Gaussian"
    }

    /// The `peak_appmag` override is ignored: the amplitude is fixed at construction.
    fn evaluate(
        &self,
        mjds: &[MJD],
        peak_mjd: Option<MJD>,
        _peak_appmag: Option<Magnitude>,
    ) -> Result<Vec<MicroJansky>, SimDetecError> {
        let peak_mjd = peak_mjd.ok_or(SimDetecError::MissingPeakTime)?;
        let dt: Vec<Days> = mjds.iter().map(|t| t - peak_mjd).collect();
        Ok(linear_interpolate(&self.offsets, &self.flux, &dt))
    }

    fn row_parameters(&self) -> ModelParameters {
        ModelParameters {
            sigma_sim: Some(self.decline_sigma),
        }
    }

    fn peak_appmag(&self) -> Option<Magnitude> {
        Some(self.peak_appmag)
    }
}

impl fmt::Display for Gaussian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Gaussian simulation with peak app mag {:.2} and sigma_sim {}",
            self.peak_appmag, self.decline_sigma
        )?;
        if self.rise_sigma != self.decline_sigma {
            write!(f, " (rise sigma {})", self.rise_sigma)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod gaussian_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_peak_and_symmetry() {
        let g = Gaussian::new(2.0, 19.0).unwrap();
        let peak = 59000.0;
        let flux = g
            .evaluate(&[peak, peak - 1.5, peak + 1.5, peak - 37.25, peak + 37.25], Some(peak), None)
            .unwrap();

        assert_relative_eq!(flux[0], mag_to_flux(19.0), max_relative = 1e-12);
        assert_relative_eq!(flux[1], flux[2], max_relative = 1e-9);
        assert_relative_eq!(flux[3], flux[4], max_relative = 1e-9);
        assert_relative_eq!(
            flux[1],
            mag_to_flux(19.0) * (-0.5f64 * 0.75 * 0.75).exp(),
            max_relative = 1e-6
        );
    }

    #[test]
    fn test_zero_outside_support() {
        let g = Gaussian::new(50.0, 17.0).unwrap();
        let flux = g
            .evaluate(&[59000.0 - 100.5, 59000.0 + 100.0, 59000.0 + 250.0], Some(59000.0), None)
            .unwrap();
        assert_eq!(flux, vec![0.0, 0.0, 0.0]);

        // the last grid sample sits at +99.99 days
        let inside = g.evaluate(&[59000.0 + 99.9], Some(59000.0), None).unwrap();
        assert!(inside[0] > 0.0);
    }

    #[test]
    fn test_asymmetric() {
        let g = Gaussian::asymmetric(1.0, 5.0, 18.0).unwrap();
        let flux = g.evaluate(&[-3.0, 3.0], Some(0.0), None).unwrap();
        assert!(flux[1] > flux[0]);
        assert_eq!(g.timescale(), Some(5.0));
    }

    #[test]
    fn test_missing_peak_time() {
        let g = Gaussian::new(2.0, 19.0).unwrap();
        assert_eq!(
            g.evaluate(&[1.0], None, None),
            Err(SimDetecError::MissingPeakTime)
        );
    }

    #[test]
    fn test_invalid_width() {
        assert!(matches!(
            Gaussian::new(0.0, 19.0),
            Err(SimDetecError::InvalidConfiguration(_))
        ));
        assert!(Gaussian::asymmetric(1.0, -1.0, 19.0).is_err());
        assert!(Gaussian::new(1.0, f64::NAN).is_err());
    }
}
