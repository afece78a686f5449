use crate::{
    constants::{Magnitude, MicroJansky, AB_ZERO_POINT_UJY, POGSON},
    simdetec_errors::SimDetecError,
};

/// Convert a flux in µJy to an AB apparent magnitude
///
/// Arguments
/// ---------------
/// * `flux`: the flux density in µJy
///
/// Return
/// ----------
/// * `Ok(mag)` with `mag = -2.5 log10(flux) + 23.9`
/// * `Err(SimDetecError::InvalidFlux)` if the flux is not strictly positive and finite
pub fn flux_to_mag(flux: MicroJansky) -> Result<Magnitude, SimDetecError> {
    if !(flux.is_finite() && flux > 0.0) {
        return Err(SimDetecError::InvalidFlux(flux));
    }
    Ok(POGSON * flux.log10() + AB_ZERO_POINT_UJY)
}

/// Convert an AB apparent magnitude to a flux in µJy
///
/// Arguments
/// ---------------
/// * `mag`: the apparent magnitude
///
/// Return
/// ----------
/// * the flux density `10^((mag - 23.9) / -2.5)` in µJy
pub fn mag_to_flux(mag: Magnitude) -> MicroJansky {
    10f64.powf((mag - AB_ZERO_POINT_UJY) / POGSON)
}

/// Build the peak amplitude grid of a sweep: `n` magnitudes evenly spaced from
/// `mag_min` to `mag_max` (both included) and their fluxes.
///
/// `n == 1` yields `[mag_min]`, `n == 0` yields empty vectors.
pub fn peak_grid(
    mag_min: Magnitude,
    mag_max: Magnitude,
    n: usize,
) -> (Vec<Magnitude>, Vec<MicroJansky>) {
    let mags: Vec<Magnitude> = match n {
        0 => Vec::new(),
        1 => vec![mag_min],
        _ => {
            let step = (mag_max - mag_min) / (n - 1) as f64;
            (0..n)
                .map(|i| {
                    if i == n - 1 {
                        mag_max
                    } else {
                        mag_min + step * i as f64
                    }
                })
                .collect()
        }
    };
    let fluxes = mags.iter().map(|&m| mag_to_flux(m)).collect();
    (mags, fluxes)
}
