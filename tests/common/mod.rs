#![allow(dead_code)]

use std::fmt::Write;

use camino::{Utf8Path, Utf8PathBuf};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tempfile::TempDir;

use simdetec::{AveragedLightCurveDir, LightCurve, Measurement, SimDetecSupernova};

pub const FLAG: u32 = 0x800000;
pub const FIRST_MJD: f64 = 59000.0;
pub const NUM_DAYS: usize = 200;
pub const DFLUX: f64 = 10.0;

/// Daily-binned pure-noise light curve with every 17th day flagged as bad.
pub fn noise_curve(control_index: usize, seed: u64) -> LightCurve {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, DFLUX).unwrap();
    let measurements = (0..NUM_DAYS)
        .map(|day| {
            let mjd_bin = FIRST_MJD + day as f64;
            Measurement {
                mjd: mjd_bin + 0.1,
                mjd_bin,
                flux: noise.sample(&mut rng),
                dflux: DFLUX,
                mask: if day % 17 == 5 { FLAG } else { 0 },
            }
        })
        .collect();
    LightCurve::from_measurements(control_index, 1.0, measurements)
}

/// Supernova curve (index 0) and `num_controls` noise controls.
pub fn noise_supernova(tnsname: &str, num_controls: usize, seed: u64) -> SimDetecSupernova {
    let curves = (0..=num_controls)
        .map(|ix| noise_curve(ix, seed + ix as u64))
        .collect();
    SimDetecSupernova::from_curves(tnsname, 1.0, curves)
}

pub fn utf8_tempdir() -> (TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, path)
}

fn format_light_curve(lc: &LightCurve) -> String {
    let mut out = String::from("MJD MJDbin uJy duJy Mask\n");
    for i in 0..lc.len() {
        writeln!(
            out,
            "{:.5} {:.1} {:.3} {:.3} {}",
            lc.mjd[i], lc.mjd_bin[i], lc.flux[i], lc.dflux[i], lc.mask[i]
        )
        .unwrap();
    }
    out
}

/// Write the averaged light curves of a noise supernova in the on-disk layout.
pub fn write_light_curve_dir(
    data_dir: &Utf8Path,
    tnsname: &str,
    num_controls: usize,
    seed: u64,
) -> AveragedLightCurveDir {
    let provider = AveragedLightCurveDir::new(data_dir, tnsname, "o", 1.0, num_controls);
    for ix in 0..=num_controls {
        let path = provider.filename(ix);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format_light_curve(&noise_curve(ix, seed + ix as u64))).unwrap();
    }
    provider
}
