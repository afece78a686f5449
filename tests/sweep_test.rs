mod common;

use std::sync::Arc;

use rand::{rngs::StdRng, Rng, SeedableRng};

use common::{noise_supernova, utf8_tempdir, FLAG};
use simdetec::{
    constants::EFFICIENCY_FILENAME, EfficiencyTable, Gaussian, GaussianTrialGenerator,
    KernelSettings, SignalModel, SimDetecError, SimDetecLoop, SimDetecParams, SimDetecTable,
    TemplateModel, TemplateTrialGenerator, TrialGenerator,
};

fn gaussian_params() -> SimDetecParams {
    SimDetecParams::builder()
        .kernel(3.0, vec![2.0, 4.0], vec![5.0, 8.0])
        .kernel(5.0, vec![4.0], vec![5.0])
        .peak_mags(20.0, 16.0)
        .n_peaks(3)
        .num_iterations(40)
        .flag(FLAG)
        .mjd0(Some(59150.0))
        .skip_control_ix(vec![4])
        .compute_efficiencies(true)
        .build()
        .unwrap()
}

#[test]
fn test_gaussian_sweep_end_to_end() {
    let (_guard, tables_dir) = utf8_tempdir();
    let mut sn = noise_supernova("2023ixf", 4, 100);
    let sweep = SimDetecLoop::new(gaussian_params(), GaussianTrialGenerator::new()).unwrap();

    let mut rng = StdRng::seed_from_u64(2024);
    let summary = sweep.run(&mut sn, &mut rng, &tables_dir).unwrap();

    assert_eq!(summary.tables_written.len(), 6);
    assert_eq!(summary.trials_run, 240);
    assert_eq!(summary.failed_trials, 0);
    assert!(!summary.interrupted);

    for &kern in &[3.0, 5.0] {
        for &mag in &[20.0, 18.0, 16.0] {
            let table = SimDetecTable::load(&tables_dir, kern, mag).unwrap();
            assert_eq!(table.num_completed(), 40);
            for row in table.rows() {
                let control = row.control_index.unwrap();
                assert!((1..=3).contains(&control), "control {control} was skipped");
                assert!(row.peak_mjd.unwrap() <= 59150.0);
            }
        }
    }

    // a 16 mag signal sits ~140 sigma above 10 uJy noise
    let efficiencies = summary.efficiencies.unwrap();
    assert_eq!(efficiencies.get(3.0, 16.0, Some(2.0), 5.0).unwrap(), Some(100.0));
    assert_eq!(efficiencies.get(3.0, 16.0, Some(4.0), 8.0).unwrap(), Some(100.0));
    assert_eq!(efficiencies.get(5.0, 16.0, Some(4.0), 5.0).unwrap(), Some(100.0));
    // kernel 5 has no limit 8 configured
    assert_eq!(efficiencies.get(5.0, 16.0, Some(4.0), 8.0).unwrap(), None);

    let saved = EfficiencyTable::load(&tables_dir, EFFICIENCY_FILENAME).unwrap();
    assert_eq!(saved.rows().len(), efficiencies.rows().len());
}

#[test]
fn test_sweep_reproducible_across_thread_counts() {
    let sweep = SimDetecLoop::new(gaussian_params(), GaussianTrialGenerator::new()).unwrap();

    let run_with_threads = |threads: usize| {
        let (guard, tables_dir) = utf8_tempdir();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap();
        pool.install(|| {
            let mut sn = noise_supernova("2023ixf", 4, 7);
            let mut rng = StdRng::seed_from_u64(99);
            sweep.run(&mut sn, &mut rng, &tables_dir).unwrap();
        });
        let table = SimDetecTable::load(&tables_dir, 3.0, 18.0).unwrap();
        let content = std::fs::read_to_string(table.filename(&tables_dir)).unwrap();
        drop(guard);
        content
    };

    assert_eq!(run_with_threads(1), run_with_threads(4));
}

#[test]
fn test_sweep_restricted_to_seasons() {
    let (_guard, tables_dir) = utf8_tempdir();
    let params = SimDetecParams::builder()
        .kernel(3.0, vec![2.0], vec![5.0])
        .peak_mags(19.0, 17.0)
        .n_peaks(2)
        .num_iterations(50)
        .flag(FLAG)
        .mjd0(Some(59150.0))
        .observation_seasons(Some(vec![(59020.0, 59060.0), (59100.0, 59140.0)]))
        .build()
        .unwrap();
    let mut sn = noise_supernova("2023ixf", 3, 11);
    let sweep = SimDetecLoop::new(params, GaussianTrialGenerator::new()).unwrap();
    let mut rng = StdRng::seed_from_u64(5);
    sweep.run(&mut sn, &mut rng, &tables_dir).unwrap();

    let table = SimDetecTable::load(&tables_dir, 3.0, 19.0).unwrap();
    for row in table.rows() {
        let peak = row.peak_mjd.unwrap();
        assert!(
            (59020.0..=59060.0).contains(&peak) || (59100.0..=59140.0).contains(&peak),
            "peak {peak} outside the seasons"
        );
    }
}

#[test]
fn test_template_sweep() {
    let (_guard, tables_dir) = utf8_tempdir();
    let content: String = (-20..=20)
        .map(|t| format!("{} {}\n", t as f64, 18.0 + 0.01 * (t * t) as f64))
        .collect();
    let template = TemplateModel::from_table("outburst.txt", &content, None).unwrap();

    let params = SimDetecParams::builder()
        .kernel(3.0, vec![], vec![5.0])
        .peak_mags(20.0, 16.0)
        .n_peaks(3)
        .num_iterations(30)
        .flag(FLAG)
        .mjd0(Some(59150.0))
        .compute_efficiencies(true)
        .build()
        .unwrap();

    // timescales make no sense for a template
    let with_sims = SimDetecParams {
        kernels: vec![KernelSettings::new(3.0, vec![2.0], vec![5.0])],
        ..params.clone()
    };
    assert!(matches!(
        SimDetecLoop::new(
            with_sims,
            TemplateTrialGenerator::new(template.clone(), 5.0).unwrap()
        ),
        Err(SimDetecError::InvalidConfiguration(_))
    ));

    let generator = TemplateTrialGenerator::new(template, 5.0).unwrap();
    let sweep = SimDetecLoop::new(params, generator).unwrap();
    let mut sn = noise_supernova("2023ixf", 3, 21);
    let mut rng = StdRng::seed_from_u64(8);
    let summary = sweep.run(&mut sn, &mut rng, &tables_dir).unwrap();
    assert_eq!(summary.trials_run, 90);

    let table = SimDetecTable::load(&tables_dir, 3.0, 16.0).unwrap();
    for row in table.rows() {
        assert_eq!(row.sigma_sim, None);
        let window = (row.max_fom_mjd.unwrap() - row.peak_mjd.unwrap()).abs();
        assert!(window <= 5.0);
    }

    let efficiencies = summary.efficiencies.unwrap();
    assert_eq!(efficiencies.get(3.0, 16.0, None, 5.0).unwrap(), Some(100.0));
}

/// Searches a window that never overlaps the light curve.
struct OffsetWindowGenerator;

impl TrialGenerator for OffsetWindowGenerator {
    fn generate_random_simulation<R: Rng + ?Sized>(
        &self,
        kernel: &KernelSettings,
        peak_appmag: f64,
        rng: &mut R,
    ) -> Result<Arc<dyn SignalModel>, SimDetecError> {
        let sigma = kernel.sigma_sims[rng.random_range(0..kernel.sigma_sims.len())];
        let model: Arc<dyn SignalModel> = Arc::new(Gaussian::new(sigma, peak_appmag)?);
        Ok(model)
    }

    fn max_fom_window(&self, _model: &dyn SignalModel, peak_mjd: f64) -> (f64, f64) {
        (peak_mjd + 1000.0, peak_mjd + 2000.0)
    }
}

#[test]
fn test_failed_trials_are_sentinel_rows() {
    let (_guard, tables_dir) = utf8_tempdir();
    let params = SimDetecParams::builder()
        .kernel(3.0, vec![2.0], vec![5.0])
        .peak_mags(18.0, 17.0)
        .n_peaks(2)
        .num_iterations(10)
        .flag(FLAG)
        .mjd0(Some(59150.0))
        .compute_efficiencies(true)
        .build()
        .unwrap();
    let mut sn = noise_supernova("2023ixf", 2, 3);
    let sweep = SimDetecLoop::new(params, OffsetWindowGenerator).unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    let summary = sweep.run(&mut sn, &mut rng, &tables_dir).unwrap();

    assert_eq!(summary.trials_run, 20);
    assert_eq!(summary.failed_trials, 20);

    let table = SimDetecTable::load(&tables_dir, 3.0, 18.0).unwrap();
    assert_eq!(table.len(), 10);
    for row in table.rows() {
        assert!(row.control_index.is_some());
        assert!(row.peak_mjd.is_some());
        assert_eq!(row.sigma_sim, Some(2.0));
        assert_eq!(row.max_fom, None);
        assert_eq!(row.max_fom_mjd, None);
    }
}
