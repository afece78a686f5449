mod common;

use rand::{rngs::StdRng, SeedableRng};

use common::{noise_supernova, utf8_tempdir, write_light_curve_dir, FLAG, NUM_DAYS};
use simdetec::{
    constants::EFFICIENCY_FILENAME, efficiencies_from_tables, EfficiencyTable,
    GaussianTrialGenerator, LightCurveProvider, SimDetecError, SimDetecLoop, SimDetecParams,
    SimDetecSupernova, SimulationSettings,
};

fn params(efficiencies: bool) -> SimDetecParams {
    SimDetecParams::builder()
        .kernel(3.0, vec![2.0, 6.0], vec![3.0, 5.0])
        .peak_mags(21.0, 17.0)
        .n_peaks(3)
        .num_iterations(25)
        .flag(FLAG)
        .mjd0(Some(59180.0))
        .compute_efficiencies(efficiencies)
        .build()
        .unwrap()
}

#[test]
fn test_efficiencies_from_saved_tables() {
    let (_guard, tables_dir) = utf8_tempdir();
    let mut sn = noise_supernova("2024abc", 3, 40);
    let sweep = SimDetecLoop::new(params(false), GaussianTrialGenerator::new()).unwrap();
    let mut rng = StdRng::seed_from_u64(17);
    let summary = sweep.run(&mut sn, &mut rng, &tables_dir).unwrap();
    assert!(summary.efficiencies.is_none());
    assert!(!tables_dir.join(EFFICIENCY_FILENAME).exists());

    let efficiencies = efficiencies_from_tables(&params(true), &tables_dir).unwrap();
    assert_eq!(efficiencies.rows().len(), 3 * 2);
    for row in efficiencies.rows() {
        for pct in &row.pct_detec {
            let pct = pct.unwrap();
            assert!((0.0..=100.0).contains(&pct));
        }
    }

    let reloaded = EfficiencyTable::load(&tables_dir, EFFICIENCY_FILENAME).unwrap();
    assert_eq!(reloaded, efficiencies);

    // lowering the threshold never lowers the recovery
    for row in reloaded.rows() {
        assert!(row.pct_detec[0].unwrap() >= row.pct_detec[1].unwrap());
    }
}

#[test]
fn test_efficiencies_need_every_table() {
    let (_guard, tables_dir) = utf8_tempdir();
    let mut sn = noise_supernova("2024abc", 2, 41);
    let sweep = SimDetecLoop::new(params(false), GaussianTrialGenerator::new()).unwrap();
    let mut rng = StdRng::seed_from_u64(4);
    sweep.run(&mut sn, &mut rng, &tables_dir).unwrap();

    let wider = SimDetecParams {
        n_peaks: 4,
        ..params(true)
    };
    assert!(matches!(
        efficiencies_from_tables(&wider, &tables_dir),
        Err(SimDetecError::TableNotFound(_))
    ));
}

#[test]
fn test_sweep_from_light_curve_dir() {
    let (_guard, root) = utf8_tempdir();
    let data_dir = root.join("data");
    let tables_dir = root.join("tables");
    let provider = write_light_curve_dir(&data_dir, "2024abc", 3, 60);
    assert_eq!(provider.num_controls(), 3);

    let mut sn = SimDetecSupernova::load_all(&provider).unwrap();
    assert_eq!(sn.num_controls(), 3);
    for (ix, curve) in sn.curves().iter().enumerate() {
        assert_eq!(curve.control_index(), ix);
        assert_eq!(curve.light_curve().len(), NUM_DAYS);
    }
    assert_eq!(sn.get(2).unwrap().light_curve().mask[5], FLAG);

    let sweep = SimDetecLoop::new(params(true), GaussianTrialGenerator::new()).unwrap();
    let mut rng = StdRng::seed_from_u64(12);
    let summary = sweep.run(&mut sn, &mut rng, &tables_dir).unwrap();
    assert_eq!(summary.tables_written.len(), 3);
    assert!(summary
        .tables_written
        .iter()
        .all(|p| p.starts_with(&tables_dir) && p.exists()));
}

#[test]
fn test_missing_control_file() {
    let (_guard, root) = utf8_tempdir();
    let provider = write_light_curve_dir(&root, "2024abc", 2, 60);
    std::fs::remove_file(provider.filename(2)).unwrap();
    assert!(matches!(
        SimDetecSupernova::load_all(&provider),
        Err(SimDetecError::IoError(_))
    ));
}

#[test]
fn test_settings_file_to_sweep() {
    let (_guard, root) = utf8_tempdir();
    let data_dir = root.join("data");
    write_light_curve_dir(&data_dir, "2024abc", 2, 80);

    let json = format!(
        r#"{{
            "data_dir": "{data_dir}",
            "tables_dir": "{root}/tables",
            "num_iterations": 10,
            "observation_seasons": [[59010, 59090]],
            "skip_control_ix": [],
            "sn_settings": {{
                "tnsname": "2024abc",
                "num_controls": 2,
                "mjd_bin_size": 1.0,
                "filt": "o",
                "badday_flag": "0x800000",
                "mjd0": 59150.0
            }},
            "sim_settings": [
                {{ "sigma_kern": 3, "sigma_sims": [2, 6], "fom_limits": [5] }}
            ],
            "n_peaks": 2,
            "seed": 3
        }}"#
    );
    let path = root.join("simulation_settings.json");
    std::fs::write(&path, json).unwrap();

    let settings = SimulationSettings::load(&path).unwrap();
    let params = settings.to_params(true, None, true).unwrap();
    assert_eq!(params.mjd0, Some(59150.0));

    let provider = simdetec::AveragedLightCurveDir::new(
        settings.data_dir.clone(),
        settings.sn_settings.tnsname.clone(),
        settings.sn_settings.filt.clone(),
        settings.sn_settings.mjd_bin_size,
        settings.sn_settings.num_controls,
    );
    let mut sn = SimDetecSupernova::load_all(&provider).unwrap();
    let sweep = SimDetecLoop::new(params, GaussianTrialGenerator::new()).unwrap();
    let mut rng = StdRng::seed_from_u64(settings.seed.unwrap());
    let summary = sweep.run(&mut sn, &mut rng, &settings.tables_dir).unwrap();

    assert_eq!(summary.trials_run, 20);
    let efficiencies = summary.efficiencies.unwrap();
    assert_eq!(efficiencies.fom_limits(), &[5.0]);
    assert_eq!(efficiencies.rows().len(), 4);
}
