//! Simulated-detection sweep driven by a JSON settings file
//!
//! ```bash
//! # full Gaussian sweep, then efficiencies over the configured FOM limits
//! cargo run --release --bin simdetec -- -f simulation_settings.json -e
//!
//! # only inject inside the observation seasons, before a given onset
//! cargo run --release --bin simdetec -- -m --mjd0 60000.5
//!
//! # recompute efficiencies from the trial tables of a previous run
//! cargo run --release --bin simdetec -- --from-tables
//!
//! # inject an empirical template instead of Gaussians
//! cargo run --release --bin simdetec -- --template outburst.txt --template-window 10
//! ```
//!
//! Logging goes through `env_logger`; set `RUST_LOG=debug` to see every trial.
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use log::info;
use rand::{rngs::StdRng, SeedableRng};

use simdetec::{
    efficiencies_from_tables, AveragedLightCurveDir, GaussianTrialGenerator, SimDetecError,
    SimDetecLoop, SimDetecParams, SimDetecSupernova, SimulationSettings, SweepSummary,
    TemplateModel, TemplateTrialGenerator,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Injection-recovery efficiencies of forced-photometry light curves", long_about = None)]
struct Args {
    /// JSON file with the settings of the sweep
    #[arg(short = 'f', long, default_value = "simulation_settings.json")]
    config_file: Utf8PathBuf,

    /// Calculate efficiencies using the FOM limits of each kernel
    #[arg(short, long)]
    efficiencies: bool,

    /// Only simulate events with peak MJDs within the observation seasons
    #[arg(short = 'm', long)]
    obs_seasons: bool,

    /// Transient start date in MJD, overriding the settings file
    #[arg(long)]
    mjd0: Option<f64>,

    /// Seed of the random source, overriding the settings file
    #[arg(long)]
    seed: Option<u64>,

    /// Skip the sweep and recompute efficiencies from saved trial tables
    #[arg(long)]
    from_tables: bool,

    /// Two-column (MJD, magnitude) template to inject instead of Gaussians
    #[arg(long)]
    template: Option<Utf8PathBuf>,

    /// Half-width in days of the max FOM window of template trials
    #[arg(long, default_value = "10.0")]
    template_window: f64,
}

fn main() -> Result<(), SimDetecError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let settings = SimulationSettings::load(&args.config_file)?;
    let params = settings.to_params(
        args.obs_seasons,
        args.mjd0,
        args.efficiencies || args.from_tables,
    )?;

    if args.from_tables {
        let efficiencies = efficiencies_from_tables(&params, &settings.tables_dir)?;
        println!("{efficiencies}");
        return Ok(());
    }

    let provider = AveragedLightCurveDir::new(
        settings.data_dir.clone(),
        settings.sn_settings.tnsname.clone(),
        settings.sn_settings.filt.clone(),
        settings.sn_settings.mjd_bin_size,
        settings.sn_settings.num_controls,
    );
    let mut sn = SimDetecSupernova::load_all(&provider)?;

    let mut rng = match args.seed.or(settings.seed) {
        Some(seed) => {
            info!("Seeding random source with {seed}");
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_os_rng(),
    };

    let summary = match &args.template {
        Some(path) => run_template(params, path, args.template_window, &mut sn, &mut rng, &settings)?,
        None => SimDetecLoop::new(params, GaussianTrialGenerator::new())?.run(
            &mut sn,
            &mut rng,
            &settings.tables_dir,
        )?,
    };
    println!("{summary}");
    if let Some(efficiencies) = &summary.efficiencies {
        println!("{efficiencies}");
    }
    Ok(())
}

fn run_template(
    params: SimDetecParams,
    path: &Utf8Path,
    half_window: f64,
    sn: &mut SimDetecSupernova,
    rng: &mut StdRng,
    settings: &SimulationSettings,
) -> Result<SweepSummary, SimDetecError> {
    let model = TemplateModel::load(path, None)?;
    info!("Injecting template {model}");
    let generator = TemplateTrialGenerator::new(model, half_window)?;
    SimDetecLoop::new(params, generator)?.run(sn, rng, &settings.tables_dir)
}
