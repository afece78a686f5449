use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimDetecError {
    #[error("Peak MJD required to evaluate the simulated signal")]
    MissingPeakTime,

    #[error("Peak apparent magnitude required: {0}")]
    MissingPeakAmplitude(String),

    #[error("No kernel size passed as argument or stored by a previously applied rolling sum")]
    NoActiveKernel,

    #[error("Flux must be strictly positive to be converted to a magnitude, got {0}")]
    InvalidFlux(f64),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Could not load model at {path}: {reason}")]
    InvalidTemplate { path: Utf8PathBuf, reason: String },

    #[error("No matching FOM limit {0:.2} in the efficiency table")]
    UnknownFomLimit(f64),

    #[error("Not enough measurements: {0}")]
    InsufficientData(String),

    #[error("No measurements between MJD {low} and {high}")]
    EmptyTimeWindow { low: f64, high: f64 },

    #[error("Could not load table at {0}")]
    TableNotFound(String),

    #[error("Malformed table: {0}")]
    TableFormat(String),

    #[error("Malformed light curve: {0}")]
    LightCurveFormat(String),

    #[error("Light curve {0} has not been loaded")]
    MissingLightCurve(usize),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON settings error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid column pattern: {0}")]
    RegexError(#[from] regex::Error),
}

impl PartialEq for SimDetecError {
    fn eq(&self, other: &Self) -> bool {
        use SimDetecError::*;
        match (self, other) {
            (MissingPeakTime, MissingPeakTime) => true,
            (NoActiveKernel, NoActiveKernel) => true,
            (MissingPeakAmplitude(a), MissingPeakAmplitude(b)) => a == b,
            (InvalidFlux(a), InvalidFlux(b)) => a == b || (a.is_nan() && b.is_nan()),
            (InvalidConfiguration(a), InvalidConfiguration(b)) => a == b,
            (
                InvalidTemplate { path: pa, reason: ra },
                InvalidTemplate { path: pb, reason: rb },
            ) => pa == pb && ra == rb,
            (UnknownFomLimit(a), UnknownFomLimit(b)) => a == b,
            (InsufficientData(a), InsufficientData(b)) => a == b,
            (
                EmptyTimeWindow { low: la, high: ha },
                EmptyTimeWindow { low: lb, high: hb },
            ) => la == lb && ha == hb,
            (TableNotFound(a), TableNotFound(b)) => a == b,
            (TableFormat(a), TableFormat(b)) => a == b,
            (LightCurveFormat(a), LightCurveFormat(b)) => a == b,
            (MissingLightCurve(a), MissingLightCurve(b)) => a == b,

            // Foreign errors are not comparable: equal if same variant
            (IoError(_), IoError(_)) => true,
            (CsvError(_), CsvError(_)) => true,
            (JsonError(_), JsonError(_)) => true,
            (RegexError(_), RegexError(_)) => true,

            _ => false,
        }
    }
}
