use std::path::PathBuf;
use thiserror::Error;

use super::worker_status::WorkerStatus;

#[derive(Debug, Error)]
pub enum IfBeamError {
    #[error("IFBeam request for variable {var} failed with HTTP status {status}")]
    BadStatus { var: String, status: u16 },
    #[error("IFBeam request for variable {var} failed due to transport error: {message}")]
    Transport { var: String, message: String },
    #[error("IFBeam response for variable {0} could not be read: {1}")]
    BadBody(String, std::io::Error),
    #[error("IFBeam source has no data for variable {0}")]
    MissingVariable(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config is invalid: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum HistogramError {
    #[error("Histogram {0} requires at least one bin")]
    NoBins(String),
    #[error("Histogram {name} has an empty range [{min}, {max})")]
    BadRange { name: String, min: f64, max: f64 },
}

#[derive(Debug, Error)]
pub enum TimberError {
    #[error("TIMBER series failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Could not detect the unit of TIMBER timestamps with maximum {0}")]
    UnknownUnit(f64),
    #[error("TIMBER series {0} contains no samples")]
    EmptySeries(String),
    #[error("TIMBER timestamp {0} is out of range for a date")]
    BadTimestamp(i128),
    #[error("TIMBER dates can not use unknown time zone {0}")]
    UnknownTimezone(String),
    #[error("TIMBER failed to format a date: {0}")]
    BadFormat(#[from] time::error::Format),
}

#[derive(Debug, Error)]
pub enum BeamEventError {
    #[error("Beam event dump failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Could not open beam event dump because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Beam event dump line {line} is malformed: {reason}")]
    BadLine { line: usize, reason: String },
    #[error("Beam event summary failed due to histogram error: {0}")]
    HistogramError(#[from] HistogramError),
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Output failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Output failed to convert to yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[cfg(feature = "hdf5")]
    #[error("Output failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[cfg(feature = "hdf5")]
    #[error("Output could not store string {0:?} in HDF5")]
    BadString(String),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to IFBeam error: {0}")]
    IfBeamError(#[from] IfBeamError),
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to Histogram error: {0}")]
    HistogramError(#[from] HistogramError),
    #[error("Processor failed due to Output error: {0}")]
    OutputError(#[from] OutputError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
}
