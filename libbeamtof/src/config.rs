use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::constants::*;
use super::error::ConfigError;

/// A named time range to analyse. t0 and t1 are handed verbatim to IFBeam, which
/// accepts both `MM/DD/YYYY hh:mm:ss` and ISO 8601 strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisWindow {
    pub label: String,
    pub t0: String,
    pub t1: String,
}

impl AnalysisWindow {
    pub fn new(label: &str, t0: &str, t1: &str) -> Self {
        Self {
            label: label.to_string(),
            t0: t0.to_string(),
            t1: t1.to_string(),
        }
    }

    /// A file system safe version of the label
    pub fn file_tag(&self) -> String {
        let tag: String = self
            .label
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if tag.is_empty() {
            String::from("window")
        } else {
            tag
        }
    }
}

/// Binning for a histogram. If the range is None, the range of the data is used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistogramSpec {
    pub bins: usize,
    pub range: Option<(f64, f64)>,
}

impl HistogramSpec {
    pub fn new(bins: usize, range: Option<(f64, f64)>) -> Self {
        Self { bins, range }
    }

    /// Binning given as `n_edges` evenly spaced edges from min to max
    pub fn from_edges(min: f64, max: f64, n_edges: usize) -> Self {
        Self::new(n_edges.saturating_sub(1), Some((min, max)))
    }
}

/// Coincidence windows used by the TOF matcher (all in ns, the offset in coarse ticks)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TofSettings {
    pub downstream_to_trigger_ns: f64,
    pub upstream_to_downstream_ns: f64,
    pub trigger_offset: f64,
    pub sorted_early_exit: bool,
}

impl Default for TofSettings {
    fn default() -> Self {
        Self {
            downstream_to_trigger_ns: DEFAULT_DOWNSTREAM_TO_TRIGGER_NS,
            upstream_to_downstream_ns: DEFAULT_UPSTREAM_TO_DOWNSTREAM_NS,
            trigger_offset: 0.0,
            sorted_early_exit: false,
        }
    }
}

/// The histograms produced for every analysis window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistogramSettings {
    pub tof: HistogramSpec,
    pub cherenkov_counts: HistogramSpec,
    pub cherenkov_pressure: HistogramSpec,
    pub momentum: HistogramSpec,
    pub tof_vs_momentum_momentum: HistogramSpec,
    pub tof_vs_momentum_tof: HistogramSpec,
}

impl Default for HistogramSettings {
    fn default() -> Self {
        Self {
            tof: HistogramSpec::new(100, Some((60.0, 90.0))),
            cherenkov_counts: HistogramSpec::new(50, None),
            cherenkov_pressure: HistogramSpec::new(50, None),
            momentum: HistogramSpec::from_edges(0.05, 12.0, 100),
            tof_vs_momentum_momentum: HistogramSpec::from_edges(0.05, 12.0, 24),
            tof_vs_momentum_tof: HistogramSpec::new(300, Some((60.0, 90.0))),
        }
    }
}

/// Structure representing the application configuration.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ifbeam_url: String,
    pub event: String,
    pub request_timeout_secs: u64,
    pub output_path: PathBuf,
    pub windows: Vec<AnalysisWindow>,
    pub tof: TofSettings,
    pub fetch_cherenkov: bool,
    pub fetch_xcet: bool,
    pub fetch_momentum: bool,
    pub cherenkov_devices: Vec<String>,
    pub xcet_window_ns: f64,
    pub histograms: HistogramSettings,
    pub write_hdf5: bool,
    pub n_threads: i32,
}

impl Default for Config {
    /// Generate a new Config object. The output path and windows are placeholders
    fn default() -> Self {
        Self {
            ifbeam_url: String::from(IFBEAM_DEFAULT_URL),
            event: String::from(IFBEAM_DEFAULT_EVENT),
            request_timeout_secs: 60,
            output_path: PathBuf::from("None"),
            windows: vec![AnalysisWindow::new(
                "Run 39132",
                "08/26/2025 21:15:00",
                "08/27/2025 09:46:00",
            )],
            tof: TofSettings::default(),
            fetch_cherenkov: true,
            fetch_xcet: true,
            fetch_momentum: true,
            cherenkov_devices: vec![
                String::from(CHERENKOV_HIGH_PRESSURE),
                String::from(CHERENKOV_LOW_PRESSURE),
            ],
            xcet_window_ns: DEFAULT_XCET_WINDOW_NS,
            histograms: HistogramSettings::default(),
            write_hdf5: false,
            n_threads: 1,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// Check the settings which would otherwise fail deep inside the processing
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.is_n_threads_valid() {
            return Err(ConfigError::Invalid(format!(
                "n_threads must be at least 1, found {}",
                self.n_threads
            )));
        }
        if self.windows.is_empty() {
            return Err(ConfigError::Invalid(String::from(
                "at least one analysis window is required",
            )));
        }
        if self.tof.downstream_to_trigger_ns <= 0.0 || self.tof.upstream_to_downstream_ns <= 0.0 {
            return Err(ConfigError::Invalid(String::from(
                "coincidence windows must be positive",
            )));
        }
        if self.fetch_cherenkov || self.fetch_xcet {
            self.cherenkov_pair()?;
        }
        Ok(())
    }

    /// The high and low pressure Cherenkov devices. Both the counter and the XCET
    /// readouts need exactly two.
    pub fn cherenkov_pair(&self) -> Result<(&str, &str), ConfigError> {
        match self.cherenkov_devices.as_slice() {
            [high, low] => Ok((high.as_str(), low.as_str())),
            devices => Err(ConfigError::Invalid(format!(
                "exactly two Cherenkov devices are expected, found {}",
                devices.len()
            ))),
        }
    }

    /// Get the directory for the outputs of one window, creating it if needed
    pub fn get_window_directory(&self, window: &AnalysisWindow) -> Result<PathBuf, ConfigError> {
        if !self.output_path.exists() {
            return Err(ConfigError::BadFilePath(self.output_path.clone()));
        }
        let window_dir = self.output_path.join(window.file_tag());
        std::fs::create_dir_all(&window_dir)?;
        Ok(window_dir)
    }

    /// Get the path to a file in the top level output directory
    pub fn get_output_file(&self, name: &str) -> Result<PathBuf, ConfigError> {
        if self.output_path.exists() {
            Ok(self.output_path.join(name))
        } else {
            Err(ConfigError::BadFilePath(self.output_path.clone()))
        }
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tof.downstream_to_trigger_ns, 60.0);
        assert_eq!(config.tof.upstream_to_downstream_ns, 500.0);
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = Config::default();
        let yaml_str = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml_str).unwrap();
        assert_eq!(parsed.windows, config.windows);
        assert_eq!(parsed.tof, config.tof);
        assert_eq!(parsed.histograms, config.histograms);
    }

    #[test]
    fn test_invalid_threads() {
        let config = Config {
            n_threads: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_xcet_requires_two_devices() {
        let config = Config {
            fetch_cherenkov: false,
            fetch_xcet: true,
            cherenkov_devices: vec![],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = Config {
            fetch_cherenkov: false,
            fetch_xcet: false,
            cherenkov_devices: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.cherenkov_pair().is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = Config::read_config_file(Path::new("/definitely/not/here.yml"));
        assert!(matches!(result, Err(ConfigError::BadFilePath(_))));
    }

    #[test]
    fn test_file_tag() {
        let window = AnalysisWindow::new("Run 39132 (0.3 GeV, Cu target)", "a", "b");
        assert_eq!(window.file_tag(), "Run_39132__0.3_GeV__Cu_target_");
        let empty = AnalysisWindow::new("  ", "a", "b");
        assert_eq!(empty.file_tag(), "window");
    }
}
