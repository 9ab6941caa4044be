use serde::Serialize;
use std::path::PathBuf;
use std::sync::mpsc::Sender;

use super::beam_info::{build_beam_infos, BeamInfo};
use super::config::{AnalysisWindow, Config, HistogramSettings, HistogramSpec};
use super::error::{HistogramError, ProcessorError};
#[cfg(feature = "hdf5")]
use super::hdf_writer::HDFWriter;
use super::histogram::{Histogram1D, Histogram2D};
use super::ifbeam::{BeamDataSource, IfBeamClient};
use super::output::{
    write_beam_infos, write_histogram, write_histogram_2d, write_histogram_overlay, write_yaml,
    HistogramSummary,
};
use super::worker_status::{Stage, WorkerStatus};

const BEAM_INFO_FILE: &str = "beam_info.csv";
const SUMMARY_FILE: &str = "summary.yml";
const OVERLAY_FILE: &str = "tof_all_windows.csv";
const RUN_SUMMARY_FILE: &str = "run_summary.yml";
#[cfg(feature = "hdf5")]
const HDF_FILE: &str = "histograms.h5";

/// The histograms filled for every analysis window
#[derive(Debug, Clone)]
pub struct WindowHistograms {
    pub tof: Histogram1D,
    pub ckov1_counts: Histogram1D,
    pub ckov2_counts: Histogram1D,
    pub ckov1_pressure: Histogram1D,
    pub ckov2_pressure: Histogram1D,
    pub momentum_ref: Histogram1D,
    pub momentum_meas: Histogram1D,
    pub momentum_diff: Histogram1D,
    pub tof_vs_momentum: Histogram2D,
}

impl WindowHistograms {
    pub fn build(
        label: &str,
        infos: &[BeamInfo],
        settings: &HistogramSettings,
    ) -> Result<Self, HistogramError> {
        let column = |f: fn(&BeamInfo) -> f64| -> Vec<f64> { infos.iter().map(f).collect() };
        let diff_spec = HistogramSpec::new(settings.momentum.bins, None);
        let tof_vs_momentum: Vec<(f64, f64)> =
            infos.iter().map(|i| (i.momentum_meas, i.tof_ns)).collect();

        Ok(Self {
            tof: Histogram1D::from_spec("tof", &settings.tof, &column(|i| i.tof_ns))?
                .with_title(&format!("TOF {label};TOF [ns];Count")),
            ckov1_counts: Histogram1D::from_spec(
                "ckov1_counts",
                &settings.cherenkov_counts,
                &column(|i| i.ckov1_trigger_counts as f64),
            )?
            .with_title(&format!("Cherenkov 1 trigger counts {label};Counts;Entries")),
            ckov2_counts: Histogram1D::from_spec(
                "ckov2_counts",
                &settings.cherenkov_counts,
                &column(|i| i.ckov2_trigger_counts as f64),
            )?
            .with_title(&format!("Cherenkov 2 trigger counts {label};Counts;Entries")),
            ckov1_pressure: Histogram1D::from_spec(
                "ckov1_pressure",
                &settings.cherenkov_pressure,
                &column(|i| i.ckov1_pressure),
            )?
            .with_title(&format!("Cherenkov 1 pressure {label};Pressure;Entries")),
            ckov2_pressure: Histogram1D::from_spec(
                "ckov2_pressure",
                &settings.cherenkov_pressure,
                &column(|i| i.ckov2_pressure),
            )?
            .with_title(&format!("Cherenkov 2 pressure {label};Pressure;Entries")),
            momentum_ref: Histogram1D::from_spec(
                "momentum_ref",
                &settings.momentum,
                &column(|i| i.momentum_ref),
            )?
            .with_title(&format!("Reference momentum {label};p [GeV/c];Entries")),
            momentum_meas: Histogram1D::from_spec(
                "momentum_meas",
                &settings.momentum,
                &column(|i| i.momentum_meas),
            )?
            .with_title(&format!("Measured momentum {label};p [GeV/c];Entries")),
            momentum_diff: Histogram1D::from_spec(
                "momentum_diff",
                &diff_spec,
                &column(|i| i.momentum_diff),
            )?
            .with_title(&format!("Measured - reference momentum {label};dp [GeV/c];Entries")),
            tof_vs_momentum: Histogram2D::from_specs(
                "tof_vs_momentum",
                &settings.tof_vs_momentum_momentum,
                &settings.tof_vs_momentum_tof,
                &tof_vs_momentum,
            )?,
        })
    }

    pub fn one_dimensional(&self) -> [&Histogram1D; 8] {
        [
            &self.tof,
            &self.ckov1_counts,
            &self.ckov2_counts,
            &self.ckov1_pressure,
            &self.ckov2_pressure,
            &self.momentum_ref,
            &self.momentum_meas,
            &self.momentum_diff,
        ]
    }
}

/// What the YAML summary of a window records
#[derive(Debug, Clone, Serialize)]
pub struct WindowSummary {
    pub label: String,
    pub t0: String,
    pub t1: String,
    pub n_tofs: usize,
    pub n_xcet1_matched: usize,
    pub n_xcet2_matched: usize,
    pub histograms: Vec<HistogramSummary>,
}

/// Everything produced for one analysis window
#[derive(Debug, Clone)]
pub struct WindowResult {
    pub window_index: usize,
    pub window: AnalysisWindow,
    pub beam_infos: Vec<BeamInfo>,
    pub histograms: WindowHistograms,
}

impl WindowResult {
    pub fn summary(&self) -> WindowSummary {
        let n_matched = |status: fn(&BeamInfo) -> i32| {
            self.beam_infos.iter().filter(|i| status(i) == 1).count()
        };
        WindowSummary {
            label: self.window.label.clone(),
            t0: self.window.t0.clone(),
            t1: self.window.t1.clone(),
            n_tofs: self.beam_infos.len(),
            n_xcet1_matched: n_matched(|i| i.xcet1.status),
            n_xcet2_matched: n_matched(|i| i.xcet2.status),
            histograms: self
                .histograms
                .one_dimensional()
                .into_iter()
                .map(HistogramSummary::from)
                .collect(),
        }
    }
}

/// Write the beam info table, histograms and summary of a window to its directory
pub fn write_window_outputs(config: &Config, result: &WindowResult) -> Result<PathBuf, ProcessorError> {
    let window_dir = config.get_window_directory(&result.window)?;
    write_beam_infos(&window_dir.join(BEAM_INFO_FILE), &result.beam_infos)?;
    for hist in result.histograms.one_dimensional() {
        write_histogram(&window_dir.join(format!("{}.csv", hist.name)), hist)?;
    }
    let tof_vs_momentum = &result.histograms.tof_vs_momentum;
    write_histogram_2d(
        &window_dir.join(format!("{}.csv", tof_vs_momentum.name)),
        tof_vs_momentum,
    )?;
    write_yaml(&window_dir.join(SUMMARY_FILE), &result.summary())?;

    #[cfg(feature = "hdf5")]
    if config.write_hdf5 {
        let mut writer = HDFWriter::new(&window_dir.join(HDF_FILE))?;
        writer.write_window(
            &result.window,
            result.beam_infos.len(),
            &result.histograms.one_dimensional(),
            &[tof_vs_momentum],
        )?;
        writer.close()?;
    }
    #[cfg(not(feature = "hdf5"))]
    if config.write_hdf5 {
        log::warn!("write_hdf5 is set but beamtof was built without the hdf5 feature, skipping HDF5 output.");
    }
    Ok(window_dir)
}

/// The main loop of beamtof.
///
/// Fetches the devices of one analysis window, matches the TOFs, fills the histograms
/// and writes everything to the window's output directory.
pub fn process_window<S: BeamDataSource + ?Sized>(
    config: &Config,
    window_index: usize,
    source: &mut S,
    tx: &Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<WindowResult, ProcessorError> {
    let window = &config.windows[window_index];
    tx.send(WorkerStatus::new(0.0, window_index, worker_id, Stage::Fetching))?;
    let beam_infos = build_beam_infos(source, window, config)?;
    if beam_infos.is_empty() {
        log::warn!("{}: No TOF values found in [{}, {}]", window.label, window.t0, window.t1);
    }

    tx.send(WorkerStatus::new(0.6, window_index, worker_id, Stage::Histogramming))?;
    let histograms = WindowHistograms::build(&window.label, &beam_infos, &config.histograms)?;
    log::info!(
        "{}: TOF mean = {:.2} ns, RMS = {:.2} ns",
        window.label,
        histograms.tof.mean(),
        histograms.tof.rms()
    );

    tx.send(WorkerStatus::new(0.8, window_index, worker_id, Stage::Writing))?;
    let result = WindowResult {
        window_index,
        window: window.clone(),
        beam_infos,
        histograms,
    };
    let window_dir = write_window_outputs(config, &result)?;
    log::info!("{}: Outputs written to {}", window.label, window_dir.display());
    tx.send(WorkerStatus::new(1.0, window_index, worker_id, Stage::Writing))?;
    Ok(result)
}

/// Process a subset of windows against a given data source
pub fn process_subset_with<S: BeamDataSource + ?Sized>(
    config: &Config,
    source: &mut S,
    tx: &Sender<WorkerStatus>,
    worker_id: usize,
    subset: &[usize],
) -> Result<Vec<WindowResult>, ProcessorError> {
    let mut results = Vec::with_capacity(subset.len());
    for window_index in subset {
        let label = &config.windows[*window_index].label;
        log::info!("Processing window {label}...");
        results.push(process_window(config, *window_index, source, tx, worker_id)?);
        log::info!("Finished processing window {label}.");
    }
    Ok(results)
}

/// Process a subset of windows, fetching from IFBeam.
/// This is the function to be called by each worker thread.
pub fn process_subset(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<usize>,
) -> Result<Vec<WindowResult>, ProcessorError> {
    let mut source = IfBeamClient::from_config(&config);
    process_subset_with(&config, &mut source, &tx, worker_id, &subset)
}

/// Process all windows of the config in one worker
pub fn process(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<Vec<WindowResult>, ProcessorError> {
    let all: Vec<usize> = (0..config.windows.len()).collect();
    process_subset(config, tx, worker_id, all)
}

/// Divide the windows into a set of subsets (per thread/worker)
pub fn create_subsets(config: &Config) -> Vec<Vec<usize>> {
    let mut subsets: Vec<Vec<usize>> = vec![Vec::new(); config.n_threads.max(1) as usize];
    let n_subsets = subsets.len();

    for idx in 0..config.windows.len() {
        subsets[idx % n_subsets].push(idx)
    }

    subsets
}

/// Write the outputs spanning all windows: the overlay of the TOF histograms and the
/// summary of every window, in config order
pub fn write_combined_outputs(config: &Config, results: &[WindowResult]) -> Result<(), ProcessorError> {
    let mut ordered: Vec<&WindowResult> = results.iter().collect();
    ordered.sort_by_key(|r| r.window_index);

    let overlay: Vec<(&str, &Histogram1D)> = ordered
        .iter()
        .map(|r| (r.window.label.as_str(), &r.histograms.tof))
        .collect();
    write_histogram_overlay(&config.get_output_file(OVERLAY_FILE)?, &overlay)?;

    let summaries: Vec<WindowSummary> = ordered.iter().map(|r| r.summary()).collect();
    write_yaml(&config.get_output_file(RUN_SUMMARY_FILE)?, &summaries)?;
    for summary in summaries.iter() {
        log::info!("{}: {} TOF values", summary.label, summary.n_tofs);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;
    use crate::ifbeam::MemorySource;
    use crate::tof::TofCounter;
    use std::sync::mpsc::channel;

    const SEC: i64 = 1_724_700_000;

    fn test_source() -> MemorySource {
        let mut source = MemorySource::new();
        let mut add = |prefix: &str, seconds: &str, coarse: &str| {
            source.insert(&format!("{prefix}:seconds[]"), &format!("h\na,b,c,d,e,{seconds}\n"));
            source.insert(&format!("{prefix}:coarse[]"), &format!("h\na,b,c,d,e,{coarse}\n"));
            source.insert(&format!("{prefix}:frac[]"), "h\na,b,c,d,e,0,0\n");
            source.insert(&format!("{prefix}:timestampCount"), "h\na,b,c,d,e,2\n");
        };
        let sec = format!("0,{SEC},0,{SEC}");
        add(TRIGGER_PREFIX, &sec, "1000,2000");
        add(&TofCounter::Upstream1A.variable_prefix(), &sec, "986,1987");
        add(&TofCounter::Upstream1B.variable_prefix(), "0,0", "0");
        add(&TofCounter::Downstream2A.variable_prefix(), &sec, "995,1995");
        add(&TofCounter::Downstream2B.variable_prefix(), "0,0", "0");
        source.insert(
            &format!("{MOMENTUM_PREFIX}{MOMENTUM_REF_VAR}"),
            "h\na,b,c,d,e,1.0,1.0\n",
        );
        source.insert(
            &format!("{MOMENTUM_PREFIX}{MOMENTUM_MEAS_VAR}"),
            "h\na,b,c,d,e,1.1,0.9\n",
        );
        source
    }

    fn test_config(name: &str) -> Config {
        let output_path = std::env::temp_dir().join("beamtof_process_tests").join(name);
        std::fs::create_dir_all(&output_path).unwrap();
        Config {
            output_path,
            windows: vec![
                AnalysisWindow::new("Run 1", "t0", "t1"),
                AnalysisWindow::new("Run 2", "t0", "t1"),
            ],
            fetch_cherenkov: false,
            fetch_xcet: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_create_subsets() {
        let mut config = test_config("subsets");
        config.windows.push(AnalysisWindow::new("Run 3", "t0", "t1"));
        config.n_threads = 2;
        assert_eq!(create_subsets(&config), vec![vec![0, 2], vec![1]]);
        config.n_threads = 5;
        let subsets = create_subsets(&config);
        assert_eq!(subsets.len(), 5);
        assert!(subsets[4].is_empty());
    }

    #[test]
    fn test_process_window() {
        let config = test_config("window");
        let mut source = test_source();
        let (tx, rx) = channel();
        let result = process_window(&config, 0, &mut source, &tx, 3).unwrap();

        assert_eq!(result.beam_infos.len(), 2);
        assert_eq!(result.beam_infos[0].tof_ns, 72.0);
        assert_eq!(result.beam_infos[1].tof_ns, 64.0);
        assert_eq!(result.histograms.tof.integral(), 2);
        assert_eq!(result.histograms.momentum_meas.integral(), 2);
        assert_eq!(result.histograms.tof_vs_momentum.integral(), 2);

        let statuses: Vec<WorkerStatus> = rx.try_iter().collect();
        assert_eq!(statuses.len(), 4);
        assert!(statuses.iter().all(|s| s.worker_id == 3));
        assert_eq!(statuses.last().map(|s| s.progress), Some(1.0));

        let window_dir = config.output_path.join("Run_1");
        assert!(window_dir.join(BEAM_INFO_FILE).exists());
        assert!(window_dir.join("tof.csv").exists());
        assert!(window_dir.join("tof_vs_momentum.csv").exists());
        let summary = std::fs::read_to_string(window_dir.join(SUMMARY_FILE)).unwrap();
        assert!(summary.contains("n_tofs: 2"));
    }

    #[test]
    fn test_combined_outputs() {
        let config = test_config("combined");
        let mut source = test_source();
        let (tx, _rx) = channel();
        let mut results = process_subset_with(&config, &mut source, &tx, 0, &[1, 0]).unwrap();
        assert_eq!(results[0].window_index, 1);
        // four variables for each of the five timing devices plus the two momenta, once
        // per window
        assert_eq!(source.n_requests, 2 * 22);
        results.reverse();
        write_combined_outputs(&config, &results).unwrap();

        let overlay = std::fs::read_to_string(config.output_path.join(OVERLAY_FILE)).unwrap();
        // header plus one row per TOF bin and window
        assert_eq!(overlay.lines().count(), 1 + 2 * config.histograms.tof.bins);
        let summary = std::fs::read_to_string(config.output_path.join(RUN_SUMMARY_FILE)).unwrap();
        let first = summary.find("Run 1").unwrap();
        let second = summary.find("Run 2").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_missing_output_path() {
        let mut config = test_config("missing");
        config.output_path = PathBuf::from("/definitely/not/here");
        let mut source = test_source();
        let (tx, _rx) = channel();
        assert!(matches!(
            process_window(&config, 0, &mut source, &tx, 0),
            Err(ProcessorError::ConfigError(_))
        ));
    }
}
