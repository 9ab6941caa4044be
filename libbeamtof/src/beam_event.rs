use std::path::Path;

use super::constants::{BEAM_EVENT_TOF_MAX, BEAM_EVENT_TOF_MIN};
use super::error::BeamEventError;
use super::histogram::Histogram1D;

const DUMP_FIELDS: usize = 5;
const MOMENTA_SEPARATOR: char = ';';

/// The beam instrumentation summary of one detector event, as dumped from the
/// reconstructed beam products
#[derive(Debug, Clone, PartialEq)]
pub struct BeamEvent {
    pub trigger: i64,
    pub tof: f64,
    pub ckov0_status: i64,
    pub ckov1_status: i64,
    pub momenta: Vec<f64>,
}

impl BeamEvent {
    /// Only events with a physical TOF enter the summaries
    pub fn passes_tof_cut(&self) -> bool {
        self.tof > BEAM_EVENT_TOF_MIN && self.tof < BEAM_EVENT_TOF_MAX
    }

    /// Parse a dump line: `trigger,tof,ckov0,ckov1,p1;p2;...`. The momenta field may be empty
    fn parse_line(line: &str, line_number: usize) -> Result<Self, BeamEventError> {
        let bad = |reason: String| BeamEventError::BadLine {
            line: line_number,
            reason,
        };
        let entries: Vec<&str> = line.split(',').map(|e| e.trim()).collect();
        if entries.len() != DUMP_FIELDS {
            return Err(bad(format!(
                "expected {DUMP_FIELDS} fields, found {}",
                entries.len()
            )));
        }
        let momenta = entries[4]
            .split(MOMENTA_SEPARATOR)
            .filter(|p| !p.trim().is_empty())
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|e| bad(format!("momenta: {e}")))?;
        Ok(Self {
            trigger: entries[0]
                .parse()
                .map_err(|e| bad(format!("trigger: {e}")))?,
            tof: entries[1].parse().map_err(|e| bad(format!("tof: {e}")))?,
            ckov0_status: entries[2]
                .parse()
                .map_err(|e| bad(format!("ckov0: {e}")))?,
            ckov1_status: entries[3]
                .parse()
                .map_err(|e| bad(format!("ckov1: {e}")))?,
            momenta,
        })
    }
}

/// Parse a beam event dump. The first line is a header; blank lines are ignored
pub fn parse_beam_events(text: &str) -> Result<Vec<BeamEvent>, BeamEventError> {
    text.lines()
        .enumerate()
        .skip(1)
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| BeamEvent::parse_line(line, idx + 1))
        .collect()
}

pub fn read_beam_events(path: &Path) -> Result<Vec<BeamEvent>, BeamEventError> {
    if !path.exists() {
        return Err(BeamEventError::BadFilePath(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    parse_beam_events(&text)
}

/// Histograms of a run's beam events
#[derive(Debug, Clone)]
pub struct BeamEventSummary {
    pub n_events: usize,
    pub n_selected: usize,
    pub tof: Histogram1D,
    pub trigger: Histogram1D,
    pub ckov0: Histogram1D,
    pub ckov1: Histogram1D,
    pub momenta: Histogram1D,
}

impl BeamEventSummary {
    pub fn new(title: &str) -> Result<Self, BeamEventError> {
        Ok(Self {
            n_events: 0,
            n_selected: 0,
            tof: Histogram1D::new("h_tof", 200, 0.0, 500.0)?
                .with_title(&format!("{title};TOF [ns];Events")),
            trigger: Histogram1D::new("h_trigger", 10, 0.0, 10.0)?
                .with_title("Timing Trigger;Trigger value;Events"),
            ckov0: Histogram1D::new("h_ckov0", 5, 0.0, 5.0)?
                .with_title("High Pressure Ckov Status;Status;Events"),
            ckov1: Histogram1D::new("h_ckov1", 5, 0.0, 5.0)?
                .with_title("Low Pressure Ckov Status;Status;Events"),
            momenta: Histogram1D::new("h_momenta", 100, 0.0, 10.0)?
                .with_title("Reco Beam Momenta;Momentum [GeV/c];Events"),
        })
    }

    pub fn fill(&mut self, event: &BeamEvent) {
        self.n_events += 1;
        if !event.passes_tof_cut() {
            return;
        }
        self.n_selected += 1;
        self.tof.fill(event.tof);
        self.trigger.fill(event.trigger as f64);
        self.ckov0.fill(event.ckov0_status as f64);
        self.ckov1.fill(event.ckov1_status as f64);
        self.momenta.fill_all(&event.momenta);
        log::debug!(
            "Trigger:{}, TOF:{:.2}, High Pres. CKov:{}, Low Pres. CKov:{}, Possible Momenta:{:?}",
            event.trigger,
            event.tof,
            event.ckov0_status,
            event.ckov1_status,
            event.momenta
        );
    }

    pub fn from_events(title: &str, events: &[BeamEvent]) -> Result<Self, BeamEventError> {
        let mut summary = Self::new(title)?;
        for event in events {
            summary.fill(event);
        }
        Ok(summary)
    }

    pub fn histograms(&self) -> [&Histogram1D; 5] {
        [
            &self.tof,
            &self.trigger,
            &self.ckov0,
            &self.ckov1,
            &self.momenta,
        ]
    }
}

/// The run number of a dump, taken as the file name suffix after the last underscore
pub fn run_number_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    match stem.rsplit_once('_') {
        Some((_, run)) => run.to_string(),
        None => stem,
    }
}

/// One TOF histogram per run for overlaying runs
pub fn compare_runs(paths: &[&Path]) -> Result<Vec<(String, Histogram1D)>, BeamEventError> {
    let mut hists = Vec::with_capacity(paths.len());
    for path in paths {
        let run_number = run_number_from_path(path);
        let mut hist = Histogram1D::new(&format!("h_tof_{run_number}"), 200, 0.0, 150.0)?
            .with_title("TOF Distribution ProtoDUNE VD Runs;TOF [ns];Events");
        for event in read_beam_events(path)? {
            if event.passes_tof_cut() {
                hist.fill(event.tof);
            }
        }
        log::info!("Run {run_number}: TOF RMS = {:.2} ns", hist.rms());
        hists.push((run_number, hist));
    }
    Ok(hists)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "\
trigger,tof,ckov0,ckov1,momenta
1,75.5,1,0,1.0;2.0
2,-1,0,0,
3,600,1,1,0.5

4,80.25,2,1,
";

    #[test]
    fn test_parse_dump() {
        let events = parse_beam_events(DUMP).unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].momenta, vec![1.0, 2.0]);
        assert!(events[1].momenta.is_empty());
        assert_eq!(events[3].ckov0_status, 2);
    }

    #[test]
    fn test_bad_line() {
        let result = parse_beam_events("h\n1,2,3\n");
        assert!(matches!(
            result,
            Err(BeamEventError::BadLine { line: 2, .. })
        ));
        let result = parse_beam_events("h\n1,x,0,0,\n");
        assert!(matches!(result, Err(BeamEventError::BadLine { .. })));
    }

    #[test]
    fn test_summary_applies_cut() {
        let events = parse_beam_events(DUMP).unwrap();
        let summary = BeamEventSummary::from_events("Run 39324", &events).unwrap();
        assert_eq!(summary.n_events, 4);
        assert_eq!(summary.n_selected, 2);
        assert_eq!(summary.tof.integral(), 2);
        assert_eq!(summary.momenta.integral(), 2);
        assert_eq!(summary.ckov0.counts()[1], 1);
        assert_eq!(summary.ckov0.counts()[2], 1);
        assert!((summary.tof.rms() - 2.375).abs() < 1e-9);
        assert_eq!(summary.tof.title, "Run 39324;TOF [ns];Events");
    }

    #[test]
    fn test_run_number() {
        assert_eq!(
            run_number_from_path(Path::new("/data/merged_39252.csv")),
            "39252"
        );
        assert_eq!(run_number_from_path(Path::new("plain.csv")), "plain");
    }
}
