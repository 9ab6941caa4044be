use super::config::{AnalysisWindow, Config};
use super::constants::*;
use super::error::{IfBeamError, ProcessorError};
use super::ifbeam::{fetch_floats, fetch_values, BeamDataSource};
use super::timestamp::{DeviceTimestamps, Timestamp};
use super::tof::{get_tofs, TofMatch};

/// Counter and pressure readings of one Cherenkov counter over a window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CherenkovReadings {
    pub counts: Vec<i64>,
    pub trigger_counts: Vec<i64>,
    pub pressures: Vec<f64>,
}

impl CherenkovReadings {
    pub fn fetch<S: BeamDataSource + ?Sized>(
        source: &mut S,
        device: &str,
        window: &AnalysisWindow,
    ) -> Result<Self, IfBeamError> {
        let prefix = format!("{CHERENKOV_PREFIX}/{device}");
        Ok(Self {
            counts: fetch_values(source, &format!("{prefix}{CKOV_COUNTS_VAR}"), window)?,
            trigger_counts: fetch_values(
                source,
                &format!("{prefix}{CKOV_TRIG_COUNTS_VAR}"),
                window,
            )?,
            pressures: fetch_floats(source, &format!("{prefix}{CKOV_PRESSURE_VAR}"), window)?,
        })
    }
}

/// The timestamp words of a Cherenkov counter (XCET). The XCET readout is optional;
/// when the fetch fails the counter is flagged as not fetched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XcetReadout {
    pub fetched: bool,
    pub seconds: Vec<i64>,
    pub frac: Vec<i64>,
    pub coarse: Vec<i64>,
    pub timestamps: DeviceTimestamps,
}

impl XcetReadout {
    pub fn not_fetched() -> Self {
        Self::default()
    }

    pub fn from_words(seconds: Vec<i64>, frac: Vec<i64>, coarse: Vec<i64>) -> Self {
        let timestamps = DeviceTimestamps::from_flat(&seconds, &coarse, &frac);
        Self {
            fetched: true,
            seconds,
            frac,
            coarse,
            timestamps,
        }
    }

    pub fn fetch<S: BeamDataSource + ?Sized>(
        source: &mut S,
        device: &str,
        window: &AnalysisWindow,
    ) -> Self {
        match fetch_xcet_words(source, device, window) {
            Ok((seconds, frac, coarse)) => {
                let readout = Self::from_words(seconds, frac, coarse);
                for (idx, ts) in readout.timestamps.samples.iter().enumerate() {
                    log::debug!(
                        "{device} {idx} sec={} ns={}",
                        ts.seconds,
                        ts.subsecond_ns(0.0)
                    );
                }
                readout
            }
            Err(e) => {
                log::warn!("Could not get {device} info: {e}");
                Self::not_fetched()
            }
        }
    }

    /// Match the XCET hits against a trigger time.
    ///
    /// Returns the status and the trigger - XCET delta of the first hit within the
    /// window. Status is -1 if the readout was not fetched, 0 if nothing matched.
    pub fn match_trigger(&self, trigger: &Timestamp, window_ns: f64) -> XcetStatus {
        if !self.fetched {
            return XcetStatus {
                status: XCET_STATUS_NOT_FETCHED,
                delta_ns: XCET_NO_TIMESTAMP,
            };
        }
        self.timestamps
            .samples
            .iter()
            .map(|hit| trigger.delta_ns(hit))
            .find(|delta| delta.abs() < window_ns)
            .map(|delta_ns| XcetStatus {
                status: XCET_STATUS_MATCHED,
                delta_ns,
            })
            .unwrap_or(XcetStatus {
                status: XCET_STATUS_NO_MATCH,
                delta_ns: XCET_NO_TIMESTAMP,
            })
    }

    /// Raw words at an index, 0 when missing
    fn words_at(&self, idx: usize) -> (i64, i64, i64) {
        if !self.fetched {
            return (0, 0, 0);
        }
        (
            value_or_zero(&self.seconds, idx),
            value_or_zero(&self.frac, idx),
            value_or_zero(&self.coarse, idx),
        )
    }
}

fn fetch_xcet_words<S: BeamDataSource + ?Sized>(
    source: &mut S,
    device: &str,
    window: &AnalysisWindow,
) -> Result<(Vec<i64>, Vec<i64>, Vec<i64>), IfBeamError> {
    let prefix = format!("{XCET_PREFIX}/{device}");
    let seconds = fetch_values(source, &format!("{prefix}{XCET_SECONDS_VAR}"), window)?;
    let frac = fetch_values(source, &format!("{prefix}{XCET_FRAC_VAR}"), window)?;
    let coarse = fetch_values(source, &format!("{prefix}{XCET_COARSE_VAR}"), window)?;
    Ok((seconds, frac, coarse))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XcetStatus {
    pub status: i32,
    pub delta_ns: f64,
}

/// Reference and measured beam momentum (GeV/c)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MomentumReadings {
    pub reference: Vec<f64>,
    pub measured: Vec<f64>,
}

impl MomentumReadings {
    pub fn fetch<S: BeamDataSource + ?Sized>(
        source: &mut S,
        window: &AnalysisWindow,
    ) -> Result<Self, IfBeamError> {
        Ok(Self {
            reference: fetch_floats(source, &format!("{MOMENTUM_PREFIX}{MOMENTUM_REF_VAR}"), window)?,
            measured: fetch_floats(
                source,
                &format!("{MOMENTUM_PREFIX}{MOMENTUM_MEAS_VAR}"),
                window,
            )?,
        })
    }
}

/// Everything known about one reconstructed TOF.
///
/// IFBeam carries no run or event numbers, so those stay 0. Auxiliary readings are
/// paired with TOFs by index and default to 0 when their arrays are shorter.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamInfo {
    pub run: u32,
    pub event: u32,
    pub trigger: usize,
    pub momentum: f64,
    pub tof_ns: f64,
    pub tof_pair: String,
    pub ckov1_trigger_counts: i64,
    pub ckov2_trigger_counts: i64,
    pub ckov1_pressure: f64,
    pub ckov2_pressure: f64,
    pub xcet1_seconds: i64,
    pub xcet1_frac: i64,
    pub xcet1_coarse: i64,
    pub xcet2_seconds: i64,
    pub xcet2_frac: i64,
    pub xcet2_coarse: i64,
    pub xcet1: XcetStatus,
    pub xcet2: XcetStatus,
    pub momentum_ref: f64,
    pub momentum_meas: f64,
    pub momentum_diff: f64,
}

pub const BEAM_INFO_CSV_HEADER: &str = "run,event,trigger,momentum,tof_ns,tof_pair,\
ckov1_counts_trig,ckov2_counts_trig,ckov1_pressure,ckov2_pressure,\
xcet1_seconds,xcet1_frac,xcet1_coarse,xcet2_seconds,xcet2_frac,xcet2_coarse,\
xcet1_status,xcet1_timestamp,xcet2_status,xcet2_timestamp,\
momentum_ref,momentum_meas,momentum_diff";

impl BeamInfo {
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            self.run,
            self.event,
            self.trigger,
            self.momentum,
            self.tof_ns,
            self.tof_pair,
            self.ckov1_trigger_counts,
            self.ckov2_trigger_counts,
            self.ckov1_pressure,
            self.ckov2_pressure,
            self.xcet1_seconds,
            self.xcet1_frac,
            self.xcet1_coarse,
            self.xcet2_seconds,
            self.xcet2_frac,
            self.xcet2_coarse,
            self.xcet1.status,
            self.xcet1.delta_ns,
            self.xcet2.status,
            self.xcet2.delta_ns,
            self.momentum_ref,
            self.momentum_meas,
            self.momentum_diff
        )
    }
}

fn value_or_zero<T: Copy + Default>(values: &[T], idx: usize) -> T {
    values.get(idx).copied().unwrap_or_default()
}

/// The auxiliary readings that are zipped onto the TOF list
#[derive(Debug, Clone, Default)]
pub struct AuxiliaryReadings {
    pub ckov1: CherenkovReadings,
    pub ckov2: CherenkovReadings,
    pub xcet1: XcetReadout,
    pub xcet2: XcetReadout,
    pub momentum: MomentumReadings,
}

impl AuxiliaryReadings {
    pub fn fetch<S: BeamDataSource + ?Sized>(
        source: &mut S,
        window: &AnalysisWindow,
        config: &Config,
    ) -> Result<Self, ProcessorError> {
        let mut aux = Self::default();
        if config.fetch_cherenkov {
            let (high, low) = config.cherenkov_pair()?;
            aux.ckov1 = CherenkovReadings::fetch(source, high, window)?;
            aux.ckov2 = CherenkovReadings::fetch(source, low, window)?;
        }
        if config.fetch_xcet {
            let (high, low) = config.cherenkov_pair()?;
            aux.xcet1 = XcetReadout::fetch(source, high, window);
            aux.xcet2 = XcetReadout::fetch(source, low, window);
        }
        if config.fetch_momentum {
            aux.momentum = MomentumReadings::fetch(source, window)?;
        }
        Ok(aux)
    }
}

/// Combine the TOFs with the auxiliary readings into beam info records
pub fn assemble_beam_infos(
    tofs: &[TofMatch],
    aux: &AuxiliaryReadings,
    xcet_window_ns: f64,
) -> Vec<BeamInfo> {
    tofs.iter()
        .enumerate()
        .map(|(idx, tof)| {
            let (xcet1_seconds, xcet1_frac, xcet1_coarse) = aux.xcet1.words_at(idx);
            let (xcet2_seconds, xcet2_frac, xcet2_coarse) = aux.xcet2.words_at(idx);
            let momentum_ref = value_or_zero(&aux.momentum.reference, idx);
            let momentum_meas = value_or_zero(&aux.momentum.measured, idx);
            BeamInfo {
                run: 0,
                event: 0,
                trigger: tof.trigger_index,
                momentum: 0.0,
                tof_ns: tof.tof_ns,
                tof_pair: format!("{}-{}", tof.upstream_counter, tof.downstream_counter),
                ckov1_trigger_counts: value_or_zero(&aux.ckov1.trigger_counts, idx),
                ckov2_trigger_counts: value_or_zero(&aux.ckov2.trigger_counts, idx),
                ckov1_pressure: value_or_zero(&aux.ckov1.pressures, idx),
                ckov2_pressure: value_or_zero(&aux.ckov2.pressures, idx),
                xcet1_seconds,
                xcet1_frac,
                xcet1_coarse,
                xcet2_seconds,
                xcet2_frac,
                xcet2_coarse,
                xcet1: aux.xcet1.match_trigger(&tof.trigger, xcet_window_ns),
                xcet2: aux.xcet2.match_trigger(&tof.trigger, xcet_window_ns),
                momentum_ref,
                momentum_meas,
                momentum_diff: momentum_meas - momentum_ref,
            }
        })
        .collect()
}

/// Fetch everything for a window and build its beam info records
pub fn build_beam_infos<S: BeamDataSource + ?Sized>(
    source: &mut S,
    window: &AnalysisWindow,
    config: &Config,
) -> Result<Vec<BeamInfo>, ProcessorError> {
    let tofs = get_tofs(source, window, &config.tof)?;
    let aux = AuxiliaryReadings::fetch(source, window, config)?;
    let infos = assemble_beam_infos(&tofs, &aux, config.xcet_window_ns);
    log::info!(
        "{}: Collected {} TOF values, with Ckov1={} and Ckov2={} entries",
        window.label,
        infos.len(),
        aux.ckov1.trigger_counts.len(),
        aux.ckov2.trigger_counts.len()
    );
    Ok(infos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tof::TofCounter;

    const SEC: i64 = 1_724_700_000;

    fn tof_at(trigger: Timestamp, tof_ns: f64) -> TofMatch {
        TofMatch {
            tof_ns,
            trigger_index: 0,
            trigger,
            downstream: trigger,
            upstream: trigger,
            downstream_counter: TofCounter::Downstream2A,
            upstream_counter: TofCounter::Upstream1B,
        }
    }

    #[test]
    fn test_xcet_status() {
        let trigger = Timestamp::new(SEC, 1000, 0);
        let not_fetched = XcetReadout::not_fetched();
        assert_eq!(
            not_fetched.match_trigger(&trigger, 500.0),
            XcetStatus {
                status: -1,
                delta_ns: -1.0
            }
        );

        let far = XcetReadout::from_words(vec![SEC - 1], vec![0], vec![1000]);
        assert_eq!(far.match_trigger(&trigger, 500.0).status, 0);

        let near = XcetReadout::from_words(vec![SEC - 1, SEC], vec![0, 0], vec![1000, 1010]);
        let status = near.match_trigger(&trigger, 500.0);
        assert_eq!(status.status, 1);
        assert_eq!(status.delta_ns, -80.0);
    }

    #[test]
    fn test_assemble_pads_with_zero() {
        let trigger = Timestamp::new(SEC, 1000, 0);
        let tofs = vec![tof_at(trigger, 70.0), tof_at(trigger, 75.0)];
        let aux = AuxiliaryReadings {
            ckov1: CherenkovReadings {
                counts: vec![9],
                trigger_counts: vec![3],
                pressures: vec![1.5],
            },
            momentum: MomentumReadings {
                reference: vec![1.0, 1.0],
                measured: vec![1.2],
            },
            ..Default::default()
        };
        let infos = assemble_beam_infos(&tofs, &aux, 500.0);
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].ckov1_trigger_counts, 3);
        assert_eq!(infos[1].ckov1_trigger_counts, 0);
        assert_eq!(infos[0].ckov1_pressure, 1.5);
        assert_eq!(infos[0].ckov2_trigger_counts, 0);
        assert!((infos[0].momentum_diff - 0.2).abs() < 1e-12);
        assert_eq!(infos[1].momentum_diff, -1.0);
        assert_eq!(infos[0].xcet1.status, -1);
        assert_eq!(infos[0].tof_pair, "1B-2A");
    }

    #[test]
    fn test_csv_row_matches_header() {
        let trigger = Timestamp::new(SEC, 1000, 0);
        let infos = assemble_beam_infos(&[tof_at(trigger, 70.0)], &AuxiliaryReadings::default(), 500.0);
        let n_header = BEAM_INFO_CSV_HEADER.split(',').count();
        let n_row = infos[0].to_csv_row().split(',').count();
        assert_eq!(n_header, n_row);
    }

    #[test]
    fn test_xcet_fetch_failure_is_not_fatal() {
        let mut source = crate::ifbeam::MemorySource::new();
        let window = AnalysisWindow::new("w", "t0", "t1");
        let readout = XcetReadout::fetch(&mut source, CHERENKOV_HIGH_PRESSURE, &window);
        assert!(!readout.fetched);
    }

    #[test]
    fn test_xcet_without_devices_is_an_error() {
        let mut source = crate::ifbeam::MemorySource::new();
        let window = AnalysisWindow::new("w", "t0", "t1");
        let config = Config {
            fetch_cherenkov: false,
            fetch_xcet: true,
            fetch_momentum: false,
            cherenkov_devices: vec![],
            ..Default::default()
        };
        let result = AuxiliaryReadings::fetch(&mut source, &window, &config);
        assert!(matches!(
            result,
            Err(ProcessorError::ConfigError(crate::error::ConfigError::Invalid(_)))
        ));
        assert_eq!(source.n_requests, 0);
    }
}
