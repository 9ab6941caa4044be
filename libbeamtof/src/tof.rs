use std::fmt::Display;

use super::config::{AnalysisWindow, TofSettings};
use super::constants::*;
use super::error::IfBeamError;
use super::ifbeam::{fetch_device_timestamps, BeamDataSource};
use super::timestamp::{DeviceTimestamps, Timestamp};

/// The four TOF counters of the beamline. 1A/1B sit upstream, 2A/2B downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TofCounter {
    Upstream1A,
    Upstream1B,
    Downstream2A,
    Downstream2B,
}

impl TofCounter {
    pub fn device_name(&self) -> &'static str {
        match self {
            Self::Upstream1A => TOF_UPSTREAM_A,
            Self::Upstream1B => TOF_UPSTREAM_B,
            Self::Downstream2A => TOF_DOWNSTREAM_A,
            Self::Downstream2B => TOF_DOWNSTREAM_B,
        }
    }

    pub fn variable_prefix(&self) -> String {
        format!("{TOF_PREFIX}/{}", self.device_name())
    }
}

impl Display for TofCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upstream1A => write!(f, "1A"),
            Self::Upstream1B => write!(f, "1B"),
            Self::Downstream2A => write!(f, "2A"),
            Self::Downstream2B => write!(f, "2B"),
        }
    }
}

/// The timestamp readout of the general trigger and all four TOF counters for one window
#[derive(Debug, Clone, Default)]
pub struct TofDevices {
    pub trigger: DeviceTimestamps,
    pub upstream_a: DeviceTimestamps,
    pub upstream_b: DeviceTimestamps,
    pub downstream_a: DeviceTimestamps,
    pub downstream_b: DeviceTimestamps,
}

impl TofDevices {
    /// Fetch the trigger and the counters, in the order trigger, 1A, 1B, 2A, 2B
    pub fn fetch<S: BeamDataSource + ?Sized>(
        source: &mut S,
        window: &AnalysisWindow,
    ) -> Result<Self, IfBeamError> {
        let trigger = fetch_device_timestamps(source, TRIGGER_PREFIX, window)?;
        let upstream_a =
            fetch_device_timestamps(source, &TofCounter::Upstream1A.variable_prefix(), window)?;
        let upstream_b =
            fetch_device_timestamps(source, &TofCounter::Upstream1B.variable_prefix(), window)?;
        let downstream_a =
            fetch_device_timestamps(source, &TofCounter::Downstream2A.variable_prefix(), window)?;
        let downstream_b =
            fetch_device_timestamps(source, &TofCounter::Downstream2B.variable_prefix(), window)?;
        Ok(Self {
            trigger,
            upstream_a,
            upstream_b,
            downstream_a,
            downstream_b,
        })
    }

    pub fn counter(&self, counter: TofCounter) -> &DeviceTimestamps {
        match counter {
            TofCounter::Upstream1A => &self.upstream_a,
            TofCounter::Upstream1B => &self.upstream_b,
            TofCounter::Downstream2A => &self.downstream_a,
            TofCounter::Downstream2B => &self.downstream_b,
        }
    }
}

/// One reconstructed time of flight and the hits it was built from
#[derive(Debug, Clone, PartialEq)]
pub struct TofMatch {
    pub tof_ns: f64,
    pub trigger_index: usize,
    pub trigger: Timestamp,
    pub downstream: Timestamp,
    pub upstream: Timestamp,
    pub downstream_counter: TofCounter,
    pub upstream_counter: TofCounter,
}

/// TofMatcher reconstructs times of flight from the TDC readout.
///
/// The general trigger is the anchor. A downstream hit belongs to a trigger if it
/// precedes the trigger by less than the downstream window, and an upstream hit belongs
/// to a downstream hit if it precedes it by less than the upstream window. The TOF is
/// the time between the upstream and downstream hits. Every scan stops at the first
/// sentinel (zero seconds) sample.
#[derive(Debug, Clone, Default)]
pub struct TofMatcher {
    settings: TofSettings,
}

impl TofMatcher {
    pub fn new(settings: TofSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TofSettings {
        &self.settings
    }

    /// Find all TOF candidates. Results are ordered by trigger, then 2A before 2B, then
    /// 1A before 1B.
    pub fn find_tofs(&self, devices: &TofDevices) -> Vec<TofMatch> {
        let mut matches = Vec::new();
        for (trigger_index, trigger) in devices.trigger.valid().enumerate() {
            for downstream_counter in [TofCounter::Downstream2A, TofCounter::Downstream2B] {
                for downstream in devices.counter(downstream_counter).valid() {
                    let delta =
                        trigger.delta_ns_with_offset(self.settings.trigger_offset, downstream);
                    if !self.accepts_downstream(delta) {
                        if self.settings.sorted_early_exit && delta < 0.0 {
                            break;
                        }
                        continue;
                    }
                    log::trace!("Trigger {trigger_index} matched {downstream_counter} ({delta} ns)");
                    for upstream_counter in [TofCounter::Upstream1A, TofCounter::Upstream1B] {
                        self.match_upstream(
                            downstream,
                            devices.counter(upstream_counter),
                            |tof_ns, upstream| {
                                matches.push(TofMatch {
                                    tof_ns,
                                    trigger_index,
                                    trigger: *trigger,
                                    downstream: *downstream,
                                    upstream: *upstream,
                                    downstream_counter,
                                    upstream_counter,
                                })
                            },
                        );
                    }
                }
            }
        }
        matches
    }

    /// The downstream window is open, 0 < delta < window. With `sorted_early_exit` both
    /// edges are included, 0 <= delta <= window.
    fn accepts_downstream(&self, delta: f64) -> bool {
        let window = self.settings.downstream_to_trigger_ns;
        if self.settings.sorted_early_exit {
            (0.0..=window).contains(&delta)
        } else {
            delta > 0.0 && delta < window
        }
    }

    /// Scan an upstream counter for hits inside the upstream window before the
    /// downstream hit
    fn match_upstream<F: FnMut(f64, &Timestamp)>(
        &self,
        downstream: &Timestamp,
        upstream: &DeviceTimestamps,
        mut on_match: F,
    ) {
        for hit in upstream.valid() {
            let delta = downstream.delta_ns(hit);
            if self.settings.sorted_early_exit && delta < 0.0 {
                break;
            }
            if delta > 0.0 && delta < self.settings.upstream_to_downstream_ns {
                on_match(delta, hit);
            }
        }
    }
}

/// Fetch the TOF devices for a window and return the reconstructed TOFs
pub fn get_tofs<S: BeamDataSource + ?Sized>(
    source: &mut S,
    window: &AnalysisWindow,
    settings: &TofSettings,
) -> Result<Vec<TofMatch>, IfBeamError> {
    let devices = TofDevices::fetch(source, window)?;
    log::info!(
        "Window {}: {} triggers, {}/{} upstream and {}/{} downstream samples",
        window.label,
        devices.trigger.len(),
        devices.upstream_a.len(),
        devices.upstream_b.len(),
        devices.downstream_a.len(),
        devices.downstream_b.len()
    );
    Ok(TofMatcher::new(settings.clone()).find_tofs(&devices))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: i64 = 1_724_700_000;

    fn device(samples: &[(i64, i64, i64)]) -> DeviceTimestamps {
        let seconds: Vec<i64> = samples.iter().map(|s| s.0).collect();
        let coarse: Vec<i64> = samples.iter().map(|s| s.1).collect();
        let frac: Vec<i64> = samples.iter().map(|s| s.2).collect();
        DeviceTimestamps::from_flat(&seconds, &coarse, &frac)
    }

    fn simple_devices() -> TofDevices {
        // trigger at 8000 ns, 2A at 7960 ns (40 ns before), 1A at 7888 ns (72 ns
        // before 2A), 1B outside the window
        TofDevices {
            trigger: device(&[(SEC, 1000, 0)]),
            upstream_a: device(&[(SEC, 986, 0)]),
            upstream_b: device(&[(SEC, 900, 0)]),
            downstream_a: device(&[(SEC, 995, 0)]),
            downstream_b: DeviceTimestamps::default(),
        }
    }

    #[test]
    fn test_single_match() {
        let matcher = TofMatcher::default();
        let tofs = matcher.find_tofs(&simple_devices());
        assert_eq!(tofs.len(), 1);
        assert_eq!(tofs[0].tof_ns, 72.0);
        assert_eq!(tofs[0].upstream_counter, TofCounter::Upstream1A);
        assert_eq!(tofs[0].downstream_counter, TofCounter::Downstream2A);
        assert_eq!(tofs[0].trigger_index, 0);
    }

    #[test]
    fn test_default_matcher_uses_default_windows() {
        let matcher = TofMatcher::default();
        assert_eq!(matcher.settings(), &TofSettings::default());
    }

    #[test]
    fn test_results_inside_window() {
        let mut devices = simple_devices();
        devices.upstream_a = device(&[
            (SEC, 995, 0),      // delta 0, rejected
            (SEC, 996, 0),      // after the downstream hit, rejected
            (SEC, 933, 0),      // 496 ns
            (SEC, 932, 0),      // 504 ns, rejected
            (SEC - 1, 995, 0),  // one second before
            (SEC, 994, 511),    // 7 ns and a fraction
        ]);
        let matcher = TofMatcher::default();
        let tofs = matcher.find_tofs(&devices);
        let values: Vec<f64> = tofs.iter().map(|t| t.tof_ns).collect();
        assert_eq!(values, vec![496.0, 7.0 + 1.0 / 512.0]);
        for t in tofs {
            assert!(t.tof_ns > 0.0 && t.tof_ns < 500.0);
        }
    }

    #[test]
    fn test_downstream_window() {
        let mut devices = simple_devices();
        // 2A exactly 64 ns before the trigger is outside the 60 ns window
        devices.downstream_a = device(&[(SEC, 992, 0)]);
        assert!(TofMatcher::default().find_tofs(&devices).is_empty());
        // widen the window
        let settings = TofSettings {
            downstream_to_trigger_ns: 70.0,
            ..Default::default()
        };
        let tofs = TofMatcher::new(settings).find_tofs(&devices);
        assert_eq!(tofs.len(), 1);
        assert_eq!(tofs[0].tof_ns, 48.0);
    }

    #[test]
    fn test_trigger_offset() {
        let mut devices = simple_devices();
        devices.downstream_a = device(&[(SEC, 992, 0)]);
        // shifting the trigger back by one tick brings 2A to 56 ns
        let settings = TofSettings {
            trigger_offset: -1.0,
            ..Default::default()
        };
        assert_eq!(TofMatcher::new(settings).find_tofs(&devices).len(), 1);
    }

    #[test]
    fn test_sentinel_stops_scan() {
        let mut devices = simple_devices();
        devices.upstream_a = device(&[(0, 0, 0), (SEC, 986, 0)]);
        assert!(TofMatcher::default().find_tofs(&devices).is_empty());

        devices = simple_devices();
        devices.trigger = device(&[(0, 0, 0), (SEC, 1000, 0)]);
        assert!(TofMatcher::default().find_tofs(&devices).is_empty());

        devices = simple_devices();
        devices.downstream_a = device(&[(0, 0, 0), (SEC, 995, 0)]);
        assert!(TofMatcher::default().find_tofs(&devices).is_empty());
    }

    #[test]
    fn test_scan_order() {
        let devices = TofDevices {
            trigger: device(&[(SEC, 1000, 0), (SEC, 2000, 0)]),
            upstream_a: device(&[(SEC, 986, 0), (SEC, 1986, 0)]),
            upstream_b: device(&[(SEC, 985, 0), (SEC, 1985, 0)]),
            downstream_a: device(&[(SEC, 995, 0), (SEC, 1995, 0)]),
            downstream_b: device(&[(SEC, 996, 0), (SEC, 1996, 0)]),
        };
        let tofs = TofMatcher::default().find_tofs(&devices);
        let order: Vec<(usize, TofCounter, TofCounter, f64)> = tofs
            .iter()
            .map(|t| (t.trigger_index, t.downstream_counter, t.upstream_counter, t.tof_ns))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, TofCounter::Downstream2A, TofCounter::Upstream1A, 72.0),
                (0, TofCounter::Downstream2A, TofCounter::Upstream1B, 80.0),
                (0, TofCounter::Downstream2B, TofCounter::Upstream1A, 80.0),
                (0, TofCounter::Downstream2B, TofCounter::Upstream1B, 88.0),
                (1, TofCounter::Downstream2A, TofCounter::Upstream1A, 72.0),
                (1, TofCounter::Downstream2A, TofCounter::Upstream1B, 80.0),
                (1, TofCounter::Downstream2B, TofCounter::Upstream1A, 80.0),
                (1, TofCounter::Downstream2B, TofCounter::Upstream1B, 88.0),
            ]
        );
    }

    #[test]
    fn test_sorted_early_exit() {
        let mut devices = simple_devices();
        // a hit after the downstream hit, followed by a valid one
        devices.upstream_a = device(&[(SEC, 999, 0), (SEC, 986, 0)]);
        assert_eq!(TofMatcher::default().find_tofs(&devices).len(), 1);
        let settings = TofSettings {
            sorted_early_exit: true,
            ..Default::default()
        };
        assert!(TofMatcher::new(settings).find_tofs(&devices).is_empty());
    }

    #[test]
    fn test_downstream_window_edges() {
        let mut devices = simple_devices();
        let strict = TofSettings {
            downstream_to_trigger_ns: 64.0,
            ..Default::default()
        };
        let inclusive = TofSettings {
            sorted_early_exit: true,
            ..strict.clone()
        };
        // 2A at the trigger, delta 0
        devices.downstream_a = device(&[(SEC, 1000, 0)]);
        assert!(TofMatcher::new(strict.clone()).find_tofs(&devices).is_empty());
        let tofs = TofMatcher::new(inclusive.clone()).find_tofs(&devices);
        assert_eq!(tofs.len(), 1);
        assert_eq!(tofs[0].tof_ns, 112.0);
        // 2A exactly one window before the trigger
        devices.downstream_a = device(&[(SEC, 992, 0)]);
        assert!(TofMatcher::new(strict).find_tofs(&devices).is_empty());
        let tofs = TofMatcher::new(inclusive).find_tofs(&devices);
        assert_eq!(tofs.len(), 1);
        assert_eq!(tofs[0].tof_ns, 48.0);
    }

    #[test]
    fn test_get_tofs_from_source() {
        use crate::ifbeam::MemorySource;

        let mut source = MemorySource::new();
        let mut add = |prefix: &str, seconds: &str, coarse: &str| {
            source.insert(&format!("{prefix}:seconds[]"), &format!("h\na,b,c,d,e,{seconds}\n"));
            source.insert(&format!("{prefix}:coarse[]"), &format!("h\na,b,c,d,e,{coarse}\n"));
            source.insert(&format!("{prefix}:frac[]"), "h\na,b,c,d,e,0\n");
            source.insert(&format!("{prefix}:timestampCount"), "h\na,b,c,d,e,1\n");
        };
        let sec = format!("0,{SEC}");
        add(TRIGGER_PREFIX, &sec, "1000");
        add(&TofCounter::Upstream1A.variable_prefix(), &sec, "986");
        add(&TofCounter::Upstream1B.variable_prefix(), &sec, "900");
        add(&TofCounter::Downstream2A.variable_prefix(), &sec, "995");
        add(&TofCounter::Downstream2B.variable_prefix(), "0,0", "0");

        let window = AnalysisWindow::new("w", "t0", "t1");
        let tofs = get_tofs(&mut source, &window, &TofSettings::default()).unwrap();
        assert_eq!(tofs.len(), 1);
        assert_eq!(tofs[0].tof_ns, 72.0);
    }
}
