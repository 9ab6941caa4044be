use super::constants::{
    FRAC_PER_NS, NS_PER_COARSE_TICK, NS_PER_SECOND, SECONDS_WORDS_PER_SAMPLE, SECONDS_WORD_OFFSET,
};

/// A single TDC timestamp as read out of the beam instrumentation.
///
/// The triplet is (seconds, coarse, frac), where coarse counts 8 ns ticks and frac
/// subdivides a nanosecond into 512 parts. A timestamp with zero seconds is the
/// sentinel marking the end of valid samples in a readout array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamp {
    pub seconds: i64,
    pub coarse: i64,
    pub frac: i64,
}

impl Timestamp {
    pub fn new(seconds: i64, coarse: i64, frac: i64) -> Self {
        Self {
            seconds,
            coarse,
            frac,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.seconds == 0
    }

    /// Nanoseconds within the current second. The offset is given in coarse ticks.
    pub fn subsecond_ns(&self, offset: f64) -> f64 {
        (self.coarse as f64 + offset) * NS_PER_COARSE_TICK + self.frac as f64 / FRAC_PER_NS
    }

    /// Absolute time in nanoseconds.
    ///
    /// At epoch scale an f64 only resolves a few hundred ns, so use delta_ns for
    /// comparing timestamps.
    pub fn to_ns(&self) -> f64 {
        self.seconds as f64 * NS_PER_SECOND + self.subsecond_ns(0.0)
    }

    /// The time of self minus the time of other, in nanoseconds
    pub fn delta_ns(&self, other: &Timestamp) -> f64 {
        self.delta_ns_with_offset(0.0, other)
    }

    /// Same as delta_ns, but with a coarse tick offset applied to self
    pub fn delta_ns_with_offset(&self, offset: f64, other: &Timestamp) -> f64 {
        NS_PER_SECOND * (self.seconds - other.seconds) as f64 + self.subsecond_ns(offset)
            - other.subsecond_ns(0.0)
    }
}

/// The readout of one TDC device over an analysis window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceTimestamps {
    pub samples: Vec<Timestamp>,
    /// Raw timestampCount readings, kept for bookkeeping only
    pub counts: Vec<i64>,
}

impl DeviceTimestamps {
    /// Assemble samples from the raw IFBeam arrays.
    ///
    /// The number of samples is set by the coarse array. seconds[] carries two words
    /// per sample, of which the second one is used. Missing words are patched with 0,
    /// which turns the sample into a sentinel if the seconds word is missing.
    pub fn from_raw(seconds: &[i64], coarse: &[i64], frac: &[i64]) -> Self {
        let samples = coarse
            .iter()
            .enumerate()
            .map(|(idx, c)| {
                let sec_idx = idx * SECONDS_WORDS_PER_SAMPLE + SECONDS_WORD_OFFSET;
                Timestamp {
                    seconds: seconds.get(sec_idx).copied().unwrap_or(0),
                    coarse: *c,
                    frac: frac.get(idx).copied().unwrap_or(0),
                }
            })
            .collect();
        Self {
            samples,
            counts: Vec::new(),
        }
    }

    /// Assemble samples from arrays with one seconds word per sample (XCET readout)
    pub fn from_flat(seconds: &[i64], coarse: &[i64], frac: &[i64]) -> Self {
        let n_samples = seconds.len().min(coarse.len()).min(frac.len());
        let samples = (0..n_samples)
            .map(|idx| Timestamp::new(seconds[idx], coarse[idx], frac[idx]))
            .collect();
        Self {
            samples,
            counts: Vec::new(),
        }
    }

    pub fn with_counts(mut self, counts: Vec<i64>) -> Self {
        self.counts = counts;
        self
    }

    /// Iterate over samples up to (not including) the first sentinel
    pub fn valid(&self) -> impl Iterator<Item = &Timestamp> {
        self.samples.iter().take_while(|ts| !ts.is_sentinel())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
