use ndarray::Array2;

use super::config::HistogramSpec;
use super::error::HistogramError;

/// Uniform binning over [min, max]. The upper edge belongs to the last bin.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    pub bins: usize,
    pub min: f64,
    pub max: f64,
}

impl Axis {
    pub fn new(name: &str, bins: usize, min: f64, max: f64) -> Result<Self, HistogramError> {
        if bins == 0 {
            return Err(HistogramError::NoBins(name.to_string()));
        }
        if min >= max || !min.is_finite() || !max.is_finite() {
            return Err(HistogramError::BadRange {
                name: name.to_string(),
                min,
                max,
            });
        }
        Ok(Self { bins, min, max })
    }

    /// Build the axis of a spec, falling back to the range of the data when the spec has
    /// none. Empty data gives [0, 1], a single value v gives [v - 0.5, v + 0.5].
    pub fn from_spec(name: &str, spec: &HistogramSpec, values: &[f64]) -> Result<Self, HistogramError> {
        let (min, max) = match spec.range {
            Some(range) => range,
            None => data_range(values),
        };
        Self::new(name, spec.bins, min, max)
    }

    pub fn width(&self) -> f64 {
        (self.max - self.min) / self.bins as f64
    }

    pub fn index(&self, value: f64) -> Option<usize> {
        if value < self.min || value > self.max || value.is_nan() {
            return None;
        }
        let idx = ((value - self.min) / self.width()) as usize;
        Some(idx.min(self.bins - 1))
    }

    pub fn low_edge(&self, idx: usize) -> f64 {
        self.min + idx as f64 * self.width()
    }

    pub fn center(&self, idx: usize) -> f64 {
        self.low_edge(idx) + 0.5 * self.width()
    }

    /// All bins + 1 edges
    pub fn edges(&self) -> Vec<f64> {
        linspace(self.min, self.max, self.bins + 1)
    }
}

/// `n` evenly spaced points from min to max, both included
pub fn linspace(min: f64, max: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![min],
        _ => {
            let step = (max - min) / (n - 1) as f64;
            (0..n)
                .map(|idx| if idx == n - 1 { max } else { min + idx as f64 * step })
                .collect()
        }
    }
}

fn data_range(values: &[f64]) -> (f64, f64) {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if min > max {
        (0.0, 1.0)
    } else if min == max {
        (min - 0.5, max + 0.5)
    } else {
        (min, max)
    }
}

/// A one dimensional histogram with running statistics, the equivalent of a TH1
#[derive(Debug, Clone)]
pub struct Histogram1D {
    pub name: String,
    pub title: String,
    pub axis: Axis,
    counts: Vec<u64>,
    underflow: u64,
    overflow: u64,
    sum: f64,
    sum_sq: f64,
}

impl Histogram1D {
    pub fn new(name: &str, bins: usize, min: f64, max: f64) -> Result<Self, HistogramError> {
        Ok(Self::with_axis(name, Axis::new(name, bins, min, max)?))
    }

    /// Build and fill a histogram from a spec in one go
    pub fn from_spec(
        name: &str,
        spec: &HistogramSpec,
        values: &[f64],
    ) -> Result<Self, HistogramError> {
        let mut hist = Self::with_axis(name, Axis::from_spec(name, spec, values)?);
        hist.fill_all(values);
        Ok(hist)
    }

    fn with_axis(name: &str, axis: Axis) -> Self {
        Self {
            name: name.to_string(),
            title: name.to_string(),
            counts: vec![0; axis.bins],
            axis,
            underflow: 0,
            overflow: 0,
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn fill(&mut self, value: f64) {
        match self.axis.index(value) {
            Some(idx) => {
                self.counts[idx] += 1;
                self.sum += value;
                self.sum_sq += value * value;
            }
            None if value < self.axis.min => self.underflow += 1,
            None => self.overflow += 1,
        }
    }

    pub fn fill_all(&mut self, values: &[f64]) {
        for v in values {
            self.fill(*v);
        }
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn underflow(&self) -> u64 {
        self.underflow
    }

    pub fn overflow(&self) -> u64 {
        self.overflow
    }

    /// Number of fills in range
    pub fn integral(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Number of fills, including under and overflow
    pub fn entries(&self) -> u64 {
        self.integral() + self.underflow + self.overflow
    }

    pub fn max_count(&self) -> u64 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Mean of the in-range values
    pub fn mean(&self) -> f64 {
        let n = self.integral();
        if n == 0 {
            return 0.0;
        }
        self.sum / n as f64
    }

    /// Standard deviation of the in-range values (what ROOT calls the RMS)
    pub fn rms(&self) -> f64 {
        let n = self.integral();
        if n == 0 {
            return 0.0;
        }
        let mean = self.mean();
        (self.sum_sq / n as f64 - mean * mean).max(0.0).sqrt()
    }
}

/// A two dimensional histogram, x along rows and y along columns of the count matrix
#[derive(Debug, Clone)]
pub struct Histogram2D {
    pub name: String,
    pub x_axis: Axis,
    pub y_axis: Axis,
    counts: Array2<u64>,
    outside: u64,
}

impl Histogram2D {
    pub fn new(name: &str, x_axis: Axis, y_axis: Axis) -> Self {
        Self {
            name: name.to_string(),
            counts: Array2::zeros((x_axis.bins, y_axis.bins)),
            x_axis,
            y_axis,
            outside: 0,
        }
    }

    pub fn from_specs(
        name: &str,
        x_spec: &HistogramSpec,
        y_spec: &HistogramSpec,
        values: &[(f64, f64)],
    ) -> Result<Self, HistogramError> {
        let xs: Vec<f64> = values.iter().map(|v| v.0).collect();
        let ys: Vec<f64> = values.iter().map(|v| v.1).collect();
        let mut hist = Self::new(
            name,
            Axis::from_spec(name, x_spec, &xs)?,
            Axis::from_spec(name, y_spec, &ys)?,
        );
        for (x, y) in values {
            hist.fill(*x, *y);
        }
        Ok(hist)
    }

    pub fn fill(&mut self, x: f64, y: f64) {
        match (self.x_axis.index(x), self.y_axis.index(y)) {
            (Some(ix), Some(iy)) => self.counts[[ix, iy]] += 1,
            _ => self.outside += 1,
        }
    }

    pub fn counts(&self) -> &Array2<u64> {
        &self.counts
    }

    pub fn outside(&self) -> u64 {
        self.outside
    }

    pub fn integral(&self) -> u64 {
        self.counts.sum()
    }
}
