use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::beam_info::{BeamInfo, BEAM_INFO_CSV_HEADER};
use super::error::OutputError;
use super::histogram::{Histogram1D, Histogram2D};
use super::ifbeam::DeviceClocks;
use super::timber::TimberRow;

/// Statistics of a histogram, for the YAML summaries
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistogramSummary {
    pub name: String,
    pub title: String,
    pub bins: usize,
    pub min: f64,
    pub max: f64,
    pub entries: u64,
    pub underflow: u64,
    pub overflow: u64,
    pub mean: f64,
    pub rms: f64,
}

impl From<&Histogram1D> for HistogramSummary {
    fn from(hist: &Histogram1D) -> Self {
        Self {
            name: hist.name.clone(),
            title: hist.title.clone(),
            bins: hist.axis.bins,
            min: hist.axis.min,
            max: hist.axis.max,
            entries: hist.entries(),
            underflow: hist.underflow(),
            overflow: hist.overflow(),
            mean: hist.mean(),
            rms: hist.rms(),
        }
    }
}

fn create(path: &Path) -> Result<BufWriter<File>, OutputError> {
    Ok(BufWriter::new(File::create(path)?))
}

pub fn write_beam_infos(path: &Path, infos: &[BeamInfo]) -> Result<(), OutputError> {
    let mut writer = create(path)?;
    writeln!(writer, "{BEAM_INFO_CSV_HEADER}")?;
    for info in infos {
        writeln!(writer, "{}", info.to_csv_row())?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the bins of a histogram as `bin_low,bin_high,count`
pub fn write_histogram(path: &Path, hist: &Histogram1D) -> Result<(), OutputError> {
    let mut writer = create(path)?;
    writeln!(writer, "bin_low,bin_high,count")?;
    for (idx, count) in hist.counts().iter().enumerate() {
        writeln!(
            writer,
            "{},{},{}",
            hist.axis.low_edge(idx),
            hist.axis.low_edge(idx + 1),
            count
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Write several labelled histograms into one long format table, for overlays
pub fn write_histogram_overlay(
    path: &Path,
    hists: &[(&str, &Histogram1D)],
) -> Result<(), OutputError> {
    let mut writer = create(path)?;
    writeln!(writer, "label,bin_low,bin_high,count")?;
    for (label, hist) in hists {
        for (idx, count) in hist.counts().iter().enumerate() {
            writeln!(
                writer,
                "{},{},{},{}",
                label.replace(',', ";"),
                hist.axis.low_edge(idx),
                hist.axis.low_edge(idx + 1),
                count
            )?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn write_histogram_2d(path: &Path, hist: &Histogram2D) -> Result<(), OutputError> {
    let mut writer = create(path)?;
    writeln!(writer, "x_low,x_high,y_low,y_high,count")?;
    for ((ix, iy), count) in hist.counts().indexed_iter() {
        writeln!(
            writer,
            "{},{},{},{},{}",
            hist.x_axis.low_edge(ix),
            hist.x_axis.low_edge(ix + 1),
            hist.y_axis.low_edge(iy),
            hist.y_axis.low_edge(iy + 1),
            count
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the clock columns side by side, padding short columns with empty fields
pub fn write_clocks(path: &Path, clocks: &DeviceClocks) -> Result<usize, OutputError> {
    let mut writer = create(path)?;
    writeln!(writer, "seconds_clock,coarse_clock,frac_clock")?;
    let n_rows = clocks.n_rows();
    let field = |column: &[String], idx: usize| column.get(idx).cloned().unwrap_or_default();
    for idx in 0..n_rows {
        writeln!(
            writer,
            "{},{},{}",
            field(&clocks.seconds, idx),
            field(&clocks.coarse, idx),
            field(&clocks.frac, idx)
        )?;
    }
    writer.flush()?;
    Ok(n_rows)
}

pub fn write_timber_rows(
    path: &Path,
    primary_name: &str,
    secondary_name: &str,
    rows: &[TimberRow],
) -> Result<(), OutputError> {
    let mut writer = create(path)?;
    writeln!(
        writer,
        "LOG_TIMESTAMP,{secondary_name},{primary_name},UTC_DATE,LOCAL_DATE"
    )?;
    for row in rows {
        let secondary = row.secondary.map(|v| v.to_string()).unwrap_or_default();
        writeln!(
            writer,
            "{},{},{},{},{}",
            row.log_timestamp, secondary, row.primary, row.utc_date, row.local_date
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Serialize anything to a YAML file
pub fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<(), OutputError> {
    let mut file = File::create(path)?;
    file.write_all(serde_yaml::to_string(value)?.as_bytes())?;
    Ok(())
}
