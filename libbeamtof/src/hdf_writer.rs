use hdf5::types::VarLenUnicode;
use hdf5::File;
use std::path::Path;
use std::str::FromStr;

use super::config::AnalysisWindow;
use super::error::OutputError;
use super::histogram::{Histogram1D, Histogram2D};

const COUNTS_NAME: &str = "counts";
const EDGES_NAME: &str = "edges";
const X_EDGES_NAME: &str = "x_edges";
const Y_EDGES_NAME: &str = "y_edges";
/// This is the version of the output format
const FORMAT_VERSION: &str = "1.0";

fn unicode(value: &str) -> Result<VarLenUnicode, OutputError> {
    VarLenUnicode::from_str(value).map_err(|_| OutputError::BadString(value.to_string()))
}

/// A thin wrapper around hdf5-rust for storing the histograms of each window.
///
/// Structure
/// window_tag - label, t0, t1, n_tofs
/// |---- histogram_name - title, underflow, overflow, mean, rms
/// |    |---- counts(dset)
/// |    |---- edges(dset)
/// |---- histogram2d_name - outside
/// |    |---- counts(dset)
/// |    |---- x_edges(dset)
/// |    |---- y_edges(dset)
#[derive(Debug)]
pub struct HDFWriter {
    file_handle: File,
    n_windows: u64,
}

impl HDFWriter {
    pub fn new(path: &Path) -> Result<Self, OutputError> {
        let file_handle = File::create(path)?;
        let version = format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION);
        file_handle
            .new_attr::<VarLenUnicode>()
            .create("version")?
            .write_scalar(&unicode(&version)?)?;
        file_handle.new_attr::<u64>().create("n_windows")?;
        Ok(Self {
            file_handle,
            n_windows: 0,
        })
    }

    /// Write the histograms of a window into a group named after the window
    pub fn write_window(
        &mut self,
        window: &AnalysisWindow,
        n_tofs: usize,
        hists: &[&Histogram1D],
        hists_2d: &[&Histogram2D],
    ) -> Result<(), OutputError> {
        let group = self.file_handle.create_group(&window.file_tag())?;
        for (name, value) in [("label", &window.label), ("t0", &window.t0), ("t1", &window.t1)] {
            group
                .new_attr::<VarLenUnicode>()
                .create(name)?
                .write_scalar(&unicode(value)?)?;
        }
        group
            .new_attr::<u64>()
            .create("n_tofs")?
            .write_scalar(&(n_tofs as u64))?;

        for hist in hists {
            let hist_group = group.create_group(&hist.name)?;
            hist_group
                .new_dataset_builder()
                .with_data(hist.counts())
                .create(COUNTS_NAME)?;
            hist_group
                .new_dataset_builder()
                .with_data(hist.axis.edges().as_slice())
                .create(EDGES_NAME)?;
            hist_group
                .new_attr::<VarLenUnicode>()
                .create("title")?
                .write_scalar(&unicode(&hist.title)?)?;
            hist_group
                .new_attr::<u64>()
                .create("underflow")?
                .write_scalar(&hist.underflow())?;
            hist_group
                .new_attr::<u64>()
                .create("overflow")?
                .write_scalar(&hist.overflow())?;
            hist_group
                .new_attr::<f64>()
                .create("mean")?
                .write_scalar(&hist.mean())?;
            hist_group
                .new_attr::<f64>()
                .create("rms")?
                .write_scalar(&hist.rms())?;
        }

        for hist in hists_2d {
            let hist_group = group.create_group(&hist.name)?;
            hist_group
                .new_dataset_builder()
                .with_data(hist.counts())
                .create(COUNTS_NAME)?;
            hist_group
                .new_dataset_builder()
                .with_data(hist.x_axis.edges().as_slice())
                .create(X_EDGES_NAME)?;
            hist_group
                .new_dataset_builder()
                .with_data(hist.y_axis.edges().as_slice())
                .create(Y_EDGES_NAME)?;
            hist_group
                .new_attr::<u64>()
                .create("outside")?
                .write_scalar(&hist.outside())?;
        }
        self.n_windows += 1;
        Ok(())
    }

    pub fn close(self) -> Result<(), OutputError> {
        self.file_handle
            .attr("n_windows")?
            .write_scalar(&self.n_windows)?;
        log::info!("{} windows written to HDF5.", self.n_windows);
        Ok(())
    }
}
