//! # beamtof
//!
//! beamtof reconstructs the time of flight (TOF) of beam particles at the ProtoDUNE
//! beamline, written in Rust. It queries the IFBeam instrumentation database for the
//! timestamps of the general trigger and the four TOF counters, matches them inside
//! nanosecond coincidence windows, and combines the resulting TOF values with the
//! Cherenkov counter and beam momentum readings of the same time window. The results
//! are written as CSV tables of the beam information and binned histograms (optionally
//! HDF5), which any plotting tool can render.
//!
//! Alongside the TOF analysis the library can align two TIMBER logging exports in time,
//! summarize offline beam event dumps, and compare the TOF distributions of several runs.
//!
//! ## Installation
//!
//! The only method of install is from source. If you have not used Rust before, see the
//! [Rust docs](https://www.rust-lang.org/tools/install) for installing the tool chain.
//!
//! To build and install the CLI use `cargo install --path ./beamtof_cli` from the top
//! level repository. HDF5 output is behind the `hdf5` feature
//! (`cargo install --path ./beamtof_cli --features hdf5`), which requires an HDF5
//! installation the hdf5 crate can find (set `HDF5_DIR` otherwise).
//!
//! ## Configuration
//!
//! Analyses are described by a YAML file. Generate a template with `beamtof new -p config.yml`.
//!
//! - ifbeam_url: The IFBeam data endpoint
//! - event: The IFBeam event (`z,pdune` for ProtoDUNE)
//! - request_timeout_secs: Timeout of a single IFBeam request
//! - output_path: Directory the outputs are written to. Each window gets a sub directory
//! - windows: List of analysis windows, each a label with a t0 and t1 handed to IFBeam
//! - tof: Coincidence windows of the matcher. `downstream_to_trigger_ns` bounds the
//!   trigger - downstream delta, `upstream_to_downstream_ns` bounds the TOF itself.
//!   `trigger_offset` shifts the trigger by a number of coarse ticks.
//!   `sorted_early_exit` stops a scan as soon as a delta turns negative and includes
//!   both edges of the downstream window
//! - fetch_cherenkov, fetch_xcet, fetch_momentum: Which auxiliary readings to fetch
//! - cherenkov_devices: The high and low pressure Cherenkov counters
//! - xcet_window_ns: How close an XCET timestamp must be to the trigger to count as a match
//! - histograms: Bins and ranges of the histograms. A missing range uses the data range
//! - write_hdf5: Also write the histograms of each window to HDF5
//! - n_threads: Number of workers the windows are divided among
//!
//! ## Output
//!
//! For each window the output directory holds `beam_info.csv` (one row per TOF), one
//! `bin_low,bin_high,count` table per histogram, `tof_vs_momentum.csv` and a
//! `summary.yml`. The TOF histograms of all windows are overlaid in
//! `tof_all_windows.csv` next to a `run_summary.yml`.
pub mod beam_event;
pub mod beam_info;
pub mod config;
pub mod constants;
pub mod error;
#[cfg(feature = "hdf5")]
pub mod hdf_writer;
pub mod histogram;
pub mod ifbeam;
pub mod output;
pub mod process;
pub mod timber;
pub mod timestamp;
pub mod tof;
pub mod worker_status;
