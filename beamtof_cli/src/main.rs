use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use simplelog::{ColorChoice, LevelFilter, SharedLogger, TerminalMode};
use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use libbeamtof::beam_event::{compare_runs, read_beam_events, run_number_from_path, BeamEventSummary};
use libbeamtof::config::Config;
use libbeamtof::constants::{
    DEFAULT_LOCAL_TIMEZONE, IFBEAM_DEFAULT_EVENT, IFBEAM_DEFAULT_URL, TIMBER_PRIMARY_VAR,
    TIMBER_SECONDARY_VAR, TOF_PREFIX, TOF_UPSTREAM_A,
};
use libbeamtof::histogram::Histogram1D;
use libbeamtof::ifbeam::{fetch_device_clocks, IfBeamClient};
use libbeamtof::output::{
    write_clocks, write_histogram, write_histogram_overlay, write_timber_rows, write_yaml,
    HistogramSummary,
};
use libbeamtof::process::{create_subsets, process_subset, write_combined_outputs};
use libbeamtof::timber::{build_rows, LoggedSeries};
use libbeamtof::worker_status::WorkerStatus;

type CliResult = Result<(), Box<dyn Error>>;

const LOG_FILE: &str = "beamtof.log";
const CLOCK_TIMEOUT_SECS: u64 = 60;

fn make_template_config(path: &Path) -> CliResult {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config)?;
    let mut file = File::create(path)?;
    file.write_all(yaml_str.as_bytes())?;
    Ok(())
}

fn path_arg(id: &'static str, short: char, help: &'static str) -> Arg {
    Arg::new(id)
        .short(short)
        .long(id)
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help(help)
}

fn get_path<'a>(args: &'a ArgMatches, id: &str) -> Result<&'a PathBuf, Box<dyn Error>> {
    args.get_one::<PathBuf>(id)
        .ok_or_else(|| format!("Missing required argument {id}").into())
}

fn get_string<'a>(args: &'a ArgMatches, id: &str) -> Result<&'a String, Box<dyn Error>> {
    args.get_one::<String>(id)
        .ok_or_else(|| format!("Missing required argument {id}").into())
}

fn cli() -> Command {
    Command::new("beamtof")
        .about("Time of flight and beam instrumentation analysis for the ProtoDUNE beamline")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("new")
                .about("Make a template configuration yaml file")
                .arg(path_arg("path", 'p', "Path to the file")),
        )
        .subcommand(
            Command::new("tof")
                .about("Run the TOF analysis described by a configuration file")
                .arg(path_arg("path", 'p', "Path to the configuration file")),
        )
        .subcommand(
            Command::new("clock")
                .about("Dump the IFBeam clock values of a TOF counter to CSV")
                .arg(Arg::new("t0").long("t0").required(true).help("Start of the time range"))
                .arg(Arg::new("t1").long("t1").required(true).help("End of the time range"))
                .arg(path_arg("output", 'o', "Path to the output CSV"))
                .arg(
                    Arg::new("event")
                        .short('e')
                        .long("event")
                        .default_value(IFBEAM_DEFAULT_EVENT)
                        .help("IFBeam event"),
                )
                .arg(
                    Arg::new("device")
                        .short('d')
                        .long("device")
                        .default_value(TOF_UPSTREAM_A)
                        .help("TOF counter device name"),
                )
                .arg(
                    Arg::new("url")
                        .long("url")
                        .default_value(IFBEAM_DEFAULT_URL)
                        .help("IFBeam data endpoint"),
                ),
        )
        .subcommand(
            Command::new("timber")
                .about("Align two TIMBER exports in time and convert the timestamps to dates")
                .arg(path_arg("primary", 'a', "CSV export of the primary variable"))
                .arg(path_arg("secondary", 'b', "CSV export of the secondary variable"))
                .arg(
                    Arg::new("primary-name")
                        .long("primary-name")
                        .default_value(TIMBER_PRIMARY_VAR)
                        .help("Column name of the primary variable"),
                )
                .arg(
                    Arg::new("secondary-name")
                        .long("secondary-name")
                        .default_value(TIMBER_SECONDARY_VAR)
                        .help("Column name of the secondary variable"),
                )
                .arg(path_arg("output", 'o', "Path to the output CSV"))
                .arg(
                    Arg::new("timezone")
                        .long("timezone")
                        .default_value(DEFAULT_LOCAL_TIMEZONE)
                        .help("IANA time zone of the local dates"),
                ),
        )
        .subcommand(
            Command::new("beaminst")
                .about("Summarize a beam instrumentation event dump")
                .arg(path_arg("input", 'i', "Path to the event dump CSV"))
                .arg(path_arg("output", 'o', "Directory for the histogram tables"))
                .arg(Arg::new("title").long("title").help("Title of the TOF histogram")),
        )
        .subcommand(
            Command::new("compare")
                .about("Overlay the TOF distributions of several event dumps")
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .required(true)
                        .num_args(1..)
                        .action(ArgAction::Append)
                        .value_parser(value_parser!(PathBuf))
                        .help("Event dump CSVs, the run number is the name suffix after the last _"),
                )
                .arg(path_arg("output", 'o', "Path to the output CSV")),
        )
}

/// Terminal logging plus a debug log file, routed through the progress bars
fn init_logging(pb_manager: &MultiProgress) -> Result<(), log::SetLoggerError> {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![simplelog::TermLogger::new(
        LevelFilter::Info,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    match File::create(LOG_FILE) {
        Ok(file) => loggers.push(simplelog::WriteLogger::new(
            LevelFilter::Debug,
            simplelog::Config::default(),
            file,
        )),
        Err(e) => eprintln!("Could not create log file {LOG_FILE}: {e}"),
    }
    let logger = simplelog::CombinedLogger::new(loggers);
    LogWrapper::new(pb_manager.clone(), logger).try_init()
}

fn run_tof(config_path: &Path, pb_manager: &MultiProgress) -> CliResult {
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = Config::read_config_file(config_path)?;
    config.validate()?;
    log::info!("Config successfully loaded.");
    log::info!("IFBeam URL: {}", config.ifbeam_url);
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    for window in config.windows.iter() {
        log::info!("Window {}: {} -> {}", window.label, window.t0, window.t1);
    }
    log::info!("Number of workers: {}", config.n_threads);

    let style = ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")?;
    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    let mut bars = Vec::new();
    let mut handles = Vec::new();
    for (worker_id, subset) in create_subsets(&config).into_iter().enumerate() {
        if subset.is_empty() {
            continue;
        }
        let bar = pb_manager.add(ProgressBar::new(100).with_style(style.clone()));
        bars.push((worker_id, bar));
        let worker_config = config.clone();
        let worker_tx = tx.clone();
        handles.push(std::thread::spawn(move || {
            process_subset(worker_config, worker_tx, worker_id, subset)
        }));
    }
    drop(tx);

    // Ends once every worker has dropped its sender
    for status in rx.iter() {
        if let Some((_, bar)) = bars.iter().find(|(id, _)| *id == status.worker_id) {
            bar.set_position((status.progress * 100.0) as u64);
            bar.set_message(format!(
                "{} ({})",
                config.windows[status.window_index].label, status.stage
            ));
        }
    }

    let mut results = Vec::new();
    let mut n_failed = 0;
    for handle in handles {
        match handle.join() {
            Ok(Ok(mut worker_results)) => results.append(&mut worker_results),
            Ok(Err(e)) => {
                log::error!("Processing failed with error: {e}");
                n_failed += 1;
            }
            Err(_) => {
                log::error!("Failed to join processing task!");
                n_failed += 1;
            }
        }
    }
    for (_, bar) in bars {
        bar.finish();
    }

    if !results.is_empty() {
        write_combined_outputs(&config, &results)?;
    }
    if n_failed > 0 {
        return Err(format!("{n_failed} worker(s) failed").into());
    }
    log::info!("Successfully processed {} window(s)!", results.len());
    Ok(())
}

fn run_clock(args: &ArgMatches) -> CliResult {
    let t0 = get_string(args, "t0")?;
    let t1 = get_string(args, "t1")?;
    let output = get_path(args, "output")?;
    let prefix = format!("{TOF_PREFIX}/{}", get_string(args, "device")?);
    let mut client = IfBeamClient::new(
        get_string(args, "url")?,
        get_string(args, "event")?,
        Duration::from_secs(CLOCK_TIMEOUT_SECS),
    );
    log::info!("Fetching clock values of {prefix}...");
    let clocks = fetch_device_clocks(&mut client, &prefix, t0, t1)?;
    let n_rows = write_clocks(output, &clocks)?;
    log::info!("Clock values saved to {} ({n_rows} rows).", output.display());
    Ok(())
}

fn run_timber(args: &ArgMatches) -> CliResult {
    let primary_name = get_string(args, "primary-name")?;
    let secondary_name = get_string(args, "secondary-name")?;
    let output = get_path(args, "output")?;
    let timezone = get_string(args, "timezone")?;

    let primary = LoggedSeries::read_csv(primary_name, get_path(args, "primary")?)?;
    let secondary = LoggedSeries::read_csv(secondary_name, get_path(args, "secondary")?)?;
    log::info!(
        "Read {} samples of {primary_name} and {} samples of {secondary_name}",
        primary.samples.len(),
        secondary.samples.len()
    );
    if secondary.is_empty() {
        log::warn!("{secondary_name} has no samples, its column will be empty");
    }
    let (_, rows) = build_rows(&primary, &secondary, timezone)?;
    write_timber_rows(output, primary_name, secondary_name, &rows)?;
    log::info!("Saved {} aligned rows to {}", rows.len(), output.display());
    Ok(())
}

fn run_beaminst(args: &ArgMatches) -> CliResult {
    let input = get_path(args, "input")?;
    let output = get_path(args, "output")?;
    let title = match args.get_one::<String>("title") {
        Some(title) => title.clone(),
        None => format!("Run {}", run_number_from_path(input)),
    };

    let events = read_beam_events(input)?;
    let summary = BeamEventSummary::from_events(&title, &events)?;
    log::info!(
        "{} of {} events pass the TOF cut",
        summary.n_selected,
        summary.n_events
    );
    log::info!("TOF RMS = {:.2} ns", summary.tof.rms());

    std::fs::create_dir_all(output)?;
    for hist in summary.histograms() {
        write_histogram(&output.join(format!("{}.csv", hist.name)), hist)?;
    }
    let stats: Vec<HistogramSummary> = summary
        .histograms()
        .into_iter()
        .map(HistogramSummary::from)
        .collect();
    write_yaml(&output.join("summary.yml"), &stats)?;
    log::info!("Histograms saved to {}", output.display());
    Ok(())
}

fn run_compare(args: &ArgMatches) -> CliResult {
    let inputs: Vec<&Path> = args
        .get_many::<PathBuf>("input")
        .ok_or("Missing required argument input")?
        .map(|p| p.as_path())
        .collect();
    let output = get_path(args, "output")?;
    let hists = compare_runs(&inputs)?;
    let overlay: Vec<(&str, &Histogram1D)> =
        hists.iter().map(|(run, hist)| (run.as_str(), hist)).collect();
    write_histogram_overlay(output, &overlay)?;
    log::info!("Comparison of {} runs saved to {}", hists.len(), output.display());
    Ok(())
}

fn main() {
    let matches = cli().get_matches();

    // Initialize feedback
    let pb_manager = MultiProgress::new();
    if let Err(e) = init_logging(&pb_manager) {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }

    let result = match matches.subcommand() {
        Some(("new", args)) => get_path(args, "path").and_then(|path| {
            log::info!("Making a template config at {}...", path.to_string_lossy());
            make_template_config(path)
        }),
        Some(("tof", args)) => get_path(args, "path").and_then(|path| run_tof(path, &pb_manager)),
        Some(("clock", args)) => run_clock(args),
        Some(("timber", args)) => run_timber(args),
        Some(("beaminst", args)) => run_beaminst(args),
        Some(("compare", args)) => run_compare(args),
        _ => Ok(()),
    };

    if let Err(e) = result {
        log::error!("{e}");
        std::process::exit(1);
    }
    log::info!("Done.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn test_compare_takes_many_inputs() {
        let matches = cli()
            .try_get_matches_from(["beamtof", "compare", "-i", "a_1.csv", "b_2.csv", "-o", "out.csv"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "compare");
        assert_eq!(args.get_many::<PathBuf>("input").unwrap().count(), 2);
    }

    #[test]
    fn test_timber_defaults() {
        let matches = cli()
            .try_get_matches_from(["beamtof", "timber", "-a", "p.csv", "-b", "s.csv", "-o", "o.csv"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(get_string(args, "timezone").unwrap(), "Europe/Zurich");
        assert_eq!(get_string(args, "primary-name").unwrap(), "SPS.T2:INTENSITY");
        assert_eq!(
            get_string(args, "secondary-name").unwrap(),
            "XTIM.SX.WE-CT:Acquisition:acqC"
        );
    }

    #[test]
    fn test_template_config_loads() {
        let path = std::env::temp_dir().join("beamtof_template_config.yml");
        make_template_config(&path).unwrap();
        let config = Config::read_config_file(&path).unwrap();
        assert_eq!(config.windows.len(), 1);
    }
}
