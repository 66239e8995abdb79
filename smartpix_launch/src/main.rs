use clap::{value_parser, Arg, ArgMatches, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use simplelog::{CombinedLogger, SharedLogger, TermLogger, WriteLogger};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc::channel;

use libsmartpix_sim::batch::{read_job_file, SbatchSubmitter};
use libsmartpix_sim::config::{ExecutionMode, LaunchConfig};
use libsmartpix_sim::launch::{Launch, LaunchSummary};
use libsmartpix_sim::runner::run_job;
use libsmartpix_sim::worker_status::{JobState, WorkerStatus};

const LOG_FILE: &str = "smartpix_launch.log";

fn cli() -> Command {
    Command::new("smartpix_launch")
        .about("Sweep the smart pixel simulation chain over pTHat bins")
        .subcommand(
            Command::new("new")
                .about("Make a template configuration yaml file")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path of the template to write"),
                ),
        )
        .subcommand(
            Command::new("run-job")
                .about("Run a single serialized job; used by batch scripts")
                .arg(
                    Arg::new("job")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to a job_<index>.yml file"),
                ),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("YAML configuration; flags override its values"),
        )
        .arg(
            Arg::new("out_dir")
                .short('o')
                .long("out-dir")
                .value_parser(value_parser!(PathBuf))
                .help("Output directory for the simulation files"),
        )
        .arg(
            Arg::new("ncpu")
                .short('j')
                .long("ncpu")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(i32))
                .help("Number of local workers, -1 for all cores [default: 4]"),
        )
        .arg(
            Arg::new("max_events")
                .short('n')
                .long("max-events")
                .value_parser(value_parser!(u64))
                .help("Number of events to generate per bin [default: 1000]"),
        )
        .arg(
            Arg::new("pixelav_dir")
                .short('p')
                .long("pixelav-dir")
                .value_parser(value_parser!(PathBuf))
                .help("Directory PixelAV is run from"),
        )
        .arg(
            Arg::new("mode")
                .long("mode")
                .value_parser(["local", "slurm"])
                .help("Where to run the jobs [default: local]"),
        )
        .arg(
            Arg::new("query")
                .long("query")
                .value_parser(value_parser!(PathBuf))
                .help("Batch query file (YAML or JSON), required for slurm mode"),
        )
        .arg(
            Arg::new("njobs")
                .long("njobs")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(i32))
                .help("Maximum number of batch jobs to submit, -1 for all [default: -1]"),
        )
}

fn init_logging(log_file: Option<&Path>) -> MultiProgress {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )];
    let mut file_error = None;
    if let Some(path) = log_file {
        match File::create(path) {
            Ok(file) => loggers.push(WriteLogger::new(
                simplelog::LevelFilter::Debug,
                simplelog::Config::default(),
                file,
            )),
            Err(e) => file_error = Some(e),
        }
    }

    let pb_manager = MultiProgress::new();
    if let Err(e) = LogWrapper::new(pb_manager.clone(), CombinedLogger::new(loggers)).try_init() {
        eprintln!("Could not create logging/progress: {e}");
    }
    log::set_max_level(if log_file.is_some() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });
    if let Some(e) = file_error {
        log::warn!("Could not open log file, logging to terminal only: {e}");
    }
    pb_manager
}

/// Fold the command line flags over the config file (or the defaults)
fn load_config(matches: &ArgMatches) -> Result<LaunchConfig, String> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => {
            log::info!("Loading config from {}...", path.display());
            LaunchConfig::read_config_file(path).map_err(|e| e.to_string())?
        }
        None => LaunchConfig::default(),
    };
    if let Some(out_dir) = matches.get_one::<PathBuf>("out_dir") {
        config.out_dir = out_dir.clone();
    }
    if let Some(n_cpu) = matches.get_one::<i32>("ncpu") {
        config.n_cpu = *n_cpu;
    }
    if let Some(max_events) = matches.get_one::<u64>("max_events") {
        config.max_events = *max_events;
    }
    if let Some(pixelav_dir) = matches.get_one::<PathBuf>("pixelav_dir") {
        config.pixelav_dir = pixelav_dir.clone();
    }
    if let Some(mode) = matches.get_one::<String>("mode") {
        config.mode = mode.parse::<ExecutionMode>().map_err(|e| e.to_string())?;
    }
    if let Some(query) = matches.get_one::<PathBuf>("query") {
        config.query_path = Some(query.clone());
    }
    if let Some(n_jobs) = matches.get_one::<i32>("njobs") {
        config.n_jobs = *n_jobs;
    }
    Ok(config)
}

fn make_template_config(path: &Path) -> ExitCode {
    log::info!("Making a template config at {}...", path.display());
    match LaunchConfig::default().write_config_file(path) {
        Ok(()) => {
            log::info!("Done.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run_single_job(path: &Path) -> ExitCode {
    let job = match read_job_file(path) {
        Ok(job) => job,
        Err(e) => {
            log::error!("Could not load job {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };
    log::info!(
        "Running job for bin {} ({} commands)",
        job.bin.index,
        job.commands.len()
    );
    let report = run_job(&job, None, 0);
    if report.is_success() {
        log::info!("Job for bin {} finished.", job.bin.index);
        ExitCode::SUCCESS
    } else {
        log::error!(
            "Job for bin {} had {} failed commands",
            job.bin.index,
            report.n_failed()
        );
        ExitCode::FAILURE
    }
}

fn launch(config: LaunchConfig, pb_manager: &MultiProgress) -> ExitCode {
    log::info!("Output directory: {}", config.out_dir.display());
    log::info!("Execution mode: {}", config.mode);
    log::info!("Events per bin: {}", config.max_events);
    log::info!(
        "pTHat scan: {} to {} in {} points",
        config.scan_start,
        config.scan_stop,
        config.scan_points
    );

    let launch = match Launch::new(&config) {
        Ok(l) => l,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let worker_exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            log::error!("Could not locate the launcher executable: {e}");
            return ExitCode::FAILURE;
        }
    };

    let n_jobs = launch.jobs.len() as u64;
    let local_workers = launch.backend.local_workers();
    let n_workers = local_workers.unwrap_or(0);
    // Batch jobs run after the launcher exits, so only local runs get a total bar
    let total_pb = local_workers.map(|_| pb_manager.add(ProgressBar::new(n_jobs)));
    let worker_pbs: Vec<ProgressBar> = (0..n_workers)
        .map(|id| {
            let pb = pb_manager.add(ProgressBar::new(100));
            pb.set_style(
                ProgressStyle::with_template("worker {prefix} [{bar:40}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            pb.set_prefix(id.to_string());
            pb
        })
        .collect();

    let (tx, rx) = channel::<WorkerStatus>();
    let handle = std::thread::spawn(move || launch.run(Some(tx), &worker_exe, SbatchSubmitter));

    // The channel closes once the pool (or the batch executor) is done with the sender
    for status in rx.iter() {
        if let Some(pb) = worker_pbs.get(status.worker_id) {
            pb.set_position((status.progress * 100.0) as u64);
            pb.set_message(format!("bin {} {:?}", status.bin_index, status.state));
        }
        if let Some(total_pb) = total_pb.as_ref() {
            if matches!(status.state, JobState::Finished | JobState::Failed) {
                total_pb.inc(1);
            }
        }
    }

    for pb in worker_pbs.iter() {
        pb.finish_and_clear();
    }
    if let Some(total_pb) = total_pb {
        total_pb.finish();
    }

    match handle.join() {
        Ok(Ok(LaunchSummary::Local { reports })) => {
            let n_failed = reports.iter().filter(|r| !r.is_success()).count();
            log::info!(
                "Completed {} jobs locally, {} with failures",
                reports.len(),
                n_failed
            );
            ExitCode::SUCCESS
        }
        Ok(Ok(LaunchSummary::Batch {
            folder,
            submitted,
            skipped,
        })) => {
            for job in submitted.iter() {
                log::info!("Bin {} submitted as job {}", job.bin_index, job.job_id);
            }
            log::info!(
                "Submitted {} jobs ({} skipped), run folder {}",
                submitted.len(),
                skipped,
                folder.display()
            );
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
        Err(_) => {
            log::error!("Failed to join launch task!");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("new", sub)) => {
            let _pb_manager = init_logging(None);
            match sub.get_one::<PathBuf>("config") {
                Some(path) => make_template_config(path),
                None => ExitCode::FAILURE,
            }
        }
        Some(("run-job", sub)) => {
            let _pb_manager = init_logging(None);
            match sub.get_one::<PathBuf>("job") {
                Some(path) => run_single_job(path),
                None => ExitCode::FAILURE,
            }
        }
        _ => {
            let pb_manager = init_logging(Some(Path::new(LOG_FILE)));
            match load_config(&matches) {
                Ok(config) => launch(config, &pb_manager),
                Err(e) => {
                    log::error!("{e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
