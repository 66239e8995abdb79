use clap::{value_parser, Arg, ArgMatches, Command};
use human_bytes::human_bytes;
use indicatif::{MultiProgress, ProgressBar};
use indicatif_log_bridge::LogWrapper;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use libsmartpix_sim::error::TrackListError;
use libsmartpix_sim::extract::{
    DelphesExtractor, ExtractionSummary, HepMCExtractor, TruncationUnit,
};

// Matches libsmartpix_sim::track::DEFAULT_FLOAT_PRECISION
const DEFAULT_PRECISION_ARG: &str = "5";

fn io_args(cmd: Command, input_help: &'static str) -> Command {
    cmd.arg(
        Arg::new("input")
            .short('i')
            .long("input")
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help(input_help),
    )
    .arg(
        Arg::new("output")
            .short('o')
            .long("output")
            .required(true)
            .value_parser(value_parser!(PathBuf))
            .help("Track list to write"),
    )
    .arg(
        Arg::new("precision")
            .short('p')
            .long("precision")
            .value_parser(value_parser!(usize))
            .default_value(DEFAULT_PRECISION_ARG)
            .help("Number of decimals for floating point fields"),
    )
}

fn cli() -> Command {
    Command::new("smartpix_tracklist")
        .about("Build PixelAV track lists from Delphes or HepMC output")
        .arg_required_else_help(true)
        .subcommand_required(true)
        .subcommand(io_args(
            Command::new("delphes").about("Charged pion tracks from a Delphes ROOT file"),
            "Delphes ROOT file",
        ))
        .subcommand(
            io_args(
                Command::new("hepmc")
                    .about("Final state particles produced in the pixel detector from a HepMC file"),
                "HepMC (Asciiv3 or IO_GenEvent) file",
            )
            .arg(
                Arg::new("max_particles")
                    .short('n')
                    .long("max-particles")
                    .allow_negative_numbers(true)
                    .value_parser(value_parser!(i64))
                    .default_value("100")
                    .help("Maximum number of tracks to write, -1 for all"),
            )
            .arg(
                Arg::new("truncate")
                    .long("truncate")
                    .value_parser(value_parser!(TruncationUnit))
                    .default_value("particle")
                    .help("Stop at the cap mid-event (particle) or after finishing the event (event)"),
            ),
        )
}

fn convert(
    name: &str,
    sub: &ArgMatches,
    pb: &ProgressBar,
) -> Result<ExtractionSummary, TrackListError> {
    let input = sub.get_one::<PathBuf>("input").expect("input is required");
    let output = sub.get_one::<PathBuf>("output").expect("output is required");
    let precision = *sub
        .get_one::<usize>("precision")
        .expect("precision has a default");
    log::info!("Input: {}", input.display());
    log::info!("Output: {}", output.display());

    let summary = if name == "hepmc" {
        let max_particles = *sub
            .get_one::<i64>("max_particles")
            .expect("max-particles has a default");
        let truncation = *sub
            .get_one::<TruncationUnit>("truncate")
            .expect("truncate has a default");
        let extractor = HepMCExtractor::new(
            (max_particles >= 0).then_some(max_particles as usize),
            truncation,
        );
        extractor.convert_file(input, output, precision, |s| {
            pb.set_message(format!(
                "{} events, {} tracks",
                s.events_read, s.tracks_accepted
            ));
            pb.tick();
        })?
    } else {
        DelphesExtractor.convert_file(input, output, precision)?
    };
    report_output(output);
    Ok(summary)
}

fn report_output(output: &Path) {
    match std::fs::metadata(output) {
        Ok(meta) => log::info!(
            "Wrote {} ({})",
            output.display(),
            human_bytes(meta.len() as f64)
        ),
        Err(e) => log::warn!("Could not stat {}: {e}", output.display()),
    }
}

fn main() -> ExitCode {
    let matches = cli().get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    let pb_manager = MultiProgress::new();
    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
    }
    log::set_max_level(log::LevelFilter::Info);

    let Some((name, sub)) = matches.subcommand() else {
        return ExitCode::FAILURE;
    };

    let pb = pb_manager.add(ProgressBar::new_spinner());
    pb.enable_steady_tick(Duration::from_millis(200));
    pb.set_message(format!("Reading {name} input..."));

    let result = convert(name, sub, &pb);
    pb.finish_and_clear();

    match result {
        Ok(summary) => {
            log::info!(
                "Read {} events, wrote {} of {} candidate tracks{}",
                summary.events_read,
                summary.tracks_accepted,
                summary.candidates,
                if summary.truncated {
                    " (stopped at the track cap)"
                } else {
                    ""
                }
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
