//! CLI entrypoint for `eventsift`.
//!
//! Each subcommand runs one pass over an event log with the historical file
//! names as defaults, prints a terminal summary and exits non-zero on the
//! first error.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use eventsift::{
    aggregate::MountSummary,
    engine::Engine,
    error::PassError,
    export::save_summary_csv,
    io::DEFAULT_MMAP_THRESHOLD_BYTES,
    namespace::NamespaceFilter,
    passwd::{DEFAULT_NEEDLE, PathFilter},
    report::render_summary,
    split::DEFAULT_PREFIX,
    track::{NsKind, Tracker},
};
use log::{LevelFilter, error};

#[derive(Parser, Debug)]
#[command(
    name = "eventsift",
    version,
    about = "Filter and aggregate passes over container event logs"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Override mmap threshold in bytes. If zero, disable mmap.
    #[arg(long = "mmap-threshold", global = true, default_value_t = DEFAULT_MMAP_THRESHOLD_BYTES)]
    mmap_threshold: u64,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Control color output (auto, always, never)
    #[arg(long = "color", global = true, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Suppress summary output
    #[arg(short = 'q', long = "quiet", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Keep the log lines that mention a path
    Passwd {
        #[arg(short = 'i', long = "input", default_value = "result.out")]
        input: PathBuf,
        #[arg(short = 'o', long = "output", default_value = "total_pwds.txt")]
        output: PathBuf,
        /// Substring a line must contain to be kept
        #[arg(long = "needle", default_value = DEFAULT_NEEDLE)]
        needle: String,
    },
    /// Collect distinct pids, vpids and mounts from filtered lines
    Aggregate {
        #[arg(short = 'i', long = "input", default_value = "total_pwds.txt")]
        input: PathBuf,
        #[arg(short = 'o', long = "output", default_value = "pwds_info.txt")]
        output: PathBuf,
        /// Also write the values as kind,value CSV rows
        #[arg(long = "csv")]
        csv: Option<PathBuf>,
    },
    /// Keep the log lines whose pid and vpid differ
    Namespaces {
        #[arg(short = 'i', long = "input", default_value = "result.out")]
        input: PathBuf,
        #[arg(short = 'o', long = "output", default_value = "results-filtered.txt")]
        output: PathBuf,
    },
    /// Split the log into one file per syscall category
    Split {
        #[arg(short = 'i', long = "input", default_value = "result.out")]
        input: PathBuf,
        /// Directory receiving <prefix>-<category>.out files
        #[arg(short = 'd', long = "dir", default_value = ".")]
        dir: PathBuf,
        #[arg(long = "prefix", default_value = DEFAULT_PREFIX)]
        prefix: String,
    },
    /// Resolve every open against the cwd and root of its mount namespace
    Track {
        #[arg(short = 'i', long = "input", default_value = "result.out")]
        input: PathBuf,
        #[arg(short = 'o', long = "output", default_value = "opens.txt")]
        output: PathBuf,
        /// Only report opens by this host pid
        #[arg(long = "pid")]
        pid: Option<u64>,
        /// Only report opens by this namespaced pid
        #[arg(long = "vpid")]
        vpid: Option<u64>,
    },
    /// Run passwd, aggregate and namespaces in order with default file names
    All {
        #[arg(short = 'i', long = "input", default_value = "result.out")]
        input: PathBuf,
        /// Directory receiving the output files
        #[arg(short = 'd', long = "dir", default_value = ".")]
        dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .try_init();
}

fn run(engine: &mut Engine, command: Command) -> Result<()> {
    match command {
        Command::Passwd {
            input,
            output,
            needle,
        } => {
            engine.run_file(&mut PathFilter::new(needle), &input, &output)?;
        }
        Command::Aggregate { input, output, csv } => {
            // the csv goes first so a failed export leaves the text summary untouched
            engine.run_file_with(&mut MountSummary::new(), &input, &output, |summary| {
                match csv {
                    Some(csv) => {
                        save_summary_csv(summary, &csv)?;
                        Ok(vec![csv])
                    }
                    None => Ok(Vec::new()),
                }
            })?;
        }
        Command::Namespaces { input, output } => {
            engine.run_file(&mut NamespaceFilter::new(), &input, &output)?;
        }
        Command::Split { input, dir, prefix } => {
            engine.run_split(&input, &dir, &prefix)?;
        }
        Command::Track {
            input,
            output,
            pid,
            vpid,
        } => {
            let mut tracker = Tracker::with_filter(pid, vpid);
            engine.run_file(&mut tracker, &input, &output)?;
            for ((kind, ns), threads) in tracker.members() {
                let root = match kind {
                    NsKind::Mnt => tracker.root(*ns),
                    NsKind::Net => "",
                };
                log::info!(
                    "{:?} namespace {}: {} threads, root {:?}",
                    kind,
                    ns,
                    threads.len(),
                    root
                );
            }
        }
        Command::All { input, dir } => {
            let filtered = dir.join("total_pwds.txt");
            engine
                .run_file(&mut PathFilter::default(), &input, &filtered)
                .context("passwd pass")?;
            engine
                .run_file(&mut MountSummary::new(), &filtered, dir.join("pwds_info.txt"))
                .context("aggregate pass")?;
            engine
                .run_file(
                    &mut NamespaceFilter::new(),
                    &input,
                    dir.join("results-filtered.txt"),
                )
                .context("namespaces pass")?;
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logger(args.verbose);
    match args.color {
        ColorChoice::Always => {
            colored::control::set_override(true);
        }
        ColorChoice::Never => {
            colored::control::set_override(false);
        }
        ColorChoice::Auto => {}
    }
    let threshold = if args.mmap_threshold == 0 {
        u64::MAX
    } else {
        args.mmap_threshold
    };
    let mut engine = Engine::with_threshold(threshold);

    if let Err(e) = run(&mut engine, args.command) {
        error!("{:#}", e);
        let code = e.downcast_ref::<PassError>().map_or(1, PassError::exit_code);
        std::process::exit(code);
    }

    if !args.quiet {
        println!("{}", render_summary(&engine));
    }
}
