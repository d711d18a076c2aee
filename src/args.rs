//! Argument parsing for running from the command line

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::filter::DEFAULT_WING;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record signal strengths continuously
    Record {
        /// Station configuration file (TOML)
        #[clap(short, long)]
        config: PathBuf,
        /// Continue today's recording from this file
        #[clap(short, long)]
        read: Option<PathBuf>,
        /// Keep the content of the file given to --read without asking
        #[clap(short = 'y', long)]
        assume_yes: bool,
        /// Spectrum source: `synthetic` or a file/FIFO delivering one spectrum per line
        #[clap(short, long, default_value = "synthetic")]
        source: String,
    },
    /// Describe a recorded file
    Info { file: PathBuf },
    /// Split a multi-station file into single-station files
    Split { file: PathBuf },
    /// Add the samples of two files
    Merge { first: PathBuf, second: PathBuf },
    /// Write a BEMA-filtered copy of a file
    Filter {
        file: PathBuf,
        /// Half-width of the minimum and averaging windows, in samples
        #[clap(short, long, default_value_t = DEFAULT_WING)]
        bema_wing: usize,
        /// Hours to rotate the filtered curve by, towards local time
        #[clap(short, long, default_value_t = 0, allow_hyphen_values = true)]
        gmt_offset: i32,
    },
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}
