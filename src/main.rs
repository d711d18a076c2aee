use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
    process, thread,
};

use clap::Parser;
use crossbeam_channel::{bounded, select, unbounded, Receiver};
use sid_logger::{
    args::{convert_filter, Args, Command},
    capture::{Capture, LineSource, SpectrumSource, SyntheticSource},
    clock::SampleClock,
    config::{Config, LogFormat},
    continuation::{AssumeYes, ContinuationResolver, Prompt},
    error::{Result, SidError},
    logger::Recorder,
    params::LogType,
    tools,
};
use tracing::{error, info, warn};

const MENU: &str = "\
f: save filtered buffers
r: save raw buffers
e: save raw buffers, both formats, extended timestamps
c: show configuration
v: show version
?: this menu
x: exit without saving";

fn spectrum_source(source: &str, config: &Config) -> Result<Box<dyn SpectrumSource>> {
    if source == "synthetic" {
        let levels: Vec<f64> = (1..=config.stations.len()).map(|i| i as f64).collect();
        return Ok(Box::new(SyntheticSource::with_levels(
            &config.stations,
            config.audio_sampling_rate,
            &levels,
        )));
    }
    let file = File::open(source).map_err(|e| SidError::io(source, e))?;
    Ok(Box::new(LineSource::new(BufReader::new(file))))
}

fn continue_from(recorder: &Recorder, path: &Path, assume_yes: bool) -> Result<()> {
    if assume_yes {
        recorder.continue_from(path, &mut ContinuationResolver::new(AssumeYes))?;
    } else {
        let stdin = io::stdin();
        let prompt = Prompt::new(stdin.lock(), io::stdout());
        recorder.continue_from(path, &mut ContinuationResolver::new(prompt))?;
    }
    Ok(())
}

fn print_saved(saved: Result<Vec<PathBuf>>) {
    match saved {
        Ok(paths) => {
            for p in paths {
                println!("{}", p.display());
            }
        }
        Err(e) => error!("Save failed: {e}"),
    }
}

/// Run one console command, false to exit
fn console_command(cmd: &str, recorder: &Recorder) -> bool {
    let config = recorder.config();
    match cmd {
        "f" => print_saved(recorder.save_current_buffers(
            None,
            LogType::Filtered,
            config.log_format,
        )),
        "r" => print_saved(recorder.save_current_buffers(None, LogType::Raw, config.log_format)),
        "e" => print_saved(recorder.save_current_buffers(
            None,
            LogType::Raw,
            LogFormat::BothExtended,
        )),
        "c" => {
            print!("{}", config.describe());
            println!("{}", recorder.status(chrono::Utc::now()));
        }
        "v" => println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        "?" => println!("{MENU}"),
        "x" => return false,
        "" => {}
        other => println!("Unknown command '{other}', ? for help"),
    }
    true
}

fn stdin_lines() -> Receiver<String> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line.trim().to_owned()).is_err() {
                break;
            }
        }
    });
    rx
}

fn record(config: &Path, read: Option<PathBuf>, assume_yes: bool, source: &str) -> Result<()> {
    let config = Config::load(config)?;
    info!(site = %config.site_name, stations = config.stations.len(), "Configuration loaded");
    let source = spectrum_source(source, &config)?;
    let mut capture = Capture::new(source, &config.stations, config.audio_sampling_rate);
    let interval = config.log_interval;
    let recorder = Recorder::new(config);

    if let Some(path) = read {
        continue_from(&recorder, &path, assume_yes)?;
    }

    let (stop_tx, stop_rx) = bounded(1);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    }) {
        warn!("Cannot install Ctrl-C handler: {e}");
    }

    let tick_recorder = recorder.clone();
    let mut clock = SampleClock::start(interval, move |tick| {
        tick_recorder.record_tick(tick, &mut capture).map(|_| ())
    });
    info!(start = %clock.start_time(), interval, "Recording");
    println!("{MENU}");

    let commands = stdin_lines();
    loop {
        select! {
            recv(stop_rx) -> _ => {
                info!("Interrupted");
                break;
            }
            recv(commands) -> cmd => {
                match cmd {
                    Ok(cmd) => {
                        if !console_command(&cmd, &recorder) {
                            break;
                        }
                    }
                    // No console, run until interrupted
                    Err(_) => {
                        let _ = stop_rx.recv();
                        break;
                    }
                }
            }
        }
    }
    clock.stop();
    Ok(())
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Record {
            config,
            read,
            assume_yes,
            source,
        } => record(&config, read, assume_yes, &source),
        Command::Info { file } => {
            print!("{}", tools::info(file)?);
            Ok(())
        }
        Command::Split { file } => {
            for path in tools::split(file)? {
                println!("{}", path.display());
            }
            Ok(())
        }
        Command::Merge { first, second } => {
            println!("{}", tools::merge(first, second)?.display());
            Ok(())
        }
        Command::Filter {
            file,
            bema_wing,
            gmt_offset,
        } => {
            println!("{}", tools::filter(file, bema_wing, gmt_offset)?.display());
            Ok(())
        }
    }
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(convert_filter(args.verbose.log_level_filter()))
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(args.command) {
        error!("{e}");
        process::exit(e.exit_code());
    }
}
