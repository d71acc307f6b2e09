use anyhow::{Context, Result};
use clap::Parser;
use hotkeys::cli::{Cli, SourceKind};
use hotkeys::config::RunConfig;
use hotkeys::controller::WindowController;
use hotkeys::counter::FrequencyCounter;
use hotkeys::report::Report;
use hotkeys::source::{self, EventSource};
use hotkeys::HotkeyError;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool, verbose: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else if verbose {
        EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Open the event input: a file if given, otherwise stdin
fn open_input(args: &Cli) -> Result<Box<dyn BufRead + Send>> {
    match &args.input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

/// Build the adapter matching `--source`
fn build_source(args: &Cli, config: &RunConfig) -> Result<Box<dyn EventSource>> {
    let input = open_input(args)?;
    Ok(match args.source {
        SourceKind::Notify => Box::new(source::notification_source_from_reader(
            input,
            &config.pattern,
        )),
        SourceKind::Monitor => Box::new(source::command_tap_from_reader(input)),
    })
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug, args.verbose);

    let mut config = match &args.config {
        Some(path) => RunConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RunConfig::default(),
    };
    args.apply_to(&mut config);
    config.validate()?;

    if config.cycle.is_some() && args.source != SourceKind::Monitor {
        anyhow::bail!("Sub-window cycling (--cycle-ms) is only supported with --source monitor");
    }

    let window = config.window_config();
    let counter = Arc::new(FrequencyCounter::new());
    let mut controller = WindowController::new(counter.clone());
    let mut next_source = Some(build_source(&args, &config)?);
    let stdout = io::stdout();

    for index in 1..=config.windows {
        let Some(source) = next_source.take() else {
            break;
        };

        let outcome = match controller.run(&window, source) {
            Ok(outcome) => outcome,
            Err(HotkeyError::SourceUnavailable(reason)) if index > 1 => {
                tracing::warn!(window = index, %reason, "event source ended; stopping");
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let report = Report::collect(counter.as_ref(), &outcome, window.top_k);
        report.render(args.format, &mut stdout.lock())?;

        controller.conclude()?;
        next_source = controller.take_source();
    }

    Ok(())
}
