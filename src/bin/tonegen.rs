use std::io::{self, BufRead, Write};

use anyhow::Context;
use ariadne::{Color, Label, Report, ReportKind, Source};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tonegen_core::config::{DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE};
use tonegen_core::error::ParseError;
use tonegen_core::input::{duration_from_hours_minutes, parse_frequency_input};
use tonegen_core::output::CpalSink;
use tonegen_core::{
    CancellationFlag, PlaybackDuration, PlaybackSession, SessionConfig, SessionState, SynthesisMode,
};

/// Play sine tones or binaural beats on the default output device.
#[derive(Debug, Parser)]
#[command(name = "tonegen", version, allow_negative_numbers = true)]
struct Args {
    /// Frequencies in Hz, comma separated. Append ` b` for binaural mode.
    /// Prompted for when omitted.
    frequencies: Option<String>,

    /// Duration hours (prompted for when neither hours, minutes nor --continuous is given).
    #[arg(long)]
    hours: Option<i64>,

    /// Duration minutes.
    #[arg(long)]
    minutes: Option<i64>,

    /// Play until interrupted with Ctrl-C.
    #[arg(long, conflicts_with_all = ["hours", "minutes"])]
    continuous: bool,

    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,

    /// Frames per device callback.
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: u32,

    /// Print the resolved session config as JSON and exit.
    #[arg(long)]
    print_config: bool,
}

fn prompt(message: &str) -> io::Result<String> {
    print!("{message}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn prompt_number(message: &str) -> anyhow::Result<i64> {
    let text = prompt(message)?;
    text.trim()
        .parse()
        .with_context(|| format!("'{}' is not a whole number", text.trim()))
}

fn report_parse_error(source: &str, err: &ParseError) {
    let mut range = err.span.start..err.span.end;
    if range.is_empty() && range.end < source.len() {
        range.end += 1;
    }
    let _ = Report::build(ReportKind::Error, range.clone())
        .with_message("could not read the frequency list")
        .with_label(
            Label::new(range)
                .with_message(err.kind.to_string())
                .with_color(Color::Red),
        )
        .finish()
        .eprint(Source::from(source));
}

fn resolve_duration(args: &Args) -> anyhow::Result<PlaybackDuration> {
    if args.continuous {
        return Ok(PlaybackDuration::Continuous);
    }
    let (hours, minutes) = match (args.hours, args.minutes) {
        (None, None) => (
            prompt_number("Enter the duration (hours): ")?,
            prompt_number("Enter the duration (minutes): ")?,
        ),
        (h, m) => (h.unwrap_or(0), m.unwrap_or(0)),
    };
    Ok(PlaybackDuration::Finite {
        seconds: duration_from_hours_minutes(hours, minutes)?,
    })
}

/// Write what precedes playback: the mode banner, or with `--print-config`
/// only the config JSON. Returns `true` when the driver should exit.
fn write_preamble<W: Write>(out: &mut W, config: &SessionConfig, print_config: bool) -> anyhow::Result<bool> {
    if print_config {
        writeln!(out, "{}", config.to_json()?)?;
        return Ok(true);
    }
    let label = match config.mode {
        SynthesisMode::Mono => "Mono Mode",
        SynthesisMode::Binaural => "Binaural Mode",
    };
    writeln!(out, "\n\x1b[1m{label}\x1b[0m\n")?;
    Ok(false)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let text = match &args.frequencies {
        Some(text) => text.clone(),
        None => prompt("Enter the frequencies you want to play (in Hz, separated by commas, add 'b' for binaural): ")?,
    };
    let (frequencies, mode) = match parse_frequency_input(&text) {
        Ok(parsed) => parsed,
        Err(err) => {
            report_parse_error(&text, &err);
            anyhow::bail!("invalid frequency list: {err}");
        }
    };

    let config = SessionConfig {
        frequencies,
        mode,
        duration: resolve_duration(&args)?,
        sample_rate: args.sample_rate,
        block_size: args.block_size,
    };

    if write_preamble(&mut io::stdout().lock(), &config, args.print_config)? {
        return Ok(());
    }

    let session = PlaybackSession::new(config, CancellationFlag::new());
    let handle = session.handle();
    let mut playback = tokio::task::spawn_blocking(move || session.start(&mut CpalSink::new()));

    let result = tokio::select! {
        joined = &mut playback => joined?,
        Ok(()) = tokio::signal::ctrl_c() => {
            info!("interrupt received, stopping playback");
            handle.cancel();
            playback.await?
        }
    };

    let report = result.context("playback failed")?;
    match report.state {
        SessionState::Cancelled => info!(frames = report.frames_produced, "playback cancelled"),
        _ => info!(frames = report.frames_produced, "playback completed"),
    }
    Ok(())
}
