//! parlo — demo driver for the speech dispatch engine.
//!
//! Reads lines from a file (or stdin), speaks each through the scripted
//! synthesizer, and prints every progress event as one JSON object per
//! line. `RUST_LOG=debug` shows the dispatch internals.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use parlo_lib::parlo_core::{Command, DispatchConfig, EventKind, Parameter};
use parlo_lib::{Engine, PlaybackSink};

mod synth;

use synth::ScriptedSynthesizer;

#[derive(Parser)]
#[command(name = "parlo", version, about = "Speak lines of text, printing progress events as JSON")]
struct Args {
    /// File to read lines from; stdin when omitted.
    file: Option<PathBuf>,

    /// Speaking rate in words per minute.
    #[arg(long, default_value_t = 175)]
    rate: u32,

    /// Voice to select before speaking.
    #[arg(long, default_value = "en")]
    voice: String,

    /// Output sample rate in Hz.
    #[arg(long, default_value_t = 22_050)]
    sample_rate: u32,

    /// Suppress event output (playback only).
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let sink = PlaybackSink::new(args.sample_rate);
    let synthesizer = ScriptedSynthesizer::new(sink.clone());
    let engine = Engine::new(DispatchConfig::default(), sink, Box::new(synthesizer));

    if !args.quiet {
        engine.set_callback(Some(Box::new(|events| {
            for event in events {
                if event.kind == EventKind::ListTerminated {
                    break;
                }
                match serde_json::to_string(event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!("failed to encode event: {e}"),
                }
            }
        })));
    }

    engine
        .submit_pair(
            Command::parameter(Parameter::Rate, args.rate as i32),
            Command::voice_name(args.voice.as_str()),
        )
        .context("failed to submit setup commands")?;

    let reader: Box<dyn BufRead> = match &args.file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("cannot open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut uid = 0u32;
    for line in reader.lines() {
        let line = line.context("failed to read input")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        uid += 1;
        engine
            .submit(Command::text(line, uid))
            .with_context(|| format!("failed to submit message {uid}"))?;
        engine.synchronize();
    }

    engine.terminate();
    Ok(())
}
