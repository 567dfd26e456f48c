//! synthpiano - play tones on the virtual piano from the command line.
//!
//! Holds a set of keys for a fixed time through the default audio device,
//! then releases them. Useful for checking the synthesis engine without a
//! keyboard front end.
//!
//! # Usage
//!
//! ```bash
//! cargo run                                # C major chord for one second
//! cargo run -- --keys A4,C#5,E5 --hold-ms 2000
//! cargo run -- --list                      # Print the key layout
//! ```

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use synthpiano::{AudioEngine, EngineConfig, KeyKind, KeyLayout, NoteId};

/// Keys played when none are given.
const DEFAULT_KEYS: &str = "C4,E4,G4";

/// Default time keys are held, in milliseconds.
const DEFAULT_HOLD_MS: u64 = 1000;

/// Command-line options for the application.
struct CliOptions {
    /// Path to a JSON engine configuration.
    config: Option<PathBuf>,
    /// Comma-separated key names or numeric IDs.
    keys: String,
    /// How long to hold the keys.
    hold: Duration,
    /// Print the layout and exit.
    list: bool,
}

impl CliOptions {
    /// Parses command-line arguments.
    ///
    /// Supports:
    /// - `--config <path>` or `-c <path>`: Load engine settings from JSON
    /// - `--keys <list>` or `-k <list>`: Keys to play (names like `F#4` or IDs)
    /// - `--hold-ms <n>`: Hold duration in milliseconds
    /// - `--list` or `-l`: Print the key layout
    /// - `--help` or `-h`: Print help and exit
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut options = Self {
            config: None,
            keys: DEFAULT_KEYS.to_string(),
            hold: Duration::from_millis(DEFAULT_HOLD_MS),
            list: false,
        };
        let mut i = 1;

        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    i += 1;
                    let path = args.get(i).context("--config requires a path argument")?;
                    options.config = Some(PathBuf::from(path));
                }
                "--keys" | "-k" => {
                    i += 1;
                    options.keys = args
                        .get(i)
                        .context("--keys requires a comma-separated list")?
                        .clone();
                }
                "--hold-ms" => {
                    i += 1;
                    let ms: u64 = args
                        .get(i)
                        .context("--hold-ms requires a number")?
                        .parse()
                        .context("--hold-ms must be a whole number of milliseconds")?;
                    options.hold = Duration::from_millis(ms);
                }
                "--list" | "-l" => options.list = true,
                "--help" | "-h" => {
                    print_help(args.first().map(String::as_str).unwrap_or("synthpiano"));
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown option: {}", other);
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
            i += 1;
        }

        Ok(options)
    }
}

fn print_help(program: &str) {
    eprintln!("synthpiano - Virtual piano tone player");
    eprintln!();
    eprintln!("Usage: {} [OPTIONS]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config PATH   Load engine settings from a JSON file");
    eprintln!("  -k, --keys LIST     Keys to hold, e.g. C4,E4,G4 or 0,4,7 (default: {})", DEFAULT_KEYS);
    eprintln!("      --hold-ms N     Hold time in milliseconds (default: {})", DEFAULT_HOLD_MS);
    eprintln!("  -l, --list          Print the key layout and exit");
    eprintln!("  -h, --help          Print this help message");
}

/// Resolves a comma-separated list of key names or IDs against the layout.
fn resolve_keys(layout: &KeyLayout, list: &str) -> Result<Vec<NoteId>> {
    let mut notes = Vec::new();
    for token in list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let note = match token.parse::<u32>() {
            Ok(raw) => layout.get(NoteId::new(raw)).map(|k| k.id),
            Err(_) => layout.find_by_name(token).map(|k| k.id),
        };
        match note {
            Some(note) => notes.push(note),
            None => bail!("Unknown key: {} (use --list to see the layout)", token),
        }
    }
    if notes.is_empty() {
        bail!("No keys given");
    }
    Ok(notes)
}

fn print_layout(layout: &KeyLayout) {
    println!("{:>4}  {:<5} {:<6} {:>8}", "id", "key", "kind", "Hz");
    for key in layout.keys() {
        let kind = match key.kind {
            KeyKind::White => "white",
            KeyKind::Black => "black",
        };
        println!(
            "{:>4}  {:<5} {:<6} {:>8.1}",
            key.id.as_u32(),
            key.name,
            kind,
            key.frequency
        );
    }
}

/// Main entry point.
fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = match cli.config {
        Some(ref path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let engine = AudioEngine::new(config).context("Failed to initialize audio engine")?;

    if cli.list {
        print_layout(engine.layout());
        return Ok(());
    }

    let notes = resolve_keys(engine.layout(), &cli.keys)?;

    for &note in &notes {
        if let Err(e) = engine.press_key(note) {
            // Keep the keys that did start; one busy line should not abort the chord.
            eprintln!("Could not play key {}: {}", note, e);
        }
    }
    if engine.active_count() == 0 {
        bail!("No audio output available");
    }

    tracing::info!(keys = ?engine.active_notes(), "holding for {:?}", cli.hold);
    thread::sleep(cli.hold);

    for &note in &notes {
        engine.release_key(note);
    }
    Ok(())
}
