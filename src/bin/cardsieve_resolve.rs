//! cardsieve-resolve: look up deck-list entries in a card dataset
//!
//! Usage:
//!   # entries.json: [{"name": "Alpha", "quantity": 4, "set_code": "BIG", "number": "1"}, ...]
//!   cardsieve-resolve AllPrintings.json --deck entries.json -o deck.json
//!
//! The output uses the dataset envelope with a single `deck` set; each
//! resolved card carries the entry's `quantity`.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use cardsieve::logging::{init_logging, LogSettings};
use cardsieve::project::{ProjectionSchema, Projector};
use cardsieve::resolve::{DeckEntry, DeckResolver};
use clap::Parser;
use serde_json::{json, Value};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "cardsieve-resolve")]
#[command(about = "Resolve deck-list entries against a card dataset", long_about = None)]
struct Args {
    /// Input dataset
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// JSON list of deck entries
    #[arg(long)]
    deck: PathBuf,

    /// Output file (stdout if omitted)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Comma-separated fields to keep on each resolved card
    #[arg(long)]
    fields: Option<String>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Also append logs to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = init_logging(&LogSettings {
        verbose: args.verbose,
        quiet: args.quiet,
        json: args.log_json,
        file: args.log_file.clone(),
        ..LogSettings::default()
    })?;

    let deck_file = File::open(&args.deck)
        .with_context(|| format!("Failed to open {}", args.deck.display()))?;
    let entries: Vec<DeckEntry> = serde_json::from_reader(BufReader::new(deck_file))
        .with_context(|| format!("Failed to parse deck entries in {}", args.deck.display()))?;

    let resolver = DeckResolver::new(entries)?;
    let input = File::open(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let result = resolver.resolve(input)?;

    let projector = match &args.fields {
        Some(fields) => Projector::new(ProjectionSchema::new(
            fields.split(',').map(str::trim).filter(|s| !s.is_empty()),
        )),
        None => Projector::default(),
    };

    let mut cards = Vec::new();
    for resolution in &result.resolutions {
        match resolution.deck_card(&projector) {
            Some(card) => cards.push(Value::Object(card)),
            None => {
                let entry = &resolution.entry;
                warn!(
                    name = %entry.name,
                    set = entry.set_code.as_deref().unwrap_or("-"),
                    number = entry.number.as_deref().unwrap_or("-"),
                    "card not found"
                );
            }
        }
    }

    let output = json!({
        "meta": result.meta.clone().unwrap_or_else(|| json!({})),
        "data": {"deck": {"block": null, "cards": cards}},
    });

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    serde_json::to_writer_pretty(&mut writer, &output)?;
    writer.flush()?;

    eprintln!(
        "✓ {} of {} entries resolved",
        result.found(),
        result.resolutions.len()
    );
    Ok(())
}
