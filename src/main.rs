use std::path::{Path, PathBuf};
use std::process::ExitCode;

use b4u::card::{CardField, FieldKind};
use b4u::{Deck, DecodeOptions, FieldFormatter, NoteFields};
use clap::{ArgAction, Parser, Subcommand};
use tracing::Level;

#[derive(Parser)]
#[command(name = "b4u", about = "Decode .b4u flashcard decks")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Fail on the first undecodable card instead of skipping it
    #[arg(long, global = true)]
    strict: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show deck metadata
    Info {
        input: PathBuf,
    },
    /// List cards with their present fields
    Cards {
        input: PathBuf,
    },
    /// Print the decoded deck as JSON
    Dump {
        input: PathBuf,
    },
    /// Write media files and print the five note fields per card
    Export {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        /// Media filename prefix (default: random tag + deck title)
        #[arg(long)]
        prefix: Option<String>,
        /// Emit JSON lines instead of TSV
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let opts = DecodeOptions {
        skip_bad_cards: !cli.strict,
        ..DecodeOptions::default()
    };

    match cli.command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let deck = open_deck(&input, &opts)?;
            let media = deck.cards.iter()
                .map(|c| [&c.foreign_audio, &c.native_audio, &c.image].iter().filter(|b| b.is_some()).count())
                .sum::<usize>();

            println!("── .b4u Deck ────────────────────────────────────────────");
            println!("  Path             {}", input.display());
            println!("  Title            {}", deck.title);
            println!("  Languages        {} → {}", deck.native_language, deck.foreign_language);
            println!("  Description      {}", deck.description);
            println!("  Copyright        {}", deck.copyright);
            println!("  Copyright URL    {}", deck.copyright_url);
            println!("  Created          {}", deck.creation_date);
            println!("  Creator app      {}", deck.app_creator_name);
            println!("  Cards            {} (declared {})", deck.cards.len(), deck.declared_card_count);
            println!("  Media payloads   {}", media);
        }

        // ── Cards ────────────────────────────────────────────────────────────
        Commands::Cards { input } => {
            let deck = open_deck(&input, &opts)?;
            println!("{:>8} {:>8}  {:<24} {:<24} Media", "Number", "Mask", "Foreign", "Native");
            for card in &deck.cards {
                let media: Vec<String> = card.present_fields().into_iter()
                    .filter_map(|f| match f.kind() {
                        FieldKind::Media(kind) => card.media(kind)
                            .map(|b| format!("{}={}", f.name(), &b.digest()[..12])),
                        FieldKind::Text => None,
                    })
                    .collect();
                println!("{:>8} {:>#8x}  {:<24} {:<24} {}",
                    card.number, card.attributes,
                    card.text(CardField::ForeignTitle).unwrap_or("—"),
                    card.text(CardField::NativeTitle).unwrap_or("—"),
                    media.join(" "));
            }
        }

        // ── Dump ─────────────────────────────────────────────────────────────
        Commands::Dump { input } => {
            let deck = open_deck(&input, &opts)?;
            println!("{}", serde_json::to_string_pretty(&deck)?);
        }

        // ── Export ───────────────────────────────────────────────────────────
        Commands::Export { input, output_dir, prefix, json } => {
            let deck = open_deck(&input, &opts)?;
            if !output_dir.exists() { std::fs::create_dir_all(&output_dir)?; }
            let mut formatter = match prefix {
                Some(p) => FieldFormatter::new(&output_dir, p),
                None    => FieldFormatter::for_deck(&output_dir, &deck),
            };
            let notes = formatter.format_deck(&deck)?;
            for note in &notes {
                if json {
                    println!("{}", serde_json::to_string(note)?);
                } else {
                    println!("{}", tsv_line(note));
                }
            }
            let media: usize = notes.iter().map(|n| n.media.len()).sum();
            eprintln!("Exported {} notes, {} media files → {}", notes.len(), media, output_dir.display());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn open_deck(path: &Path, opts: &DecodeOptions) -> Result<Deck, Box<dyn std::error::Error>> {
    Deck::open_with(path, opts).map_err(|e| {
        if e.is_unrecognized_format() {
            format!("{} is not a recognized .b4u deck ({e})", path.display()).into()
        } else {
            e.into()
        }
    })
}

fn tsv_line(note: &NoteFields) -> String {
    note.as_array()
        .iter()
        .map(|f| f.replace(['\t', '\n', '\r'], " "))
        .collect::<Vec<_>>()
        .join("\t")
}
