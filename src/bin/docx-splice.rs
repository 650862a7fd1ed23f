//! docx-splice CLI
//!
//! Convert DOCX files to editable JSON and back, and fill placeholders.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use docx_splice::{
    container, pipeline, reduce, Decoder, Document, EditSet, EditorAction, EditorState, Encoder,
    ExtractConfig, FlattenConfig, Flattener, PlaceholderSyntax, ReconstructReport,
};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "docx-splice")]
#[command(version)]
#[command(about = "Lossless DOCX <-> JSON conversion with placeholder filling")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a DOCX file to JSON
    Extract {
        /// DOCX file to convert
        input: PathBuf,

        /// Directory to write `<name>.json` to
        #[arg(short = 'C', long, default_value = ".")]
        directory: PathBuf,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Rebuild a DOCX file from JSON, applying staged edits
    Build {
        /// JSON produced by `extract`
        input: PathBuf,

        /// Directory to write the DOCX to
        #[arg(short = 'C', long, default_value = ".")]
        directory: PathBuf,

        /// Output file name (default: `<name>_reconstructed.docx`)
        #[arg(short = 'o', long)]
        output: Option<String>,

        /// Fail if any edit could not be applied
        #[arg(long)]
        strict: bool,
    },

    /// Convert DOCX -> JSON -> DOCX without edits
    Roundtrip {
        /// DOCX file to convert
        input: PathBuf,

        /// Directory for the JSON and rebuilt DOCX
        #[arg(short = 'C', long, default_value = ".")]
        directory: PathBuf,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Replace placeholders in a DOCX file directly
    Fill {
        /// DOCX template
        input: PathBuf,

        /// Output DOCX file
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Replace TOKEN with VALUE in every part containing it, e.g. `{Name}=Ann`
        #[arg(short = 's', long = "set", value_name = "TOKEN=VALUE")]
        set: Vec<String>,

        /// JSON file of `{ "<entry>": { "<token>": "<value>" } }`
        #[arg(long)]
        edits: Option<PathBuf>,

        /// Fail if any edit could not be applied
        #[arg(long)]
        strict: bool,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// List entries and their placeholders
    List {
        /// DOCX file or JSON produced by `extract`
        input: PathBuf,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Stage or clear edits in a JSON document
    Edit {
        /// JSON produced by `extract`
        input: PathBuf,

        /// Entry to edit
        #[arg(short, long, default_value = "word/document.xml")]
        entry: String,

        /// Placeholder tokens to edit
        #[arg(short = 't', long = "token", required = true)]
        tokens: Vec<String>,

        /// New value for the selected tokens
        #[arg(long, conflicts_with = "clear", required_unless_present = "clear")]
        value: Option<String>,

        /// Remove staged edits for the selected tokens
        #[arg(long)]
        clear: bool,
    },

    /// Merge fragmented runs with LibreOffice (DOCX -> DOC -> DOCX on a copy)
    Flatten {
        /// DOCX file to flatten
        input: PathBuf,

        /// Output directory (default: next to the input)
        #[arg(short = 'C', long)]
        directory: Option<PathBuf>,

        /// Path to the soffice executable
        #[arg(long, env = "SOFFICE_PATH")]
        soffice: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct ScanArgs {
    /// Only treat `{{Name}}` as a placeholder
    #[arg(long)]
    double_braces: bool,

    /// Entry name suffixes to scan for text runs
    #[arg(long = "suffix", value_name = "SUFFIX", default_value = ".xml")]
    suffixes: Vec<String>,
}

impl ScanArgs {
    fn config(&self) -> ExtractConfig {
        let syntax = if self.double_braces {
            PlaceholderSyntax::DoubleBraces
        } else {
            PlaceholderSyntax::Braces
        };
        ExtractConfig::default()
            .with_syntax(syntax)
            .with_suffixes(self.suffixes.iter().cloned())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Extract { input, directory, scan } => {
            let json = pipeline::docx_to_json(&input, &directory, &scan.config())?;
            println!("{}", json.display());
        }
        Commands::Build { input, directory, output, strict } => {
            let (docx, report) = pipeline::json_to_docx(&input, &directory, output.as_deref())?;
            print_report(&report, strict)?;
            println!("{}", docx.display());
        }
        Commands::Roundtrip { input, directory, scan } => {
            let docx = pipeline::roundtrip(&input, &directory, &scan.config())?;
            println!("{}", docx.display());
        }
        Commands::Fill { input, output, set, edits, strict, scan } => {
            fill(&input, &output, &set, edits.as_deref(), strict, &scan.config())?;
        }
        Commands::List { input, scan } => {
            list(&input, &scan.config())?;
        }
        Commands::Edit { input, entry, tokens, value, clear } => {
            edit(&input, entry, tokens, value, clear)?;
        }
        Commands::Flatten { input, directory, soffice } => {
            let flattener = Flattener::new(FlattenConfig::new(soffice))?;
            let cleaned = flattener.flatten_copy(&input, directory.as_deref())?;
            println!("{}", cleaned.display());
        }
    }

    Ok(())
}

fn print_report(report: &ReconstructReport, strict: bool) -> Result<()> {
    for (entry, token) in &report.unmatched {
        eprintln!("not found: {token} in {entry}");
    }
    for inconsistency in &report.inconsistencies {
        eprintln!("skipped: {inconsistency}");
    }
    for entry in &report.unknown_entries {
        eprintln!("unknown entry: {entry}");
    }
    if strict && !report.is_clean() {
        bail!("some edits were not applied");
    }
    Ok(())
}

fn fill(
    input: &Path,
    output: &Path,
    set: &[String],
    edits_file: Option<&Path>,
    strict: bool,
    config: &ExtractConfig,
) -> Result<()> {
    let pairs = set
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .with_context(|| format!("Expected TOKEN=VALUE, got: {pair}"))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut edits = pipeline::edits_for_tokens(input, config, pairs)?;
    if let Some(path) = edits_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read: {}", path.display()))?;
        let from_file: EditSet = serde_json::from_str(&text)
            .with_context(|| format!("Invalid edits file: {}", path.display()))?;
        edits.merge(from_file);
    }
    if edits.is_empty() && !set.is_empty() {
        eprintln!("no placeholder matched any --set token");
    }

    let report = pipeline::fill(input, &edits, output, config)?;
    print_report(&report, strict)?;
    println!("{} ({} replaced)", output.display(), report.applied);
    Ok(())
}

fn load_document(input: &Path, config: &ExtractConfig) -> Result<Document> {
    let is_json = input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        Decoder::new().decode_file(input)
    } else {
        let entries = container::open(input)
            .with_context(|| format!("Failed to open {}", input.display()))?;
        Ok(Encoder::with_config(config.clone()).extract(&entries))
    }
}

fn list(input: &Path, config: &ExtractConfig) -> Result<()> {
    let document = load_document(input, config)?;

    for entry in &document.entries {
        match &entry.editable {
            Some(editable) => {
                println!(
                    "{}  {} bytes  {} runs",
                    entry.name,
                    entry.content.len(),
                    editable.runs.len()
                );
                for token in document.tokens(&entry.name) {
                    let staged = document
                        .edits
                        .for_entry(&entry.name)
                        .and_then(|r| r.get(token));
                    match staged {
                        Some(value) => println!("    {token}  ->  {value}"),
                        None => println!("    {token}"),
                    }
                }
            }
            None => println!("{}  {} bytes", entry.name, entry.content.len()),
        }
    }

    Ok(())
}

fn edit(
    input: &Path,
    entry: String,
    tokens: Vec<String>,
    value: Option<String>,
    clear: bool,
) -> Result<()> {
    let mut document = Decoder::new().decode_file(input)?;

    let mut actions = vec![
        EditorAction::SelectEntry(entry),
        EditorAction::SelectPlaceholders(tokens),
    ];
    match value {
        Some(value) if !clear => {
            actions.push(EditorAction::SetDraft(value));
            actions.push(EditorAction::ApplyToSelection);
        }
        _ => actions.push(EditorAction::ClearSelection),
    }

    let mut state = EditorState::from_document(&document);
    let mut changes = 0;
    for action in actions {
        let (next, deltas) = reduce(&state, action, &document)?;
        changes += deltas.len();
        state = next;
    }

    document.edits = state.staged;
    let backup = pipeline::write_document_with_backup(input, &document)?;
    println!(
        "{} changes, {} staged (previous version: {})",
        changes,
        document.edits.len(),
        backup.display()
    );
    Ok(())
}
