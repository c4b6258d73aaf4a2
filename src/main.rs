use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use log::LevelFilter;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tomlspan::config::load_from_path;
use tomlspan::{
    Cursor, Document, EditConfig, Expected, NewValue, Outline, Position, SpanKind,
};

#[derive(Parser)]
#[command(name = "tomlspan")]
#[command(about = "Read and edit TOML files without disturbing their formatting", long_about = None)]
#[command(version)]
struct Cli {
    /// Edit settings file (falls back to $TOMLSPAN_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the value or text at a path
    Get {
        file: PathBuf,

        /// Literal names from the root; none prints the whole document
        path: Vec<String>,
    },

    /// Replace the value at a path
    Set {
        file: PathBuf,

        #[arg(required = true)]
        path: Vec<String>,

        /// New value as TOML text, or plain text with --string
        #[arg(long)]
        value: String,

        /// Treat --value as a string to quote
        #[arg(short, long)]
        string: bool,

        /// Only edit if the current value is exactly this text
        #[arg(long)]
        expect: Option<String>,

        /// Dry run - show what would change without writing
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Add a key/value to a table, or an element to an array
    Insert {
        file: PathBuf,

        /// Table, inline table or array to insert into; none is the root
        path: Vec<String>,

        /// Key of the new entry; omit when inserting into an array
        #[arg(short, long)]
        key: Option<String>,

        #[arg(long)]
        value: String,

        #[arg(short, long)]
        string: bool,

        /// Place the entry before this sibling
        #[arg(long, conflicts_with = "after")]
        before: Option<String>,

        /// Place the entry after this sibling
        #[arg(long)]
        after: Option<String>,

        #[arg(short = 'n', long)]
        dry_run: bool,

        #[arg(short, long)]
        diff: bool,
    },

    /// Remove the entry at a path
    Remove {
        file: PathBuf,

        #[arg(required = true)]
        path: Vec<String>,

        #[arg(short = 'n', long)]
        dry_run: bool,

        #[arg(short, long)]
        diff: bool,
    },

    /// Check that files parse and serialize back unchanged
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Also run full TOML validation
        #[arg(long)]
        strict: bool,
    },

    /// Print the span tree
    Tree {
        file: PathBuf,

        /// Emit JSON instead of an indented listing
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = resolve_config(cli.config)?;

    match cli.command {
        Commands::Get { file, path } => cmd_get(&file, &path, config),

        Commands::Set {
            file,
            path,
            value,
            string,
            expect,
            dry_run,
            diff,
        } => {
            let edit = Edit { file, dry_run, diff };
            cmd_set(&edit, &path, &value, string, expect, config)
        }

        Commands::Insert {
            file,
            path,
            key,
            value,
            string,
            before,
            after,
            dry_run,
            diff,
        } => {
            let edit = Edit { file, dry_run, diff };
            let anchor = match (before, after) {
                (Some(name), _) => Anchor::Before(name),
                (None, Some(name)) => Anchor::After(name),
                (None, None) => Anchor::Append,
            };
            cmd_insert(&edit, &path, key.as_deref(), &value, string, anchor, config)
        }

        Commands::Remove {
            file,
            path,
            dry_run,
            diff,
        } => {
            let edit = Edit { file, dry_run, diff };
            cmd_remove(&edit, &path, config)
        }

        Commands::Check { files, strict } => cmd_check(&files, strict, config),

        Commands::Tree { file, json } => cmd_tree(&file, json, config),
    }
}

/// Resolve edit settings.
///
/// Priority order:
/// 1. Explicit --config flag
/// 2. TOMLSPAN_CONFIG environment variable
/// 3. Built-in defaults
fn resolve_config(cli_config: Option<PathBuf>) -> Result<EditConfig> {
    if let Some(path) = cli_config {
        return Ok(load_from_path(&path)?);
    }

    if let Ok(env_path) = env::var("TOMLSPAN_CONFIG") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(load_from_path(&path)?);
        }
        eprintln!(
            "{}",
            format!("Warning: TOMLSPAN_CONFIG is set but path doesn't exist: {env_path}").yellow()
        );
    }

    Ok(EditConfig::default())
}

fn load(file: &Path, config: EditConfig) -> Result<Document> {
    Document::load_with(file, config).with_context(|| format!("failed to load {}", file.display()))
}

fn lookup(doc: &Document, path: &[String]) -> Result<Cursor> {
    Ok(doc.root().find_path(doc, path)?)
}

/// Common flags of the editing commands.
struct Edit {
    file: PathBuf,
    dry_run: bool,
    diff: bool,
}

enum Anchor {
    Append,
    Before(String),
    After(String),
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!("{}", format!("--- {} (original)", file.display()).dimmed());
    println!("{}", format!("+++ {} (edited)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let line = match change.tag() {
            ChangeTag::Delete => format!("-{change}").red(),
            ChangeTag::Insert => format!("+{change}").green(),
            ChangeTag::Equal => format!(" {change}").normal(),
        };
        print!("{line}");
        if change.missing_newline() {
            println!();
        }
    }
}

/// Show, then write, the result of an edit.
fn finish_edit(edit: &Edit, before: &str, doc: &Document, summary: &str) -> Result<()> {
    let after = doc.serialize();
    if edit.diff {
        display_diff(&edit.file, before, &after);
    }
    if edit.dry_run {
        println!("{}", "[DRY RUN - nothing written]".cyan());
        println!("{} {summary}", "⊙".yellow());
        return Ok(());
    }
    doc.save(&edit.file)
        .with_context(|| format!("failed to write {}", edit.file.display()))?;
    println!("{} {summary}", "✓".green());
    Ok(())
}

fn cmd_get(file: &Path, path: &[String], config: EditConfig) -> Result<()> {
    let doc = load(file, config)?;
    let target = lookup(&doc, path)?;
    let text = match target.kind(&doc)? {
        SpanKind::LeafKeyval | SpanKind::SliceValue => target.value_text(&doc)?.into_owned(),
        _ => target.text(&doc)?,
    };
    if text.ends_with('\n') {
        print!("{text}");
    } else {
        println!("{text}");
    }
    Ok(())
}

fn cmd_set(
    edit: &Edit,
    path: &[String],
    value: &str,
    string: bool,
    expect: Option<String>,
    config: EditConfig,
) -> Result<()> {
    let mut doc = load(&edit.file, config)?;
    let before = doc.serialize();
    let target = lookup(&doc, path)?;

    if let Some(expected) = expect {
        let current = target.value_text(&doc)?;
        if !Expected::from_text(&expected).matches(&current) {
            anyhow::bail!(
                "{}\n  Expected: {}\n  Found: {}",
                "Current value does not match --expect".red(),
                expected,
                current
            );
        }
    }

    if string {
        doc.set_value(target, &NewValue::string(value))?;
    } else {
        doc.set_value_raw(target, value)?;
    }
    finish_edit(edit, &before, &doc, &format!("set {}", path.join(".")))
}

fn cmd_insert(
    edit: &Edit,
    path: &[String],
    key: Option<&str>,
    value: &str,
    string: bool,
    anchor: Anchor,
    config: EditConfig,
) -> Result<()> {
    let mut doc = load(&edit.file, config)?;
    let before = doc.serialize();
    let mut parent = lookup(&doc, path)?;
    // A key/value holding an array or inline table stands for that value.
    if matches!(
        parent.kind(&doc)?,
        SpanKind::LeafKeyval | SpanKind::SliceValue
    ) {
        parent = parent.value_node(&doc)?;
    }

    let position = match &anchor {
        Anchor::Append => Position::Append,
        Anchor::Before(name) => Position::Before(parent.find(&doc, name)?),
        Anchor::After(name) => Position::After(parent.find(&doc, name)?),
    };

    let child = match (key, string) {
        (Some(key), true) => doc.create_keyval(key, &NewValue::string(value))?,
        (Some(key), false) => doc.create_keyval_raw(key, value)?,
        (None, true) => doc.create_value(&NewValue::string(value))?,
        (None, false) => doc.create_value_raw(value)?,
    };
    doc.insert(parent, child, position)?;

    let label = match key {
        Some(key) if path.is_empty() => key.to_string(),
        Some(key) => format!("{}.{key}", path.join(".")),
        None => format!("{}[]", path.join(".")),
    };
    finish_edit(edit, &before, &doc, &format!("inserted {label}"))
}

fn cmd_remove(edit: &Edit, path: &[String], config: EditConfig) -> Result<()> {
    let mut doc = load(&edit.file, config)?;
    let before = doc.serialize();
    let target = lookup(&doc, path)?;
    doc.remove(target)?;
    finish_edit(edit, &before, &doc, &format!("removed {}", path.join(".")))
}

fn cmd_check(files: &[PathBuf], strict: bool, config: EditConfig) -> Result<()> {
    let config = EditConfig {
        strict: strict || config.strict,
        ..config
    };

    let mut passed = 0;
    let mut failed = 0;

    for file in files {
        let original = match fs::read_to_string(file) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red(), file.display(), e);
                failed += 1;
                continue;
            }
        };
        match Document::parse_with(&original, config.clone()) {
            Ok(doc) if doc.serialize() == original => {
                println!(
                    "{} {}: round trip ok ({} spans)",
                    "✓".green(),
                    file.display(),
                    doc.tree().len()
                );
                passed += 1;
            }
            Ok(doc) => {
                eprintln!("{} {}: MISMATCH", "✗".red(), file.display());
                display_diff(file, &original, &doc.serialize());
                failed += 1;
            }
            Err(e) => {
                eprintln!("{} {}: {} ({})", "✗".red(), file.display(), e, e.code());
                failed += 1;
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} passed", format!("{passed}").green());
    println!("  {} failed", format!("{failed}").red());

    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_tree(file: &Path, json: bool, config: EditConfig) -> Result<()> {
    let doc = load(file, config)?;
    let outline = doc.outline();
    if json {
        println!("{}", serde_json::to_string_pretty(&outline)?);
    } else {
        print_outline(&outline, 0);
    }
    Ok(())
}

fn print_outline(outline: &Outline, depth: usize) {
    let mut line = format!("{}{} {}", "  ".repeat(depth), outline.kind, outline.id);
    if let Some(key) = &outline.key {
        line.push_str(&format!(" {}", key.bold()));
    }
    if let (Some(ty), Some(value)) = (outline.value_type, &outline.value) {
        line.push_str(&format!(" = {value} {}", format!("({ty})").dimmed()));
    } else if let Some(ty) = outline.value_type {
        line.push_str(&format!(" {}", format!("({ty})").dimmed()));
    }
    if let Some(comment) = &outline.comment {
        line.push_str(&format!(" {}", comment.dimmed()));
    }
    println!("{line}");
    for child in &outline.children {
        print_outline(child, depth + 1);
    }
}
