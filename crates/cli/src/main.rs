mod settings;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use formex_core::{expand_kpi, lex, parse, Severity, TargetEncoding};
use settings::{FileSettings, RunOptions};
use tracing_subscriber::EnvFilter;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Counter formula extraction and expansion.
#[derive(Parser)]
#[command(name = "formex", version, about = "Counter formula extraction and expansion")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log pipeline progress to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Settings TOML file; command-line flags override its keys
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract and expand the formula in a document
    Parse {
        /// Path to the document text
        document: PathBuf,
        #[command(flatten)]
        run: RunOptions,
    },

    /// Print the token stream of a formula
    Lex {
        /// Path to the formula text
        file: PathBuf,
        /// Skip unclassifiable characters instead of reporting them
        #[arg(long)]
        relaxed: bool,
        /// Clean the text before lexing
        #[arg(long)]
        clean: bool,
    },

    /// Expand a KPI from the registry
    Kpi {
        /// KPI id to expand
        kpi_id: String,
        /// Expand only this variable of the KPI (e.g. '$num')
        #[arg(long)]
        variable: Option<String>,
        #[command(flatten)]
        run: RunOptions,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let file_settings = match &cli.config {
        Some(path) => match settings::read_settings(path) {
            Ok(s) => s,
            Err(msg) => {
                report_error(&msg, cli.output, cli.quiet);
                process::exit(1);
            }
        },
        None => FileSettings::default(),
    };

    match cli.command {
        Commands::Parse { document, run } => {
            cmd_parse(&document, &run, &file_settings, cli.output, cli.quiet);
        }
        Commands::Lex {
            file,
            relaxed,
            clean,
        } => {
            cmd_lex(&file, relaxed, clean, &file_settings, cli.output, cli.quiet);
        }
        Commands::Kpi {
            kpi_id,
            variable,
            run,
        } => {
            cmd_kpi(
                &kpi_id,
                variable.as_deref(),
                &run,
                &file_settings,
                cli.output,
                cli.quiet,
            );
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(if quiet { "error" } else { "warn" }))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn read_input(path: &Path, output: OutputFormat, quiet: bool) -> String {
    match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading file '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn or_exit<T>(result: Result<T, String>, output: OutputFormat, quiet: bool) -> T {
    match result {
        Ok(v) => v,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn print_json(value: &impl serde::Serialize) {
    let pretty = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("serialization error: {}", e));
    println!("{}", pretty);
}

// ── parse ─────────────────────────────────────────────────────────────────────

fn cmd_parse(
    document: &Path,
    run: &RunOptions,
    file_settings: &FileSettings,
    output: OutputFormat,
    quiet: bool,
) {
    let config = or_exit(run.parser_config(file_settings), output, quiet);
    let loaded = or_exit(run.load_registries(file_settings), output, quiet);
    let text = read_input(document, output, quiet);

    let result = parse(&text, &config, loaded.as_registries());

    match output {
        OutputFormat::Json => print_json(&result.outcome()),
        OutputFormat::Text if quiet => println!("{}", result.expanded_source()),
        OutputFormat::Text => {
            print!("{}", result.report());
            if !result.raw_formula().is_empty() {
                println!("Expanded Formula:\n{}\n(end)", result.expanded_source());
            }
            let symbols = result.symbol_names();
            if !symbols.is_empty() {
                println!("Symbols:");
                for name in symbols {
                    println!("  {}", name);
                }
            }
            if !result.errors().is_empty() {
                println!("Errors:");
                for e in result.errors() {
                    println!("  [pass {}] {}", e.pass, e.message);
                }
            }
        }
    }

    if result.severity() == Severity::Error {
        process::exit(2);
    }
}

// ── lex ───────────────────────────────────────────────────────────────────────

fn cmd_lex(
    file: &Path,
    relaxed: bool,
    clean: bool,
    file_settings: &FileSettings,
    output: OutputFormat,
    quiet: bool,
) {
    let relaxed = relaxed || file_settings.relaxed.unwrap_or(false);
    let encoding = match &file_settings.encoding {
        Some(e) => or_exit(e.parse::<TargetEncoding>(), output, quiet),
        None => TargetEncoding::default(),
    };
    let text = read_input(file, output, quiet);
    let text = text.trim();

    let mut errors: Vec<String> = Vec::new();
    let source = if clean {
        let cleaned = formex_core::clean(text, encoding);
        errors.extend(cleaned.errors.into_iter().map(|e| e.message));
        cleaned.text
    } else {
        text.to_string()
    };
    let lexed = lex(&source, relaxed);
    errors.extend(lexed.errors);

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "source": source,
            "tokens": lexed.tokens.body(),
            "errors": errors,
        })),
        OutputFormat::Text => {
            print!("{}", lexed.tokens);
            if !quiet {
                for e in &errors {
                    println!("ERROR: {}", e);
                }
            }
        }
    }

    if !relaxed && !errors.is_empty() {
        process::exit(2);
    }
}

// ── kpi ───────────────────────────────────────────────────────────────────────

fn cmd_kpi(
    kpi_id: &str,
    variable: Option<&str>,
    run: &RunOptions,
    file_settings: &FileSettings,
    output: OutputFormat,
    quiet: bool,
) {
    let config = or_exit(run.parser_config(file_settings), output, quiet);
    let loaded = or_exit(run.load_registries(file_settings), output, quiet);
    if loaded.kpis.is_none() {
        report_error(
            "no KPI registry given (use --kpis or the 'kpis' config key)",
            output,
            quiet,
        );
        process::exit(1);
    }

    let expansion = expand_kpi(kpi_id, variable, &config, loaded.as_registries());

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "kpi_id": kpi_id,
            "variable": variable,
            "expanded": expansion.text,
            "errors": expansion.errors,
        })),
        OutputFormat::Text => {
            println!("{}", expansion.text);
            if !quiet {
                for e in &expansion.errors {
                    println!("ERROR: {}", e);
                }
            }
        }
    }

    let worst = expansion
        .errors
        .iter()
        .map(|e| e.severity(config.relaxed))
        .max()
        .unwrap_or_default();
    if worst == Severity::Error {
        process::exit(2);
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
