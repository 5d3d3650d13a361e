// kpiform CLI - headless KPI formula validation, building and editing

mod exit_codes;

use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use kpiform_config::Settings;
use kpiform_engine::catalog::{CatalogError, MetricCatalog, StaticCatalog};
use kpiform_engine::editor::EditOp;
use kpiform_engine::formula::format::format_formula;
use kpiform_engine::formula::scanner;
use kpiform_engine::formula::tree::CalculationNode;
use kpiform_engine::indicator::{DraftError, IndicatorDraft, IndicatorScope};
use kpiform_engine::session::EditSession;

use exit_codes::{EXIT_ERROR, EXIT_INVALID_FORMULA, EXIT_IO, EXIT_SUCCESS, EXIT_UNKNOWN_METRIC, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "kpiform")]
#[command(about = "Validate, build and edit KPI formulas")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Settings file (default: <config dir>/kpiform/settings.json)
    #[arg(long, global = true, env = "KPIFORM_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a formula against the submission rules
    #[command(after_help = "\
Examples:
  kpiform validate '{ Sum(revenue) } / { Count(calls) }'
  echo '(1 + 2' | kpiform validate - --json")]
    Validate {
        /// Formula text, or - to read stdin
        formula: String,

        /// Print the result as a JSON object
        #[arg(long)]
        json: bool,
    },

    /// Validate a formula and print its calculation tree
    #[command(after_help = "\
Examples:
  kpiform build '{ Sum(revenue) } / { Count(calls) }'
  kpiform build '{ Avg(handle_time) } * 60' --catalog metrics.json")]
    Build {
        /// Formula text, or - to read stdin
        formula: String,

        /// Metric catalog; every referenced metric must be listed
        #[arg(long, value_name = "PATH")]
        catalog: Option<PathBuf>,
    },

    /// List the metric tokens in a formula
    Tokens {
        /// Formula text, or - to read stdin
        formula: String,
    },

    /// Print formula text for a calculation tree
    Format {
        /// Calculation tree JSON, or - to read stdin
        tree: String,
    },

    /// Apply JSONL edit operations from stdin, one state line per operation
    #[command(after_help = "\
Examples:
  printf '%s\\n' '{\"op\":\"insert_metric\",\"metric_id\":\"revenue\",\"aggregate\":\"sum\"}' \\
                 '{\"op\":\"insert_char\",\"char\":\"/\"}' | kpiform edit")]
    Edit {
        /// Formula to start from (cursor at the end)
        #[arg(long, default_value = "")]
        formula: String,
    },

    /// Build the indicator entity payload for a named formula
    Indicator {
        /// Indicator name
        #[arg(long)]
        name: String,

        /// Formula text, or - to read stdin
        #[arg(long)]
        formula: String,

        #[arg(long)]
        client: String,

        #[arg(long)]
        department: String,

        /// Lower values are better
        #[arg(long)]
        flip: bool,

        /// Metric catalog; every referenced metric must be listed
        #[arg(long, value_name = "PATH")]
        catalog: Option<PathBuf>,
    },

    /// List the selectable metrics of a catalog
    Metrics {
        #[arg(long, value_name = "PATH")]
        catalog: Option<PathBuf>,
    },

    /// Settings file management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the settings file path
    Path,
    /// Write a commented default settings file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective settings
    Show,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("KPIFORM_COMMIT"), ")",
        "\nengine:  kpiform-engine ", env!("CARGO_PKG_VERSION"),
        "\nprofile: ", env!("KPIFORM_PROFILE"),
        "\ntarget:  ", env!("KPIFORM_TARGET"),
    )
}

fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    // Also bridges `log` records from the library crates.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let out = Output {
        pretty: cli.pretty || settings.pretty_output,
    };

    let result = match cli.command {
        Commands::Validate { formula, json } => cmd_validate(&settings, &out, formula, json),
        Commands::Build { formula, catalog } => cmd_build(&settings, &out, formula, catalog),
        Commands::Tokens { formula } => cmd_tokens(&out, formula),
        Commands::Format { tree } => cmd_format(tree),
        Commands::Edit { formula } => cmd_edit(&settings, &formula),
        Commands::Indicator {
            name,
            formula,
            client,
            department,
            flip,
            catalog,
        } => {
            let scope = IndicatorScope {
                client_id: client,
                department_id: department,
            };
            cmd_indicator(&settings, &out, name, formula, flip, scope, catalog)
        }
        Commands::Metrics { catalog } => cmd_metrics(&settings, &out, catalog),
        Commands::Config(command) => cmd_config(&settings, cli.config.as_deref(), command),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self::new(EXIT_ERROR, msg)
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::new(EXIT_INVALID_FORMULA, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(EXIT_IO, msg)
    }

    /// Silent failure: the command already reported on stdout.
    pub fn quiet(code: u8) -> Self {
        Self::new(code, "")
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<CatalogError> for CliError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::UnknownMetrics(_) => Self::new(EXIT_UNKNOWN_METRIC, err.to_string())
                .with_hint("run `kpiform metrics` to list the available metrics"),
            CatalogError::Io(_) => Self::io(err.to_string()),
            CatalogError::Parse(_) => Self::io(err.to_string())
                .with_hint("a catalog is a JSON array of {\"id\", \"displayLabel\"} objects"),
        }
    }
}

// ============================================================================
// Output
// ============================================================================

struct Output {
    pretty: bool,
}

impl Output {
    fn json<T: Serialize>(&self, value: &T) -> Result<(), CliError> {
        let text = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(|e| CliError::general(format!("cannot serialize output: {}", e)))?;
        write_line(&text)
    }
}

fn write_line(text: &str) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", text).map_err(|e| CliError::io(e.to_string()))
}

/// Formula argument, or stdin for `-`. A single trailing newline is dropped.
fn read_input(arg: String) -> Result<String, CliError> {
    if arg != "-" {
        return Ok(arg);
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| CliError::io(format!("reading stdin: {}", e)))?;
    if buf.ends_with('\n') {
        buf.pop();
        if buf.ends_with('\r') {
            buf.pop();
        }
    }
    Ok(buf)
}

fn load_catalog(settings: &Settings, flag: Option<PathBuf>) -> Result<Option<StaticCatalog>, CliError> {
    let Some(path) = flag.or_else(|| settings.catalog_path.clone()) else {
        return Ok(None);
    };
    log::debug!("loading catalog from {}", path.display());
    Ok(Some(StaticCatalog::load(&path)?))
}

// ============================================================================
// validate
// ============================================================================

#[derive(Serialize)]
struct ValidateReport {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

fn cmd_validate(settings: &Settings, out: &Output, formula: String, json: bool) -> Result<(), CliError> {
    let formula = read_input(formula)?;
    let result = settings.validator().validate(&formula);

    if json {
        let report = match &result {
            Ok(()) => ValidateReport { valid: true, code: None, message: None },
            Err(e) => ValidateReport {
                valid: false,
                code: Some(e.code()),
                message: Some(e.to_string()),
            },
        };
        out.json(&report)?;
        return match result {
            Ok(()) => Ok(()),
            Err(_) => Err(CliError::quiet(EXIT_INVALID_FORMULA)),
        };
    }

    match result {
        Ok(()) => write_line("valid"),
        Err(e) => Err(CliError::invalid(e.to_string())),
    }
}

// ============================================================================
// build
// ============================================================================

fn cmd_build(settings: &Settings, out: &Output, formula: String, catalog: Option<PathBuf>) -> Result<(), CliError> {
    let formula = read_input(formula)?;
    let tree = settings
        .validator()
        .compile(&formula)
        .map_err(|e| CliError::invalid(e.to_string()))?;

    if tree.has_placeholder() {
        log::warn!("tree contains empty placeholder nodes for unsupported functions");
    }
    if let Some(catalog) = load_catalog(settings, catalog)? {
        catalog.check_tree(&tree)?;
    }

    out.json(&tree)
}

// ============================================================================
// tokens
// ============================================================================

#[derive(Serialize)]
struct TokenReport {
    start: usize,
    end: usize,
    text: String,
    body: String,
}

#[derive(Serialize)]
struct TokensReport {
    formula: String,
    tokens: Vec<TokenReport>,
}

fn cmd_tokens(out: &Output, formula: String) -> Result<(), CliError> {
    let formula = read_input(formula)?;
    let tokens = scanner::scan(&formula)
        .into_iter()
        .map(|t| TokenReport {
            start: t.start,
            end: t.end,
            text: t.text(&formula),
            body: t.body(&formula),
        })
        .collect();
    out.json(&TokensReport { formula, tokens })
}

// ============================================================================
// format
// ============================================================================

fn cmd_format(tree: String) -> Result<(), CliError> {
    let json = read_input(tree)?;
    let tree: CalculationNode =
        serde_json::from_str(&json).map_err(|e| CliError::usage(format!("invalid tree: {}", e)))?;
    if tree.has_placeholder() {
        return Err(CliError::general("tree contains an empty node and has no formula text"));
    }
    write_line(&format_formula(&tree))
}

// ============================================================================
// edit
// ============================================================================

fn cmd_edit(settings: &Settings, formula: &str) -> Result<(), CliError> {
    let mut session = EditSession::with_formula(formula, settings.editor_options(), settings.unknown_functions);

    let stdin = io::stdin();
    for (index, line) in stdin.lock().lines().enumerate() {
        let line = line.map_err(|e| CliError::io(format!("reading stdin: {}", e)))?;
        if line.trim().is_empty() {
            continue;
        }

        let op: EditOp = serde_json::from_str(&line)
            .map_err(|e| CliError::usage(format!("line {}: invalid edit op: {}", index + 1, e)))?;
        let outcome = session.apply(&op);
        log::debug!("edit op line {}: applied={}", index + 1, outcome.is_applied());

        // One compact state per line regardless of --pretty.
        let state = serde_json::to_string(&session.state(outcome))
            .map_err(|e| CliError::general(format!("cannot serialize state: {}", e)))?;
        write_line(&state)?;
    }

    Ok(())
}

// ============================================================================
// indicator
// ============================================================================

fn cmd_indicator(
    settings: &Settings,
    out: &Output,
    name: String,
    formula: String,
    flip: bool,
    scope: IndicatorScope,
    catalog: Option<PathBuf>,
) -> Result<(), CliError> {
    let draft = IndicatorDraft {
        name,
        formula: read_input(formula)?,
        flip,
    };

    let entity = draft.to_entity(&settings.validator(), &scope).map_err(|e| match e {
        DraftError::NameRequired => CliError::invalid(e.to_string()).with_hint("pass --name"),
        DraftError::Formula(_) => CliError::invalid(e.to_string()),
    })?;
    if let Some(catalog) = load_catalog(settings, catalog)? {
        catalog.check_tree(&entity.attributes.expression)?;
    }

    out.json(&entity)
}

// ============================================================================
// metrics
// ============================================================================

fn cmd_metrics(settings: &Settings, out: &Output, catalog: Option<PathBuf>) -> Result<(), CliError> {
    let catalog = load_catalog(settings, catalog)?.ok_or_else(|| {
        CliError::usage("no metric catalog").with_hint("pass --catalog or set \"catalog.path\" in settings")
    })?;
    out.json(&catalog.selectable())
}

// ============================================================================
// config
// ============================================================================

fn cmd_config(settings: &Settings, path: Option<&Path>, command: ConfigCommands) -> Result<(), CliError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(Settings::config_path);
    match command {
        ConfigCommands::Path => write_line(&path.to_string_lossy()),
        ConfigCommands::Init { force } => {
            let existed = path.exists();
            Settings::create_default_file(&path, force).map_err(|e| {
                let err = CliError::io(e);
                if existed && !force {
                    err.with_hint("use --force to overwrite")
                } else {
                    err
                }
            })?;
            log::info!("wrote {}", path.display());
            write_line(&path.to_string_lossy())
        }
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(settings).map_err(|e| CliError::general(e.to_string()))?;
            write_line(&json)
        }
    }
}
