use clap::{Parser, Subcommand};
use colored::Colorize;
use dashc_core::config::Config;
use dashc_core::datasource::parse_queries;
use dashc_core::state::coerce;
use dashc_core::store::DashboardStore;
use dashc_core::{Compiler, Error};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

/// dashc: security-validated dashboard compiler
///
/// Check, compile, inspect, render and store `.dash` dashboard documents.
#[derive(Parser)]
#[command(name = "dashc", version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: ./dashc.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress normal output; rely on the exit code
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a document without printing code
    Check {
        /// Path to .dash file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compile a document to a dashc module
    Compile {
        /// Path to .dash file
        file: PathBuf,
        /// Print the full artifact as JSON
        #[arg(long)]
        json: bool,
        /// Write the module to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show classified components and initial input state as JSON
    Inspect {
        /// Path to .dash file
        file: PathBuf,
    },

    /// Render a document against its input state
    Render {
        /// Path to .dash file
        file: PathBuf,
        /// Override an input: --set name=value (repeatable)
        #[arg(long = "set", value_name = "NAME=VALUE")]
        sets: Vec<String>,
    },

    /// SHA-256 of the compiled module
    Hash {
        /// Path to .dash file
        file: PathBuf,
    },

    /// Compile and store a page
    Save {
        /// Document name
        doc: String,
        /// Page name
        page: String,
        /// Path to .dash file
        file: PathBuf,
    },

    /// Print a stored page's source
    Load {
        /// Document name
        doc: String,
        /// Page name
        page: String,
        /// Print the whole record as JSON
        #[arg(long)]
        json: bool,
    },

    /// List stored documents and pages
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the named queries in a query file
    Queries {
        /// Path to a query file (default: the configured query file)
        file: Option<PathBuf>,
        /// Read the query file of a stored document instead
        #[arg(long, conflicts_with = "file")]
        doc: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

/// Exit codes: 0 = success, 1 = the document was rejected, 2 = error
const EXIT_OK: i32 = 0;
const EXIT_REJECTED: i32 = 1;
const EXIT_ERROR: i32 = 2;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            EXIT_ERROR
        }
    };

    process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("warn,dashc_core=debug,dashc=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> dashc_core::Result<i32> {
    let cwd = std::env::current_dir()?;
    let config = Config::discover(cli.config.as_deref(), &cwd)?;
    tracing::debug!(
        policy = %config.compiler.policy,
        store = %config.store.root.display(),
        "configuration loaded"
    );
    let compiler = Compiler::from_config(&config);
    let out = Output { quiet: cli.quiet };

    match &cli.command {
        Commands::Check { file, json } => {
            let source = read_source(file)?;
            let artifact = compiler.compile(&source, &logical_name(file, &config));
            let violations: Vec<&str> = artifact.error.as_deref().map(|e| e.lines().collect()).unwrap_or_default();
            if *json {
                out.json(&json!({
                    "valid": artifact.success,
                    "errors": violations.len(),
                    "category": artifact.error_category,
                    "violations": violations,
                    "warnings": artifact.warnings,
                }))?;
            } else if artifact.success {
                out.line(format!("{} {} is valid", "✓".green(), file.display()));
                report_warnings(&artifact.warnings);
            } else {
                report_violations(artifact.error_category.as_deref(), &violations);
            }
            Ok(if artifact.success { EXIT_OK } else { EXIT_REJECTED })
        }

        Commands::Compile { file, json, output } => {
            let source = read_source(file)?;
            let artifact = compiler.compile(&source, &logical_name(file, &config));
            if *json {
                out.json(&artifact)?;
            } else if let Some(code) = artifact.code.as_deref() {
                match output {
                    Some(path) => {
                        std::fs::write(path, code)?;
                        out.line(format!("{} wrote {}", "✓".green(), path.display()));
                    }
                    None => out.raw(code),
                }
                report_warnings(&artifact.warnings);
            } else {
                let error = artifact.error.as_deref().unwrap_or_default();
                report_violations(artifact.error_category.as_deref(), &error.lines().collect::<Vec<_>>());
            }
            Ok(if artifact.success { EXIT_OK } else { EXIT_REJECTED })
        }

        Commands::Inspect { file } => {
            let source = read_source(file)?;
            let analysis = dashc_core::classifier::analyze_with(&source, compiler.registry());
            out.json(&analysis)?;
            Ok(if analysis.errors.is_empty() { EXIT_OK } else { EXIT_REJECTED })
        }

        Commands::Render { file, sets } => {
            let source = read_source(file)?;
            let artifact = compiler.compile(&source, &logical_name(file, &config));
            let Some(component) = artifact.component.as_ref() else {
                let error = artifact.error.as_deref().unwrap_or_default();
                report_violations(artifact.error_category.as_deref(), &error.lines().collect::<Vec<_>>());
                return Ok(EXIT_REJECTED);
            };
            let mut state = component.initial_state();
            for set in sets {
                let (name, value) = set.split_once('=').ok_or_else(|| {
                    Error::Config(format!("Invalid --set '{}': expected NAME=VALUE", set))
                })?;
                let param = component
                    .params()
                    .iter()
                    .find(|p| p.name() == Some(name))
                    .ok_or_else(|| Error::Config(format!("Unknown input '{}'", name)))?;
                state.set(name, coerce(&Value::String(value.to_string()), param.value_type));
            }
            out.json(&json!({
                "inputs": state,
                "tree": component.render(&state),
            }))?;
            Ok(EXIT_OK)
        }

        Commands::Hash { file } => {
            let source = read_source(file)?;
            let artifact = compiler.compile(&source, &logical_name(file, &config));
            match artifact.digest() {
                Some(digest) => {
                    out.line(digest);
                    Ok(EXIT_OK)
                }
                None => {
                    let error = artifact.error.as_deref().unwrap_or_default();
                    report_violations(artifact.error_category.as_deref(), &error.lines().collect::<Vec<_>>());
                    Ok(EXIT_REJECTED)
                }
            }
        }

        Commands::Save { doc, page, file } => {
            let source = read_source(file)?;
            let store = DashboardStore::new(config.store.root.clone(), compiler);
            let result = store.save(doc, page, &source)?;
            if result.success {
                out.line(format!(
                    "{} {}",
                    "✓".green(),
                    result.message.as_deref().unwrap_or_default()
                ));
                report_warnings(&result.warnings);
                Ok(EXIT_OK)
            } else {
                let error = result.error.as_deref().unwrap_or_default();
                report_violations(None, &error.lines().collect::<Vec<_>>());
                Ok(EXIT_REJECTED)
            }
        }

        Commands::Load { doc, page, json } => {
            let store = DashboardStore::from_config(&config);
            let record = store.load(doc, page)?;
            if *json {
                out.json(&record)?;
            } else {
                out.raw(&record.source);
            }
            Ok(EXIT_OK)
        }

        Commands::List { json } => {
            let store = DashboardStore::from_config(&config);
            let documents = store.list()?;
            if *json {
                out.json(&documents)?;
            } else {
                for (doc, pages) in &documents {
                    out.line(format!("{}: {}", doc.bold(), pages.join(", ")));
                }
            }
            Ok(EXIT_OK)
        }

        Commands::Queries { file, doc, json } => {
            let text = match (file, doc) {
                (_, Some(doc)) => DashboardStore::from_config(&config).load_queries(doc)?,
                (Some(file), None) => read_source(file)?,
                (None, None) => read_source(Path::new(&config.data.query_file))?,
            };
            let queries = parse_queries(&text);
            if *json {
                out.json(&queries)?;
            } else {
                for (name, body) in &queries {
                    out.line(format!("-- {}", name.cyan()));
                    out.line(body.clone());
                }
            }
            Ok(EXIT_OK)
        }

        Commands::Version => {
            println!(
                "dashc {} (dashc-core {})",
                env!("CARGO_PKG_VERSION"),
                dashc_core::VERSION
            );
            println!("Script policy: {}", config.compiler.policy);
            Ok(EXIT_OK)
        }
    }
}

// ── Helpers ───────────────────────────────────────────────

struct Output {
    quiet: bool,
}

impl Output {
    fn line(&self, text: impl std::fmt::Display) {
        if !self.quiet {
            println!("{}", text);
        }
    }

    fn raw(&self, text: &str) {
        if !self.quiet {
            print!("{}", text);
        }
    }

    fn json(&self, value: &impl serde::Serialize) -> dashc_core::Result<()> {
        let text = serde_json::to_string_pretty(value)?;
        self.line(text);
        Ok(())
    }
}

fn read_source(path: &Path) -> dashc_core::Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::Io(std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e))))
}

/// Filename recorded in the module header
fn logical_name(path: &Path, config: &Config) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| config.compiler.default_filename.clone())
}

fn report_violations(category: Option<&str>, violations: &[&str]) {
    let label = category.unwrap_or("error");
    eprintln!("{} {} ({} found)", "error:".red().bold(), label, violations.len());
    for violation in violations {
        eprintln!("  {} {}", "-".red(), violation);
    }
}

fn report_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("{} {}", "warning:".yellow().bold(), warning);
    }
}
