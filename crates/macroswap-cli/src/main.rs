use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use macroswap_core::{Config, Report, Severity};
use macroswap_expander::{ExpansionSession, MacroProcessor, ProcessStats, Router};

const DEFAULT_CONFIG: &str = "macroswap.toml";

/// macroswap - reversible macro substitution around SQL translation
#[derive(Parser)]
#[command(name = "macroswap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: macroswap.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write a JSON report of every diagnostic to this file
    #[arg(short, long, global = true)]
    report: Option<PathBuf>,

    /// Exit with an error when any warning was raised
    #[arg(long, global = true)]
    deny_warnings: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace macros before translation
    Expand {
        /// Directory holding the original scripts
        #[arg(short, long)]
        input: PathBuf,

        /// Directory receiving the expanded scripts
        #[arg(short, long)]
        output: PathBuf,

        /// Where to save the bookkeeping needed by un-expand
        #[arg(short, long, default_value = ".macroswap-session.json")]
        session: PathBuf,
    },

    /// Restore macros after translation
    UnExpand {
        /// Directory holding the translated scripts
        #[arg(short, long)]
        input: PathBuf,

        /// Directory receiving the restored scripts
        #[arg(short, long)]
        output: PathBuf,

        /// Session file written by expand
        #[arg(short, long, default_value = ".macroswap-session.json")]
        session: PathBuf,
    },

    /// Show which expander each file would be routed to
    Route {
        /// File names to route
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Validate the config and list the routing table
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config = load_config(cli.config.as_deref())?;

    let report = match &cli.command {
        Commands::Expand { input, output, session } => {
            Some(expand_command(&config, input, output, session)?)
        }
        Commands::UnExpand { input, output, session } => {
            Some(un_expand_command(&config, input, output, session)?)
        }
        Commands::Route { files } => {
            route_command(&config, files)?;
            None
        }
        Commands::Check => {
            check_command(&config)?;
            None
        }
    };

    if let Some(mut report) = report {
        if cli.deny_warnings {
            report = report.deny_warnings();
        }

        if let Some(path) = &cli.report {
            report.save_to_file(path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!(path = %path.display(), "Report saved");
        }

        print_report_summary(&report);

        if report.has_errors() {
            std::process::exit(1);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = if let Some(config_path) = path {
        Config::from_file(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?
    } else if Path::new(DEFAULT_CONFIG).exists() {
        Config::from_file(Path::new(DEFAULT_CONFIG))?
    } else {
        info!("No config file found, using defaults");
        Config::default()
    };

    if config.expanders.is_empty() {
        warn!("No expanders configured: files will be copied unchanged");
    }

    Ok(config)
}

/// Expand command - pre-translation pass
fn expand_command(
    config: &Config,
    input: &Path,
    output: &Path,
    session_path: &Path,
) -> Result<Report> {
    let processor = MacroProcessor::from_config(config)?;
    let mut session = ExpansionSession::new();

    info!(input = %input.display(), output = %output.display(), "Expanding");

    let stats = processor.preprocess(&mut session, input, output)?;
    let diagnostics = session.drain_diagnostics();

    session.save_to_file(session_path)
        .with_context(|| format!("Failed to save session to {}", session_path.display()))?;

    log_stats("expand", &stats);
    info!(path = %session_path.display(), "Session saved");

    Ok(Report::from_diagnostics("expand", diagnostics)
        .with_file_counts(stats.files_seen, stats.files_transformed))
}

/// Un-expand command - post-translation pass
fn un_expand_command(
    config: &Config,
    input: &Path,
    output: &Path,
    session_path: &Path,
) -> Result<Report> {
    let processor = MacroProcessor::from_config(config)?;
    let mut session = ExpansionSession::from_file(session_path)
        .with_context(|| format!("Failed to load session {}. Run 'macroswap expand' first.", session_path.display()))?;

    info!(input = %input.display(), output = %output.display(), "Un-expanding");

    let stats = processor.postprocess(&mut session, input, output)?;

    log_stats("un-expand", &stats);

    Ok(Report::from_diagnostics("un-expand", session.drain_diagnostics())
        .with_file_counts(stats.files_seen, stats.files_transformed))
}

/// Route command - explain routing decisions
fn route_command(config: &Config, files: &[String]) -> Result<()> {
    let router = Router::from_config(config)?;

    for file in files {
        match router.explain(file) {
            None => println!("{} {}", file.bold(), "(no route, passed through)".dimmed()),
            Some(decision) => {
                println!("{} -> {} via '{}'", file.bold(), decision.expander.green(), decision.pattern);
                if decision.is_ambiguous() {
                    println!(
                        "  {} also matches: {}",
                        "⚠".yellow(),
                        decision.matches.join(", ").yellow()
                    );
                }
            }
        }
    }

    Ok(())
}

/// Check command - validate configuration
fn check_command(config: &Config) -> Result<()> {
    let router = Router::from_config(config)?;

    println!("{}", "✓ Configuration is valid".green().bold());
    println!("Tie-break: {:?}", router.tie_break());
    println!("Skipped extensions: {}", config.processing.skip_extensions.join(", "));
    println!();

    if router.is_empty() {
        println!("{}", "No routes configured".yellow());
        return Ok(());
    }

    println!("{}", "Routes (in registration order):".bold());
    for (i, (pattern, expander)) in router.routes().enumerate() {
        println!("  {}. {} -> {}", i + 1, pattern.cyan(), expander);
    }

    Ok(())
}

fn log_stats(stage: &str, stats: &ProcessStats) {
    info!(
        stage,
        seen = stats.files_seen,
        routed = stats.files_transformed,
        copied = stats.files_copied,
        "Stage finished"
    );
}

/// Print report summary to stdout
fn print_report_summary(report: &Report) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{} ({})", "Macro Substitution Report".bold().bright_blue(), report.stage);
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Files seen:        {}", report.summary.files_seen);
    println!("Files transformed: {}", report.summary.files_transformed);
    println!();

    if report.summary.errors > 0 {
        println!("  Errors:   {}", format!("{}", report.summary.errors).red());
    } else {
        println!("  Errors:   {}", format!("{}", report.summary.errors).green());
    }
    if report.summary.warnings > 0 {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).yellow());
    } else {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).green());
    }
    println!();

    if report.diagnostics.is_empty() {
        println!("{}", "✓ No issues found!".green().bold());
    } else {
        println!("{}", "Diagnostics:".bold());
        for diag in &report.diagnostics {
            let severity_str = match diag.severity {
                Severity::Error => "ERROR".red().bold(),
                Severity::Warn => "WARN".yellow().bold(),
            };

            println!("  [{}] {}: {}", severity_str, diag.code, diag.message);

            if let Some(loc) = &diag.location {
                print!("    at {}", loc.file);
                if let Some(line) = loc.line {
                    print!(":{}", line);
                }
                println!();
            }

            if let (Some(exp), Some(act)) = (&diag.expected, &diag.actual) {
                println!("    Expected: {}", exp);
                println!("    Actual:   {}", act);
            }

            if !diag.candidates.is_empty() {
                println!("    Candidates: {}", diag.candidates.join(", "));
            }
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_expand_defaults() {
        let cli = Cli::try_parse_from(["macroswap", "expand", "-i", "in", "-o", "out"]).unwrap();
        match cli.command {
            Commands::Expand { input, output, session } => {
                assert_eq!(input, PathBuf::from("in"));
                assert_eq!(output, PathBuf::from("out"));
                assert_eq!(session, PathBuf::from(".macroswap-session.json"));
            }
            _ => panic!("expected expand"),
        }
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "macroswap", "un-expand", "-i", "in", "-o", "out", "--deny-warnings", "-r", "report.json",
        ])
        .unwrap();
        assert!(cli.deny_warnings);
        assert_eq!(cli.report, Some(PathBuf::from("report.json")));
        assert!(matches!(cli.command, Commands::UnExpand { .. }));
    }
}
