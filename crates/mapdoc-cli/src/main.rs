use clap::{Parser, Subcommand};
use colored::Colorize;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walkdir::WalkDir;

use mapdoc_core::{
    ColumnMapping, Config, Diagnostic, DiagnosticCode, Location, ModelLineage, Report, Severity,
    UpstreamAliases,
};
use mapdoc_sql::{Extraction, LineageExtractor};

/// mapdoc - column lineage for dbt mapping documents
#[derive(Parser)]
#[command(name = "mapdoc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: mapdoc.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract column lineage from one model file
    Extract {
        /// Model SQL file
        file: PathBuf,

        /// Terminal CTE name, overriding the config
        #[arg(long)]
        cte: Option<String>,

        /// Print the lineage as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract lineage for every model under a directory
    Scan {
        /// Models directory
        dir: PathBuf,

        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,

        /// Also output markdown report
        #[arg(short, long)]
        markdown: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    // Load config if specified
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?
    } else if Path::new("mapdoc.toml").exists() {
        Config::from_file(Path::new("mapdoc.toml")).context("Failed to load mapdoc.toml")?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    if cli.verbose {
        eprintln!(
            "{} locator: {:?}, mode: {:?}",
            "Using".cyan(),
            config.locator,
            config.mode
        );
    }

    let has_errors = match cli.command {
        Commands::Extract { file, cte, json } => {
            extract_command(&config, &file, cte.as_deref(), json)?
        }
        Commands::Scan { dir, output, markdown } => {
            scan_command(&config, &dir, &output, markdown.as_deref(), cli.verbose)?
        }
    };

    // Exit with error code if there are errors
    if has_errors {
        std::process::exit(1);
    }

    Ok(())
}

/// Model name of a SQL file: its file stem
fn model_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Extract command - lineage of a single model
fn extract_command(config: &Config, file: &Path, cte: Option<&str>, json: bool) -> Result<bool> {
    let sql = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read SQL file {}", file.display()))?;
    let model = model_name(file);

    let extractor = LineageExtractor::new(config);
    let Extraction { lineage, diagnostics } = match cte {
        Some(cte) => extractor.extract_with_cte(&model, &sql, cte),
        None => extractor.extract_model(&model, &sql),
    };

    let mut report = Report::new();
    report.add_model(lineage, diagnostics);

    if json {
        println!("{}", report.to_json()?);
    } else {
        for lineage in &report.models {
            print_model_lineage(lineage, &config.upstream_aliases);
        }
        print_diagnostics(&report.diagnostics);
    }

    Ok(report.has_errors())
}

/// Scan command - lineage report for a models directory
fn scan_command(
    config: &Config,
    dir: &Path,
    output: &Path,
    markdown: Option<&Path>,
    verbose: bool,
) -> Result<bool> {
    if !dir.is_dir() {
        anyhow::bail!("Models directory not found: {}", dir.display());
    }

    let extractor = LineageExtractor::new(config);
    let mut report = Report::new();

    let files = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "sql"));

    for entry in files {
        let path = entry.path();
        let model = model_name(path);

        if config.allowlist.is_model_skipped(&model) {
            tracing::info!(model = %model, "skipped by allowlist");
            continue;
        }

        if verbose {
            eprintln!("  {} {}...", "Extracting".cyan(), model);
        }

        let sql = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable model file");
                report.add_diagnostic(
                    Diagnostic::new(
                        DiagnosticCode::IoError,
                        config.severity_for(DiagnosticCode::IoError),
                        format!("Failed to read SQL file {}: {}", path.display(), e),
                    )
                    .with_location(Location::new(path.display().to_string())),
                );
                continue;
            }
        };

        let Extraction { lineage, diagnostics } = extractor.extract_model(&model, &sql);
        if verbose {
            eprintln!(
                "    {} columns, {} diagnostics",
                lineage.columns.len(),
                diagnostics.len()
            );
        }
        report.add_model(lineage, diagnostics);
    }

    // Save JSON report
    report
        .save_to_file(output)
        .with_context(|| format!("Failed to write report {}", output.display()))?;

    if verbose {
        eprintln!("{} {}", "Report saved to:".green(), output.display());
    }

    // Save markdown report if requested
    if let Some(md_path) = markdown {
        let markdown_content = generate_markdown_report(&report, &config.upstream_aliases);
        std::fs::write(md_path, markdown_content)
            .with_context(|| format!("Failed to write markdown report {}", md_path.display()))?;
        if verbose {
            eprintln!("{} {}", "Markdown report saved to:".green(), md_path.display());
        }
    }

    print_report_summary(&report);

    Ok(report.has_errors())
}

/// `R3` for a column passed through unchanged, `R3+` for a transformed one
fn classify(column: &ColumnMapping) -> &'static str {
    let passthrough = column.expression.eq_ignore_ascii_case("null")
        || column
            .primary_source()
            .is_some_and(|source| column.expression.eq_ignore_ascii_case(&source.to_string()));

    if passthrough {
        "R3"
    } else {
        "R3+"
    }
}

/// Source column, upstream table and logic text of one column
fn column_cells(column: &ColumnMapping, aliases: &UpstreamAliases) -> (String, String, String) {
    let source = column
        .primary_source()
        .map(ToString::to_string)
        .unwrap_or_default();
    let tables = column.upstream_tables(aliases).join(", ");
    (source, tables, column.display_logic())
}

/// Print one model's column table to stdout
fn print_model_lineage(lineage: &ModelLineage, aliases: &UpstreamAliases) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{} {}", "Model:".bold(), lineage.model.green());
    println!("{}", "=".repeat(60).bright_blue());

    if let Some(cte) = &lineage.terminal_cte {
        println!("Terminal CTE: {}", cte);
    }
    if !lineage.upstream.is_empty() {
        let upstream: Vec<String> = lineage.upstream.iter().map(ToString::to_string).collect();
        println!("Upstream:     {}", upstream.join(", "));
    }
    if !lineage.ctes.is_empty() {
        println!("CTEs:         {}", lineage.ctes.join(", "));
    }
    println!();

    for column in &lineage.columns {
        let (source, tables, logic) = column_cells(column, aliases);
        let kind = match classify(column) {
            "R3" => "R3 ".green(),
            other => other.yellow(),
        };

        println!("  {} {}", kind, column.alias.bold());
        if !source.is_empty() {
            print!("      from {}", source);
            if !tables.is_empty() {
                print!(" ({})", tables);
            }
            println!();
        }
        println!("      {}", logic.dimmed());
    }

    if lineage.skipped_expressions > 0 {
        println!();
        println!(
            "  {} expressions skipped (no alias)",
            lineage.skipped_expressions.to_string().yellow()
        );
    }
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    if diagnostics.is_empty() {
        return;
    }

    println!();
    println!("{}", "Diagnostics:".bold());
    for diag in diagnostics {
        let severity_str = match diag.severity {
            Severity::Error => "ERROR".red().bold(),
            Severity::Warn => "WARN".yellow().bold(),
            Severity::Info => "INFO".cyan(),
        };

        println!("  [{}] {}: {}", severity_str, diag.code, diag.message);

        if let Some(loc) = &diag.location {
            println!("    at {}", loc);
        }
        if let Some(snippet) = &diag.snippet {
            println!("    {}", snippet.dimmed());
        }
    }
}

/// Print report summary to stdout
fn print_report_summary(report: &Report) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Column Lineage Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!();

    let summary = &report.summary;
    println!("{}", "Summary:".bold());
    println!("  Models:   {}", summary.models);
    println!("  Columns:  {}", summary.columns);
    println!(
        "  CASE:     {} of {} conditional columns decomposed",
        summary.case_logic_extracted, summary.conditional_columns
    );

    if summary.skipped_expressions > 0 {
        println!("  Skipped:  {}", summary.skipped_expressions.to_string().yellow());
    }

    if summary.errors > 0 {
        println!("  Errors:   {}", summary.errors.to_string().red().bold());
    } else {
        println!("  Errors:   {}", summary.errors.to_string().green());
    }

    if summary.warnings > 0 {
        println!("  Warnings: {}", summary.warnings.to_string().yellow());
    } else {
        println!("  Warnings: {}", summary.warnings.to_string().green());
    }

    println!("  Info:     {}", summary.info);

    if report.diagnostics.is_empty() {
        println!();
        println!("{}", "✓ No issues found!".green().bold());
    } else {
        print_diagnostics(&report.diagnostics);
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

/// Generate markdown report
fn generate_markdown_report(report: &Report, aliases: &UpstreamAliases) -> String {
    let mut md = String::new();

    md.push_str("# Column Lineage Report\n\n");
    md.push_str(&format!("**Version:** {}\n\n", report.version));
    md.push_str(&format!("**Timestamp:** {}\n\n", report.timestamp));

    md.push_str("## Summary\n\n");
    md.push_str(&format!("- Models: {}\n", report.summary.models));
    md.push_str(&format!("- Columns: {}\n", report.summary.columns));
    md.push_str(&format!(
        "- CASE logic extracted: {} of {}\n",
        report.summary.case_logic_extracted, report.summary.conditional_columns
    ));
    md.push_str(&format!("- Skipped expressions: {}\n", report.summary.skipped_expressions));
    md.push_str(&format!("- Errors: {}\n", report.summary.errors));
    md.push_str(&format!("- Warnings: {}\n", report.summary.warnings));
    md.push('\n');

    for lineage in &report.models {
        md.push_str(&format!("## {}\n\n", lineage.model));

        if !lineage.upstream.is_empty() {
            let upstream: Vec<String> = lineage.upstream.iter().map(|u| format!("`{}`", u)).collect();
            md.push_str(&format!("**Upstream:** {}\n\n", upstream.join(", ")));
        }

        if lineage.columns.is_empty() {
            md.push_str("_No columns extracted._\n\n");
            continue;
        }

        md.push_str("| Column | Source | Upstream table | R3/R3+ | Logic |\n");
        md.push_str("|---|---|---|---|---|\n");
        for column in &lineage.columns {
            let (source, tables, logic) = column_cells(column, aliases);
            md.push_str(&format!(
                "| {} | {} | {} | {} | `{}` |\n",
                column.alias,
                source,
                tables,
                classify(column),
                escape_cell(&logic)
            ));
        }
        md.push('\n');
    }

    if !report.diagnostics.is_empty() {
        md.push_str("## Diagnostics\n\n");

        for diag in &report.diagnostics {
            md.push_str(&format!("- **{}** {}: {}", diag.severity, diag.code, diag.message));
            if let Some(loc) = &diag.location {
                md.push_str(&format!(" ({})", loc));
            }
            md.push('\n');
        }
    }

    md
}
