use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use statement_analyzer::{
    category_totals, export_ledger, export_summaries, find_near_duplicates, load_ledger, open_database,
    record_import, save_ledger, summarize, top_categories, AnalyzerConfig, CategoryRuleSet, ExportFormat,
    Granularity, ImportSession, Importer, SharedLedger, StatementOverview, StatementSource,
};

#[derive(Parser, Debug)]
#[command(name = "statement-analyzer", version, about = "Parse, deduplicate and categorize bank statements")]
struct Cli {
    /// SQLite ledger database
    #[arg(long, global = true, default_value = "statements.db")]
    db: PathBuf,

    /// Analyzer configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Category rules (JSON array, evaluated in order)
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import statements: `.csv` files as delimited exports, anything else as extracted text
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Category totals per period
    Summary {
        #[arg(long, default_value_t = Granularity::Month)]
        granularity: Granularity,

        /// Also print the N largest spending categories
        #[arg(long)]
        top: Option<usize>,
    },

    /// Write the ledger (or its summaries) as CSV or JSON
    Export {
        #[arg(long, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,

        /// Export summaries instead of transactions
        #[arg(long)]
        summaries: bool,

        #[arg(long, default_value_t = Granularity::Month)]
        granularity: Granularity,

        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Income, expenses and net over the whole ledger
    Overview,

    /// List likely duplicates the fingerprint kept apart
    Duplicates {
        /// Date window in days
        #[arg(long, default_value_t = 1)]
        tolerance: i64,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Import { files } => run_import(&cli, files)?,
        Command::Summary { granularity, top } => run_summary(&cli, *granularity, *top)?,
        Command::Export {
            format,
            summaries,
            granularity,
            output,
        } => run_export(&cli, *format, *summaries, *granularity, output.as_deref())?,
        Command::Overview => run_overview(&cli)?,
        Command::Duplicates { tolerance } => run_duplicates(&cli, *tolerance)?,
    }

    Ok(())
}

fn build_importer(cli: &Cli) -> Result<Importer> {
    let config = match &cli.config {
        Some(path) => AnalyzerConfig::from_file(path)?,
        None => AnalyzerConfig::default(),
    };
    let rules = match &cli.rules {
        Some(path) => CategoryRuleSet::from_file(path)?,
        None => CategoryRuleSet::defaults(),
    };
    Importer::new(config, rules)
}

fn read_source(path: &Path) -> Result<StatementSource> {
    let statement_id = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let is_csv = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"));

    if is_csv {
        let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(StatementSource::csv(statement_id, data))
    } else {
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(StatementSource::text(statement_id, text))
    }
}

fn run_import(cli: &Cli, files: &[PathBuf]) -> Result<()> {
    println!("📥 Statement Import");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = open_database(&cli.db)?;
    let existing = load_ledger(&conn)?;
    println!("✓ Ledger loaded: {} transactions", existing.len());

    let importer = build_importer(cli)?;
    let session = ImportSession::new(importer).with_ledger(SharedLedger::new(existing));

    let sources = files.iter().map(|path| read_source(path)).collect::<Result<Vec<_>>>()?;
    let ids: Vec<String> = sources.iter().map(|s| s.statement_id().to_string()).collect();
    let outcomes = session.import_all(sources);

    let mut failed = 0;
    for (statement_id, outcome) in ids.iter().zip(&outcomes) {
        record_import(&conn, statement_id, outcome)?;

        match outcome {
            Ok(report) => {
                println!("\n📄 {} ({})", statement_id, report.import.layout);
                if let Some(period) = report.import.period {
                    println!("   Period: {} to {}", period.start, period.end);
                }
                println!("✓ Parsed: {} transactions", report.import.transactions.len());
                println!("✓ Inserted: {}", report.merge.inserted);
                println!("✓ Skipped duplicates: {}", report.merge.duplicates);
                if report.import.collapsed_within_statement > 0 {
                    println!(
                        "⚠️  {} identical records collapsed (see `duplicates`)",
                        report.import.collapsed_within_statement
                    );
                }
                for skipped in &report.import.skipped {
                    println!("   ✗ line {} [{}] {}", skipped.line_range, skipped.reason, skipped.detail);
                }
            }
            Err(err) => {
                failed += 1;
                println!("\n❌ {}: {}", statement_id, err);
            }
        }
    }

    let saved = save_ledger(&conn, &session.ledger().snapshot())?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Saved: {} new rows", saved.inserted);
    println!("✓ Ledger contains {} transactions", session.ledger().len());
    if failed > 0 {
        println!("❌ {} of {} statements rejected", failed, outcomes.len());
    }

    Ok(())
}

fn run_summary(cli: &Cli, granularity: Granularity, top: Option<usize>) -> Result<()> {
    let conn = open_database(&cli.db)?;
    let ledger = load_ledger(&conn)?;
    let summaries = summarize(&ledger, granularity);

    println!("📊 Summary by {}", granularity);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for summary in &summaries {
        println!(
            "{:<10} {:<20} {:>12} ({})",
            summary.period,
            summary.category,
            summary.total.to_string(),
            summary.count
        );
    }

    if let Some(n) = top {
        println!("\n🏆 Top {} spending categories", n);
        for total in top_categories(&summaries, n) {
            println!("{:<20} {:>12} ({})", total.category, total.total.to_string(), total.count);
        }
    } else {
        println!("\nAll periods:");
        for total in category_totals(&ledger) {
            println!("{:<20} {:>12} ({})", total.category, total.total.to_string(), total.count);
        }
    }

    Ok(())
}

fn run_export(
    cli: &Cli,
    format: ExportFormat,
    summaries: bool,
    granularity: Granularity,
    output: Option<&Path>,
) -> Result<()> {
    let conn = open_database(&cli.db)?;
    let ledger = load_ledger(&conn)?;

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            Box::new(File::create(path).with_context(|| format!("Failed to create {}", path.display()))?)
        }
        None => Box::new(io::stdout().lock()),
    };

    if summaries {
        export_summaries(&summarize(&ledger, granularity), format, writer)
    } else {
        export_ledger(&ledger, format, writer)
    }
}

fn run_overview(cli: &Cli) -> Result<()> {
    let conn = open_database(&cli.db)?;
    let ledger = load_ledger(&conn)?;
    let overview = StatementOverview::from_transactions(&ledger);

    println!("📈 Overview");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if let (Some(start), Some(end)) = (overview.start, overview.end) {
        println!("Period:       {} to {}", start, end);
    }
    println!("Transactions: {}", overview.transaction_count);
    println!("Income:       {}", overview.total_income);
    println!("Expenses:     {}", overview.total_expenses);
    println!("Net:          {}", overview.net);

    Ok(())
}

fn run_duplicates(cli: &Cli, tolerance: i64) -> Result<()> {
    let conn = open_database(&cli.db)?;
    let ledger = load_ledger(&conn)?;
    let matches = find_near_duplicates(&ledger, tolerance);

    println!("🔍 Possible duplicates: {}", matches.len());
    for m in &matches {
        println!("   [{:.2}] {}", m.confidence, m.reason);
    }

    Ok(())
}
