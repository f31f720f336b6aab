use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use modalytics::{
    build_star, format_date, parse_date, write_calendar, Layout, OutputFormat, Sampler, DEFAULT_CALENDAR_END,
    DEFAULT_CALENDAR_START, DEFAULT_CHUNK, DEFAULT_SEED,
};
use std::path::PathBuf;
use time::Date;

#[derive(Parser, Debug)]
#[command(name = "modalytics", version, about = "Sample retail transaction logs and stage them for a warehouse")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample the transaction log and filter the article/customer catalogs to match.
    Sample(SampleArgs),
    /// Write a calendar dimension CSV.
    Calendar(CalendarArgs),
    /// Stage a finished sample as star-schema CSV tables.
    Star(StarArgs),
}

#[derive(Args, Debug)]
struct SampleArgs {
    /// Directory holding transactions_train.csv, articles.csv and customers.csv (optionally .zst).
    #[arg(long)]
    data_dir: PathBuf,

    #[arg(long)]
    out_dir: PathBuf,

    /// First day to keep (inclusive). Cannot be combined with --frac.
    #[arg(long, value_parser = cli_date)]
    start: Option<Date>,

    /// Last day to keep (inclusive). Cannot be combined with --frac.
    #[arg(long, value_parser = cli_date)]
    end: Option<Date>,

    /// Keep this fraction of every month, in (0, 1].
    #[arg(long)]
    frac: Option<f64>,

    /// parquet | csv
    #[arg(long, default_value = "parquet")]
    format: OutputFormat,

    /// single | by-month. Defaults to by-month for parquet, single for csv.
    #[arg(long)]
    layout: Option<Layout>,

    /// Rows per batch.
    #[arg(long, default_value_t = DEFAULT_CHUNK)]
    chunk_size: usize,

    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    #[arg(long)]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct CalendarArgs {
    #[arg(long)]
    out: PathBuf,

    #[arg(long, value_parser = cli_date)]
    start: Option<Date>,

    #[arg(long, value_parser = cli_date)]
    end: Option<Date>,
}

#[derive(Args, Debug)]
struct StarArgs {
    /// Output directory of a `sample` run.
    #[arg(long)]
    sample_dir: PathBuf,

    #[arg(long)]
    out_dir: PathBuf,
}

fn cli_date(s: &str) -> Result<Date, String> {
    parse_date(s).map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn run_sample(args: SampleArgs) -> Result<()> {
    let mut sampler = Sampler::new()
        .data_dir(&args.data_dir)
        .out_dir(&args.out_dir)
        .window(args.start, args.end)
        .format(args.format)
        .chunk_size(args.chunk_size)
        .seed(args.seed)
        .progress(!args.no_progress);
    if let Some(frac) = args.frac {
        sampler = sampler.fraction(frac);
    }
    if let Some(layout) = args.layout {
        sampler = sampler.layout(layout);
    }

    let report = sampler.run()?;
    if let Some((min, max)) = &report.probed_range {
        println!("Transaction dates: {min} .. {max}");
    }
    println!("Selection: {}", report.selection);
    println!("Transactions: {} read, {} retained", report.rows_read, report.rows_retained);
    for (month, n) in &report.retained_by_month {
        println!("  {month}: {n}");
    }
    println!("Articles retained: {} ({} referenced)", report.articles_retained, report.distinct_articles);
    println!("Customers retained: {} ({} referenced)", report.customers_retained, report.distinct_customers);
    println!("Output: {}", args.out_dir.display());
    Ok(())
}

fn run_calendar(args: CalendarArgs) -> Result<()> {
    let start = args.start.unwrap_or(DEFAULT_CALENDAR_START);
    let end = args.end.unwrap_or(DEFAULT_CALENDAR_END);
    let days = write_calendar(&args.out, start, end)?;
    println!("Calendar {} .. {}: {days} days -> {}", format_date(start), format_date(end), args.out.display());
    Ok(())
}

fn run_star(args: StarArgs) -> Result<()> {
    let report = build_star(&args.sample_dir, &args.out_dir)?;
    println!("Channels: {}", report.channels);
    println!("Articles: {}", report.articles);
    println!("Customers: {}", report.customers);
    println!("Facts: {} ({} dropped)", report.facts, report.dropped_facts);
    Ok(())
}

fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Sample(args) => run_sample(args),
        Command::Calendar(args) => run_calendar(args),
        Command::Star(args) => run_star(args),
    }
}
