use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use snowball::config::AppConfig;
use snowball::filter::AVAILABLE_FILTER_OPTIONS;
use snowball::loader::{discover_json_files, load_codes_csv, load_document, load_price_csv, normalise_code};
use snowball::metrics::{resolve, METRICS};
use snowball::models::{Filter, Ordering, SeriesField, StatusFilter};
use snowball::pipeline::Pipeline;
use snowball::query::DEFAULT_ORDER_BY;
use snowball::rank::rank_catalog;
use snowball::service::{Mark, Override, SnowballService, StockListing};
use snowball::source::JsonDirSource;
use snowball::storage::Repository;
use snowball::utils::{self, fmt_number, fmt_rate};

#[derive(Parser)]
#[command(name = "snowball", about = "Value-investing stock screener", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Apply schema migrations
    Migrate,

    /// Import every <code>.json document from a directory
    Import {
        /// Defaults to pipeline.source_dir
        dir: Option<PathBuf>,
    },

    /// Re-collect documents from the source directory, then fill and rank
    Refresh {
        codes: Vec<String>,

        /// Every stored stock matching --status
        #[arg(long)]
        all: bool,

        /// CSV with a `code` column
        #[arg(long)]
        codes_csv: Option<PathBuf>,

        /// all and bad select by expected-rate sign, the rest by mark
        #[arg(long, requires = "all", default_value = "all")]
        status: StatusFilter,
    },

    /// Recompute memoized fields for one stock, or all of them
    Fill { code: Option<String> },

    /// Recompute every cross-sectional rank
    Ranks,

    /// List stocks
    List {
        #[arg(long, default_value = "all")]
        status: StatusFilter,

        #[arg(long, default_value = DEFAULT_ORDER_BY)]
        order_by: String,

        #[arg(long, default_value = "desc")]
        ordering: Ordering,

        /// Saved filter id
        #[arg(long)]
        filter: Option<i64>,
    },

    /// Every metric of one stock
    Show { code: String },

    /// Year-aligned values of one series, e.g. ROEs or BPSs
    Series { code: String, field: SeriesField },

    /// Expected rate at a hypothetical purchase price
    ExpectedRate { code: String, price: f64 },

    /// Set a user override
    Set { code: String, field: Override, value: String },

    /// Reset a user override
    Clear { code: String, field: Override },

    /// Toggle starred / owned / doubtful
    Mark { code: String, mark: Mark, state: Switch },

    /// Delete a stock
    Remove { code: String },

    /// Manage saved filters
    Filter {
        #[command(subcommand)]
        command: FilterCommand,
    },

    /// Historical expected rate and buy/sell simulation over a price CSV
    History { code: String, prices: PathBuf },

    /// Show database statistics
    Stats,
}

#[derive(Subcommand)]
enum FilterCommand {
    List,
    New { name: Option<String> },
    Rename { id: i64, name: String },
    AddOption {
        id: i64,
        key: String,
        value: Option<f64>,
        /// Keep values >= VALUE instead of <= VALUE
        #[arg(long)]
        more_than: bool,
    },
    AddRank { id: i64, key: String },
    RemoveOption { id: i64, option_id: u32 },
    Delete { id: i64 },
    /// Available filter and rank option keys
    Catalog,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

fn open_service(config: &AppConfig) -> Result<SnowballService> {
    let repo = Repository::open(&config.storage.db_path)?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }
    let engine = config.engine.build();
    info!("Calendar: last year {}, this year {}", engine.calendar.last_year, engine.calendar.this_year);
    Ok(SnowballService::new(repo, engine))
}

fn print_listing(listing: &StockListing) {
    if let Some(filter) = &listing.filter {
        println!("Filter #{}: {}", filter.id, filter.name);
    }
    println!(
        "{:<8} {:<24} {:>12} {:>10} {:>10} {:>6} {:>8}",
        "CODE", "TITLE", "PRICE", "EXPECTED", "FUT. ROE", "PBR", "RANK"
    );
    for row in &listing.rows {
        let s = &row.stock;
        println!(
            "{:<8} {:<24} {:>12} {:>10} {:>10} {:>6.2} {:>8}",
            s.code,
            s.title,
            fmt_number(s.current_price as i64),
            fmt_rate(row.expected_rate),
            fmt_rate(row.future_roe),
            s.pbr,
            row.total_rank.map(|r| r.to_string()).unwrap_or_default(),
        );
    }
    let sum = &listing.summary;
    println!("─────────────────────────────────");
    println!("  Stocks              : {}", sum.count);
    println!("  PBR <= 1            : {}", sum.low_pbr_count);
    println!("  High expected rate  : {}", sum.high_expected_rate_count);
    println!("  F-Score >= 3        : {}", sum.fscore_count);
    println!("  Mean expected rate  : {}", fmt_rate(sum.mean_expected_rate));
    println!("  Mean by low PBR     : {}", fmt_rate(sum.mean_expected_rate_by_low_pbr));
    println!("  Mean future ROE     : {}", fmt_rate(sum.mean_future_roe));
    println!("  Mean quarter ROE    : {} ({} stocks)", fmt_rate(sum.mean_quarter_roe), sum.quarter_roe_count);
    println!("─────────────────────────────────");
}

fn print_filter(filter: &Filter) {
    println!("#{} {}", filter.id, filter.name);
    for o in &filter.options {
        if o.is_rankoption {
            println!("  [{}] rank {} ({})", o.id, o.key, if o.ascending { "asc" } else { "desc" });
        } else if o.is_boolean {
            println!("  [{}] {} is {}", o.id, o.key, o.more_than);
        } else {
            let op = if o.more_than { ">=" } else { "<=" };
            println!("  [{}] {} {} {}", o.id, o.key, op, o.value.map(|v| v.to_string()).unwrap_or("-".into()));
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "snowball=info,warn",
        1 => "snowball=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }

        Command::Import { dir } => {
            let _t = utils::Timer::start("Document import");
            let service = open_service(&config)?;
            let dir = dir.unwrap_or_else(|| config.pipeline.source_dir.clone());

            let files = discover_json_files(&dir)?;
            info!("Found {} documents in {:?}", files.len(), dir);

            let mut saved = Vec::new();
            let mut errors = 0usize;
            for path in &files {
                match load_document(path).and_then(|patch| service.repo().upsert_by_code(&patch)) {
                    Ok(stock) => saved.push(stock.code),
                    Err(e) => {
                        warn!("Error loading {:?}: {:#}", path, e);
                        errors += 1;
                    }
                }
            }
            for code in &saved {
                service.recompute_and_persist(code)?;
            }
            if config.pipeline.update_ranks && !saved.is_empty() {
                service.recompute_ranks()?;
            }
            info!("Done: {} documents imported, {} errors", saved.len(), errors);
        }

        Command::Refresh { codes, all, codes_csv, status } => {
            let _t = utils::Timer::start("Refresh");
            let service = open_service(&config)?;

            let mut targets: Vec<String> = codes.iter().map(|c| normalise_code(c)).collect();
            if let Some(path) = codes_csv {
                targets.extend(load_codes_csv(&path)?);
            }
            if all {
                targets.extend(service.codes_for_refresh(status)?);
            }
            targets.sort();
            targets.dedup();
            if targets.is_empty() {
                bail!("Nothing to refresh: pass codes, --codes-csv or --all");
            }

            let source = JsonDirSource::new(&config.pipeline.source_dir);
            let stats = Pipeline::new(source, config.pipeline.clone()).run(&service, &targets).await?;
            info!("Done: {} saved, {} failed", stats.saved, stats.failed);
        }

        Command::Fill { code } => {
            let _t = utils::Timer::start("Fill");
            let service = open_service(&config)?;
            match code {
                Some(code) => match service.recompute_and_persist(&code)? {
                    Some(stock) => println!("Filled {}", stock),
                    None => println!("{} has no ROE history, skipped", code),
                },
                None => println!("Filled {} stocks", service.fill_all()?),
            }
        }

        Command::Ranks => {
            let _t = utils::Timer::start("Rank update");
            let n = open_service(&config)?.recompute_ranks()?;
            println!("Ranked {} stocks", n);
        }

        Command::List { status, order_by, ordering, filter } => {
            let listing = open_service(&config)?.list_stocks(status, &order_by, ordering, filter)?;
            print_listing(&listing);
        }

        Command::Show { code } => {
            let service = open_service(&config)?;
            service.with_view(&code, |view| {
                println!("{}", view.stock());
                for metric in METRICS {
                    println!("  {:<38}: {}", metric.key, resolve(view, metric.key));
                }
                for (year, fscore) in view.fscores() {
                    println!("  fscore {:<31}: {}", year, fscore.total());
                }
            })?;
        }

        Command::Series { code, field } => {
            for yv in open_service(&config)?.series(&code, field)? {
                let value = yv.value().map(|v| v.to_string()).unwrap_or("-".into());
                println!("{}  {}", yv.year(), value);
            }
        }

        Command::ExpectedRate { code, price } => {
            let rate = open_service(&config)?.expected_rate_at_price(&code, price)?;
            println!("{} at {}: {}", code, fmt_number(price as i64), fmt_rate(rate));
        }

        Command::Set { code, field, value } => {
            let value = match field {
                Override::Note => Value::String(value),
                _ => {
                    let n: f64 = value.trim().parse().with_context(|| format!("{} expects a number", field.key()))?;
                    Value::from(n)
                }
            };
            let stock = open_service(&config)?.set_override(&code, field, value)?;
            println!("{}: {} updated", stock, field.key());
        }

        Command::Clear { code, field } => {
            let stock = open_service(&config)?.clear_override(&code, field)?;
            println!("{}: {} cleared", stock, field.key());
        }

        Command::Mark { code, mark, state } => {
            let on = matches!(state, Switch::On);
            let stock = open_service(&config)?.set_mark(&code, mark, on)?;
            println!("{}: starred={} owned={} doubtful={}", stock, stock.starred, stock.owned, stock.doubtful);
        }

        Command::Remove { code } => {
            open_service(&config)?.remove_stock(&code)?;
            println!("Removed {}", code);
        }

        Command::Filter { command } => {
            let service = open_service(&config)?;
            match command {
                FilterCommand::List => {
                    let filters = service.filters()?;
                    if filters.is_empty() {
                        println!("No filters — run `snowball filter new` first.");
                    }
                    filters.iter().for_each(print_filter);
                }
                FilterCommand::New { name } => print_filter(&service.new_filter(name.as_deref())?),
                FilterCommand::Rename { id, name } => print_filter(&service.rename_filter(id, &name)?),
                FilterCommand::AddOption { id, key, value, more_than } => {
                    let option_id = service.add_filter_option(id, &key, more_than, value)?;
                    println!("Added option {} to filter #{}", option_id, id);
                }
                FilterCommand::AddRank { id, key } => {
                    let option_id = service.add_rank_option(id, &key)?;
                    println!("Added rank option {} to filter #{}", option_id, id);
                }
                FilterCommand::RemoveOption { id, option_id } => {
                    print_filter(&service.remove_filter_option(id, option_id)?);
                }
                FilterCommand::Delete { id } => {
                    service.delete_filter(id)?;
                    println!("Deleted filter #{}", id);
                }
                FilterCommand::Catalog => {
                    println!("Filter options:");
                    for (key, title, is_boolean) in AVAILABLE_FILTER_OPTIONS {
                        println!("  {:<38} {}{}", key, title, if *is_boolean { " (bool)" } else { "" });
                    }
                    println!("Rank options:");
                    for option in rank_catalog() {
                        println!("  {:<38} {}", option.key, option.title);
                    }
                }
            }
        }

        Command::History { code, prices } => {
            let prices = load_price_csv(&prices)?;
            for year in open_service(&config)?.history(&code, &prices)? {
                let s = &year.stat;
                println!(
                    "{}  price {}..{}  expected {}..{}  bps {}  future ROE {}",
                    s.year,
                    fmt_number(s.low_price as i64),
                    fmt_number(s.high_price as i64),
                    fmt_rate(s.low_expected_rate),
                    fmt_rate(s.high_expected_rate),
                    fmt_number(s.bps as i64),
                    fmt_rate(s.future_roe),
                );
                for e in &year.events {
                    let side = if e.buy { "BUY " } else { "SELL" };
                    println!("    {} {}  {}  {}", side, e.date, fmt_number(e.record.price as i64), fmt_rate(e.record.expected_rate));
                }
            }
        }

        Command::Stats => {
            let repo = Repository::open(&config.storage.db_path)?;
            repo.run_migrations()?;
            println!("─────────────────────────────────");
            println!("  Snowball — Database Stats");
            println!("─────────────────────────────────");
            println!("  Stocks   : {}", fmt_number(repo.stock_count()?));
            println!("  Filters  : {}", fmt_number(repo.filter_count()?));
            println!("  Schema   : {}", repo.schema_version()?.map(|v| v.to_string()).unwrap_or("—".into()));
            println!("─────────────────────────────────");
        }
    }

    Ok(())
}
