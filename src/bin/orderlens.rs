use clap::{Args, Parser, Subcommand, ValueEnum};

use orderlens::config::{self, Settings};
use orderlens::metrics::{AverageMode, SkewPolicy};
use orderlens::query::builder::rows_to_csv;
use orderlens::{
    AnySource, Dashboard, Database, DeliveryMetrics, ExclusionSet, FileOrderSource,
    HttpOrderSource, KeyValueStore, MockOrderSource, OrderLens, OrderQuery, Period,
    SortDirection, SortField, SortState, TimeDistribution,
};

#[derive(Parser)]
#[command(name = "orderlens", about = "Delivery timelines and time metrics for pharmacy orders")]
struct Cli {
    /// Database path (default: ~/.orderlens/orderlens.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Where orders come from (default: file if --file is given, else http)
    #[arg(long, value_enum)]
    source: Option<SourceKind>,

    /// JSON file of orders for the file source
    #[arg(long)]
    file: Option<String>,

    /// Serve sample data when the source fails and nothing is cached
    #[arg(long)]
    mock: bool,

    /// API token (overrides stored config and ORDERLENS_API_TOKEN)
    #[arg(long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceKind {
    Http,
    File,
    Mock,
}

#[derive(Args, Clone)]
struct FilterArgs {
    /// Period: 2025, 2025-H1, 2025-Q1, 2025-01, 2025-W05, 2025-01-15,
    /// 2025-01-01..2025-01-31, 30d, today, ytd, htd, qtd, mtd, wtd
    #[arg(long, default_value = "30d")]
    period: String,
    /// Only these pharmacies (repeatable)
    #[arg(long)]
    pharmacy: Vec<String>,
    /// Order ids to leave out (comma-separated or repeated)
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<i64>,
    /// Floor negative phase durations at zero
    #[arg(long)]
    clamp_negative: bool,
    /// Average only computable durations
    #[arg(long)]
    computed_only: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show delivery KPIs for a period
    Metrics {
        #[command(flatten)]
        filter: FilterArgs,
        /// Also show the previous period of the same length
        #[arg(long)]
        compare: bool,
        /// Break KPIs down per pharmacy
        #[arg(long)]
        by_pharmacy: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the total delivery time histogram
    Distribution {
        #[command(flatten)]
        filter: FilterArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one order's status timeline
    Timeline {
        /// Order id
        order_id: i64,
        /// Period the order was created in
        #[arg(long, default_value = "30d")]
        period: String,
        /// Floor negative phase durations at zero
        #[arg(long)]
        clamp_negative: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List orders with their phase durations
    Orders {
        #[command(flatten)]
        filter: FilterArgs,
        /// Sort column: id, code, pharmacy, customer, status, created,
        /// delivered, invoice, total
        #[arg(long)]
        sort: Option<String>,
        /// Sort descending
        #[arg(long)]
        desc: bool,
        /// Sort by pharmacy name (asc or desc), overriding --sort
        #[arg(long)]
        pharmacy_sort: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Output as CSV
        #[arg(long)]
        csv: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show local store status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// Remove a config value
    Unset { key: String },
    /// List all config values
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => Database::open_at(path).await?,
        None => Database::open().await?,
    };

    match &cli.command {
        Commands::Status => print_status(&db).await?,
        Commands::Config { action } => handle_config(&db, action).await?,
        Commands::Metrics {
            filter,
            compare,
            by_pharmacy,
            json,
        } => {
            let lens = open_lens(&cli, &db).await?;
            handle_metrics(lens, filter, *compare, *by_pharmacy, *json).await?;
        }
        Commands::Distribution { filter, json } => {
            let lens = open_lens(&cli, &db).await?;
            handle_distribution(lens, filter, *json).await?;
        }
        Commands::Timeline {
            order_id,
            period,
            clamp_negative,
            json,
        } => {
            let lens = open_lens(&cli, &db).await?;
            handle_timeline(lens, *order_id, period, *clamp_negative, *json).await?;
        }
        Commands::Orders {
            filter,
            sort,
            desc,
            pharmacy_sort,
            json,
            csv,
        } => {
            let sort = parse_sort(sort.as_deref(), *desc, pharmacy_sort.as_deref())?;
            let lens = open_lens(&cli, &db).await?;
            handle_orders(lens, filter, sort, *json, *csv).await?;
        }
    }

    Ok(())
}

async fn open_lens(cli: &Cli, db: &Database) -> anyhow::Result<OrderLens<AnySource>> {
    let settings = Settings::load(db).await?;
    let source = build_source(cli, &settings)?;
    Ok(OrderLens::new(db.clone(), source, settings).allow_mock(cli.mock))
}

fn build_source(cli: &Cli, settings: &Settings) -> anyhow::Result<AnySource> {
    let kind = cli.source.unwrap_or(if cli.file.is_some() {
        SourceKind::File
    } else {
        SourceKind::Http
    });
    Ok(match kind {
        SourceKind::Http => {
            let url = settings.base_url()?;
            let token = cli.token.as_deref().or(settings.api_token.as_deref());
            AnySource::Http(HttpOrderSource::new(&url, token)?)
        }
        SourceKind::File => {
            let path = cli
                .file
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("--source file needs --file <PATH>"))?;
            AnySource::File(FileOrderSource::new(path))
        }
        SourceKind::Mock => AnySource::Mock(MockOrderSource::new()),
    })
}

/// Apply per-command metric flags on top of stored settings.
fn apply_metric_flags(lens: &mut OrderLens<AnySource>, clamp_negative: bool, computed_only: bool) {
    let mut metrics = lens.settings().metrics.clone();
    if clamp_negative {
        metrics.skew_policy = SkewPolicy::Clamp;
    }
    if computed_only {
        metrics.average_mode = AverageMode::ComputedOnly;
    }
    lens.set_metrics_config(metrics);
}

fn build_query(filter: &FilterArgs, period: &Period) -> OrderQuery {
    let exclusions: ExclusionSet = filter.exclude.iter().copied().collect();
    OrderQuery::new()
        .period(period)
        .pharmacies(filter.pharmacy.iter().cloned())
        .exclusions(&exclusions)
}

fn parse_sort(
    sort: Option<&str>,
    desc: bool,
    pharmacy_sort: Option<&str>,
) -> anyhow::Result<(SortState, Option<SortDirection>)> {
    let state = match sort {
        Some(field) => {
            let field: SortField = field.parse()?;
            let direction = if desc {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            };
            SortState::by(field, direction)
        }
        None => SortState::default(),
    };
    let pharmacy = pharmacy_sort.map(str::parse::<SortDirection>).transpose()?;
    Ok((state, pharmacy))
}

async fn print_status(db: &Database) -> anyhow::Result<()> {
    let stats = db.stats().await?;
    println!("Local Store Status");
    println!("  Config keys: {}", stats.config_keys);
    println!("  Snapshots:   {}", stats.snapshots);
    println!("  Fetch jobs:  {} ({} failed)", stats.fetch_jobs, stats.failed_jobs);
    println!(
        "  Last fetch:  {}",
        stats.last_success.unwrap_or_else(|| "never".to_string())
    );
    Ok(())
}

async fn handle_config(db: &Database, action: &ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match db.get(key).await? {
            Some(v) if key == config::KEY_API_TOKEN => println!("{key} = {}", mask(&v)),
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            config::validate(key, value)?;
            db.set(key, value).await?;
            println!("Config updated.");
        }
        ConfigAction::Unset { key } => {
            if db.remove(key).await? {
                println!("Removed {key}.");
            } else {
                println!("{key} is not set");
            }
        }
        ConfigAction::List => {
            let items: Vec<(String, String)> = db
                .reader()
                .call(|conn| orderlens::storage::repository::list_config(conn))
                .await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    if k == config::KEY_API_TOKEN {
                        println!("{k} = {}", mask(&v));
                    } else {
                        println!("{k} = {v}");
                    }
                }
            }
        }
    }
    Ok(())
}

fn mask(secret: &str) -> String {
    let len = secret.chars().count();
    if len <= 4 {
        return "****".to_string();
    }
    let tail: String = secret.chars().skip(len - 4).collect();
    format!("****{tail}")
}

async fn handle_metrics(
    mut lens: OrderLens<AnySource>,
    filter: &FilterArgs,
    compare: bool,
    by_pharmacy: bool,
    json: bool,
) -> anyhow::Result<()> {
    apply_metric_flags(&mut lens, filter.clamp_negative, filter.computed_only);
    let period = Period::parse(&filter.period)?;
    let current = lens
        .dashboard(&period.date_range(), &build_query(filter, &period))
        .await?;

    let previous = if compare {
        let prev = period.previous();
        Some(
            lens.dashboard(&prev.date_range(), &build_query(filter, &prev))
                .await?,
        )
    } else {
        None
    };

    if json {
        let output = serde_json::json!({
            "period": period.to_key(),
            "current": current,
            "previous": previous,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_header(&format!("Delivery Metrics ({period})"), &current);
    print_metrics(&current.summary.metrics, previous.as_ref().map(|p| &p.summary.metrics));
    if by_pharmacy {
        println!("  By pharmacy:");
        for p in &current.summary.pharmacies {
            let name = if p.pharmacy_name.is_empty() {
                format!("#{}", p.pharmacy_id)
            } else {
                p.pharmacy_name.clone()
            };
            println!(
                "    {name:<28} {:>4} orders  avg {:>4} min  on time {:>3}%",
                p.metrics.order_count, p.metrics.avg_total_time, p.metrics.on_time_percentage
            );
        }
    }
    Ok(())
}

async fn handle_distribution(
    mut lens: OrderLens<AnySource>,
    filter: &FilterArgs,
    json: bool,
) -> anyhow::Result<()> {
    apply_metric_flags(&mut lens, filter.clamp_negative, filter.computed_only);
    let period = Period::parse(&filter.period)?;
    let dash = lens
        .dashboard(&period.date_range(), &build_query(filter, &period))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&dash.summary.distribution)?);
    } else {
        print_header(&format!("Total Delivery Time ({period})"), &dash);
        print_distribution(&dash.summary.distribution);
    }
    Ok(())
}

async fn handle_timeline(
    mut lens: OrderLens<AnySource>,
    order_id: i64,
    period: &str,
    clamp_negative: bool,
    json: bool,
) -> anyhow::Result<()> {
    apply_metric_flags(&mut lens, clamp_negative, false);
    let period = Period::parse(period)?;
    let timeline = lens.timeline(&period.date_range(), order_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&timeline)?);
        return Ok(());
    }

    println!(
        "Order {} ({}) - {} | {}",
        timeline.code, timeline.order_id, timeline.pharmacy, timeline.status
    );
    for event in &timeline.events {
        let marker = if event.is_origin { "*" } else { "-" };
        let by = if event.performed_by.is_empty() {
            String::new()
        } else {
            format!("  ({})", event.performed_by)
        };
        println!(
            "  {marker} {}  {:<17}{by}",
            event.timestamp.format("%Y-%m-%d %H:%M"),
            event.status.as_str()
        );
    }
    let d = &timeline.durations;
    println!("  Durations:");
    println!("    Preparation:     {}", fmt_minutes(d.preparation.minutes()));
    println!("    Courier waiting: {}", fmt_minutes(d.courier_waiting.minutes()));
    println!("    In transit:      {}", fmt_minutes(d.in_transit.minutes()));
    println!("    Total:           {}", fmt_minutes(d.total.minutes()));
    Ok(())
}

async fn handle_orders(
    mut lens: OrderLens<AnySource>,
    filter: &FilterArgs,
    (sort, pharmacy_sort): (SortState, Option<SortDirection>),
    json: bool,
    csv: bool,
) -> anyhow::Result<()> {
    apply_metric_flags(&mut lens, filter.clamp_negative, filter.computed_only);
    let period = Period::parse(&filter.period)?;
    let query = build_query(filter, &period)
        .sort(sort)
        .pharmacy_sort(pharmacy_sort);
    let dash = lens.dashboard(&period.date_range(), &query).await?;
    let rows = &dash.summary.rows;

    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
    } else if csv {
        print!("{}", rows_to_csv(rows));
    } else if rows.is_empty() {
        println!("No orders found.");
    } else {
        for row in rows {
            println!(
                "[{:<16}] {} ({}) - {} | {} | created {} | total {}",
                row.status.as_str(),
                row.code,
                row.id,
                row.pharmacy,
                row.customer,
                row.created_at.format("%Y-%m-%d %H:%M"),
                fmt_minutes(row.durations.total.minutes())
            );
        }
        println!("\n{} orders", rows.len());
    }
    Ok(())
}

fn print_header(title: &str, dash: &Dashboard) {
    println!("{title}");
    println!(
        "  Range:   {} .. {}",
        dash.range.start.format("%Y-%m-%d"),
        dash.range.end.format("%Y-%m-%d")
    );
    if let Some(ref err) = dash.fetch_error {
        eprintln!("  Warning: fetch failed ({err}); showing {:?} data", dash.origin);
    }
}

fn print_metrics(m: &DeliveryMetrics, previous: Option<&DeliveryMetrics>) {
    let delta = |now: i64, before: Option<i64>| match before {
        Some(b) => format!("  ({:+})", now - b),
        None => String::new(),
    };
    println!(
        "  Orders:          {} ({} with a total time)",
        m.order_count, m.computable_count
    );
    println!(
        "  Avg total:       {} min{}",
        m.avg_total_time,
        delta(m.avg_total_time, previous.map(|p| p.avg_total_time))
    );
    println!(
        "  Avg preparation: {} min{}",
        m.avg_preparation_time,
        delta(m.avg_preparation_time, previous.map(|p| p.avg_preparation_time))
    );
    println!(
        "  Avg courier wait: {} min{}",
        m.avg_courier_waiting_time,
        delta(m.avg_courier_waiting_time, previous.map(|p| p.avg_courier_waiting_time))
    );
    println!(
        "  Avg in transit:  {} min{}",
        m.avg_delivery_time,
        delta(m.avg_delivery_time, previous.map(|p| p.avg_delivery_time))
    );
    println!(
        "  On time:         {}%{}",
        m.on_time_percentage,
        delta(
            i64::from(m.on_time_percentage),
            previous.map(|p| i64::from(p.on_time_percentage))
        )
    );
}

fn print_distribution(dist: &TimeDistribution) {
    const BAR_WIDTH: u64 = 40;
    let max = dist.buckets().iter().map(|(_, n)| *n).max().unwrap_or(0);
    for (label, count) in dist.buckets() {
        let len = if max == 0 { 0 } else { count * BAR_WIDTH / max };
        println!(
            "  {label:>6} min  {:<width$} {count}",
            "#".repeat(len as usize),
            width = BAR_WIDTH as usize
        );
    }
    println!("  {} orders with a total time", dist.total());
}

fn fmt_minutes(m: Option<i64>) -> String {
    m.map(|m| format!("{m} min")).unwrap_or_else(|| "n/a".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_hides_short_tokens() {
        assert_eq!(mask("abcd"), "****");
        assert_eq!(mask("ab"), "****");
        assert_eq!(mask(""), "****");
        assert_eq!(mask("secret-token"), "****oken");
    }
}
