use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use resale_catalog::analytics::{format_delta, DateMode, LeaderboardKey, TimeRange};
use resale_catalog::catalog::Catalog;
use resale_catalog::config;
use resale_catalog::export;
use resale_catalog::model::{Field, Item, ItemKey, SaleOutcome, Season, Status, Transition};
use resale_catalog::mutation::{BulkAction, CommitOutcome, NoticeLevel};
use resale_catalog::query::{QueryState, Sort, SortColumn, SortDirection, TypeFilter};
use resale_catalog::store::{self, BulkPatch, SqliteStore};

#[derive(Debug, Parser)]
#[command(author, version, about = "Catalog and sales statistics for a second-hand shop")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List one page of the unified catalog
    List {
        #[arg(long, default_value = "any")]
        kind: TypeFilter,
        #[arg(long)]
        status: Option<Status>,
        #[arg(long)]
        seller: Option<String>,
        #[arg(long)]
        season: Option<Season>,
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, default_value = "created_at")]
        sort: SortColumn,
        /// Sort ascending instead of descending
        #[arg(long)]
        asc: bool,
        #[arg(long, default_value = "1")]
        page: usize,
    },
    /// Items with status `ready`
    Ready,
    /// Sales dashboard for a time range
    Stats {
        #[arg(long)]
        range: Option<TimeRange>,
        #[arg(long)]
        date_mode: Option<DateMode>,
        #[arg(long)]
        key: Option<LeaderboardKey>,
        #[arg(long, default_value = "1")]
        page: usize,
    },
    /// Write the in-scope statistics table as CSV
    Export {
        #[arg(long)]
        range: Option<TimeRange>,
        #[arg(long)]
        date_mode: Option<DateMode>,
    },
    /// Edit one field of one item, e.g. `edit article:42 price 19.90`
    Edit {
        key: ItemKey,
        field: Field,
        value: String,
    },
    SetStatus {
        status: Status,
        #[arg(required = true)]
        keys: Vec<ItemKey>,
    },
    /// Assign a seller id, or `none` to clear it
    AssignSeller {
        seller: String,
        #[arg(required = true)]
        keys: Vec<ItemKey>,
    },
    /// Set a season, or `none` to clear it
    SetSeason {
        season: String,
        #[arg(required = true)]
        keys: Vec<ItemKey>,
    },
    Delete {
        #[arg(required = true)]
        keys: Vec<ItemKey>,
    },
    Duplicate {
        #[arg(required = true)]
        keys: Vec<ItemKey>,
    },
    Publish {
        key: ItemKey,
    },
    /// Schedule publication at an RFC 3339 timestamp
    Schedule {
        key: ItemKey,
        at: DateTime<Utc>,
    },
    RevertToDraft {
        key: ItemKey,
    },
    MarkSold {
        key: ItemKey,
        #[arg(long)]
        price: f64,
        #[arg(long, default_value = "0")]
        fees: f64,
        #[arg(long, default_value = "0")]
        shipping: f64,
        #[arg(long)]
        buyer: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    Sellers,
    AddSeller {
        name: String,
    },
    SetDefaultSeller {
        id: String,
    },
}

fn optional(raw: &str) -> Option<&str> {
    match raw.trim() {
        "" | "none" => None,
        s => Some(s),
    }
}

fn money(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".into())
}

fn print_items(items: &[&Item]) {
    for item in items {
        println!(
            "{:<30} {:<40} {:<13} {:>9} {:>9}",
            item.key().to_string(),
            item.title,
            item.status.as_str(),
            money(item.price),
            money(item.realized_profit()),
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = store::init_pool(&cfg.database_url()).await?;
    store::run_migrations(&pool).await?;
    let sqlite = Arc::new(SqliteStore::new(pool, cfg.app.user_id.clone()));

    let mut catalog = Catalog::new(sqlite);
    catalog.refresh().await?;

    let now = Utc::now();
    let result = run(&mut catalog, &cfg, args.command, now).await;

    for notice in catalog.drain_notices() {
        match notice.level {
            NoticeLevel::Info => info!("{}", notice.message),
            NoticeLevel::Error => error!("{}", notice.message),
        }
    }
    result
}

async fn run(
    catalog: &mut Catalog,
    cfg: &config::Config,
    command: Command,
    now: DateTime<Utc>,
) -> Result<()> {
    match command {
        Command::List {
            kind,
            status,
            seller,
            season,
            search,
            sort,
            asc,
            page,
        } => {
            let mut query = QueryState::new(cfg.catalog.page_size);
            query.set_kind(kind);
            query.set_status(status);
            query.set_seller(seller);
            query.set_season(season);
            query.set_search(search);
            query.set_sort(Sort {
                column: sort,
                direction: if asc { SortDirection::Asc } else { SortDirection::Desc },
            });
            query.set_page(page);
            let view = catalog.query(&query);
            print_items(&view.items);
            println!("page {}/{} ({} items)", view.page, view.page_count, view.total);
        }
        Command::Ready => {
            let ready = catalog.ready_items();
            print_items(&ready);
            println!("{} ready", ready.len());
        }
        Command::Stats {
            range,
            date_mode,
            key,
            page,
        } => {
            let mut settings = cfg.analytics.settings();
            settings.time_range = range.unwrap_or(settings.time_range);
            settings.date_mode = date_mode.unwrap_or(settings.date_mode);
            settings.leaderboard_key = key.unwrap_or(settings.leaderboard_key);
            let report = catalog.analytics(settings, now);
            let m = report.metrics();
            let c = &report.comparison;
            println!(
                "revenue {:.2} ({})  net profit {:.2} ({})  sales {} ({})  conversion {:.1}% ({})",
                m.total_revenue,
                format_delta(c.revenue_delta),
                m.total_net_profit,
                format_delta(c.net_profit_delta),
                m.sold_transactions,
                format_delta(c.sales_delta),
                m.conversion_rate,
                format_delta(c.conversion_delta),
            );
            println!(
                "fees {:.2}  shipping {:.2}  average sale {:.2}",
                m.total_fees, m.total_shipping, m.avg_sale_price
            );
            println!(
                "draft {}  ready {}  processing {}  vinted_draft {}  sold {}  error {}",
                m.draft, m.ready, m.processing, m.vinted_draft, m.sold, m.error
            );
            println!("-- leaderboard");
            for (rank, s) in report.leaderboard.iter().enumerate() {
                println!(
                    "{:>2}. {:<20} sold {:>3}  published {:>3}  revenue {:>9.2}  profit {:>9.2}  conversion {:>5.1}%",
                    rank + 1,
                    s.name,
                    s.items_sold,
                    s.items_published,
                    s.revenue,
                    s.profit,
                    s.conversion_rate
                );
            }
            println!("-- trend");
            for point in &report.trend {
                println!("{} {:.2}", point.day, point.value);
            }
            let view = report.page_with_size(page, cfg.analytics.page_size);
            println!("-- items");
            print_items(&view.items);
            println!("page {}/{} ({} items)", view.page, view.page_count, view.total);
        }
        Command::Export { range, date_mode } => {
            let mut settings = cfg.analytics.settings();
            settings.time_range = range.unwrap_or(settings.time_range);
            settings.date_mode = date_mode.unwrap_or(settings.date_mode);
            let report = catalog.analytics(settings, now);
            let path = export::write_export(
                &cfg.export_dir(),
                &report.scope,
                catalog.sellers(),
                now.date_naive(),
            )
            .await?;
            println!("{}", path.display());
        }
        Command::Edit { key, field, value } => {
            let edit = field.parse_value(&value)?;
            match catalog.mutations().edit(&key, edit).await? {
                CommitOutcome::Saved => println!("{key}: saved"),
                CommitOutcome::Unchanged => println!("{key}: unchanged"),
            }
        }
        Command::SetStatus { status, keys } => {
            let n = catalog
                .mutations()
                .bulk(&keys, BulkAction::Patch(BulkPatch::Status(status)))
                .await?;
            println!("{n} updated");
        }
        Command::AssignSeller { seller, keys } => {
            let seller = optional(&seller).map(str::to_string);
            if let Some(id) = &seller {
                if catalog.seller_name(id).is_none() {
                    bail!("unknown seller {id}");
                }
            }
            let n = catalog
                .mutations()
                .bulk(&keys, BulkAction::Patch(BulkPatch::Seller(seller)))
                .await?;
            println!("{n} updated");
        }
        Command::SetSeason { season, keys } => {
            let season = optional(&season).map(str::parse::<Season>).transpose()?;
            let n = catalog
                .mutations()
                .bulk(&keys, BulkAction::Patch(BulkPatch::Season(season)))
                .await?;
            println!("{n} updated");
        }
        Command::Delete { keys } => {
            let n = catalog.mutations().bulk(&keys, BulkAction::Delete).await?;
            println!("{n} deleted");
        }
        Command::Duplicate { keys } => {
            let n = catalog.mutations().bulk(&keys, BulkAction::Duplicate).await?;
            println!("{n} duplicated");
        }
        Command::Publish { key } => {
            catalog
                .mutations()
                .transition(&key, Transition::Publish { at: now })
                .await?;
        }
        Command::Schedule { key, at } => {
            if at <= now {
                bail!("scheduled time must be in the future");
            }
            catalog
                .mutations()
                .transition(&key, Transition::Schedule { at })
                .await?;
        }
        Command::RevertToDraft { key } => {
            catalog
                .mutations()
                .transition(&key, Transition::RevertToDraft)
                .await?;
        }
        Command::MarkSold {
            key,
            price,
            fees,
            shipping,
            buyer,
            notes,
        } => {
            let sale = SaleOutcome {
                sold_price: price,
                fees,
                shipping_cost: shipping,
                buyer_name: buyer,
                notes,
                sold_at: now,
            };
            let net = sale.net_profit();
            catalog.mutations().mark_sold(&key, sale).await?;
            println!("{key}: sold, net profit {net:.2}");
        }
        Command::Sellers => {
            for s in catalog.sellers() {
                let mark = if s.is_default { "*" } else { " " };
                println!("{mark} {} {}", s.id, s.name);
            }
        }
        Command::AddSeller { name } => {
            if name.trim().is_empty() {
                bail!("seller name must be non-empty");
            }
            let seller = catalog.add_seller(name.trim()).await?;
            println!("{}", seller.id);
        }
        Command::SetDefaultSeller { id } => {
            catalog.set_default_seller(&id).await?;
        }
    }
    Ok(())
}
