use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use meal_ledger::{
    Error, Ledger, Result,
    config::{database, ledger::load_or_default},
};
use std::{collections::BTreeMap, path::PathBuf, process::ExitCode};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command-line front end for the meal credit ledger
#[derive(Debug, Parser)]
#[command(name = "meal-ledger", version, about)]
struct Cli {
    /// Path to the ledger configuration file
    #[arg(long, default_value = "ledger.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Buy a meal pack
    Purchase { owner: String, size: i64 },
    /// Place an order, e.g. `order alice 12=2 15=1`
    Order {
        owner: String,
        /// Selections as MENU_ITEM_ID=QUANTITY
        #[arg(required = true, value_parser = parse_selection)]
        items: Vec<(i64, i64)>,
    },
    /// Show available credits and totals
    Balance { owner: String },
    /// List purchased packs, oldest first
    Pools { owner: String },
    /// List orders, newest first
    Orders { owner: String },
    /// Show one order with its items and allocations
    ShowOrder { order_id: i64 },
}

fn parse_selection(raw: &str) -> std::result::Result<(i64, i64), String> {
    let (item, quantity) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected MENU_ITEM_ID=QUANTITY, got '{raw}'"))?;
    let item = item
        .trim()
        .parse()
        .map_err(|e| format!("invalid menu item id '{item}': {e}"))?;
    let quantity = quantity
        .trim()
        .parse()
        .map_err(|e| format!("invalid quantity '{quantity}': {e}"))?;
    Ok((item, quantity))
}

#[tokio::main]
async fn main() -> ExitCode {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; variables may also come from the environment
    dotenv().ok();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err.user_message());
            ExitCode::from(u8::try_from(err.status_code() / 100).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // 3. Load configuration, DATABASE_URL wins over the file
    let config = load_or_default(&cli.config)
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;
    let db_config = config.database.with_env_override();

    // 4. Connect and ensure tables
    let db = database::connect(&db_config)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    let ledger = Ledger::new(db, config.ledger);

    match cli.command {
        Command::Purchase { owner, size } => {
            let pool = ledger.purchase_pack(&owner, size).await?;
            println!(
                "Pack {} purchased for {}: {} credits",
                pool.id, pool.owner, pool.size
            );
        }
        Command::Order { owner, items } => {
            let selection: BTreeMap<i64, i64> = merge_selection(&items)?;
            let placed = ledger.place_order(&owner, &selection).await?;
            println!(
                "Order {} placed for {}: {} credits ({:?})",
                placed.order.id,
                placed.order.owner,
                placed.order.requested_credits,
                placed.order.status
            );
            for debit in placed.allocation.debits() {
                println!("  pack {}: -{}", debit.pool_id, debit.credits);
            }
        }
        Command::Balance { owner } => {
            let summary = ledger.summary(&owner).await?;
            println!(
                "{owner}: {} available ({} granted, {} consumed, {} ordered)",
                ledger.available(&owner).await?,
                summary.granted,
                summary.consumed,
                summary.ordered
            );
        }
        Command::Pools { owner } => {
            for pool in ledger.pools(&owner).await? {
                println!(
                    "pack {} bought {}: {}/{} remaining",
                    pool.id, pool.purchased_at, pool.remaining, pool.size
                );
            }
        }
        Command::Orders { owner } => {
            for order in ledger.orders(&owner).await? {
                println!(
                    "order {} placed {}: {} credits, {:?}",
                    order.id, order.placed_at, order.requested_credits, order.status
                );
            }
        }
        Command::ShowOrder { order_id } => {
            let details = ledger.order(order_id).await?;
            println!(
                "order {} for {}: {} credits, {:?}",
                details.order.id,
                details.order.owner,
                details.order.requested_credits,
                details.order.status
            );
            for item in &details.items {
                println!("  item {} x{}", item.menu_item_id, item.quantity);
            }
            for allocation in &details.allocations {
                println!("  pack {}: -{}", allocation.pool_id, allocation.credits);
            }
        }
    }
    Ok(())
}

/// Folds repeated menu items on the command line into one selection.
///
/// Each argument is checked on its own, so a negative quantity cannot be hidden
/// by a larger one for the same item.
fn merge_selection(items: &[(i64, i64)]) -> Result<BTreeMap<i64, i64>> {
    let mut selection = BTreeMap::new();
    for &(menu_item_id, quantity) in items {
        if quantity <= 0 {
            return Err(Error::InvalidQuantity {
                menu_item_id,
                quantity,
            });
        }
        let entry = selection.entry(menu_item_id).or_insert(0_i64);
        *entry = entry
            .checked_add(quantity)
            .ok_or(Error::InvalidQuantity {
                menu_item_id,
                quantity,
            })?;
    }
    Ok(selection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("12=3"), Ok((12, 3)));
        assert_eq!(parse_selection(" 4 = 1 "), Ok((4, 1)));
        assert!(parse_selection("12").is_err());
        assert!(parse_selection("x=1").is_err());
    }

    #[test]
    fn test_merge_selection_adds_repeats() {
        let merged = merge_selection(&[(1, 2), (3, 1), (1, 4)]);
        assert!(matches!(merged, Ok(ref m) if m.get(&1) == Some(&6) && m.len() == 2));
    }

    #[test]
    fn test_merge_selection_rejects_non_positive_arguments() {
        let merged = merge_selection(&[(1, -5), (1, 6)]);
        assert!(matches!(
            merged,
            Err(Error::InvalidQuantity {
                menu_item_id: 1,
                quantity: -5
            })
        ));

        let merged = merge_selection(&[(2, 3), (2, 0)]);
        assert!(matches!(
            merged,
            Err(Error::InvalidQuantity {
                menu_item_id: 2,
                quantity: 0
            })
        ));
    }

    #[test]
    fn test_cli_parses_order_command() {
        let cli = Cli::try_parse_from(["meal-ledger", "order", "alice", "1=2", "5=1"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Command::Order { ref owner, ref items }) if owner == "alice" && items.len() == 2
        ));
    }
}
