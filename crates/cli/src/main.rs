//! Bazaar CLI - migrations and operator maintenance.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations (including the session table)
//! bazaar migrate
//!
//! # Mark reviews verified whose authors have since bought the product
//! bazaar reviews reconcile --dry-run
//! bazaar reviews reconcile --limit 1000 --yes
//!
//! # Move an order through its lifecycle
//! bazaar order status ORD-1A2B3C4D shipped
//!
//! # Return units to a product
//! bazaar stock restock 42 10
//!
//! # Register a user
//! bazaar user create -e vendor@example.com -n "Vendor Name" -r vendor
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

use bazaar_core::{OrderNumber, OrderStatus, ProductId, Role};
use bazaar_storefront::services::ReconcileOptions;

mod commands;

#[derive(Parser)]
#[command(name = "bazaar")]
#[command(author, version, about = "Bazaar storefront operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Review maintenance
    Reviews {
        #[command(subcommand)]
        action: ReviewsAction,
    },
    /// Order maintenance
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
    /// Stock maintenance
    Stock {
        #[command(subcommand)]
        action: StockAction,
    },
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum ReviewsAction {
    /// Mark unverified reviews verified where the author has bought the product
    Reconcile {
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,

        /// Stop after this many matching reviews
        #[arg(long)]
        limit: Option<u32>,

        /// Reviews fetched per query
        #[arg(long, default_value_t = 500)]
        batch_size: u32,

        /// Confirm writes (required unless --dry-run)
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum OrderAction {
    /// Change an order's status
    Status {
        /// Order number, e.g. ORD-1A2B3C4D
        number: OrderNumber,

        /// Target status (`pending`, `processing`, `shipped`, `delivered`, `cancelled`)
        status: OrderStatus,
    },
}

#[derive(Subcommand)]
enum StockAction {
    /// Return units to a product's available quantity
    Restock {
        /// Product ID
        product_id: ProductId,

        /// Units to add
        quantity: u32,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Register a new user
    Create {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Role (`buyer`, `vendor`, `admin`)
        #[arg(short, long, default_value = "buyer")]
        role: Role,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CliError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Reviews {
            action:
                ReviewsAction::Reconcile {
                    dry_run,
                    limit,
                    batch_size,
                    yes,
                },
        } => {
            let options = ReconcileOptions {
                dry_run,
                limit,
                batch_size,
            };
            commands::reviews::reconcile(options, yes).await?;
        }
        Commands::Order {
            action: OrderAction::Status { number, status },
        } => {
            commands::orders::change_status(&number, status).await?;
        }
        Commands::Stock {
            action: StockAction::Restock {
                product_id,
                quantity,
            },
        } => {
            commands::stock::restock(product_id, quantity).await?;
        }
        Commands::User {
            action: UserAction::Create { email, name, role },
        } => {
            commands::users::create(&email, &name, role).await?;
        }
    }
    Ok(())
}
