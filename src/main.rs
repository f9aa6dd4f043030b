//! Command-line front end for the loyalty service
//!
//! Every subcommand prints its result as JSON on stdout. Logs go to stderr.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coffee_loyalty_service::{
    adapters::database::sqlite::SqliteDatabase,
    commands::{
        admin::{
            AddProductRequest, GetMemberRequest, GetProductRequest, ListMembersRequest,
            ListProductsRequest, RegisterMemberRequest, UpdateProductRequest,
        },
        earn_points::EarnPointsRequest,
        list_transactions::ListTransactionsRequest,
        redeem_points::RedeemPointsRequest,
        DomainLogic,
    },
    config::Config,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tower::ServiceExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "loyalty")]
#[command(about = "Coffee shop loyalty points")]
struct Cli {
    /// SQLite database file, overrides LOYALTY_DATABASE_PATH
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new member
    AddMember {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: Option<String>,
    },

    /// Add a product to the catalog
    AddProduct {
        #[arg(long)]
        name: String,
        #[arg(long)]
        price: Decimal,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },

    /// Change fields of a catalog product, leaving the others as they are
    UpdateProduct {
        product_id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        price: Option<Decimal>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },

    /// Show a single product
    Product { product_id: Uuid },

    /// List the catalog, newest first
    Products,

    /// Show a member and their balance
    Member { member_id: Uuid },

    /// List all members, newest first
    Members,

    /// Record a purchase and credit its points
    Earn {
        member_id: Uuid,
        product_id: Uuid,
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        quantity: i64,
    },

    /// Redeem points for a discount on a purchase
    Redeem {
        member_id: Uuid,
        #[arg(long, allow_negative_numbers = true)]
        points: i64,
        #[arg(long, allow_negative_numbers = true)]
        amount: Decimal,
    },

    /// List a member's ledger, newest first
    History { member_id: Uuid },
}

#[derive(Serialize)]
struct Response<T> {
    success: bool,
    data: T,
}

fn print_json<T: Serialize>(data: T) -> Result<()> {
    let body = serde_json::to_string_pretty(&Response {
        success: true,
        data,
    })?;
    println!("{body}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let database_path = cli.database.unwrap_or(config.database_path);
    let database = Arc::new(
        SqliteDatabase::open(&database_path)
            .with_context(|| format!("Failed to open database {}", database_path.display()))?,
    );
    tracing::debug!(path = %database_path.display(), "Opened database");
    let domain = DomainLogic::new(database.clone(), database.clone(), database)
        .with_currency(config.currency);

    match cli.command {
        Commands::AddMember { name, email, phone } => print_json(
            domain
                .oneshot(RegisterMemberRequest { name, email, phone })
                .await
                .context("Failed to register member")?,
        ),
        Commands::AddProduct {
            name,
            price,
            description,
            category,
        } => print_json(
            domain
                .oneshot(AddProductRequest {
                    name,
                    description,
                    price,
                    category,
                })
                .await
                .context("Failed to add product")?,
        ),
        Commands::UpdateProduct {
            product_id,
            name,
            price,
            description,
            category,
        } => print_json(
            domain
                .oneshot(UpdateProductRequest {
                    product_id,
                    name,
                    description,
                    price,
                    category,
                })
                .await
                .context("Failed to update product")?,
        ),
        Commands::Product { product_id } => print_json(
            domain
                .oneshot(GetProductRequest { product_id })
                .await
                .context("Failed to fetch product")?,
        ),
        Commands::Products => print_json(
            domain
                .oneshot(ListProductsRequest::default())
                .await
                .context("Failed to fetch products")?,
        ),
        Commands::Members => print_json(
            domain
                .oneshot(ListMembersRequest::default())
                .await
                .context("Failed to fetch members")?,
        ),
        Commands::Member { member_id } => print_json(
            domain
                .oneshot(GetMemberRequest { member_id })
                .await
                .context("Failed to fetch member")?,
        ),
        Commands::Earn {
            member_id,
            product_id,
            quantity,
        } => print_json(
            domain
                .oneshot(EarnPointsRequest {
                    member_id,
                    product_id,
                    quantity,
                })
                .await
                .context("Failed to process purchase")?,
        ),
        Commands::Redeem {
            member_id,
            points,
            amount,
        } => print_json(
            domain
                .oneshot(RedeemPointsRequest {
                    member_id,
                    points_to_redeem: points,
                    purchase_amount: amount,
                })
                .await
                .context("Failed to redeem points")?,
        ),
        Commands::History { member_id } => print_json(
            domain
                .oneshot(ListTransactionsRequest { member_id })
                .await
                .context("Failed to fetch transactions")?,
        ),
    }
}
