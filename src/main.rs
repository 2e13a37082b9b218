#[macro_use]
extern crate tracing;

mod chain;
mod controllers;
mod eip712;
mod engine;
mod error;
mod models;
mod store;

use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use chain::EvmGateway;
use clap::Parser;
use controllers::*;
use engine::{EngineConfig, SplitsEngine};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc};
use store::PgStore;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Command {
    /// Service port
    #[arg(long, env = "PORT", default_value_t = 9000)]
    port: u16,

    /// Database URL
    #[arg(long, env = "DATABASE_URL")]
    database: String,

    /// Chain the coordinator contract is deployed on
    #[arg(long, env = "CHAIN_ID", default_value_t = 534352)]
    chain_id: u64,

    /// JSON-RPC endpoint for that chain
    #[arg(long, env = "RPC_URL_SCROLL")]
    rpc: String,

    /// Coordinator contract address
    #[arg(long, env = "SPLIT_COORDINATOR_ADDRESS")]
    coordinator: String,

    /// EIP-712 domain name
    #[arg(long, env = "EIP712_NAME", default_value = "Accountant")]
    eip712_name: String,

    /// EIP-712 domain version
    #[arg(long, env = "EIP712_VERSION", default_value = "1")]
    eip712_version: String,

    /// Executor private key; on-chain writes fail fast without it
    #[arg(long, env = "EXECUTOR_PRIVATE_KEY")]
    executor_key: Option<String>,
}

pub struct AppState {
    pub engine: SplitsEngine<PgStore, EvmGateway>,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .init();

    let args = Command::parse();

    let coordinator = match args.coordinator.parse() {
        Ok(addr) => addr,
        Err(_) => {
            error!(
                "🔥 Invalid SPLIT_COORDINATOR_ADDRESS: {}",
                args.coordinator
            );
            std::process::exit(1);
        }
    };
    let gateway = match EvmGateway::new(coordinator, &args.rpc, args.executor_key.as_deref()) {
        Ok(gateway) => gateway,
        Err(err) => {
            error!("🔥 Chain gateway setup failed: {:?}", err);
            std::process::exit(1);
        }
    };
    if args.executor_key.is_none() {
        warn!("no EXECUTOR_PRIVATE_KEY configured, on-chain writes will fail");
    }

    // setup database & init
    let db = match PgPoolOptions::new()
        .max_connections(5)
        .connect(&args.database)
        .await
    {
        Ok(pool) => {
            info!("✅ Connection to the database is successful!");
            pool
        }
        Err(err) => {
            error!("🔥 Failed to connect to the database: {:?}", err);
            std::process::exit(1);
        }
    };

    sqlx::migrate!().run(&db).await.expect("Migrations failed");

    let config = EngineConfig {
        chain_id: args.chain_id,
        contract: coordinator,
        eip712_name: args.eip712_name,
        eip712_version: args.eip712_version,
    };
    let app_state = Arc::new(AppState {
        engine: SplitsEngine::new(PgStore::new(db), gateway, config),
    });

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/splits", post(create_split))
        .route("/splits/{id}", get(get_split))
        .route("/splits/{id}/approve-intent", post(approve_intent))
        .route("/splits/{id}/signatures", post(submit_signature))
        .route("/splits/{id}/settle", post(settle))
        .route("/splits/allowances/check", get(check_allowance))
        .route("/tokens", get(list_tokens))
        .with_state(app_state)
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(&addr).await.unwrap();
    info!("🚀 Server is running on 0.0.0.0:{}", args.port);

    axum::serve(listener, router).await.unwrap()
}
