use std::path::PathBuf;

use anyhow::{Context as _, Result};
use bitcoin::Amount;
use clap::{Parser as _, Subcommand};
use ln_btc_reverse_swap::config::{AppConfig, SwapNetwork};
use ln_btc_reverse_swap::lightning::lnd::NodeAdapter;
use ln_btc_reverse_swap::lightning::registry::NodeRegistry;
use ln_btc_reverse_swap::swap::engine::ReverseSwapEngine;
use ln_btc_reverse_swap::swap::provider::{
    BTC_PAIR_ID, BTC_SYMBOL, SwapProvider as _, SwapServiceClient,
};
use ln_btc_reverse_swap::swap::store::SqliteSwapStore;
use ln_btc_reverse_swap::swap::{ReverseSwapRecord, SwapState};
use serde_json::json;

const DEFAULT_STORE_PATH: &str = "reverse_swaps.sqlite3";

#[derive(Debug, clap::Parser)]
struct Args {
    /// JSON config file. Without it the defaults below apply.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    network: Option<SwapNetwork>,

    /// Provider base URL; only accepted on regtest.
    #[arg(long)]
    provider_url: Option<String>,

    #[arg(long)]
    timeout_secs: Option<u64>,

    #[arg(long)]
    store_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Pairs,
    Fees,
    Quote {
        #[arg(long)]
        amount_sats: u64,
    },
    Create {
        #[arg(long)]
        amount_sats: u64,
    },
    Status {
        #[arg(long)]
        swap_id: String,
    },
    ClaimFee {
        #[arg(long)]
        address: String,

        /// sat per 1000 weight units; fetched from the provider when omitted.
        #[arg(long)]
        fee_per_kw: Option<u64>,
    },
    Claim {
        #[arg(long)]
        swap_id: String,

        #[arg(long)]
        address: String,

        #[arg(long)]
        fee_per_kw: Option<u64>,
    },
    NodeInfo {
        #[arg(long)]
        node: String,
    },
    DecodeInvoice {
        #[arg(long)]
        node: String,

        #[arg(long)]
        invoice: String,
    },
    QueryRoute {
        #[arg(long)]
        node: String,

        #[arg(long)]
        invoice: String,
    },
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    ln_btc_reverse_swap::logging::init().ok();
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig {
            network: SwapNetwork::Testnet,
            provider_url: None,
            timeout_secs: 30,
            store_path: None,
            nodes: Default::default(),
        },
    };
    if let Some(network) = args.network {
        cfg.network = network;
    }
    if args.provider_url.is_some() {
        cfg.provider_url = args.provider_url.clone();
    }
    if let Some(timeout_secs) = args.timeout_secs {
        anyhow::ensure!(timeout_secs > 0, "timeout_secs must be > 0");
        cfg.timeout_secs = timeout_secs;
    }
    if args.store_path.is_some() {
        cfg.store_path = args.store_path.clone();
    }

    let params = cfg.network_params()?;
    let client = SwapServiceClient::new(&params, cfg.timeout()).context("build provider client")?;
    let engine = ReverseSwapEngine::new(client, params.network());

    let out = match args.command {
        Command::Pairs => {
            let pairs = engine.provider().get_pairs().await.context("get pairs")?;
            serde_json::to_value(pairs)?
        }
        Command::Fees => {
            let fees = engine
                .provider()
                .get_fee_estimate()
                .await
                .context("get fee estimate")?;
            json!({
              "sat_per_vbyte": fees.0,
              "btc_fee_per_kw": fees.fee_per_kw(BTC_SYMBOL),
            })
        }
        Command::Quote { amount_sats } => {
            let pairs = engine.provider().get_pairs().await.context("get pairs")?;
            let quote = pairs.reverse_quote(BTC_PAIR_ID, amount_sats)?;
            serde_json::to_value(quote)?
        }
        Command::Create { amount_sats } => {
            let mut store = open_store(&cfg)?;
            let record = engine
                .new_reverse_swap(amount_sats)
                .await
                .context("create reverse swap")?;
            store.insert_swap(&record)?;
            record_json(&record)
        }
        Command::Status { swap_id } => {
            let mut store = open_store(&cfg)?;
            let mut record = load_swap(&store, &swap_id)?;
            let refreshed = engine.refresh(&mut record).await;
            store.update_swap(&record)?;
            let state = refreshed.with_context(|| format!("refresh swap {swap_id}"))?;
            tracing::debug!(%swap_id, state = state.as_str(), "swap refreshed");
            record_json(&record)
        }
        Command::ClaimFee {
            address,
            fee_per_kw,
        } => {
            let fee_per_kw = resolve_fee_per_kw(&engine, fee_per_kw).await?;
            let fee = engine.compute_claim_fee(&address, fee_per_kw)?;
            json!({
              "fee_per_kw": fee_per_kw,
              "fee_sats": fee.to_sat(),
            })
        }
        Command::Claim {
            swap_id,
            address,
            fee_per_kw,
        } => {
            let mut store = open_store(&cfg)?;
            let mut record = load_swap(&store, &swap_id)?;
            if record.status != SwapState::LockupObserved {
                engine
                    .refresh(&mut record)
                    .await
                    .with_context(|| format!("refresh swap {swap_id}"))?;
                store.update_swap(&record)?;
            }

            let fee_per_kw = resolve_fee_per_kw(&engine, fee_per_kw).await?;
            let fee: Amount = engine.compute_claim_fee(&address, fee_per_kw)?;
            let claim = engine
                .build_claim_transaction(&mut record, &address, fee)
                .await
                .with_context(|| format!("claim swap {swap_id}"))?;
            store.update_swap(&record)?;
            serde_json::to_value(claim)?
        }
        Command::NodeInfo { node } => {
            let adapter = NodeAdapter::connect(cfg.node(&node)?, cfg.timeout()).await?;
            serde_json::to_value(adapter.get_info().await?)?
        }
        Command::DecodeInvoice { node, invoice } => {
            let adapter = NodeAdapter::connect(cfg.node(&node)?, cfg.timeout()).await?;
            let decoded = adapter.decode_invoice(&invoice).await?;
            json!({
              "destination": decoded.destination,
              "payment_hash": decoded.payment_hash,
              "amount_sats": decoded.amount_sats,
              "expiry_secs": decoded.expiry_secs,
              "description": decoded.description,
              "route_hints": decoded.route_hints.len(),
            })
        }
        Command::QueryRoute { node, invoice } => {
            let adapter = NodeAdapter::connect(cfg.node(&node)?, cfg.timeout()).await?;
            match adapter.query_route(&invoice).await {
                Some(route) => json!({
                  "total_time_lock": route.total_time_lock,
                  "total_fees_msat": route.total_fees_msat,
                  "total_amt_msat": route.total_amt_msat,
                  "hops": route.hops.iter().map(|h| json!({
                    "chan_id": h.chan_id,
                    "pub_key": h.pub_key,
                    "expiry": h.expiry,
                    "amt_to_forward_msat": h.amt_to_forward_msat,
                    "fee_msat": h.fee_msat,
                  })).collect::<Vec<_>>(),
                }),
                None => serde_json::Value::Null,
            }
        }
        Command::Health => {
            let registry = NodeRegistry::new();
            let live = registry.sweep(&cfg.nodes, cfg.timeout()).await;
            json!({
              "configured": cfg.nodes.keys().collect::<Vec<_>>(),
              "live": live.iter().collect::<Vec<_>>(),
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn open_store(cfg: &AppConfig) -> Result<SqliteSwapStore> {
    let path = cfg
        .store_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));
    SqliteSwapStore::open(path)
}

fn load_swap(store: &SqliteSwapStore, swap_id: &str) -> Result<ReverseSwapRecord> {
    store
        .get_swap(swap_id)?
        .with_context(|| format!("swap {swap_id} not found in {}", store.path().display()))
}

async fn resolve_fee_per_kw(
    engine: &ReverseSwapEngine<SwapServiceClient>,
    fee_per_kw: Option<u64>,
) -> Result<u64> {
    if let Some(v) = fee_per_kw {
        return Ok(v);
    }
    engine
        .provider()
        .get_fee_estimate()
        .await
        .context("get fee estimate")?
        .fee_per_kw(BTC_SYMBOL)
        .context("provider has no BTC fee estimate")
}

// Secrets stay in the store.
fn record_json(record: &ReverseSwapRecord) -> serde_json::Value {
    json!({
      "id": record.id,
      "status": record.status.as_str(),
      "invoice": record.invoice,
      "onchain_amount": record.onchain_amount,
      "lockup_address": record.lockup_address,
      "timeout_block_height": record.timeout_block_height,
      "lockup": record.lockup.as_ref().map(|l| json!({
        "txid": l.txid,
        "vout": l.vout,
        "amount": l.amount,
        "confirmed": l.confirmed,
        "eta": l.eta,
      })),
      "claim_txid": record.claim_txid,
    })
}
