use std::process::Command;

use anyhow::{Context as _, Result};
use assert_cmd::prelude::*;
use predicates::prelude::*;

fn reverse_swap() -> Result<Command> {
    let mut cmd = Command::cargo_bin("reverse_swap").context("locate reverse_swap binary")?;
    cmd.env("RUST_LOG", "off");
    Ok(cmd)
}

#[test]
fn help_lists_subcommands() -> Result<()> {
    reverse_swap()?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("claim-fee"))
        .stdout(predicate::str::contains("query-route"))
        .stdout(predicate::str::contains("health"));
    Ok(())
}

#[test]
fn claim_fee_works_offline() -> Result<()> {
    // 546 weight units for a P2WPKH claim output
    reverse_swap()?
        .args([
            "--network",
            "testnet",
            "claim-fee",
            "--address",
            "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx",
            "--fee-per-kw",
            "250",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"fee_sats\": 137"));
    Ok(())
}

#[test]
fn claim_fee_rejects_address_of_other_network() -> Result<()> {
    reverse_swap()?
        .args([
            "--network",
            "testnet",
            "claim-fee",
            "--address",
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
            "--fee-per-kw",
            "250",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid input"));
    Ok(())
}

#[test]
fn regtest_requires_provider_url() -> Result<()> {
    reverse_swap()?
        .args(["--network", "regtest", "claim-fee", "--address", "x", "--fee-per-kw", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("provider_url"));
    Ok(())
}

#[test]
fn status_of_unknown_swap_fails() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    reverse_swap()?
        .arg("--store-path")
        .arg(dir.path().join("swaps.sqlite3"))
        .args(["status", "--swap-id", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    Ok(())
}

#[test]
fn health_with_unreachable_node_reports_empty_live_set() -> Result<()> {
    let dir = tempfile::tempdir().context("create tempdir")?;
    let config = dir.path().join("config.json");
    std::fs::write(
        &config,
        serde_json::json!({
          "network": "testnet",
          "timeout_secs": 1,
          "nodes": {
            "alice": {
              "rpc_address": "https://127.0.0.1:1",
              "tls_cert_path": dir.path().join("tls.cert"),
              "macaroon_path": dir.path().join("admin.macaroon")
            }
          }
        })
        .to_string(),
    )
    .context("write config")?;

    reverse_swap()?
        .arg("--config")
        .arg(&config)
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"alice\""))
        .stdout(predicate::str::contains("\"live\": []"));
    Ok(())
}
