use std::path::Path;

use anyhow::{bail, Context};
use reqwest::blocking::Client;
use serde_json::Value;

use flintcoin_core::{Account, UserTx};

use crate::wallet::Wallet;

/// Create a new key file and print the account it controls.
pub fn generate_wallet(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        bail!("wallet {} already exists", path.display());
    }

    let wallet = Wallet::generate();
    wallet.save(path)?;

    println!("✅ New wallet created at {}", path.display());
    println!("account: {}", wallet.account);
    Ok(())
}

/// Query the node for an account's balance.
pub fn get_balance(node_url: &str, account: &str) -> anyhow::Result<()> {
    let account = Account::try_from_hex(account)?;

    let url = format!("{node_url}/v1/accounts/list/{account}");
    let response = Client::new().get(&url).send().context("node unreachable")?;
    if !response.status().is_success() {
        bail!("node returned {}: {}", response.status(), response.text().unwrap_or_default());
    }

    let reply: Value = response.json().context("unexpected reply")?;
    match reply["accounts"].as_array().and_then(|accounts| accounts.first()) {
        Some(info) => println!("💰 balance: {}  (nonce {})", info["balance"], info["nonce"]),
        None => println!("💰 balance: 0  (account unknown to the chain)"),
    }

    Ok(())
}

/// Build, sign and submit a value transfer.
pub fn send_transaction(
    node_url: &str,
    wallet_path: &Path,
    to: &str,
    nonce: u64,
    value: u64,
    tip: u64,
) -> anyhow::Result<()> {
    let wallet = Wallet::load(wallet_path)?;
    let to = Account::try_from_hex(to)?;

    let tx = UserTx::new(nonce, to, value, tip, Vec::new());
    let signed = wallet.sign(&tx)?;

    let url = format!("{node_url}/v1/tx/submit");
    let response = Client::new()
        .post(&url)
        .json(&signed)
        .send()
        .context("node unreachable")?;

    if !response.status().is_success() {
        bail!(
            "transaction rejected, {}: {}",
            response.status(),
            response.text().unwrap_or_default()
        );
    }

    println!("🚀 Transaction submitted from {}", wallet.account);
    println!("signature: {}", signed.signature_string());
    Ok(())
}
