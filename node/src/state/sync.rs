//! The peer synchronizer: pull-based catch-up against every known peer.
//! Status first (merging their peer list into ours), then their mempool,
//! then any blocks we are missing. Transient HTTP failures are logged and
//! the peer is skipped; sync never aborts the node.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use log::{debug, info, warn};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use flintcoin_core::{Block, BlockTx, Peer, PeerStatus};

use crate::state::State;

/// One full sync pass over the known peers.
pub(crate) async fn run_once(state: &Arc<State>) {
    let client = reqwest::Client::new();

    for peer in state.retrieve_known_peers() {
        debug!("sync: {}: started", peer.host);

        let status = match query_peer_status(&client, &peer).await {
            Ok(status) => status,
            Err(err) => {
                warn!("sync: {}: status: {err}", peer.host);
                continue;
            }
        };

        // Merge the peer's view of the network into ours.
        for known in status.known_peers {
            let host = known.host.clone();
            if state.add_peer(known) {
                info!("sync: {}: adding peer {host}", peer.host);
            }
        }

        // Adopt their pending transactions; identical entries overwrite ours,
        // which is a no-op.
        match query_peer_mempool(&client, &peer).await {
            Ok(pool) => {
                for tx in pool {
                    debug!("sync: {}: add tx {}", peer.host, tx.signed.signature_string());
                    if let Err(err) = state.mempool.upsert(tx) {
                        warn!("sync: {}: mempool tx: {err}", peer.host);
                    }
                }
            }
            Err(err) => warn!("sync: {}: mempool: {err}", peer.host),
        }

        // If the peer has blocks we don't have, catch up through the
        // coordinator so every block is validated and committed atomically.
        let local = state.retrieve_latest_block().header.number;
        if status.latest_block_number > local {
            info!(
                "sync: {}: peer is at block {} and we are at {local}",
                peer.host, status.latest_block_number
            );
            if let Err(err) = write_peer_blocks(&client, state, &peer).await {
                warn!("sync: {}: blocks: {err}", peer.host);
            }
        }
    }
}

/// Ticker-driven sync passes until shutdown.
pub(crate) async fn peer_operations(state: Arc<State>, every: Duration, shut: CancellationToken) {
    info!("worker: peer operations started: every {every:?}");

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // the first tick completes immediately

    loop {
        tokio::select! {
            _ = shut.cancelled() => {
                info!("worker: peer operations received shut signal");
                return;
            }
            _ = ticker.tick() => run_once(&state).await,
        }
    }
}

async fn query_peer_status(client: &reqwest::Client, peer: &Peer) -> anyhow::Result<PeerStatus> {
    let url = format!("http://{}/v1/node/status", peer.host);
    get_json(client, &url)
        .await?
        .ok_or_else(|| anyhow!("peer returned no status"))
}

async fn query_peer_mempool(client: &reqwest::Client, peer: &Peer) -> anyhow::Result<Vec<BlockTx>> {
    let url = format!("http://{}/v1/node/tx/list", peer.host);
    Ok(get_json(client, &url).await?.unwrap_or_default())
}

/// Ask the peer for the blocks after our latest and commit each one. Stops at
/// the first block the coordinator rejects.
async fn write_peer_blocks(
    client: &reqwest::Client,
    state: &Arc<State>,
    peer: &Peer,
) -> anyhow::Result<()> {
    let from = state.retrieve_latest_block().header.number + 1;
    let url = format!("http://{}/v1/node/block/list/{from}/latest", peer.host);

    let blocks: Vec<Block> = get_json(client, &url).await?.unwrap_or_default();
    info!("sync: {}: found {} blocks", peer.host, blocks.len());

    for block in blocks {
        let number = block.header.number;
        state
            .write_peer_block(block)
            .with_context(|| format!("writing peer block {number}"))?;
        debug!("sync: {}: wrote block {number}", peer.host);
    }

    Ok(())
}

/// GET a JSON value following the node HTTP contract: 204 means an empty
/// success, any other non-2xx body is the error message.
async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> anyhow::Result<Option<T>> {
    let response = client.get(url).send().await?;

    if response.status() == StatusCode::NO_CONTENT {
        return Ok(None);
    }
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("{status}: {body}"));
    }

    Ok(Some(response.json().await?))
}
