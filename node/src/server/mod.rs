//! The HTTP surface: public wallet-facing routes and the private node-to-node
//! routes the synchronizer consumes. The state handle is injected into every
//! filter by cloning the Arc.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use log::info;
use serde::Serialize;
use serde_json::json;
use warp::http::StatusCode;
use warp::reply::{with_status, Reply, Response};
use warp::ws::{Message, WebSocket};
use warp::Filter;

use flintcoin_core::{Account, Block, BlockTx, CoreError, Info, PeerStatus, SignedTx};

use crate::names::NameService;
use crate::state::{State, StateError, QUERY_LATEST};

#[derive(Serialize)]
struct AccountInfo {
    account: Account,
    name: String,
    balance: u64,
    nonce: u64,
}

#[derive(Serialize)]
struct AccountsReply {
    latest_block: String,
    uncommitted: usize,
    accounts: Vec<AccountInfo>,
}

/// Serve the v1 API until the future is dropped.
pub async fn run_server(state: Arc<State>, names: Arc<NameService>, addr: SocketAddr) {
    let state_filter = {
        let state = state.clone();
        warp::any().map(move || state.clone())
    };
    let names_filter = {
        let names = names.clone();
        warp::any().map(move || names.clone())
    };

    // ------------------------------------------------------------------
    // Public routes

    let genesis = warp::path!("v1" / "genesis")
        .and(warp::get())
        .and(state_filter.clone())
        .map(|state: Arc<State>| warp::reply::json(&state.retrieve_genesis()).into_response());

    let accounts_list = warp::path!("v1" / "accounts" / "list")
        .and(warp::get())
        .and(state_filter.clone())
        .and(names_filter.clone())
        .map(|state: Arc<State>, names: Arc<NameService>| {
            let accounts = state.retrieve_accounts();
            warp::reply::json(&accounts_reply(&state, &names, accounts)).into_response()
        });

    let accounts_one = warp::path!("v1" / "accounts" / "list" / String)
        .and(warp::get())
        .and(state_filter.clone())
        .and(names_filter.clone())
        .map(|account: String, state: Arc<State>, names: Arc<NameService>| {
            let account = match Account::try_from_hex(&account) {
                Ok(account) => account,
                Err(err) => return error_reply(StatusCode::BAD_REQUEST, &err.to_string()),
            };

            let mut accounts = state.retrieve_accounts();
            accounts.retain(|candidate, _| *candidate == account);
            warp::reply::json(&accounts_reply(&state, &names, accounts)).into_response()
        });

    let tx_uncommitted = warp::path!("v1" / "tx" / "uncommitted" / "list")
        .and(warp::get())
        .and(state_filter.clone())
        .map(|state: Arc<State>| warp::reply::json(&state.retrieve_mempool()).into_response());

    let tx_submit = warp::path!("v1" / "tx" / "submit")
        .and(warp::post())
        .and(warp::body::json())
        .and(state_filter.clone())
        .map(|signed_tx: SignedTx, state: Arc<State>| {
            info!(
                "http: submit wallet tx: nonce {} to {} value {} tip {}",
                signed_tx.tx.nonce, signed_tx.tx.to, signed_tx.tx.value, signed_tx.tx.tip
            );
            match state.submit_wallet_transaction(signed_tx) {
                Ok(()) => {
                    warp::reply::json(&json!({ "status": "transaction added to mempool" }))
                        .into_response()
                }
                Err(err) => state_error_reply(&err),
            }
        });

    let events = warp::path!("v1" / "events")
        .and(warp::ws())
        .map(|ws: warp::ws::Ws| ws.on_upgrade(handle_events).into_response());

    // ------------------------------------------------------------------
    // Private node-to-node routes

    let node_status = warp::path!("v1" / "node" / "status")
        .and(warp::get())
        .and(state_filter.clone())
        .map(|state: Arc<State>| {
            let latest = state.retrieve_latest_block();
            let status = PeerStatus {
                latest_block_hash: latest.hash(),
                latest_block_number: latest.header.number,
                known_peers: state.retrieve_known_peers(),
            };
            warp::reply::json(&status).into_response()
        });

    let node_block_list = warp::path!("v1" / "node" / "block" / "list" / String / String)
        .and(warp::get())
        .and(state_filter.clone())
        .map(|from: String, to: String, state: Arc<State>| {
            let (from, to) = match (parse_block_number(&from), parse_block_number(&to)) {
                (Some(from), Some(to)) => (from, to),
                _ => return error_reply(StatusCode::BAD_REQUEST, "invalid block number"),
            };
            if from > to && to != QUERY_LATEST {
                return error_reply(StatusCode::BAD_REQUEST, "from greater than to");
            }

            let blocks = state.query_blocks_by_number(from, to);
            if blocks.is_empty() {
                return StatusCode::NO_CONTENT.into_response();
            }
            warp::reply::json(&blocks).into_response()
        });

    let node_tx_list = warp::path!("v1" / "node" / "tx" / "list")
        .and(warp::get())
        .and(state_filter.clone())
        .map(|state: Arc<State>| warp::reply::json(&state.retrieve_mempool()).into_response());

    let node_tx_submit = warp::path!("v1" / "node" / "tx" / "submit")
        .and(warp::post())
        .and(warp::body::json())
        .and(state_filter.clone())
        .map(|tx: BlockTx, state: Arc<State>| match state.submit_node_transaction(tx) {
            Ok(()) => warp::reply::json(&json!({ "status": "transaction added to mempool" }))
                .into_response(),
            Err(err) => state_error_reply(&err),
        });

    let node_block_next = warp::path!("v1" / "node" / "block" / "next")
        .and(warp::post())
        .and(warp::body::json())
        .and(state_filter.clone())
        .map(|block: Block, state: Arc<State>| {
            info!("http: peer block {} received", block.header.number);
            match state.write_peer_block(block) {
                Ok(()) => warp::reply::json(&json!({ "status": "accepted" })).into_response(),
                Err(err) => state_error_reply(&err),
            }
        });

    let routes = genesis
        .or(accounts_list)
        .or(accounts_one)
        .or(tx_uncommitted)
        .or(tx_submit)
        .or(events)
        .or(node_status)
        .or(node_block_list)
        .or(node_tx_list)
        .or(node_tx_submit)
        .or(node_block_next)
        .with(warp::log("flintcoin::http"))
        .boxed();

    info!("http: serving at http://{addr}");
    warp::serve(routes).run(addr).await;
}

/// Keep the events socket alive with a ping every second; clients hang up by
/// closing their side.
async fn handle_events(mut socket: WebSocket) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        if socket.send(Message::ping(Vec::new())).await.is_err() {
            return;
        }
    }
}

fn parse_block_number(raw: &str) -> Option<u64> {
    if raw == "latest" || raw.is_empty() {
        return Some(QUERY_LATEST);
    }
    raw.parse().ok()
}

fn accounts_reply(
    state: &Arc<State>,
    names: &NameService,
    accounts: HashMap<Account, Info>,
) -> AccountsReply {
    let mut list: Vec<AccountInfo> = accounts
        .into_iter()
        .map(|(account, info)| AccountInfo {
            name: names.lookup(&account),
            balance: info.balance,
            nonce: info.nonce,
            account,
        })
        .collect();
    list.sort_by(|a, b| a.account.cmp(&b.account));

    AccountsReply {
        latest_block: state.retrieve_latest_block().hash(),
        uncommitted: state.query_mempool_length(),
        accounts: list,
    }
}

fn state_error_reply(err: &StateError) -> Response {
    let code = match err {
        StateError::Core(CoreError::Io(_)) | StateError::Core(CoreError::Json(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    };
    error_reply(code, &err.to_string())
}

fn error_reply(code: StatusCode, message: &str) -> Response {
    with_status(warp::reply::json(&json!({ "error": message })), code).into_response()
}
