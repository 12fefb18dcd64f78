use log::{debug, info};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use flintcoin_core::{is_hash_solved, Block, BlockFS};

use crate::state::StateError;

/// How often the search logs progress and yields to the scheduler.
const YIELD_EVERY: u64 = 1_000_000;

/// Solve the PoW puzzle for the candidate block, returning it paired with its
/// winning hash. The search starts from a random nonce so independent miners
/// do not walk identical paths, and checks for cancellation on every attempt,
/// so a peer-block commit is never starved behind a long search.
pub async fn perform_pow(
    cancel: &CancellationToken,
    difficulty: u32,
    mut block: Block,
) -> Result<BlockFS, StateError> {
    block.header.nonce = rand::thread_rng().gen_range(0..(1u64 << 63));

    let mut attempts: u64 = 0;
    loop {
        attempts += 1;
        if attempts % YIELD_EVERY == 0 {
            debug!("pow: attempts[{attempts}]");
            tokio::task::yield_now().await;
        }

        if cancel.is_cancelled() {
            info!("pow: cancelled after {attempts} attempts");
            return Err(StateError::Cancelled);
        }

        let hash = block.hash();
        if !is_hash_solved(difficulty, &hash) {
            block.header.nonce = block.header.nonce.wrapping_add(1);
            continue;
        }

        info!(
            "pow: solved: prev[{}] new[{hash}] attempts[{attempts}]",
            block.header.parent_hash
        );
        return Ok(BlockFS { hash, block });
    }
}
