mod commands;
mod wallet;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "flintcoin-wallet")]
#[command(about = "flintcoin CLI wallet", long_about = None)]
struct Cli {
    /// Base URL of the node to talk to.
    #[arg(long, default_value = "http://localhost:8080")]
    node_url: String,

    /// Path of the hex-encoded private key file.
    #[arg(long, default_value = "wallet.ecdsa")]
    wallet: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new wallet key file
    Generate,

    /// Check the balance of an account
    Balance { account: String },

    /// Create, sign and submit a transaction
    Send {
        /// Receiving account
        #[arg(short = 't', long)]
        to: String,

        /// Per-sender transaction nonce
        #[arg(short = 'n', long)]
        nonce: u64,

        /// Value to transfer
        #[arg(short = 'v', long)]
        value: u64,

        /// Tip offered to the miner
        #[arg(short = 'p', long, default_value_t = 0)]
        tip: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate => commands::generate_wallet(&cli.wallet),
        Commands::Balance { account } => commands::get_balance(&cli.node_url, &account),
        Commands::Send { to, nonce, value, tip } => {
            commands::send_transaction(&cli.node_url, &cli.wallet, &to, nonce, value, tip)
        }
    };

    if let Err(err) = result {
        eprintln!("❌ {err:#}");
        process::exit(1);
    }
}
