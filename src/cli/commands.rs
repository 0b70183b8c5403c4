use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pharma-trace")]
pub struct Opt {
    #[arg(
        long = "data-dir",
        global = true,
        help = "Directory for wallets, the ledger snapshot and local stores"
    )]
    pub data_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createwallet", about = "Create a new signing wallet")]
    Createwallet,
    #[command(name = "listaddresses", about = "Print local wallet addresses")]
    ListAddresses,
    #[command(name = "produce", about = "Mint a new production batch")]
    Produce {
        #[arg(help = "Manufacturer wallet address that signs the mint")]
        from: String,
        #[arg(help = "Drug reference")]
        drug: String,
        #[arg(help = "Batch code (alphanumeric, up to 30 characters)")]
        batch: String,
        #[arg(help = "Units to mint")]
        quantity: u64,
        #[arg(help = "Manufacturing date (YYYY-MM-DD)")]
        mfg_date: NaiveDate,
        #[arg(help = "Shelf life in months")]
        shelf_life_months: u32,
        #[arg(long = "notes", default_value = "", help = "Free-text notes")]
        notes: String,
    },
    #[command(name = "createinvoice", about = "Open a pending transfer invoice")]
    CreateInvoice {
        #[arg(help = "Originating batch reference")]
        batch: String,
        #[arg(help = "Sending wallet address")]
        from: String,
        #[arg(help = "Destination address")]
        to: String,
        #[arg(
            required = true,
            num_args = 1..,
            help = "Token ids to move (decimal or hex)"
        )]
        token_ids: Vec<String>,
        #[arg(
            long = "amounts",
            value_delimiter = ',',
            help = "Comma-separated amounts, one per token id"
        )]
        amounts: Option<Vec<u64>>,
    },
    #[command(
        name = "retrytransfer",
        about = "Re-attempt the on-chain transfer of a pending invoice"
    )]
    RetryTransfer {
        #[arg(help = "Invoice id")]
        invoice_id: String,
        #[arg(
            long = "resume",
            help = "Hash of a transfer that confirmed but was not saved; only records it"
        )]
        resume: Option<String>,
    },
    #[command(name = "receiveinvoice", about = "Mark a sent invoice as received")]
    ReceiveInvoice {
        #[arg(help = "Invoice id")]
        invoice_id: String,
    },
    #[command(name = "cancelinvoice", about = "Cancel a pending invoice")]
    CancelInvoice {
        #[arg(help = "Invoice id")]
        invoice_id: String,
    },
    #[command(name = "listinvoices", about = "Print every invoice and its status")]
    ListInvoices,
    #[command(
        name = "reconcile",
        about = "Reconcile minted token ids from a receipt JSON file"
    )]
    Reconcile {
        #[arg(help = "Path to the receipt JSON")]
        receipt: PathBuf,
        #[arg(help = "Expected quantity")]
        quantity: usize,
    },
    #[command(name = "showmint", about = "Print a saved mint record")]
    ShowMint {
        #[arg(help = "Record id returned by produce")]
        record_id: String,
    },
}
