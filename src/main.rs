// This is my entry point for the traceability CLI
// Every command wires the local adapters together: sled stores, the local contract and a local wallet
use clap::Parser;
use log::{error, LevelFilter};
use pharma_trace::core::TokenId;
use pharma_trace::{
    Address, BatchRequest, CancellationToken, Command, LedgerClient, LocalLedger, LocalWallet,
    MintReceipt, Opt, PersistenceGateway, ProductionWorkflow, ReceiptReconciler, RetryOutcome,
    Settings, SledContentStore, SledGateway, TransferRetryWorkflow, Wallets, GLOBAL_CONFIG,
};
use std::fs;
use std::path::Path;
use std::process;
use std::sync::Arc;

const CONTENT_DIR: &str = "content";
const BACKEND_DIR: &str = "backend";
const LEDGER_SNAPSHOT: &str = "ledger.json";
// Network the local wallet reports when the settings do not pin one
const LOCAL_NETWORK_ID: u64 = 1337;

fn main() {
    // Info level shows every workflow step without the polling noise
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();
    if let Some(dir) = opt.data_dir {
        GLOBAL_CONFIG.set_data_dir(dir);
    }

    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

// Everything a signing command needs, connected as `signer`
struct Session {
    settings: Settings,
    ledger: LedgerClient,
    gateway: Arc<SledGateway>,
}

fn open_session(
    signer: &Address,
    gateway: Arc<SledGateway>,
) -> Result<Session, Box<dyn std::error::Error>> {
    let settings = GLOBAL_CONFIG.settings();
    let data_dir = &settings.data_dir;
    fs::create_dir_all(data_dir)?;

    let wallets = Wallets::open(data_dir);
    let keys = wallets
        .get_wallet(signer)
        .cloned()
        .ok_or_else(|| format!("No local wallet for {signer}; run createwallet first"))?;

    let contract = Address::parse(&settings.contract_address)?;
    let node = Arc::new(LocalLedger::open(contract, &data_dir.join(LEDGER_SNAPSHOT))?);
    let wallet = Arc::new(LocalWallet::new(
        node.clone(),
        settings.network_id.unwrap_or(LOCAL_NETWORK_ID),
    ));
    wallet.connect(keys);

    let ledger = LedgerClient::from_settings(wallet, node, &settings)?;
    Ok(Session {
        settings,
        ledger,
        gateway,
    })
}

fn open_gateway(data_dir: &Path) -> Result<SledGateway, Box<dyn std::error::Error>> {
    Ok(SledGateway::open(&data_dir.join(BACKEND_DIR))?)
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Createwallet => {
            let settings = GLOBAL_CONFIG.settings();
            fs::create_dir_all(&settings.data_dir)?;
            let mut wallets = Wallets::open(&settings.data_dir);
            let address = wallets.create_wallet()?;
            println!("Your new address: {address}");
        }
        Command::ListAddresses => {
            let wallets = Wallets::open(&GLOBAL_CONFIG.settings().data_dir);
            for address in wallets.get_addresses() {
                println!("{address}");
            }
        }
        Command::Produce {
            from,
            drug,
            batch,
            quantity,
            mfg_date,
            shelf_life_months,
            notes,
        } => {
            let signer = Address::parse(&from)?;
            let gateway = Arc::new(open_gateway(&GLOBAL_CONFIG.settings().data_dir)?);
            let session = open_session(&signer, gateway)?;
            let content_store = Arc::new(SledContentStore::open(
                &session.settings.data_dir.join(CONTENT_DIR),
                session.settings.max_metadata_bytes,
            )?);
            let workflow =
                ProductionWorkflow::new(content_store, session.ledger, session.gateway.clone())
                    .with_replication(session.settings.replication)
                    .with_expected_network(session.settings.network_id);

            let request = BatchRequest {
                drug_id: drug,
                batch_code: batch,
                quantity,
                mfg_date,
                shelf_life_months,
                notes,
            };
            let outcome = workflow.submit(&request)?;
            println!("Record: {}", outcome.record_id);
            println!("Transaction: {}", outcome.tx_hash);
            println!("Metadata: {}", outcome.content.locator);
            println!("Expires: {}", outcome.batch.expiry_date);
            let ids: Vec<String> =
                outcome.token_ids.ids().iter().map(|id| id.to_string()).collect();
            println!("Token ids: {}", ids.join(", "));
            if outcome.token_ids.is_heuristic() {
                println!("Warning: some token ids were inferred, not read from the receipt");
            }
        }
        Command::CreateInvoice {
            batch,
            from,
            to,
            token_ids,
            amounts,
        } => {
            let from = Address::parse(&from)?;
            let to = Address::parse(&to)?;
            let ids: Vec<TokenId> = token_ids
                .iter()
                .map(|raw| TokenId::parse_user_input(raw))
                .collect();
            if ids.iter().any(TokenId::is_zero) {
                return Err("Token ids must be non-zero decimal or hex values".into());
            }
            let gateway = open_gateway(&GLOBAL_CONFIG.settings().data_dir)?;
            let invoice = gateway.create_invoice(&batch, from, to, ids, amounts)?;
            println!("Invoice: {}", invoice.id);
        }
        Command::RetryTransfer { invoice_id, resume } => {
            let gateway = Arc::new(open_gateway(&GLOBAL_CONFIG.settings().data_dir)?);
            let invoice = gateway
                .load_invoice(&invoice_id)?
                .ok_or_else(|| format!("Unknown invoice {invoice_id}"))?;
            let session = open_session(&invoice.from, gateway)?;
            let workflow = TransferRetryWorkflow::new(session.ledger, session.gateway.clone())
                .with_expected_network(session.settings.network_id);

            let outcome = match resume {
                Some(tx_hash) => workflow.resume_persistence(&invoice, &tx_hash)?,
                None => workflow.retry(&invoice, &CancellationToken::new())?,
            };
            match outcome {
                RetryOutcome::Completed { record_id, tx_hash } => {
                    println!("Transferred in {tx_hash}, recorded as {record_id}");
                }
                RetryOutcome::AlreadyInFlight => println!("A retry is already running"),
            }
        }
        Command::ReceiveInvoice { invoice_id } => {
            let gateway = open_gateway(&GLOBAL_CONFIG.settings().data_dir)?;
            let invoice = gateway.mark_received(&invoice_id)?;
            println!("Invoice {} is {}", invoice.id, invoice.status);
        }
        Command::CancelInvoice { invoice_id } => {
            let gateway = open_gateway(&GLOBAL_CONFIG.settings().data_dir)?;
            let invoice = gateway.cancel_invoice(&invoice_id)?;
            println!("Invoice {} is {}", invoice.id, invoice.status);
        }
        Command::ListInvoices => {
            let gateway = open_gateway(&GLOBAL_CONFIG.settings().data_dir)?;
            for invoice in gateway.list_invoices()? {
                println!(
                    "{} batch={} {} -> {} [{}] {}",
                    invoice.id,
                    invoice.batch_ref,
                    invoice.from,
                    invoice.to,
                    invoice.token_ids.len(),
                    invoice.status
                );
            }
        }
        Command::Reconcile { receipt, quantity } => {
            let raw = fs::read(&receipt)?;
            let receipt: MintReceipt = serde_json::from_slice(&raw)?;
            let set = ReceiptReconciler::reconcile(&receipt, quantity)?;
            let report = serde_json::json!({
                "transactionHash": receipt.transaction_hash,
                "tokenIds": set.ids(),
                "heuristic": set.is_heuristic(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::ShowMint { record_id } => {
            let gateway = open_gateway(&GLOBAL_CONFIG.settings().data_dir)?;
            let record = gateway
                .mint_record(&record_id)?
                .ok_or_else(|| format!("No mint record {record_id}"))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }
    Ok(())
}
