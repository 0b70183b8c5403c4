// This is my in-process wallet: it holds one connected key at a time and signs calls
// for whichever ledger node it was wired to
// Only one signing prompt can be open at once; the signing mutex is that serialization point

use crate::core::Address;
use crate::error::{Result, TraceError};
use crate::ledger::{ContractCall, LedgerNode, PendingTx, SignedCall};
use crate::utils::ecdsa_p256_sha256_sign_digest;
use crate::wallet::{WalletEvent, WalletIdentityProvider, WalletKeys};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, RwLock};

pub struct LocalWallet {
    account: RwLock<Option<WalletKeys>>,
    network_id: RwLock<Option<u64>>,
    node: Arc<dyn LedgerNode>,
    nonce: AtomicU64,
    signing: Mutex<()>,
    decline_next: AtomicBool,
    subscribers: Mutex<Vec<Sender<WalletEvent>>>,
}

impl LocalWallet {
    // A wallet starts disconnected; connect() picks the account
    pub fn new(node: Arc<dyn LedgerNode>, network_id: u64) -> LocalWallet {
        LocalWallet {
            account: RwLock::new(None),
            network_id: RwLock::new(Some(network_id)),
            node,
            nonce: AtomicU64::new(0),
            signing: Mutex::new(()),
            decline_next: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn connect(&self, keys: WalletKeys) {
        let address = keys.address();
        let was_connected = self.swap_account(Some(keys));
        if was_connected {
            info!("Wallet switched account to {address}");
            self.notify(WalletEvent::AccountChanged(address));
        } else {
            info!("Wallet connected as {address}");
            self.notify(WalletEvent::Connected(address));
        }
    }

    pub fn disconnect(&self) {
        self.swap_account(None);
        info!("Wallet disconnected");
        self.notify(WalletEvent::Disconnected);
    }

    pub fn switch_network(&self, network_id: u64) {
        match self.network_id.write() {
            Ok(mut current) => *current = Some(network_id),
            Err(_) => {
                log::error!("Failed to acquire write lock on wallet network");
                return;
            }
        }
        self.notify(WalletEvent::NetworkChanged(network_id));
    }

    /// The next signature prompt will be declined, as if the user pressed reject
    pub fn decline_next_request(&self) {
        self.decline_next.store(true, Ordering::SeqCst);
    }

    fn swap_account(&self, keys: Option<WalletKeys>) -> bool {
        match self.account.write() {
            Ok(mut account) => {
                let was_connected = account.is_some();
                *account = keys;
                was_connected
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on wallet account");
                false
            }
        }
    }

    fn current_keys(&self) -> Option<WalletKeys> {
        match self.account.read() {
            Ok(account) => account.clone(),
            Err(_) => {
                log::error!("Failed to acquire read lock on wallet account");
                None
            }
        }
    }

    // Drop subscribers whose receiving end has gone away
    fn notify(&self, event: WalletEvent) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

impl WalletIdentityProvider for LocalWallet {
    fn current_address(&self) -> Option<Address> {
        self.current_keys().map(|keys| keys.address())
    }

    fn network_id(&self) -> Option<u64> {
        self.network_id.read().ok().and_then(|id| *id)
    }

    fn sign_and_send(&self, call: &ContractCall) -> Result<PendingTx> {
        let _prompt = self.signing.lock().map_err(|_| {
            TraceError::Crypto("Signing prompt poisoned by an earlier panic".to_string())
        })?;

        if self.decline_next.swap(false, Ordering::SeqCst) {
            warn!("Signature request for {} declined", call.method());
            return Err(TraceError::SignatureDeclined(format!(
                "User rejected {}",
                call.method()
            )));
        }

        let keys = self.current_keys().ok_or(TraceError::WalletNotConnected)?;
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let payload = call.signing_payload(nonce)?;
        let signature = ecdsa_p256_sha256_sign_digest(keys.pkcs8(), &payload)?;

        let signed = SignedCall {
            call: call.clone(),
            signer: keys.address(),
            public_key: keys.public_key().to_vec(),
            nonce,
            signature,
        };
        let pending = self.node.broadcast(signed)?;
        info!("Broadcast {} as {}", call.method(), pending.tx_hash);
        Ok(pending)
    }

    fn subscribe(&self) -> Receiver<WalletEvent> {
        let (tx, rx) = channel();
        match self.subscribers.lock() {
            Ok(mut subscribers) => subscribers.push(tx),
            Err(_) => log::error!("Failed to register wallet subscriber"),
        }
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TokenId;
    use crate::ledger::LocalLedger;
    use crate::wallet::require_signer;
    use std::thread;

    fn contract() -> Address {
        Address::parse("0x0000000000000000000000000000000000001155").unwrap()
    }

    #[test]
    fn test_account_change_notifications() {
        let wallet = LocalWallet::new(Arc::new(LocalLedger::new(contract())), 1);
        let events = wallet.subscribe();

        let first = WalletKeys::new().unwrap();
        let second = WalletKeys::new().unwrap();
        wallet.connect(first.clone());
        wallet.connect(second.clone());
        wallet.disconnect();

        assert_eq!(events.recv().unwrap(), WalletEvent::Connected(first.address()));
        assert_eq!(
            events.recv().unwrap(),
            WalletEvent::AccountChanged(second.address())
        );
        assert_eq!(events.recv().unwrap(), WalletEvent::Disconnected);
        assert_eq!(wallet.current_address(), None);
    }

    #[test]
    fn test_declined_request_sends_nothing() {
        let ledger = Arc::new(LocalLedger::new(contract()));
        let wallet = LocalWallet::new(ledger.clone(), 1);
        wallet.connect(WalletKeys::new().unwrap());
        wallet.decline_next_request();

        let call = ContractCall::MintBatch {
            contract: contract(),
            token_uri: "ipfs://x".to_string(),
            amounts: vec![1],
        };
        assert!(matches!(
            wallet.sign_and_send(&call),
            Err(TraceError::SignatureDeclined(_))
        ));
        assert_eq!(ledger.broadcast_count(), 0);

        // only the next request is declined
        assert!(wallet.sign_and_send(&call).is_ok());
        assert_eq!(ledger.broadcast_count(), 1);
        assert_eq!(ledger.owner_of(&TokenId::from(1)), wallet.current_address());
    }

    #[test]
    fn test_disconnected_wallet_cannot_sign() {
        let wallet = LocalWallet::new(Arc::new(LocalLedger::new(contract())), 1);
        let call = ContractCall::MintBatch {
            contract: contract(),
            token_uri: "ipfs://x".to_string(),
            amounts: vec![1],
        };
        assert!(matches!(
            wallet.sign_and_send(&call),
            Err(TraceError::WalletNotConnected)
        ));
    }

    #[test]
    fn test_network_switch_is_announced_and_enforced() {
        let wallet = LocalWallet::new(Arc::new(LocalLedger::new(contract())), 1);
        let keys = WalletKeys::new().unwrap();
        wallet.connect(keys.clone());
        let events = wallet.subscribe();
        assert_eq!(require_signer(&wallet, Some(1)).unwrap(), keys.address());

        wallet.switch_network(5);
        assert_eq!(events.recv().unwrap(), WalletEvent::NetworkChanged(5));
        assert_eq!(wallet.network_id(), Some(5));
        assert!(matches!(
            require_signer(&wallet, Some(1)),
            Err(TraceError::NetworkMismatch {
                expected: 1,
                actual: 5
            })
        ));
    }

    #[test]
    fn test_poisoned_prompt_is_not_a_user_decline() {
        let ledger = Arc::new(LocalLedger::new(contract()));
        let wallet = Arc::new(LocalWallet::new(ledger.clone(), 1));
        wallet.connect(WalletKeys::new().unwrap());

        let holder = wallet.clone();
        let crashed = thread::spawn(move || {
            let _prompt = holder.signing.lock().unwrap();
            panic!("prompt crashed");
        })
        .join();
        assert!(crashed.is_err());

        let call = ContractCall::MintBatch {
            contract: contract(),
            token_uri: "ipfs://x".to_string(),
            amounts: vec![1],
        };
        assert!(matches!(
            wallet.sign_and_send(&call),
            Err(TraceError::Crypto(_))
        ));
        assert_eq!(ledger.broadcast_count(), 0);
    }
}
