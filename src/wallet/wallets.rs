use crate::core::Address;
use crate::error::Result;
use crate::utils::{deserialize, serialize};
use crate::wallet::WalletKeys;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const WALLET_FILE: &str = "wallets.json";

/// On-disk collection of local signing keys, keyed by address
pub struct Wallets {
    path: PathBuf,
    wallets: HashMap<Address, WalletKeys>,
}

impl Wallets {
    pub fn open(data_dir: &Path) -> Wallets {
        let mut wallets = Wallets {
            path: data_dir.join(WALLET_FILE),
            wallets: HashMap::new(),
        };
        wallets.load_from_file();
        wallets
    }

    pub fn create_wallet(&mut self) -> Result<Address> {
        let keys = WalletKeys::new()?;
        let address = keys.address();
        self.wallets.insert(address, keys);
        self.save_to_file()?;
        Ok(address)
    }

    pub fn get_addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.wallets.keys().copied().collect();
        addresses.sort();
        addresses
    }

    pub fn get_wallet(&self, address: &Address) -> Option<&WalletKeys> {
        self.wallets.get(address)
    }

    pub fn load_from_file(&mut self) {
        // Start with an empty set if the file is missing or unreadable
        if let Err(e) = self.load_from_file_safe() {
            log::warn!("Could not load wallets from {}: {e}", self.path.display());
        }
    }

    fn load_from_file_safe(&mut self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let bytes = fs::read(&self.path)?;
        let stored: Vec<WalletKeys> = deserialize(&bytes)?;
        self.wallets = stored.into_iter().map(|k| (k.address(), k)).collect();
        Ok(())
    }

    fn save_to_file(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        let stored: Vec<&WalletKeys> = self.wallets.values().collect();
        writer.write_all(serialize(&stored)?.as_slice())?;
        writer.flush()?;
        Ok(())
    }
}
