//! Flat-file persistence for user accounts.
//!
//! Accounts live in a single CSV-like text file, one per line:
//! `username,email,password_hash,balance`. Loading is forgiving (blank,
//! malformed or negative-balance lines are skipped) while saving always
//! rewrites the whole file.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

use crate::models::Account;

/// In-memory account list bound to its backing file.
pub struct AccountStore {
    path: PathBuf,
    accounts: Vec<Account>,
}

impl AccountStore {
    /// Load accounts from `path`. A missing file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let accounts = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            parse_accounts(&content)
        } else {
            Vec::new()
        };
        Ok(Self { path, accounts })
    }

    /// All loaded accounts in file order.
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// Number of accounts in the store.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether the store holds no accounts.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Account at `index`, if present.
    pub fn get(&self, index: usize) -> Option<&Account> {
        self.accounts.get(index)
    }

    /// Mutable account at `index`, if present.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Account> {
        self.accounts.get_mut(index)
    }

    /// Append a new account. Callers check uniqueness first.
    pub fn push(&mut self, account: Account) -> usize {
        self.accounts.push(account);
        self.accounts.len() - 1
    }

    /// Remove and return the account at `index`.
    pub fn remove(&mut self, index: usize) -> Account {
        self.accounts.remove(index)
    }

    /// Index of the account whose username matches exactly, or whose email
    /// matches ignoring case.
    pub fn find_by_identity(&self, identity: &str) -> Option<usize> {
        self.accounts.iter().position(|account| {
            account.username == identity || account.email.eq_ignore_ascii_case(identity)
        })
    }

    /// Whether a username is already in use.
    pub fn username_taken(&self, username: &str) -> bool {
        self.accounts
            .iter()
            .any(|account| account.username == username)
    }

    /// Whether an email is already registered, ignoring case.
    pub fn email_taken(&self, email: &str) -> bool {
        self.accounts
            .iter()
            .any(|account| account.email.eq_ignore_ascii_case(email))
    }

    /// Rewrite the whole accounts file, creating the data directory on demand.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut out = String::new();
        for account in &self.accounts {
            out.push_str(&format!(
                "{},{},{},{}\n",
                account.username, account.email, account.password_hash, account.balance
            ));
        }
        fs::write(&self.path, out).with_context(|| format!("failed to write {}", self.path.display()))
    }
}

fn parse_accounts(content: &str) -> Vec<Account> {
    let mut accounts = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(account) => accounts.push(account),
            None => warn!("skipping malformed account line"),
        }
    }
    accounts
}

fn parse_line(line: &str) -> Option<Account> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [username, email, password_hash, balance] = fields.as_slice() else {
        return None;
    };
    if username.is_empty() || email.is_empty() || password_hash.is_empty() {
        return None;
    }
    let balance: f64 = balance.parse().ok()?;
    if balance < 0.0 {
        return None;
    }
    Some(Account {
        username: (*username).to_string(),
        email: (*email).to_string(),
        password_hash: (*password_hash).to_string(),
        balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(username: &str, email: &str, balance: f64) -> Account {
        Account {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "ab".repeat(32),
            balance,
        }
    }

    #[test]
    fn missing_file_yields_empty_store() -> Result<()> {
        let dir = tempdir()?;
        let store = AccountStore::open(dir.path().join("accounts.txt"))?;
        assert!(store.is_empty());
        Ok(())
    }

    #[test]
    fn save_and_reload_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("data").join("accounts.txt");

        let mut store = AccountStore::open(&path)?;
        store.push(sample("ada", "ada@example.com", 1500.0));
        store.push(sample("bob", "bob@example.com", 0.0));
        store.save()?;

        let reloaded = AccountStore::open(&path)?;
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get(0).unwrap().username, "ada");
        assert_eq!(reloaded.get(0).unwrap().balance, 1500.0);
        assert_eq!(reloaded.get(1).unwrap().email, "bob@example.com");
        Ok(())
    }

    #[test]
    fn load_skips_bad_lines() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("accounts.txt");
        fs::write(
            &path,
            "\n\
             ada,ada@example.com,hash,100.5\n\
             not-enough-fields,oops\n\
             ,empty@user.com,hash,10\n\
             neg,neg@example.com,hash,-5\n\
             bad,bad@example.com,hash,abc\n\
             bob,bob@example.com,hash,0\n",
        )?;

        let store = AccountStore::open(&path)?;
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).unwrap().username, "ada");
        assert_eq!(store.get(1).unwrap().username, "bob");
        Ok(())
    }

    #[test]
    fn identity_lookup_matches_username_and_email() -> Result<()> {
        let dir = tempdir()?;
        let mut store = AccountStore::open(dir.path().join("accounts.txt"))?;
        store.push(sample("ada", "ada@example.com", 0.0));

        assert_eq!(store.find_by_identity("ada"), Some(0));
        assert_eq!(store.find_by_identity("ADA@Example.Com"), Some(0));
        assert_eq!(store.find_by_identity("ADA"), None);
        assert_eq!(store.find_by_identity("nobody"), None);

        assert!(store.username_taken("ada"));
        assert!(!store.username_taken("Ada"));
        assert!(store.email_taken("Ada@Example.com"));
        Ok(())
    }
}
