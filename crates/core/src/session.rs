//! Signed-in user state and the operations hanging off it.
//!
//! A session owns the account store, the cart and a handle to the catalog.
//! At most one user is signed in at a time; operations that need an account
//! fail with [`SessionError::NotSignedIn`] otherwise.

use thiserror::Error;
use tracing::info;

use crate::{
    accounts::AccountStore,
    auth,
    cart::{Cart, CartError},
    catalog::CatalogLoader,
    models::{Account, CartItem, Receipt},
    receipts::ReceiptStore,
    validators,
};

/// Wallet top-ups offered as one-key presets.
pub const FUND_PRESETS: [f64; 4] = [10_000.0, 20_000.0, 50_000.0, 100_000.0];

/// Upper bound for a single wallet top-up.
pub const MAX_SINGLE_TOPUP: f64 = 100_000_000.0;

/// Balance above which resetting to zero needs a typed confirmation.
pub const LARGE_BALANCE_THRESHOLD: f64 = 50_000.0;

/// Failures of session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Username failed validation.
    #[error("username must be at least 2 characters, letters and digits only")]
    InvalidUsername,
    /// Email failed validation.
    #[error("email address is not valid")]
    InvalidEmail,
    /// Password failed validation.
    #[error("password does not meet the requirements")]
    WeakPassword,
    /// Username is already registered.
    #[error("username is already taken")]
    UsernameTaken,
    /// Email is already registered.
    #[error("email is already registered")]
    EmailTaken,
    /// Unknown identity or wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// The operation needs a signed-in user.
    #[error("no user is signed in")]
    NotSignedIn,
    /// Top-up amounts must be positive.
    #[error("amount must be positive")]
    AmountNotPositive,
    /// Top-up amount exceeded the per-transaction cap.
    #[error("top-ups are capped at {MAX_SINGLE_TOPUP} per transaction")]
    AmountTooLarge,
    /// Checkout attempted with nothing in the cart.
    #[error("cart is empty")]
    EmptyCart,
    /// The cart total exceeds the wallet balance.
    #[error("insufficient funds: total {total:.2} exceeds balance {balance:.2}")]
    InsufficientFunds {
        /// Cart total at checkout time.
        total: f64,
        /// Wallet balance at checkout time.
        balance: f64,
    },
    /// New password matches the current one.
    #[error("new password must differ from the current one")]
    PasswordUnchanged,
    /// A cart operation failed.
    #[error(transparent)]
    Cart(#[from] CartError),
    /// Persistence failed.
    #[error(transparent)]
    Persist(#[from] anyhow::Error),
}

/// Single-user session over the flat-file stores.
pub struct Session {
    accounts: AccountStore,
    catalog: CatalogLoader,
    receipts: ReceiptStore,
    cart: Cart,
    current: Option<usize>,
}

impl Session {
    /// Build a session over already-opened stores.
    pub fn new(accounts: AccountStore, catalog: CatalogLoader, receipts: ReceiptStore) -> Self {
        Self {
            accounts,
            catalog,
            receipts,
            cart: Cart::new(),
            current: None,
        }
    }

    /// The signed-in account, if any.
    pub fn current(&self) -> Option<&Account> {
        self.current.and_then(|index| self.accounts.get(index))
    }

    /// Whether somebody is signed in.
    pub fn is_signed_in(&self) -> bool {
        self.current().is_some()
    }

    /// Catalog handle shared with the UI.
    pub fn catalog(&self) -> &CatalogLoader {
        &self.catalog
    }

    /// Cart lines for display.
    pub fn cart_items(&self) -> &[CartItem] {
        self.cart.items()
    }

    /// Running cart total.
    pub fn cart_total(&self) -> f64 {
        self.cart.total()
    }

    /// Register a new account and sign it in. The wallet starts empty.
    pub fn sign_up(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(), SessionError> {
        let username = username.trim();
        let email = email.trim().to_lowercase();

        if !validators::validate_username(username) {
            return Err(SessionError::InvalidUsername);
        }
        if !validators::validate_email(&email) {
            return Err(SessionError::InvalidEmail);
        }
        if !validators::validate_password(password) {
            return Err(SessionError::WeakPassword);
        }
        if self.accounts.username_taken(username) {
            return Err(SessionError::UsernameTaken);
        }
        if self.accounts.email_taken(&email) {
            return Err(SessionError::EmailTaken);
        }

        let index = self.accounts.push(Account {
            username: username.to_string(),
            email,
            password_hash: auth::hash_password(password),
            balance: 0.0,
        });
        self.accounts.save()?;
        self.current = Some(index);
        info!(username, "account created");
        Ok(())
    }

    /// Sign in with a username or email plus password.
    pub fn sign_in(&mut self, identity: &str, password: &str) -> Result<(), SessionError> {
        let identity = identity.trim();
        let index = self
            .accounts
            .find_by_identity(identity)
            .ok_or(SessionError::InvalidCredentials)?;
        let account = self
            .accounts
            .get(index)
            .ok_or(SessionError::InvalidCredentials)?;
        if !auth::verify_password(password, &account.password_hash) {
            return Err(SessionError::InvalidCredentials);
        }
        self.current = Some(index);
        info!(username = %account.username, "signed in");
        Ok(())
    }

    /// Sign out, releasing every cart reservation back to stock.
    pub fn sign_out(&mut self) {
        let released = self.cart.clear(&self.catalog);
        if released > 0 {
            info!(released, "cart reservations released on sign-out");
        }
        self.current = None;
    }

    /// Check a candidate password against the signed-in account.
    pub fn verify_password(&self, candidate: &str) -> Result<bool, SessionError> {
        let account = self.current().ok_or(SessionError::NotSignedIn)?;
        Ok(auth::verify_password(candidate, &account.password_hash))
    }

    /// Add funds to the wallet and persist. Returns the new balance.
    pub fn fund_wallet(&mut self, amount: f64) -> Result<f64, SessionError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(SessionError::AmountNotPositive);
        }
        if amount > MAX_SINGLE_TOPUP {
            return Err(SessionError::AmountTooLarge);
        }
        let index = self.current.ok_or(SessionError::NotSignedIn)?;
        let account = self.accounts.get_mut(index).ok_or(SessionError::NotSignedIn)?;
        account.balance += amount;
        let balance = account.balance;
        self.accounts.save()?;
        info!(amount, balance, "wallet funded");
        Ok(balance)
    }

    /// Charge the cart total to the wallet, persist the new balance and
    /// write a receipt. Cart lines are dropped without releasing stock.
    pub fn checkout(&mut self) -> Result<Receipt, SessionError> {
        let index = self.current.ok_or(SessionError::NotSignedIn)?;
        if self.cart.is_empty() {
            return Err(SessionError::EmptyCart);
        }
        let total = self.cart.total();
        let account = self.accounts.get_mut(index).ok_or(SessionError::NotSignedIn)?;
        if total > account.balance {
            return Err(SessionError::InsufficientFunds {
                total,
                balance: account.balance,
            });
        }

        account.balance -= total;
        let balance_after = account.balance;
        let username = account.username.clone();
        self.accounts.save()?;

        let items = self.cart.drain_checked_out();
        let receipt = self
            .receipts
            .record(&username, items, total, balance_after)?;
        info!(id = %receipt.id, total, balance_after, "checkout complete");
        Ok(receipt)
    }

    /// Receipts of the signed-in account, most recent first.
    pub fn order_history(&self) -> Result<Vec<Receipt>, SessionError> {
        let account = self.current().ok_or(SessionError::NotSignedIn)?;
        Ok(self.receipts.entries_for(&account.username)?)
    }

    /// Reserve one unit of a product into the cart.
    pub fn cart_add(&mut self, product_id: u32) -> Result<CartItem, SessionError> {
        Ok(self.cart.add(&self.catalog, product_id)?)
    }

    /// Change the quantity of a cart line.
    pub fn cart_update_quantity(
        &mut self,
        index: usize,
        quantity: u32,
    ) -> Result<CartItem, SessionError> {
        Ok(self.cart.update_quantity(&self.catalog, index, quantity)?)
    }

    /// Remove a cart line, releasing its reservation.
    pub fn cart_remove(&mut self, index: usize) -> Result<CartItem, SessionError> {
        Ok(self.cart.remove(&self.catalog, index)?)
    }

    /// Empty the cart, releasing every reservation.
    pub fn cart_clear(&mut self) -> usize {
        self.cart.clear(&self.catalog)
    }

    /// Re-attach the cart after a catalog reload. Returns dropped lines.
    pub fn reattach_cart(&mut self) -> usize {
        self.cart.reattach(&self.catalog)
    }

    /// Rename the signed-in account. Callers verify the password first.
    pub fn change_username(&mut self, new_username: &str) -> Result<(), SessionError> {
        let new_username = new_username.trim();
        if !validators::validate_username(new_username) {
            return Err(SessionError::InvalidUsername);
        }
        let index = self.current.ok_or(SessionError::NotSignedIn)?;
        let unchanged = self
            .accounts
            .get(index)
            .is_some_and(|account| account.username == new_username);
        if !unchanged && self.accounts.username_taken(new_username) {
            return Err(SessionError::UsernameTaken);
        }
        if let Some(account) = self.accounts.get_mut(index) {
            account.username = new_username.to_string();
        }
        self.accounts.save()?;
        Ok(())
    }

    /// Change the signed-in account's email address.
    pub fn change_email(&mut self, new_email: &str) -> Result<(), SessionError> {
        let new_email = new_email.trim().to_lowercase();
        if !validators::validate_email(&new_email) {
            return Err(SessionError::InvalidEmail);
        }
        let index = self.current.ok_or(SessionError::NotSignedIn)?;
        let unchanged = self
            .accounts
            .get(index)
            .is_some_and(|account| account.email.eq_ignore_ascii_case(&new_email));
        if !unchanged && self.accounts.email_taken(&new_email) {
            return Err(SessionError::EmailTaken);
        }
        if let Some(account) = self.accounts.get_mut(index) {
            account.email = new_email;
        }
        self.accounts.save()?;
        Ok(())
    }

    /// Change the signed-in account's password.
    pub fn change_password(&mut self, new_password: &str) -> Result<(), SessionError> {
        if !validators::validate_password(new_password) {
            return Err(SessionError::WeakPassword);
        }
        let index = self.current.ok_or(SessionError::NotSignedIn)?;
        let new_hash = auth::hash_password(new_password);
        let account = self.accounts.get_mut(index).ok_or(SessionError::NotSignedIn)?;
        if account.password_hash == new_hash {
            return Err(SessionError::PasswordUnchanged);
        }
        account.password_hash = new_hash;
        self.accounts.save()?;
        Ok(())
    }

    /// Zero the signed-in account's wallet.
    pub fn reset_balance(&mut self) -> Result<(), SessionError> {
        let index = self.current.ok_or(SessionError::NotSignedIn)?;
        if let Some(account) = self.accounts.get_mut(index) {
            account.balance = 0.0;
        }
        self.accounts.save()?;
        Ok(())
    }

    /// Delete the signed-in account: release cart reservations, remove the
    /// account, persist and sign out.
    pub fn delete_account(&mut self) -> Result<(), SessionError> {
        let index = self.current.ok_or(SessionError::NotSignedIn)?;
        self.cart.clear(&self.catalog);
        let removed = self.accounts.remove(index);
        self.accounts.save()?;
        self.current = None;
        info!(username = %removed.username, "account deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    const PASSWORD: &str = "Correct#Horse9Battery";

    fn fixture(warehouse: &str) -> Result<(TempDir, Session)> {
        let dir = tempdir()?;
        fs::write(dir.path().join("warehouse.txt"), warehouse)?;
        let accounts = AccountStore::open(dir.path().join("accounts.txt"))?;
        let catalog = CatalogLoader::new(dir.path(), 10);
        catalog.reload()?;
        let receipts = ReceiptStore::new(dir.path().join("receipts"));
        Ok((dir, Session::new(accounts, catalog, receipts)))
    }

    fn signed_up(warehouse: &str) -> Result<(TempDir, Session)> {
        let (dir, mut session) = fixture(warehouse)?;
        session.sign_up("ada", "ada@example.com", PASSWORD)?;
        Ok((dir, session))
    }

    #[test]
    fn sign_up_validates_and_signs_in() -> Result<()> {
        let (_dir, mut session) = fixture("Mouse:4500")?;

        assert!(matches!(
            session.sign_up("a", "ada@example.com", PASSWORD),
            Err(SessionError::InvalidUsername)
        ));
        assert!(matches!(
            session.sign_up("ada", "not-an-email", PASSWORD),
            Err(SessionError::InvalidEmail)
        ));
        assert!(matches!(
            session.sign_up("ada", "ada@example.com", "weak"),
            Err(SessionError::WeakPassword)
        ));

        session.sign_up("ada", "Ada@Example.COM", PASSWORD)?;
        let account = session.current().unwrap();
        assert_eq!(account.username, "ada");
        assert_eq!(account.email, "ada@example.com");
        assert_eq!(account.balance, 0.0);

        assert!(matches!(
            session.sign_up("ada", "other@example.com", PASSWORD),
            Err(SessionError::UsernameTaken)
        ));
        assert!(matches!(
            session.sign_up("bob", "ADA@example.com", PASSWORD),
            Err(SessionError::EmailTaken)
        ));
        Ok(())
    }

    #[test]
    fn sign_in_accepts_username_or_email() -> Result<()> {
        let (_dir, mut session) = signed_up("Mouse:4500")?;
        session.sign_out();
        assert!(!session.is_signed_in());

        session.sign_in("ada", PASSWORD)?;
        session.sign_out();
        session.sign_in("ADA@example.com", PASSWORD)?;
        assert!(session.is_signed_in());

        session.sign_out();
        assert!(matches!(
            session.sign_in("ada", "WrongPassword#111x"),
            Err(SessionError::InvalidCredentials)
        ));
        assert!(matches!(
            session.sign_in("nobody", PASSWORD),
            Err(SessionError::InvalidCredentials)
        ));
        Ok(())
    }

    #[test]
    fn sign_out_releases_reservations() -> Result<()> {
        let (_dir, mut session) = signed_up("Mouse:4500")?;
        session.cart_add(1)?;
        session.cart_add(1)?;
        assert_eq!(session.catalog().product(1).unwrap().stock, 8);

        session.sign_out();
        assert!(session.cart_items().is_empty());
        assert_eq!(session.catalog().product(1).unwrap().stock, 10);
        Ok(())
    }

    #[test]
    fn fund_wallet_validates_amounts() -> Result<()> {
        let (_dir, mut session) = signed_up("Mouse:4500")?;

        assert!(matches!(
            session.fund_wallet(0.0),
            Err(SessionError::AmountNotPositive)
        ));
        assert!(matches!(
            session.fund_wallet(-50.0),
            Err(SessionError::AmountNotPositive)
        ));
        assert!(matches!(
            session.fund_wallet(MAX_SINGLE_TOPUP + 1.0),
            Err(SessionError::AmountTooLarge)
        ));

        let balance = session.fund_wallet(20_000.0)?;
        assert_eq!(balance, 20_000.0);
        let balance = session.fund_wallet(MAX_SINGLE_TOPUP)?;
        assert_eq!(balance, 20_000.0 + MAX_SINGLE_TOPUP);
        Ok(())
    }

    #[test]
    fn checkout_deducts_and_writes_receipt() -> Result<()> {
        let (_dir, mut session) = signed_up("Mouse:4500;Keyboard:12000")?;
        session.fund_wallet(50_000.0)?;
        session.cart_add(1)?;
        session.cart_update_quantity(0, 2)?;
        session.cart_add(2)?;

        let receipt = session.checkout()?;
        assert_eq!(receipt.total, 21_000.0);
        assert_eq!(receipt.balance_after, 29_000.0);
        assert_eq!(receipt.items.len(), 2);
        assert_eq!(session.current().unwrap().balance, 29_000.0);
        assert!(session.cart_items().is_empty());
        // sold units stay out of stock
        assert_eq!(session.catalog().product(1).unwrap().stock, 8);

        let history = session.order_history()?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, receipt.id);
        Ok(())
    }

    #[test]
    fn checkout_rejects_empty_cart_and_short_balance() -> Result<()> {
        let (_dir, mut session) = signed_up("Mouse:4500")?;
        assert!(matches!(session.checkout(), Err(SessionError::EmptyCart)));

        session.cart_add(1)?;
        let err = session.checkout().unwrap_err();
        match err {
            SessionError::InsufficientFunds { total, balance } => {
                assert_eq!(total, 4500.0);
                assert_eq!(balance, 0.0);
            }
            other => panic!("unexpected error: {other}"),
        }
        // nothing was deducted or drained
        assert_eq!(session.cart_items().len(), 1);
        assert_eq!(session.current().unwrap().balance, 0.0);
        Ok(())
    }

    #[test]
    fn account_changes_are_validated_and_persisted() -> Result<()> {
        let (dir, mut session) = signed_up("Mouse:4500")?;

        assert!(session.verify_password(PASSWORD)?);
        assert!(!session.verify_password("nope")?);

        session.change_username("lovelace")?;
        assert!(matches!(
            session.change_username("!"),
            Err(SessionError::InvalidUsername)
        ));
        session.change_email("ada@newhost.org")?;
        assert!(matches!(
            session.change_password(PASSWORD),
            Err(SessionError::PasswordUnchanged)
        ));
        session.change_password("Different#Horse9Batt")?;

        // the file reflects every change
        let reloaded = AccountStore::open(dir.path().join("accounts.txt"))?;
        let account = reloaded.get(0).unwrap();
        assert_eq!(account.username, "lovelace");
        assert_eq!(account.email, "ada@newhost.org");
        assert_eq!(account.password_hash, auth::hash_password("Different#Horse9Batt"));
        Ok(())
    }

    #[test]
    fn duplicate_checks_ignore_the_account_itself() -> Result<()> {
        let (_dir, mut session) = signed_up("Mouse:4500")?;
        session.sign_up("bob", "bob@example.com", PASSWORD)?;

        // bob renaming to his own name is fine, to ada's is not
        session.change_username("bob")?;
        assert!(matches!(
            session.change_username("ada"),
            Err(SessionError::UsernameTaken)
        ));
        session.change_email("BOB@example.com")?;
        assert!(matches!(
            session.change_email("ada@example.com"),
            Err(SessionError::EmailTaken)
        ));
        Ok(())
    }

    #[test]
    fn reset_balance_zeroes_the_wallet() -> Result<()> {
        let (_dir, mut session) = signed_up("Mouse:4500")?;
        session.fund_wallet(75_000.0)?;
        session.reset_balance()?;
        assert_eq!(session.current().unwrap().balance, 0.0);
        Ok(())
    }

    #[test]
    fn delete_account_releases_stock_and_signs_out() -> Result<()> {
        let (dir, mut session) = signed_up("Mouse:4500")?;
        session.cart_add(1)?;
        assert_eq!(session.catalog().product(1).unwrap().stock, 9);

        session.delete_account()?;
        assert!(!session.is_signed_in());
        assert_eq!(session.catalog().product(1).unwrap().stock, 10);

        let reloaded = AccountStore::open(dir.path().join("accounts.txt"))?;
        assert!(reloaded.is_empty());
        assert!(matches!(
            session.delete_account(),
            Err(SessionError::NotSignedIn)
        ));
        Ok(())
    }

    #[test]
    fn reattach_after_reload_keeps_the_invariant() -> Result<()> {
        let (dir, mut session) = signed_up("Mouse:4500;Desk:30000")?;
        session.cart_add(1)?;
        session.cart_add(2)?;

        fs::write(dir.path().join("warehouse.txt"), "Desk:30000")?;
        session.catalog().reload()?;
        let dropped = session.reattach_cart();
        assert_eq!(dropped, 1);
        assert_eq!(session.cart_items().len(), 1);
        assert_eq!(session.cart_items()[0].name, "Desk");
        assert_eq!(session.catalog().product(1).unwrap().stock, 9);
        Ok(())
    }
}
