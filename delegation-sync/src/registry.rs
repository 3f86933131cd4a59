//! Account registry interface
//!
//! The registry is the source of truth for which accounts are tracked. The
//! in-memory implementation backs the service binary and tests.

use crate::error::{Error, Result};
use crate::types::{Account, AccountId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::info;

/// Account registry trait
#[async_trait]
pub trait AccountRegistry: Send + Sync {
    /// Identifiers of accounts with tracking enabled
    async fn list_enabled(&self) -> Result<Vec<AccountId>>;

    /// Every known account, enabled or not
    async fn list_all(&self) -> Result<Vec<Account>>;

    /// Look up one account; `Error::NotFound` when absent
    async fn get_by_id(&self, id: &AccountId) -> Result<Account>;

    /// Turn tracking on for an account
    async fn enable_tracking(&self, id: &AccountId) -> Result<()>;

    /// Turn tracking off for an account
    async fn disable_tracking(&self, id: &AccountId) -> Result<()>;
}

/// Registry held in process memory
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    accounts: RwLock<BTreeMap<AccountId, Account>>,
}

impl InMemoryRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with `accounts`
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let registry = Self::new();
        for account in accounts {
            registry.upsert(account);
        }
        registry
    }

    /// Add an account; fails if the identifier is blank or already registered
    pub fn add(&self, account: Account) -> Result<()> {
        if account.id.is_blank() {
            return Err(Error::InvalidInput("account id must not be empty".to_string()));
        }

        let mut accounts = self.accounts.write();
        if accounts.contains_key(&account.id) {
            return Err(Error::InvalidInput(format!(
                "account {} already exists",
                account.id
            )));
        }

        info!(account = %account.id, enabled = account.enabled, "Registered account");
        accounts.insert(account.id.clone(), account);
        Ok(())
    }

    /// Insert or replace an account
    pub fn upsert(&self, account: Account) {
        self.accounts.write().insert(account.id.clone(), account);
    }

    /// Remove an account
    pub fn remove(&self, id: &AccountId) -> Result<Account> {
        self.accounts
            .write()
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("account {}", id)))
    }

    /// Number of registered accounts
    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    /// True when no account is registered
    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }

    fn set_tracking(&self, id: &AccountId, enabled: bool) -> Result<()> {
        let mut accounts = self.accounts.write();
        let account = accounts
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("account {}", id)))?;
        account.enabled = enabled;
        Ok(())
    }
}

#[async_trait]
impl AccountRegistry for InMemoryRegistry {
    async fn list_enabled(&self) -> Result<Vec<AccountId>> {
        Ok(self
            .accounts
            .read()
            .values()
            .filter(|account| account.enabled)
            .map(|account| account.id.clone())
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Account>> {
        Ok(self.accounts.read().values().cloned().collect())
    }

    async fn get_by_id(&self, id: &AccountId) -> Result<Account> {
        self.accounts
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("account {}", id)))
    }

    async fn enable_tracking(&self, id: &AccountId) -> Result<()> {
        self.set_tracking(id, true)
    }

    async fn disable_tracking(&self, id: &AccountId) -> Result<()> {
        self.set_tracking(id, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_enabled_filters_disabled() {
        let registry = InMemoryRegistry::with_accounts(vec![
            Account::enabled("val-a", "Alpha"),
            Account::disabled("val-b", "Beta"),
            Account::enabled("val-c", "Gamma"),
        ]);

        let enabled = registry.list_enabled().await.unwrap();
        assert_eq!(enabled, vec![AccountId::new("val-a"), AccountId::new("val-c")]);
        assert_eq!(registry.list_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let registry = InMemoryRegistry::new();
        let result = registry.get_by_id(&AccountId::new("missing")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_enable_and_disable_tracking() {
        let registry = InMemoryRegistry::with_accounts(vec![Account::disabled("val-a", "Alpha")]);
        let id = AccountId::new("val-a");

        registry.enable_tracking(&id).await.unwrap();
        assert_eq!(registry.list_enabled().await.unwrap(), vec![id.clone()]);

        registry.disable_tracking(&id).await.unwrap();
        assert!(registry.list_enabled().await.unwrap().is_empty());

        let missing = registry.enable_tracking(&AccountId::new("nope")).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_add_rejects_duplicates_and_blank_ids() {
        let registry = InMemoryRegistry::new();
        registry.add(Account::enabled("val-a", "Alpha")).unwrap();

        assert!(matches!(
            registry.add(Account::enabled("val-a", "Again")),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            registry.add(Account::enabled("", "Blank")),
            Err(Error::InvalidInput(_))
        ));

        registry.remove(&AccountId::new("val-a")).unwrap();
        assert!(registry.is_empty());
    }
}
