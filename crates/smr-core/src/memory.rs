//! In-memory credential store
//!
//! Used for local development and the API test suite. Data does not survive
//! a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{CredentialStore, NewPrincipal, Principal, Result, SmrError};

/// Credential store backed by a `HashMap` keyed by principal id
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<Uuid, Principal>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored principals
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool> {
        let users = self.users.read().await;
        Ok(users.values().any(|u| u.email == email))
    }

    async fn exists_by_accountname(&self, accountname: &str) -> Result<bool> {
        let users = self.users.read().await;
        Ok(users.values().any(|u| u.accountname == accountname))
    }

    async fn create(&self, principal: NewPrincipal) -> Result<Principal> {
        // Check and insert under one write lock so concurrent sign-ups cannot
        // both claim the same identifier.
        let mut users = self.users.write().await;

        if users.values().any(|u| u.email == principal.email) {
            return Err(SmrError::Conflict(format!(
                "email already registered: {}",
                principal.email
            )));
        }
        if users.values().any(|u| u.accountname == principal.accountname) {
            return Err(SmrError::Conflict(format!(
                "account name already registered: {}",
                principal.accountname
            )));
        }

        let principal = principal.into_principal();
        users.insert(principal.id, principal.clone());
        Ok(principal)
    }

    async fn set_refresh_token(&self, email: &str, token: Option<&str>) -> Result<bool> {
        let mut users = self.users.write().await;
        match users.values_mut().find(|u| u.email == email) {
            Some(user) => {
                user.refresh_token = token.map(str::to_string);
                user.updated_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_AVATAR;
    use std::sync::Arc;

    fn new_user(email: &str, accountname: &str) -> NewPrincipal {
        NewPrincipal {
            username: "tester".to_string(),
            email: email.to_string(),
            accountname: accountname.to_string(),
            intro: String::new(),
            image: DEFAULT_AVATAR.to_string(),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = InMemoryCredentialStore::new();
        let created = store.create(new_user("a@x.com", "alpha")).await.unwrap();

        let by_email = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);

        let by_id = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.accountname, "alpha");

        assert!(store.find_by_email("A@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicates_conflict() {
        let store = InMemoryCredentialStore::new();
        store.create(new_user("a@x.com", "alpha")).await.unwrap();

        let dup_email = store.create(new_user("a@x.com", "beta")).await;
        assert!(matches!(dup_email, Err(SmrError::Conflict(_))));

        let dup_account = store.create(new_user("b@x.com", "alpha")).await;
        assert!(matches!(dup_account, Err(SmrError::Conflict(_))));

        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_exists_checks() {
        let store = InMemoryCredentialStore::new();
        assert!(store.is_empty().await);
        store.create(new_user("a@x.com", "alpha")).await.unwrap();

        assert!(store.exists_by_email("a@x.com").await.unwrap());
        assert!(!store.exists_by_email("b@x.com").await.unwrap());
        assert!(store.exists_by_accountname("alpha").await.unwrap());
        assert!(!store.exists_by_accountname("beta").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_refresh_token() {
        let store = InMemoryCredentialStore::new();
        store.create(new_user("a@x.com", "alpha")).await.unwrap();

        assert!(store.set_refresh_token("a@x.com", Some("r1")).await.unwrap());
        let user = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert!(user.holds_refresh_token("r1"));
        assert!(user.updated_at.is_some());

        assert!(store.set_refresh_token("a@x.com", None).await.unwrap());
        let user = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert!(user.refresh_token.is_none());

        assert!(!store.set_refresh_token("nobody@x.com", Some("r")).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_signups_same_email() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .create(new_user("race@x.com", &format!("acct{i}")))
                    .await
                    .is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(store.len().await, 1);
    }
}
