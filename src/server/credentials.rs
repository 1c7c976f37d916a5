use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::{Result, ShareError},
    protocol::Password,
};

/// Salted digest of a password. Records are immutable once created.
#[derive(Debug, Clone)]
struct CredentialRecord {
    salt: String,
    password_hash: String,
}

impl CredentialRecord {
    fn new(password: &Password) -> Self {
        let salt = Uuid::new_v4().simple().to_string();
        let password_hash = digest(&salt, password);
        Self {
            salt,
            password_hash,
        }
    }

    fn verify(&self, password: &Password) -> bool {
        digest(&self.salt, password) == self.password_hash
    }
}

fn digest(salt: &str, password: &Password) -> String {
    sha256::digest(format!("{salt}:{}", password.expose()))
}

#[derive(Default)]
pub struct CredentialStore {
    records: RwLock<HashMap<String, CredentialRecord>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, username: &str, password: &Password) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(username) {
            return Err(ShareError::UserExists);
        }
        records.insert(username.to_string(), CredentialRecord::new(password));
        Ok(())
    }

    pub async fn verify(&self, username: &str, password: &Password) -> Result<()> {
        let records = self.records.read().await;
        let record = records.get(username).ok_or(ShareError::UserNotFound)?;
        if record.verify(password) {
            Ok(())
        } else {
            Err(ShareError::WrongPassword)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn username_registers_once() {
        let store = CredentialStore::new();
        store.register("alice", &"pw1".into()).await.unwrap();
        for _ in 0..3 {
            assert!(matches!(
                store.register("alice", &"other".into()).await,
                Err(ShareError::UserExists)
            ));
        }
        // first password still stands
        store.verify("alice", &"pw1".into()).await.unwrap();
    }

    #[tokio::test]
    async fn verify_outcomes() {
        let store = CredentialStore::new();
        store.register("bob", &"pw2".into()).await.unwrap();

        assert!(store.verify("bob", &"pw2".into()).await.is_ok());
        assert!(matches!(
            store.verify("bob", &"pw1".into()).await,
            Err(ShareError::WrongPassword)
        ));
        assert!(matches!(
            store.verify("carol", &"pw2".into()).await,
            Err(ShareError::UserNotFound)
        ));
    }

    #[test]
    fn plain_password_is_not_stored() {
        let record = CredentialRecord::new(&"secret".into());
        assert_ne!(record.password_hash, "secret");
        assert!(!record.password_hash.contains("secret"));

        // same password, different salt, different digest
        let other = CredentialRecord::new(&"secret".into());
        assert_ne!(record.password_hash, other.password_hash);
        assert!(other.verify(&"secret".into()));
    }
}
