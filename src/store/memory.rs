//! In-process credential store for local runs and tests.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{CredentialStore, Identity, InsertOutcome, ProfileUpdate, UpdateOutcome};

/// Identities keyed by username.
#[derive(Debug, Default)]
pub struct MemoryStore {
    identities: RwLock<HashMap<String, Identity>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.identities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.identities.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>> {
        Ok(self.identities.read().await.get(username).cloned())
    }

    async fn insert(&self, identity: Identity) -> Result<InsertOutcome> {
        let mut identities = self.identities.write().await;
        if identities.contains_key(&identity.username)
            || identities.values().any(|existing| existing.id == identity.id)
        {
            return Ok(InsertOutcome::Conflict);
        }
        debug!("stored identity {}", identity.id);
        identities.insert(identity.username.clone(), identity);
        Ok(InsertOutcome::Inserted)
    }

    async fn update_fields(&self, id: Uuid, fields: &ProfileUpdate) -> Result<UpdateOutcome> {
        let mut identities = self.identities.write().await;
        let Some(current) = identities
            .values()
            .find(|identity| identity.id == id)
            .map(|identity| identity.username.clone())
        else {
            return Ok(UpdateOutcome::NotFound);
        };

        if let Some(new_username) = &fields.username {
            if *new_username != current && identities.contains_key(new_username) {
                return Ok(UpdateOutcome::Conflict);
            }
        }

        let Some(mut identity) = identities.remove(&current) else {
            return Ok(UpdateOutcome::NotFound);
        };
        fields.apply(&mut identity);
        identities.insert(identity.username.clone(), identity);
        Ok(UpdateOutcome::Updated)
    }

    async fn delete_by_username(&self, username: &str) -> Result<u64> {
        Ok(u64::from(self.identities.write().await.remove(username).is_some()))
    }
}
