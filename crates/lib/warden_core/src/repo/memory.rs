//! In-process [`UserRepository`], used by tests and by the server when no
//! database is configured.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{CredentialUpdate, RepoError, UserRepository};
use crate::models::auth::{CredentialRecord, NewCredential};
use crate::uuid::uuidv7;

/// Records keyed by ID plus an email index.
///
/// `update_fields` holds the record's shard lock across the precondition
/// check and the write, which gives the same atomicity as a conditional
/// `UPDATE`.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    records: DashMap<String, CredentialRecord>,
    by_email: DashMap<String, String>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<CredentialRecord>, RepoError> {
        let Some(id) = self.by_email.get(email).map(|id| id.value().clone()) else {
            return Ok(None);
        };
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<CredentialRecord>, RepoError> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn insert(&self, credential: NewCredential) -> Result<String, RepoError> {
        match self.by_email.entry(credential.email.clone()) {
            Entry::Occupied(_) => Err(RepoError::DuplicateEmail),
            Entry::Vacant(slot) => {
                let id = uuidv7().to_string();
                self.records.insert(
                    id.clone(),
                    CredentialRecord {
                        id: id.clone(),
                        email: credential.email,
                        profile_name: credential.profile_name,
                        password_hash: credential.password_hash,
                        is_active: true,
                        failed_attempts: 0,
                        last_failed_at: None,
                        last_login: None,
                        current_refresh_token: None,
                        created_at: Utc::now(),
                    },
                );
                slot.insert(id.clone());
                Ok(id)
            }
        }
    }

    async fn update_fields(
        &self,
        id: &str,
        update: CredentialUpdate,
    ) -> Result<Option<CredentialRecord>, RepoError> {
        let Some(mut record) = self.records.get_mut(id) else {
            return Ok(None);
        };
        if !update.preconditions_hold(&record) {
            return Ok(None);
        }
        update.apply(&mut record);
        Ok(Some(record.clone()))
    }
}
