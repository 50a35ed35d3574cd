use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::claim::{Claim, Tags};

pub const DEFAULT_RETRIEVE_LIMIT: i64 = 5;

/// Append-only collection of claims. Insertion order is recency order.
#[derive(Debug)]
pub struct Vault {
    id: String,
    claims: RwLock<Vec<Claim>>,
}

impl Vault {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_claims(id, Vec::new())
    }

    pub fn with_claims(id: impl Into<String>, claims: Vec<Claim>) -> Self {
        Self {
            id: id.into(),
            claims: RwLock::new(claims),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn append(&self, claim: Claim) {
        let mut claims = write_or_recover(&self.claims);
        claims.push(claim);
        tracing::debug!(vault_id = %self.id, claims = claims.len(), "vault claim appended");
    }

    /// Returns the most recent `limit` claims matching `tag_query`, oldest first.
    ///
    /// A non-positive `limit` returns nothing.
    pub fn retrieve(&self, tag_query: &Tags, limit: i64) -> Vec<Claim> {
        if limit <= 0 {
            return Vec::new();
        }
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let claims = read_or_recover(&self.claims);
        let matches = claims
            .iter()
            .filter(|claim| claim.matches(tag_query))
            .collect::<Vec<_>>();
        let skip = matches.len().saturating_sub(limit);
        matches.into_iter().skip(skip).cloned().collect()
    }

    pub fn retrieve_default(&self, tag_query: &Tags) -> Vec<Claim> {
        self.retrieve(tag_query, DEFAULT_RETRIEVE_LIMIT)
    }

    pub fn len(&self) -> usize {
        read_or_recover(&self.claims).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Claim> {
        read_or_recover(&self.claims).clone()
    }
}

fn read_or_recover<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_or_recover<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
