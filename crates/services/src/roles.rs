//! # Role Catalog
//!
//! The role table is seeded once and never changes at runtime, so lookups
//! are cached for the life of the process.

use std::sync::Arc;

use dashmap::DashMap;
use domains::{DomainError, DomainResult, Role, RoleRepository};

pub struct RoleCatalog {
    repo: Arc<dyn RoleRepository>,
    cache: DashMap<String, Role>,
}

impl RoleCatalog {
    pub fn new(repo: Arc<dyn RoleRepository>) -> Self {
        Self {
            repo,
            cache: DashMap::new(),
        }
    }

    /// Resolves a role by name. A name missing from the table is a
    /// deployment defect and surfaces as `UnknownRole`.
    pub async fn get(&self, name: &str) -> DomainResult<Role> {
        if let Some(role) = self.cache.get(name) {
            return Ok(role.clone());
        }

        let role = self
            .repo
            .find_by_name(name)
            .await?
            .ok_or_else(|| DomainError::UnknownRole(name.to_string()))?;

        self.cache.insert(name.to_string(), role.clone());
        Ok(role)
    }
}
