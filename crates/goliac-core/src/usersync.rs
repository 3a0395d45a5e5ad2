//! User-directory synchronization seam.
//!
//! An external plugin can rewrite the `users/org` bucket from a company
//! directory before a cycle runs. The core ships only the no-op
//! implementation; SAML/LDAP/script plugins live outside.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::RepositoryConfig;
use crate::errors::{ErrorCollection, SyncError};
use crate::loader::EntityLoader;
use crate::model::team::DEFAULT_OWNER_TEAM_SUFFIX;
use crate::model::user::User;

/// Rewrites the managed user set from an external directory.
#[async_trait]
pub trait UserSyncPlugin: Send + Sync {
    /// The plugin name referenced by `goliac.yaml` (`usersync.plugin`).
    fn name(&self) -> &'static str;

    /// Returns the desired `users/org` content, keyed by declared name.
    async fn update_users(
        &self,
        config: &RepositoryConfig,
        teams_root: &Path,
    ) -> Result<BTreeMap<String, User>, SyncError>;
}

/// Keeps the user directory exactly as committed.
pub struct NoopUserSync;

#[async_trait]
impl UserSyncPlugin for NoopUserSync {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn update_users(
        &self,
        config: &RepositoryConfig,
        teams_root: &Path,
    ) -> Result<BTreeMap<String, User>, SyncError> {
        let _ = config;
        let errors = ErrorCollection::new();
        let loader = EntityLoader::new(teams_root, DEFAULT_OWNER_TEAM_SUFFIX);
        let model = loader
            .load(&errors, true)
            .ok_or_else(|| SyncError::validation("users/org", "cannot load user directory"))?;
        Ok(model.users)
    }
}

/// Resolves a plugin by its configured name.
pub fn plugin_for(name: &str) -> Option<Arc<dyn UserSyncPlugin>> {
    match name {
        "noop" => Some(Arc::new(NoopUserSync)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn noop_returns_committed_users() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("goliac.yaml"), "admin_team: admins\n").unwrap();
        fs::create_dir_all(dir.path().join("users/org")).unwrap();
        fs::write(
            dir.path().join("users/org/alice.yaml"),
            "apiVersion: v1\nkind: User\nname: alice\nspec:\n  githubID: alice-gh\n",
        )
        .unwrap();

        let plugin = plugin_for("noop").unwrap();
        let users = plugin
            .update_users(&RepositoryConfig::default(), dir.path())
            .await
            .unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users["alice"].github_id, "alice-gh");
    }

    #[test]
    fn unknown_plugin_is_none() {
        assert!(plugin_for("ldap").is_none());
    }
}
