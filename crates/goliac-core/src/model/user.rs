//! User entities.
//!
//! Users are classified by their location on disk: `users/org` (managed),
//! `users/protected` (managed, never deleted by sync) and `users/external`
//! (outside collaborators). Names are unique across all three buckets.

use serde::{Deserialize, Serialize};

/// The `spec` payload of a `kind: User` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserSpec {
    /// The GitHub login of this user.
    #[serde(default, rename = "githubID")]
    pub github_id: String,
}

/// A declared user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// The declared name (file basename stem).
    pub name: String,
    /// The GitHub login.
    pub github_id: String,
}

impl User {
    /// Builds a user from its envelope name and spec.
    pub fn new(name: impl Into<String>, spec: UserSpec) -> Self {
        Self {
            name: name.into(),
            github_id: spec.github_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Document;

    #[test]
    fn user_document_decodes() {
        let doc: Document<UserSpec> = Document::from_yaml(
            "apiVersion: v1\nkind: User\nname: alice\nspec:\n  githubID: alice-gh\n",
        )
        .unwrap();
        doc.validate_envelope("User", "alice").unwrap();
        assert_eq!(doc.spec.github_id, "alice-gh");
    }

    #[test]
    fn missing_github_id_defaults_empty() {
        let doc: Document<UserSpec> =
            Document::from_yaml("apiVersion: v1\nkind: User\nname: alice\n").unwrap();
        assert!(doc.spec.github_id.is_empty());
    }
}
