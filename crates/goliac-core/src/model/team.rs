//! Team entities and GitHub team slugging.
//!
//! A team lives in `teams/<path-to-team>/team.yaml`; nested directories
//! encode the parent→child hierarchy. For each non-externally-managed team
//! a synthetic owner team (`<slug><owner-suffix>`) is maintained whose
//! members are the team's owners.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Default suffix of the synthetic owner teams.
pub const DEFAULT_OWNER_TEAM_SUFFIX: &str = "-goliac-owners";

/// Reserved team name for the all-organization team.
pub const EVERYONE_TEAM_NAME: &str = "everyone";

/// The `spec` payload of a `kind: Team` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TeamSpec {
    /// Declared names of the team owners.
    #[serde(default)]
    pub owners: Vec<String>,
    /// Declared names of the team members.
    #[serde(default)]
    pub members: Vec<String>,
    /// Membership is managed outside the teams repo (no owner team, no
    /// membership reconciliation).
    #[serde(default, rename = "externallyManaged")]
    pub externally_managed: bool,
}

/// A declared team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Team {
    /// The team name (enclosing directory name).
    pub name: String,
    /// Directory path relative to `teams/`, with `/` separators.
    pub path: String,
    /// Name of the parent team, when nested.
    pub parent_team: Option<String>,
    /// Declared owner names.
    pub owners: Vec<String>,
    /// Declared member names.
    pub members: Vec<String>,
    /// Membership is managed outside the teams repo.
    pub externally_managed: bool,
}

impl Team {
    /// The deterministic GitHub slug of this team's name.
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    /// The slug of this team's synthetic owner team.
    pub fn owner_team_slug(&self, suffix: &str) -> String {
        format!("{}{}", self.slug(), suffix)
    }
}

/// Computes the GitHub slug of a team name.
///
/// ASCII-folds (NFD, combining marks dropped), lowercases, and collapses
/// every run of non-alphanumeric characters into a single `-`. Leading and
/// trailing separators are trimmed. The result is stable: slugging a slug
/// is the identity.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_separator = false;
    for c in name.nfd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Document;

    #[test]
    fn slugify_spaces() {
        assert_eq!(slugify("exist ing"), "exist-ing");
        assert_eq!(slugify("My Team"), "my-team");
    }

    #[test]
    fn slugify_collapses_runs() {
        assert_eq!(slugify("a  -- b"), "a-b");
        assert_eq!(slugify("platform//core"), "platform-core");
    }

    #[test]
    fn slugify_trims_separators() {
        assert_eq!(slugify("  edge  "), "edge");
        assert_eq!(slugify("-lead-"), "lead");
    }

    #[test]
    fn slugify_ascii_folds_diacritics() {
        assert_eq!(slugify("équipe"), "equipe");
        assert_eq!(slugify("Søk"), "s-k");
    }

    #[test]
    fn slugify_is_stable() {
        for name in ["exist ing", "équipe", "a--b", "Platform Core"] {
            let once = slugify(name);
            assert_eq!(slugify(&once), once);
        }
    }

    #[test]
    fn owner_team_slug_appends_suffix() {
        let team = Team {
            name: "Net Ops".into(),
            path: "net-ops".into(),
            parent_team: None,
            owners: vec![],
            members: vec![],
            externally_managed: false,
        };
        assert_eq!(
            team.owner_team_slug(DEFAULT_OWNER_TEAM_SUFFIX),
            "net-ops-goliac-owners"
        );
    }

    #[test]
    fn team_document_decodes() {
        let doc: Document<TeamSpec> = Document::from_yaml(
            "apiVersion: v1\nkind: Team\nname: team\nspec:\n  owners:\n    - alice\n    - bob\n  members:\n    - carol\n",
        )
        .unwrap();
        assert_eq!(doc.spec.owners, vec!["alice", "bob"]);
        assert_eq!(doc.spec.members, vec!["carol"]);
        assert!(!doc.spec.externally_managed);
    }
}
