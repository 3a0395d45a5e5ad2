//! Workflow definitions (forcemerge and friends) with repository and ACL
//! matching.
//!
//! Step execution is delegated to external plugins; the core only models
//! the documents and evaluates who may trigger a workflow where.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Selector token matching everything.
pub const SELECTOR_ALL: &str = "~ALL";

/// ACL token resolved through the per-repository approvers file
/// (`.goliac/forcemerge.approvers`).
pub const ACL_REPOSITORY_APPROVERS: &str = "~GOLIAC_REPOSITORY_APPROVERS";

/// Known workflow step plugins.
pub const KNOWN_STEPS: &[&str] = &["jira_ticket_creation", "slack_notification"];

/// The workflow behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowType {
    Forcemerge,
    #[default]
    Noop,
}

/// An allow/deny selector over repositories or teams.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkflowSelector {
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub except: Vec<String>,
}

/// A step executed after a workflow is approved.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WorkflowStep {
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// The `spec` payload of a `kind: Workflow` document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowSpec {
    pub workflow_type: WorkflowType,
    pub description: String,
    pub repositories: WorkflowSelector,
    pub acls: WorkflowSelector,
    pub steps: Vec<WorkflowStep>,
}

/// A declared workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workflow {
    /// The workflow name (file basename stem).
    pub name: String,
    /// The declared payload.
    pub spec: WorkflowSpec,
}

impl Workflow {
    /// Returns true if the workflow applies to the given repository.
    pub fn pass_repositories(&self, repository: &str) -> bool {
        let allowed = self
            .spec
            .repositories
            .allowed
            .iter()
            .any(|entry| entry == SELECTOR_ALL || entry == repository);
        let excluded = self
            .spec
            .repositories
            .except
            .iter()
            .any(|entry| entry == repository);
        allowed && !excluded
    }

    /// Returns true if a user may trigger the workflow.
    ///
    /// Any-of semantics: the user passes if at least one of their teams
    /// matches `acls.allowed` (or they are listed in the repository
    /// approvers when `~GOLIAC_REPOSITORY_APPROVERS` is allowed), and none
    /// of their teams matches `acls.except`.
    pub fn pass_acl(&self, user_teams: &[String], repository_approvers: &[String], login: &str) -> bool {
        if self
            .spec
            .acls
            .except
            .iter()
            .any(|entry| user_teams.iter().any(|team| team == entry))
        {
            return false;
        }
        self.spec.acls.allowed.iter().any(|entry| {
            if entry == ACL_REPOSITORY_APPROVERS {
                repository_approvers.iter().any(|approver| approver == login)
            } else {
                entry == SELECTOR_ALL || user_teams.iter().any(|team| team == entry)
            }
        })
    }
}

/// Parses a `.goliac/forcemerge.approvers` file: one login per line,
/// blank lines and `#` comments skipped.
pub fn parse_approvers(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Document;

    fn workflow(allowed: &[&str], except: &[&str]) -> Workflow {
        Workflow {
            name: "fm".into(),
            spec: WorkflowSpec {
                workflow_type: WorkflowType::Forcemerge,
                acls: WorkflowSelector {
                    allowed: allowed.iter().map(|s| s.to_string()).collect(),
                    except: except.iter().map(|s| s.to_string()).collect(),
                },
                ..Default::default()
            },
        }
    }

    #[test]
    fn workflow_document_decodes() {
        let doc: Document<WorkflowSpec> = Document::from_yaml(
            r#"
apiVersion: v1
kind: Workflow
name: forcemerge
spec:
  workflow_type: forcemerge
  description: Bypass required checks in an emergency
  repositories:
    allowed:
      - '~ALL'
  acls:
    allowed:
      - sre
  steps:
    - name: slack_notification
      properties:
        channel: '#incidents'
"#,
        )
        .unwrap();
        assert_eq!(doc.spec.workflow_type, WorkflowType::Forcemerge);
        assert_eq!(doc.spec.steps[0].name, "slack_notification");
    }

    #[test]
    fn pass_repositories_with_all_token() {
        let mut wf = workflow(&[], &[]);
        wf.spec.repositories.allowed = vec![SELECTOR_ALL.into()];
        wf.spec.repositories.except = vec!["sealed".into()];
        assert!(wf.pass_repositories("anything"));
        assert!(!wf.pass_repositories("sealed"));
    }

    #[test]
    fn pass_repositories_requires_allow_entry() {
        let wf = workflow(&[], &[]);
        assert!(!wf.pass_repositories("anything"));
    }

    #[test]
    fn acl_any_of_team_match() {
        let wf = workflow(&["sre", "platform"], &[]);
        assert!(wf.pass_acl(&["platform".into()], &[], "alice"));
        assert!(!wf.pass_acl(&["support".into()], &[], "alice"));
    }

    #[test]
    fn acl_except_wins_over_allow() {
        let wf = workflow(&["sre"], &["contractors"]);
        assert!(!wf.pass_acl(&["sre".into(), "contractors".into()], &[], "alice"));
    }

    #[test]
    fn acl_repository_approvers_token() {
        let wf = workflow(&[ACL_REPOSITORY_APPROVERS], &[]);
        assert!(wf.pass_acl(&[], &["alice".into()], "alice"));
        assert!(!wf.pass_acl(&[], &["alice".into()], "bob"));
    }

    #[test]
    fn acl_all_token() {
        let wf = workflow(&[SELECTOR_ALL], &[]);
        assert!(wf.pass_acl(&[], &[], "anyone"));
    }

    #[test]
    fn approvers_file_parsing() {
        let approvers = parse_approvers("# emergency approvers\nalice\n\n  bob  \n");
        assert_eq!(approvers, vec!["alice", "bob"]);
    }
}
