//! Workflow loading from `workflows/`.

use super::{file_stem, is_hidden, is_yaml, read_document, rel_path, sorted_entries};
use crate::errors::{ErrorCollection, SyncError};
use crate::model::DeclaredModel;
use crate::model::workflow::{KNOWN_STEPS, Workflow, WorkflowSpec};
use log::trace;
use std::path::Path;

pub(super) fn load_workflows(root: &Path, model: &mut DeclaredModel, errors: &ErrorCollection) {
    let dir = root.join("workflows");
    if !dir.is_dir() {
        return;
    }
    for path in sorted_entries(&dir) {
        if path.is_dir() || is_hidden(&path) {
            continue;
        }
        if !is_yaml(&path) {
            errors.add_warning(SyncError::warning(rel_path(root, &path), "stray non-YAML file"));
            continue;
        }
        let Some(stem) = file_stem(&path) else { continue };
        let Some(doc) = read_document::<WorkflowSpec>(root, &path, "Workflow", &stem, errors)
        else {
            continue;
        };

        let display = rel_path(root, &path);
        let mut valid = true;
        for step in &doc.spec.steps {
            if !KNOWN_STEPS.contains(&step.name.as_str()) {
                errors.add_error(SyncError::validation(
                    &display,
                    format!("unknown workflow step '{}'", step.name),
                ));
                valid = false;
            }
        }
        if !valid {
            continue;
        }

        trace!("loaded workflow {}", doc.name);
        model.workflows.insert(
            doc.name.clone(),
            Workflow {
                name: doc.name,
                spec: doc.spec,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::workflow::WorkflowType;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn loads_workflow_document() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "workflows/forcemerge.yaml",
            r#"
apiVersion: v1
kind: Workflow
name: forcemerge
spec:
  workflow_type: forcemerge
  description: Emergency bypass
  repositories:
    allowed:
      - '~ALL'
  acls:
    allowed:
      - sre
  steps:
    - name: slack_notification
"#,
        );
        let mut model = DeclaredModel::default();
        let errors = ErrorCollection::new();
        load_workflows(dir.path(), &mut model, &errors);
        assert!(!errors.has_errors());
        assert_eq!(
            model.workflows["forcemerge"].spec.workflow_type,
            WorkflowType::Forcemerge
        );
    }

    #[test]
    fn unknown_step_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "workflows/bad.yaml",
            r#"
apiVersion: v1
kind: Workflow
name: bad
spec:
  steps:
    - name: carrier_pigeon
"#,
        );
        let mut model = DeclaredModel::default();
        let errors = ErrorCollection::new();
        load_workflows(dir.path(), &mut model, &errors);
        assert!(errors.has_errors());
        assert!(model.workflows.is_empty());
    }
}
