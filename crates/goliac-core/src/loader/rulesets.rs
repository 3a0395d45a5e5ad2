//! Organization-scope ruleset loading from `rulesets/`.

use super::{file_stem, is_hidden, is_yaml, read_document, rel_path, sorted_entries};
use crate::errors::{ErrorCollection, SyncError};
use crate::model::DeclaredModel;
use crate::model::ruleset::{Ruleset, RulesetDefinition};
use log::trace;
use std::path::Path;

pub(super) fn load_rulesets(root: &Path, model: &mut DeclaredModel, errors: &ErrorCollection) {
    let dir = root.join("rulesets");
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
        let Some(doc) =
            read_document::<RulesetDefinition>(root, &path, "Ruleset", &stem, errors)
        else {
            continue;
        };
        if let Err(reason) = doc.spec.validate() {
            errors.add_error(SyncError::validation(rel_path(root, &path), reason));
            continue;
        }
        trace!("loaded ruleset {}", doc.name);
        model.rulesets.insert(
            doc.name.clone(),
            Ruleset {
                name: doc.name,
                definition: doc.spec,
            },
        );
    }
}
