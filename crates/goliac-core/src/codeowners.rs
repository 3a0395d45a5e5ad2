//! CODEOWNERS regeneration for the teams repository.
//!
//! The admin team owns everything by default; each team directory is owned
//! by the team and its owner team, so changes to a team's files require a
//! review from that team.

use crate::model::DeclaredModel;
use crate::model::team::slugify;

/// Renders the `.github/CODEOWNERS` content for the teams repository.
///
/// The output is deterministic: teams are emitted in path order.
pub fn generate_codeowners(model: &DeclaredModel, organization: &str, owner_team_suffix: &str) -> String {
    let mut out = String::new();
    out.push_str("# DO NOT EDIT - generated file\n");
    out.push_str(&format!(
        "* @{}/{}\n",
        organization,
        slugify(&model.config.admin_team)
    ));

    let mut teams: Vec<_> = model.teams.values().collect();
    teams.sort_by(|a, b| a.path.cmp(&b.path));
    for team in teams {
        let slug = team.slug();
        out.push_str(&format!(
            "/teams/{}/* @{}/{}{} @{}/{}\n",
            team.path, organization, slug, owner_team_suffix, organization, slug
        ));
    }
    out
}
