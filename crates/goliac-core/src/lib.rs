//! Goliac Core
//!
//! Declarative GitHub organization management: a Git repository (the
//! *teams repository*) is the source of truth for users, teams,
//! repositories, rulesets, branch protections, environments and
//! variables; a reconciliation engine converges the live organization
//! towards it with the minimum set of API mutations.
//!
//! # Architecture
//!
//! - [`loader`]: parses the teams-repo working tree into the typed
//!   [`model::DeclaredModel`], accumulating validation errors and
//!   warnings.
//! - [`remote`]: the lazy, TTL-cached, concurrently-fetched mirror of the
//!   observed organization, plus the GitHub API trait and its
//!   octocrab-backed implementation.
//! - [`executor`]: the command sink with transactional hooks; one
//!   implementation applies to GitHub, one records for plans and tests.
//! - [`reconcile`]: the diff engine with its ordered passes, destructive
//!   operation gates and per-cycle change cap.
//! - [`errors`]: the shared error/warning collection.
//!
//! # Quick start
//!
//! ```no_run
//! use goliac_core::cancel::CancelFlag;
//! use goliac_core::config::{RuntimeConfig, create_octocrab};
//! use goliac_core::errors::ErrorCollection;
//! use goliac_core::executor::GithubExecutor;
//! use goliac_core::reconcile::ReconciliationRunner;
//! use goliac_core::remote::{OctocrabApi, RemoteMirror};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RuntimeConfig::from_env()?;
//! let client = create_octocrab(&config).await?;
//! let api = OctocrabApi::connect(client, &config.github_app_organization).await;
//! let mirror = Arc::new(RemoteMirror::new(
//!     Arc::new(api),
//!     config.github_cache_ttl,
//!     config.github_concurrent_threads,
//! ));
//! let errors = Arc::new(ErrorCollection::new());
//! let executor = Arc::new(GithubExecutor::new(mirror.clone(), errors.clone()));
//! let runner = ReconciliationRunner::new(
//!     mirror,
//!     executor,
//!     "teams",
//!     &config.team_owner_suffix,
//!     config.manage_github_actions_variables,
//! );
//! let outcome = runner
//!     .run(Path::new("/tmp/teams"), true, &errors, &CancelFlag::new())
//!     .await?;
//! println!("{} commands", outcome.commands);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod codeowners;
pub mod config;
pub mod errors;
pub mod executor;
pub mod loader;
pub mod model;
pub mod reconcile;
pub mod remote;
pub mod usersync;

// Re-export commonly used types at the crate root
pub use cancel::CancelFlag;
pub use errors::{ErrorCollection, Severity, SyncError};
pub use loader::EntityLoader;
pub use model::DeclaredModel;
pub use reconcile::{CycleState, ReconcileOutcome, ReconciliationRunner, Reconciliator};
pub use remote::{GithubApi, OctocrabApi, RemoteMirror};
