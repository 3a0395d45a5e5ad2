//! The cycle runner: drives one reconciliation end to end through its
//! state machine, excluding concurrent cycles with a process-wide mutex.

use log::info;
use std::path::Path;
use std::sync::Arc;

use super::{ReconcileOutcome, Reconciliator};
use crate::cancel::CancelFlag;
use crate::errors::{ErrorCollection, SyncError};
use crate::executor::ReconciliationExecutor;
use crate::loader::EntityLoader;
use crate::remote::RemoteMirror;

/// Where a cycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    LoadingLocal,
    LoadingRemote,
    Planning,
    Applying,
    Done,
    Failed,
}

/// Runs reconciliation cycles: load local, load remote, plan, apply.
pub struct ReconciliationRunner {
    mirror: Arc<RemoteMirror>,
    executor: Arc<dyn ReconciliationExecutor>,
    teams_repo: String,
    owner_team_suffix: String,
    manage_actions_variables: bool,
    state: std::sync::Mutex<CycleState>,
    cycle_lock: tokio::sync::Mutex<()>,
}

impl ReconciliationRunner {
    /// Creates a runner for the given mirror and executor.
    pub fn new(
        mirror: Arc<RemoteMirror>,
        executor: Arc<dyn ReconciliationExecutor>,
        teams_repo: impl Into<String>,
        owner_team_suffix: impl Into<String>,
        manage_actions_variables: bool,
    ) -> Self {
        Self {
            mirror,
            executor,
            teams_repo: teams_repo.into(),
            owner_team_suffix: owner_team_suffix.into(),
            manage_actions_variables,
            state: std::sync::Mutex::new(CycleState::Idle),
            cycle_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The state of the current (or last) cycle.
    pub fn state(&self) -> CycleState {
        *self.state.lock().expect("state poisoned")
    }

    fn set_state(&self, state: CycleState) {
        *self.state.lock().expect("state poisoned") = state;
    }

    /// Runs one cycle against a teams-repo working tree.
    ///
    /// Concurrent calls serialize: only one cycle runs at a time.
    pub async fn run(
        &self,
        teams_root: &Path,
        dry_run: bool,
        errors: &Arc<ErrorCollection>,
        cancel: &CancelFlag,
    ) -> Result<ReconcileOutcome, SyncError> {
        let _cycle = self.cycle_lock.lock().await;
        info!(
            "reconciliation cycle starts (dry_run: {}, root: {})",
            dry_run,
            teams_root.display()
        );

        self.set_state(CycleState::LoadingLocal);
        let loader = EntityLoader::new(teams_root, &self.owner_team_suffix);
        let Some(model) = loader.load(errors, false) else {
            self.set_state(CycleState::Failed);
            return Err(errors
                .first_error()
                .unwrap_or_else(|| SyncError::validation("teams repo", "validation failed")));
        };
        if cancel.is_cancelled() {
            self.set_state(CycleState::Failed);
            return Err(SyncError::Cancelled);
        }

        self.set_state(CycleState::LoadingRemote);
        if let Err(error) = self.prefetch().await {
            self.set_state(CycleState::Failed);
            errors.add_error(error.clone());
            return Err(error);
        }
        if cancel.is_cancelled() {
            self.set_state(CycleState::Failed);
            return Err(SyncError::Cancelled);
        }

        self.set_state(CycleState::Planning);
        if errors.has_errors() {
            self.set_state(CycleState::Failed);
            return Err(errors
                .first_error()
                .unwrap_or_else(|| SyncError::validation("teams repo", "validation failed")));
        }

        self.set_state(CycleState::Applying);
        let reconciliator = Reconciliator::new(
            self.mirror.clone(),
            self.executor.clone(),
            &self.teams_repo,
            &self.owner_team_suffix,
        )
        .manage_actions_variables(self.manage_actions_variables)
        .dry_run(dry_run);

        match reconciliator.reconcile(&model, errors, cancel).await {
            Ok(outcome) => {
                self.set_state(CycleState::Done);
                Ok(outcome)
            }
            Err(error) => {
                self.set_state(CycleState::Failed);
                Err(error)
            }
        }
    }

    /// Warms the mirror before planning, so fetch failures surface as one
    /// clean error instead of mid-diff.
    async fn prefetch(&self) -> Result<(), SyncError> {
        self.mirror
            .users()
            .await
            .map_err(|e| SyncError::fetch("users", e.to_string()))?;
        self.mirror
            .teams()
            .await
            .map_err(|e| SyncError::fetch("teams", e.to_string()))?;
        self.mirror
            .repositories()
            .await
            .map_err(|e| SyncError::fetch("repositories", e.to_string()))?;
        if self.mirror.is_enterprise() {
            self.mirror
                .org_rulesets()
                .await
                .map_err(|e| SyncError::fetch("rulesets", e.to_string()))?;
        }
        self.mirror
            .app_installations()
            .await
            .map_err(|e| SyncError::fetch("app installations", e.to_string()))?;
        Ok(())
    }
}
