//! Compensating actions for a partially provisioned machine.

use std::fmt;

use tracing::{info, warn};

use crate::api::{ApiGateway, Client, ServerId, StorageId};

/// A remote resource to delete when a later stage fails.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UndoAction {
    /// Delete a server created by the attempt.
    DeleteServer(ServerId),
    /// Delete a storage volume created by the attempt.
    DeleteStorage(StorageId),
}

impl fmt::Display for UndoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteServer(id) => write!(f, "server {id}"),
            Self::DeleteStorage(id) => write!(f, "storage {id}"),
        }
    }
}

/// Outcome of unwinding a [`RollbackLedger`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RollbackReport {
    /// Actions that succeeded, in execution order.
    pub completed: Vec<UndoAction>,
    /// Actions that failed, with the error text.
    pub failed: Vec<(UndoAction, String)>,
}

impl RollbackReport {
    /// Returns `true` when every action succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Actions that failed, without their error text.
    #[must_use]
    pub fn into_orphaned(self) -> Vec<UndoAction> {
        self.failed.into_iter().map(|(action, _)| action).collect()
    }
}

/// Undo actions recorded in creation order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RollbackLedger {
    actions: Vec<UndoAction>,
}

impl RollbackLedger {
    /// Records an action.
    pub fn push(&mut self, action: UndoAction) {
        self.actions.push(action);
    }

    /// Returns `true` when nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Recorded actions in creation order.
    #[must_use]
    pub fn actions(&self) -> &[UndoAction] {
        &self.actions
    }

    /// Runs every action, newest first. Failures are logged and collected;
    /// they never stop the remaining actions.
    pub async fn unwind<G: ApiGateway>(self, api: &Client<'_, G>) -> RollbackReport {
        let mut report = RollbackReport::default();
        for action in self.actions.into_iter().rev() {
            let outcome = match &action {
                UndoAction::DeleteServer(id) => api.delete_server(id).await,
                UndoAction::DeleteStorage(id) => api.delete_storage(id).await,
            };
            match outcome {
                Ok(_) => {
                    info!(resource = %action, "rolled back");
                    report.completed.push(action);
                }
                Err(err) => {
                    warn!(resource = %action, error = %err, "rollback failed; resource left behind");
                    report.failed.push((action, err.to_string()));
                }
            }
        }
        report
    }

    /// Logs every recorded resource as orphaned and hands them back,
    /// newest first.
    #[must_use]
    pub fn abandon(self) -> Vec<UndoAction> {
        let mut orphaned = self.actions;
        orphaned.reverse();
        for action in &orphaned {
            warn!(resource = %action, "rollback disabled; resource left behind");
        }
        orphaned
    }
}
