//! # Activation Policy
//!
//! Decides which application should be brought forward when the executive has
//! room for one: after the foreground window's owner pauses or dies, or when
//! an application asks to be resumed. The orchestrator consults the policy
//! with a snapshot of every application it tracks; the policy never talks to
//! isolates itself.

use mvmrpc::AppId;
use mvmrpc::IsolateId;

use crate::midlet::MidletState;

/// The orchestrator's view of one application at consultation time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AppSnapshot {
    pub isolate_id: IsolateId,
    pub app_id: AppId,
    pub state: MidletState,
}

/// Selects the next application to activate, if any.
pub trait ActivationPolicy: Send + Sync + 'static {
    /// Picks one application from `apps` to resume, or `None` to leave the
    /// foreground empty. Applications already destroyed or being destroyed
    /// are never valid picks.
    fn select_next(&self, apps: &[AppSnapshot]) -> Option<(IsolateId, AppId)>;
}

/// Default policy: the candidate whose state carries the highest scheduling
/// priority wins; ties go to the lowest (isolate, app) pair so the choice is
/// deterministic.
pub struct HighestPriority;

impl ActivationPolicy for HighestPriority {
    fn select_next(&self, apps: &[AppSnapshot]) -> Option<(IsolateId, AppId)> {
        apps.iter()
            .filter(|app| {
                !matches!(app.state, MidletState::DestroyPending | MidletState::Destroyed)
            })
            .max_by_key(|app| {
                (app.state.priority(), std::cmp::Reverse((app.isolate_id.0, app.app_id.0)))
            })
            .map(|app| (app.isolate_id, app.app_id))
    }
}
