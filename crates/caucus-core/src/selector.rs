//! Procedure-driven view selection.
//!
//! Pure mapping from (procedure, viewer role) to the live-interaction
//! widgets the presentation layer shows. No state, no side effects.

use crate::types::Procedure;

/// Read-only role context supplied by the authentication collaborator.
///
/// Passed explicitly to every role-dependent decision instead of being
/// looked up from global flags.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ViewerContext {
    pub is_admin: bool,
    pub username: Option<String>,
}

impl ViewerContext {
    pub fn observer() -> Self {
        Self::default()
    }

    pub fn admin(username: impl Into<String>) -> Self {
        Self {
            is_admin: true,
            username: Some(username.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollWidget {
    Voting,
    Attendance,
}

impl PollWidget {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Voting => "voting",
            Self::Attendance => "attendance",
        }
    }
}

/// The widgets to render. At most one poll widget by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewSelection {
    pub poll_widget: Option<PollWidget>,
    pub admin_controls: bool,
}

pub fn select_view(procedure: Procedure, viewer: &ViewerContext) -> ViewSelection {
    let poll_widget = match procedure {
        Procedure::None => None,
        Procedure::Voting => Some(PollWidget::Voting),
        Procedure::Attendance => Some(PollWidget::Attendance),
    };
    ViewSelection {
        poll_widget,
        admin_controls: viewer.is_admin,
    }
}
