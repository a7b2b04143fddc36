//! Per-type transition tables.
//!
//! A table lists, for every lifecycle state, the actions an activity may undergo while in that
//! state. Types that do not supply their own table use [`DEFAULT_TRANSITIONS`].

use crate::activity::{Action, ActivityState};
use crate::{CoreError, CoreResult};

/// Allowed actions per lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionTable {
    new: &'static [Action],
    scheduled: &'static [Action],
    started: &'static [Action],
    completed: &'static [Action],
    cancelled: &'static [Action],
}

/// The table used by every type that declares none.
pub static DEFAULT_TRANSITIONS: TransitionTable = TransitionTable::new(
    &[
        Action::Schedule,
        Action::Start,
        Action::Complete,
        Action::Cancel,
        Action::Submit,
        Action::Assign,
        Action::Unassign,
    ],
    &[
        Action::Schedule,
        Action::Start,
        Action::Complete,
        Action::Cancel,
        Action::Submit,
        Action::Assign,
        Action::Unassign,
    ],
    &[
        Action::Complete,
        Action::Cancel,
        Action::Submit,
        Action::Assign,
        Action::Unassign,
    ],
    &[Action::Cancel],
    &[],
);

impl TransitionTable {
    pub const fn new(
        new: &'static [Action],
        scheduled: &'static [Action],
        started: &'static [Action],
        completed: &'static [Action],
        cancelled: &'static [Action],
    ) -> Self {
        Self {
            new,
            scheduled,
            started,
            completed,
            cancelled,
        }
    }

    /// Actions allowed from `state`.
    pub fn allowed(&self, state: ActivityState) -> &'static [Action] {
        match state {
            ActivityState::New => self.new,
            ActivityState::Scheduled => self.scheduled,
            ActivityState::Started => self.started,
            ActivityState::Completed => self.completed,
            ActivityState::Cancelled => self.cancelled,
        }
    }

    pub fn is_action_allowed(&self, state: ActivityState, action: Action) -> bool {
        self.allowed(state).contains(&action)
    }

    /// Check that `action` is allowed from `state` for an activity of type `data_model`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Transition`] naming the action, type and state if it is not.
    pub fn check(&self, data_model: &str, state: ActivityState, action: Action) -> CoreResult<()> {
        if self.is_action_allowed(state, action) {
            return Ok(());
        }
        Err(CoreError::Transition {
            action,
            data_model: data_model.to_owned(),
            state,
        })
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        DEFAULT_TRANSITIONS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_allows_everything_before_start() {
        for action in Action::ALL {
            assert!(DEFAULT_TRANSITIONS.is_action_allowed(ActivityState::New, action));
            assert!(DEFAULT_TRANSITIONS.is_action_allowed(ActivityState::Scheduled, action));
        }
    }

    #[test]
    fn started_activities_cannot_be_rescheduled_or_restarted() {
        assert!(!DEFAULT_TRANSITIONS.is_action_allowed(ActivityState::Started, Action::Schedule));
        assert!(!DEFAULT_TRANSITIONS.is_action_allowed(ActivityState::Started, Action::Start));
        assert!(DEFAULT_TRANSITIONS.is_action_allowed(ActivityState::Started, Action::Complete));
    }

    #[test]
    fn completed_only_allows_cancel_and_cancelled_nothing() {
        assert_eq!(
            DEFAULT_TRANSITIONS.allowed(ActivityState::Completed),
            &[Action::Cancel]
        );
        assert!(DEFAULT_TRANSITIONS.allowed(ActivityState::Cancelled).is_empty());
    }

    #[test]
    fn check_reports_action_type_and_state() {
        let err = DEFAULT_TRANSITIONS
            .check("nh.clinical.spell", ActivityState::Cancelled, Action::Start)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Transition Error: event 'start' on activity type 'nh.clinical.spell' can not be executed from state 'cancelled'"
        );
    }

    #[test]
    fn custom_table_restricts_actions() {
        let table = TransitionTable::new(&[Action::Complete], &[], &[], &[], &[]);
        assert!(table.check("T", ActivityState::New, Action::Complete).is_ok());
        assert!(table.check("T", ActivityState::New, Action::Start).is_err());
    }
}
