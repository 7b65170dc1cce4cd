use chrono::{DateTime, Utc};

use super::domain::{Application, ApplicationStatus};

impl ApplicationStatus {
    /// Legal edge set of the application state machine.
    pub fn can_transition_to(self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (self, next),
            (PendingAnalysis, Analyzing)
                | (Analyzing, Approved)
                | (Analyzing, Declined)
                | (Analyzing, FlaggedForReview)
                | (FlaggedForReview, Approved)
                | (FlaggedForReview, Declined)
                | (Approved, MandateCreated)
                | (MandateCreated, MandateActive)
                | (MandateActive, Active)
                | (Active, Completed)
                | (Active, Defaulted)
        )
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("illegal status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: &'static str,
    pub to: &'static str,
}

/// Move an application to `next`, stamping the matching timestamp.
///
/// Every mutation of `Application::status` in the pipeline goes through here
/// so the edge set is enforced in one place.
pub fn transition(
    app: &mut Application,
    next: ApplicationStatus,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    if !app.status.can_transition_to(next) {
        return Err(TransitionError {
            from: app.status.label(),
            to: next.label(),
        });
    }

    app.status = next;
    match next {
        ApplicationStatus::Approved => app.approved_at = Some(now),
        ApplicationStatus::Declined => app.declined_at = Some(now),
        ApplicationStatus::MandateActive => app.mandate_activated_at = Some(now),
        ApplicationStatus::Completed => app.completed_at = Some(now),
        _ => {}
    }
    Ok(())
}

/// Operator decision on an application awaiting manual review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Decline,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReviewError {
    #[error("application is {status}, only FLAGGED_FOR_REVIEW applications can be reviewed")]
    NotFlagged { status: &'static str },
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Apply a human reviewer's decision to a flagged application.
///
/// Rejected outright for any other status so a stray admin request cannot
/// mutate an application mid-pipeline.
pub fn apply_review(
    app: &mut Application,
    decision: ReviewDecision,
    now: DateTime<Utc>,
) -> Result<ApplicationStatus, ReviewError> {
    if app.status != ApplicationStatus::FlaggedForReview {
        return Err(ReviewError::NotFlagged {
            status: app.status.label(),
        });
    }

    let next = match decision {
        ReviewDecision::Approve => ApplicationStatus::Approved,
        ReviewDecision::Decline => ApplicationStatus::Declined,
    };
    transition(app, next, now)?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ApplicationStatus::*;

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        let all = [
            PendingAnalysis,
            Analyzing,
            Approved,
            Declined,
            FlaggedForReview,
            MandateCreated,
            MandateActive,
            Active,
            Completed,
            Defaulted,
        ];
        for terminal in [Declined, Completed, Defaulted] {
            for next in all {
                assert!(
                    !terminal.can_transition_to(next),
                    "{} should not reach {}",
                    terminal.label(),
                    next.label()
                );
            }
        }
    }

    #[test]
    fn default_is_reachable_from_active_only() {
        let all = [
            PendingAnalysis,
            Analyzing,
            Approved,
            FlaggedForReview,
            MandateCreated,
            MandateActive,
            Completed,
        ];
        assert!(Active.can_transition_to(Defaulted));
        for from in all {
            assert!(!from.can_transition_to(Defaulted));
        }
    }

    #[test]
    fn approval_pipeline_edges_are_sequential() {
        assert!(Approved.can_transition_to(MandateCreated));
        assert!(MandateCreated.can_transition_to(MandateActive));
        assert!(MandateActive.can_transition_to(Active));
        assert!(!Approved.can_transition_to(MandateActive));
        assert!(!MandateCreated.can_transition_to(Active));
    }
}
