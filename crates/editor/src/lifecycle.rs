use funnel_core::types::{AbTest, AbTestStatus};
use funnel_core::{FunnelError, FunnelResult};
use tracing::info;

use crate::allocator::{MIN_VARIANTS, TOTAL_ALLOCATION};

/// Describes a single valid state transition for an A/B test.
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: AbTestStatus,
    pub to: AbTestStatus,
    pub trigger: &'static str,
}

/// Guards the A/B test lifecycle: draft → running ↔ paused → completed.
/// `Completed` is terminal.
#[derive(Debug, Clone)]
pub struct AbTestStateMachine {
    pub transitions: Vec<StateTransition>,
}

impl AbTestStateMachine {
    pub fn new() -> Self {
        let transitions = vec![
            StateTransition {
                from: AbTestStatus::Draft,
                to: AbTestStatus::Running,
                trigger: "start",
            },
            StateTransition {
                from: AbTestStatus::Running,
                to: AbTestStatus::Paused,
                trigger: "pause",
            },
            StateTransition {
                from: AbTestStatus::Paused,
                to: AbTestStatus::Running,
                trigger: "resume",
            },
            StateTransition {
                from: AbTestStatus::Running,
                to: AbTestStatus::Completed,
                trigger: "declare_winner",
            },
            StateTransition {
                from: AbTestStatus::Paused,
                to: AbTestStatus::Completed,
                trigger: "declare_winner",
            },
        ];
        Self { transitions }
    }

    /// A transition is legal only through the trigger that owns it, so
    /// `resume` can never stand in for `start`.
    pub fn can_transition(&self, from: AbTestStatus, to: AbTestStatus, trigger: &str) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == from && t.to == to && t.trigger == trigger)
    }

    fn transition(&self, test: &AbTest, to: AbTestStatus, trigger: &'static str) -> FunnelResult<AbTest> {
        if !self.can_transition(test.status, to, trigger) {
            return Err(FunnelError::InvalidTransition {
                from: test.status.to_string(),
                to: to.to_string(),
            });
        }
        let mut next = test.clone();
        next.status = to;
        info!(test_id = %test.id, from = %test.status, to = %to, trigger, "A/B test status changed");
        Ok(next)
    }

    /// Starts a draft test. The variant set must already be a valid split.
    pub fn start(&self, test: &AbTest) -> FunnelResult<AbTest> {
        if test.variants.len() < MIN_VARIANTS {
            return Err(FunnelError::Validation(format!(
                "A/B test {} needs at least {} variants",
                test.id, MIN_VARIANTS
            )));
        }
        if test.total_allocation() != TOTAL_ALLOCATION {
            return Err(FunnelError::Validation(format!(
                "A/B test {} allocations sum to {}, expected {}",
                test.id,
                test.total_allocation(),
                TOTAL_ALLOCATION
            )));
        }
        self.transition(test, AbTestStatus::Running, "start")
    }

    pub fn pause(&self, test: &AbTest) -> FunnelResult<AbTest> {
        self.transition(test, AbTestStatus::Paused, "pause")
    }

    pub fn resume(&self, test: &AbTest) -> FunnelResult<AbTest> {
        self.transition(test, AbTestStatus::Running, "resume")
    }

    pub fn declare_winner(&self, test: &AbTest, winner_id: &str) -> FunnelResult<AbTest> {
        if test.variant(winner_id).is_none() {
            return Err(FunnelError::not_found("Variant", winner_id));
        }
        let mut next = self.transition(test, AbTestStatus::Completed, "declare_winner")?;
        next.winner_id = Some(winner_id.to_string());
        Ok(next)
    }
}

impl Default for AbTestStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
