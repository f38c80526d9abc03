//! Per-cycle action selection
//!
//! Given the ledger sign and the freshness-filtered hand poses, pick the
//! next physical action. The balance sign dominates: change owed is
//! dispensed before any new banknote is taken.

use crate::domain::ledger::TransactionLedger;
use crate::domain::types::{ArmSide, HandPoses, Pose};
use crate::io::planner::MotionPlanner;
use tracing::{debug, warn};

/// Next physical action for the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// Hand change back to the customer.
    Dispense,
    /// Take a banknote from the given hand pose with the given arm.
    Collect { pose: Pose, arm: ArmSide },
    /// Nothing actionable this cycle; re-sense.
    Wait,
}

/// Decision rule, evaluated in order:
/// 1. The robot owes the customer: dispense, regardless of pose state.
/// 2. Customer's left hand, robot's right arm (cross-body: the customer
///    faces the robot, so their left hand is nearer its right arm).
/// 3. Symmetric: customer's right hand, robot's left arm.
/// 4. Wait.
pub async fn select_action(
    ledger: &TransactionLedger,
    poses: &HandPoses,
    planner: &dyn MotionPlanner,
) -> Action {
    if ledger.owes_customer() {
        return Action::Dispense;
    }

    if pose_is_reachable(&poses.left, ArmSide::Right, planner).await {
        return Action::Collect { pose: poses.left, arm: ArmSide::Right };
    }

    if pose_is_reachable(&poses.right, ArmSide::Left, planner).await {
        return Action::Collect { pose: poses.right, arm: ArmSide::Left };
    }

    debug!("no_reachable_hand_pose");
    Action::Wait
}

/// Non-empty and confirmed reachable by the planner. A planner error during
/// the check counts as unreachable for this cycle.
pub async fn pose_is_reachable(pose: &Pose, arm: ArmSide, planner: &dyn MotionPlanner) -> bool {
    if pose.is_empty() {
        return false;
    }

    match planner.is_reachable(pose, arm).await {
        Ok(reachable) => {
            debug!(arm = %arm, reachable = %reachable, "reachability_checked");
            reachable
        }
        Err(e) => {
            warn!(arm = %arm, error = %e, "reachability_check_failed");
            false
        }
    }
}
