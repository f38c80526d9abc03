//! The transaction orchestrator
//!
//! The Cashier is the central decision loop that coordinates:
//! - Ledger state (the signed balance for the current customer)
//! - Banknote inventory (what is left on the table to hand back)
//! - Action selection from freshness-filtered hand poses
//! - The collect and dispense motion sequences via the planner
//! - The blocking recognition call with its concurrent idle animation
//!
//! One session runs from a non-zero balance to settlement. The loop is a
//! single task; every collaborator call is awaited in sequence, so the
//! ledger has exactly one mutator and mutations never interleave.

#[cfg(test)]
mod tests;

use crate::domain::inventory::BanknoteInventory;
use crate::domain::ledger::TransactionLedger;
use crate::domain::session::{SessionEvent, SessionOutcome, SessionRecord};
use crate::domain::types::{ArmSide, Pose};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::display::{DisplayImage, HeadDisplay};
use crate::io::planner::MotionPlanner;
use crate::io::pose_sensor::HandPoseSensor;
use crate::io::recognizer::{BanknoteRecognizer, NO_BANKNOTE};
use crate::io::ServiceError;
use crate::services::animation::IdleAnimation;
use crate::services::selector::{pose_is_reachable, select_action, Action};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Orchestrator states for one customer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Sensing,
    Collecting,
    Recognizing,
    Dispensing,
    Settled,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Sensing => "sensing",
            SessionState::Collecting => "collecting",
            SessionState::Recognizing => "recognizing",
            SessionState::Dispensing => "dispensing",
            SessionState::Settled => "settled",
        }
    }
}

/// The last pose+arm pair a banknote was taken from. Change is delivered
/// back to this hand.
#[derive(Debug, Clone, Copy)]
pub struct CustomerHandoff {
    pub pose: Pose,
    pub arm: ArmSide,
}

/// Why a dispense attempt did not complete.
enum DispenseError {
    /// No banknote left on the serving side; the session cannot continue.
    Exhausted,
    /// Planner fault; the action is abandoned and the loop resumes.
    Planner(ServiceError),
}

impl From<ServiceError> for DispenseError {
    fn from(e: ServiceError) -> Self {
        DispenseError::Planner(e)
    }
}

/// Drives the interaction loop for customer sessions.
pub struct Cashier {
    sensor: Arc<dyn HandPoseSensor>,
    recognizer: Arc<dyn BanknoteRecognizer>,
    planner: Arc<dyn MotionPlanner>,
    display: Arc<dyn HeadDisplay>,
    table_left: BanknoteInventory,
    table_right: BanknoteInventory,
    config: Config,
    metrics: Arc<Metrics>,
}

impl Cashier {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sensor: Arc<dyn HandPoseSensor>,
        recognizer: Arc<dyn BanknoteRecognizer>,
        planner: Arc<dyn MotionPlanner>,
        display: Arc<dyn HeadDisplay>,
        table_left: BanknoteInventory,
        table_right: BanknoteInventory,
        config: Config,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { sensor, recognizer, planner, display, table_left, table_right, config, metrics }
    }

    /// Run one customer session to completion.
    ///
    /// The loop runs until the balance reaches zero (`Settled`) or the
    /// session cannot continue (`Aborted`). The returned record is the
    /// session's receipt.
    pub async fn start_session(&mut self, amount_due: i64) -> SessionRecord {
        let mut ledger = TransactionLedger::new(amount_due);
        let mut record = SessionRecord::new(amount_due);
        let mut handoff: Option<CustomerHandoff> = None;
        let mut state = SessionState::Idle;

        self.metrics.record_session_started();
        info!(sid = %record.sid, amount_due = %amount_due, "session_started");

        // Fresh session: neutral face, table assumed restocked
        self.display.show(DisplayImage::EyesNormal).await;
        self.table_left.reset_availability();
        self.table_right.reset_availability();

        while !ledger.is_settled() {
            if ledger.owes_customer() {
                let Some(target) = handoff else {
                    // Session started owing change, so there is no cached
                    // customer pose yet; sense for a reachable hand to
                    // deliver to.
                    self.enter(&mut state, SessionState::Sensing);
                    self.metrics.record_cycle();
                    match self.sense_delivery_target().await {
                        Some(found) => handoff = Some(found),
                        None => self.pause_before_retry().await,
                    }
                    continue;
                };

                self.enter(&mut state, SessionState::Dispensing);
                match self.dispense_one(&target, &mut ledger, &mut record).await {
                    Ok(()) => {}
                    Err(DispenseError::Exhausted) => {
                        error!(
                            sid = %record.sid,
                            amount_due = %ledger.amount_due(),
                            "inventory_exhausted_aborting_session"
                        );
                        record.add_event(SessionEvent::new("inventory_exhausted"));
                        record.complete(SessionOutcome::Aborted);
                        self.metrics.record_session_aborted();
                        return record;
                    }
                    Err(DispenseError::Planner(e)) => {
                        warn!(error = %e, "dispense_abandoned");
                        self.metrics.record_planner_fault();
                        self.pause_before_retry().await;
                    }
                }
                continue;
            }

            self.enter(&mut state, SessionState::Sensing);
            self.metrics.record_cycle();

            let poses = match self.sensor.hand_poses(self.config.user_id()).await {
                Ok(poses) => poses,
                Err(e) => {
                    warn!(error = %e, "pose_sensing_failed");
                    self.metrics.record_service_error();
                    self.pause_before_retry().await;
                    continue;
                }
            };

            // Acting on stale data risks commanding a reach into empty
            // space; skip the cycle and re-sample.
            if poses.both_stale(self.max_pose_age()) {
                debug!("hand_poses_stale");
                self.metrics.record_stale_cycle();
                self.pause_before_retry().await;
                continue;
            }

            match select_action(&ledger, &poses, self.planner.as_ref()).await {
                Action::Collect { pose, arm } => {
                    self.enter(&mut state, SessionState::Collecting);
                    if let Err(e) = self
                        .collect(pose, arm, &mut state, &mut ledger, &mut handoff, &mut record)
                        .await
                    {
                        match &e {
                            ServiceError::PlannerFault(_) => {
                                warn!(error = %e, "collect_abandoned");
                                self.metrics.record_planner_fault();
                            }
                            ServiceError::Unavailable { .. } => {
                                warn!(error = %e, "collect_cycle_failed");
                                self.metrics.record_service_error();
                            }
                        }
                        self.pause_before_retry().await;
                    }
                }
                // Balance sign is checked at the loop top; nothing to do here
                Action::Dispense => {}
                Action::Wait => {
                    self.metrics.record_wait_cycle();
                    self.pause_before_retry().await;
                }
            }
        }

        self.enter(&mut state, SessionState::Settled);
        record.complete(SessionOutcome::Settled);
        info!(
            sid = %record.sid,
            collected = %record.collected.len(),
            dispensed = %record.dispensed,
            "session_settled"
        );
        record
    }

    /// Take a banknote from the customer's hand and run it past the camera.
    async fn collect(
        &self,
        pose: Pose,
        arm: ArmSide,
        state: &mut SessionState,
        ledger: &mut TransactionLedger,
        handoff: &mut Option<CustomerHandoff>,
        record: &mut SessionRecord,
    ) -> Result<(), ServiceError> {
        info!(arm = %arm, "collect_started");

        self.planner.move_to(&pose, arm).await?;
        self.planner.open_gripper(arm).await?;
        // Give the customer a moment to place the banknote in the gripper
        tokio::time::sleep(Duration::from_secs(1)).await;
        self.planner.close_gripper(arm).await?;
        self.planner.move_hand_to_camera(arm).await?;

        self.enter(state, SessionState::Recognizing);
        let value = self.recognise_with_animation().await;

        if value != NO_BANKNOTE {
            self.display.show(DisplayImage::BillRecognised(value)).await;
            ledger.adjust(-value);
            *handoff = Some(CustomerHandoff { pose, arm });
            record.record_collect(value);
            self.metrics.record_collect(value);
            info!(value = %value, amount_due = %ledger.amount_due(), "banknote_collected");

            self.planner.leave_banknote_on_table(arm).await?;
            tokio::time::sleep(Duration::from_secs(1)).await;
        } else {
            self.metrics.record_recognition_failure();
            self.display.show(DisplayImage::RecognitionFailed).await;
            info!("banknote_not_recognised");
        }

        self.display.show(DisplayImage::EyesNormal).await;
        self.planner.set_neutral(arm).await?;
        Ok(())
    }

    /// The blocking recognition call with the idle animation running
    /// alongside it. Service unavailability folds into the sentinel: both
    /// mean "no value this attempt" and leave the ledger untouched.
    async fn recognise_with_animation(&self) -> i64 {
        let animation = IdleAnimation::new(
            self.display.clone(),
            Duration::from_millis(self.config.frame_delay_ms()),
        );
        let cancel = animation.spawn();

        let started = Instant::now();
        let result = self.recognizer.recognise(self.config.camera_feed()).await;
        // Stop the eyes as soon as the call returns, success or failure
        let _ = cancel.send(true);
        self.metrics.record_recognition_latency(started.elapsed().as_millis() as u64);

        match result {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "recognition_service_failed");
                self.metrics.record_service_error();
                NO_BANKNOTE
            }
        }
    }

    /// Pick the next banknote from the serving side and hand it to the
    /// customer. The ledger is credited only after the gripper has opened
    /// over the customer's hand.
    async fn dispense_one(
        &mut self,
        target: &CustomerHandoff,
        ledger: &mut TransactionLedger,
        record: &mut SessionRecord,
    ) -> Result<(), DispenseError> {
        let planner = self.planner.clone();
        let approach = self.config.approach_offset_m();
        let unit = self.config.dispense_unit_value();

        // The delivering arm serves its own side of the table
        let inventory = match target.arm {
            ArmSide::Left => &mut self.table_left,
            ArmSide::Right => &mut self.table_right,
        };
        let Some(slot_pose) = inventory.take_next() else {
            return Err(DispenseError::Exhausted);
        };
        info!(arm = %target.arm, remaining = %inventory.available_count(), "dispense_started");

        // Pick the banknote: approach from above, descend, grip
        planner.open_gripper(target.arm).await?;
        let above = slot_pose.translated(0.0, 0.0, approach);
        planner.move_to(&above, target.arm).await?;
        planner.move_to(&slot_pose, target.arm).await?;
        planner.close_gripper(target.arm).await?;
        planner.set_neutral(target.arm).await?;

        // Deliver to the customer's cached hand pose
        planner.move_to(&target.pose, target.arm).await?;
        // Wait for the customer to reach for the banknote
        tokio::time::sleep(Duration::from_secs(1)).await;
        planner.open_gripper(target.arm).await?;

        ledger.adjust(unit);
        record.record_dispense(unit);
        self.metrics.record_dispense();
        info!(amount_due = %ledger.amount_due(), "change_dispensed");

        if !ledger.owes_customer() {
            planner.set_neutral(target.arm).await?;
        }
        Ok(())
    }

    /// One sensing cycle looking for a reachable hand to deliver change to,
    /// used when a session starts with the robot already owing money.
    async fn sense_delivery_target(&self) -> Option<CustomerHandoff> {
        let poses = match self.sensor.hand_poses(self.config.user_id()).await {
            Ok(poses) => poses,
            Err(e) => {
                warn!(error = %e, "pose_sensing_failed");
                self.metrics.record_service_error();
                return None;
            }
        };

        if poses.both_stale(self.max_pose_age()) {
            self.metrics.record_stale_cycle();
            return None;
        }

        if pose_is_reachable(&poses.left, ArmSide::Right, self.planner.as_ref()).await {
            return Some(CustomerHandoff { pose: poses.left, arm: ArmSide::Right });
        }
        if pose_is_reachable(&poses.right, ArmSide::Left, self.planner.as_ref()).await {
            return Some(CustomerHandoff { pose: poses.right, arm: ArmSide::Left });
        }

        self.metrics.record_wait_cycle();
        None
    }

    fn enter(&self, state: &mut SessionState, next: SessionState) {
        if *state != next {
            debug!(from = %state.as_str(), to = %next.as_str(), "state_changed");
            *state = next;
        }
    }

    fn max_pose_age(&self) -> Duration {
        Duration::from_secs(self.config.max_pose_age_secs())
    }

    async fn pause_before_retry(&self) {
        tokio::time::sleep(Duration::from_millis(self.config.sense_retry_delay_ms())).await;
    }
}
