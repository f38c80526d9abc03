//! Tests for the Cashier orchestrator

use super::*;
use crate::domain::types::HandPoses;
use crate::io::{ServiceError, ServiceResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Sensor stub replaying queued reports, then a fixed fallback
struct ScriptedSensor {
    reports: Mutex<VecDeque<ServiceResult<HandPoses>>>,
    fallback: HandPoses,
}

impl ScriptedSensor {
    fn with_fallback(fallback: HandPoses) -> Arc<Self> {
        Arc::new(Self { reports: Mutex::new(VecDeque::new()), fallback })
    }

    fn queue(self: &Arc<Self>, report: ServiceResult<HandPoses>) -> &Arc<Self> {
        self.reports.lock().push_back(report);
        self
    }
}

#[async_trait]
impl HandPoseSensor for ScriptedSensor {
    async fn hand_poses(&self, _user_id: u32) -> ServiceResult<HandPoses> {
        self.reports.lock().pop_front().unwrap_or(Ok(self.fallback))
    }
}

/// Recognizer stub replaying queued results, then the sentinel
struct ScriptedRecognizer {
    results: Mutex<VecDeque<ServiceResult<i64>>>,
}

impl ScriptedRecognizer {
    fn with_results(results: Vec<ServiceResult<i64>>) -> Arc<Self> {
        Arc::new(Self { results: Mutex::new(results.into()) })
    }
}

#[async_trait]
impl BanknoteRecognizer for ScriptedRecognizer {
    async fn recognise(&self, _camera_feed: &str) -> ServiceResult<i64> {
        self.results.lock().pop_front().unwrap_or(Ok(NO_BANKNOTE))
    }
}

/// Display stub recording every image shown
struct RecordingDisplay {
    frames: Mutex<Vec<&'static str>>,
}

impl RecordingDisplay {
    fn new() -> Arc<Self> {
        Arc::new(Self { frames: Mutex::new(Vec::new()) })
    }

    fn shown(&self) -> Vec<&'static str> {
        self.frames.lock().clone()
    }
}

#[async_trait]
impl HeadDisplay for RecordingDisplay {
    async fn show(&self, image: DisplayImage) {
        self.frames.lock().push(image.file_name());
    }
}

/// Planner stub with per-arm reachability and optional injected faults
struct ScriptedPlanner {
    right_arm_reaches: bool,
    left_arm_reaches: bool,
    /// Number of upcoming move_to calls that fault
    faulty_moves: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl ScriptedPlanner {
    fn reaching(right_arm_reaches: bool, left_arm_reaches: bool) -> Arc<Self> {
        Arc::new(Self {
            right_arm_reaches,
            left_arm_reaches,
            faulty_moves: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn fail_next_moves(self: &Arc<Self>, count: usize) -> &Arc<Self> {
        self.faulty_moves.store(count, Ordering::SeqCst);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn log(&self, call: &str, arm: ArmSide) {
        self.calls.lock().push(format!("{call}:{arm}"));
    }
}

#[async_trait]
impl MotionPlanner for ScriptedPlanner {
    async fn move_to(&self, _pose: &Pose, arm: ArmSide) -> ServiceResult<()> {
        if self
            .faulty_moves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ServiceError::PlannerFault("trajectory rejected".to_string()));
        }
        self.log("move_to", arm);
        Ok(())
    }

    async fn is_reachable(&self, _pose: &Pose, arm: ArmSide) -> ServiceResult<bool> {
        Ok(match arm {
            ArmSide::Right => self.right_arm_reaches,
            ArmSide::Left => self.left_arm_reaches,
        })
    }

    async fn open_gripper(&self, arm: ArmSide) -> ServiceResult<()> {
        self.log("open_gripper", arm);
        Ok(())
    }

    async fn close_gripper(&self, arm: ArmSide) -> ServiceResult<()> {
        self.log("close_gripper", arm);
        Ok(())
    }

    async fn set_neutral(&self, arm: ArmSide) -> ServiceResult<()> {
        self.log("set_neutral", arm);
        Ok(())
    }

    async fn move_hand_to_camera(&self, arm: ArmSide) -> ServiceResult<()> {
        self.log("hand_to_camera", arm);
        Ok(())
    }

    async fn end_effector_pose(&self, _arm: ArmSide) -> ServiceResult<Pose> {
        Ok(Pose::new(0.6, 0.3, -0.1, 0.0, 1.0, 0.0, 0.0))
    }

    async fn leave_banknote_on_table(&self, arm: ArmSide) -> ServiceResult<()> {
        self.log("leave_banknote", arm);
        Ok(())
    }
}

fn detection() -> Pose {
    Pose::new(0.7, 0.2, 0.3, 0.0, 0.0, 0.0, 1.0)
}

/// Customer presenting only their left hand
fn left_hand_only() -> HandPoses {
    HandPoses { left: detection(), right: Pose::empty() }
}

fn stale_hands() -> HandPoses {
    let old = detection().with_age(Duration::from_secs(10));
    HandPoses { left: old, right: old }
}

fn table(side: ArmSide, extra_slots: usize) -> BanknoteInventory {
    let initial = match side {
        ArmSide::Left => Pose::new(0.6, 0.3, -0.1, 0.0, 1.0, 0.0, 0.0),
        ArmSide::Right => Pose::new(0.6, -0.3, -0.1, 0.0, 1.0, 0.0, 0.0),
    };
    BanknoteInventory::new(initial, side, extra_slots, 0.10)
}

struct TestCashier {
    cashier: Cashier,
    display: Arc<RecordingDisplay>,
    planner: Arc<ScriptedPlanner>,
    metrics: Arc<Metrics>,
}

fn build_cashier(
    sensor: Arc<ScriptedSensor>,
    recognizer: Arc<ScriptedRecognizer>,
    planner: Arc<ScriptedPlanner>,
    extra_slots: usize,
) -> TestCashier {
    let display = RecordingDisplay::new();
    let metrics = Arc::new(Metrics::new());
    let config = Config::default().with_sense_retry_delay_ms(1);

    let cashier = Cashier::new(
        sensor,
        recognizer,
        planner.clone(),
        display.clone(),
        table(ArmSide::Left, extra_slots),
        table(ArmSide::Right, extra_slots),
        config,
        metrics.clone(),
    );

    TestCashier { cashier, display, planner, metrics }
}

#[tokio::test(start_paused = true)]
async fn test_full_cycle_overpay_then_change() {
    // amount 3, customer pays with a 5: ledger goes to -2, two unit
    // dispenses settle the session
    let sensor = ScriptedSensor::with_fallback(left_hand_only());
    let recognizer = ScriptedRecognizer::with_results(vec![Ok(5)]);
    let planner = ScriptedPlanner::reaching(true, true);
    let mut harness = build_cashier(sensor, recognizer, planner, 2);

    let record = harness.cashier.start_session(3).await;

    assert_eq!(record.outcome, SessionOutcome::Settled);
    assert_eq!(record.collected.as_slice(), &[5]);
    assert_eq!(record.dispensed, 2);
    assert!(harness.display.shown().contains(&"five_bill_recognised.png"));

    // Left hand maps to the right arm; change comes from the right table
    let calls = harness.planner.calls();
    assert!(calls.contains(&"leave_banknote:right".to_string()));
    assert_eq!(harness.cashier.table_right.available_count(), 1);
    assert_eq!(harness.cashier.table_left.available_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_ambiguous_recognition_leaves_ledger_unchanged() {
    let sensor = ScriptedSensor::with_fallback(left_hand_only());
    let recognizer = ScriptedRecognizer::with_results(vec![Ok(NO_BANKNOTE), Ok(1)]);
    let planner = ScriptedPlanner::reaching(true, true);
    let mut harness = build_cashier(sensor, recognizer, planner, 1);

    let record = harness.cashier.start_session(1).await;

    // First attempt shows the failure image and changes nothing; the second
    // attempt settles without any dispense
    assert_eq!(record.outcome, SessionOutcome::Settled);
    assert_eq!(record.collected.as_slice(), &[1]);
    assert_eq!(record.dispensed, 0);
    assert!(harness.display.shown().contains(&"unable_to_recognise.png"));
    assert_eq!(harness.metrics.report().recognition_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_recognizer_unavailable_treated_as_sentinel() {
    let sensor = ScriptedSensor::with_fallback(left_hand_only());
    let recognizer = ScriptedRecognizer::with_results(vec![
        Err(ServiceError::unavailable("recognizer", "connection refused")),
        Ok(1),
    ]);
    let planner = ScriptedPlanner::reaching(true, true);
    let mut harness = build_cashier(sensor, recognizer, planner, 1);

    let record = harness.cashier.start_session(1).await;

    assert_eq!(record.outcome, SessionOutcome::Settled);
    assert_eq!(record.collected.as_slice(), &[1]);
    assert!(harness.display.shown().contains(&"unable_to_recognise.png"));
    assert!(harness.metrics.report().service_errors >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_cycles_resample_before_acting() {
    let sensor = ScriptedSensor::with_fallback(left_hand_only());
    sensor.queue(Ok(stale_hands())).queue(Ok(stale_hands()));
    let recognizer = ScriptedRecognizer::with_results(vec![Ok(3)]);
    let planner = ScriptedPlanner::reaching(true, true);
    let mut harness = build_cashier(sensor, recognizer, planner, 1);

    let record = harness.cashier.start_session(3).await;

    assert_eq!(record.outcome, SessionOutcome::Settled);
    assert_eq!(harness.metrics.report().stale_cycles, 2);
    // No motion was commanded until a fresh pose arrived
    assert_eq!(record.collected.as_slice(), &[3]);
}

#[tokio::test(start_paused = true)]
async fn test_sensing_failure_is_retried() {
    let sensor = ScriptedSensor::with_fallback(left_hand_only());
    sensor.queue(Err(ServiceError::unavailable("pose_sensor", "timeout")));
    let recognizer = ScriptedRecognizer::with_results(vec![Ok(3)]);
    let planner = ScriptedPlanner::reaching(true, true);
    let mut harness = build_cashier(sensor, recognizer, planner, 1);

    let record = harness.cashier.start_session(3).await;

    assert_eq!(record.outcome, SessionOutcome::Settled);
    assert!(harness.metrics.report().service_errors >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_planner_fault_abandons_action_and_resumes() {
    let sensor = ScriptedSensor::with_fallback(left_hand_only());
    let recognizer = ScriptedRecognizer::with_results(vec![Ok(3)]);
    let planner = ScriptedPlanner::reaching(true, true);
    planner.fail_next_moves(1);
    let mut harness = build_cashier(sensor, recognizer, planner, 1);

    let record = harness.cashier.start_session(3).await;

    // First collect is abandoned on the fault, the retry succeeds
    assert_eq!(record.outcome, SessionOutcome::Settled);
    assert_eq!(record.collected.as_slice(), &[3]);
    assert_eq!(harness.metrics.report().planner_faults, 1);
}

#[tokio::test(start_paused = true)]
async fn test_negative_start_senses_delivery_target() {
    // Robot owes change from the start: no cached handoff exists, so a
    // reachable hand has to be sensed before dispensing
    let sensor = ScriptedSensor::with_fallback(left_hand_only());
    let recognizer = ScriptedRecognizer::with_results(vec![]);
    let planner = ScriptedPlanner::reaching(true, true);
    let mut harness = build_cashier(sensor, recognizer, planner, 1);

    let record = harness.cashier.start_session(-2).await;

    assert_eq!(record.outcome, SessionOutcome::Settled);
    assert!(record.collected.is_empty());
    assert_eq!(record.dispensed, 2);
    // Cross-mapped: left hand, right arm, right table
    assert_eq!(harness.cashier.table_right.available_count(), 0);
    assert_eq!(harness.cashier.table_left.available_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_inventory_exhaustion_aborts_session() {
    let sensor = ScriptedSensor::with_fallback(left_hand_only());
    let recognizer = ScriptedRecognizer::with_results(vec![]);
    let planner = ScriptedPlanner::reaching(true, true);
    // One slot per side, three units owed
    let mut harness = build_cashier(sensor, recognizer, planner, 0);

    let record = harness.cashier.start_session(-3).await;

    assert_eq!(record.outcome, SessionOutcome::Aborted);
    assert_eq!(record.dispensed, 1);
    assert!(record.events.iter().any(|e| e.t == "inventory_exhausted"));
    assert_eq!(harness.metrics.report().sessions_aborted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_availability_resets_between_sessions() {
    let sensor = ScriptedSensor::with_fallback(left_hand_only());
    let recognizer = ScriptedRecognizer::with_results(vec![Ok(2), Ok(2)]);
    let planner = ScriptedPlanner::reaching(true, true);
    let mut harness = build_cashier(sensor, recognizer, planner, 1);

    // First session consumes a banknote from the right table
    let record = harness.cashier.start_session(1).await;
    assert_eq!(record.outcome, SessionOutcome::Settled);
    assert_eq!(record.dispensed, 1);
    assert_eq!(harness.cashier.table_right.available_count(), 1);

    // Next session starts with the table restocked
    let record = harness.cashier.start_session(1).await;
    assert_eq!(record.outcome, SessionOutcome::Settled);
    assert_eq!(harness.cashier.table_right.available_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_gripper_sequence_during_collect() {
    let sensor = ScriptedSensor::with_fallback(left_hand_only());
    let recognizer = ScriptedRecognizer::with_results(vec![Ok(3)]);
    let planner = ScriptedPlanner::reaching(true, true);
    let mut harness = build_cashier(sensor, recognizer, planner, 1);

    harness.cashier.start_session(3).await;

    let calls = harness.planner.calls();
    let collect_prefix: Vec<&str> = calls.iter().take(5).map(String::as_str).collect();
    assert_eq!(
        collect_prefix,
        vec![
            "move_to:right",
            "open_gripper:right",
            "close_gripper:right",
            "hand_to_camera:right",
            "leave_banknote:right",
        ]
    );
}
