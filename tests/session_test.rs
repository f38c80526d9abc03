//! End-to-end session scenarios against mock collaborators
//!
//! Drives the public library surface the way the binary does: build a
//! Cashier from trait objects, run sessions, write the receipts.

use async_trait::async_trait;
use cashier_poc::domain::{ArmSide, BanknoteInventory, HandPoses, Pose, SessionOutcome};
use cashier_poc::infra::{Config, Metrics};
use cashier_poc::io::display::{DisplayImage, HeadDisplay};
use cashier_poc::io::planner::MotionPlanner;
use cashier_poc::io::pose_sensor::HandPoseSensor;
use cashier_poc::io::recognizer::{BanknoteRecognizer, NO_BANKNOTE};
use cashier_poc::io::{ReceiptWriter, ServiceResult};
use cashier_poc::services::Cashier;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tempfile::tempdir;

struct FixedSensor {
    poses: HandPoses,
}

#[async_trait]
impl HandPoseSensor for FixedSensor {
    async fn hand_poses(&self, _user_id: u32) -> ServiceResult<HandPoses> {
        Ok(self.poses)
    }
}

struct QueueRecognizer {
    values: Mutex<VecDeque<i64>>,
}

#[async_trait]
impl BanknoteRecognizer for QueueRecognizer {
    async fn recognise(&self, _camera_feed: &str) -> ServiceResult<i64> {
        Ok(self.values.lock().pop_front().unwrap_or(NO_BANKNOTE))
    }
}

struct SilentDisplay;

#[async_trait]
impl HeadDisplay for SilentDisplay {
    async fn show(&self, _image: DisplayImage) {}
}

struct CompliantPlanner;

#[async_trait]
impl MotionPlanner for CompliantPlanner {
    async fn move_to(&self, _pose: &Pose, _arm: ArmSide) -> ServiceResult<()> {
        Ok(())
    }

    async fn is_reachable(&self, _pose: &Pose, _arm: ArmSide) -> ServiceResult<bool> {
        Ok(true)
    }

    async fn open_gripper(&self, _arm: ArmSide) -> ServiceResult<()> {
        Ok(())
    }

    async fn close_gripper(&self, _arm: ArmSide) -> ServiceResult<()> {
        Ok(())
    }

    async fn set_neutral(&self, _arm: ArmSide) -> ServiceResult<()> {
        Ok(())
    }

    async fn move_hand_to_camera(&self, _arm: ArmSide) -> ServiceResult<()> {
        Ok(())
    }

    async fn end_effector_pose(&self, _arm: ArmSide) -> ServiceResult<Pose> {
        Ok(Pose::new(0.6, 0.3, -0.1, 0.0, 1.0, 0.0, 0.0))
    }

    async fn leave_banknote_on_table(&self, _arm: ArmSide) -> ServiceResult<()> {
        Ok(())
    }
}

fn build_cashier(recognised_values: Vec<i64>) -> Cashier {
    let poses = HandPoses {
        left: Pose::new(0.7, 0.2, 0.3, 0.0, 0.0, 0.0, 1.0),
        right: Pose::empty(),
    };
    let table = |side| {
        BanknoteInventory::new(Pose::new(0.6, 0.0, -0.1, 0.0, 1.0, 0.0, 0.0), side, 4, 0.10)
    };

    Cashier::new(
        Arc::new(FixedSensor { poses }),
        Arc::new(QueueRecognizer { values: Mutex::new(recognised_values.into()) }),
        Arc::new(CompliantPlanner),
        Arc::new(SilentDisplay),
        table(ArmSide::Left),
        table(ArmSide::Right),
        Config::default(),
        Arc::new(Metrics::new()),
    )
}

#[tokio::test(start_paused = true)]
async fn test_overpay_session_settles_and_writes_receipt() {
    let mut cashier = build_cashier(vec![5]);

    // amount 3, paid with a 5: two unit dispenses bring the balance to zero
    let record = cashier.start_session(3).await;

    assert_eq!(record.outcome, SessionOutcome::Settled);
    assert_eq!(record.collected.as_slice(), &[5]);
    assert_eq!(record.dispensed, 2);

    let dir = tempdir().unwrap();
    let path = dir.path().join("receipts.jsonl");
    let writer = ReceiptWriter::new(path.to_str().unwrap());
    assert!(writer.write_record(&record));

    let content = std::fs::read_to_string(&path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
    assert_eq!(parsed["due"], 3);
    assert_eq!(parsed["out"], "settled");
    assert_eq!(parsed["collected"][0], 5);
    assert_eq!(parsed["dispensed"], 2);
}

#[tokio::test(start_paused = true)]
async fn test_ledger_converges_over_multiple_collects() {
    let mut cashier = build_cashier(vec![1, 3]);

    // amount 4 paid as 1 + 3; no change owed
    let record = cashier.start_session(4).await;

    assert_eq!(record.outcome, SessionOutcome::Settled);
    assert_eq!(record.collected.as_slice(), &[1, 3]);
    assert_eq!(record.dispensed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_recognitions_do_not_move_the_balance() {
    let mut cashier = build_cashier(vec![NO_BANKNOTE, NO_BANKNOTE, 1]);

    let record = cashier.start_session(1).await;

    assert_eq!(record.outcome, SessionOutcome::Settled);
    // Two failed attempts left no trace in the collected values
    assert_eq!(record.collected.as_slice(), &[1]);
    assert_eq!(record.dispensed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_sessions_reuse_the_cashier() {
    let mut cashier = build_cashier(vec![5, 2]);

    let first = cashier.start_session(5).await;
    assert_eq!(first.outcome, SessionOutcome::Settled);
    assert_eq!(first.dispensed, 0);

    let second = cashier.start_session(1).await;
    assert_eq!(second.outcome, SessionOutcome::Settled);
    assert_eq!(second.collected.as_slice(), &[2]);
    assert_eq!(second.dispensed, 1);
}
