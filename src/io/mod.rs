//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `pose_sensor` - HTTP client for the hand-pose sensing service
//! - `recognizer` - HTTP client for the banknote recognition service
//! - `planner` - HTTP client for the motion planner / gripper control
//! - `display` - MQTT publisher for the head-screen renderer
//! - `till` - MQTT listener for session requests from the POS till
//! - `receipts` - Session receipt output to file (JSONL format)

pub mod display;
pub mod planner;
pub mod pose_sensor;
pub mod receipts;
pub mod recognizer;
pub mod till;

use thiserror::Error;

/// Failures crossing a collaborator boundary.
///
/// `Unavailable` marks a failed cycle: the orchestrator retries on the next
/// iteration. `PlannerFault` is fatal for the current action: the action is
/// abandoned and the loop resumes sensing. The core never retries a planner
/// fault itself.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: &'static str, reason: String },
    #[error("planner fault: {0}")]
    PlannerFault(String),
}

impl ServiceError {
    pub fn unavailable(service: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Unavailable { service, reason: reason.to_string() }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

// Re-export commonly used types
pub use display::{DisplayImage, HeadDisplay, MqttDisplay};
pub use planner::{MotionPlanner, PlannerClient};
pub use pose_sensor::{HandPoseSensor, PoseSensorClient};
pub use receipts::ReceiptWriter;
pub use recognizer::{BanknoteRecognizer, RecognizerClient, NO_BANKNOTE};
pub use till::start_till_listener;
