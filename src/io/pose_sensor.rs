//! HTTP client for the hand-pose sensing service
//!
//! The sensing service runs a body tracker asynchronously from the decision
//! loop and reports each hand's last known pose together with its age. A
//! report with `found = false` maps to the empty-pose sentinel.

use crate::domain::types::{HandPoses, Pose};
use crate::io::{ServiceError, ServiceResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Hand-pose sensing capability consumed by the orchestrator.
#[async_trait]
pub trait HandPoseSensor: Send + Sync {
    /// Both hand poses for the given tracker user slot. Sides in the result
    /// are the customer's anatomical sides.
    async fn hand_poses(&self, user_id: u32) -> ServiceResult<HandPoses>;
}

/// One hand's report from the sensing service.
#[derive(Debug, Deserialize)]
struct PoseReport {
    found: bool,
    #[serde(default)]
    translation: [f64; 3],
    #[serde(default)]
    rotation: [f64; 4],
    /// Age of the detection at response time
    #[serde(default)]
    age_ms: u64,
}

impl PoseReport {
    fn into_pose(self) -> Pose {
        if !self.found {
            return Pose::empty();
        }
        let [x, y, z] = self.translation;
        let [qx, qy, qz, qw] = self.rotation;
        Pose::new(x, y, z, qx, qy, qz, qw).with_age(Duration::from_millis(self.age_ms))
    }
}

/// Thin reqwest client for the sensing service.
pub struct PoseSensorClient {
    base_url: String,
    client: reqwest::Client,
}

impl PoseSensorClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .http1_only()
            .build()
            .unwrap_or_default();
        Self { base_url: base_url.trim_end_matches('/').to_string(), client }
    }

    async fn fetch_hand(&self, user_id: u32, body_part: &str) -> ServiceResult<Pose> {
        let url = format!("{}/pose/{}/{}", self.base_url, user_id, body_part);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ServiceError::unavailable("pose_sensor", e))?;

        if !response.status().is_success() {
            return Err(ServiceError::unavailable("pose_sensor", response.status()));
        }

        let report: PoseReport = response
            .json()
            .await
            .map_err(|e| ServiceError::unavailable("pose_sensor", e))?;

        debug!(body_part = %body_part, found = %report.found, age_ms = %report.age_ms, "hand_pose_fetched");
        Ok(report.into_pose())
    }
}

#[async_trait]
impl HandPoseSensor for PoseSensorClient {
    async fn hand_poses(&self, user_id: u32) -> ServiceResult<HandPoses> {
        // The skeleton tracker labels hands mirrored, so the opposite body
        // part is requested for each side and the result re-labelled.
        let left = self.fetch_hand(user_id, "right_hand").await?;
        let right = self.fetch_hand(user_id, "left_hand").await?;

        Ok(HandPoses { left, right })
    }
}
