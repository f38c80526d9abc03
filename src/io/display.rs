//! MQTT publisher for the head-screen renderer
//!
//! The core never renders anything itself; it publishes image identifiers
//! (QoS 0, fire-and-forget) and the screen process shows the matching file.

use crate::infra::config::Config;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Images the head screen can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayImage {
    EyesNormal,
    EyesFocusing,
    EyesFocusingLeft,
    EyesFocusingRight,
    /// Confirmation for a recognised denomination.
    BillRecognised(i64),
    RecognitionFailed,
}

impl DisplayImage {
    pub fn file_name(&self) -> &'static str {
        match self {
            DisplayImage::EyesNormal => "normal_eyes.png",
            DisplayImage::EyesFocusing => "looking_eyes.png",
            DisplayImage::EyesFocusingLeft => "looking_left_eyes.png",
            DisplayImage::EyesFocusingRight => "looking_right_eyes.png",
            DisplayImage::BillRecognised(5) => "five_bill_recognised.png",
            DisplayImage::BillRecognised(_) => "one_bill_recognised.png",
            DisplayImage::RecognitionFailed => "unable_to_recognise.png",
        }
    }
}

/// Head-screen output consumed by the orchestrator and the idle animation.
#[async_trait]
pub trait HeadDisplay: Send + Sync {
    /// Fire-and-forget; no return value is consumed by the core.
    async fn show(&self, image: DisplayImage);
}

/// MQTT-backed display publisher.
pub struct MqttDisplay {
    client: AsyncClient,
    topic: String,
}

impl MqttDisplay {
    /// Create a new display publisher.
    ///
    /// Connects to the broker at the configured MQTT host/port and spawns
    /// the event loop handler.
    pub fn new(config: &Config) -> Self {
        let client_id = format!("{}-display-{}", config.robot_id(), std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        // Set credentials if configured
        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 32);

        // Spawn the eventloop handler
        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("display_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "display_connection_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self { client, topic: config.display_topic().to_string() }
    }
}

#[async_trait]
impl HeadDisplay for MqttDisplay {
    async fn show(&self, image: DisplayImage) {
        let payload = serde_json::json!({ "image": image.file_name() }).to_string();

        if let Err(e) =
            self.client.publish(&self.topic, QoS::AtMostOnce, false, payload.as_bytes()).await
        {
            debug!(error = %e, image = %image.file_name(), "display_publish_failed");
        } else {
            debug!(image = %image.file_name(), "display_image_shown");
        }
    }
}
