//! MQTT listener for session requests from the POS till
//!
//! The till publishes the amount due for a new customer as JSON on the
//! configured topic; each message starts one cashier session. Amounts are
//! forwarded via try_send so the MQTT event loop never blocks on a session
//! in progress.

use crate::infra::config::Config;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// A session request from the till.
#[derive(Debug, Deserialize)]
struct TillRequest {
    amount_due: i64,
}

/// Start the till listener and forward session amounts to the channel.
pub async fn start_till_listener(
    config: &Config,
    session_tx: mpsc::Sender<i64>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client_id = format!("{}-till-{}", config.robot_id(), std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    // Set credentials if configured
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 32);
    client.subscribe(config.till_topic(), QoS::AtLeastOnce).await?;

    info!(topic = %config.till_topic(), host = %config.mqtt_host(), port = %config.mqtt_port(), "till_listener_subscribed");

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            // Check for shutdown signal
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("till_listener_shutdown");
                    return Ok(());
                }
            }
            // Process MQTT events
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let request: TillRequest = match serde_json::from_slice(&publish.payload) {
                            Ok(request) => request,
                            Err(e) => {
                                warn!(error = %e, topic = %publish.topic, "till_message_invalid");
                                continue;
                            }
                        };

                        if request.amount_due == 0 {
                            warn!("till_zero_amount_ignored");
                            continue;
                        }

                        info!(amount_due = %request.amount_due, "till_session_request");

                        match session_tx.try_send(request.amount_due) {
                            Ok(()) => {}
                            Err(TrySendError::Full(amount)) => {
                                if last_drop_warn.elapsed() >= Duration::from_secs(1) {
                                    warn!(amount_due = %amount, "till_request_dropped_backlog");
                                    last_drop_warn = Instant::now();
                                }
                            }
                            Err(TrySendError::Closed(_)) => {
                                info!("till_listener_channel_closed");
                                return Ok(());
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "till_mqtt_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}
