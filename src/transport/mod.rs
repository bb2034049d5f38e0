//! MQTT transport.
//!
//! Ships wire-format text records to the remote analysis collaborator over
//! MQTT. The client's connection event loop is drained on a background
//! thread; publishing enqueues and never blocks the evaluation tick on the
//! broker. A publish failure is surfaced to the caller and logged there; it
//! does not stop the coordinator.

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, MqttOptions};
use std::time::Duration;

use crate::report::ReportSink;

const DEFAULT_BROKER_ADDR: &str = "127.0.0.1:1883";
const DEFAULT_TOPIC: &str = "iot/detection";
const DEFAULT_CLIENT_ID: &str = "presenced";

/// MQTT sink settings.
#[derive(Clone, Debug)]
pub struct MqttSinkConfig {
    /// Broker address as `host:port`.
    pub broker_addr: String,
    pub topic: String,
    pub client_id: String,
}

impl Default for MqttSinkConfig {
    fn default() -> Self {
        Self {
            broker_addr: DEFAULT_BROKER_ADDR.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
        }
    }
}

/// Report sink publishing each record to one MQTT topic.
pub struct MqttSink {
    client: Client,
    topic: String,
    connection_handle: Option<std::thread::JoinHandle<()>>,
}

impl MqttSink {
    /// Connect to the broker and start the connection-draining thread.
    pub fn connect(config: &MqttSinkConfig) -> Result<Self> {
        let (host, port) = split_host_port(&config.broker_addr)?;
        let mut options = MqttOptions::new(&config.client_id, host, port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);

        let (client, connection) = Client::new(options, 10);
        let handle = spawn_connection_thread(connection);
        log::info!(
            "mqtt sink: publishing to {} on {}",
            config.topic,
            config.broker_addr
        );
        Ok(Self {
            client,
            topic: config.topic.clone(),
            connection_handle: Some(handle),
        })
    }

    /// Disconnect and join the connection thread.
    pub fn disconnect(mut self) -> Result<()> {
        self.client.disconnect()?;
        if let Some(handle) = self.connection_handle.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

impl ReportSink for MqttSink {
    fn publish(&self, message: &str) -> Result<()> {
        self.client
            .publish(
                self.topic.as_str(),
                QoS::AtLeastOnce,
                false,
                message.as_bytes().to_vec(),
            )
            .context("mqtt publish")?;
        Ok(())
    }

    fn name(&self) -> &str {
        "mqtt"
    }
}

impl Drop for MqttSink {
    fn drop(&mut self) {
        let _ = self.client.disconnect();
        if let Some(handle) = self.connection_handle.take() {
            let _ = handle.join();
        }
    }
}

fn spawn_connection_thread(mut connection: Connection) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    log::warn!("MQTT connection error: {}", e);
                    break;
                }
            }
        }
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port.parse().context("invalid MQTT port")?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    let port: u16 = port.parse().context("invalid MQTT port")?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_host_port_plain() {
        let (host, port) = split_host_port("127.0.0.1:1883").expect("split");
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 1883);
    }

    #[test]
    fn split_host_port_bracketed_ipv6() {
        let (host, port) = split_host_port("[::1]:1883").expect("split");
        assert_eq!(host, "::1");
        assert_eq!(port, 1883);
    }

    #[test]
    fn split_host_port_rejects_missing_port() {
        assert!(split_host_port("localhost").is_err());
        assert!(split_host_port("[::1]").is_err());
    }

    #[test]
    fn default_config_targets_local_detection_topic() {
        let cfg = MqttSinkConfig::default();
        assert_eq!(cfg.broker_addr, "127.0.0.1:1883");
        assert_eq!(cfg.topic, "iot/detection");
    }
}
