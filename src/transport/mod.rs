// src/transport/mod.rs
//! Transport layer: wire payloads, push/pull seams, HTTP transports and the fallback chain

pub mod fallback;
pub mod http;
pub mod simulated;
pub mod traits;
pub mod types;
pub mod websocket;

pub use fallback::{ChainSettings, FallbackChain, PullGuard, PullPermit, StreamTransports};
pub use http::{EventDecoder, EventStreamConnector, HttpPullSource, UnsupportedPush};
pub use traits::{PullSource, PushChannel, PushConnector};
pub use types::{
    parse_muscle_payload, parse_thermal_payload, MuscleEnvelope, MuscleMessage, RelaySnapshot,
    StreamEvent, ThermalMessage,
};
pub use websocket::WebSocketConnector;

use crate::config::constants::transport as paths;
use crate::config::{ConnectionMode, TelemetryConfig};
use crate::error::TransportError;
use crate::types::SensorKind;
use std::sync::Arc;

/// Resolved URLs for one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoints {
    /// `None` when the mode cannot push
    pub push: Option<String>,
    pub pull: String,
}

/// Map connection mode and sensor host onto concrete endpoints.
///
/// The muscle sensor always reports through the relay, so its endpoints come
/// from the relay base URL; only direct-link disables its event stream.
/// The thermal sensor is reached on the host in network mode, pushing over a
/// WebSocket, and through the relay otherwise, where it cannot push.
pub fn endpoints_for(
    config: &TelemetryConfig,
    stream: SensorKind,
    sensor_host: &str,
) -> StreamEndpoints {
    let relay = config.transport.relay_base_url.trim_end_matches('/');
    let mode = config.connection.mode;

    match stream {
        SensorKind::Muscle => StreamEndpoints {
            push: (mode != ConnectionMode::DirectLink)
                .then(|| format!("{}{}", relay, paths::RELAY_MUSCLE_PUSH_PATH)),
            pull: format!("{}{}", relay, paths::RELAY_MUSCLE_PULL_PATH),
        },
        SensorKind::Thermal => match mode {
            ConnectionMode::Network => StreamEndpoints {
                push: Some(format!("ws://{}:{}", sensor_host, config.transport.push_port)),
                pull: format!(
                    "http://{}:{}{}",
                    sensor_host,
                    config.transport.pull_port,
                    paths::SENSOR_THERMAL_PULL_PATH
                ),
            },
            ConnectionMode::ExternalBridge | ConnectionMode::DirectLink => StreamEndpoints {
                push: None,
                pull: format!("{}{}", relay, paths::RELAY_THERMAL_PULL_PATH),
            },
        },
    }
}

/// Build HTTP transports for a stream
pub fn http_transports(
    config: &TelemetryConfig,
    stream: SensorKind,
    sensor_host: &str,
) -> Result<StreamTransports, TransportError> {
    let endpoints = endpoints_for(config, stream, sensor_host);
    let pull: Arc<dyn PullSource> =
        Arc::new(HttpPullSource::new(endpoints.pull, config.transport.request_timeout_ms)?);

    let push: Option<Arc<dyn PushConnector>> = match (config.transport.enable_push, endpoints.push) {
        (false, _) => None,
        (true, Some(url)) if url.starts_with("ws://") || url.starts_with("wss://") => {
            Some(Arc::new(WebSocketConnector::new(url)))
        }
        (true, Some(url)) => Some(Arc::new(EventStreamConnector::new(url)?)),
        (true, None) => Some(Arc::new(UnsupportedPush::new(format!(
            "{} stream has no push channel in {} mode",
            stream, config.connection.mode
        )))),
    };

    Ok(StreamTransports { push, pull })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_mode_thermal_uses_sensor_host() {
        let config = TelemetryConfig::default();
        let endpoints = endpoints_for(&config, SensorKind::Thermal, "10.0.0.100");

        assert_eq!(endpoints.pull, "http://10.0.0.100:8091/thermal-data");
        assert_eq!(endpoints.push.as_deref(), Some("ws://10.0.0.100:8091"));
    }

    #[test]
    fn test_push_connector_follows_scheme() {
        let config = TelemetryConfig::default();

        let thermal = http_transports(&config, SensorKind::Thermal, "10.0.0.100").unwrap();
        assert_eq!(thermal.push.unwrap().endpoint(), "ws://10.0.0.100:8091");
        let muscle = http_transports(&config, SensorKind::Muscle, "10.0.0.100").unwrap();
        assert_eq!(muscle.push.unwrap().endpoint(), "http://localhost:3000/api/emg/stream");
    }

    #[test]
    fn test_direct_link_never_pushes() {
        let mut config = TelemetryConfig::default();
        config.connection.mode = ConnectionMode::DirectLink;

        for stream in SensorKind::ALL {
            assert!(endpoints_for(&config, stream, "ignored").push.is_none());
        }
        assert_eq!(
            endpoints_for(&config, SensorKind::Muscle, "ignored").pull,
            "http://localhost:3000/api/emg/data"
        );
    }

    #[test]
    fn test_bridge_mode_uses_relay() {
        let mut config = TelemetryConfig::default();
        config.connection.mode = ConnectionMode::ExternalBridge;
        config.transport.relay_base_url = "http://relay:3000/".to_string();

        let muscle = endpoints_for(&config, SensorKind::Muscle, "ignored");
        assert_eq!(muscle.push.as_deref(), Some("http://relay:3000/api/emg/stream"));
        let thermal = endpoints_for(&config, SensorKind::Thermal, "ignored");
        assert_eq!(thermal.pull, "http://relay:3000/api/thermal/bt");
    }

    #[test]
    fn test_http_transports_report_unsupported_push() {
        let mut config = TelemetryConfig::default();
        config.connection.mode = ConnectionMode::DirectLink;

        let transports = http_transports(&config, SensorKind::Thermal, "ignored").unwrap();
        assert!(transports.push.is_some());
        assert_eq!(transports.push.unwrap().endpoint(), "unsupported");

        config.transport.enable_push = false;
        let transports = http_transports(&config, SensorKind::Thermal, "ignored").unwrap();
        assert!(transports.push.is_none());
    }
}
