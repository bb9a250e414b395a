use castwire_mux::{Connection, CorrelatorConfig, MuxError, RequestCorrelator, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{CtrlError, Result};
use crate::ControllerOptions;

/// Namespace of the receiver platform's application manager.
pub const RECEIVER_NAMESPACE: &str = "urn:x-cast:com.google.cast.receiver";

const LAUNCH_ERROR: &str = "LAUNCH_ERROR";

/// Receiver platform status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiverStatus {
    #[serde(default)]
    pub applications: Vec<ApplicationSession>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Volume>,
}

impl ReceiverStatus {
    /// The application session running `app_id`, if any.
    pub fn application(&self, app_id: &str) -> Option<&ApplicationSession> {
        self.applications
            .iter()
            .find(|app| app.app_id.as_deref() == Some(app_id))
    }
}

/// A running receiver application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub namespaces: Vec<AppNamespace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_id: Option<String>,
}

impl ApplicationSession {
    pub fn supports(&self, namespace: &str) -> bool {
        self.namespaces.iter().any(|ns| ns.name == namespace)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppNamespace {
    pub name: String,
}

/// Receiver volume. Unset fields are left unchanged by `SET_VOLUME`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
}

#[derive(Deserialize)]
struct StatusReply {
    #[serde(default)]
    status: Option<ReceiverStatus>,
}

/// Controls the receiver platform: status, volume and application lifecycle.
#[derive(Debug)]
pub struct ReceiverController {
    correlator: RequestCorrelator,
}

impl ReceiverController {
    pub fn new(
        connection: &Connection,
        local_id: impl Into<String>,
        peer_id: impl Into<String>,
    ) -> Self {
        Self::with_options(connection, local_id, peer_id, ControllerOptions::default())
    }

    pub fn with_options(
        connection: &Connection,
        local_id: impl Into<String>,
        peer_id: impl Into<String>,
        options: ControllerOptions,
    ) -> Self {
        let channel = connection.channel(RECEIVER_NAMESPACE, local_id, peer_id);
        let mut config = CorrelatorConfig {
            request_timeout: options.request_timeout,
            ..CorrelatorConfig::default()
        };
        config.error_types.push(LAUNCH_ERROR.to_string());
        Self {
            correlator: RequestCorrelator::with_request_ids(channel, config, options.request_ids),
        }
    }

    pub async fn get_status(&self) -> Result<ReceiverStatus> {
        self.request_status(json!({"type": "GET_STATUS"})).await
    }

    pub async fn set_volume(&self, level: f64) -> Result<ReceiverStatus> {
        let volume = Volume {
            level: Some(level.clamp(0.0, 1.0)),
            muted: None,
        };
        self.request_status(json!({"type": "SET_VOLUME", "volume": volume}))
            .await
    }

    pub async fn set_muted(&self, muted: bool) -> Result<ReceiverStatus> {
        let volume = Volume {
            level: None,
            muted: Some(muted),
        };
        self.request_status(json!({"type": "SET_VOLUME", "volume": volume}))
            .await
    }

    /// Launch `app_id`; `LAUNCH_ERROR` becomes [`CtrlError::LaunchFailed`].
    pub async fn launch(&self, app_id: &str) -> Result<ReceiverStatus> {
        let reply = self
            .correlator
            .request(&json!({"type": "LAUNCH", "appId": app_id}))
            .await;
        match reply {
            Ok(response) => {
                debug!(app_id, "application launched");
                decode_status(&response)
            }
            Err(MuxError::Rejected { kind, reason }) if kind == LAUNCH_ERROR => {
                Err(CtrlError::LaunchFailed(reason))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Stop the application session `session_id`.
    pub async fn stop(&self, session_id: &str) -> Result<ReceiverStatus> {
        self.request_status(json!({"type": "STOP", "sessionId": session_id}))
            .await
    }

    /// Cancel in-flight requests.
    pub fn close(&self) {
        self.correlator.close();
    }

    async fn request_status(&self, request: serde_json::Value) -> Result<ReceiverStatus> {
        let response = self.correlator.request(&request).await?;
        decode_status(&response)
    }
}

fn decode_status(response: &Response) -> Result<ReceiverStatus> {
    let reply: StatusReply = serde_json::from_value(response.body.clone())?;
    Ok(reply.status.unwrap_or_default())
}
