use castwire_mux::{Connection, CorrelatorConfig, MuxError, RequestCorrelator, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{CtrlError, Result};
use crate::ControllerOptions;

/// Namespace of the media channel exposed by media-capable applications.
pub const MEDIA_NAMESPACE: &str = "urn:x-cast:com.google.cast.media";

/// App id of the stock Default Media Receiver.
pub const DEFAULT_MEDIA_RECEIVER: &str = "CC1AD845";

const LOAD_FAILED: &str = "LOAD_FAILED";
const LOAD_CANCELLED: &str = "LOAD_CANCELLED";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamType {
    #[default]
    Buffered,
    Live,
    #[serde(other)]
    None,
}

/// The media item to load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaInfo {
    pub content_id: String,
    pub content_type: String,
    pub stream_type: StreamType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Duration in seconds; omitted when unknown.
    #[serde(rename = "duration", skip_serializing_if = "Option::is_none")]
    pub stream_duration: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tracks: Vec<MediaTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Value>,
}

impl MediaInfo {
    pub fn new(content_id: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            content_type: content_type.into(),
            ..Self::default()
        }
    }

    /// Set a generic title via the metadata object.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata = Some(json!({"metadataType": 0, "title": title.into()}));
        self
    }

    pub fn with_stream_type(mut self, stream_type: StreamType) -> Self {
        self.stream_type = stream_type;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrackType {
    #[default]
    Text,
    Audio,
    Video,
}

/// A text, audio or video track attached to a media item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaTrack {
    pub track_id: i64,
    #[serde(rename = "type")]
    pub track_type: TrackType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_content_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Options sent alongside `LOAD`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadOptions {
    pub autoplay: bool,
    /// Start position in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub active_track_ids: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Value>,
}

/// Playback state of one media session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaStatus {
    pub media_session_id: i64,
    pub playback_rate: f64,
    pub player_state: String,
    pub current_time: f64,
    pub supported_media_commands: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Value>,
}

#[derive(Deserialize)]
struct StatusReply {
    #[serde(default)]
    status: Vec<MediaStatus>,
}

#[derive(Serialize)]
struct LoadRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media: &'a MediaInfo,
    #[serde(flatten)]
    options: &'a LoadOptions,
}

/// Controls media playback inside a running application.
#[derive(Debug)]
pub struct MediaController {
    correlator: RequestCorrelator,
}

impl MediaController {
    /// `transport_id` is the application session's transport id.
    pub fn new(
        connection: &Connection,
        local_id: impl Into<String>,
        transport_id: impl Into<String>,
    ) -> Self {
        Self::with_options(connection, local_id, transport_id, ControllerOptions::default())
    }

    pub fn with_options(
        connection: &Connection,
        local_id: impl Into<String>,
        transport_id: impl Into<String>,
        options: ControllerOptions,
    ) -> Self {
        let channel = connection.channel(MEDIA_NAMESPACE, local_id, transport_id);
        let mut config = CorrelatorConfig {
            request_timeout: options.request_timeout,
            ..CorrelatorConfig::default()
        };
        config
            .error_types
            .extend([LOAD_FAILED.to_string(), LOAD_CANCELLED.to_string()]);
        Self {
            correlator: RequestCorrelator::with_request_ids(channel, config, options.request_ids),
        }
    }

    pub async fn get_status(&self) -> Result<Vec<MediaStatus>> {
        self.request_status(&json!({"type": "GET_STATUS"})).await
    }

    /// Load `media`; `LOAD_FAILED` / `LOAD_CANCELLED` become typed errors.
    pub async fn load(&self, media: &MediaInfo, options: &LoadOptions) -> Result<Vec<MediaStatus>> {
        let request = LoadRequest {
            kind: "LOAD",
            media,
            options,
        };
        match self.request_status(&request).await {
            Err(CtrlError::Mux(MuxError::Rejected { kind, .. })) if kind == LOAD_FAILED => {
                Err(CtrlError::LoadFailed)
            }
            Err(CtrlError::Mux(MuxError::Rejected { kind, .. })) if kind == LOAD_CANCELLED => {
                Err(CtrlError::LoadCancelled)
            }
            other => other,
        }
    }

    pub async fn play(&self, media_session_id: i64) -> Result<Vec<MediaStatus>> {
        self.session_command("PLAY", media_session_id).await
    }

    pub async fn pause(&self, media_session_id: i64) -> Result<Vec<MediaStatus>> {
        self.session_command("PAUSE", media_session_id).await
    }

    /// Seek to `position` seconds.
    pub async fn seek(&self, media_session_id: i64, position: f64) -> Result<Vec<MediaStatus>> {
        self.request_status(&json!({
            "type": "SEEK",
            "mediaSessionId": media_session_id,
            "currentTime": position,
        }))
        .await
    }

    /// Cancel in-flight requests.
    pub fn close(&self) {
        self.correlator.close();
    }

    async fn session_command(&self, kind: &str, media_session_id: i64) -> Result<Vec<MediaStatus>> {
        self.request_status(&json!({"type": kind, "mediaSessionId": media_session_id}))
            .await
    }

    async fn request_status<T: Serialize + ?Sized>(&self, request: &T) -> Result<Vec<MediaStatus>> {
        let response = self.correlator.request(request).await?;
        decode_status(&response)
    }
}

fn decode_status(response: &Response) -> Result<Vec<MediaStatus>> {
    let reply: StatusReply = serde_json::from_value(response.body.clone())?;
    Ok(reply.status)
}
