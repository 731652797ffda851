//! Control-channel messages between browser and relay
//!
//! JSON text frames carry `{"type": "<kebab-case name>", ...}`. Raw PCM for
//! `audio-data` normally travels as binary frames; a JSON form with a byte
//! array is accepted too.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Playback mode advertised in `stream-started`
pub const STREAM_MODE_HLS: &str = "hls";

/// Browser -> relay
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    StartStream {
        #[serde(rename = "deviceId")]
        device_id: String,
    },
    StopStream,
    ActivateMic,
    DeactivateMic,
    AudioData {
        #[serde(with = "bytes_as_array")]
        data: Bytes,
    },
}

impl ClientMessage {
    /// Binary frame -> `audio-data`
    pub fn audio(data: impl Into<Bytes>) -> Self {
        ClientMessage::AudioData { data: data.into() }
    }

    /// Name used on the wire, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::StartStream { .. } => "start-stream",
            ClientMessage::StopStream => "stop-stream",
            ClientMessage::ActivateMic => "activate-mic",
            ClientMessage::DeactivateMic => "deactivate-mic",
            ClientMessage::AudioData { .. } => "audio-data",
        }
    }
}

/// Relay -> browser
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    StreamStarted {
        #[serde(rename = "deviceId")]
        device_id: String,
        #[serde(rename = "deviceName")]
        device_name: String,
        mode: String,
        #[serde(rename = "playlistUrl")]
        playlist_url: String,
    },
    StreamError {
        error: String,
    },
    StreamEnded,
    StreamStopped,
    MicActivated,
    MicError {
        error: String,
    },
    MicDeactivated,
}

impl ServerMessage {
    pub fn stream_error(error: impl ToString) -> Self {
        ServerMessage::StreamError { error: error.to_string() }
    }

    pub fn mic_error(error: impl ToString) -> Self {
        ServerMessage::MicError { error: error.to_string() }
    }
}

mod bytes_as_array {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<u8>::deserialize(deserializer).map(Bytes::from)
    }
}
