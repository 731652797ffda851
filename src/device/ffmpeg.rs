//! ffmpeg-backed device API
//!
//! Devices come from configuration. A live call is an ffmpeg child that
//! pulls the camera's source URL and writes the requested HLS output; the
//! call ends when the child exits. Return audio goes out over UDP.

use async_trait::async_trait;
use bytes::Bytes;
use rtp::packet::Packet;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::device::{DeviceApi, DeviceInfo, LiveCall, MuxOptions, ReturnAudioSink};
use crate::error::DeviceError;

/// Device API over a static device list and a local ffmpeg
pub struct FfmpegDeviceApi {
    ffmpeg_path: String,
    devices: Vec<DeviceConfig>,
}

impl FfmpegDeviceApi {
    pub fn new(ffmpeg_path: impl Into<String>, devices: Vec<DeviceConfig>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            devices,
        }
    }

    fn device_config(&self, device_id: &str) -> Result<&DeviceConfig, DeviceError> {
        self.devices
            .iter()
            .find(|d| d.id == device_id)
            .ok_or_else(|| DeviceError::NotFound(device_id.to_string()))
    }

    /// Input-side arguments for a camera source
    fn input_args(source_url: &str) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
        ];
        if source_url.starts_with("rtsp://") {
            args.extend(["-rtsp_transport".to_string(), "tcp".to_string()]);
        }
        args.extend(["-i".to_string(), source_url.to_string()]);
        args
    }
}

#[async_trait]
impl DeviceApi for FfmpegDeviceApi {
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        Ok(self
            .devices
            .iter()
            .map(|d| DeviceInfo {
                id: d.id.clone(),
                name: d.name.clone(),
                model: d.model.clone(),
                battery_level: d.battery_level,
            })
            .collect())
    }

    async fn request_live_call(
        &self,
        device: &DeviceInfo,
        mux: MuxOptions,
    ) -> Result<Box<dyn LiveCall>, DeviceError> {
        let config = self.device_config(&device.id)?;

        let mut args = Self::input_args(&config.source_url);
        args.extend(mux.to_args());
        debug!("Spawning {} {}", self.ffmpeg_path, args.join(" "));

        let child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DeviceError::CallFailed(format!("failed to spawn {}: {}", self.ffmpeg_path, e)))?;

        let audio = match config.return_audio_addr {
            Some(addr) => match ReturnAudioSink::connect(addr) {
                Ok(sink) => Some(sink),
                Err(e) => {
                    warn!("Return audio unavailable for {}: {}", device.name, e);
                    None
                }
            },
            None => None,
        };

        info!(
            device_id = %device.id,
            pid = child.id().unwrap_or_default(),
            "Live call started for {}", device.name
        );

        Ok(Box::new(FfmpegCall::supervise(child, device.name.clone(), audio)))
    }

    async fn snapshot(&self, device: &DeviceInfo) -> Result<Bytes, DeviceError> {
        let config = self.device_config(&device.id)?;

        let mut args = Self::input_args(&config.source_url);
        args.extend(
            ["-frames:v", "1", "-f", "image2", "-c:v", "mjpeg", "-q:v", "2", "pipe:1"]
                .iter()
                .map(|s| s.to_string()),
        );

        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DeviceError::SnapshotFailed(e.to_string()))?;

        if !output.status.success() || output.stdout.is_empty() {
            return Err(DeviceError::SnapshotFailed(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(Bytes::from(output.stdout))
    }
}

/// Live call backed by a supervised ffmpeg child
pub struct FfmpegCall {
    stop_token: CancellationToken,
    ended: watch::Receiver<bool>,
    audio: Option<ReturnAudioSink>,
}

impl FfmpegCall {
    /// Hand the child to a supervisor task that owns it until it exits
    fn supervise(mut child: Child, label: String, audio: Option<ReturnAudioSink>) -> Self {
        let stop_token = CancellationToken::new();
        let (ended_tx, ended) = watch::channel(false);

        if let Some(stderr) = child.stderr.take() {
            let label = label.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[ffmpeg {}] {}", label, line);
                }
            });
        }

        let token = stop_token.clone();
        tokio::spawn(async move {
            let stop_requested = tokio::select! {
                status = child.wait() => {
                    match status {
                        Ok(status) => info!("ffmpeg for {} exited: {}", label, status),
                        Err(e) => warn!("ffmpeg for {} wait failed: {}", label, e),
                    }
                    false
                }
                _ = token.cancelled() => true,
            };
            if stop_requested {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill ffmpeg for {}: {}", label, e);
                }
                debug!("ffmpeg for {} killed", label);
            }
            let _ = ended_tx.send(true);
        });

        Self { stop_token, ended, audio }
    }
}

#[async_trait]
impl LiveCall for FfmpegCall {
    async fn activate_speaker(&self) -> Result<(), DeviceError> {
        if *self.ended.borrow() {
            return Err(DeviceError::CallEnded);
        }
        match &self.audio {
            Some(sink) => {
                debug!("Speaker path open towards {}", sink.target());
                Ok(())
            }
            None => Err(DeviceError::SpeakerUnavailable(
                "device has no return audio address".to_string(),
            )),
        }
    }

    async fn send_audio_packet(&self, packet: &Packet) -> Result<(), DeviceError> {
        match &self.audio {
            Some(sink) => sink.send(packet).await,
            None => Err(DeviceError::SpeakerUnavailable(
                "device has no return audio address".to_string(),
            )),
        }
    }

    async fn stop(&self) -> Result<(), DeviceError> {
        self.stop_token.cancel();
        let mut ended = self.ended.clone();
        // Err means the supervisor is gone, which only happens after it reported
        let _ = ended.wait_for(|ended| *ended).await;
        Ok(())
    }

    fn end_of_call(&self) -> watch::Receiver<bool> {
        self.ended.clone()
    }
}
