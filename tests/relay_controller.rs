//! Relay controller lifecycle against a scripted device

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use cam_relay::device::DeviceApi;
use cam_relay::error::{DeviceError, RelayError};
use cam_relay::relay::{AudioSendOutcome, RelayController, RelayState};

use common::{device, pcm_frame, relay_config, uplink_config, Behavior, MockDeviceApi, MAX_WAIT_MS};

fn controller(api: &Arc<MockDeviceApi>, dir: &std::path::Path) -> RelayController {
    let api: Arc<dyn DeviceApi> = api.clone();
    RelayController::new(
        api,
        device("D1", "Front Door"),
        relay_config(dir),
        uplink_config(),
        "/streams",
    )
}

#[tokio::test]
async fn test_start_then_stop_releases_everything() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockDeviceApi::new(Behavior::default()));
    let mut relay = controller(&api, dir.path());

    let url = relay.start(&CancellationToken::new()).await.unwrap();
    let session_id = relay.session_id().unwrap().to_string();

    assert_eq!(relay.state(), RelayState::Active);
    assert_eq!(url, format!("/streams/stream_{}.m3u8", session_id));
    assert_eq!(relay.playlist_url(), Some(url.as_str()));
    assert!(relay.can_send_audio());

    let playlist = dir.path().join(format!("stream_{}.m3u8", session_id));
    assert!(playlist.exists());

    relay.stop().await;
    assert_eq!(relay.state(), RelayState::Idle);
    assert_eq!(api.recorder.stop_calls(), 1);
    assert_eq!(api.recorder.active_calls(), 0);
    assert!(relay.playlist_url().is_none());
    assert!(!relay.can_send_audio());
    assert!(!playlist.exists());

    // Idempotent
    relay.stop().await;
    assert_eq!(api.recorder.stop_calls(), 1);
}

#[tokio::test]
async fn test_readiness_timeout_stops_call() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockDeviceApi::new(Behavior {
        ready_after: None,
        ..Behavior::default()
    }));
    let mut relay = controller(&api, dir.path());

    let err = relay.start(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, RelayError::ReadinessTimeout(ms) if ms == MAX_WAIT_MS));
    assert_eq!(relay.state(), RelayState::Idle);
    assert_eq!(api.recorder.calls_requested(), 1);
    assert_eq!(api.recorder.stop_calls(), 1);
    assert_eq!(api.recorder.active_calls(), 0);
    assert!(!relay.can_send_audio());
}

#[tokio::test]
async fn test_refused_call_is_start_failure() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockDeviceApi::new(Behavior {
        refuse_call: true,
        ..Behavior::default()
    }));
    let mut relay = controller(&api, dir.path());

    let err = relay.start(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, RelayError::StartFailed(DeviceError::CallFailed(_))));
    assert_eq!(relay.state(), RelayState::Idle);
    assert_eq!(api.recorder.stop_calls(), 0);
}

#[tokio::test]
async fn test_start_is_idempotent_while_active() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockDeviceApi::new(Behavior::default()));
    let mut relay = controller(&api, dir.path());
    let cancel = CancellationToken::new();

    let first = relay.start(&cancel).await.unwrap();
    let second = relay.start(&cancel).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(api.recorder.calls_requested(), 1);

    relay.stop().await;
}

#[tokio::test]
async fn test_cancel_while_waiting_stops_late_call() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockDeviceApi::new(Behavior {
        ready_after: None,
        ..Behavior::default()
    }));
    let mut relay = controller(&api, dir.path());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        trigger.cancel();
    });

    let err = relay.start(&cancel).await.unwrap_err();
    assert!(matches!(err, RelayError::Cancelled));
    assert_eq!(relay.state(), RelayState::Idle);
    assert_eq!(api.recorder.stop_calls(), 1);
    assert_eq!(api.recorder.active_calls(), 0);
}

#[tokio::test]
async fn test_cancelled_before_call_granted_still_stops_it() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockDeviceApi::new(Behavior::default()));
    let mut relay = controller(&api, dir.path());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = relay.start(&cancel).await.unwrap_err();
    assert!(matches!(err, RelayError::Cancelled));
    assert_eq!(api.recorder.calls_requested(), 1);
    assert_eq!(api.recorder.stop_calls(), 1);
    assert_eq!(api.recorder.active_calls(), 0);
}

#[tokio::test]
async fn test_call_ending_before_ready_fails_start() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockDeviceApi::new(Behavior {
        ready_after: None,
        ..Behavior::default()
    }));
    let mut relay = controller(&api, dir.path());

    let hangup = api.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        hangup.end_all_calls();
    });

    let err = relay.start(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, RelayError::StartFailed(DeviceError::CallEnded)));
    assert_eq!(relay.state(), RelayState::Idle);
    assert_eq!(api.recorder.active_calls(), 0);
}

#[tokio::test]
async fn test_remote_end_returns_to_idle() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockDeviceApi::new(Behavior::default()));
    let mut relay = controller(&api, dir.path());

    relay.start(&CancellationToken::new()).await.unwrap();
    assert!(relay.activate_microphone().await);

    let ended = relay.end_of_call().unwrap();
    api.end_all_calls();
    cam_relay::relay::controller::wait_until_ended(ended).await;

    relay.handle_call_ended().await;
    assert_eq!(relay.state(), RelayState::Idle);
    assert!(!relay.is_microphone_active());
    assert!(relay.end_of_call().is_none());
    // The device already hung up
    assert_eq!(api.recorder.stop_calls(), 0);
}

#[tokio::test]
async fn test_audio_before_activation_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockDeviceApi::new(Behavior::default()));
    let mut relay = controller(&api, dir.path());
    let frame = pcm_frame();

    // No call at all
    assert!(!relay.can_send_audio());
    assert_eq!(relay.send_audio_data(&frame).await, AudioSendOutcome::Dropped);
    assert!(!relay.activate_microphone().await);

    // Call but no uplink
    relay.start(&CancellationToken::new()).await.unwrap();
    assert_eq!(relay.send_audio_data(&frame).await, AudioSendOutcome::Dropped);
    assert!(api.recorder.packets().is_empty());

    relay.stop().await;
}

#[tokio::test]
async fn test_reactivation_restarts_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockDeviceApi::new(Behavior::default()));
    let mut relay = controller(&api, dir.path());
    let frame = pcm_frame();

    relay.start(&CancellationToken::new()).await.unwrap();

    assert!(relay.activate_microphone().await);
    assert_eq!(relay.send_audio_data(&frame).await, AudioSendOutcome::Sent);
    assert_eq!(relay.send_audio_data(&frame).await, AudioSendOutcome::Sent);

    relay.deactivate_microphone();
    assert_eq!(relay.send_audio_data(&frame).await, AudioSendOutcome::Dropped);

    assert!(relay.activate_microphone().await);
    assert_eq!(relay.send_audio_data(&frame).await, AudioSendOutcome::Sent);

    assert_eq!(api.recorder.seq_ts(), vec![(0, 0), (1, 960), (0, 0)]);
    for packet in api.recorder.packets() {
        assert_eq!(packet.header.payload_type, 111);
        assert_eq!(packet.header.version, 2);
        assert!(!packet.payload.is_empty());
    }

    relay.stop().await;
}

#[tokio::test]
async fn test_empty_buffer_is_dropped_without_advancing() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockDeviceApi::new(Behavior::default()));
    let mut relay = controller(&api, dir.path());

    relay.start(&CancellationToken::new()).await.unwrap();
    assert!(relay.activate_microphone().await);

    assert_eq!(relay.send_audio_data(&[]).await, AudioSendOutcome::Dropped);
    assert_eq!(relay.send_audio_data(&[7]).await, AudioSendOutcome::Dropped);
    assert_eq!(relay.send_audio_data(&pcm_frame()).await, AudioSendOutcome::Sent);
    assert_eq!(api.recorder.seq_ts(), vec![(0, 0)]);
    assert_eq!(api.recorder.send_attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(relay.is_microphone_active());

    relay.stop().await;
}

#[tokio::test]
async fn test_send_failure_keeps_uplink_running() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockDeviceApi::new(Behavior {
        fail_send_at: Some(2),
        ..Behavior::default()
    }));
    let mut relay = controller(&api, dir.path());
    let frame = pcm_frame();

    relay.start(&CancellationToken::new()).await.unwrap();
    assert!(relay.activate_microphone().await);

    assert_eq!(relay.send_audio_data(&frame).await, AudioSendOutcome::Sent);
    assert_eq!(relay.send_audio_data(&frame).await, AudioSendOutcome::SendFailed);
    assert!(relay.is_microphone_active());
    assert!(relay.can_send_audio());
    assert_eq!(relay.send_audio_data(&frame).await, AudioSendOutcome::Sent);

    // The rejected packet used (1, 960); the stream moves on past it
    assert_eq!(api.recorder.seq_ts(), vec![(0, 0), (2, 1920)]);
    assert_eq!(relay.uplink().unwrap().packetizer().sequence(), 3);

    relay.stop().await;
}

#[tokio::test]
async fn test_can_send_audio_follows_the_call() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockDeviceApi::new(Behavior::default()));
    let mut relay = controller(&api, dir.path());

    assert!(!relay.can_send_audio());
    relay.start(&CancellationToken::new()).await.unwrap();
    assert!(relay.can_send_audio());

    let ended = relay.end_of_call().unwrap();
    api.end_all_calls();
    cam_relay::relay::controller::wait_until_ended(ended).await;
    relay.handle_call_ended().await;
    assert!(!relay.can_send_audio());
}

#[tokio::test]
async fn test_speaker_refusal_reports_false() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockDeviceApi::new(Behavior {
        speaker_ok: false,
        ..Behavior::default()
    }));
    let mut relay = controller(&api, dir.path());

    relay.start(&CancellationToken::new()).await.unwrap();
    assert!(!relay.activate_microphone().await);
    assert!(!relay.is_microphone_active());

    relay.stop().await;
}
