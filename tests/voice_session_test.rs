//! Voice session integration tests
//!
//! Run the controller's event loop against the fake live model and fake
//! audio devices. Server events and microphone frames go through the same
//! channels the network and capture graph feed in production.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use studymate::config::{GenaiConfig, VoiceConfig};
use studymate::fakes::{FakeAudioDevices, FakeLiveModel};
use studymate::notify::NotificationCenter;
use studymate::providers::{AudioChunk, FunctionCall, LiveEvent, ServerMessage};
use studymate::voice::{VoiceController, VoiceSettings, VoiceState};

struct Session {
    controller: VoiceController,
    live: Arc<FakeLiveModel>,
    devices: Arc<FakeAudioDevices>,
    notices: Arc<NotificationCenter>,
}

fn session() -> Session {
    let live = Arc::new(FakeLiveModel::new());
    let devices = Arc::new(FakeAudioDevices::new());
    let notices = Arc::new(NotificationCenter::new(Duration::from_secs(3)));
    let settings = VoiceSettings::from_config(
        &GenaiConfig::default(),
        &VoiceConfig::default(),
        Some("Ada"),
    );
    let controller = VoiceController::new(live.clone(), devices.clone(), notices.clone(), settings);
    Session {
        controller,
        live,
        devices,
        notices,
    }
}

fn transcript(input: Option<&str>, output: Option<&str>, turn_complete: bool) -> LiveEvent {
    LiveEvent::Message(ServerMessage {
        input_transcription: input.map(str::to_string),
        output_transcription: output.map(str::to_string),
        turn_complete,
        ..Default::default()
    })
}

#[tokio::test]
async fn test_partial_transcripts_merge_into_one_final_turn() {
    let mut s = session();
    s.controller.toggle().await;
    assert_eq!(s.controller.state(), VoiceState::Connecting);

    let events = s.live.events().unwrap();
    events.send(LiveEvent::Open).await.unwrap();
    events.send(transcript(Some("Hel"), None, false)).await.unwrap();
    events.send(transcript(Some("lo"), None, false)).await.unwrap();
    events.send(transcript(None, None, true)).await.unwrap();
    events.send(LiveEvent::Close(None)).await.unwrap();

    s.controller.run().await;

    let turns = s.controller.transcript();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].user, "Hello");
    assert_eq!(turns[0].model, "");
    assert!(turns[0].is_final);
    assert_eq!(s.controller.state(), VoiceState::Idle);
}

#[tokio::test]
async fn test_microphone_frames_flow_while_listening() {
    let mut s = session();
    s.controller.toggle().await;
    let events = s.live.events().unwrap();
    events.send(LiveEvent::Open).await.unwrap();

    // Open first, so the frames arrive while listening.
    assert!(s.controller.step().await);
    assert_eq!(s.controller.state(), VoiceState::Listening);

    assert!(s.devices.push_frame(vec![0.0, 0.5]));
    assert!(s.devices.push_frame(vec![-1.0]));
    assert!(s.controller.step().await);
    assert!(s.controller.step().await);

    let sent = s.live.sent_audio();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|c| c.mime_type == "audio/pcm;rate=16000"));
    assert_eq!(STANDARD.decode(&sent[1].data).unwrap(), vec![0x00, 0x80]);

    s.controller.stop();
    assert_eq!(s.controller.state(), VoiceState::Idle);
    assert!(!s.devices.push_frame(vec![0.0]));
}

#[tokio::test]
async fn test_model_audio_plays_back_to_back() {
    let mut s = session();
    s.controller.toggle().await;
    s.devices.set_time(1.0);
    let events = s.live.events().unwrap();

    let chunk = |samples: usize| AudioChunk {
        data: STANDARD.encode(vec![0u8; samples * 2]),
        mime_type: "audio/pcm;rate=24000".to_string(),
    };
    events.send(LiveEvent::Open).await.unwrap();
    events
        .send(LiveEvent::Message(ServerMessage {
            audio: vec![chunk(24_000)],
            ..Default::default()
        }))
        .await
        .unwrap();
    events
        .send(LiveEvent::Message(ServerMessage {
            audio: vec![chunk(12_000)],
            ..Default::default()
        }))
        .await
        .unwrap();
    for _ in 0..3 {
        assert!(s.controller.step().await);
    }

    let played = s.devices.played();
    assert_eq!(played.len(), 2);
    let (_, start1, d1) = played[0];
    let (_, start2, _) = played[1];
    assert_eq!(start1, 1.0);
    assert!((d1 - 1.0).abs() < 1e-9);
    assert!(start2 >= start1 + d1);
}

#[tokio::test]
async fn test_light_tool_call_round_trip() {
    let mut s = session();
    s.controller.toggle().await;
    let events = s.live.events().unwrap();
    events.send(LiveEvent::Open).await.unwrap();
    events
        .send(LiveEvent::Message(ServerMessage {
            tool_calls: vec![FunctionCall {
                id: "call-1".to_string(),
                name: "controlLight".to_string(),
                args: serde_json::json!({"on": true, "color": "blue"}),
            }],
            ..Default::default()
        }))
        .await
        .unwrap();
    assert!(s.controller.step().await);
    assert!(s.controller.step().await);

    let responses = s.live.tool_responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].id, "call-1");
    assert_eq!(responses[0].name, "controlLight");
    assert_eq!(s.notices.active()[0].message, "Light turned on (blue)");
}

#[tokio::test]
async fn test_stream_error_tears_everything_down() {
    let mut s = session();
    s.controller.toggle().await;
    let events = s.live.events().unwrap();
    events.send(LiveEvent::Open).await.unwrap();
    events
        .send(LiveEvent::Error("connection reset".to_string()))
        .await
        .unwrap();

    s.controller.run().await;

    assert_eq!(s.controller.state(), VoiceState::Idle);
    assert_eq!(s.live.close_count(), 1);
    assert_eq!(s.devices.microphone_stops(), 1);
    assert_eq!(s.devices.outputs_closed(), 1);
    assert!(s
        .notices
        .active()
        .iter()
        .any(|n| n.message.contains("connection reset")));

    // A second stop after teardown is harmless
    s.controller.stop();
    assert_eq!(s.live.close_count(), 1);
}
