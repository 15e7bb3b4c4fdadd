//! HTTP surface against a fake wire-protocol backend over TCP

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use bytes::Bytes;
use serde_json::{json, Map, Value};
use std::io::Cursor;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tower::ServiceExt;

use tts_proxy_config::{BackendConfig, Settings};
use tts_proxy_pipeline::SynthesisEngine;
use tts_proxy_server::{create_router, AppState};
use tts_proxy_transport::{messages, read_event, write_event, Event, TcpTransport};

fn data(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("not an object"),
    }
}

/// Non-streaming backend: every synthesize yields two 4-byte chunks
async fn spawn_backend() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (read_half, mut write_half) = stream.into_split();
                let mut reader = BufReader::new(read_half);
                while let Ok(Some(event)) = read_event(&mut reader).await {
                    let replies = if event.is(messages::DESCRIBE) {
                        vec![Event::new(messages::INFO).with_data(data(json!({
                            "tts": [{
                                "name": "piper",
                                "supports_synthesize_streaming": false,
                                "voices": [{"name": "amy", "languages": ["en_US"]}]
                            }]
                        })))]
                    } else if event.is(messages::SYNTHESIZE) {
                        let format = data(json!({"rate": 16000, "width": 2, "channels": 1}));
                        vec![
                            Event::new(messages::AUDIO_START).with_data(format.clone()),
                            Event::new(messages::AUDIO_CHUNK)
                                .with_data(format.clone())
                                .with_payload(Bytes::from_static(&[1, 0, 2, 0])),
                            Event::new(messages::AUDIO_CHUNK)
                                .with_data(format)
                                .with_payload(Bytes::from_static(&[3, 0, 4, 0])),
                            Event::new(messages::AUDIO_STOP),
                        ]
                    } else {
                        vec![]
                    };
                    for reply in replies {
                        if write_event(&mut write_half, &reply).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });

    port
}

async fn app() -> axum::Router {
    let port = spawn_backend().await;
    let mut settings = Settings::default();
    settings.backends.primary = Some(BackendConfig::new("127.0.0.1", port));
    settings.synthesis.default_voice = "amy".to_string();

    let engine = SynthesisEngine::new(Arc::new(TcpTransport::new()), &settings).unwrap();
    engine.refresh_backends().await;
    create_router(AppState::new(settings, engine))
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_streaming_wav() {
    let response = app()
        .await
        .oneshot(post("/api/tts", json!({"text": "Hello there. How are you today?"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");
    assert_eq!(response.headers()["x-tts-path"], "segmented");

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[0..4], b"RIFF");
    // two sentences, two 4-byte chunks each
    assert_eq!(body.len(), 44 + 2 * 2 * 4);
    assert_eq!(&body[44..48], &[1, 0, 2, 0]);
}

#[tokio::test]
async fn test_complete_wav() {
    let response = app()
        .await
        .oneshot(post("/api/tts/complete", json!({"text": "Hello.", "voice": "amy"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let mut reader = hound::WavReader::new(Cursor::new(body.to_vec())).unwrap();
    assert_eq!(reader.spec().sample_rate, 16000);
    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(samples, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_unknown_voice_rejected() {
    let response = app()
        .await
        .oneshot(post("/api/tts", json!({"text": "Hello.", "voice": "nobody"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_voices_and_ready() {
    let app = app().await;

    let response = app
        .clone()
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::get("/api/voices").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let voices: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(voices["default_voice"], "amy");
    assert_eq!(voices["backends"][0]["role"], "primary");
    assert_eq!(voices["backends"][0]["reachable"], true);
    assert!(voices["backends"][0]["voices"]["voices"]["amy"].is_object());
}
