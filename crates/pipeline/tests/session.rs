//! Session paths, ordering and failure handling

mod common;

use futures::StreamExt;
use std::collections::HashMap;

use common::{engine, settings, settle, MockBackend, MockTransport, PRIMARY};
use tts_proxy_core::{AudioChunk, Error, FailureSignal, SentenceSegmenter, SynthesisRequest};
use tts_proxy_pipeline::{SessionState, SynthesisPath};

const TWO_SENTENCES: &str = "Hello there. How are you today?";
const THREE_SENTENCES: &str = "First one. Second one! Third one?";

fn request(text: &str) -> SynthesisRequest {
    SynthesisRequest::new(text, "amy").unwrap()
}

fn single(backend: MockBackend) -> MockTransport {
    MockTransport::new().with_backend(PRIMARY, backend)
}

#[tokio::test]
async fn test_cold_cache_without_streaming_is_segmented() {
    let (engine, log) = engine(single(MockBackend::up(false)), &settings(true, false));

    let stream = engine.synthesize(request(TWO_SENTENCES)).await.unwrap();
    assert_eq!(stream.path(), SynthesisPath::Segmented);
    let items: Vec<_> = stream.collect().await;
    assert!(items.iter().all(|item| item.is_ok()));

    let sentences = SentenceSegmenter::new().segment(TWO_SENTENCES);
    assert_eq!(sentences.len(), 2);
    assert_eq!(log.count("synthesize"), sentences.len());
    assert_eq!(log.count("synthesize tts-primary:10200 amy Hello there."), 1);
    assert_eq!(log.count("synthesize tts-primary:10200 amy How are you today?"), 1);
    // the liveness check's catalog decides the path
    assert_eq!(log.count("describe"), 1);
    assert_eq!(log.count("connect"), 1);
}

#[tokio::test]
async fn test_warm_cache_skips_query() {
    let (engine, log) = engine(single(MockBackend::up(true)), &settings(true, false));

    let first = engine.synthesize(request("Hi.")).await.unwrap();
    assert_eq!(first.path(), SynthesisPath::NativeStreaming);
    let _: Vec<_> = first.collect().await;
    settle().await;

    let second = engine.synthesize(request("Hi again.")).await.unwrap();
    assert_eq!(second.path(), SynthesisPath::NativeStreaming);
    let _: Vec<_> = second.collect().await;

    // one liveness check per session, no extra query
    assert_eq!(log.count("describe"), 2);
}

#[tokio::test]
async fn test_punctuation_only_sentences_are_not_sent() {
    let (engine, log) = engine(single(MockBackend::up(false)), &settings(true, false));

    let stream = engine.synthesize(request("?!")).await.unwrap();
    assert_eq!(stream.path(), SynthesisPath::Segmented);
    let chunks: Vec<AudioChunk> = stream.map(|item| item.unwrap()).collect().await;

    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].is_final);
    assert_eq!(log.count("synthesize"), 0);
}

#[tokio::test]
async fn test_override_beats_catalog() {
    let mut settings = settings(true, false);
    settings.synthesis.streaming_overrides = HashMap::from([("amy".to_string(), false)]);
    let (engine, log) = engine(single(MockBackend::up(true)), &settings);

    let stream = engine.synthesize(request(TWO_SENTENCES)).await.unwrap();
    assert_eq!(stream.path(), SynthesisPath::Segmented);
    // no capability query needed
    assert_eq!(log.count("describe"), 1);
}

#[tokio::test]
async fn test_sequence_and_single_final_chunk() {
    let (engine, _log) = engine(single(MockBackend::up(false)), &settings(true, false));

    let stream = engine.synthesize(request(THREE_SENTENCES)).await.unwrap();
    let chunks: Vec<AudioChunk> = stream.map(|item| item.unwrap()).collect().await;

    assert_eq!(chunks.len(), 3 * 2 + 1);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.sequence, i as u64);
    }
    let finals: Vec<_> = chunks.iter().filter(|c| c.is_final).collect();
    assert_eq!(finals.len(), 1);
    let last = chunks.last().unwrap();
    assert!(last.is_final);
    assert!(last.payload.is_empty());
    assert_eq!(&chunks[0].payload[..], b"First one.#0");
}

#[tokio::test]
async fn test_next_sentence_waits_for_forwarding() {
    let (engine, log) = engine(single(MockBackend::up(false)), &settings(true, false));

    let mut stream = engine.synthesize(request(TWO_SENTENCES)).await.unwrap();
    while let Some(item) = stream.next().await {
        let chunk = item.unwrap();
        log.push(format!("forwarded {}", chunk.sequence));
    }

    let order: Vec<_> = log
        .entries()
        .into_iter()
        .filter(|e| e.starts_with("synthesize") || e.starts_with("forwarded"))
        .collect();
    assert_eq!(
        order,
        vec![
            "synthesize tts-primary:10200 amy Hello there.",
            "forwarded 0",
            "forwarded 1",
            "synthesize tts-primary:10200 amy How are you today?",
            "forwarded 2",
            "forwarded 3",
            "forwarded 4",
        ]
    );
}

#[tokio::test]
async fn test_disconnect_mid_session_fails_without_more_requests() {
    let mut backend = MockBackend::up(false);
    backend.disconnect_after = Some(1);
    let (engine, log) = engine(single(backend), &settings(true, false));

    let mut stream = engine.synthesize(request(THREE_SENTENCES)).await.unwrap();

    let first = stream.next().await.unwrap().unwrap();
    let second = stream.next().await.unwrap().unwrap();
    assert_eq!(&first.payload[..], b"First one.#0");
    assert_eq!(&second.payload[..], b"First one.#1");

    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::MidStreamFailure { delivered: 2, .. }));
    assert_eq!(err.signal(), FailureSignal::Interrupted);
    assert!(stream.next().await.is_none());
    assert_eq!(stream.state(), SessionState::Failed);

    assert_eq!(log.count("synthesize tts-primary:10200 amy Third one?"), 0);
    assert_eq!(log.count("connect"), 1);
}

#[tokio::test]
async fn test_inactivity_timeout_fails_session() {
    let mut backend = MockBackend::up(true);
    backend.audio_stalls = true;
    let (engine, _log) = engine(single(backend), &settings(true, false));

    let mut stream = engine.synthesize(request("Hello.")).await.unwrap();
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::MidStreamFailure { delivered: 0, .. }));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_dropping_stream_cancels_session() {
    let (engine, log) = engine(single(MockBackend::up(false)), &settings(true, false));

    let mut stream = engine.synthesize(request(THREE_SENTENCES)).await.unwrap();
    let _ = stream.next().await.unwrap().unwrap();
    drop(stream);

    assert_eq!(log.count("synthesize"), 1);
    assert_eq!(log.count("drop"), 1);
}

#[tokio::test]
async fn test_state_transitions() {
    let (engine, _log) = engine(single(MockBackend::up(false)), &settings(true, false));

    let mut stream = engine.synthesize(request(TWO_SENTENCES)).await.unwrap();
    assert_eq!(stream.state(), SessionState::Segmented);

    stream.next().await.unwrap().unwrap();
    assert_eq!(stream.state(), SessionState::Delivering);

    while stream.next().await.is_some() {}
    assert_eq!(stream.state(), SessionState::Completed);
}

#[tokio::test]
async fn test_unknown_voice_rejected_once_catalog_known() {
    let (engine, log) = engine(single(MockBackend::up(false)), &settings(true, false));

    let stream = engine.synthesize(request("Warm up.")).await.unwrap();
    let _: Vec<_> = stream.collect().await;
    settle().await;
    let connects = log.count("connect");

    let err = engine
        .synthesize(SynthesisRequest::new("Hello.", "nobody").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
    assert_eq!(err.signal(), FailureSignal::Rejected);
    assert_eq!(log.count("connect"), connects);
}
