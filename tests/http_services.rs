//! HTTP service adapter tests
//!
//! Runs the completion, STT and TTS clients against a local mock server.

use aria_assistant::services::{CloudCompletion, CompletionParams, CompletionService};
use aria_assistant::voice::{SpeechToText, SttProvider, TextToSpeech, TtsProvider};
use aria_assistant::{ConversationHistory, ConversationMessage, HistorySnapshot, InteractionError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn history() -> HistorySnapshot {
    let mut history = ConversationHistory::with_system_prompt("You are ARIA.", 10);
    history.append(ConversationMessage::user("hello"));
    history.snapshot()
}

fn completion(server: &MockServer) -> CloudCompletion {
    CloudCompletion::new("sk-test".to_string(), server.uri()).unwrap()
}

#[tokio::test]
async fn test_completion_sends_history_and_trims_reply() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4",
            "max_tokens": 500,
            "messages": [
                {"role": "system", "content": "You are ARIA."},
                {"role": "user", "content": "hello"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "  hi there \n"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = completion(&server)
        .complete(history(), &CompletionParams::default())
        .await
        .unwrap();
    assert_eq!(reply, "hi there");
}

#[tokio::test]
async fn test_completion_empty_reply_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "   "}}]
        })))
        .mount(&server)
        .await;

    let result = completion(&server)
        .complete(history(), &CompletionParams::default())
        .await;
    assert!(matches!(
        result,
        Err(InteractionError::CompletionServiceError(_))
    ));
}

#[tokio::test]
async fn test_completion_http_error_is_surfaced() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let err = completion(&server)
        .complete(history(), &CompletionParams::default())
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.starts_with("AI Error: "), "got: {message}");
    assert!(message.contains("429"), "got: {message}");
    assert!(message.contains("rate limited"), "got: {message}");
}

#[tokio::test]
async fn test_whisper_transcription() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": " what time is it "})))
        .expect(1)
        .mount(&server)
        .await;

    let stt = SpeechToText::new(
        SttProvider::Whisper,
        "sk-test".to_string(),
        "whisper-1".to_string(),
        server.uri(),
    )
    .unwrap();

    let text = stt.transcribe(b"RIFF....WAVE").await.unwrap();
    assert_eq!(text, "what time is it");
}

#[tokio::test]
async fn test_deepgram_transcription() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/listen"))
        .and(query_param("model", "nova-2"))
        .and(header("authorization", "Token dg-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": {"channels": [{"alternatives": [{"transcript": "hello there"}]}]}
        })))
        .mount(&server)
        .await;

    let stt = SpeechToText::new(
        SttProvider::Deepgram,
        "dg-test".to_string(),
        "nova-2".to_string(),
        server.uri(),
    )
    .unwrap();

    assert_eq!(stt.transcribe(b"audio").await.unwrap(), "hello there");
}

#[tokio::test]
async fn test_stt_error_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let stt = SpeechToText::new(
        SttProvider::Whisper,
        "sk-test".to_string(),
        "whisper-1".to_string(),
        server.uri(),
    )
    .unwrap();

    let err = stt.transcribe(b"audio").await.unwrap_err();
    assert!(err.to_string().contains("upstream down"));
}

#[tokio::test]
async fn test_openai_tts_sends_voice_and_speed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/audio/speech"))
        .and(body_partial_json(json!({
            "model": "tts-1",
            "input": "hello",
            "voice": "nova",
            "speed": 0.75
        })))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xfb, 0x90, 0x00]))
        .expect(1)
        .mount(&server)
        .await;

    let tts = TextToSpeech::new(
        TtsProvider::OpenAI,
        "sk-test".to_string(),
        "tts-1".to_string(),
        server.uri(),
    )
    .unwrap();

    let audio = tts.synthesize("hello", "nova", 0.75).await.unwrap();
    assert_eq!(audio, [0xff, 0xfb, 0x90, 0x00]);
}

#[tokio::test]
async fn test_elevenlabs_tts_uses_voice_path() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/text-to-speech/voice-123"))
        .and(header("xi-api-key", "el-test"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp3".to_vec()))
        .mount(&server)
        .await;

    let tts = TextToSpeech::new(
        TtsProvider::ElevenLabs,
        "el-test".to_string(),
        "eleven_turbo_v2".to_string(),
        server.uri(),
    )
    .unwrap();

    assert_eq!(tts.synthesize("hi", "voice-123", 1.0).await.unwrap(), b"mp3");
}
