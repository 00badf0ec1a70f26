//! Upload endpoint integration tests
//!
//! Validation happens before any state exists: every rejection is a 400
//! with `{"error": ...}` and leaves the processes table empty.

mod helpers;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use helpers::*;

#[tokio::test]
async fn valid_upload_returns_202_with_process_id() {
    let app = TestApp::new(StubAnalyzer::returning(&[(7, "Sang a song")])).await;

    let (status, body) = json_response(app.send(valid_upload("audio/wav", "12")).await).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let process_id = body["process_id"].as_i64().expect("process_id should be an integer");
    assert_eq!(app.process_count().await, 1);

    app.wait_for_terminal(process_id).await;
}

#[tokio::test]
async fn content_type_parameters_and_case_are_ignored() {
    let app = TestApp::new(StubAnalyzer::returning(&[(7, "Sang")])).await;

    let response = app.send(valid_upload("Audio/WebM;codecs=opus", "12")).await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    app.wait_idle().await;
}

#[tokio::test]
async fn disallowed_content_type_is_rejected_without_process() {
    let analyzer = StubAnalyzer::returning(&[(7, "Sang")]);
    let app = TestApp::new(analyzer.clone()).await;

    let (status, body) = json_response(app.send(valid_upload("video/mp4", "12")).await).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("video/mp4"));
    assert_eq!(app.process_count().await, 0);
    assert_eq!(analyzer.calls(), 0);
}

#[tokio::test]
async fn oversize_audio_is_rejected() {
    let app = TestApp::new(StubAnalyzer::returning(&[(7, "Sang")])).await;
    let audio = vec![0u8; 4096];

    let (status, body) = json_response(
        app.send(upload_request(&[
            Part::File("audio", "audio/wav", &audio),
            Part::Text("teacher_id", "12"),
            Part::Text("timestamp", OBSERVED_AT),
        ]))
        .await,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("maximum size"));
    assert_eq!(app.process_count().await, 0);
}

#[tokio::test]
async fn body_far_beyond_limit_is_rejected() {
    let app = TestApp::new(StubAnalyzer::returning(&[(7, "Sang")])).await;
    let audio = vec![0u8; 256 * 1024];

    let (status, _) = json_response(
        app.send(upload_request(&[
            Part::File("audio", "audio/wav", &audio),
            Part::Text("teacher_id", "12"),
            Part::Text("timestamp", OBSERVED_AT),
        ]))
        .await,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.process_count().await, 0);
}

#[tokio::test]
async fn missing_audio_part_is_rejected() {
    let app = TestApp::new(StubAnalyzer::returning(&[(7, "Sang")])).await;

    let (status, body) = json_response(
        app.send(upload_request(&[
            Part::Text("teacher_id", "12"),
            Part::Text("timestamp", OBSERVED_AT),
        ]))
        .await,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("audio"));
    assert_eq!(app.process_count().await, 0);
}

#[tokio::test]
async fn missing_teacher_or_bad_timestamp_is_rejected() {
    let app = TestApp::new(StubAnalyzer::returning(&[(7, "Sang")])).await;

    let (status, _) = json_response(
        app.send(upload_request(&[
            Part::File("audio", "audio/wav", b"data"),
            Part::Text("timestamp", OBSERVED_AT),
        ]))
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = json_response(
        app.send(upload_request(&[
            Part::File("audio", "audio/wav", b"data"),
            Part::Text("teacher_id", "12"),
            Part::Text("timestamp", "14.05.2024 10:15"),
        ]))
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("timestamp"));

    assert_eq!(app.process_count().await, 0);
}

#[tokio::test]
async fn non_multipart_body_is_rejected() {
    let app = TestApp::new(StubAnalyzer::returning(&[(7, "Sang")])).await;

    let (status, body) = json_response(
        app.send(
            Request::builder()
                .method("POST")
                .uri("/api/v1/audio/upload")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"audio": "nope"}"#))
                .unwrap(),
        )
        .await,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert_eq!(app.process_count().await, 0);
}

#[tokio::test]
async fn untracked_upload_is_accepted_with_null_process_id() {
    let analyzer = StubAnalyzer::returning(&[(7, "Sang")]);
    let app = TestApp::build(analyzer.clone(), test_config(), Stores::NoProcesses).await;

    let (status, body) = json_response(app.send(valid_upload("audio/wav", "12")).await).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["process_id"].is_null());

    app.wait_idle().await;
    assert_eq!(analyzer.calls(), 1);
    assert_eq!(app.entry_count().await, 1);
}

#[tokio::test]
async fn untracked_upload_is_refused_when_tracking_required() {
    let analyzer = StubAnalyzer::returning(&[(7, "Sang")]);
    let mut config = test_config();
    config.pipeline.require_tracking = true;
    let app = TestApp::build(analyzer.clone(), config, Stores::NoProcesses).await;

    let (status, body) = json_response(app.send(valid_upload("audio/wav", "12")).await).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
    assert_eq!(analyzer.calls(), 0);
}

#[tokio::test]
async fn api_token_is_enforced_when_configured() {
    let mut config = test_config();
    config.api_token = Some("s3cret".to_string());
    let app = TestApp::build(StubAnalyzer::returning(&[(7, "Sang")]), config, Stores::Sqlite).await;

    let (status, body) = json_response(app.send(valid_upload("audio/wav", "12")).await).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let mut wrong = valid_upload("audio/wav", "12");
    wrong
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer guess".parse().unwrap());
    assert_eq!(app.send(wrong).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.process_count().await, 0);

    let mut authorized = valid_upload("audio/wav", "12");
    authorized
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer s3cret".parse().unwrap());
    assert_eq!(app.send(authorized).await.status(), StatusCode::ACCEPTED);

    let mut lowercase_scheme = valid_upload("audio/wav", "12");
    lowercase_scheme
        .headers_mut()
        .insert(header::AUTHORIZATION, "bearer s3cret".parse().unwrap());
    assert_eq!(app.send(lowercase_scheme).await.status(), StatusCode::ACCEPTED);

    // Health stays open
    let (status, _) = app.get_json("/health").await;
    assert_eq!(status, StatusCode::OK);

    app.wait_idle().await;
}
