pub mod health;
pub mod session;

use axum::{
    routing::{get, patch, post, put},
    Router,
};

use crate::interview::handlers as interview;
use crate::results::handlers as results;
use crate::resume::handlers as resume;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/session", get(session::handle_get_session))
        .route("/api/v1/session/screen", put(session::handle_navigate))
        // Live interview
        .route("/api/v1/interview/start", post(interview::handle_start))
        .route(
            "/api/v1/interview/listen/start",
            post(interview::handle_listen_start),
        )
        .route(
            "/api/v1/interview/listen/cancel",
            post(interview::handle_listen_cancel),
        )
        .route(
            "/api/v1/interview/listen/error",
            post(interview::handle_listen_error),
        )
        .route(
            "/api/v1/interview/utterance",
            post(interview::handle_utterance),
        )
        .route(
            "/api/v1/interview/speech-complete",
            post(interview::handle_speech_complete),
        )
        .route("/api/v1/interview/frame", post(interview::handle_frame))
        .route("/api/v1/interview/end", post(interview::handle_end))
        .route("/api/v1/interview/status", get(interview::handle_status))
        .route("/api/v1/interview/events", get(interview::handle_events))
        // Results and roadmap
        .route(
            "/api/v1/results",
            get(results::handle_get_results).post(results::handle_generate_results),
        )
        .route(
            "/api/v1/roadmap/:id/toggle",
            patch(results::handle_toggle_roadmap_item),
        )
        // Resume analyzer
        .route("/api/v1/resume/score", post(resume::handle_score_resume))
        .route(
            "/api/v1/resume/score/upload",
            post(resume::handle_score_resume_upload),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::{Config, ProviderChoice};
    use crate::interview::orchestrator::fakes::{Reply, ScriptedProvider};
    use crate::models::results::RoadmapItem;
    use crate::provider::schema::fixtures;
    use crate::retry::RetryPolicy;
    use crate::session::Screen;

    fn state(provider: ScriptedProvider) -> AppState {
        let config = Config {
            provider: ProviderChoice::Gemini {
                api_key: "test".to_string(),
                model: "test-model".to_string(),
            },
            retry: RetryPolicy::default(),
            port: 0,
            rust_log: "info".to_string(),
        };
        AppState::new(config, Arc::new(provider))
    }

    fn app(provider: ScriptedProvider) -> Router {
        build_router(state(provider))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn start_body() -> Value {
        json!({
            "candidate_name": "Ada",
            "target_role": "Data Analyst",
            "interview_types": ["behavioral", "technical"]
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(&app(ScriptedProvider::default()), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_start_requires_an_interview_type() {
        let app = app(ScriptedProvider::default());
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/interview/start",
            Some(json!({ "candidate_name": "Ada", "target_role": "Analyst", "interview_types": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_interview_round_trip_over_http() {
        let app = app(ScriptedProvider::with_replies(vec![
            Reply::Fragments(vec!["Tell me about yourself."]),
            Reply::Fragments(vec!["Why this role?"]),
        ]));

        let (status, body) = call(&app, Method::POST, "/api/v1/interview/start", Some(start_body())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "reply");
        assert_eq!(body["utterance"]["text"], "Tell me about yourself.");

        // Still speaking: input is refused.
        let (status, _) = call(&app, Method::POST, "/api/v1/interview/listen/start", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&app, Method::POST, "/api/v1/interview/speech-complete", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&app, Method::POST, "/api/v1/interview/listen/start", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "listening");

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/interview/utterance",
            Some(json!({ "text": "I love data." })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["utterance"]["text"], "Why this role?");

        let (status, body) = call(&app, Method::POST, "/api/v1/interview/end", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "finished");

        let (_, session) = call(&app, Method::GET, "/api/v1/session", None).await;
        assert_eq!(session["current_screen"], "results");
        assert_eq!(session["transcript"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_status_before_start() {
        let app = app(ScriptedProvider::default());
        let (status, body) = call(&app, Method::GET, "/api/v1/interview/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "idle");
        assert_eq!(body["session_id"], Value::Null);
    }

    #[tokio::test]
    async fn test_results_without_interview_ask_for_restart() {
        let app = app(ScriptedProvider::default());
        let (status, body) = call(&app, Method::POST, "/api/v1/results", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "MISSING_PREREQUISITE");
    }

    #[tokio::test]
    async fn test_results_wait_for_interview_end() {
        let app = app(ScriptedProvider::with_replies(vec![Reply::Fragments(vec![
            "Tell me about yourself.",
        ])]));
        let (status, _) = call(&app, Method::POST, "/api/v1/interview/start", Some(start_body())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, Method::POST, "/api/v1/results", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_navigate_records_screen() {
        let app = app(ScriptedProvider::default());
        let (status, body) = call(
            &app,
            Method::PUT,
            "/api/v1/session/screen",
            Some(json!({ "screen": "resume_analyzer" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_screen"], "resume_analyzer");

        let (_, session) = call(&app, Method::GET, "/api/v1/session", None).await;
        assert_eq!(session["current_screen"], "resume_analyzer");
    }

    #[tokio::test]
    async fn test_toggle_unknown_roadmap_item() {
        let app = app(ScriptedProvider::default());
        let (status, _) = call(&app, Method::PATCH, "/api/v1/roadmap/nope/toggle", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_toggle_leaves_navigation_to_the_client() {
        let state = state(ScriptedProvider::default());
        {
            let mut session = state.session.lock().await;
            let items = fixtures::drafts(5)
                .into_iter()
                .enumerate()
                .map(|(i, d)| RoadmapItem::from_draft(format!("step-{i}"), d))
                .collect();
            session.context.replace_roadmap(items);
            session.context.navigate(Screen::Results);
        }
        let app = build_router(state);

        let (status, body) = call(&app, Method::PATCH, "/api/v1/roadmap/step-2/toggle", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "step-2");
        assert_eq!(body["completed"], true);

        let (_, session) = call(&app, Method::GET, "/api/v1/session", None).await;
        assert_eq!(session["current_screen"], "results");
        assert_eq!(session["roadmap"][2]["completed"], true);
        assert_eq!(session["roadmap"][1]["completed"], false);
    }

    #[tokio::test]
    async fn test_resume_score_validates_input() {
        let app = app(ScriptedProvider::default());
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/resume/score",
            Some(json!({ "resume_text": "  ", "job_description": "Analyst" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/resume/score",
            Some(json!({ "resume_text": "SQL, Python", "job_description": "Analyst" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["score"], 70);
    }

    #[tokio::test]
    async fn test_undecodable_frame_is_rejected() {
        let app = app(ScriptedProvider::default());
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/interview/frame")
                    .body(Body::from("not an image"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
