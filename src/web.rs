/// Temperature from the upload form; the slider only ever sends 0.0..=1.0.
pub fn parse_temperature(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("temperature must be a number, got '{}'", raw))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("temperature must be between 0.0 and 1.0, got {}", value));
    }
    Ok(value)
}

#[cfg(feature = "web-server")]
pub mod server {
    use axum::{
        extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
        http::{header::CONTENT_LENGTH, HeaderMap, StatusCode},
        response::{Html, IntoResponse, Response},
        routing::{get, post},
        Json, Router,
    };
    use serde::Serialize;
    use std::sync::Arc;

    use super::parse_temperature;
    use crate::error::NutriError;
    use crate::handlers::analysis::{DEFAULT_PROMPT, DEFAULT_TEMPERATURE};
    use crate::handlers::AnalysisHandler;
    use crate::models::{AnalysisOutcome, UploadedImage};
    use crate::services::image_prep::{encode_payload, MAX_UPLOAD_BYTES};

    /// Multipart overhead on top of the 4 MiB image limit. Bodies past this are
    /// cut off by axum and reported as an oversized upload.
    const BODY_LIMIT_BYTES: usize = 8 * 1024 * 1024;

    #[derive(Clone)]
    pub struct AppState {
        pub handler: Arc<AnalysisHandler>,
    }

    #[derive(Debug, Serialize)]
    pub struct ErrorBody {
        pub error: String,
    }

    #[derive(Debug, Serialize)]
    pub struct AnalyzeResponse {
        pub kind: &'static str,
        pub text: String,
        /// Data URI of the prepared image, what was actually sent.
        pub preview: Option<String>,
    }

    impl AnalyzeResponse {
        fn new(outcome: AnalysisOutcome, preview: Option<String>) -> Self {
            Self {
                kind: outcome.kind(),
                text: outcome.into_text(),
                preview,
            }
        }
    }

    pub fn create_router(handler: Arc<AnalysisHandler>) -> Router {
        let state = Arc::new(AppState { handler });

        Router::new()
            .route("/", get(index_page))
            .route("/analyze", post(analyze_handler))
            .route("/health", get(health_check))
            .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
            .with_state(state)
    }

    /// HTTP status for errors raised before the request is dispatched.
    fn status_for(err: &NutriError) -> StatusCode {
        match err {
            NutriError::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            NutriError::UnsupportedFormat(_) | NutriError::Decode(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            NutriError::Configuration(_) | NutriError::Encode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
        (
            status,
            Json(ErrorBody {
                error: message.into(),
            }),
        )
            .into_response()
    }

    fn rejection_response(err: &NutriError) -> Response {
        error_response(status_for(err), format!("❌ {}", err))
    }

    /// Body-limit hits surface as multipart errors; they mean "too large", not "malformed".
    fn form_error_response(err: MultipartError, content_length: Option<u64>) -> Response {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            log::warn!("⚠️ Upload body exceeded {} bytes", BODY_LIMIT_BYTES);
            let size = content_length.unwrap_or(BODY_LIMIT_BYTES as u64 + 1);
            return rejection_response(&NutriError::UploadTooLarge {
                size,
                limit: MAX_UPLOAD_BYTES,
            });
        }

        log::error!("❌ Malformed upload form: {}", err);
        error_response(err.status(), format!("Malformed upload: {}", err))
    }

    async fn analyze_handler(
        State(state): State<Arc<AppState>>,
        headers: HeaderMap,
        mut multipart: Multipart,
    ) -> Response {
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let mut upload: Option<UploadedImage> = None;
        let mut prompt: Option<String> = None;
        let mut temperature = DEFAULT_TEMPERATURE;

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => return form_error_response(e, content_length),
            };

            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);

            match name.as_str() {
                "image" => match field.bytes().await {
                    Ok(bytes) if !bytes.is_empty() => {
                        upload = Some(UploadedImage::new(bytes.to_vec(), file_name));
                    }
                    Ok(_) => {}
                    Err(e) => return form_error_response(e, content_length),
                },
                "prompt" | "temperature" => {
                    let text = match field.text().await {
                        Ok(text) => text,
                        Err(e) => return form_error_response(e, content_length),
                    };
                    if name == "prompt" {
                        if !text.trim().is_empty() {
                            prompt = Some(text);
                        }
                    } else {
                        temperature = match parse_temperature(&text) {
                            Ok(value) => value,
                            Err(msg) => return error_response(StatusCode::BAD_REQUEST, msg),
                        };
                    }
                }
                other => log::debug!("Ignoring unknown form field: {}", other),
            }
        }

        let Some(upload) = upload else {
            return error_response(StatusCode::BAD_REQUEST, "Please upload a meal image first.");
        };
        let prompt = prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_string());

        let image = match state.handler.prepare_upload(&upload) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("⚠️ Upload rejected: {}", e);
                return rejection_response(&e);
            }
        };

        let preview = match encode_payload(&image) {
            Ok(payload) => Some(payload.data_uri()),
            Err(e) => {
                log::warn!("⚠️ Could not build preview: {}", e);
                None
            }
        };

        let outcome = state.handler.dispatch(&prompt, &image, temperature).await;
        (StatusCode::OK, Json(AnalyzeResponse::new(outcome, preview))).into_response()
    }

    async fn index_page() -> Html<&'static str> {
        Html(include_str!("../static/index.html"))
    }

    async fn health_check() -> &'static str {
        "OK"
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::handlers::analysis::tests::{png_bytes, MockVisionService};
        use serde_json::Value;

        async fn spawn_app(mock: Arc<MockVisionService>) -> String {
            let handler = Arc::new(AnalysisHandler::new(mock));
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, create_router(handler)).await.unwrap();
            });
            format!("http://{}", addr)
        }

        fn image_part(bytes: Vec<u8>, file_name: &str) -> reqwest::multipart::Part {
            reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string())
        }

        #[tokio::test]
        async fn test_analyze_returns_outcome_json() {
            let mock = Arc::new(MockVisionService::new(AnalysisOutcome::Success(
                "Apple — ~95 cal".to_string(),
            )));
            let base = spawn_app(mock.clone()).await;

            let form = reqwest::multipart::Form::new()
                .part("image", image_part(png_bytes(1200, 900), "apple.png"))
                .text("prompt", "How many calories?")
                .text("temperature", "1.0");

            let response = reqwest::Client::new()
                .post(format!("{}/analyze", base))
                .multipart(form)
                .send()
                .await
                .unwrap();

            assert_eq!(response.status().as_u16(), 200);
            let body: Value = response.json().await.unwrap();
            assert_eq!(body["kind"], "success");
            assert_eq!(body["text"], "Apple — ~95 cal");
            let preview = body["preview"].as_str().unwrap();
            assert!(preview.starts_with("data:image/jpeg;base64,"));

            let calls = mock.calls.lock().unwrap();
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].0, "How many calories?");
            assert_eq!((calls[0].1, calls[0].2), (900, 675));
            assert_eq!(calls[0].3, 1.0);
        }

        #[tokio::test]
        async fn test_missing_image_is_bad_request() {
            let mock = Arc::new(MockVisionService::new(AnalysisOutcome::Success(String::new())));
            let base = spawn_app(mock.clone()).await;

            let form = reqwest::multipart::Form::new().text("prompt", "anything");
            let response = reqwest::Client::new()
                .post(format!("{}/analyze", base))
                .multipart(form)
                .send()
                .await
                .unwrap();

            assert_eq!(response.status().as_u16(), 400);
            let body: Value = response.json().await.unwrap();
            assert_eq!(body["error"], "Please upload a meal image first.");
            assert!(mock.calls.lock().unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_oversized_image_is_rejected_before_dispatch() {
            let mock = Arc::new(MockVisionService::new(AnalysisOutcome::Success(String::new())));
            let base = spawn_app(mock.clone()).await;

            let oversized = vec![0u8; 4 * 1024 * 1024 + 1];
            let form = reqwest::multipart::Form::new().part("image", image_part(oversized, "big.jpg"));
            let response = reqwest::Client::new()
                .post(format!("{}/analyze", base))
                .multipart(form)
                .send()
                .await
                .unwrap();

            assert_eq!(response.status().as_u16(), 413);
            let body: Value = response.json().await.unwrap();
            assert!(body["error"].as_str().unwrap().contains("Upload < 4MB"));
            assert!(mock.calls.lock().unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_body_over_limit_is_reported_as_too_large() {
            let mock = Arc::new(MockVisionService::new(AnalysisOutcome::Success(String::new())));
            let base = spawn_app(mock.clone()).await;

            let huge = vec![0u8; 9 * 1024 * 1024];
            let form = reqwest::multipart::Form::new().part("image", image_part(huge, "big.jpg"));
            let response = reqwest::Client::new()
                .post(format!("{}/analyze", base))
                .multipart(form)
                .send()
                .await
                .unwrap();

            assert_eq!(response.status().as_u16(), 413);
            let body: Value = response.json().await.unwrap();
            let error = body["error"].as_str().unwrap();
            assert!(error.contains("Image too large"));
            assert!(error.contains("Upload < 4MB"));
            assert!(mock.calls.lock().unwrap().is_empty());
        }

        #[test]
        fn test_status_for() {
            let too_large = NutriError::UploadTooLarge { size: 5, limit: 4 };
            assert_eq!(status_for(&too_large), StatusCode::PAYLOAD_TOO_LARGE);
            assert_eq!(
                status_for(&NutriError::UnsupportedFormat("gif".into())),
                StatusCode::UNPROCESSABLE_ENTITY
            );
            assert_eq!(
                status_for(&NutriError::Configuration("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR
            );
        }

        #[tokio::test]
        async fn test_undecodable_image_is_unprocessable() {
            let mock = Arc::new(MockVisionService::new(AnalysisOutcome::Success(String::new())));
            let base = spawn_app(mock).await;

            let form = reqwest::multipart::Form::new()
                .part("image", image_part(b"definitely not a jpeg".to_vec(), "meal.jpg"));
            let response = reqwest::Client::new()
                .post(format!("{}/analyze", base))
                .multipart(form)
                .send()
                .await
                .unwrap();

            assert_eq!(response.status().as_u16(), 422);
        }

        #[tokio::test]
        async fn test_out_of_range_temperature_is_bad_request() {
            let mock = Arc::new(MockVisionService::new(AnalysisOutcome::Success(String::new())));
            let base = spawn_app(mock).await;

            let form = reqwest::multipart::Form::new()
                .part("image", image_part(png_bytes(50, 50), "meal.png"))
                .text("temperature", "1.5");
            let response = reqwest::Client::new()
                .post(format!("{}/analyze", base))
                .multipart(form)
                .send()
                .await
                .unwrap();

            assert_eq!(response.status().as_u16(), 400);
        }

        #[tokio::test]
        async fn test_index_and_health() {
            let mock = Arc::new(MockVisionService::new(AnalysisOutcome::Success(String::new())));
            let base = spawn_app(mock).await;
            let client = reqwest::Client::new();

            let index = client.get(&base).send().await.unwrap().text().await.unwrap();
            assert!(index.contains("/analyze"));

            let health = client
                .get(format!("{}/health", base))
                .send()
                .await
                .unwrap()
                .text()
                .await
                .unwrap();
            assert_eq!(health, "OK");
        }
    }
}
