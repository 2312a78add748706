//! HTTP front end: training trigger and CSV upload for prediction.

use super::load_config;
use super::predict::run_prediction;
use super::train::run_training;
use anyhow::{Context, Result, anyhow};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use wafer_training::{PipelineConfig, UploadedFile};

const WELCOME: &str = "Welcome to the wafer fault detection service";
const UPLOAD_FIELD: &str = "file";
const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

const UPLOAD_FORM: &str = r#"<!doctype html>
<html>
  <head><title>Wafer fault prediction</title></head>
  <body>
    <h1>Upload a sensor CSV</h1>
    <form action="/predict" method="post" enctype="multipart/form-data">
      <input type="file" name="file" accept=".csv">
      <button type="submit">Predict</button>
    </form>
  </body>
</html>
"#;

pub async fn execute(config_path: Option<&Path>, addr: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let listener =
        tokio::net::TcpListener::bind(addr).await.with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "serving wafer fault detection");
    axum::serve(listener, router(config)).await.context("HTTP server failed")?;
    Ok(())
}

pub fn router(config: PipelineConfig) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/train", get(train))
        .route("/predict", get(predict_form).post(predict_upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(config))
}

/// Any handler failure becomes a 500 carrying the error chain.
struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(error = %format!("{:#}", self.0), "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Error Occurred! {:#}", self.0)).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

async fn index() -> &'static str {
    WELCOME
}

async fn train(State(config): State<Arc<PipelineConfig>>) -> Result<String, AppError> {
    let manifest = run_training(config.as_ref().clone()).await?;
    Ok(format!("Training Completed. Model Score: {}", manifest.accuracy))
}

async fn predict_form() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}

async fn predict_upload(
    State(config): State<Arc<PipelineConfig>>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            let name = field.file_name().unwrap_or("upload.csv").to_string();
            let bytes = field.bytes().await?;
            upload = Some(UploadedFile::new(name, bytes.to_vec()));
            break;
        }
    }
    let upload = upload.ok_or_else(|| anyhow!("multipart field `{UPLOAD_FIELD}` is missing"))?;

    let output = run_prediction(config.as_ref().clone(), upload).await?;
    let body = tokio::fs::read(&output.path)
        .await
        .with_context(|| format!("Failed to read {}", output.path.display()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", output.name)),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;
    use wafer_training::{Document, DocumentStore, SqliteDocumentStore};

    const BOUNDARY: &str = "wafer-test-boundary";

    fn config(root: &Path) -> PipelineConfig {
        std::fs::create_dir_all(root.join("config")).unwrap();
        std::fs::write(root.join("config").join("schema.yaml"), "schema:\n  sensor_count: 3\n").unwrap();
        let mut config = PipelineConfig::for_root(root);
        config.trainer.model_config_path = None;
        config
    }

    fn seed(config: &PipelineConfig, n: usize) {
        let store = SqliteDocumentStore::connect(&config.store_uri(), &config.store.collection).unwrap();
        let documents: Vec<Document> = (0..n)
            .map(|i| {
                let label = if i % 2 == 0 { 1 } else { -1 };
                json!({"Sensor-1": label, "Sensor-2": i % 7, "Sensor-3": "na", "Good/Bad": label})
                    .as_object()
                    .cloned()
                    .unwrap()
            })
            .collect();
        store.insert_many(&documents).unwrap();
    }

    fn multipart_request(field: &str, csv: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"batch.csv\"\r\n\
             Content-Type: text/csv\r\n\r\n{csv}\r\n--{BOUNDARY}--\r\n"
        );
        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_index_and_form() {
        let temp = TempDir::new().unwrap();
        let app = router(config(temp.path()));

        let response = app.clone().oneshot(Request::get("/").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, WELCOME);

        let response = app.oneshot(Request::get("/predict").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("multipart/form-data"));
    }

    #[tokio::test]
    async fn test_train_on_empty_store_is_500() {
        let temp = TempDir::new().unwrap();
        let app = router(config(temp.path()));

        let response = app.oneshot(Request::get("/train").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.contains("data_ingestion stage failed"));
    }

    #[tokio::test]
    async fn test_predict_before_training_is_500() {
        let temp = TempDir::new().unwrap();
        let app = router(config(temp.path()));

        let response = app.oneshot(multipart_request("file", "Sensor-1,Sensor-2,Sensor-3\n1,2,3\n")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.contains("artifact not found"));
    }

    #[tokio::test]
    async fn test_missing_upload_field_is_500() {
        let temp = TempDir::new().unwrap();
        let app = router(config(temp.path()));

        let response = app.oneshot(multipart_request("other", "a\n1\n")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.contains("`file` is missing"));
    }

    #[tokio::test]
    async fn test_train_then_predict() {
        let temp = TempDir::new().unwrap();
        let config = config(temp.path());
        seed(&config, 40);
        let app = router(config);

        let response = app.clone().oneshot(Request::get("/train").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.starts_with("Training Completed. Model Score: "));

        let csv = "Unnamed: 0,Sensor-1,Sensor-2,Sensor-3\n0,1,0,\n1,-1,1,\n";
        let response = app.oneshot(multipart_request("file", csv)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"predictions_file.csv\""
        );
        let text = body_text(response).await;
        assert!(text.starts_with("Sensor-1,Sensor-2,Sensor-3,Good/Bad\n"));
        assert_eq!(text.lines().count(), 3);
        assert!(temp.path().join("prediction_artifacts").join("batch.csv").exists());
    }
}
