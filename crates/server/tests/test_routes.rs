use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use pdfgate::render::{StaticProvider, MIN_PDF_BYTES};
use pdfgate::{BoxError, DataProvider, DocumentRenderer, Gate, HandleFactory, Lookup, RenderError};
use pdfgate_server::{router, AppState};
use tower::ServiceExt;

struct FakeBrowser {
    id: u32,
}

#[derive(Default)]
struct FakeFactory {
    created: AtomicU32,
}

#[async_trait]
impl HandleFactory for FakeFactory {
    type Handle = FakeBrowser;

    async fn create(&self) -> Result<FakeBrowser, BoxError> {
        Ok(FakeBrowser {
            id: self.created.fetch_add(1, Ordering::SeqCst) + 1,
        })
    }

    async fn close(&self, _handle: Arc<FakeBrowser>) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Records the HTML it was given and returns a PDF-looking blob.
#[derive(Default)]
struct RecordingRenderer {
    seen: Mutex<Vec<String>>,
    fail: AtomicBool,
}

#[async_trait]
impl DocumentRenderer<FakeBrowser> for RecordingRenderer {
    async fn render(&self, handle: &FakeBrowser, html: &str) -> Result<Vec<u8>, RenderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RenderError::new("page crashed"));
        }

        self.seen.lock().push(html.to_string());

        let mut pdf = format!("%PDF-1.7 browser {}\n", handle.id).into_bytes();
        pdf.resize(MIN_PDF_BYTES + 10, b' ');
        Ok(pdf)
    }
}

fn app(provider: Option<Arc<dyn DataProvider>>) -> (Router, Arc<RecordingRenderer>) {
    let renderer = Arc::new(RecordingRenderer::default());
    let state = AppState::new(
        Gate::new(FakeFactory::default(), 2),
        SharedRenderer(renderer.clone()),
        provider,
    );

    (router(state), renderer)
}

struct SharedRenderer(Arc<RecordingRenderer>);

#[async_trait]
impl DocumentRenderer<FakeBrowser> for SharedRenderer {
    async fn render(&self, handle: &FakeBrowser, html: &str) -> Result<Vec<u8>, RenderError> {
        self.0.render(handle, html).await
    }
}

fn form_post(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_string(body: Body) -> String {
    let bytes = to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app(None);
    let res = app
        .oneshot(Request::get("/_health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(res.into_body()).await).unwrap();
    assert_eq!(json, serde_json::json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_form_page() {
    let (app, _) = app(None);
    let res = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(body_string(res.into_body()).await.contains("action=\"/generate\""));
}

#[tokio::test]
async fn test_generate_pdf() {
    let (app, renderer) = app(None);
    let res = app
        .oneshot(form_post("credor=Maria+%26+Filhos&valor=R%24+10%2C00&barcodeText=ABC123"))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "application/pdf");

    let disposition = res.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment; filename=\"alvara_"));
    assert!(disposition.ends_with(".pdf\""));

    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert!(body.starts_with(b"%PDF-1.7 browser 1"));

    let html = renderer.seen.lock()[0].clone();
    assert!(html.contains("Maria &amp; Filhos"));
    assert!(html.contains("R$ 10,00"));
    assert!(html.contains("ABC123"));
    assert!(html.contains("AUTORIZADO"));
    assert!(!html.contains("{{"));
}

#[tokio::test]
async fn test_render_failure_is_500() {
    let (app, renderer) = app(None);
    renderer.fail.store(true, Ordering::SeqCst);

    let res = app.oneshot(form_post("")).await.unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_string(res.into_body())
        .await
        .starts_with("Erro ao gerar PDF: Render Failed: page crashed"));
}

#[tokio::test]
async fn test_registry_lookup_fills_credor() {
    let provider = StaticProvider::new().with_record(
        "12.345.678/0001-90",
        Lookup {
            name: "ACME Indústria LTDA".into(),
            fields: Default::default(),
        },
    );
    let (app, renderer) = app(Some(Arc::new(provider)));

    let res = app
        .oneshot(form_post("cnpj=12345678000190&credor=ignored"))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let html = renderer.seen.lock()[0].clone();
    assert!(html.contains("ACME Indústria LTDA"));
    assert!(html.contains("12345678000190"));
    assert!(!html.contains("ignored"));
}

#[tokio::test]
async fn test_registry_miss_is_404() {
    let (app, renderer) = app(Some(Arc::new(StaticProvider::new())));

    let res = app.oneshot(form_post("cnpj=11111111000111")).await.unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(renderer.seen.lock().is_empty());
}

#[tokio::test]
async fn test_stats() {
    let (app, _) = app(None);
    let res = app
        .clone()
        .oneshot(form_post("credor=x"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .oneshot(Request::get("/_stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&body_string(res.into_body()).await).unwrap();

    assert_eq!(json["admission"]["limit"], 2);
    assert_eq!(json["admission"]["outstanding"], 0);
    assert_eq!(json["admission"]["total_granted"], 1);
    assert_eq!(json["pool"]["creations"], 1);
    assert_eq!(json["pool"]["ready"], true);
}
