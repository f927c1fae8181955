use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::{Local, Utc};
use pdfgate::form::DocumentForm;
use pdfgate::template::Template;
use pdfgate::{AdmissionStats, DataProvider, DocumentRenderer, Gate, HandleFactory, PoolStats};
use serde_derive::Serialize;

use crate::error::ApiError;

const FORM_PAGE: &str = include_str!("../templates/form.html");
const DOCUMENT: &str = include_str!("../templates/alvara.html");

struct Inner<F: HandleFactory, R> {
    gate: Gate<F>,
    renderer: R,
    provider: Option<Arc<dyn DataProvider>>,
    document: Template,
}

pub struct AppState<F: HandleFactory, R> {
    inner: Arc<Inner<F, R>>,
}

impl<F: HandleFactory, R> Clone for AppState<F, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<F, R> AppState<F, R>
where
    F: HandleFactory,
    R: DocumentRenderer<F::Handle> + 'static,
{
    pub fn new(gate: Gate<F>, renderer: R, provider: Option<Arc<dyn DataProvider>>) -> Self {
        Self::with_document(gate, renderer, provider, Template::new(DOCUMENT))
    }

    pub fn with_document(
        gate: Gate<F>,
        renderer: R,
        provider: Option<Arc<dyn DataProvider>>,
        document: Template,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                gate,
                renderer,
                provider,
                document,
            }),
        }
    }

    #[inline]
    pub fn gate(&self) -> &Gate<F> {
        &self.inner.gate
    }
}

pub fn router<F, R>(state: AppState<F, R>) -> Router
where
    F: HandleFactory,
    R: DocumentRenderer<F::Handle> + 'static,
{
    Router::new()
        .route("/", get(form_page))
        .route("/generate", post(generate::<F, R>))
        .route("/_health", get(health))
        .route("/_stats", get(stats::<F, R>))
        .with_state(state)
}

async fn form_page() -> Html<&'static str> {
    Html(FORM_PAGE)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
struct StatsResponse {
    admission: AdmissionStats,
    pool: PoolStats,
}

async fn stats<F, R>(State(state): State<AppState<F, R>>) -> Json<StatsResponse>
where
    F: HandleFactory,
    R: DocumentRenderer<F::Handle> + 'static,
{
    Json(StatsResponse {
        admission: state.gate().admission().stats(),
        pool: state.gate().pool().stats(),
    })
}

async fn generate<F, R>(
    State(state): State<AppState<F, R>>,
    Form(form): Form<DocumentForm>,
) -> Result<Response, ApiError>
where
    F: HandleFactory,
    R: DocumentRenderer<F::Handle> + 'static,
{
    let mut data = form.resolve(Local::now().date_naive());

    if let Some(cnpj) = data.cnpj.clone() {
        match &state.inner.provider {
            Some(provider) => {
                let lookup = provider.lookup(&cnpj).await?;
                log::debug!("registry lookup for {} found {:?}", cnpj, lookup.name);
                data.credor = lookup.name;
                data.cpf_cnpj = cnpj;
            }
            None => log::debug!("no registry configured, ignoring cnpj {}", cnpj),
        }
    }

    let html = state.inner.document.render(&data.vars());
    let pdf = state.inner.gate.render(&state.inner.renderer, &html).await?;

    log::info!(
        "generated {} byte PDF for barcode {}",
        pdf.len(),
        data.barcode_text
    );

    let disposition = format!(
        "attachment; filename=\"alvara_{}.pdf\"",
        Utc::now().timestamp_millis()
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    )
        .into_response())
}
