//! HTTP endpoints.
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | `POST` | `/site/update` | `200 OK` or `400 Bad Request`, nothing else |
//! | `GET` | `/site/public-key` | base64 public key |
//! | `POST` | `/site/add` | `201`, `409` already registered, `400` malformed |
//!
//! The update endpoint never says which gate rejected a report; the
//! reason is logged server-side only.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tracing::{debug, error, info};
use warden_core::{IngestError, RegistrationError, Warden};

/// Builds the router over a shared server.
pub fn router(warden: Warden) -> Router {
    let body_limit = warden.config().server.max_body_bytes;
    Router::new()
        .route("/site/update", post(site_update))
        .route("/site/public-key", get(public_key))
        .route("/site/add", post(site_add))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(warden)
}

/// Serves `router` on the configured address until ctrl-c.
pub async fn serve(warden: Warden) -> anyhow::Result<()> {
    use anyhow::Context;

    let addr = warden.config().server.listen_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, "Warden listening");

    axum::serve(listener, router(warden))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("server error")?;
    Ok(())
}

async fn site_update(State(warden): State<Warden>, body: Bytes) -> Response {
    match warden.ingest(&body, chrono::Utc::now()).await {
        Ok(outcome) => {
            debug!(site = %outcome.site_id, "Update acknowledged");
            (StatusCode::OK, "OK").into_response()
        }
        Err(e) => {
            if let IngestError::Store(inner) = &e {
                error!(error = %inner, "Update failed on store");
            }
            (StatusCode::BAD_REQUEST, "Bad Request").into_response()
        }
    }
}

async fn public_key(State(warden): State<Warden>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        warden.public_key_base64(),
    )
        .into_response()
}

#[derive(Debug, Default, Deserialize)]
struct AddQuery {
    #[serde(default)]
    data: Option<String>,
}

async fn site_add(State(warden): State<Warden>, Query(query): Query<AddQuery>, body: Bytes) -> Response {
    let sealed: Vec<u8> = match query.data {
        // Unescaped '+' in base64 arrives as a space after form decoding.
        Some(data) if !data.trim().is_empty() => data.trim().replace(' ', "+").into_bytes(),
        _ => body.to_vec(),
    };

    match warden.register(&sealed).await {
        Ok(site) => (StatusCode::CREATED, site.id.to_string()).into_response(),
        Err(RegistrationError::Conflict { .. }) => {
            (StatusCode::CONFLICT, "Site already registered").into_response()
        }
        Err(RegistrationError::Malformed(reason)) => {
            debug!(reason = %reason, "Malformed registration");
            (StatusCode::BAD_REQUEST, "Bad Request").into_response()
        }
        Err(RegistrationError::Store(e)) => {
            error!(error = %e, "Registration failed on store");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}
