//! HTTP inbound adapter: upload, gallery listing, status polling, deletion.

use crate::adapters::local::fs::LibraryError;
use crate::application::status::StatusQueryError;
use crate::application::{Admission, IngestError, Pipeline, UploadRequest};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router(pipeline: Pipeline) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/upload", post(upload_movie))
        .route("/api/movies", get(list_movies))
        .route("/api/movie/:slug/status", get(movie_status))
        .route("/api/movie/:slug", delete(delete_movie))
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "success": false, "error": message.into() }))).into_response()
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "on" | "yes")
}

// Form fields are read in order; `title` must arrive before `file` because the
// file is streamed straight to disk under the title's directory.
async fn upload_movie(State(pipeline): State<Pipeline>, mut multipart: Multipart) -> Response {
    let mut title: Option<String> = None;
    let mut description = String::new();
    let mut skip_poster = false;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.body_text()),
        };

        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let Some(title) = title.take() else {
                    return error_response(
                        StatusCode::BAD_REQUEST,
                        "title must be sent before the file",
                    );
                };
                let request = UploadRequest {
                    title,
                    description: std::mem::take(&mut description),
                    file_name: field.file_name().map(str::to_owned),
                    skip_poster,
                };
                return admission_response(&pipeline, pipeline.ingest(request, field).await);
            }
            Some(name) => {
                let value = match field.text().await {
                    Ok(value) => value,
                    Err(e) => return error_response(StatusCode::BAD_REQUEST, e.body_text()),
                };
                match name {
                    "title" => title = Some(value),
                    "description" => description = value,
                    "skip_poster" => skip_poster = parse_flag(&value),
                    _ => {}
                }
            }
            None => continue,
        }
    }

    error_response(StatusCode::BAD_REQUEST, "no file in upload")
}

fn admission_response(pipeline: &Pipeline, result: Result<Admission, IngestError>) -> Response {
    match result {
        Ok(Admission::Accepted { slug, .. }) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "success": true,
                "slug": slug,
                "message": "upload received, transcoding started",
            })),
        )
            .into_response(),
        Ok(Admission::RejectedBusy { holder, lock_age }) => {
            let retry_after = (pipeline.lock().stale_after() - lock_age).num_seconds().max(1);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(json!({
                    "success": false,
                    "error": "another movie is being transcoded",
                    "holder": holder,
                    "lock_age_ms": lock_age.num_milliseconds(),
                })),
            )
                .into_response()
        }
        Ok(Admission::RejectedInvalid(reason)) => error_response(StatusCode::BAD_REQUEST, reason),
        Err(e) => {
            tracing::error!(error = %e, "upload failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn list_movies(State(pipeline): State<Pipeline>) -> Response {
    match pipeline.list_movies().await {
        Ok(movies) => Json(json!({ "movies": movies })).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "listing movies failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn movie_status(State(pipeline): State<Pipeline>, Path(slug): Path<String>) -> Response {
    match pipeline.status(&slug).await {
        Ok(view) => Json(view).into_response(),
        Err(StatusQueryError::InvalidId(e)) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => {
            tracing::error!(%slug, error = %e, "status lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn delete_movie(State(pipeline): State<Pipeline>, Path(slug): Path<String>) -> Response {
    match pipeline.delete_movie(&slug).await {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(LibraryError::InvalidId(e)) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => {
            tracing::error!(%slug, error = %e, "delete failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" On "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }
}
