//! `/api` routes.

use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;

use actix_web::http::header;
use actix_web::{HttpResponse, web};
use bytes::Bytes;
use netdiag_toolbox::{ChannelSink, PublishOutcome, ToolboxError, ToolboxResult};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::ApiError;
use crate::state::AppState;

/// SSE frames buffered ahead of the client.
const SSE_BUFFER: usize = 16;

#[derive(Debug, Deserialize)]
pub struct TargetPayload {
    pub target: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .service(
        web::scope("/api")
            .route("/ping", web::post().to(ping))
            .route("/whois", web::post().to(whois))
            .route("/nslookup", web::post().to(nslookup))
            .route("/fast", web::post().to(fast)),
    );
}

fn log_toolbox_error(operation: &str, error: &ToolboxError) {
    if error.is_expected() {
        tracing::warn!("{operation} rejected: {error}");
    } else {
        tracing::error!("{operation} failed: {error}");
    }
}

/// Run a toolbox operation with timeout and error logging.
async fn run_toolbox<T>(
    duration: Duration,
    future: impl Future<Output = ToolboxResult<T>>,
    operation: &'static str,
) -> Result<T, ApiError> {
    timeout(duration, future)
        .await
        .map_err(|_| {
            tracing::error!("{operation} timed out after {duration:?}");
            ApiError::Timeout(operation)
        })?
        .map_err(|e| {
            log_toolbox_error(operation, &e);
            ApiError::Toolbox(e)
        })
}

async fn ping(
    state: web::Data<AppState>,
    payload: web::Json<TargetPayload>,
) -> Result<HttpResponse, ApiError> {
    let stats = run_toolbox(
        state.timeouts.ping,
        state.toolbox.ping(&payload.target),
        "Ping",
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({ "status": stats })))
}

async fn whois(
    state: web::Data<AppState>,
    payload: web::Json<TargetPayload>,
) -> Result<HttpResponse, ApiError> {
    let details = run_toolbox(
        state.timeouts.whois,
        state.toolbox.whois_lookup(&payload.target),
        "WHOIS",
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({ "record": details.raw, "details": details })))
}

async fn nslookup(
    state: web::Data<AppState>,
    payload: web::Json<TargetPayload>,
) -> Result<HttpResponse, ApiError> {
    let result = run_toolbox(
        state.timeouts.nslookup,
        state.toolbox.nslookup(&payload.target),
        "DNS lookup",
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({ "ips": result.ips })))
}

/// Stream a bandwidth run as Server-Sent Events.
///
/// Errors before the first byte (no endpoints, catalog failure) are plain
/// JSON responses; afterwards the outcome is carried by the terminal frame.
async fn fast(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let measurement = run_toolbox(
        state.timeouts.catalog,
        state.toolbox.bandwidth(),
        "Bandwidth measurement",
    )
    .await?;

    let (tx, rx) = mpsc::channel::<Bytes>(SSE_BUFFER);
    let publisher = state.publisher;
    actix_web::rt::spawn(async move {
        match publisher.run(measurement, ChannelSink::new(tx)).await {
            PublishOutcome::Completed(summary) => tracing::info!(
                "Bandwidth stream completed: {:.2} Mbps average",
                summary.average_bits_per_second / 1_000_000.0
            ),
            PublishOutcome::Failed(message) => {
                tracing::warn!("Bandwidth stream ended with error: {message}");
            }
            PublishOutcome::Disconnected => tracing::info!("Bandwidth stream client went away"),
        }
    });

    let body = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (Ok::<_, Infallible>(frame), rx))
    });

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(Box::pin(body)))
}
