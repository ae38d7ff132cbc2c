//! CAN Gateway - HTTP bridge over the fetch adapter
//!
//! Maps `/<scheme>/<root>/<path>` HTTP requests onto adapter URLs
//! (`content://`, `name://`, `linked://`, `bus://`) and streams the
//! adapter's response back, including SSE bodies.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Body as HttpBody;
use axum::extract::State;
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::Router;
use clap::Parser;
use http::{Method, StatusCode};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use common::linked_data::EMPTY_DIR_CID;
use common::prelude::MemoryClient;
use fetch::{Body, Config, Fetch, Request};

/// Maximum upload size in bytes (500 MB)
const MAX_UPLOAD_SIZE_BYTES: usize = 500 * 1024 * 1024;

/// CAN Gateway - HTTP bridge over the fetch adapter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on for HTTP requests
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Serve reads only; mutating requests fall through to 405
    #[arg(long)]
    read_only: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    let log_level: tracing::Level = args.log_level.parse().unwrap_or(tracing::Level::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stdout_layer).init();

    tracing::info!("Starting CAN Gateway");

    let client = Arc::new(MemoryClient::new());
    let mut config = Config::default();
    if args.read_only {
        config = config.read_only();
    }
    let adapter = Fetch::with_config(client, config);

    // Set up graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl+c");
        tracing::info!("Received shutdown signal");
        let _ = shutdown_tx.send(());
    });

    let listen_addr = SocketAddr::from_str(&format!("0.0.0.0:{}", args.port))?;
    let router = build_router(adapter);

    tracing::info!("Gateway listening on {}", listen_addr);
    tracing::info!(
        "Empty directory base: http://localhost:{}/content/{}/",
        args.port,
        *EMPTY_DIR_CID
    );
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;

    let mut server_rx = shutdown_rx.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = server_rx.changed().await;
        })
        .await?;

    tracing::info!("Gateway shutdown complete");
    Ok(())
}

fn build_router(adapter: Fetch) -> Router {
    let cors_layer = CorsLayer::new()
        .allow_methods(vec![
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
        ])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .fallback(bridge)
        .with_state(adapter)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

/// Rewrite `/<scheme>/<root>/<path>?<query>` into an adapter URL and
/// relay the request.
async fn bridge(State(adapter): State<Fetch>, request: axum::extract::Request) -> HttpResponse {
    let (parts, body) = request.into_parts();

    let path = parts.uri.path().trim_start_matches('/');
    let (scheme, rest) = path.split_once('/').unwrap_or((path, ""));
    if scheme.is_empty() || rest.is_empty() {
        return (
            StatusCode::NOT_FOUND,
            "expected /<scheme>/<root>/<path>",
        )
            .into_response();
    }

    let mut target = format!("{}://{}", scheme, rest);
    if let Some(query) = parts.uri.query() {
        target.push('?');
        target.push_str(query);
    }

    let mut adapter_request = match Request::new(parts.method.clone(), &target) {
        Ok(request) => request,
        Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    };
    adapter_request.headers = parts.headers;

    match axum::body::to_bytes(body, MAX_UPLOAD_SIZE_BYTES).await {
        Ok(bytes) if !bytes.is_empty() => adapter_request.body = Body::from(bytes),
        Ok(_) => {}
        Err(err) => {
            return (StatusCode::PAYLOAD_TOO_LARGE, err.to_string()).into_response();
        }
    }

    let response = adapter.fetch(adapter_request).await;

    let mut builder = http::Response::builder().status(response.status);
    for (name, value) in response.headers.iter() {
        builder = builder.header(name, value);
    }
    match builder.body(HttpBody::from_stream(response.body.into_stream())) {
        Ok(response) => response.into_response(),
        Err(err) => {
            tracing::error!("failed to relay response: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
