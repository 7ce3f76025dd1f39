// ABOUTME: Entry point for the ytgrab download service
// ABOUTME: Wires env config, routes, the background fetcher and the HTTP serve loop

mod download;
mod fetcher;
mod transcode;
mod youtube;

use anyhow::Result;
use axum::{http::Method, response::IntoResponse, routing::get, Json, Router};
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use serde::Serialize;
use std::{env, sync::Arc};
use tower::Service;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use youtube::YoutubeClient;

// Configuration
pub struct Config {
    pub port: u16,
    /// Optional keep-alive target; when set, a background task GETs it every
    /// five minutes and logs the outcome.
    pub fetch_api_url: Option<String>,
}

impl Config {
    fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            fetch_api_url: env::var("FETCH_API_URL").ok().filter(|url| !url.is_empty()),
        }
    }
}

// App state shared across handlers
pub struct AppState {
    pub youtube: YoutubeClient,
    pub config: Config,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ytgrab=info".parse()?),
        )
        .init();

    let config = Config::from_env();
    let port = config.port;

    match config.fetch_api_url.clone() {
        Some(api_url) => {
            tokio::spawn(fetcher::run(api_url));
        }
        None => info!("FETCH_API_URL not set; periodic fetcher disabled"),
    }

    let youtube = YoutubeClient::new()?;
    let state = Arc::new(AppState { youtube, config });

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .max_age(std::time::Duration::from_secs(86400));

    // Build router
    let app = Router::new()
        .route("/ytmp4", get(download::handle_ytmp4))
        .route("/ytm3", get(download::handle_ytmp3))
        .route("/ytmp3", get(download::handle_ytmp3))
        .route("/health", get(handle_health))
        .route("/", get(handle_health))
        .layer(cors)
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    info!("Starting download service on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Use hyper's auto builder which supports both HTTP/1 and HTTP/2
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let app = app.clone();

        tokio::spawn(async move {
            let builder = Builder::new(hyper_util::rt::TokioExecutor::new());
            if let Err(e) = builder
                .serve_connection(
                    io,
                    hyper::service::service_fn(move |req| {
                        let mut app = app.clone();
                        async move { app.call(req).await }
                    }),
                )
                .await
            {
                error!("Connection error: {}", e);
            }
        });
    }
}

async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}
