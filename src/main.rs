mod core;
mod features;
mod modules;
mod shared;

use crate::core::clock::SystemClock;
use crate::core::config::{Config, StoreConfig};
use crate::core::extractor::ForwardedForPolicy;
use crate::core::openapi::{ApiDoc, SwaggerInfoModifier};
use crate::core::middleware;
use crate::features::images::stores::{ImageStore, MemoryImageStore, PgImageStore};
use crate::features::images::{
    routes as images_routes, static_routes, ImageService, RetentionSweeper,
};
use crate::modules::imaging::JpegTranscoder;
use crate::modules::storage::LocalStorage;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

fn main() -> anyhow::Result<()> {
    // Build Tokio runtime with configurable worker threads
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .max_blocking_threads(worker_threads * 4)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

async fn build_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn ImageStore>> {
    match config {
        StoreConfig::Memory => {
            tracing::info!("Using in-memory image store");
            Ok(Arc::new(MemoryImageStore::new()))
        }
        StoreConfig::Postgres(db) => Ok(Arc::new(PgImageStore::connect(db).await?)),
    }
}

async fn async_main(worker_threads: usize) -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(
        "System info: tokio_worker_threads={}, pid={}",
        worker_threads,
        std::process::id()
    );
    tracing::info!(
        "Configuration loaded: max_upload_bytes={}, daily_quota={}, retention_hours={}, sweep_interval={}s",
        config.upload.max_upload_bytes,
        config.upload.daily_quota,
        config.upload.retention_hours,
        config.sweeper.interval.as_secs()
    );

    let store = build_store(&config.store).await?;

    let storage = Arc::new(
        LocalStorage::new(&config.storage, &config.app.public_base_url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize upload storage: {}", e))?,
    );

    let transcoder = Arc::new(JpegTranscoder::from_policy(&config.upload));

    let image_service = Arc::new(ImageService::new(
        store,
        Arc::clone(&storage),
        transcoder,
        Arc::new(SystemClock),
        config.upload.clone(),
    ));
    tracing::info!("Image service initialized");

    let sweeper = RetentionSweeper::new(Arc::clone(&image_service), config.sweeper.interval);
    tokio::spawn(async move {
        sweeper.run().await;
    });
    tracing::info!("Retention sweeper spawned");

    let swagger_modifier = SwaggerInfoModifier {
        title: config.swagger.title.clone(),
        version: config.swagger.version.clone(),
        description: config.swagger.description.clone(),
    };

    let mut openapi = ApiDoc::openapi();
    swagger_modifier.modify(&mut openapi);

    let swagger =
        Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi));

    // Simple health check endpoint
    async fn health_check() -> axum::http::StatusCode {
        axum::http::StatusCode::OK
    }
    let health_route = Router::new().route("/health", axum::routing::get(health_check));

    let forwarded_for = ForwardedForPolicy {
        trusted: config.app.trust_forwarded_for,
    };
    if forwarded_for.trusted {
        tracing::info!("Uploader identity taken from X-Forwarded-For");
    }

    let app = Router::new()
        .merge(swagger)
        .merge(images_routes(Arc::clone(&image_service), forwarded_for))
        .merge(health_route)
        .merge(static_routes(storage.root(), &config.app.static_dir))
        .layer(middleware::cors_layer(&config.app.cors_allowed_origins))
        // Propagate X-Request-Id to response headers
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(middleware::RequestSpan {
                    trust_forwarded_for: forwarded_for.trusted,
                })
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Generate X-Request-Id using UUID v7 (or use client-provided one)
        .layer(SetRequestIdLayer::x_request_id(middleware::UuidV7RequestId));

    // Start server
    let addr = config.app.server_address();
    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address: {}", e))?;

    // Use socket2 for TCP listener configuration
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(socket_addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;

    #[cfg(target_os = "linux")]
    {
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(std::time::Duration::from_secs(60))
            .with_interval(std::time::Duration::from_secs(10))
            .with_retries(3);
        socket.set_tcp_keepalive(&keepalive)?;
    }
    #[cfg(not(target_os = "linux"))]
    {
        let keepalive = socket2::TcpKeepalive::new().with_time(std::time::Duration::from_secs(60));
        socket.set_tcp_keepalive(&keepalive)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(1024)?;

    let listener = tokio::net::TcpListener::from_std(socket.into())?;
    tracing::info!("Server listening on {}", format!("http://{}", addr));
    tracing::info!(
        "Swagger UI available at {}",
        format!("http://{}/swagger-ui/", addr)
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
