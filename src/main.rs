use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::Next,
};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{error, info, warn};

use smartmenu_api::{
    api_routes,
    auth::{AuthConfig, AuthService},
    config::{init_tracing, load_config},
    db, events,
    handlers::AppServices,
    payments::provider_from_config,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(&config.log_level, config.log_json);
    info!(
        environment = %config.environment,
        "starting smartmenu-api v{}",
        env!("CARGO_PKG_VERSION")
    );

    let db = Arc::new(db::establish_connection_from_app_config(&config).await?);
    if config.auto_migrate {
        info!("running database migrations");
        db::run_migrations(&db).await?;
    }

    let (event_tx, event_rx) = tokio::sync::mpsc::channel(config.event_channel_capacity);
    let event_sender = Arc::new(events::EventSender::new(event_tx));
    tokio::spawn(events::process_events(event_rx));

    let auth_service = Arc::new(AuthService::new(AuthConfig::from_app_config(&config)));
    let provider = provider_from_config(&config)?;
    let services = AppServices::new(
        db.clone(),
        &config,
        event_sender.clone(),
        auth_service.clone(),
        provider,
    );

    let state = AppState {
        db,
        config: config.clone(),
        services,
        event_sender,
        auth_service: auth_service.clone(),
    };

    let cors = build_cors(&config.cors_allowed_origins, config.is_development());

    // Middleware that validates tokens pulls the auth service out of
    // request extensions, so inject it ahead of the route tree.
    let inject_auth = axum::middleware::from_fn(move |mut request: Request, next: Next| {
        let auth_service = auth_service.clone();
        async move {
            request.extensions_mut().insert(auth_service);
            next.run(request).await
        }
    });

    let app = api_routes()
        .with_state(state)
        .layer(inject_auth)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

fn build_cors(allowed_origins: &Option<String>, is_development: bool) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let headers = [header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT];

    let origins: Vec<&str> = allowed_origins
        .as_deref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .collect()
        })
        .unwrap_or_default();

    match origins {
        origins if !origins.is_empty() => {
            let parsed: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!("ignoring unparseable CORS origin: {}", origin);
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(parsed)
                .allow_methods(methods)
                .allow_headers(headers)
        }
        _ if is_development => CorsLayer::permissive(),
        _ => {
            error!("no CORS origins configured; cross-origin requests will be refused");
            CorsLayer::new().allow_methods(methods).allow_headers(headers)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install ctrl-c handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
