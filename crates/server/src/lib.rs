pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    response::Json as ResponseJson,
    routing::get,
};
use tokio::{
    net::TcpListener,
    signal::{
        ctrl_c,
        unix::{SignalKind, signal},
    },
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use utils::response::ApiResponse;

use crate::state::AppState;

/// Builds the full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    let api = Router::new()
        .route("/health", get(health))
        .merge(routes::auth::router())
        .merge(routes::users::router())
        .merge(routes::account_link::router())
        .merge(routes::problems::router())
        .merge(routes::tags::router())
        .merge(routes::records::router())
        .merge(routes::streaks::router())
        .merge(routes::recommendations::router());

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> ResponseJson<ApiResponse<&'static str>> {
    ResponseJson(ApiResponse::success("ok"))
}

pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let address = format!("{}:{}", state.config.host, state.config.port);
    let app = app(state);

    let listener = TcpListener::bind(&address).await?;
    info!("server listening on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        if ctrl_c().await.is_ok() {
            info!("received ctrl-c, shutting down");
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(_) => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = interrupt => {},
        _ = terminate => {},
    }
}
