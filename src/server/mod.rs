mod handlers;
mod state;

use axum::routing::get;
use axum::Router;
use state::AppState;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::location::LocationResolver;

pub fn build_router(resolver: Arc<LocationResolver>) -> Router {
    let state = Arc::new(AppState { resolver });

    Router::new()
        .route("/api/regiones/", get(handlers::regions))
        .route("/api/comunas/", get(handlers::communes))
        .route("/api/validar/", get(handlers::validate))
        .route("/cargar-comunas/", get(handlers::commune_options))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start(resolver: Arc<LocationResolver>, host: &str, port: u16) -> std::io::Result<()> {
    let app = build_router(resolver);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("portal-geo server listening on http://{}", addr);
    axum::serve(listener, app).await
}
