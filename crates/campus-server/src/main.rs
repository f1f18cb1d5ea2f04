use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use campus_api::middleware::require_auth;
use campus_api::state::{AppState, AppStateInner};
use campus_api::{analyze, channels, incidents, messages, notifications};
use campus_gateway::connection;
use campus_gateway::dispatcher::Dispatcher;
use campus_types::api::Claims;

#[derive(Clone)]
struct ServerState {
    app: AppState,
    hub: Dispatcher,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campus=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("CAMPUS_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("CAMPUS_DB_PATH").unwrap_or_else(|_| "campus.db".into());
    let host = std::env::var("CAMPUS_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("CAMPUS_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    let db = Arc::new(campus_db::Database::open(&PathBuf::from(&db_path))?);

    let hub = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        hub: hub.clone(),
        jwt_secret: jwt_secret.clone(),
    });

    let state = ServerState {
        app: app_state.clone(),
        hub,
        jwt_secret,
    };

    let protected_routes = Router::new()
        .route("/channels", post(channels::create_channel))
        .route("/channels", get(channels::get_channels))
        .route("/channels/{channel_id}/messages", get(messages::get_messages))
        .route("/channels/{channel_id}/messages", post(messages::send_message))
        .route("/messages/{message_id}/flag", post(messages::flag_message))
        .route("/messages/{message_id}", delete(messages::delete_message))
        .route("/notifications", get(notifications::get_notifications))
        .route("/notifications", post(notifications::create_notification))
        .route("/notifications/unread_count", get(notifications::unread_count))
        .route("/notifications/{notification_id}/read", post(notifications::mark_read))
        .route("/incidents", post(incidents::create_incident))
        .route("/analyze", post(analyze::analyze))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Campus realtime server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: String,
}

/// Validate the JWT at the HTTP upgrade so the socket loop never has to;
/// a bad token is rejected before the upgrade completes.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let token_data = decode::<Claims>(
        &query.token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let claims = token_data.claims;

    // Keep the role directory current; moderation and emergency fan-out
    // resolve admin recipients through it.
    let db = state.app.db.clone();
    let uid = claims.sub.to_string();
    let role = claims.role;
    match tokio::task::spawn_blocking(move || db.upsert_user_role(&uid, role)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Role directory update for {} failed: {}", claims.sub, e),
        Err(e) => warn!("Role directory task for {} failed: {}", claims.sub, e),
    }

    let store = state.app.store();
    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            state.hub,
            store,
            claims.sub,
            claims.name,
            claims.role,
        )
    }))
}
