//! Roster manages users and keeps them in sync with other services
//! through replication events.

#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod event;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod middleware;
pub mod role;
mod router;
pub mod store;
pub mod telemetry;
#[cfg(test)]
mod testing;
pub mod token;
pub mod user;

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderName, Method, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware as AxumMiddleware};
pub use error::ServerError;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::COOKIE, format!("token={token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: std::sync::Arc<config::Configuration>,
    pub gate: middleware::AuthorizationGate,
    pub users: user::UserService,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(15)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
            HeaderName::from_static(middleware::TOKEN),
        ]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /ping` goes to `ping`. No token needed.
        .route("/ping", get(router::ping::handler))
        .merge(router::users::router(state.clone()))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Everything the binary runs.
#[cfg(feature = "kafka")]
pub struct Runtime {
    pub state: AppState,
    pub driver: event::ReplicationDriver,
    pub producer: std::sync::Arc<kafka::KafkaProducer>,
}

/// Initialize the application state and the replication loop.
#[cfg(feature = "kafka")]
pub async fn initialize_state()
-> Result<Runtime, Box<dyn std::error::Error + Send + Sync>> {
    use std::path::PathBuf;
    use std::sync::Arc;

    use clock::{Clock, SystemClock};
    use store::MutationStore;

    // read configuration file.
    let config = config::Configuration::default()
        .path(
            std::env::var("CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_default(),
        )
        .read();

    let secret = std::env::var(token::SECRET_ENV).map_err(|_| {
        format!("missing `{}` environment variable", token::SECRET_ENV)
    })?;

    let Some(postgres) = &config.postgres else {
        return Err("missing `postgres` entry on `config.yaml` file".into());
    };
    let db = database::Database::new(postgres).await?;

    // execute migrations scripts on start.
    db.migrate().await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let users = MutationStore::<user::User>::new(Arc::new(
        user::UserRepository::new(db.postgres.clone()),
    ))
    .deadline(config.store.timeout());
    let roles = MutationStore::<role::Role>::new(Arc::new(
        role::repository::RoleRepository::new(db.postgres.clone()),
    ))
    .deadline(config.store.timeout());

    let producer = Arc::new(kafka::KafkaProducer::new(&config.kafka)?);
    let publisher = event::EventPublisher::new(
        producer.clone(),
        config.kafka.topics.clone(),
        config.kafka.delivery_timeout(),
    );

    let codec = token::ClaimsCodec::new(
        secret.as_bytes(),
        config.token.session_duration,
        Arc::clone(&clock),
    )?;
    let gate = middleware::AuthorizationGate::new(codec, &config.token.admin_role);

    let service = user::UserService::new(
        users.clone(),
        roles.clone(),
        publisher,
        crypto::PasswordManager::new(config.argon2.clone())?,
        Arc::clone(&clock),
    );

    let consumer = kafka::KafkaConsumer::new(&config.kafka)?;
    let driver = event::ReplicationDriver::new(
        Box::new(consumer),
        event::EventSubscriber::new(users, roles, clock),
        config.kafka.topics.subscriptions(),
        config.kafka.poll_interval(),
    );

    Ok(Runtime {
        state: AppState {
            config,
            gate,
            users: service,
        },
        driver,
        producer,
    })
}
