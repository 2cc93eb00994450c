use anyhow::Context;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    Extension, Router,
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, header::CONTENT_TYPE},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use dotenvy::dotenv;
use sea_orm::Database;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rbac_admin::config::AppConfig;
use rbac_admin::graphql::{Actor, ApiSchema, create_schema};

const ACTOR_HEADER: &str = "x-actor";

#[derive(Clone)]
struct AppState {
    schema: ApiSchema,
    config: AppConfig,
}

/// Attribute the request to the `x-actor` header, or to `system`.
async fn actor_middleware(mut request: Request, next: Next) -> Response {
    let actor = request
        .headers()
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| Actor(value.to_string()))
        .unwrap_or_default();
    request.extensions_mut().insert(actor);

    next.run(request).await
}

async fn graphql_handler(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let request = req.into_inner().data(actor);
    state.schema.execute(request).await.into()
}

async fn graphql_playground(State(state): State<AppState>) -> Response {
    if !state.config.is_development() {
        return (StatusCode::NOT_FOUND, "Playground not available").into_response();
    }

    Html(r#"
    <!DOCTYPE html>
    <html>
    <head>
        <title>RBAC Admin GraphQL Playground</title>
        <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/graphql-playground-react/build/static/css/index.css" />
    </head>
    <body>
        <div id="root"></div>
        <script src="https://cdn.jsdelivr.net/npm/graphql-playground-react/build/static/js/middleware.js"></script>
        <script>
            GraphQLPlayground.init(document.getElementById('root'), {
                endpoint: '/graphql'
            })
        </script>
    </body>
    </html>
    "#)
    .into_response()
}

async fn health() -> impl IntoResponse {
    "OK"
}

async fn graphql_schema(State(state): State<AppState>) -> Response {
    // Only expose schema in development environment
    if !state.config.is_development() {
        return (StatusCode::NOT_FOUND, "Schema not available in production").into_response();
    }

    info!("schema endpoint accessed in development mode");
    (
        [(CONTENT_TYPE, "application/graphql")],
        state.schema.sdl(),
    )
        .into_response()
}

fn cors_layer(origins: &str) -> CorsLayer {
    if origins.trim() == "*" {
        warn!("CORS set to accept any origin; only use this in development");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static(ACTOR_HEADER),
            HeaderName::from_static("apollo-require-preflight"),
            HeaderName::from_static("x-requested-with"),
        ])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rbac_admin=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!(environment = %config.environment, "starting rbac-admin");

    info!("connecting to database");
    let db = Database::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    info!("database connected");

    let state = AppState {
        schema: create_schema(db),
        config: config.clone(),
    };

    let app = Router::new()
        .route("/graphql", post(graphql_handler))
        .route("/playground", get(graphql_playground))
        .route("/health", get(health))
        .route("/schema.graphql", get(graphql_schema))
        .layer(middleware::from_fn(actor_middleware))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("server listening on http://{addr}");
    if config.is_development() {
        info!("GraphQL playground available at http://{addr}/playground");
    }

    axum::serve(listener, app).await?;

    Ok(())
}
