//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, LogNotifier, OpenAiReplyAdapter},
    config::Config,
    error::ApiError,
    web::{
        fallback_scan_loop, require_identity,
        rest::{
            accept_handler, active_consultations_handler, cancel_handler, collect_handler,
            complete_handler, list_messages_handler, my_consultations_handler,
            position_handler, post_message_handler, queue_handler, rate_handler,
            submit_consultation_handler, ApiDoc,
        },
        AppState,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use consultation_core::{
    AssignmentCoordinator, CommissionLedger, ConsultationStore, FallbackActivator,
    LifecycleService, MessageService, QueueManager, Responder, SystemClock,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Adapters & the Reply Backend ---
    let store: Arc<dyn ConsultationStore> = db_adapter;
    let notifier = Arc::new(LogNotifier);
    let clock = Arc::new(SystemClock);

    let responder = match &config.openai_api_key {
        Some(api_key) => {
            info!(
                "Reply backend enabled (model: {}), with rule-based fallback.",
                config.bot_reply_model
            );
            let openai_config = OpenAIConfig::new().with_api_key(api_key);
            let client = Client::with_config(openai_config);
            Responder::with_backend(Arc::new(OpenAiReplyAdapter::new(
                client,
                config.bot_reply_model.clone(),
            )))
        }
        None => {
            info!("No reply backend configured; using rule-based responses only.");
            Responder::rule_based()
        }
    };

    // --- 4. Build the Engine Components & Shared AppState ---
    let bot_wait = chrono::Duration::seconds(config.bot_wait.as_secs() as i64);
    let fallback = FallbackActivator::new(
        store.clone(),
        notifier.clone(),
        clock.clone(),
        bot_wait,
    );

    let app_state = Arc::new(AppState {
        config: config.clone(),
        store: store.clone(),
        queue: QueueManager::new(store.clone(), clock.clone()),
        coordinator: AssignmentCoordinator::new(store.clone(), notifier.clone(), clock.clone()),
        lifecycle: LifecycleService::new(store.clone(), clock.clone()),
        messages: MessageService::new(store.clone(), responder, clock.clone()),
        ledger: CommissionLedger::new(store.clone(), clock.clone()),
    });

    // --- 5. Start the Fallback Scan Worker ---
    tokio::spawn(fallback_scan_loop(fallback, config.scan_interval));

    let cors = CorsLayer::new()
        .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    let api_router = Router::new()
        .route("/consultations", post(submit_consultation_handler))
        .route("/consultations/queue", get(queue_handler))
        .route("/consultations/mine", get(my_consultations_handler))
        .route("/consultations/active", get(active_consultations_handler))
        .route("/consultations/{id}/position", get(position_handler))
        .route("/consultations/{id}/accept", post(accept_handler))
        .route(
            "/consultations/{id}/messages",
            post(post_message_handler).get(list_messages_handler),
        )
        .route("/consultations/{id}/complete", post(complete_handler))
        .route("/consultations/{id}/cancel", post(cancel_handler))
        .route("/consultations/{id}/rate", post(rate_handler))
        .route("/consultations/{id}/collect", post(collect_handler))
        .layer(axum_middleware::from_fn(require_identity))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
