mod applications;
mod auth;
mod config;
mod db;
mod error;
mod extract;
mod files;
mod handlers;
mod models;
mod reports;
mod storage;
mod users;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{delete, get, post, put},
    Router,
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::DbConnection;
use handlers::{admin, applications as application_routes, auth as auth_routes, files as file_routes};

#[derive(Clone)]
pub struct AppState {
    pub db: DbConnection,
    pub config: Arc<Config>,
}

#[cfg(test)]
pub fn test_state(max_upload_size: usize) -> AppState {
    AppState {
        db: Arc::new(tokio::sync::Mutex::new(db::test_connection())),
        config: Arc::new(Config {
            listen_addr: "127.0.0.1:0".to_string(),
            database_path: ":memory:".into(),
            upload_dir: storage::test_root(),
            max_upload_size,
            cors_origin: "http://localhost:3000".to_string(),
            admin_email: "admin@example.com".to_string(),
            admin_password: "admin123".to_string(),
        }),
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .cors_origin
                .parse::<HeaderValue>()
                .unwrap_or_else(|_| HeaderValue::from_static("http://localhost:3000")),
        )
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Authentication
        .route("/api/register", post(auth_routes::register_user))
        .route("/api/login", post(auth_routes::login_user))
        .route("/api/logout", post(auth_routes::logout_user))
        .route("/api/check-auth", get(auth_routes::check_auth))
        .route("/api/user/profile", get(auth_routes::user_profile))
        // Applications
        .route("/api/submit-application", post(application_routes::submit_application))
        .route("/api/get-application", get(application_routes::get_own_application))
        .route("/api/get-application/:id", get(application_routes::get_application))
        .route("/api/get-all-applications", get(application_routes::get_all_applications))
        .route("/api/update-application/:id", put(application_routes::update_application))
        .route(
            "/api/update-application-status/:id",
            put(application_routes::update_application_status),
        )
        .route(
            "/api/update-application-notes/:id",
            put(application_routes::update_application_notes),
        )
        .route("/api/delete-application/:id", delete(application_routes::delete_application))
        // Files
        .route("/api/upload-file", post(file_routes::upload_file))
        .route("/api/files", get(file_routes::get_user_files))
        .route("/api/files/:id/info", get(file_routes::file_info))
        .route("/api/files/:id/download", get(file_routes::download_file))
        .route("/api/files/:id/view", get(file_routes::view_file))
        // Admin
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/create-user", post(admin::create_user))
        .route("/api/admin/delete-user/:id", delete(admin::delete_user))
        .route("/api/admin/university-report", get(admin::university_report))
        .route("/api/admin/enrollment-statistics", get(admin::enrollment_statistics))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(state.config.max_upload_size))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "applytrack=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().expect("Environment misconfigured");

    std::fs::create_dir_all(&config.upload_dir).expect("Failed to create upload directory");

    let conn = db::establish_connection(&config.database_path).expect("Failed to establish database connection");
    users::seed_admin(&*conn.lock().await, &config.admin_email, &config.admin_password)
        .expect("Failed to seed admin account");

    let address = config.listen_addr.clone();
    let app = router(AppState {
        db: conn,
        config: Arc::new(config),
    });

    let listener = TcpListener::bind(&address).await.expect("Failed to bind listener");
    info!("Server running on http://{address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    info!("Server shut down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
