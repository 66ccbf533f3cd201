use tracing::info;

use actix_web::{middleware::Logger, web, App, HttpServer};
use chrono::Utc;

use std::time::Duration;

use shardfall::auth::SessionAuth;
use shardfall::loot::LootEngine;
use shardfall::token::JoinTokenAuthority;
use shardfallserv::config::Config;
use shardfallserv::db;
use shardfallserv::handlers::configure_routes;
use shardfallserv::store::DieselStore;
use shardfallserv::tls::load_rustls_config;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let mut _guard = None;

    if std::env::var("SERVER_LOG").unwrap_or_default() == "true" {
        let file_appender = tracing_appender::rolling::RollingFileAppender::new(
            tracing_appender::rolling::Rotation::DAILY,
            "./logs",
            "shardfall-server.log",
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::fmt()
            .with_writer(tracing_subscriber::fmt::writer::MakeWriterExt::and(
                non_blocking,
                std::io::stdout,
            ))
            .with_file(true)
            .with_line_number(true)
            .with_env_filter("info,actix_server=warn,actix_http::h1::dispatcher=off")
            .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(
                "%Y-%m-%dT%H:%M:%S".to_string(),
            ))
            .init();

        _guard = Some(guard);
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stdout)
            .with_file(true)
            .with_line_number(true)
            .with_env_filter("info,actix_server=warn,actix_http::h1::dispatcher=off")
            .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(
                "%Y-%m-%dT%H:%M:%S".to_string(),
            ))
            .init();
    }

    let config = Config::from_env();

    // Initialize SQLite database
    let db_pool = db::init::init_db(&config.database_url).expect("Failed to initialize database");

    db::init::run_migrations(&db_pool).expect("Failed to run database migrations");

    // Seed the bootstrap admin account
    db::init::init_admin_account(&db_pool, config.admin_password.as_deref())
        .expect("Failed to initialize admin account");

    tracing::info!("✅ Database initialized ({})", config.database_url);

    let store = DieselStore::new(db_pool.clone());

    let session_auth = web::Data::new(SessionAuth::new(config.jwt_secret.clone()));
    let loot_engine = web::Data::new(LootEngine::new(store.clone()));
    let token_authority = web::Data::new(JoinTokenAuthority::new(store));
    let db_data = web::Data::new(db_pool);
    let config_data = web::Data::new(config.clone());

    // Periodic garbage collection of expired/used join tokens. Pure cleanup;
    // token validity never depends on it.
    let sweep_authority = token_authority.clone().into_inner();
    let sweep_every = Duration::from_secs(config.token_sweep_interval_secs.max(1));
    actix_web::rt::spawn(async move {
        let mut ticker = actix_web::rt::time::interval(sweep_every);
        ticker.tick().await; // the first tick completes immediately
        loop {
            ticker.tick().await;
            match sweep_authority.sweep(Utc::now().timestamp()) {
                Ok(0) => {}
                Ok(removed) => tracing::info!("🧹 Swept {} expired/used join tokens", removed),
                Err(e) => tracing::error!("Join token sweep failed: {}", e),
            }
        }
    });

    let bind_addr = config.bind_addr.clone();

    if config.use_tls {
        info!("Server starting with TLS on https://{}/", bind_addr);

        let tls_config = load_rustls_config("cert.pem", "key.pem");

        HttpServer::new(move || {
            App::new()
                .app_data(session_auth.clone())
                .app_data(loot_engine.clone())
                .app_data(token_authority.clone())
                .app_data(db_data.clone())
                .app_data(config_data.clone())
                .wrap(Logger::default())
                .service(configure_routes())
        })
        .bind_rustls_0_23(bind_addr.as_str(), tls_config)?
        .run()
        .await
    } else {
        info!("Server starting on http://{}/", bind_addr);

        HttpServer::new(move || {
            App::new()
                .app_data(session_auth.clone())
                .app_data(loot_engine.clone())
                .app_data(token_authority.clone())
                .app_data(db_data.clone())
                .app_data(config_data.clone())
                .wrap(Logger::default())
                .service(configure_routes())
        })
        .bind(bind_addr.as_str())?
        .run()
        .await
    }
}
