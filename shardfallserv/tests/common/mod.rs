//! Shared scaffolding for the REST integration tests: a fresh in-memory
//! database per backend, wired with the same app data as main.rs.

// Each test binary compiles this module on its own; not every binary uses
// every helper.
#![allow(dead_code)]

use actix_http::Request;
use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App, Error};

use shardfall::auth::SessionAuth;
use shardfall::loot::LootEngine;
use shardfall::token::JoinTokenAuthority;
use shardfallserv::config::Config;
use shardfallserv::db::{self, DbPool};
use shardfallserv::handlers;
use shardfallserv::store::DieselStore;

pub const ADMIN_PASSWORD: &str = "test-admin-password";

pub fn test_config() -> Config {
    Config {
        database_url: ":memory:".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        use_tls: false,
        jwt_secret: Some("integration-test-secret".to_string()),
        admin_password: Some(ADMIN_PASSWORD.to_string()),
        join_token_ttl_secs: 60,
        heartbeat_ttl_secs: 30,
        token_sweep_interval_secs: 60,
    }
}

pub struct TestBackend {
    pub db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    engine: web::Data<LootEngine<DieselStore>>,
    authority: web::Data<JoinTokenAuthority<DieselStore>>,
    config: web::Data<Config>,
}

impl TestBackend {
    /// Fresh `:memory:` database with migrations applied and the bootstrap
    /// admin seeded.
    pub fn new() -> Self {
        let config = test_config();
        let pool = db::init::init_db(&config.database_url).expect("in-memory database");
        db::init::run_migrations(&pool).expect("migrations");
        db::init::init_admin_account(&pool, config.admin_password.as_deref())
            .expect("admin bootstrap");

        let store = DieselStore::new(pool.clone());
        Self {
            db: web::Data::new(pool),
            auth: web::Data::new(SessionAuth::new(config.jwt_secret.clone())),
            engine: web::Data::new(LootEngine::new(store.clone())),
            authority: web::Data::new(JoinTokenAuthority::new(store)),
            config: web::Data::new(config),
        }
    }

    /// The production route tree over this backend's data.
    pub fn app(
        &self,
    ) -> App<
        impl ServiceFactory<
            ServiceRequest,
            Config = (),
            Response = ServiceResponse<impl MessageBody>,
            Error = Error,
            InitError = (),
        >,
    > {
        App::new()
            .app_data(self.db.clone())
            .app_data(self.auth.clone())
            .app_data(self.engine.clone())
            .app_data(self.authority.clone())
            .app_data(self.config.clone())
            .service(handlers::configure_routes())
    }
}

/// Drive one request and hand back status plus parsed JSON body.
pub async fn call<S, B>(app: &S, req: Request) -> (StatusCode, serde_json::Value)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let body = test::read_body_json(resp).await;
    (status, body)
}

fn with_bearer(req: test::TestRequest, bearer: Option<&str>) -> test::TestRequest {
    match bearer {
        Some(token) => {
            req.insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        }
        None => req,
    }
}

pub fn get(path: &str, bearer: Option<&str>) -> Request {
    with_bearer(test::TestRequest::get().uri(path), bearer).to_request()
}

pub fn post_json(path: &str, bearer: Option<&str>, body: serde_json::Value) -> Request {
    with_bearer(test::TestRequest::post().uri(path), bearer)
        .set_json(body)
        .to_request()
}

pub fn put(path: &str, bearer: Option<&str>) -> Request {
    with_bearer(test::TestRequest::put().uri(path), bearer).to_request()
}

pub fn delete(path: &str, bearer: Option<&str>) -> Request {
    with_bearer(test::TestRequest::delete().uri(path), bearer).to_request()
}

/// Game-server call: authenticated by the X-Server-Key header, not a Bearer.
pub fn server_post_json(path: &str, server_key: &str, body: serde_json::Value) -> Request {
    test::TestRequest::post()
        .uri(path)
        .insert_header((handlers::SERVER_KEY_HEADER, server_key))
        .set_json(body)
        .to_request()
}

pub struct PlayerSession {
    pub player_id: String,
    pub access_token: String,
}

/// Register a player through the API and return their id and access token.
pub async fn register_player<S, B>(app: &S, username: &str) -> PlayerSession
where
    S: Service<Request, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    let (status, body) = call(
        app,
        post_json(
            "/api/auth/register",
            None,
            serde_json::json!({"username": username, "password": "hunter2-hunter2"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "registration failed: {}", body);
    PlayerSession {
        player_id: body["player_id"].as_str().expect("player_id").to_string(),
        access_token: body["tokens"]["access_token"]
            .as_str()
            .expect("access_token")
            .to_string(),
    }
}

/// Log in as the seeded bootstrap admin and return an access token.
pub async fn admin_token<S, B>(app: &S) -> String
where
    S: Service<Request, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    let (status, body) = call(
        app,
        post_json(
            "/api/auth/login",
            None,
            serde_json::json!({"username": "admin", "password": ADMIN_PASSWORD}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "admin login failed: {}", body);
    body["tokens"]["access_token"]
        .as_str()
        .expect("access_token")
        .to_string()
}

/// Register a game server through the admin API; returns (server_id, key).
pub async fn register_game_server<S, B>(app: &S, admin: &str, name: &str) -> (String, String)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    let (status, body) = call(
        app,
        post_json(
            "/api/admin/servers",
            Some(admin),
            serde_json::json!({
                "name": name,
                "region": "eu-west",
                "host": "10.1.2.3",
                "port": 7777,
                "max_players": 16,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "server registration failed: {}", body);
    (
        body["server"]["id"].as_str().expect("server id").to_string(),
        body["server_key"].as_str().expect("server_key").to_string(),
    )
}
