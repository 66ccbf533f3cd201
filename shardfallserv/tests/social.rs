//! Accounts and friendships over the REST surface: registration rules,
//! session tokens, and the request/accept/remove friendship cycle.

mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use serde_json::json;

use common::{call, delete, get, post_json, register_player, TestBackend};

#[actix_web::test]
async fn registration_enforces_username_and_password_rules() {
    let backend = TestBackend::new();
    let app = test::init_service(backend.app()).await;

    let (status, body) = call(
        &app,
        post_json(
            "/api/auth/register",
            None,
            json!({"username": "finn", "password": "hunter2-hunter2"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["username"], "finn");
    // Without an explicit display name the username stands in.
    assert_eq!(body["display_name"], "finn");
    assert_eq!(body["tokens"]["token_type"], "Bearer");

    // The username is taken now, regardless of the password.
    let (status, body) = call(
        &app,
        post_json(
            "/api/auth/register",
            None,
            json!({"username": "finn", "password": "another-password"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "username already taken");

    for (username, password) in [
        ("ab", "hunter2-hunter2"),          // too short
        ("has spaces", "hunter2-hunter2"),  // bad characters
        ("znak", "short"),                  // password too short
    ] {
        let (status, _) = call(
            &app,
            post_json(
                "/api/auth/register",
                None,
                json!({"username": username, "password": password}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}/{}", username, password);
    }
}

#[actix_web::test]
async fn login_checks_credentials() {
    let backend = TestBackend::new();
    let app = test::init_service(backend.app()).await;
    register_player(&app, "gwen").await;

    let (status, _) = call(
        &app,
        post_json(
            "/api/auth/login",
            None,
            json!({"username": "gwen", "password": "wrong-password"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(
        &app,
        post_json(
            "/api/auth/login",
            None,
            json!({"username": "nobody", "password": "hunter2-hunter2"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(
        &app,
        post_json(
            "/api/auth/login",
            None,
            json!({"username": "gwen", "password": "hunter2-hunter2"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["tokens"]["access_token"].is_string());
}

#[actix_web::test]
async fn refresh_rotates_tokens_and_rejects_access_tokens() {
    let backend = TestBackend::new();
    let app = test::init_service(backend.app()).await;

    let (status, body) = call(
        &app,
        post_json(
            "/api/auth/register",
            None,
            json!({"username": "holt", "password": "hunter2-hunter2"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let access = body["tokens"]["access_token"].as_str().unwrap().to_string();
    let refresh = body["tokens"]["refresh_token"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        post_json("/api/auth/refresh", None, json!({"refresh_token": refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rotated = body["tokens"]["access_token"].as_str().unwrap().to_string();

    let (status, _) = call(&app, get("/api/players/me", Some(&rotated))).await;
    assert_eq!(status, StatusCode::OK);

    // An access token is not a refresh token, even though both verify.
    let (status, _) = call(
        &app,
        post_json("/api/auth/refresh", None, json!({"refresh_token": access})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // And a refresh token cannot open a player session.
    let refresh_again = body["tokens"]["refresh_token"].as_str().unwrap().to_string();
    let (status, _) = call(&app, get("/api/players/me", Some(&refresh_again))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(
        &app,
        post_json(
            "/api/auth/refresh",
            None,
            json!({"refresh_token": "not-even-a-jwt"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn friendship_cycle_request_accept_list_remove() {
    let backend = TestBackend::new();
    let app = test::init_service(backend.app()).await;
    let ivy = register_player(&app, "ivy").await;
    let jude = register_player(&app, "jude").await;

    let (status, body) = call(
        &app,
        post_json(
            "/api/friends/requests",
            Some(&ivy.access_token),
            json!({"username": "jude"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let request_id = body["request_id"].as_str().expect("request_id").to_string();
    assert_eq!(body["status"], "pending");
    assert_eq!(body["to"]["username"], "jude");

    // Nothing is a friendship yet, in either direction.
    for session in [&ivy, &jude] {
        let (status, body) = call(&app, get("/api/friends", Some(&session.access_token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["friends"].as_array().expect("friends").len(), 0);
    }

    // The request shows up for the addressee only.
    let (status, body) = call(
        &app,
        get("/api/friends/requests", Some(&jude.access_token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let requests = body["requests"].as_array().expect("requests");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["from"]["username"], "ivy");

    let (status, body) = call(
        &app,
        get("/api/friends/requests", Some(&ivy.access_token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requests"].as_array().expect("requests").len(), 0);

    // Only the addressee may accept.
    let accept_path = format!("/api/friends/requests/{}/accept", request_id);
    let (status, _) = call(
        &app,
        post_json(&accept_path, Some(&ivy.access_token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &app,
        post_json(&accept_path, Some(&jude.access_token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");

    // Accepting twice is a conflict, not a second friendship.
    let (status, _) = call(
        &app,
        post_json(&accept_path, Some(&jude.access_token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Both sides now see each other.
    let (status, body) = call(&app, get("/api/friends", Some(&ivy.access_token))).await;
    assert_eq!(status, StatusCode::OK);
    let friends = body["friends"].as_array().expect("friends");
    assert_eq!(friends.len(), 1);
    assert_eq!(friends[0]["player"]["username"], "jude");

    let (status, body) = call(&app, get("/api/friends", Some(&jude.access_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["friends"][0]["player"]["username"], "ivy");

    // Removal works from either side and leaves nothing behind.
    let (status, _) = call(
        &app,
        delete(
            &format!("/api/friends/{}", ivy.player_id),
            Some(&jude.access_token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, get("/api/friends", Some(&ivy.access_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["friends"].as_array().expect("friends").len(), 0);

    let (status, _) = call(
        &app,
        delete(
            &format!("/api/friends/{}", jude.player_id),
            Some(&ivy.access_token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn friend_requests_reject_self_unknown_and_duplicates() {
    let backend = TestBackend::new();
    let app = test::init_service(backend.app()).await;
    let kit = register_player(&app, "kit").await;
    register_player(&app, "lena").await;

    let (status, body) = call(
        &app,
        post_json(
            "/api/friends/requests",
            Some(&kit.access_token),
            json!({"username": "kit"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "cannot befriend yourself");

    let (status, _) = call(
        &app,
        post_json(
            "/api/friends/requests",
            Some(&kit.access_token),
            json!({"username": "nobody"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        post_json(
            "/api/friends/requests",
            Some(&kit.access_token),
            json!({"username": "lena"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // A repeat in the same direction is a duplicate.
    let (status, body) = call(
        &app,
        post_json(
            "/api/friends/requests",
            Some(&kit.access_token),
            json!({"username": "lena"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "request already pending");
}
