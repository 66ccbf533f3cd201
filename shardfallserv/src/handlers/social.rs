// Friends and friend-request endpoints
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::authenticated_player;
use crate::db::{self, DbPool, Friendship};
use shardfall::auth::SessionAuth;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_ACCEPTED: &str = "accepted";

#[derive(Deserialize)]
pub struct FriendRequest {
    pub username: String,
}

fn player_summary(db: &DbPool, player_id: &str) -> serde_json::Value {
    match db::get_player_by_id(db, player_id) {
        Ok(Some(player)) => serde_json::json!({
            "id": player.id,
            "username": player.username,
            "display_name": player.display_name,
        }),
        _ => serde_json::json!({"id": player_id}),
    }
}

/// Send a friend request by username. At most one friendship row exists per
/// pair, whichever direction it was opened from.
pub async fn send_request(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    body: web::Json<FriendRequest>,
) -> HttpResponse {
    let player = match authenticated_player(&req, &auth, &db) {
        Ok(player) => player,
        Err(resp) => return resp,
    };

    let addressee = match db::get_player_by_username(&db, &body.username) {
        Ok(Some(addressee)) => addressee,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({"error": "unknown player"}));
        }
        Err(e) => {
            tracing::error!("Failed to look up friend target: {:?}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}));
        }
    };

    if addressee.id == player.id {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({"error": "cannot befriend yourself"}));
    }

    // One row per unordered pair: check both directions before inserting.
    match db::get_friendship_between(&db, &player.id, &addressee.id) {
        Ok(Some(existing)) => {
            return HttpResponse::Conflict().json(serde_json::json!({
                "error": if existing.status == STATUS_ACCEPTED {
                    "already friends"
                } else {
                    "request already pending"
                }
            }));
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!("Failed to check existing friendship: {:?}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}));
        }
    }

    let friendship = Friendship {
        id: Uuid::new_v4().to_string(),
        requester_id: player.id.clone(),
        addressee_id: addressee.id.clone(),
        status: STATUS_PENDING.to_string(),
        created_at: Utc::now().timestamp(),
    };
    match db::insert_friendship(&db, &friendship) {
        Ok(true) => {
            tracing::info!(
                "Friend request from {} to {}",
                player.username,
                addressee.username
            );
            HttpResponse::Created().json(serde_json::json!({
                "request_id": friendship.id,
                "to": {
                    "id": addressee.id,
                    "username": addressee.username,
                    "display_name": addressee.display_name,
                },
                "status": friendship.status,
            }))
        }
        // Lost a race with the exact same request; fold to the same answer
        // the pre-check gives.
        Ok(false) => HttpResponse::Conflict()
            .json(serde_json::json!({"error": "request already pending"})),
        Err(e) => {
            tracing::error!("Failed to insert friendship: {:?}", e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}

/// Accept a pending request addressed to the caller.
pub async fn accept_request(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    path: web::Path<String>,
) -> HttpResponse {
    let player = match authenticated_player(&req, &auth, &db) {
        Ok(player) => player,
        Err(resp) => return resp,
    };
    let request_id = path.into_inner();

    let friendship = match db::get_friendship(&db, &request_id) {
        Ok(Some(friendship)) => friendship,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({"error": "unknown friend request"}));
        }
        Err(e) => {
            tracing::error!("Failed to load friendship {}: {:?}", request_id, e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}));
        }
    };

    if friendship.addressee_id != player.id {
        tracing::warn!(
            "Player {} tried to accept request {} not addressed to them",
            player.id,
            request_id
        );
        return HttpResponse::Forbidden()
            .json(serde_json::json!({"error": "request is not addressed to you"}));
    }
    if friendship.status != STATUS_PENDING {
        return HttpResponse::Conflict()
            .json(serde_json::json!({"error": "request is not pending"}));
    }

    match db::set_friendship_status(&db, &request_id, STATUS_ACCEPTED) {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "request_id": request_id,
            "status": STATUS_ACCEPTED,
        })),
        Err(e) => {
            tracing::error!("Failed to accept friendship {}: {:?}", request_id, e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}

/// Remove a friend, or cancel/decline a pending request, whichever exists
/// between the caller and the named player.
pub async fn remove_friend(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
    path: web::Path<String>,
) -> HttpResponse {
    let player = match authenticated_player(&req, &auth, &db) {
        Ok(player) => player,
        Err(resp) => return resp,
    };
    let other_id = path.into_inner();

    let friendship = match db::get_friendship_between(&db, &player.id, &other_id) {
        Ok(Some(friendship)) => friendship,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(serde_json::json!({"error": "no friendship with that player"}));
        }
        Err(e) => {
            tracing::error!("Failed to look up friendship: {:?}", e);
            return HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}));
        }
    };

    match db::delete_friendship(&db, &friendship.id) {
        Ok(_) => {
            tracing::info!("Player {} removed friendship {}", player.id, friendship.id);
            HttpResponse::Ok().json(serde_json::json!({"status": "removed"}))
        }
        Err(e) => {
            tracing::error!("Failed to delete friendship {}: {:?}", friendship.id, e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}

/// Accepted friends of the caller.
pub async fn list_friends(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
) -> HttpResponse {
    let player = match authenticated_player(&req, &auth, &db) {
        Ok(player) => player,
        Err(resp) => return resp,
    };

    match db::list_friendships_of(&db, &player.id) {
        Ok(rows) => {
            let friends: Vec<serde_json::Value> = rows
                .iter()
                .map(|friendship| {
                    // The friend is whichever side of the row is not us.
                    let other = if friendship.requester_id == player.id {
                        &friendship.addressee_id
                    } else {
                        &friendship.requester_id
                    };
                    serde_json::json!({
                        "friendship_id": friendship.id,
                        "player": player_summary(&db, other),
                        "since": friendship.created_at,
                    })
                })
                .collect();
            HttpResponse::Ok().json(serde_json::json!({"friends": friends}))
        }
        Err(e) => {
            tracing::error!("Failed to list friends for {}: {:?}", player.id, e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}

/// Pending requests addressed to the caller.
pub async fn list_requests(
    req: HttpRequest,
    db: web::Data<DbPool>,
    auth: web::Data<SessionAuth>,
) -> HttpResponse {
    let player = match authenticated_player(&req, &auth, &db) {
        Ok(player) => player,
        Err(resp) => return resp,
    };

    match db::list_incoming_requests(&db, &player.id) {
        Ok(rows) => {
            let requests: Vec<serde_json::Value> = rows
                .iter()
                .map(|friendship| {
                    serde_json::json!({
                        "request_id": friendship.id,
                        "from": player_summary(&db, &friendship.requester_id),
                        "created_at": friendship.created_at,
                    })
                })
                .collect();
            HttpResponse::Ok().json(serde_json::json!({"requests": requests}))
        }
        Err(e) => {
            tracing::error!("Failed to list requests for {}: {:?}", player.id, e);
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "database error"}))
        }
    }
}
