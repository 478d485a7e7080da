use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;

use crate::models::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomSummary {
    game_id: String,
    players_count: usize,
    plies: usize,
    status: String,
}

/// HTTP handler for the index page
pub async fn index() -> impl Responder {
    HttpResponse::Ok().body("Chess Sync relay")
}

/// Lists the rooms the relay currently holds.
pub async fn list_rooms(app_state: web::Data<AppState>) -> impl Responder {
    let mut rooms: Vec<RoomSummary> = app_state
        .rooms()
        .values()
        .map(|room| RoomSummary {
            game_id: room.game_id().to_string(),
            players_count: room.players_count(),
            plies: room.session().log().len(),
            status: room.session().status().to_string(),
        })
        .collect();
    rooms.sort_by(|a, b| a.game_id.cmp(&b.game_id));
    HttpResponse::Ok().json(rooms)
}

/// Configure the HTTP routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ws").route(web::get().to(crate::websocket::ws_index)))
        .service(web::resource("/rooms").route(web::get().to(list_rooms)))
        .service(web::resource("/").route(web::get().to(index)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{ChessRules, TimeControl};
    use crate::websocket::Room;
    use actix_web::{test, App};
    use std::sync::Arc;

    fn state() -> web::Data<AppState> {
        web::Data::new(AppState::new(Arc::new(ChessRules::new()), TimeControl::default()))
    }

    #[actix_web::test]
    async fn test_index() {
        let app = test::init_service(App::new().app_data(state()).configure(configure_routes)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_list_rooms() {
        let state = state();
        {
            let mut room = Room::new("g1", state.rules.clone(), state.time_control);
            room.join("alice", "c1").unwrap();
            state.rooms().insert("g1".to_string(), room);
        }
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure_routes)).await;
        let body: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/rooms").to_request()).await;

        assert_eq!(body[0]["gameId"], "g1");
        assert_eq!(body[0]["playersCount"], 1);
        assert_eq!(body[0]["status"], "in progress");
    }

    #[actix_web::test]
    async fn test_ws_requires_upgrade() {
        let app = test::init_service(App::new().app_data(state()).configure(configure_routes)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/ws?player=p1").to_request()).await;
        assert!(resp.status().is_client_error());
    }
}
