//! Integration tests for the REST clients: saved games, finished games,
//! user stats, the leaderboard and the Lichess import, against stub services
//! that record every request.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use client::clients::api::{ApiClient, NewSavedGame, MAX_SAVED_BATCH};
use client::clients::leaderboard::LeaderboardClient;
use client::clients::lichess::LichessClient;
use client::clients::HttpContext;
use client::config::Config;
use client::profile::Profile;
use client::ClientError;
use serde_json::{json, Value};

const CSRF: &str = "csrf-1";

// ---------------------------------------------------------------------------
// Stub services
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Seen {
    method: &'static str,
    path: String,
    query: HashMap<String, String>,
    csrf: Option<String>,
    body: Value,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Seen>>>);

impl Recorder {
    fn record(&self, method: &'static str, path: String, headers: &HeaderMap, body: Value) {
        self.record_query(method, path, HashMap::new(), headers, body);
    }

    fn record_query(
        &self,
        method: &'static str,
        path: String,
        query: HashMap<String, String>,
        headers: &HeaderMap,
        body: Value,
    ) {
        let csrf = headers
            .get("X-CSRF-Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.0.lock().expect("Poisoned recorder").push(Seen {
            method,
            path,
            query,
            csrf,
            body,
        });
    }

    fn take(&self) -> Vec<Seen> {
        std::mem::take(&mut *self.0.lock().expect("Poisoned recorder"))
    }
}

fn library(count: usize) -> Value {
    let games: Vec<Value> = (1..=count)
        .map(|i| {
            json!({
                "ID": format!("saved-{i}"),
                "UserID": "alice-id",
                "Name": format!("Game {i}"),
                "PGN": "1. e4 e5",
                "LastFEN": "",
                "CreatedAt": "2025-03-01T10:00:00Z"
            })
        })
        .collect();
    Value::Array(games)
}

fn finished_game(id: &str) -> Value {
    json!({
        "game_id": id,
        "white_id": "alice-id",
        "black_id": "bob-id",
        "pgn": "1. f3 e5 2. g4 Qh4#",
        "status": "ended",
        "result": "black",
        "result_reason": "checkmate",
        "last_fen": "",
        "started_at": "2025-03-01T10:00:00Z",
        "ended_at": "2025-03-01T10:01:01.500Z",
        "white_username": "alice",
        "black_username": "bob"
    })
}

async fn create_saved(State(seen): State<Recorder>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    let count = body.as_array().map_or(1, Vec::len);
    seen.record("POST", "/api/savedgame".into(), &headers, body);
    Json(library(count))
}

async fn update_saved(
    State(seen): State<Recorder>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    seen.record("PUT", format!("/api/savedgame/{id}"), &headers, body);
    Json(library(2))
}

async fn delete_saved(State(seen): State<Recorder>, Path(id): Path<String>, headers: HeaderMap) -> Json<Value> {
    seen.record("DELETE", format!("/api/savedgame/{id}"), &headers, Value::Null);
    Json(library(1))
}

async fn games_of(
    State(seen): State<Recorder>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<Value> {
    seen.record_query("GET", "/api/game".into(), query, &headers, Value::Null);
    Json(json!([finished_game("g1"), { "game_id": "g2", "status": "in_progress" }]))
}

async fn game(State(seen): State<Recorder>, Path(id): Path<String>, headers: HeaderMap) -> Json<Value> {
    seen.record("GET", format!("/api/game/{id}"), &headers, Value::Null);
    Json(finished_game(&id))
}

async fn user_stats(State(seen): State<Recorder>, Path(id): Path<String>, headers: HeaderMap) -> Json<Value> {
    seen.record("GET", format!("/api/userstats/{id}"), &headers, Value::Null);
    Json(json!({
        "Username": "alice",
        "CreatedAt": "2024-01-15T00:00:00Z",
        "Stats": { "wins": 1, "draws": 1, "losses": 2, "games_played": 4 }
    }))
}

async fn top_active(
    State(seen): State<Recorder>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<Value> {
    seen.record_query("GET", "/fide/top_active/".into(), query, &headers, Value::Null);
    Json(json!([
        { "rank": 1, "name": "Carlsen, Magnus", "fide_id": 1503014, "country": "NOR", "rating": 2831 },
        { "rank": 2, "name": "Nobody", "fide_id": null, "country": null, "rating": 2700 }
    ]))
}

async fn lichess_games(
    State(seen): State<Recorder>,
    Path(username): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    seen.record_query(
        "GET",
        format!("/api/games/user/{username}"),
        query,
        &headers,
        Value::String(accept),
    );
    if username != "alice" {
        return (StatusCode::NOT_FOUND, "No such user").into_response();
    }
    let line = json!({
        "id": "li1",
        "players": { "white": { "user": { "name": "alice" } }, "black": { "aiLevel": 2 } },
        "pgn": "1. e4 e5 *"
    });
    format!("{line}\n").into_response()
}

async fn spawn_services() -> (Config, Recorder) {
    let seen = Recorder::default();
    let app = Router::new()
        .route("/api/savedgame", post(create_saved))
        .route("/api/savedgame/{id}", put(update_saved).delete(delete_saved))
        .route("/api/game", get(games_of))
        .route("/api/game/{id}", get(game))
        .route("/api/userstats/{id}", get(user_stats))
        .route("/api/games/user/{username}", get(lichess_games))
        .route("/fide/top_active/", get(top_active))
        .with_state(seen.clone());
    let base_url = common::serve(app).await;
    (common::config(&base_url), seen)
}

fn api(config: &Config) -> ApiClient {
    let http = HttpContext::new(config).expect("Failed to build HTTP client");
    ApiClient::new(http, config.clone(), Some(CSRF.to_string()))
}

fn new_game(name: &str) -> NewSavedGame {
    NewSavedGame {
        pgn: "1. d4 d5".into(),
        name: name.into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_single_save_is_sent_as_an_object() {
    let (config, seen) = spawn_services().await;

    let library = api(&config)
        .create_saved_games(&[new_game("Queen pawn")])
        .await
        .expect("Save failed");
    assert_eq!(library.len(), 1);

    let requests = seen.take();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].csrf.as_deref(), Some(CSRF));
    assert_eq!(requests[0].body, json!({ "PGN": "1. d4 d5", "Name": "Queen pawn" }));
}

#[tokio::test]
async fn test_batch_save_is_sent_as_an_array() {
    let (config, seen) = spawn_services().await;

    let library = api(&config)
        .create_saved_games(&[new_game("One"), new_game("Two")])
        .await
        .expect("Save failed");
    assert_eq!(library.len(), 2);

    let requests = seen.take();
    assert_eq!(
        requests[0].body,
        json!([
            { "PGN": "1. d4 d5", "Name": "One" },
            { "PGN": "1. d4 d5", "Name": "Two" }
        ])
    );
}

#[tokio::test]
async fn test_batches_outside_limits_are_not_sent() {
    let (config, seen) = spawn_services().await;
    let api = api(&config);

    let err = api.create_saved_games(&[]).await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));

    let too_many: Vec<NewSavedGame> = (0..=MAX_SAVED_BATCH).map(|i| new_game(&i.to_string())).collect();
    let err = api.create_saved_games(&too_many).await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));

    assert!(seen.take().is_empty());
}

#[tokio::test]
async fn test_update_and_delete_answer_with_the_library() {
    let (config, seen) = spawn_services().await;
    let api = api(&config);

    let library = api
        .update_saved_game("saved-7", &new_game("Renamed"))
        .await
        .expect("Update failed");
    assert_eq!(library.len(), 2);

    let library = api.delete_saved_game("saved-7").await.expect("Delete failed");
    assert_eq!(library.len(), 1);
    assert_eq!(library[0].game_id, "saved-1");

    let requests = seen.take();
    assert_eq!(requests[0].method, "PUT");
    assert_eq!(requests[0].path, "/api/savedgame/saved-7");
    assert_eq!(requests[0].body, json!({ "PGN": "1. d4 d5", "Name": "Renamed" }));
    assert_eq!(requests[1].method, "DELETE");
    assert_eq!(requests[1].path, "/api/savedgame/saved-7");
    assert!(requests.iter().all(|r| r.csrf.as_deref() == Some(CSRF)));
}

#[tokio::test]
async fn test_games_and_stats_build_a_profile() {
    let (config, seen) = spawn_services().await;
    let api = api(&config);

    let game = api.game("g1").await.expect("Game failed");
    assert_eq!(game.result_reason, "checkmate");
    assert_eq!(game.white_username, "alice");

    let profile = Profile::load(&api, "alice-id").await.expect("Profile failed");
    assert_eq!(profile.username, "alice");
    assert_eq!(profile.member_since, "January 15, 2024");
    assert_eq!(profile.percentages.losses, 50);
    assert_eq!(profile.matches.len(), 1);
    assert_eq!(profile.matches[0].winner, "bob");
    assert_eq!(profile.matches[0].duration_secs, 62);

    let requests = seen.take();
    let paths: Vec<&str> = requests.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["/api/game/g1", "/api/userstats/alice-id", "/api/game"]);
    assert_eq!(requests[2].query.get("user").map(String::as_str), Some("alice-id"));
    assert!(requests.iter().all(|r| r.csrf.as_deref() == Some(CSRF)));
}

#[tokio::test]
async fn test_leaderboard_asks_for_top_hundred() {
    let (config, seen) = spawn_services().await;
    let http = HttpContext::new(&config).expect("Failed to build HTTP client");

    let players = LeaderboardClient::new(http, config.leaderboard_url.clone())
        .top_players()
        .await
        .expect("Leaderboard failed");
    assert_eq!(players.len(), 2);
    assert_eq!(players[0].name, "Carlsen, Magnus");
    assert_eq!(players[1].country, "UN");

    let requests = seen.take();
    assert_eq!(requests[0].query.get("limit").map(String::as_str), Some("100"));
    assert_eq!(requests[0].query.get("history").map(String::as_str), Some("false"));
}

#[tokio::test]
async fn test_lichess_import_clamps_max_and_asks_for_ndjson() {
    let (config, seen) = spawn_services().await;
    let http = HttpContext::new(&config).expect("Failed to build HTTP client");
    let lichess = LichessClient::new(http, config.lichess_url.clone());

    let games = lichess.fetch_user_games("alice", 50).await.expect("Import failed");
    assert_eq!(games.len(), 1);
    assert_eq!(games[0].name, "alice vs Stockfish");

    let err = lichess.fetch_user_games("nobody", 0).await.unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 404, .. }));

    let requests = seen.take();
    let query = &requests[0].query;
    assert_eq!(query.get("max").map(String::as_str), Some("20"));
    assert_eq!(query.get("pgnInJson").map(String::as_str), Some("true"));
    assert_eq!(query.get("lastFen").map(String::as_str), Some("true"));
    assert_eq!(requests[0].body, json!("application/x-ndjson"));
    assert_eq!(requests[1].path, "/api/games/user/nobody");
    assert_eq!(requests[1].query.get("max").map(String::as_str), Some("1"));
}
