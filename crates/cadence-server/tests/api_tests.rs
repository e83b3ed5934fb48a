//! Integration tests for the HTTP surface.
//!
//! Each test runs against a fresh temp database, exercising the routes
//! end to end: record completions, read streaks, and round-trip the
//! aggregate statistics through the rollup cache.

use axum::http::StatusCode;
use axum::Router;
use axum_test::TestServer;
use cadence_server::{config::Config, routes, state::AppState};
use cadence_types::{CompletionEvent, PeriodRollup, StreakRecord};
use chrono::{Duration, Local};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

fn test_app() -> (TestServer, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        db_path: dir.path().join("test.db"),
        upstream_timeout_ms: 500,
    };
    let state = Arc::new(AppState::new(config).expect("Failed to create AppState"));
    let app = Router::new()
        .nest("/api", routes::api_router())
        .with_state(state);
    (TestServer::new(app).unwrap(), dir)
}

/// Register a user and one habit, returning their ids.
async fn seed_user_with_habit(server: &TestServer, username: &str, title: &str) -> (i64, i64) {
    let user: Value = server
        .post("/api/users")
        .json(&json!({ "username": username }))
        .await
        .json();
    let user_id = user["id"].as_i64().unwrap();

    let habit: Value = server
        .post("/api/habits")
        .json(&json!({ "user_id": user_id, "title": title }))
        .await
        .json();
    (user_id, habit["id"].as_i64().unwrap())
}

#[tokio::test]
async fn test_health() {
    let (server, _dir) = test_app();
    let response = server.get("/api/health").await;
    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_record_completion_and_read_streak() {
    let (server, _dir) = test_app();
    let (user_id, habit_id) = seed_user_with_habit(&server, "ada", "run").await;
    let today = Local::now().date_naive();
    let yesterday = today - Duration::days(1);

    for date in [yesterday, today] {
        let response = server
            .post("/api/completions")
            .json(&json!({
                "habit_id": habit_id,
                "user_id": user_id,
                "date": date,
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let event: CompletionEvent = response.json();
        assert_eq!(event.completion_date, date);
    }

    let response = server
        .get(&format!("/api/completions/streak/{habit_id}"))
        .add_query_param("user_id", user_id)
        .await;
    response.assert_status(StatusCode::OK);
    let streak: StreakRecord = response.json();
    assert_eq!(streak.current_streak, 2);
    assert_eq!(streak.longest_streak, 2);
    assert_eq!(streak.last_completion_date, Some(today));
}

#[tokio::test]
async fn test_duplicate_completion_conflicts() {
    let (server, _dir) = test_app();
    let (user_id, habit_id) = seed_user_with_habit(&server, "ada", "run").await;
    let today = Local::now().date_naive();
    let body = json!({
        "habit_id": habit_id,
        "user_id": user_id,
        "date": today,
    });

    server
        .post("/api/completions")
        .json(&body)
        .await
        .assert_status(StatusCode::CREATED);
    server
        .post("/api/completions")
        .json(&body)
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_completion_requires_known_active_habit() {
    let (server, _dir) = test_app();
    let (user_id, habit_id) = seed_user_with_habit(&server, "ada", "run").await;
    let today = Local::now().date_naive();

    // Unknown habit
    server
        .post("/api/completions")
        .json(&json!({
            "habit_id": habit_id + 99,
            "user_id": user_id,
            "date": today,
        }))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    // Unknown user
    server
        .post("/api/completions")
        .json(&json!({
            "habit_id": habit_id,
            "user_id": user_id + 99,
            "date": today,
        }))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    // Deactivated habit
    server
        .delete(&format!("/api/habits/{habit_id}"))
        .add_query_param("user_id", user_id)
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .post("/api/completions")
        .json(&json!({
            "habit_id": habit_id,
            "user_id": user_id,
            "date": today,
        }))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    // Missing date field
    server
        .post("/api/completions")
        .json(&json!({ "habit_id": habit_id, "user_id": user_id }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_completions_filters_and_orders() {
    let (server, _dir) = test_app();
    let (user_id, habit_id) = seed_user_with_habit(&server, "ada", "run").await;
    let today = Local::now().date_naive();

    for days_ago in [0, 1, 2] {
        server
            .post("/api/completions")
            .json(&json!({
                "habit_id": habit_id,
                "user_id": user_id,
                "date": today - Duration::days(days_ago),
            }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let response = server
        .get("/api/completions")
        .add_query_param("user_id", user_id)
        .await;
    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["count"], 3);
    let listed = body["completions"].as_array().unwrap();
    assert_eq!(listed[0]["completion_date"], json!(today.to_string()));

    // A single date collapses the range.
    let response = server
        .get("/api/completions")
        .add_query_param("user_id", user_id)
        .add_query_param("date", today)
        .await;
    let body: Value = response.json();
    assert_eq!(body["count"], 1);

    // Inverted range is a validation error.
    server
        .get("/api/completions")
        .add_query_param("user_id", user_id)
        .add_query_param("start_date", today)
        .add_query_param("end_date", today - Duration::days(1))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stats_flow_through_cache() {
    let (server, _dir) = test_app();
    let (user_id, habit_id) = seed_user_with_habit(&server, "ada", "run").await;
    let today = Local::now().date_naive();

    server
        .post("/api/completions")
        .json(&json!({
            "habit_id": habit_id,
            "user_id": user_id,
            "date": today,
        }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server
        .get("/api/stats/daily")
        .add_query_param("user_id", user_id)
        .await;
    response.assert_status(StatusCode::OK);
    let daily: PeriodRollup = response.json();
    assert_eq!(daily.total_habits, 1);
    assert_eq!(daily.completed_count, 1);
    assert_eq!(daily.completion_percentage, 100.0);

    let response = server
        .get("/api/stats/weekly")
        .add_query_param("user_id", user_id)
        .await;
    response.assert_status(StatusCode::OK);
    let weekly: PeriodRollup = response.json();
    assert_eq!(weekly.total_eligible, 7);
    assert_eq!(weekly.completed_count, 1);
    assert!(weekly.completion_percentage > 0.0 && weekly.completion_percentage <= 100.0);

    let response = server
        .get("/api/stats/monthly")
        .add_query_param("user_id", user_id)
        .await;
    response.assert_status(StatusCode::OK);
    let monthly: PeriodRollup = response.json();
    assert_eq!(monthly.completed_count, 1);

    // Reading the same week again hits the cached row.
    let response = server
        .get("/api/stats/weekly")
        .add_query_param("user_id", user_id)
        .await;
    let cached: PeriodRollup = response.json();
    assert_eq!(cached, weekly);
}

#[tokio::test]
async fn test_monthly_stats_rejects_malformed_key() {
    let (server, _dir) = test_app();
    let (user_id, _habit_id) = seed_user_with_habit(&server, "ada", "run").await;

    for bad in ["2024-13", "202401", "next-month"] {
        server
            .get("/api/stats/monthly")
            .add_query_param("user_id", user_id)
            .add_query_param("month", bad)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_stats_for_user_without_habits_are_zero() {
    let (server, _dir) = test_app();
    let user: Value = server
        .post("/api/users")
        .json(&json!({ "username": "grace" }))
        .await
        .json();
    let user_id = user["id"].as_i64().unwrap();

    let response = server
        .get("/api/stats/daily")
        .add_query_param("user_id", user_id)
        .await;
    response.assert_status(StatusCode::OK);
    let daily: PeriodRollup = response.json();
    assert_eq!(daily.total_habits, 0);
    assert_eq!(daily.completion_percentage, 0.0);
}

#[tokio::test]
async fn test_recalculate_is_accepted() {
    let (server, _dir) = test_app();
    let (user_id, _habit_id) = seed_user_with_habit(&server, "ada", "run").await;

    let response = server
        .post("/api/stats/recalculate")
        .json(&json!({ "user_id": user_id }))
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["accepted"], true);
}

#[tokio::test]
async fn test_habits_with_streaks_listing() {
    let (server, _dir) = test_app();
    let (user_id, running) = seed_user_with_habit(&server, "ada", "run").await;
    let reading: Value = server
        .post("/api/habits")
        .json(&json!({ "user_id": user_id, "title": "read" }))
        .await
        .json();
    let reading_id = reading["id"].as_i64().unwrap();
    let today = Local::now().date_naive();

    // Two-day run for "run", nothing for "read".
    for days_ago in [0, 1] {
        server
            .post("/api/completions")
            .json(&json!({
                "habit_id": running,
                "user_id": user_id,
                "date": today - Duration::days(days_ago),
            }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let response = server
        .get("/api/stats/habits")
        .add_query_param("user_id", user_id)
        .await;
    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    let habits = body["habits"].as_array().unwrap();
    assert_eq!(habits.len(), 2);
    assert_eq!(habits[0]["habit_id"].as_i64().unwrap(), running);
    assert_eq!(habits[0]["current_streak"], 2);
    assert_eq!(habits[1]["habit_id"].as_i64().unwrap(), reading_id);
    assert_eq!(habits[1]["current_streak"], 0);
}

#[tokio::test]
async fn test_overview_aggregates() {
    let (server, _dir) = test_app();
    let (user_id, habit_id) = seed_user_with_habit(&server, "ada", "run").await;
    let today = Local::now().date_naive();

    server
        .post("/api/completions")
        .json(&json!({
            "habit_id": habit_id,
            "user_id": user_id,
            "date": today,
        }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server
        .get("/api/stats/overview")
        .add_query_param("user_id", user_id)
        .await;
    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["total_habits"], 1);
    assert_eq!(body["active_habits"], 1);
    assert_eq!(body["completed_today"], 1);
    assert_eq!(body["today_completion_percentage"], 100.0);
    assert_eq!(body["best_current_streak"], 1);
    assert_eq!(body["best_current_streak_habit"], "run");
    assert_eq!(body["total_completions"], 1);
}
