//! End-to-end tests over a live server: the full pipeline from rate limiting
//! through authentication, authorization and the handlers, backed by the
//! in-memory stores.

mod common;

use chrono::Duration;
use reqwest::StatusCode;
use serde_json::{json, Value};

use marquee::data::{Token, TokenScope};

use common::{seed_user, spawn_app, spawn_app_with, test_config};

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

#[tokio::test]
async fn anonymous_request_to_protected_route_gets_401() {
    let app = spawn_app().await;

    let resp = app
        .client
        .get(app.url("/v1/healthcheck"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        resp.headers().get("www-authenticate").unwrap(),
        "Bearer"
    );
}

#[tokio::test]
async fn malformed_bearer_token_gets_401_without_store_lookup() {
    let app = spawn_app().await;

    for bad in [
        "Bearer",
        "Bearer too-short",
        "Basic QWxhZGRpbg==",
        "Bearer aaaaaaaaaaaaaaaaaaaaaaaaaa",
    ] {
        let resp = app
            .client
            .get(app.url("/v1/healthcheck"))
            .header("Authorization", bad)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "header {bad:?}");
    }
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let app = spawn_app().await;
    let (user, _) = seed_user(&app, "expired@example.com", "pa55word1234", true, &[]).await;

    let stale = Token::generate(user.id, Duration::hours(-1), TokenScope::Authentication);
    app.stores.tokens.insert(&stale).await.unwrap();

    let resp = app
        .client
        .get(app.url("/v1/healthcheck"))
        .header("Authorization", bearer(&stale.plaintext))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_scope_is_not_interchangeable() {
    let app = spawn_app().await;
    let (user, _) = seed_user(&app, "scoped@example.com", "pa55word1234", true, &[]).await;

    let activation = Token::generate(user.id, Duration::hours(1), TokenScope::Activation);
    app.stores.tokens.insert(&activation).await.unwrap();

    let resp = app
        .client
        .get(app.url("/v1/healthcheck"))
        .header("Authorization", bearer(&activation.plaintext))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unactivated_account_is_403_before_permission_checks() {
    let app = spawn_app().await;
    let (_, token) = seed_user(
        &app,
        "inactive@example.com",
        "pa55word1234",
        false,
        &["movies:read", "movies:write"],
    )
    .await;

    let resp = app
        .client
        .get(app.url("/v1/movies"))
        .header("Authorization", bearer(&token))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("activated"));
}

#[tokio::test]
async fn missing_permission_is_403() {
    let app = spawn_app().await;
    let (_, token) = seed_user(
        &app,
        "reader@example.com",
        "pa55word1234",
        true,
        &["movies:read"],
    )
    .await;

    let ok = app
        .client
        .get(app.url("/v1/movies"))
        .header("Authorization", bearer(&token))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);

    let denied = app
        .client
        .post(app.url("/v1/movies"))
        .header("Authorization", bearer(&token))
        .json(&json!({
            "title": "Moana",
            "year": 2016,
            "runtime": 107,
            "genres": ["animation"],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn movie_crud_flow_with_version_increments() {
    let app = spawn_app().await;
    let (_, token) = seed_user(
        &app,
        "editor@example.com",
        "pa55word1234",
        true,
        &["movies:read", "movies:write"],
    )
    .await;

    let created = app
        .client
        .post(app.url("/v1/movies"))
        .header("Authorization", bearer(&token))
        .json(&json!({
            "title": "Casablanca",
            "year": 1942,
            "runtime": 102,
            "genres": ["drama", "romance"],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let location = created
        .headers()
        .get("location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body: Value = created.json().await.unwrap();
    let id = body["movie"]["id"].as_i64().unwrap();
    assert_eq!(location, format!("/v1/movies/{id}"));
    assert_eq!(body["movie"]["version"], 1);

    let updated = app
        .client
        .patch(app.url(&location))
        .header("Authorization", bearer(&token))
        .json(&json!({ "runtime": 103 }))
        .send()
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);
    let body: Value = updated.json().await.unwrap();
    assert_eq!(body["movie"]["version"], 2);
    assert_eq!(body["movie"]["runtime"], 103);
    assert_eq!(body["movie"]["title"], "Casablanca");

    let deleted = app
        .client
        .delete(app.url(&location))
        .header("Authorization", bearer(&token))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);

    // Second delete finds nothing.
    let again = app
        .client
        .delete(app.url(&location))
        .header("Authorization", bearer(&token))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_patches_surface_the_edit_conflict_as_409() {
    let app = spawn_app().await;
    let (_, token) = seed_user(
        &app,
        "racer@example.com",
        "pa55word1234",
        true,
        &["movies:read", "movies:write"],
    )
    .await;

    let created = app
        .client
        .post(app.url("/v1/movies"))
        .header("Authorization", bearer(&token))
        .json(&json!({
            "title": "Rashomon",
            "year": 1950,
            "runtime": 88,
            "genres": ["drama"],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let body: Value = created.json().await.unwrap();
    let id = body["movie"]["id"].as_i64().unwrap();
    let movie_url = app.url(&format!("/v1/movies/{id}"));

    // Fire batches of concurrent read-modify-write updates until two of them
    // interleave. Every response must be a clean win or a conflict, and the
    // stored version must account for exactly the wins.
    let mut wins = 0i64;
    let mut conflict: Option<Value> = None;
    for round in 0..25i32 {
        let mut handles = Vec::new();
        for lane in 0..4i32 {
            let client = app.client.clone();
            let url = movie_url.clone();
            let auth = bearer(&token);
            handles.push(tokio::spawn(async move {
                let resp = client
                    .patch(&url)
                    .header("Authorization", auth)
                    .json(&json!({ "runtime": 90 + round * 4 + lane }))
                    .send()
                    .await
                    .unwrap();
                let status = resp.status();
                let body: Value = resp.json().await.unwrap();
                (status, body)
            }));
        }
        for handle in handles {
            let (status, body) = handle.await.unwrap();
            match status {
                StatusCode::OK => wins += 1,
                StatusCode::CONFLICT => conflict = Some(body),
                other => panic!("unexpected status {other}"),
            }
        }
        if conflict.is_some() {
            break;
        }
    }

    let conflict = conflict.expect("no edit conflict observed under contention");
    assert_eq!(
        conflict["error"],
        "unable to update the record due to an edit conflict, please try again"
    );

    let shown = app
        .client
        .get(&movie_url)
        .header("Authorization", bearer(&token))
        .send()
        .await
        .unwrap();
    let body: Value = shown.json().await.unwrap();
    assert_eq!(body["movie"]["version"].as_i64().unwrap(), 1 + wins);
}

#[tokio::test]
async fn invalid_movie_payload_is_422_with_field_errors() {
    let app = spawn_app().await;
    let (_, token) = seed_user(
        &app,
        "writer@example.com",
        "pa55word1234",
        true,
        &["movies:write"],
    )
    .await;

    let resp = app
        .client
        .post(app.url("/v1/movies"))
        .header("Authorization", bearer(&token))
        .json(&json!({
            "title": "",
            "year": 1800,
            "runtime": -5,
            "genres": [],
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = resp.json().await.unwrap();
    for field in ["title", "year", "runtime", "genres"] {
        assert!(body["error"][field].is_string(), "missing error for {field}");
    }
}

#[tokio::test]
async fn registration_activation_and_login_round_trip() {
    let app = spawn_app().await;

    let registered = app
        .client
        .post(app.url("/v1/users"))
        .json(&json!({
            "name": "Alice",
            "email": "alice@example.com",
            "password": "pa55word1234",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(registered.status(), StatusCode::ACCEPTED);
    let body: Value = registered.json().await.unwrap();
    let user_id = body["user"]["id"].as_i64().unwrap();
    assert_eq!(body["user"]["activated"], false);
    assert!(body["user"]["password_hash"].is_null());

    // The activation token travels by email; mint a fresh one directly.
    let activation = Token::generate(user_id, Duration::hours(1), TokenScope::Activation);
    app.stores.tokens.insert(&activation).await.unwrap();

    let activated = app
        .client
        .put(app.url("/v1/users/activated"))
        .json(&json!({ "token": activation.plaintext }))
        .send()
        .await
        .unwrap();
    assert_eq!(activated.status(), StatusCode::OK);
    let body: Value = activated.json().await.unwrap();
    assert_eq!(body["user"]["activated"], true);

    let login = app
        .client
        .post(app.url("/v1/tokens/authentication"))
        .json(&json!({
            "email": "alice@example.com",
            "password": "pa55word1234",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(login.status(), StatusCode::CREATED);
    let body: Value = login.json().await.unwrap();
    let token = body["authentication_token"]["token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 26);

    // Registration granted read access; the healthcheck only needs activation.
    let health = app
        .client
        .get(app.url("/v1/healthcheck"))
        .header("Authorization", bearer(&token))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn duplicate_registration_is_422() {
    let app = spawn_app().await;
    seed_user(&app, "taken@example.com", "pa55word1234", true, &[]).await;

    let resp = app
        .client
        .post(app.url("/v1/users"))
        .json(&json!({
            "name": "Imposter",
            "email": "taken@example.com",
            "password": "pa55word1234",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["error"]["email"],
        "a user with this email address already exists"
    );
}

#[tokio::test]
async fn wrong_password_is_401_not_404() {
    let app = spawn_app().await;
    seed_user(&app, "bob@example.com", "pa55word1234", true, &[]).await;

    for (email, password) in [
        ("bob@example.com", "wrong-password"),
        ("nobody@example.com", "pa55word1234"),
    ] {
        let resp = app
            .client
            .post(app.url("/v1/tokens/authentication"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "for {email}");
    }
}

#[tokio::test]
async fn password_reset_consumes_the_token() {
    let app = spawn_app().await;
    let (user, _) = seed_user(&app, "carol@example.com", "old-pa55word", true, &[]).await;

    let reset = Token::generate(user.id, Duration::minutes(45), TokenScope::PasswordReset);
    app.stores.tokens.insert(&reset).await.unwrap();

    let resp = app
        .client
        .put(app.url("/v1/users/password"))
        .json(&json!({ "password": "new-pa55word", "token": reset.plaintext }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Replaying the consumed token fails.
    let replay = app
        .client
        .put(app.url("/v1/users/password"))
        .json(&json!({ "password": "another-pa55word", "token": reset.plaintext }))
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // The new password works; the old one does not.
    let login = app
        .client
        .post(app.url("/v1/tokens/authentication"))
        .json(&json!({ "email": "carol@example.com", "password": "new-pa55word" }))
        .send()
        .await
        .unwrap();
    assert_eq!(login.status(), StatusCode::CREATED);

    let old = app
        .client
        .post(app.url("/v1/tokens/authentication"))
        .json(&json!({ "email": "carol@example.com", "password": "old-pa55word" }))
        .send()
        .await
        .unwrap();
    assert_eq!(old.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn burst_is_admitted_and_the_next_request_is_429() {
    let mut config = test_config();
    config.limiter.enabled = true;
    config.limiter.requests_per_second = 0.001;
    config.limiter.burst = 4;
    let app = spawn_app_with(config).await;

    let mut statuses = Vec::new();
    for _ in 0..5 {
        let resp = app
            .client
            .get(app.url("/v1/healthcheck"))
            .send()
            .await
            .unwrap();
        statuses.push(resp.status());
    }

    // The limiter sits in front of authentication, so admitted requests
    // come back 401 here.
    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == StatusCode::UNAUTHORIZED)
            .count(),
        4
    );
    assert_eq!(statuses[4], StatusCode::TOO_MANY_REQUESTS);
}

fn cors_config(origin: &str) -> marquee::config::AppConfig {
    let mut config = test_config();
    config.limiter.enabled = false;
    config.cors.trusted_origins = vec![origin.to_string()];
    config
}

#[tokio::test]
async fn trusted_origin_is_reflected_and_others_are_not() {
    let app = spawn_app_with(cors_config("https://app.example.com")).await;

    let resp = app
        .client
        .post(app.url("/v1/users"))
        .header("Origin", "https://app.example.com")
        .json(&json!({
            "name": "Dana",
            "email": "dana@example.com",
            "password": "pa55word1234",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "https://app.example.com"
    );
    let vary = resp
        .headers()
        .get_all("vary")
        .iter()
        .map(|v| v.to_str().unwrap().to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(",");
    assert!(vary.contains("origin"), "vary was {vary:?}");

    let resp = app
        .client
        .get(app.url("/v1/healthcheck"))
        .header("Origin", "https://evil.example.com")
        .send()
        .await
        .unwrap();
    assert!(resp.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn preflight_from_a_trusted_origin_is_answered_without_auth() {
    let app = spawn_app_with(cors_config("https://app.example.com")).await;

    let resp = app
        .client
        .request(reqwest::Method::OPTIONS, app.url("/v1/movies/1"))
        .header("Origin", "https://app.example.com")
        .header("Access-Control-Request-Method", "PATCH")
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "https://app.example.com"
    );
    let methods = resp
        .headers()
        .get("access-control-allow-methods")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(methods.contains("PATCH"), "methods were {methods:?}");
    let headers = resp
        .headers()
        .get("access-control-allow-headers")
        .unwrap()
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(headers.contains("authorization"), "headers were {headers:?}");
}

#[tokio::test]
async fn unknown_route_is_404_json() {
    let app = spawn_app().await;

    let resp = app
        .client
        .get(app.url("/v1/nope"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "the requested resource could not be found");
}

#[tokio::test]
async fn listing_filters_and_paginates() {
    let app = spawn_app().await;
    let (_, token) = seed_user(
        &app,
        "lister@example.com",
        "pa55word1234",
        true,
        &["movies:read", "movies:write"],
    )
    .await;

    for (title, year, genres) in [
        ("Alien", 1979, vec!["horror", "sci-fi"]),
        ("Aliens", 1986, vec!["action", "sci-fi"]),
        ("Amelie", 2001, vec!["romance"]),
    ] {
        let resp = app
            .client
            .post(app.url("/v1/movies"))
            .header("Authorization", bearer(&token))
            .json(&json!({
                "title": title,
                "year": year,
                "runtime": 120,
                "genres": genres,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let resp = app
        .client
        .get(app.url("/v1/movies?genres=sci-fi&sort=-year"))
        .header("Authorization", bearer(&token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    let titles: Vec<&str> = body["movies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Aliens", "Alien"]);
    assert_eq!(body["metadata"]["total_records"], 2);

    let bad_sort = app
        .client
        .get(app.url("/v1/movies?sort=password_hash"))
        .header("Authorization", bearer(&token))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_sort.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
