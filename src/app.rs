use std::net::SocketAddr;

use axum::{extract::State, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::AppError;
use crate::state::AppState;
use crate::{auth, board, tasks};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(tasks::router())
                .merge(board::router())
                .route("/health", get(health)),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

async fn health(State(state): State<AppState>) -> Result<&'static str, AppError> {
    state.repo.ping().await?;
    Ok("ok")
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::services::today;
    use axum::{
        body::Body,
        http::{header, HeaderMap, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use time::Duration;
    use tower::ServiceExt;

    struct Reply {
        status: StatusCode,
        headers: HeaderMap,
        body: Value,
    }

    enum Auth<'a> {
        None,
        Bearer(&'a str),
        Cookie(&'a str),
    }

    async fn send(app: &Router, method: Method, uri: &str, auth: Auth<'_>, body: Option<Value>) -> Reply {
        let mut req = Request::builder().method(method).uri(uri);
        match auth {
            Auth::None => {}
            Auth::Bearer(t) => req = req.header(header::AUTHORIZATION, format!("Bearer {t}")),
            Auth::Cookie(c) => req = req.header(header::COOKIE, c),
        }
        let req = match body {
            Some(v) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&v).unwrap()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        Reply { status, headers, body }
    }

    fn registration(username: &str, email: &str) -> Value {
        json!({
            "username": username,
            "password": "StrongP@ss1",
            "firstName": "Alice",
            "lastName": "A",
            "email": email,
        })
    }

    async fn register_and_login(app: &Router, username: &str) -> String {
        let reg = send(
            app,
            Method::POST,
            "/api/register",
            Auth::None,
            Some(registration(username, &format!("{username}@x.io"))),
        )
        .await;
        assert_eq!(reg.status, StatusCode::CREATED);
        let login = send(
            app,
            Method::POST,
            "/api/login",
            Auth::None,
            Some(json!({"username": username, "password": "StrongP@ss1"})),
        )
        .await;
        assert_eq!(login.status, StatusCode::OK);
        login.body["token"].as_str().unwrap().to_owned()
    }

    #[tokio::test]
    async fn account_lifecycle_with_cookie() {
        let app = build_app(AppState::fake());

        let reg = send(&app, Method::POST, "/api/register", Auth::None, Some(registration("alice", "alice@x.io"))).await;
        assert_eq!(reg.status, StatusCode::CREATED);

        let creds = json!({"username": "alice", "password": "StrongP@ss1"});
        let login = send(&app, Method::POST, "/api/login", Auth::None, Some(creds.clone())).await;
        assert_eq!(login.status, StatusCode::OK);
        let set_cookie = login.headers[header::SET_COOKIE].to_str().unwrap().to_owned();
        assert!(set_cookie.contains("HttpOnly"));
        let cookie = set_cookie.split(';').next().unwrap().to_owned();

        let me = send(&app, Method::GET, "/api/me", Auth::Cookie(&cookie), None).await;
        assert_eq!(me.status, StatusCode::OK);
        assert_eq!(me.body["username"], "alice");
        assert_eq!(me.body["fullName"], "Alice A");
        assert!(me.body.get("passwordHash").is_none());
        assert!(me.body.get("password_hash").is_none());

        let del = send(&app, Method::DELETE, "/api/me", Auth::Cookie(&cookie), None).await;
        assert_eq!(del.status, StatusCode::NO_CONTENT);

        let again = send(&app, Method::POST, "/api/login", Auth::None, Some(creds)).await;
        assert_eq!(again.status, StatusCode::UNAUTHORIZED);
        assert_eq!(again.body["message"], "invalid credentials");

        let stale = send(&app, Method::GET, "/api/me", Auth::Cookie(&cookie), None).await;
        assert_eq!(stale.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let app = build_app(AppState::fake());
        let first = send(&app, Method::POST, "/api/register", Auth::None, Some(registration("bob", "bob@x.io"))).await;
        assert_eq!(first.status, StatusCode::CREATED);

        let second = send(&app, Method::POST, "/api/register", Auth::None, Some(registration("robert", "bob@x.io"))).await;
        assert_eq!(second.status, StatusCode::CONFLICT);
        assert_eq!(second.body["kind"], "Conflict");
        assert_eq!(second.body["reason"], "EmailTaken");
    }

    #[tokio::test]
    async fn login_failures_look_the_same() {
        let app = build_app(AppState::fake());
        register_and_login(&app, "carol").await;
        let wrong_pw = send(&app, Method::POST, "/api/login", Auth::None, Some(json!({"username": "carol", "password": "Nope123!"}))).await;
        let unknown = send(&app, Method::POST, "/api/login", Auth::None, Some(json!({"username": "nobody", "password": "Nope123!"}))).await;
        assert_eq!(wrong_pw.status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_pw.body, unknown.body);
    }

    #[tokio::test]
    async fn board_projection_over_http() {
        let app = build_app(AppState::fake());
        let token = register_and_login(&app, "alice").await;
        let today = today();
        let iso = |d: time::Date| {
            format!("{:04}-{:02}-{:02}", d.year(), u8::from(d.month()), d.day())
        };

        let mut ids = Vec::new();
        for (title, status, offset) in [("T1", "Offen", -1), ("T2", "Offen", 2), ("T3", "Erledigt", -3)] {
            let body = json!({
                "title": title,
                "status": status,
                "dueDate": iso(today + Duration::days(offset)),
            });
            let created = send(&app, Method::POST, "/api/tasks", Auth::Bearer(&token), Some(body)).await;
            assert_eq!(created.status, StatusCode::CREATED);
            assert!(created.headers.contains_key(header::LOCATION));
            ids.push(created.body["id"].clone());
        }

        let board = send(&app, Method::GET, "/api/board", Auth::Bearer(&token), None).await;
        assert_eq!(board.status, StatusCode::OK);
        let b = board.body;
        assert_eq!(b["overdue"].as_array().unwrap().len(), 1);
        assert_eq!(b["overdue"][0]["id"], ids[0]);
        assert_eq!(b["upcoming"].as_array().unwrap().len(), 1);
        assert_eq!(b["upcoming"][0]["id"], ids[1]);
        assert_eq!(b["nextDeadline"]["id"], ids[0]);
        assert_eq!(b["counts"], json!({"open": 2, "inProgress": 0, "done": 1}));

        let searched = send(&app, Method::GET, "/api/board?q=t3", Auth::Bearer(&token), None).await;
        assert_eq!(searched.body["counts"], json!({"open": 0, "inProgress": 0, "done": 1}));
    }

    #[tokio::test]
    async fn foreign_task_is_not_found() {
        let app = build_app(AppState::fake());
        let alice = register_and_login(&app, "alice").await;
        let bob = register_and_login(&app, "bob").await;

        let created = send(&app, Method::POST, "/api/tasks", Auth::Bearer(&alice), Some(json!({"title": "secret"}))).await;
        let uri = format!("/api/tasks/{}", created.body["id"].as_str().unwrap());

        let peek = send(&app, Method::GET, &uri, Auth::Bearer(&bob), None).await;
        assert_eq!(peek.status, StatusCode::NOT_FOUND);
        assert_eq!(peek.body["kind"], "NotFound");
        let listed = send(&app, Method::GET, "/api/tasks", Auth::Bearer(&bob), None).await;
        assert_eq!(listed.body, json!([]));
        let own = send(&app, Method::GET, &uri, Auth::Bearer(&alice), None).await;
        assert_eq!(own.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn concurrent_moves_echo_authoritative_status() {
        let app = build_app(AppState::fake());
        let token = register_and_login(&app, "alice").await;
        let created = send(&app, Method::POST, "/api/tasks", Auth::Bearer(&token), Some(json!({"title": "race"}))).await;
        let id = created.body["id"].as_str().unwrap().to_owned();
        let uri = format!("/api/tasks/{id}/status");

        let (a, b) = tokio::join!(
            send(&app, Method::POST, &uri, Auth::Bearer(&token), Some(json!({"status": "In Bearbeitung"}))),
            send(&app, Method::POST, &uri, Auth::Bearer(&token), Some(json!({"status": "Erledigt"}))),
        );
        assert_eq!(a.status, StatusCode::OK);
        assert_eq!(b.status, StatusCode::OK);
        assert_eq!(a.body["status"], "In Bearbeitung");
        assert_eq!(b.body["status"], "Erledigt");

        let after = send(&app, Method::GET, &format!("/api/tasks/{id}"), Auth::Bearer(&token), None).await;
        let final_status = after.body["status"].clone();
        assert!(final_status == a.body["status"] || final_status == b.body["status"]);
    }

    #[tokio::test]
    async fn update_then_clear_due_date() {
        let app = build_app(AppState::fake());
        let token = register_and_login(&app, "alice").await;
        let created = send(
            &app,
            Method::POST,
            "/api/tasks",
            Auth::Bearer(&token),
            Some(json!({"title": "dated", "dueDate": "2030-01-01", "priority": "Hoch"})),
        )
        .await;
        let uri = format!("/api/tasks/{}", created.body["id"].as_str().unwrap());

        let kept = send(&app, Method::PUT, &uri, Auth::Bearer(&token), Some(json!({"description": "more"}))).await;
        assert_eq!(kept.status, StatusCode::OK);
        assert_eq!(kept.body["dueDate"], "2030-01-01");
        assert_eq!(kept.body["priority"], "Hoch");

        let cleared = send(&app, Method::PUT, &uri, Auth::Bearer(&token), Some(json!({"dueDate": null}))).await;
        assert_eq!(cleared.body["dueDate"], Value::Null);
        assert_eq!(cleared.body["description"], "more");

        let bad = send(&app, Method::PUT, &uri, Auth::Bearer(&token), Some(json!({"status": "Later"}))).await;
        assert_eq!(bad.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(bad.body["kind"], "DomainViolation");

        let gone = send(&app, Method::DELETE, &uri, Auth::Bearer(&token), None).await;
        assert_eq!(gone.status, StatusCode::NO_CONTENT);
        let again = send(&app, Method::DELETE, &uri, Auth::Bearer(&token), None).await;
        assert_eq!(again.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn logout_invalidates_token() {
        let app = build_app(AppState::fake());
        let token = register_and_login(&app, "alice").await;
        let out = send(&app, Method::POST, "/api/logout", Auth::Bearer(&token), None).await;
        assert_eq!(out.status, StatusCode::NO_CONTENT);
        assert!(out.headers[header::SET_COOKIE].to_str().unwrap().contains("Max-Age=0"));

        let me = send(&app, Method::GET, "/api/me", Auth::Bearer(&token), None).await;
        assert_eq!(me.status, StatusCode::UNAUTHORIZED);
        assert_eq!(me.body["kind"], "Unauthenticated");
    }

    #[tokio::test]
    async fn protected_routes_require_a_session() {
        let app = build_app(AppState::fake());
        for (method, uri) in [
            (Method::GET, "/api/me"),
            (Method::GET, "/api/tasks"),
            (Method::GET, "/api/board"),
            (Method::POST, "/api/logout"),
        ] {
            let res = send(&app, method, uri, Auth::None, None).await;
            assert_eq!(res.status, StatusCode::UNAUTHORIZED, "{uri}");
        }
        let forged = send(&app, Method::GET, "/api/me", Auth::Bearer("abc.def.ghi"), None).await;
        assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn profile_update_and_password_change() {
        let app = build_app(AppState::fake());
        let token = register_and_login(&app, "alice").await;
        register_and_login(&app, "bob").await;

        let taken = send(&app, Method::PUT, "/api/me", Auth::Bearer(&token), Some(json!({"username": "bob"}))).await;
        assert_eq!(taken.status, StatusCode::CONFLICT);
        assert_eq!(taken.body["reason"], "UsernameTaken");

        let renamed = send(&app, Method::PUT, "/api/me", Auth::Bearer(&token), Some(json!({"lastName": "Anders"}))).await;
        assert_eq!(renamed.status, StatusCode::OK);
        assert_eq!(renamed.body["lastName"], "Anders");

        let weak = send(&app, Method::POST, "/api/me/password", Auth::Bearer(&token), Some(json!({"newPassword": "short"}))).await;
        assert_eq!(weak.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(weak.body["reason"], "WeakPassword");

        let ok = send(&app, Method::POST, "/api/me/password", Auth::Bearer(&token), Some(json!({"newPassword": "Fresh#Pass9"}))).await;
        assert_eq!(ok.status, StatusCode::NO_CONTENT);
        let me = send(&app, Method::GET, "/api/me", Auth::Bearer(&token), None).await;
        assert_eq!(me.status, StatusCode::OK);

        let relogin = send(&app, Method::POST, "/api/login", Auth::None, Some(json!({"username": "alice", "password": "Fresh#Pass9"}))).await;
        assert_eq!(relogin.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_body_uses_error_payload() {
        let app = build_app(AppState::fake());
        let res = send(&app, Method::POST, "/api/register", Auth::None, Some(json!({"username": "x"}))).await;
        assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(res.body["kind"], "DomainViolation");
    }

    #[tokio::test]
    async fn bootstrap_admin_can_log_in_and_moderate() {
        let st = AppState::fake();
        crate::bootstrap::ensure_admin(&st).await.unwrap();
        crate::bootstrap::ensure_admin(&st).await.unwrap();
        let app = build_app(st);

        let alice = register_and_login(&app, "alice").await;
        let created = send(&app, Method::POST, "/api/tasks", Auth::Bearer(&alice), Some(json!({"title": "spam"}))).await;
        let admin_uri = format!("/api/admin/tasks/{}", created.body["id"].as_str().unwrap());

        let denied = send(&app, Method::DELETE, &admin_uri, Auth::Bearer(&alice), None).await;
        assert_eq!(denied.status, StatusCode::FORBIDDEN);

        let login = send(&app, Method::POST, "/api/login", Auth::None, Some(json!({"username": "admin", "password": "password123!"}))).await;
        assert_eq!(login.status, StatusCode::OK);
        let admin = login.body["token"].as_str().unwrap().to_owned();
        let removed = send(&app, Method::DELETE, &admin_uri, Auth::Bearer(&admin), None).await;
        assert_eq!(removed.status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn malformed_path_and_query_use_error_payload() {
        let app = build_app(AppState::fake());
        let token = register_and_login(&app, "alice").await;

        let res = send(&app, Method::GET, "/api/tasks/not-a-uuid", Auth::Bearer(&token), None).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert_eq!(res.headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(res.body["kind"], "NotFound");
        assert_eq!(res.body["reason"], "NotFound");

        let moved = send(
            &app,
            Method::POST,
            "/api/tasks/42/status",
            Auth::Bearer(&token),
            Some(json!({"status": "Erledigt"})),
        )
        .await;
        assert_eq!(moved.status, StatusCode::NOT_FOUND);
        assert_eq!(moved.body["kind"], "NotFound");

        let res = send(&app, Method::GET, "/api/board?q=a&q=b", Auth::Bearer(&token), None).await;
        assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(res.headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(res.body["kind"], "DomainViolation");

        let searched = send(&app, Method::GET, "/api/tasks?q=%20milk", Auth::Bearer(&token), None).await;
        assert_eq!(searched.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = build_app(AppState::fake());
        let res = send(&app, Method::GET, "/api/health", Auth::None, None).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body, Value::String("ok".into()));
    }
}
