//! API layer - HTTP handlers and routing
//!
//! Every endpoint lives under `/api/v1`:
//! - Auth: register, login, logout, password change
//! - Users: own account, listing, profiles, moderation
//! - Ratings: rate, average, list, admin removal
//! - Comments: create, edit, moderate, list
//! - Tags: list, get, create-or-reuse, rename, delete

pub mod auth;
pub mod comments;
pub mod middleware;
pub mod ratings;
pub mod tags;
pub mod users;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::cache::{Cache, CacheInvalidator};
use crate::config::AuthConfig;
use crate::db::repositories::{
    SqlxCommentRepository, SqlxRatingRepository, SqlxRevokedTokenRepository,
    SqlxSessionRepository, SqlxTagRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::services::{
    Argon2Hasher, CommentService, ModerationService, RatingService, TagService,
    TokenRevocationRegistry, UserService,
};

pub use middleware::{ApiError, ApiQuery, AppState, AuthenticatedUser};

/// Wire repositories and services over one pool and one cache
pub fn build_state(pool: DynDatabasePool, cache: Arc<Cache>, auth: &AuthConfig) -> AppState {
    let users = SqlxUserRepository::boxed(pool.clone());
    let invalidator: Arc<dyn CacheInvalidator> = cache.clone();
    let revocations = Arc::new(TokenRevocationRegistry::new(
        SqlxRevokedTokenRepository::boxed(pool.clone()),
    ));

    let user_service = UserService::new(
        users.clone(),
        SqlxSessionRepository::boxed(pool.clone()),
        SqlxCommentRepository::boxed(pool.clone()),
        revocations,
        cache,
        Argon2Hasher::shared(),
    )
    .with_session_ttl_hours(auth.session_ttl_hours);

    AppState {
        user_service: Arc::new(user_service),
        moderation_service: Arc::new(ModerationService::new(users, invalidator)),
        rating_service: Arc::new(RatingService::new(SqlxRatingRepository::boxed(pool.clone()))),
        comment_service: Arc::new(CommentService::new(SqlxCommentRepository::boxed(pool.clone()))),
        tag_service: Arc::new(TagService::new(SqlxTagRepository::boxed(pool))),
    }
}

/// Build the API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Protected routes (need a valid, unrevoked token)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/users", users::router())
        .nest("/ratings", ratings::router())
        .nest("/comments", comments::router())
        .nest("/tags", tags::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    Router::new()
        .nest("/auth", auth::public_router())
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let allow_origin = if cors_origin == "*" {
        AllowOrigin::any()
    } else {
        match cors_origin.parse::<HeaderValue>() {
            Ok(origin) => AllowOrigin::exact(origin),
            Err(e) => {
                tracing::warn!("Invalid CORS origin '{}': {}, allowing any origin", cors_origin, e);
                AllowOrigin::any()
            }
        }
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::{create_test_pool, migrations};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn setup_app() -> Router {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let cache = Arc::new(Cache::Memory(MemoryCache::new()));
        let state = build_state(pool, cache, &AuthConfig::default());
        build_router(state, "http://localhost:3000")
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn register_and_login(app: &Router, name: &str) -> String {
        let (status, _) = send(
            app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(json!({
                "username": name,
                "email": format!("{}@example.com", name),
                "password": "password123"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            app,
            "POST",
            "/api/v1/auth/login",
            None,
            Some(json!({ "username_or_email": name, "password": "password123" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["access_token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let app = setup_app().await;

        let (status, body) = send(&app, "GET", "/api/v1/users/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, _) = send(&app, "GET", "/api/v1/users/me", Some("made-up"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let app = setup_app().await;
        let token = register_and_login(&app, "alice").await;

        let (status, body) = send(&app, "GET", "/api/v1/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "alice");
        assert_eq!(body["role"], "admin");
        assert!(body.get("password_hash").is_none());

        let (status, _) = send(&app, "POST", "/api/v1/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, "GET", "/api/v1/users/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_ban_locks_out_target() {
        let app = setup_app().await;
        let admin = register_and_login(&app, "admin").await;
        let bob = register_and_login(&app, "bob").await;

        let (status, _) = send(&app, "GET", "/api/v1/users/me", Some(&bob), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            "PATCH",
            "/api/v1/users/bob?action=ban",
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["applied"], true);
        assert_eq!(body["user"]["is_active"], false);

        let (status, body) = send(&app, "GET", "/api/v1/users/me", Some(&bob), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");

        let (status, _) = send(
            &app,
            "PATCH",
            "/api/v1/users/bob?action=ban",
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            "PATCH",
            "/api/v1/users/admin?action=ban",
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["applied"], false);
    }

    #[tokio::test]
    async fn test_change_role_requires_role_and_admin() {
        let app = setup_app().await;
        let admin = register_and_login(&app, "admin").await;
        let carol = register_and_login(&app, "carol").await;
        register_and_login(&app, "dave").await;

        let (status, _) = send(
            &app,
            "PATCH",
            "/api/v1/users/dave?action=change_role",
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "PATCH",
            "/api/v1/users/dave?action=change_role&role=moderator",
            Some(&carol),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            "PATCH",
            "/api/v1/users/dave?action=change_role&role=moderator",
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["role"], "moderator");

        let (status, _) = send(&app, "GET", "/api/v1/users/ghost", Some(&admin), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_moderation_query_uses_json_error() {
        let app = setup_app().await;
        let admin = register_and_login(&app, "admin").await;
        register_and_login(&app, "gina").await;

        for uri in [
            "/api/v1/users/gina?action=nuke",
            "/api/v1/users/gina?action=change_role&role=emperor",
            "/api/v1/users/gina",
        ] {
            let (status, body) = send(&app, "PATCH", uri, Some(&admin), None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body["error"]["code"], "BAD_REQUEST", "{}", uri);
        }

        let (status, body) = send(&app, "GET", "/api/v1/users?skip=lots", Some(&admin), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_rating_endpoints() {
        let app = setup_app().await;
        let admin = register_and_login(&app, "admin").await;
        let erin = register_and_login(&app, "erin").await;

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/ratings/3",
            Some(&erin),
            Some(json!({ "rating": 6 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/ratings/3",
            Some(&erin),
            Some(json!({ "rating": 4 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/ratings/3",
            Some(&erin),
            Some(json!({ "rating": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(&app, "GET", "/api/v1/ratings/3", Some(&erin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        let average = body["average"].as_f64().unwrap();
        assert!((average - 4.0).abs() < f64::EPSILON);

        let (status, body) = send(&app, "GET", "/api/v1/ratings/9", Some(&erin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);

        // erin is user 2
        let (status, _) = send(&app, "DELETE", "/api/v1/ratings/3/2", Some(&erin), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, "DELETE", "/api/v1/ratings/3/2", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "DELETE", "/api/v1/ratings/3/2", Some(&admin), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_comment_endpoints() {
        let app = setup_app().await;
        let admin = register_and_login(&app, "admin").await;
        let frank = register_and_login(&app, "frank").await;

        let (status, comment) = send(
            &app,
            "POST",
            "/api/v1/comments",
            Some(&frank),
            Some(json!({ "picture_id": 5, "body": "sharp!" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = comment["id"].as_i64().unwrap();

        let (status, _) = send(
            &app,
            "PATCH",
            &format!("/api/v1/comments/{}", id),
            Some(&admin),
            Some(json!({ "body": "edited by admin" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, list) = send(
            &app,
            "GET",
            "/api/v1/comments/picture/5?skip=0&limit=10",
            Some(&frank),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().map(Vec::len), Some(1));

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("/api/v1/comments/{}", id),
            Some(&admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_tag_endpoints() {
        let app = setup_app().await;
        let admin = register_and_login(&app, "admin").await;
        let hana = register_and_login(&app, "hana").await;

        let (status, sunset) = send(
            &app,
            "POST",
            "/api/v1/tags",
            Some(&hana),
            Some(json!({ "name": "sunset" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let sunset_id = sunset["id"].as_i64().unwrap();

        let (status, again) = send(
            &app,
            "POST",
            "/api/v1/tags",
            Some(&hana),
            Some(json!({ "name": "sunset" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(again["id"], sunset["id"]);

        let (_, beach) = send(
            &app,
            "POST",
            "/api/v1/tags",
            Some(&hana),
            Some(json!({ "name": "beach" })),
        )
        .await;
        let beach_uri = format!("/api/v1/tags/{}", beach["id"].as_i64().unwrap());

        let (status, body) = send(
            &app,
            "PATCH",
            &beach_uri,
            Some(&admin),
            Some(json!({ "name": "sunset" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");

        let (status, _) = send(
            &app,
            "PATCH",
            &beach_uri,
            Some(&hana),
            Some(json!({ "name": "shore" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            "PATCH",
            "/api/v1/tags/999",
            Some(&admin),
            Some(json!({ "name": "shore" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let (status, list) = send(&app, "GET", "/api/v1/tags", Some(&hana), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().map(Vec::len), Some(2));

        let uri = format!("/api/v1/tags/{}", sunset_id);
        let (status, _) = send(&app, "DELETE", &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", &uri, Some(&hana), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "DELETE", &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
