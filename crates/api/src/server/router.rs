//! Axum router construction.

use axum::{
    extract::FromRef,
    routing::{get, MethodRouter},
    Router,
};

use super::{
    handlers::{self, Resource},
    middleware::{self, Interceptors},
    state::AppState,
};
use crate::models::Teacher;
use crate::store::Repository;

/// Build the application [`Router`] with all routes and the interceptor
/// chain attached.
pub fn build(state: AppState, interceptors: &Interceptors) -> Router {
    let router = Router::new()
        .nest("/teachers", record_routes::<Teacher>())
        .route("/teachers/", collection::<Teacher>())
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found);

    middleware::apply(router, interceptors).with_state(state)
}

/// Collection and item routes for one record type.
fn record_routes<R>() -> Router<AppState>
where
    R: Resource,
    Repository<R>: FromRef<AppState>,
{
    Router::new()
        .route("/", collection::<R>())
        .route(
            "/:id",
            get(handlers::get_one::<R>)
                .put(handlers::replace::<R>)
                .patch(handlers::patch_one::<R>)
                .delete(handlers::delete_one::<R>),
        )
}

fn collection<R>() -> MethodRouter<AppState>
where
    R: Resource,
    Repository<R>: FromRef<AppState>,
{
    get(handlers::list::<R>)
        .post(handlers::create::<R>)
        .patch(handlers::patch_many::<R>)
        .delete(handlers::delete_many::<R>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use tower::ServiceExt;

    async fn app() -> Router {
        build(
            AppState::in_memory().await,
            &Interceptors::from_config(&Config::default()),
        )
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let req = Request::builder()
            .uri("/unknown")
            .body(Body::empty())
            .unwrap();
        let resp = app().await.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_route_exists() {
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app().await.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn collection_route_lists() {
        let req = Request::builder()
            .uri("/teachers")
            .body(Body::empty())
            .unwrap();
        let resp = app().await.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn collection_route_accepts_trailing_slash() {
        let req = Request::builder()
            .uri("/teachers/")
            .body(Body::empty())
            .unwrap();
        let resp = app().await.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn preflight_never_reaches_routes() {
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/teachers/1")
            .header(header::ORIGIN, "https://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let resp = app().await.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn foreign_origin_is_forbidden_everywhere() {
        let req = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "https://evil.example")
            .body(Body::empty())
            .unwrap();
        let resp = app().await.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
