//! Axum request handlers.
//!
//! The record handlers are generic over any [`Resource`]; the router
//! instantiates them once per record type.

use axum::{
    extract::{rejection::JsonRejection, Path, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{
    BatchDeleteResponse, DeleteResponse, ErrorResponse, HealthResponse, ListResponse, OneOrMany,
    STATUS_SUCCESS,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::{error::ApiError, state::AppState};
use crate::schema::Record;
use crate::store::{ListQuery, Repository};

/// A record type that can be served over HTTP.
pub trait Resource: Record + Serialize + DeserializeOwned {}

impl<T: Record + Serialize + DeserializeOwned> Resource for T {}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("invalid id `{raw}`")))
}

/// `GET /<records>` with optional equality filters and `sortby` pairs.
pub async fn list<R: Resource>(
    State(repo): State<Repository<R>>,
    RawQuery(query): RawQuery,
) -> Result<Json<ListResponse<R>>, ApiError> {
    let filter = ListQuery::from_query_string(R::schema(), query.as_deref().unwrap_or_default());
    let records = repo.get_all(filter).await?;
    Ok(Json(ListResponse::success(records)))
}

/// `POST /<records>`: one object or an array of objects.
pub async fn create<R: Resource>(
    State(repo): State<Repository<R>>,
    body: Result<Json<OneOrMany<R>>, JsonRejection>,
) -> Result<(StatusCode, Json<ListResponse<R>>), ApiError> {
    let Json(body) = body?;
    let created = repo.create(body.into_vec()).await?;
    info!(entity = R::schema().entity, count = created.len(), "records created");
    Ok((StatusCode::CREATED, Json(ListResponse::success(created))))
}

pub async fn get_one<R: Resource>(
    State(repo): State<Repository<R>>,
    Path(id): Path<String>,
) -> Result<Json<R>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(repo.get_one(id).await?))
}

/// `PUT /<records>/:id`: full replacement; omitted fields become empty.
pub async fn replace<R: Resource>(
    State(repo): State<Repository<R>>,
    Path(id): Path<String>,
    body: Result<Json<R>, JsonRejection>,
) -> Result<Json<R>, ApiError> {
    let id = parse_id(&id)?;
    let Json(record) = body?;
    Ok(Json(repo.replace(id, record).await?))
}

/// `PATCH /<records>/:id`: merge the payload's known keys into the record.
pub async fn patch_one<R: Resource>(
    State(repo): State<Repository<R>>,
    Path(id): Path<String>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<R>, ApiError> {
    let id = parse_id(&id)?;
    let Json(payload) = body?;
    Ok(Json(repo.patch_one(id, payload).await?))
}

pub async fn delete_one<R: Resource>(
    State(repo): State<Repository<R>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let id = parse_id(&id)?;
    repo.delete_one(id).await?;
    Ok(Json(DeleteResponse {
        status: STATUS_SUCCESS.into(),
        id,
    }))
}

/// `PATCH /<records>`: every item names its record by `id`. All or nothing.
pub async fn patch_many<R: Resource>(
    State(repo): State<Repository<R>>,
    body: Result<Json<Vec<Map<String, Value>>>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(items) = body?;
    repo.patch_many(items).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /<records>` with a JSON array of ids. All or nothing.
pub async fn delete_many<R: Resource>(
    State(repo): State<Repository<R>>,
    body: Result<Json<Vec<i64>>, JsonRejection>,
) -> Result<Json<BatchDeleteResponse>, ApiError> {
    let Json(ids) = body?;
    let deleted_ids = repo.delete_many(ids).await?;
    Ok(Json(BatchDeleteResponse {
        status: STATUS_SUCCESS.into(),
        deleted_ids,
    }))
}

/// `GET /health`: `200` when the store answers a ping, `503` otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let store_ready = match state.teachers.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "store ping failed");
            false
        }
    };

    let (status_code, status_str) = if store_ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = HealthResponse {
        status: status_str.into(),
        store_ready,
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::Teacher;
    use crate::server::{middleware::Interceptors, router};
    use axum_test::TestServer;
    use serde_json::json;

    async fn server() -> TestServer {
        let state = AppState::in_memory().await;
        let app = router::build(state, &Interceptors::from_config(&Config::default()));
        TestServer::new(app).unwrap()
    }

    async fn seed(server: &TestServer) -> Vec<Teacher> {
        let resp = server
            .post("/teachers")
            .json(&json!([
                {"first_name": "Ada", "last_name": "Lovelace", "email": "ada@school.test", "class": "9A", "subject": "Math"},
                {"first_name": "Alan", "last_name": "Turing", "email": "alan@school.test", "class": "9A", "subject": "Logic"},
                {"first_name": "Grace", "last_name": "Hopper", "email": "grace@school.test", "class": "10B", "subject": "Computing"}
            ]))
            .await;
        resp.assert_status(StatusCode::CREATED);
        resp.json::<ListResponse<Teacher>>().data
    }

    #[test]
    fn parse_id_rejects_non_numeric() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert!(parse_id("forty-two").is_err());
        assert!(parse_id("").is_err());
    }

    #[tokio::test]
    async fn create_single_then_get_one() {
        let server = server().await;
        let resp = server
            .post("/teachers")
            .json(&json!({"id": 77, "first_name": "A", "last_name": "B"}))
            .await;
        resp.assert_status(StatusCode::CREATED);
        let body: Value = resp.json();
        assert_eq!(body["status"], "success");
        assert_eq!(body["count"], 1);
        let id = body["data"][0]["id"].as_i64().unwrap();
        assert_ne!(id, 77);

        let fetched: Teacher = server.get(&format!("/teachers/{id}")).await.json();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.first_name, "A");
        assert_eq!(fetched.last_name, "B");
        assert_eq!(fetched.email, "");
    }

    #[tokio::test]
    async fn create_array_preserves_order() {
        let server = server().await;
        let created = seed(&server).await;
        let names: Vec<_> = created.iter().map(|t| t.first_name.as_str()).collect();
        assert_eq!(names, ["Ada", "Alan", "Grace"]);
    }

    #[tokio::test]
    async fn empty_create_is_bad_request() {
        let server = server().await;
        let resp = server.post("/teachers").json(&json!([])).await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let server = server().await;
        let resp = server
            .post("/teachers")
            .content_type("application/json")
            .bytes("{not json".into())
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(resp.json::<Value>()["code"], "bad_request");
    }

    #[tokio::test]
    async fn list_filters_and_sorts() {
        let server = server().await;
        seed(&server).await;

        let resp = server
            .get("/teachers")
            .add_query_param("class", "9A")
            .add_query_param("sortby", "last_name:desc")
            .await;
        resp.assert_status_ok();
        let body: ListResponse<Teacher> = resp.json();
        assert_eq!(body.count, 2);
        let last: Vec<_> = body.data.iter().map(|t| t.last_name.as_str()).collect();
        assert_eq!(last, ["Turing", "Lovelace"]);
    }

    #[tokio::test]
    async fn list_ignores_unknown_parameters() {
        let server = server().await;
        seed(&server).await;
        let body: ListResponse<Teacher> = server
            .get("/teachers")
            .add_query_param("salary", "100")
            .add_query_param("sortby", "salary:asc")
            .await
            .json();
        assert_eq!(body.count, 3);
    }

    #[tokio::test]
    async fn get_one_errors() {
        let server = server().await;
        server
            .get("/teachers/abc")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        let resp = server.get("/teachers/999").await;
        resp.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(resp.json::<Value>()["code"], "not_found");
    }

    #[tokio::test]
    async fn put_replaces_whole_record() {
        let server = server().await;
        let ada = seed(&server).await.remove(0);

        let resp = server
            .put(&format!("/teachers/{}", ada.id))
            .json(&json!({"first_name": "Augusta", "last_name": "King"}))
            .await;
        resp.assert_status_ok();
        let replaced: Teacher = resp.json();
        assert_eq!(replaced.id, ada.id);
        assert_eq!(replaced.first_name, "Augusta");
        assert_eq!(replaced.subject, "");
    }

    #[tokio::test]
    async fn patch_one_merges_and_rejects_mismatch() {
        let server = server().await;
        let ada = seed(&server).await.remove(0);
        let path = format!("/teachers/{}", ada.id);

        let patched: Teacher = server
            .patch(&path)
            .json(&json!({"subject": "Analytics", "unknown": true}))
            .await
            .json();
        assert_eq!(patched.subject, "Analytics");
        assert_eq!(patched.email, ada.email);

        let resp = server.patch(&path).json(&json!({"email": 42})).await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(resp.json::<Value>()["code"], "type_mismatch");

        let unchanged: Teacher = server.get(&path).await.json();
        assert_eq!(unchanged.email, ada.email);
    }

    #[tokio::test]
    async fn patch_many_is_all_or_nothing() {
        let server = server().await;
        let created = seed(&server).await;

        let resp = server
            .patch("/teachers")
            .json(&json!([
                {"id": created[0].id, "class": "11C"},
                {"id": created[1].id.to_string(), "class": 11}
            ]))
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let first: Teacher = server.get(&format!("/teachers/{}", created[0].id)).await.json();
        assert_eq!(first.class, "9A");

        server
            .patch("/teachers")
            .json(&json!([
                {"id": created[0].id, "class": "11C"},
                {"id": created[1].id.to_string(), "class": "11D"}
            ]))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        let second: Teacher = server.get(&format!("/teachers/{}", created[1].id)).await.json();
        assert_eq!(second.class, "11D");
    }

    #[tokio::test]
    async fn delete_many_rolls_back_on_missing_id() {
        let server = server().await;
        let created = seed(&server).await;

        let resp = server
            .delete("/teachers")
            .json(&json!([created[0].id, created[1].id, 999]))
            .await;
        resp.assert_status(StatusCode::NOT_FOUND);
        let body: ListResponse<Teacher> = server.get("/teachers").await.json();
        assert_eq!(body.count, 3);

        let resp = server
            .delete("/teachers")
            .json(&json!([created[0].id, created[1].id]))
            .await;
        resp.assert_status_ok();
        let body: BatchDeleteResponse = resp.json();
        assert_eq!(body.deleted_ids, vec![created[0].id, created[1].id]);
    }

    #[tokio::test]
    async fn delete_one_then_404() {
        let server = server().await;
        let ada = seed(&server).await.remove(0);
        let path = format!("/teachers/{}", ada.id);

        let body: DeleteResponse = server.delete(&path).await.json();
        assert_eq!(body.status, "success");
        assert_eq!(body.id, ada.id);
        server.delete(&path).await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_store_ready() {
        let server = server().await;
        let resp = server.get("/health").await;
        resp.assert_status_ok();
        let body: HealthResponse = resp.json();
        assert!(body.store_ready);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let server = server().await;
        let resp = server.get("/students").await;
        resp.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(resp.json::<Value>()["code"], "not_found");
    }
}
