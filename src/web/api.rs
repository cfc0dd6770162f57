//! Search endpoint

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use contact_gateway_core::lookup::{LookupError, LookupResult, RequestGateway, SearchOutcome};

/// `error` field for collaborator null dereferences
const STALE_INTEGRATION_ERROR: &str = "Internal library error";

/// Query parameters of `/search`
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub number: Option<String>,
    pub country: Option<String>,
}

/// Successful search body
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
    pub data: LookupResult,
}

impl From<SearchOutcome> for SearchResponse {
    fn from(outcome: SearchOutcome) -> Self {
        match outcome {
            SearchOutcome::Found(data) => Self {
                success: true,
                note: None,
                data,
            },
            SearchOutcome::Recovered { result, note } => Self {
                success: true,
                note: Some(note),
                data: result,
            },
        }
    }
}

/// Failed search body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// HTTP mapping of a [`LookupError`]
pub struct ApiError(LookupError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self.0 {
            LookupError::MissingNumber => (StatusCode::BAD_REQUEST, None),
            LookupError::InvalidQuery { detail } => {
                (StatusCode::BAD_REQUEST, Some(detail.clone()))
            }
            LookupError::NotReady => (StatusCode::SERVICE_UNAVAILABLE, None),
            LookupError::StaleIntegration { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(STALE_INTEGRATION_ERROR.to_string()),
            ),
            LookupError::CollaboratorFailed { detail } => {
                (StatusCode::INTERNAL_SERVER_ERROR, Some(detail.clone()))
            }
        };

        let body = ErrorResponse {
            success: false,
            message: self.0.to_string(),
            error,
        };
        (status, Json(body)).into_response()
    }
}

/// Look up a phone number
pub async fn search(
    State(gateway): State<Arc<RequestGateway>>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Query(query) = query.map_err(|rejection| {
        ApiError(LookupError::InvalidQuery {
            detail: rejection.body_text(),
        })
    })?;
    gateway
        .search(query.number.as_deref(), query.country.as_deref())
        .await
        .map(|outcome| Json(SearchResponse::from(outcome)))
        .map_err(ApiError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::Router;
    use contact_gateway_core::connection::mock::{profile, MockConnection};
    use contact_gateway_core::connection::SearchError;
    use contact_gateway_core::session::{CredentialStore, Session, SessionController};
    use http::Request;
    use http_body_util::BodyExt;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use crate::web::build_router;

    struct Fixture {
        router: Router,
        controller: SessionController,
        connection: Arc<MockConnection>,
    }

    fn fixture() -> Fixture {
        let store = CredentialStore::new("/nonexistent/contact-gateway-test", "test");
        let session = Session::shared(store.root().to_path_buf());
        let connection = Arc::new(MockConnection::new());
        let controller = SessionController::new(
            session.clone(),
            store,
            connection.clone(),
            "http://localhost:3000".to_string(),
        );
        let gateway = Arc::new(RequestGateway::new(
            session,
            connection.clone(),
            "ID".to_string(),
        ));
        Fixture {
            router: build_router(gateway),
            controller,
            connection,
        }
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_search_not_ready() {
        let f = fixture();
        let (status, body) = get_json(f.router, "/search?number=0811").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("not ready"));
        assert!(f.connection.searches().is_empty());
    }

    #[tokio::test]
    async fn test_search_missing_number() {
        let f = fixture();
        let (status, body) = get_json(f.router, "/search").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_search_malformed_query_is_json() {
        let f = fixture();
        f.controller.on_authenticated();

        let response = f
            .router
            .oneshot(
                Request::builder()
                    .uri("/search?number=1&number=2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["content-type"], "application/json");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["success"], false);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid query string"));
        assert!(body["error"].as_str().unwrap().contains("number"));
        assert!(f.connection.searches().is_empty());
    }

    #[tokio::test]
    async fn test_search_found() {
        let f = fixture();
        f.controller.on_authenticated();
        f.connection.push_result(Ok(profile("A", "0811", "X")));

        let (status, body) = get_json(f.router, "/search?number=0811").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({
                "success": true,
                "data": {"name": "A", "phone_number": "0811", "provider": "X"}
            })
        );
        assert_eq!(
            f.connection.searches(),
            vec![("ID".to_string(), "0811".to_string())]
        );
    }

    #[tokio::test]
    async fn test_search_normalizes_query() {
        let f = fixture();
        f.controller.on_authenticated();
        f.connection.push_result(Ok(profile("A", "+62812345", "X")));

        let (status, _) = get_json(f.router, "/search?number=%2B62%20812-345&country=MY").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            f.connection.searches(),
            vec![("MY".to_string(), "+62812345".to_string())]
        );
    }

    #[tokio::test]
    async fn test_search_recovered() {
        let f = fixture();
        f.controller.on_authenticated();
        f.connection.push_result(Err(SearchError::with_partial(
            "flaky",
            profile("B", "0812", "Y"),
        )));

        let (status, body) = get_json(f.router, "/search?number=0812").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(
            body["note"],
            "Data recovered after a non-critical library error."
        );
        assert_eq!(body["data"]["name"], "B");
    }

    #[tokio::test]
    async fn test_search_stale_integration() {
        let f = fixture();
        f.controller.on_authenticated();
        f.connection.push_result(Err(SearchError::new(
            "Cannot read properties of null (reading 'textContent')",
        )));

        let (status, body) = get_json(f.router, "/search?number=0811").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("integration needs updating"));
        assert_eq!(body["error"], "Internal library error");
    }

    #[tokio::test]
    async fn test_search_other_failure() {
        let f = fixture();
        f.controller.on_authenticated();
        f.connection
            .push_result(Err(SearchError::new("Navigation timeout exceeded")));

        let (status, body) = get_json(f.router, "/search?number=0811").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error.");
        assert_eq!(body["error"], "Navigation timeout exceeded");
    }

    #[tokio::test]
    async fn test_search_after_disconnect_is_unavailable() {
        let f = fixture();
        f.controller.on_authenticated();
        f.controller.on_disconnected("NAVIGATION").await.unwrap();

        let (status, _) = get_json(f.router, "/search?number=0811").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(f.connection.initialize_calls(), 1);
    }
}
