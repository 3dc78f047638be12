//! The query endpoint: a thin HTTP layer over the store.
//!
//! `GET /getEmailCodes?email=<key>` where `<key>` is either a store key
//! (`<address>-verify` / `<address>-activate`) or a bare address, which
//! fetches both kinds. The endpoint touches only the store, never the mail
//! session, and never surfaces internal pipeline errors to callers.

use crate::extract::{ACTIVATE_SUFFIX, VERIFY_SUFFIX};
use crate::store::CredentialStore;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

/// Shared state for the query endpoint.
#[derive(Clone)]
pub struct QueryState {
    /// The credential store reads go to.
    pub store: Arc<dyn CredentialStore>,
}

/// Builds the query router over the given store.
#[must_use]
pub fn router(store: Arc<dyn CredentialStore>) -> Router {
    Router::new()
        .route("/getEmailCodes", get(get_email_codes))
        .with_state(QueryState { store })
}

enum QueryError {
    BadRequest(&'static str),
    NotFound,
    Internal,
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            QueryError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            QueryError::NotFound => (StatusCode::NOT_FOUND, "Verification code not found"),
            QueryError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Deserialize)]
struct QueryParams {
    email: Option<String>,
}

/// Which store entries a request asks for.
#[derive(Debug, PartialEq, Eq)]
enum KeyQuery {
    /// A fully suffixed verification-code key.
    Verify(String),
    /// A fully suffixed activation-link key.
    Activate(String),
    /// A bare address: fetch both kinds.
    Both(String),
}

fn parse_key_query(raw: &str) -> Option<KeyQuery> {
    let key = raw.trim().to_lowercase();
    if key.is_empty() {
        None
    } else if key.ends_with(VERIFY_SUFFIX) {
        Some(KeyQuery::Verify(key))
    } else if key.ends_with(ACTIVATE_SUFFIX) {
        Some(KeyQuery::Activate(key))
    } else if key.contains('@') {
        Some(KeyQuery::Both(key))
    } else {
        None
    }
}

async fn get_email_codes(
    State(state): State<QueryState>,
    Query(params): Query<QueryParams>,
) -> Response {
    let Some(raw) = params.email else {
        return QueryError::BadRequest("Email parameter is required").into_response();
    };

    let Some(query) = parse_key_query(&raw) else {
        return QueryError::BadRequest("Unrecognized email parameter").into_response();
    };

    match query {
        KeyQuery::Verify(key) => single_entry(&state, &key, "verification_code").await,
        KeyQuery::Activate(key) => single_entry(&state, &key, "activation_link").await,
        KeyQuery::Both(address) => both_entries(&state, &address).await,
    }
}

async fn single_entry(state: &QueryState, key: &str, field: &str) -> Response {
    match state.store.get(key).await {
        Ok(Some(value)) => Json(serde_json::json!({ field: value })).into_response(),
        Ok(None) => QueryError::NotFound.into_response(),
        Err(e) => {
            error!(key = %key, error = %e, "Store read failed");
            QueryError::Internal.into_response()
        }
    }
}

async fn both_entries(state: &QueryState, address: &str) -> Response {
    let verify_key = format!("{address}{VERIFY_SUFFIX}");
    let activate_key = format!("{address}{ACTIVATE_SUFFIX}");

    let verify = match state.store.get(&verify_key).await {
        Ok(value) => value,
        Err(e) => {
            error!(key = %verify_key, error = %e, "Store read failed");
            return QueryError::Internal.into_response();
        }
    };
    let activate = match state.store.get(&activate_key).await {
        Ok(value) => value,
        Err(e) => {
            error!(key = %activate_key, error = %e, "Store read failed");
            return QueryError::Internal.into_response();
        }
    };

    if verify.is_none() && activate.is_none() {
        return QueryError::NotFound.into_response();
    }

    let mut body = serde_json::Map::new();
    if let Some(value) = verify {
        body.insert("verification_code".into(), value.into());
    }
    if let Some(value) = activate {
        body.insert("activation_link".into(), value.into());
    }

    Json(serde_json::Value::Object(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_suffixed_keys() {
        assert_eq!(
            parse_key_query("user@example.com-verify"),
            Some(KeyQuery::Verify("user@example.com-verify".into()))
        );
        assert_eq!(
            parse_key_query("user@example.com-activate"),
            Some(KeyQuery::Activate("user@example.com-activate".into()))
        );
    }

    #[test]
    fn test_parse_bare_address_fetches_both() {
        assert_eq!(
            parse_key_query("User@Example.com"),
            Some(KeyQuery::Both("user@example.com".into()))
        );
    }

    #[test]
    fn test_parse_lowercases_keys() {
        assert_eq!(
            parse_key_query("USER@Example.com-VERIFY"),
            Some(KeyQuery::Verify("user@example.com-verify".into()))
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_key_query(""), None);
        assert_eq!(parse_key_query("   "), None);
        assert_eq!(parse_key_query("not-an-address"), None);
    }
}
