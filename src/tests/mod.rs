//! Router-level tests driving gates and helpers through real axum routers.

mod helper_routes;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::authz::{Authentication, RequestAttributes};

/// Attributes carrying the default `user` principal.
fn signed_in(principal: Value) -> RequestAttributes {
    RequestAttributes::new().with("user", principal)
}

fn tobi() -> Value {
    json!({"id": 1, "name": "tobi", "roles": ["editor"]})
}

/// Wrap `router` in a stand-in authentication layer.
fn authenticated(router: Router, principal: Option<Value>) -> Router {
    match principal {
        Some(principal) => router
            .layer(axum::Extension(signed_in(principal)))
            .layer(axum::Extension(Authentication::authenticated())),
        None => router.layer(axum::Extension(Authentication::anonymous())),
    }
}

async fn send(app: &Router, method: &str, uri: &str) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn get_text(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = send(app, "GET", uri).await;
    let status = response.status();
    (status, body_text(response).await)
}
