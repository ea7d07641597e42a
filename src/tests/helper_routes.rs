use std::sync::Arc;

use axum::{
    Extension, Router,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;

use super::*;
use crate::{
    authz::{AuthzEngine, AuthzError, RequestContext, Voter},
    config::{AuthzConfig, EvaluationMode},
    middleware::{AuthorizedUser, Authorizer, Locals, helpers_middleware},
};

fn engine(mode: EvaluationMode) -> Arc<AuthzEngine> {
    let mut engine = AuthzEngine::new(AuthzConfig::default().with_mode(mode));
    engine
        .register(Voter::new(|req: &RequestContext, action: &str| {
            match req.principal() {
                None => Some(action == "anonymous"),
                Some(_) => None,
            }
        }))
        .unwrap()
        .register(Voter::new(|req: &RequestContext, action: &str| {
            req.lookup("user.roles")?
                .as_array()?
                .iter()
                .any(|role| role == action)
                .then_some(true)
        }))
        .unwrap();
    Arc::new(engine)
}

async fn describe(
    user: Option<Extension<AuthorizedUser>>,
    Extension(authz): Extension<Authorizer>,
) -> Result<String, AuthzError> {
    let name = match &user {
        Some(Extension(user)) => user.principal["name"].as_str().unwrap_or("?").to_string(),
        None => "nobody".to_string(),
    };
    Ok(format!(
        "{name} editor={} admin={} anonymous={}",
        authz.is("editor")?,
        authz.is("admin")?,
        authz.can("anonymous")?,
    ))
}

fn with_helpers(router: Router, engine: Arc<AuthzEngine>) -> Router {
    router.layer(from_fn_with_state(engine, helpers_middleware))
}

#[tokio::test]
async fn test_helpers_bind_predicates_to_the_principal() {
    let app = authenticated(
        with_helpers(
            Router::new().route("/", get(describe)),
            engine(EvaluationMode::Sync),
        ),
        Some(tobi()),
    );

    assert_eq!(
        get_text(&app, "/").await,
        (
            StatusCode::OK,
            "tobi editor=true admin=false anonymous=false".into()
        )
    );
}

#[tokio::test]
async fn test_anonymous_requests_still_get_an_authorizer() {
    let app = authenticated(
        with_helpers(
            Router::new().route("/", get(describe)),
            engine(EvaluationMode::Sync),
        ),
        None,
    );

    assert_eq!(
        get_text(&app, "/").await.1,
        "nobody editor=false admin=false anonymous=true"
    );
}

#[tokio::test]
async fn test_async_predicates_in_handlers() {
    async fn handler(Extension(user): Extension<AuthorizedUser>) -> Result<String, AuthzError> {
        Ok(format!(
            "{} {}",
            user.is_async("editor").await?,
            user.can_async("publish").await?
        ))
    }

    let app = authenticated(
        with_helpers(
            Router::new().route("/", get(handler)),
            engine(EvaluationMode::Async),
        ),
        Some(tobi()),
    );

    assert_eq!(get_text(&app, "/").await.1, "true false");
}

#[tokio::test]
async fn test_locals_mirror_principal_and_authentication() {
    async fn handler(Extension(locals): Extension<Locals>) -> impl IntoResponse {
        let authorizer = locals.authorizer().expect("authorizer attached");
        format!(
            "{} {:?} {}",
            locals.get("user").map(|user| user["name"].clone()).unwrap_or_default(),
            locals.is_authenticated(),
            authorizer.is("editor").unwrap(),
        )
    }

    let app = authenticated(
        with_helpers(
            Router::new().route("/", get(handler)),
            engine(EvaluationMode::Sync),
        ),
        Some(tobi()),
    );

    assert_eq!(get_text(&app, "/").await.1, "\"tobi\" Some(true) true");
}

#[tokio::test]
async fn test_locals_keep_upstream_user() {
    async fn handler(Extension(locals): Extension<Locals>) -> String {
        locals.get("user").cloned().unwrap_or_default().to_string()
    }

    let mut upstream = Locals::new();
    upstream.insert("user", json!("display name"));
    upstream.insert("theme", json!("dark"));

    let app = authenticated(
        with_helpers(
            Router::new().route("/", get(handler)),
            engine(EvaluationMode::Sync),
        )
        .layer(Extension(upstream)),
        Some(tobi()),
    );

    assert_eq!(get_text(&app, "/").await.1, "\"display name\"");
}

#[tokio::test]
async fn test_helpers_never_respond_on_their_own() {
    let app = authenticated(
        with_helpers(
            Router::new().route("/", get(|| async { "open" })),
            Arc::new(AuthzEngine::default()),
        ),
        None,
    );

    assert_eq!(get_text(&app, "/").await, (StatusCode::OK, "open".into()));
}

#[tokio::test]
async fn test_locals_use_configured_principal_field() {
    async fn handler(Extension(locals): Extension<Locals>) -> String {
        format!(
            "{} {}",
            locals.get("account").map(|account| account["name"].clone()).unwrap_or_default(),
            locals.get("user").is_some(),
        )
    }

    let engine = Arc::new(AuthzEngine::new(
        AuthzConfig::default().with_principal_field("account"),
    ));
    let app = with_helpers(Router::new().route("/", get(handler)), engine)
        .layer(Extension(crate::authz::RequestAttributes::new().with("account", tobi())));

    assert_eq!(get_text(&app, "/").await.1, "\"tobi\" false");
}
