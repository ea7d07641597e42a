use std::{net::IpAddr, sync::Arc};

use axum::{
    Extension, Router,
    extract::{Path, Request, State},
    http::{StatusCode, request::Parts},
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::Parser;
use rolecall::{
    authz::{Authentication, AuthzEngine, AuthzError, RequestAttributes, RequestContext, Voter},
    config::Config,
    middleware::{AuthorizedUser, gate_middleware, helpers_middleware},
    observability,
};
use serde_json::{Value, json};

#[derive(Parser, Debug)]
#[command(version, about = "Rolecall authorization demo server", long_about = None)]
struct Args {
    /// Path to config file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the bind address
    #[arg(long)]
    host: Option<IpAddr>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match Config::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config from {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    observability::init_tracing(&config.observability).expect("Failed to initialize tracing");

    let engine = match build_engine(&config) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::error!(error = %e, "Failed to register voters");
            std::process::exit(1);
        }
    };
    tracing::info!(
        mode = config.authz.mode.as_str(),
        voters = engine.len(),
        "Authorization engine ready"
    );

    let app = build_app(&config, engine);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Register the demo voters.
///
/// Anonymous requests may only perform `anonymous`. Signed-in users may do
/// whatever their `abilities` list, hold the roles in their `roles` list,
/// and fly to either of their two destinations.
fn build_engine(config: &Config) -> Result<AuthzEngine, AuthzError> {
    let fly_to = fly_to_pattern(config);

    let mut engine = AuthzEngine::new(config.authz.clone()).with_failure_handler(
        |parts: &Parts, action: &str| -> Response {
            tracing::info!(path = %parts.uri.path(), action, "Access denied");
            (StatusCode::FORBIDDEN, format!("Access denied: {action}\n")).into_response()
        },
    );

    engine
        .register(Voter::new(|req: &RequestContext, action: &str| {
            match req.principal() {
                None => Some(action == "anonymous"),
                Some(_) => None,
            }
        }))?
        .register(Voter::new(|req, action| listed(req, "abilities", action)))?
        .register(Voter::new(|req, action| listed(req, "roles", action)))?
        .register_route(
            "fly to",
            &fly_to,
            Voter::new(|req, _| destination_matches(req, "destination")),
        )?
        .register_route(
            "fly to",
            &fly_to,
            Voter::new(|req, _| destination_matches(req, "other_destination")),
        )?;

    Ok(engine)
}

/// Route pattern for the "fly to" voters. Patterns are matched against the
/// full request path unless the engine matches router-relative paths.
fn fly_to_pattern(config: &Config) -> String {
    let mount = match &config.server.mount_path {
        Some(mount) if !config.authz.match_relative_paths => mount.as_str(),
        _ => "",
    };
    format!("{mount}/fly/to/:destination")
}

fn listed(req: &RequestContext, field: &str, action: &str) -> Option<bool> {
    let items = req.principal()?.get(field)?.as_array()?;
    items.iter().any(|item| item == action).then_some(true)
}

fn destination_matches(req: &RequestContext, field: &str) -> Option<bool> {
    let wanted = req.principal()?.get(field)?.as_str()?;
    let destination = req.param("destination")?;
    wanted.eq_ignore_ascii_case(destination).then_some(true)
}

fn build_app(config: &Config, engine: Arc<AuthzEngine>) -> Router {
    let app = Router::new()
        .route(
            "/",
            get(home).route_layer(from_fn_with_state(engine.is_authenticated(), gate_middleware)),
        )
        .route(
            "/fly",
            get(fly).route_layer(from_fn_with_state(engine.can("fly"), gate_middleware)),
        )
        .route(
            "/fly/to/{destination}",
            get(fly_to).route_layer(from_fn_with_state(engine.can("fly"), gate_middleware)),
        )
        .route(
            "/admin",
            get(admin).route_layer(from_fn_with_state(engine.is("admin"), gate_middleware)),
        )
        .layer(from_fn_with_state(engine.clone(), helpers_middleware))
        .layer(from_fn_with_state(
            engine.principal_field().to_string(),
            dummy_authentication,
        ));

    match &config.server.mount_path {
        Some(mount) => Router::new().nest(mount, app),
        None => app,
    }
}

/// Stand-in for a real authentication layer: every request is signed in as
/// the same user unless it sends `x-anonymous: true`.
async fn dummy_authentication(
    State(principal_field): State<String>,
    mut req: Request,
    next: Next,
) -> Response {
    let anonymous = req
        .headers()
        .get("x-anonymous")
        .is_some_and(|value| value == "true");

    let mut attributes = req
        .extensions_mut()
        .remove::<RequestAttributes>()
        .unwrap_or_default();
    if anonymous {
        req.extensions_mut().insert(Authentication::anonymous());
    } else {
        attributes.insert(principal_field, demo_user());
        req.extensions_mut().insert(Authentication::authenticated());
    }
    req.extensions_mut().insert(attributes);

    next.run(req).await
}

fn demo_user() -> Value {
    json!({
        "id": 0,
        "destination": "Cambridge",
        "other_destination": "London",
        "abilities": ["fly", "teleport"],
        "roles": ["psychic"],
    })
}

async fn home(Extension(user): Extension<AuthorizedUser>) -> Result<String, AuthzError> {
    let mut lines = String::new();
    if user.can_async("teleport").await? {
        lines.push_str("You can teleport\n");
    } else {
        lines.push_str("You can't teleport\n");
    }
    if user.is_async("psychic").await? {
        lines.push_str("You're a psychic\n");
    } else {
        lines.push_str("You're not a psychic\n");
    }
    Ok(lines)
}

async fn fly() -> &'static str {
    "You're flying\n"
}

async fn fly_to(
    Path(destination): Path<String>,
    Extension(user): Extension<AuthorizedUser>,
) -> Result<String, AuthzError> {
    if user.can_async("fly to").await? {
        Ok(format!("You can fly to {destination}\n"))
    } else {
        Ok(format!("You can't fly to {destination}\n"))
    }
}

async fn admin() -> &'static str {
    "You're an admin\n"
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
