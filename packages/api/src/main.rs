use std::env::set_var;
use std::net::SocketAddr;

use lambda_http::{run, Error};
use shared::config::AppConfig;

use api::build_router;
use api::state::AppState;

fn init_logging() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "matchmaking_api=debug,api=debug,shared=debug,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();
    let on_lambda = std::env::var("AWS_LAMBDA_RUNTIME_API").is_ok();

    if on_lambda {
        set_var("AWS_LAMBDA_HTTP_IGNORE_STAGE_IN_PATH", "true");
        // required to enable CloudWatch error logging by the runtime
        lambda_http::tracing::init_default_subscriber();
    } else {
        init_logging();
    }

    let config = AppConfig::from_env()?;
    let app = build_router(AppState::init(&config).await);

    if on_lambda {
        return run(app).await;
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
