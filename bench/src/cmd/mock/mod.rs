use std::{convert::Infallible, sync::Arc, time::Duration};

use rama::{
    Layer as _, Service,
    error::{BoxError, ErrorContext as _},
    graceful::ShutdownGuard,
    http::{
        HeaderValue, Request, Response, StatusCode,
        layer::{required_header::AddRequiredResponseHeadersLayer, trace::TraceLayer},
        server::HttpServer,
        service::web::{
            Router,
            extract::{self, State},
            response::{self, IntoResponse},
        },
    },
    layer::TimeoutLayer,
    net::socket::Interface,
    rt::Executor,
    tcp::server::TcpListener,
    telemetry::tracing,
};

use ai_throughput_lib::{
    MockConfig, MockTarget, PromptRequest, Target as _, TargetError, utils::env,
};
use clap::Args;

use crate::config::{MockArgs, Profile, merge_mock_args};

/// Path the mock serves completions on.
pub const COMPLETIONS_PATH: &str = "/v1/completions";

#[derive(Debug, Clone, Args)]
/// run a mock completion endpoint
pub struct MockCommand {
    #[clap(flatten)]
    config: Option<MockArgs>,

    #[arg(long)]
    /// Profile to run,
    /// manually defined parameters overwrite profile parameters.
    profile: Option<Profile>,

    /// network interface to bind to
    #[arg(
        long,
        short = 'b',
        value_name = "INTERFACE",
        default_value = "127.0.0.1:0"
    )]
    pub bind: Interface,
}

pub async fn exec(guard: ShutdownGuard, args: MockCommand) -> Result<(), BoxError> {
    let mock_config: MockConfig = merge_mock_args(args.profile, args.config).into();
    let target = MockTarget::try_new(mock_config)
        .map_err(BoxError::from)
        .context("create mock target")?;

    let http_svc = (
        TraceLayer::new_for_http(),
        AddRequiredResponseHeadersLayer::new()
            .with_server_header_value(HeaderValue::from_static(env::client_identifier())),
    )
        .into_layer(mock_svc(target));

    let exec = Executor::graceful(guard);
    let http_server = HttpServer::auto(exec.clone()).service(Arc::new(http_svc));

    let tcp_listener = TcpListener::bind(args.bind, exec)
        .await
        .context("bind mock http server")?;

    let server_addr = tcp_listener
        .local_addr()
        .context("get bound address for mock http server")?;
    tracing::info!("mock completion endpoint listening on: http://{server_addr}{COMPLETIONS_PATH}");

    tcp_listener
        .serve(TimeoutLayer::new(Duration::from_secs(60)).into_layer(http_server))
        .await;

    Ok(())
}

fn mock_svc(
    target: MockTarget,
) -> impl Service<Request, Output = Response, Error = Infallible> + Clone {
    Arc::new(
        Router::new_with_state(target)
            .with_get("/ping", "pong")
            .with_post(COMPLETIONS_PATH, completions),
    )
}

async fn completions(
    State(target): State<MockTarget>,
    extract::Json(request): extract::Json<PromptRequest>,
) -> impl IntoResponse {
    match target.send_prompt(&request).await {
        Ok(texts) => response::Json(completion_body(texts)).into_response(),
        Err(err) => {
            tracing::debug!("mock target failed prompt: {err}");
            match err {
                TargetError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                TargetError::Status(_) | TargetError::InvalidResponse(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
            .into_response()
        }
    }
}

fn completion_body(texts: Vec<String>) -> serde_json::Value {
    let choices: Vec<_> = texts
        .into_iter()
        .map(|text| serde_json::json!({ "text": text }))
        .collect();
    serde_json::json!({ "choices": choices })
}
