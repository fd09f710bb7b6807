use std::{sync::Arc, time::Duration};

use rama::{
    error::{BoxError, ErrorContext as _},
    graceful::ShutdownGuard,
    http::Uri,
    telemetry::tracing,
};

use ai_throughput_lib::{
    HttpTarget, MockConfig, MockTarget, PromptRequest, SearchConfig, Target, ThroughputSearch,
};
use clap::Args;

use crate::config::{MockArgs, Profile, SearchArgs, merge_mock_args, merge_search_args};

pub mod reporter;

use self::reporter::*;

#[derive(Debug, Clone, Args)]
/// search the max throughput of a completion endpoint
pub struct RunCommand {
    /// URL of the completion endpoint prompts are POSTed to
    #[arg(value_name = "URL", required_unless_present = "mock")]
    target: Option<Uri>,

    /// run against an in-process mock endpoint instead of a URL
    #[arg(long, default_value_t = false, conflicts_with = "target")]
    mock: bool,

    /// model name added to every completion request
    #[arg(long)]
    model: Option<String>,

    /// report json lines instead of a human-friendly format
    #[arg(long, default_value_t = false)]
    json: bool,

    /// prompt sent by every request
    #[arg(long)]
    prompt: Option<String>,

    /// max tokens to generate per request
    #[arg(long, value_name = "N")]
    max_tokens: Option<u32>,

    /// sampling temperature
    #[arg(long)]
    temperature: Option<f32>,

    /// abort instead of warning when this host cannot keep up with the requested rate
    #[arg(long, default_value_t = false)]
    strict_client_errors: bool,

    /// skip the single request sent to check the target before searching
    #[arg(long, default_value_t = false)]
    skip_preflight: bool,

    /// transport timeout of a single request;
    /// defaults to the fail latency plus a margin
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    request_timeout: Option<Duration>,

    #[clap(flatten)]
    search: Option<SearchArgs>,

    #[clap(flatten)]
    mock_config: Option<MockArgs>,

    #[arg(long)]
    /// Profile to run,
    /// manually defined parameters overwrite profile parameters.
    profile: Option<Profile>,
}

const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

pub async fn exec(guard: ShutdownGuard, args: RunCommand) -> Result<(), BoxError> {
    let config = merge_search_args(args.profile, args.search)
        .into_search_config(args.strict_client_errors);
    config.validate().context("validate search config")?;

    let request = prompt_request(args.prompt, args.max_tokens, args.temperature);

    tracing::info!(
        start_concurrency = %config.start_concurrency,
        max_concurrency = ?config.max_concurrency,
        step = %config.step,
        total_duration = %humantime::format_duration(config.total_duration),
        burst_interval = %humantime::format_duration(config.burst_interval),
        fail_latency = %humantime::format_duration(config.fail_latency),
        "search config parameters ready",
    );

    let reporter: Box<dyn Reporter> = if args.json {
        Box::new(JsonlReporter::new())
    } else {
        Box::new(HumanReporter::new())
    };

    if args.mock {
        let mock_config: MockConfig = merge_mock_args(args.profile, args.mock_config).into();
        let target = MockTarget::try_new(mock_config)
            .map_err(BoxError::from)
            .context("create in-process mock target")?;
        tracing::info!("run search against in-process mock target");
        return run_search(
            guard,
            Arc::new(target),
            request,
            config,
            args.skip_preflight,
            reporter,
        )
        .await;
    }

    let uri = args
        .target
        .ok_or_else(|| BoxError::from("target URL is required unless --mock is used"))?;
    let request_timeout = args
        .request_timeout
        .unwrap_or(config.fail_latency + REQUEST_TIMEOUT_MARGIN);
    tracing::info!(%uri, ?request_timeout, "run search against http target");

    let target = HttpTarget::new(uri, args.model, request_timeout);
    run_search(
        guard,
        Arc::new(target),
        request,
        config,
        args.skip_preflight,
        reporter,
    )
    .await
}

fn prompt_request(
    prompt: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
) -> PromptRequest {
    let defaults = PromptRequest::default();
    PromptRequest {
        prompt: prompt.unwrap_or(defaults.prompt),
        max_tokens: max_tokens.unwrap_or(defaults.max_tokens),
        temperature: temperature.unwrap_or(defaults.temperature),
    }
}

async fn run_search<T: Target>(
    guard: ShutdownGuard,
    target: Arc<T>,
    request: PromptRequest,
    config: SearchConfig,
    skip_preflight: bool,
    mut reporter: Box<dyn Reporter>,
) -> Result<(), BoxError> {
    let search = ThroughputSearch::new(target, request, config);

    if skip_preflight {
        tracing::info!("skip preflight request");
    } else {
        tokio::select! {
            _ = guard.cancelled() => {
                tracing::error!("exit before preflight finished: guard shutdown");
                return Ok(());
            }
            result = search.preflight() => {
                result.context("preflight request to target")?;
            }
        }
    }

    let report = tokio::select! {
        _ = guard.cancelled() => {
            tracing::error!("exit search early: guard shutdown");
            return Ok(());
        }
        result = search.run() => {
            result.context("run throughput search")?
        }
    };

    for level in &report.levels {
        reporter.on_level(level);
    }
    reporter.finish(&report);

    Ok(())
}
