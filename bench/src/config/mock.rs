use ai_throughput_lib::MockConfig;

/// Mock endpoint behavior configuration.
/// This models processing cost, instability and saturation.
#[derive(Debug, Clone, clap::Args, Default)]
pub struct MockArgs {
    /// Base processing time before responding.
    #[arg(long, value_name = "SECONDS")]
    pub base_latency: Option<f64>,

    /// Random delay added to or subtracted from base_latency.
    #[arg(long, value_name = "SECONDS")]
    pub jitter: Option<f64>,

    /// Probability of failing a request.
    #[arg(long)]
    pub error_rate: Option<f32>,

    /// Probability of stalling a request for stall_latency.
    #[arg(long)]
    pub stall_rate: Option<f32>,

    /// Extra processing time of stalled requests.
    #[arg(long, value_name = "SECONDS")]
    pub stall_latency: Option<f64>,

    /// Max requests served at once; the rest is refused.
    #[arg(long, value_name = "N")]
    pub capacity: Option<usize>,
}

impl From<MockArgs> for MockConfig {
    fn from(args: MockArgs) -> Self {
        Self {
            base_latency: args.base_latency.unwrap_or_default(),
            jitter: args.jitter.unwrap_or_default(),
            error_rate: args.error_rate.unwrap_or_default(),
            stall_rate: args.stall_rate.unwrap_or_default(),
            stall_latency: args.stall_latency.unwrap_or_default(),
            capacity: args.capacity,
        }
    }
}
