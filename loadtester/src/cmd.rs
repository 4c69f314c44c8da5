use clap::{ArgAction, Parser};

/// HTTP load generator.
///
/// Issues GET requests to the target at a fixed rate for a bounded duration,
/// optionally probing the maximum sustainable rate first.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Cmd {
    /// Target endpoint, e.g. "http://127.0.0.1:8080/ping".
    #[clap(long)]
    pub url: Option<String>,
    /// Requests per second issued by the dispatcher.
    ///
    /// Ignored when "--benchmark" is set, because the rate is then discovered.
    #[clap(long, default_value_t = 10, allow_negative_numbers = true)]
    pub rps: i64,
    /// Test duration in seconds.
    #[clap(long, default_value_t = 10, allow_negative_numbers = true)]
    pub duration: i64,
    /// Run the saturation benchmark first and use its result as the rate.
    #[clap(long)]
    pub benchmark: bool,
    /// Benchmark duration in seconds.
    #[clap(long, alias = "benchDuration", default_value_t = 5, allow_negative_numbers = true)]
    pub bench_duration: i64,
    /// Number of concurrent benchmark workers.
    ///
    /// Defaults to ten workers per available CPU.
    #[clap(long)]
    pub bench_workers: Option<i64>,
    /// Local addresses to send requests from, separated by commas.
    ///
    /// For example, "192.168.1.100,192.168.1.101". Requests are spread across
    /// these addresses in round-robin order. An address without a port is
    /// bound to an ephemeral one.
    #[clap(long, alias = "localAddrs", value_delimiter = ',')]
    pub local_addrs: Vec<String>,
    /// Be verbose in terms of logging.
    #[clap(short, action = ArgAction::Count)]
    pub verbose: u8,
}
