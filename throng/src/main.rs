use std::{process::ExitCode, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use throng::{
    config::{IdentityPlan, PoolLimits, SimulationConfig},
    diagnostics::TracingSink,
    JsonReporter, LogReporter, Report, Reporter, SessionIdentity, SessionPool,
};

#[derive(Debug, Parser)]
#[command(name = "throng", version, about = "Concurrent virtual-user load simulation")]
struct Cli {
    /// Base url of the backend under test
    #[arg(long, env = "THRONG_BASE_URL", default_value = "http://localhost:8999")]
    base_url: String,

    /// Log every exchange and step
    #[arg(short, long, global = true)]
    verbose: bool,

    /// How the final report is printed
    #[arg(long, value_enum, default_value_t = Format::Text, global = true)]
    format: Format,

    #[command(flatten)]
    limits: LimitArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Debug, Args)]
struct LimitArgs {
    /// Maximum concurrent connections in total
    #[arg(long, env = "THRONG_MAX_CONNECTIONS", default_value_t = 2000)]
    max_connections: usize,

    /// Maximum concurrent connections to the target host
    #[arg(long, env = "THRONG_MAX_CONNECTIONS_PER_HOST", default_value_t = 1500)]
    max_connections_per_host: usize,

    /// Seconds a resolved host name stays cached (0 disables the cache)
    #[arg(long, env = "THRONG_DNS_TTL", default_value_t = 300)]
    dns_ttl_secs: u64,

    /// Per-request timeout in seconds
    #[arg(long, env = "THRONG_TIMEOUT", default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a batch of concurrent sessions
    Run {
        /// Number of concurrent sessions
        #[arg(short = 'n', long, env = "THRONG_SESSIONS", default_value_t = 1000)]
        sessions: usize,

        /// Username prefix; the zero-padded session index is appended
        #[arg(long, default_value = "test")]
        user_prefix: String,

        /// Password shared by every synthetic user
        #[arg(long, env = "THRONG_PASSWORD", default_value = "123456")]
        password: String,

        /// Index of the first synthetic user
        #[arg(long, default_value_t = 1)]
        first_index: usize,
    },
    /// Run one session with full diagnostics
    Single {
        #[arg(long)]
        username: String,

        #[arg(long, env = "THRONG_PASSWORD", default_value = "123456")]
        password: String,
    },
}

impl LimitArgs {
    fn to_limits(&self) -> PoolLimits {
        PoolLimits::builder()
            .max_connections(self.max_connections)
            .max_connections_per_host(self.max_connections_per_host)
            .dns_ttl(Duration::from_secs(self.dns_ttl_secs))
            .request_timeout(Duration::from_secs(self.timeout_secs))
            .build()
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "throng=debug" } else { "throng=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn emit(format: Format, report: &Report) -> anyhow::Result<()> {
    match format {
        Format::Text => LogReporter.report(report).await?,
        Format::Json => JsonReporter.report(report).await?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            sessions,
            user_prefix,
            password,
            first_index,
        } => {
            init_tracing(cli.verbose);
            let config = SimulationConfig::builder()
                .base_url(cli.base_url)
                .sessions(sessions)
                .limits(cli.limits.to_limits())
                .identities(
                    IdentityPlan::builder()
                        .prefix(user_prefix)
                        .password(password)
                        .first_index(first_index)
                        .build(),
                )
                .verbose(cli.verbose)
                .build();
            config.validate().context("invalid configuration")?;

            let pool = SessionPool::connect(&config, Arc::new(TracingSink))
                .context("failed to set up the session pool")?;
            let run = pool
                .run(config.sessions)
                .await
                .context("invalid session range")?;
            let report = Report::from(&run);
            emit(cli.format, &report).await?;

            Ok(if report.all_failed() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::Single { username, password } => {
            init_tracing(true);
            let config = SimulationConfig::builder()
                .base_url(cli.base_url)
                .sessions(1)
                .limits(cli.limits.to_limits())
                .verbose(true)
                .build();

            let pool = SessionPool::connect(&config, Arc::new(TracingSink))
                .context("failed to set up the session pool")?;
            let outcome = pool
                .run_session(SessionIdentity::new(0, username, password))
                .await;
            let report = Report::from_outcomes(std::slice::from_ref(&outcome), outcome.elapsed);
            emit(cli.format, &report).await?;

            Ok(if outcome.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
