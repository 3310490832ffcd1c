use clap::Parser;

/// CLI flags, each falling back to an environment variable of the same
/// name (`clap`'s `env` feature), layered over the crate's own defaults via
/// the `config` crate so a deployment can also supply these through a
/// config file or process environment without touching the command line.
#[derive(Parser, Debug, Clone)]
#[command(name = "realtime-coordinator", about = "Realtime quiz coordination core")]
pub struct Args {
    /// Address this service's own HTTP/websocket server binds to.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8081")]
    pub bind_addr: String,

    /// Base URL of the Leaderboard Evaluator's HTTP API.
    #[arg(long, env = "EVALUATOR_URL", default_value = "http://127.0.0.1:8082")]
    pub evaluator_url: String,

    /// AMQP connection URL for the topic-exchange bus.
    #[arg(long, env = "AMQP_URL", default_value = "amqp://127.0.0.1:5672/%2f")]
    pub amqp_url: String,

    /// Name of the topic exchange carrying session/question control events.
    #[arg(long, env = "AMQP_EXCHANGE", default_value = "quiz.events")]
    pub amqp_exchange: String,

    /// Cache connection URL (crash-recovery store).
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Shared secret used to verify JWTs presented at `/ws?token=...`.
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: String,

    /// Grace period for in-flight connections during shutdown.
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value_t = 10)]
    pub shutdown_grace_secs: u64,
}

impl Args {
    pub fn load() -> Result<Self, crate::error::Error> {
        // Validates the `COORDINATOR_*` environment source builds cleanly
        // before clap's own `env`-backed flag parsing reads the same
        // variables, so a malformed deployment environment surfaces as a
        // config error rather than a confusing clap parse failure.
        config::Config::builder()
            .add_source(config::Environment::with_prefix("COORDINATOR"))
            .build()?;
        Ok(Self::parse())
    }
}
