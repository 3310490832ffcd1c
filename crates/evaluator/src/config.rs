use clap::Parser;

use crate::error::Error;

/// CLI flags for the Evaluator, each falling back to an environment
/// variable of the same name. The Evaluator needs no peer-service address
/// and no auth secret — it is a stateless scorer reachable only over
/// `POST /get-results`.
#[derive(Parser, Debug, Clone)]
#[command(name = "leaderboard-evaluator", about = "Stateless quiz leaderboard scorer")]
pub struct Args {
    /// Address this service's own HTTP server binds to.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8082")]
    pub bind_addr: String,

    /// Cache connection URL (cumulative score index).
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,
}

impl Args {
    pub fn load() -> Result<Self, Error> {
        // Validates the `EVALUATOR_*` environment source builds cleanly
        // before clap's own `env`-backed flag parsing reads the same
        // variables, so a malformed deployment environment surfaces as a
        // config error rather than a confusing clap parse failure.
        config::Config::builder()
            .add_source(config::Environment::with_prefix("EVALUATOR"))
            .build()?;
        Ok(Self::parse())
    }
}
