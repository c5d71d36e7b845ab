//! Server configuration: CLI flags, environment fallbacks, and the timing
//! constants that drive room phase transitions.

use std::time::Duration;

use clap::Parser;

/// Command-line arguments, each with an environment-variable fallback.
#[derive(Debug, Parser)]
#[command(name = "okey101_server", about = "Authoritative Okey101 room server")]
pub struct Args {
    /// Address to bind the HTTP/WebSocket listener to.
    #[arg(long, env = "SERVER_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// Raw port override; takes precedence over `--bind`'s port when set.
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Emit JSON-formatted log lines instead of compact text.
    #[arg(long, env = "SERVER_LOG_JSON", default_value_t = false)]
    pub log_json: bool,

    #[arg(long, env = "TURN_SECONDS", default_value_t = 50)]
    pub turn_seconds: u64,

    #[arg(long, env = "AUTO_START_SECONDS", default_value_t = 5)]
    pub auto_start_seconds: u64,

    #[arg(long, env = "BUILD_PILE_SECONDS", default_value_t = 15)]
    pub build_pile_seconds: u64,

    #[arg(long, env = "DICE_SECONDS", default_value_t = 5)]
    pub dice_seconds: u64,

    #[arg(long, env = "DEAL_SECONDS", default_value_t = 12)]
    pub deal_seconds: u64,

    #[arg(long, env = "INTERMISSION_SECONDS", default_value_t = 10)]
    pub intermission_seconds: u64,

    #[arg(long, env = "SOLVER_BUDGET_MS", default_value_t = 30)]
    pub solver_budget_ms: u64,
}

/// Timing constants resolved from [`Args`], handed to every room on creation.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub turn: Duration,
    pub auto_start: Duration,
    pub build_pile: Duration,
    pub dice: Duration,
    pub deal: Duration,
    pub intermission: Duration,
    pub solver_budget: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            turn: Duration::from_secs(50),
            auto_start: Duration::from_secs(5),
            build_pile: Duration::from_secs(15),
            dice: Duration::from_secs(5),
            deal: Duration::from_secs(12),
            intermission: Duration::from_secs(10),
            solver_budget: Duration::from_millis(30),
        }
    }
}

impl From<&Args> for Timing {
    fn from(args: &Args) -> Self {
        Self {
            turn: Duration::from_secs(args.turn_seconds),
            auto_start: Duration::from_secs(args.auto_start_seconds),
            build_pile: Duration::from_secs(args.build_pile_seconds),
            dice: Duration::from_secs(args.dice_seconds),
            deal: Duration::from_secs(args.deal_seconds),
            intermission: Duration::from_secs(args.intermission_seconds),
            solver_budget: Duration::from_millis(args.solver_budget_ms),
        }
    }
}

impl Args {
    /// The socket address to bind, folding `--port`/`PORT` over `--bind`'s
    /// port when both are present.
    pub fn resolved_bind(&self) -> String {
        match self.port {
            Some(port) => match self.bind.rsplit_once(':') {
                Some((host, _)) => format!("{host}:{port}"),
                None => format!("{}:{port}", self.bind),
            },
            None => self.bind.clone(),
        }
    }
}

/// Loads `.env` the same way as the bind: manifest-relative first, then cwd.
pub fn load_dotenv() {
    if let Some(manifest_dir) = option_env!("CARGO_MANIFEST_DIR") {
        let _ = dotenv::from_path(std::path::Path::new(manifest_dir).join(".env"));
    }
    let _ = dotenv::dotenv();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_override_replaces_bind_port() {
        let args = Args {
            bind: "0.0.0.0:8080".to_string(),
            port: Some(3000),
            log_json: false,
            turn_seconds: 50,
            auto_start_seconds: 5,
            build_pile_seconds: 15,
            dice_seconds: 5,
            deal_seconds: 12,
            intermission_seconds: 10,
            solver_budget_ms: 30,
        };
        assert_eq!(args.resolved_bind(), "0.0.0.0:3000");
    }

    #[test]
    fn no_port_override_keeps_bind() {
        let args = Args {
            bind: "127.0.0.1:9090".to_string(),
            port: None,
            log_json: false,
            turn_seconds: 50,
            auto_start_seconds: 5,
            build_pile_seconds: 15,
            dice_seconds: 5,
            deal_seconds: 12,
            intermission_seconds: 10,
            solver_budget_ms: 30,
        };
        assert_eq!(args.resolved_bind(), "127.0.0.1:9090");
    }
}
