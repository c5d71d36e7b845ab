use anyhow::Result;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use okey101_server::config::{self, Args, Timing};
use okey101_server::{run_server, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    config::load_dotenv();
    let args = Args::parse();
    init_tracing(args.log_json);

    let timing = Timing::from(&args);
    let config = ServerConfig {
        bind: args.resolved_bind(),
        timing,
    };

    run_server(config).await
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
