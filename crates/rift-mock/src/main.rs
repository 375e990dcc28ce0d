use anyhow::Context;
use clap::Parser;
use rift_mock::{MockFile, MockServer};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rift-mock", version, about = "Serve HTTP expectations from a file")]
struct Args {
    /// Expectation file (YAML, or JSON with a .json extension)
    #[arg(short, long)]
    config: Option<String>,
    #[arg(long, env = "RIFT_MOCK_HOST")]
    host: Option<String>,
    #[arg(short, long, env = "RIFT_MOCK_PORT")]
    port: Option<u16>,
    #[arg(long)]
    wait_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut file = match &args.config {
        Some(path) => MockFile::load(path)
            .with_context(|| format!("Failed to load expectations from {path}"))?,
        None => MockFile::default(),
    };
    if let Some(host) = args.host {
        file.server.host = host;
    }
    if let Some(port) = args.port {
        file.server.port = Some(port);
    }
    if let Some(ms) = args.wait_timeout_ms {
        file.server.wait_timeout_ms = ms;
    }

    let server = MockServer::builder()
        .config(file.server.clone())
        .start()
        .await
        .context("Failed to start mock server")?;
    file.register_all(&server)
        .context("Failed to register expectations")?;

    println!("Rift mock listening on {}", server.url("/"));
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    server.shutdown();
    Ok(())
}
