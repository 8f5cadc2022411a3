use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(name = "querysieve-server", version, about = "Serve filtered JSON collections over HTTP")]
pub struct Config {
    /// Address to bind.
    #[arg(long, env = "QUERYSIEVE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "QUERYSIEVE_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Seed file with collections and resource definitions.
    #[arg(long, env = "QUERYSIEVE_DATA")]
    pub data: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, env = "QUERYSIEVE_LOG", default_value = "info")]
    pub log: String,
}

impl Config {
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log))
    }
}
