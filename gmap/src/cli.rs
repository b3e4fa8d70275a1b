use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "gmap-server")]
#[command(about = "gmap - link bandwidth collector and dashboard", long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "gmap.toml")]
    pub config: String,

    /// Override listen address
    #[arg(long, env = "GMAP_LISTEN_ADDR")]
    pub listen_addr: Option<String>,

    /// Override SQLite database path
    #[arg(long, env = "GMAP_DATABASE_PATH")]
    pub database_path: Option<String>,

    /// Override directory served under /json/
    #[arg(long)]
    pub json_dir: Option<String>,

    /// Override link liveness interval in seconds
    #[arg(long)]
    pub link_alive_interval_secs: Option<u64>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log directory
    #[arg(long)]
    pub log_dir: Option<String>,
}
