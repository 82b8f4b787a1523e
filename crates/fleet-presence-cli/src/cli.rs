use clap::Parser;

/// fleet-presence: join the fleet presence channel and watch who is online.
#[derive(Parser, Debug)]
#[command(name = "fleet-presence", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<String>,

    /// Log level override (debug, info, warn, error) or a full filter directive.
    #[arg(long)]
    pub log_level: Option<String>,

    /// User id to announce. A random id is generated when omitted.
    #[arg(long)]
    pub user_id: Option<String>,

    #[arg(long)]
    pub username: Option<String>,

    #[arg(long)]
    pub display_name: Option<String>,

    /// Room to announce on start.
    #[arg(short = 'r', long)]
    pub room: Option<String>,

    /// Network quality hint (slow, medium, fast, 2g, 3g, 4g).
    #[arg(short = 'q', long)]
    pub quality: Option<String>,

    /// Use an in-process transport instead of the network.
    #[arg(long)]
    pub memory: bool,
}

pub fn parse() -> Args {
    Args::parse()
}
