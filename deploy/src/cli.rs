use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "gmap-deploy")]
#[command(about = "gmap - EC2 instance and volume management", long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "deploy.toml")]
    pub config: String,

    /// Override EC2 region
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Override Query API endpoint
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Override key pair name
    #[arg(short, long, env = "EC2_KEYPAIR", global = true)]
    pub key_pair: Option<String>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Launch instances and tag them
    Run {
        /// Name tag for the new instances
        #[arg(short, long)]
        tag: String,

        /// Number of instances
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,

        /// Instance type [default: from configuration]
        #[arg(long = "type")]
        instance_type: Option<String>,
    },
    /// List instances and volumes
    List {
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// Print public hostnames of running instances
    Hosts {
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// Count instances per state
    Status {
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// Terminate instances and delete their data volumes
    Terminate {
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// Manage EBS volumes
    #[command(subcommand)]
    Volume(VolumeCommand),
    /// Manage the application stack
    #[command(subcommand)]
    Stack(StackCommand),
}

#[derive(Subcommand, Debug)]
pub enum VolumeCommand {
    /// Create and tag a volume
    Add {
        #[arg(short, long)]
        tag: String,

        /// Availability zone, e.g. us-east-1b
        #[arg(short, long)]
        zone: String,

        /// Size in GB [default: from configuration]
        #[arg(short, long)]
        size: Option<u32>,

        #[arg(long)]
        snapshot: Option<String>,
    },
    /// Attach a volume to an instance in the same zone
    Attach {
        #[arg(short, long)]
        instance: String,

        #[arg(short, long)]
        volume: String,

        /// Device name [default: from configuration]
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Delete a detached volume
    Delete {
        #[arg(short, long)]
        volume: String,
    },
    /// Show the volume attached to an instance
    Get {
        #[arg(short, long)]
        instance: String,

        #[arg(short, long)]
        device: Option<String>,
    },
    /// List volumes
    List {
        #[arg(short, long)]
        tag: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum StackCommand {
    /// Launch the application host with a database volume
    Start {
        /// Database volume size in GB [default: from configuration]
        #[arg(long)]
        volsize: Option<u32>,
    },
    /// Terminate the application host and its database volume
    Kill,
    /// List application hosts and database volumes
    Ls,
}
