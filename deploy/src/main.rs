mod cli;
mod cloud;
mod config;
mod error;
mod orchestrator;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{CliArgs, Command, StackCommand, VolumeCommand};
use cloud::{Credentials, InstanceState, QueryClient};
use config::DeployConfig;
use orchestrator::{Orchestrator, instance_lines, status_lines, volume_lines};
use tracing::info;

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Load configuration
    let mut cfg = DeployConfig::load_or_default(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;

    // Override with command line arguments
    if let Some(region) = args.region {
        cfg.region = region;
    }
    if let Some(endpoint) = args.endpoint {
        cfg.endpoint = Some(endpoint);
    }
    if let Some(key_pair) = args.key_pair {
        cfg.key_pair = key_pair;
    }
    if let Some(log_level) = args.log_level {
        cfg.log_level = log_level;
    }

    // Initialize tracing once configuration is available
    let _log_guard = common::init_tracing(None, "gmap-deploy.log", &cfg.log_level);

    // Credentials are required before any API call
    let credentials = Credentials::from_env()?;
    let client = QueryClient::new(&cfg.endpoint_url(), &cfg.region, credentials)?;
    info!("Using EC2 endpoint {} ({})", cfg.endpoint_url(), cfg.region);

    let orch = Orchestrator::new(client, cfg);
    let tag_name = orch.config().tag_name.clone();

    // Run the requested command
    match args.command {
        Command::Run {
            tag,
            count,
            instance_type,
        } => {
            let instance_type =
                instance_type.unwrap_or_else(|| orch.config().default_instance_type.clone());
            let instances = orch.run(&tag, count, &instance_type).await?;
            print_lines(instance_lines(&instances, &tag_name));
        }
        Command::List { tag } => {
            println!("Instances:");
            print_lines(instance_lines(&orch.instances(tag.as_deref()).await?, &tag_name));
            println!("\nVolumes:");
            print_lines(volume_lines(&orch.volumes(tag.as_deref()).await?, &tag_name));
        }
        Command::Hosts { tag } => {
            for instance in orch.instances(tag.as_deref()).await? {
                if instance.state == InstanceState::Running {
                    println!("{}", instance.public_dns_name);
                }
            }
        }
        Command::Status { tag } => {
            print_lines(status_lines(&orch.status(tag.as_deref()).await?));
        }
        Command::Terminate { tag } => {
            let ids = orch.terminate(tag.as_deref()).await?;
            info!("Terminated {} instances", ids.len());
        }
        Command::Volume(command) => run_volume_command(&orch, command, &tag_name).await?,
        Command::Stack(command) => run_stack_command(&orch, command, &tag_name).await?,
    }

    Ok(())
}

async fn run_volume_command(
    orch: &Orchestrator<QueryClient>,
    command: VolumeCommand,
    tag_name: &str,
) -> Result<()> {
    let cfg = orch.config();
    match command {
        VolumeCommand::Add {
            tag,
            zone,
            size,
            snapshot,
        } => {
            let size = size.unwrap_or(cfg.volume_size_gb);
            let volume = orch
                .add_volume(&tag, &zone, size, snapshot.as_deref())
                .await?;
            print_lines(volume_lines(&[volume], tag_name));
        }
        VolumeCommand::Attach {
            instance,
            volume,
            device,
        } => {
            let device = device.unwrap_or_else(|| cfg.volume_device.clone());
            orch.attach_volume(&instance, &volume, &device).await?;
        }
        VolumeCommand::Delete { volume } => orch.delete_volume(&volume).await?,
        VolumeCommand::Get { instance, device } => {
            let device = device.unwrap_or_else(|| cfg.volume_device.clone());
            match orch.instance_volume(&instance, &device).await? {
                Some(volume) => print_lines(volume_lines(&[volume], tag_name)),
                None => println!("\tNone."),
            }
        }
        VolumeCommand::List { tag } => {
            print_lines(volume_lines(&orch.volumes(tag.as_deref()).await?, tag_name));
        }
    }
    Ok(())
}

async fn run_stack_command(
    orch: &Orchestrator<QueryClient>,
    command: StackCommand,
    tag_name: &str,
) -> Result<()> {
    match command {
        StackCommand::Start { volsize } => {
            let size = volsize.unwrap_or(orch.config().volume_size_gb);
            let stack = orch.start_stack(size).await?;
            print_lines(instance_lines(&[stack.instance], tag_name));
            print_lines(volume_lines(&[stack.volume], tag_name));
        }
        StackCommand::Kill => {
            let ids = orch.kill_stack().await?;
            info!("Terminated {} instances", ids.len());
        }
        StackCommand::Ls => {
            let (instances, volumes) = orch.stack_listing().await?;
            println!("Instances:");
            print_lines(instance_lines(&instances, tag_name));
            println!("Volumes:");
            print_lines(volume_lines(&volumes, tag_name));
        }
    }
    Ok(())
}
