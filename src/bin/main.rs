//! Concerto cloud provider CLI

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use concerto_cloud::{ConcertoCloud, ProviderConfig, ServicePort, SessionAffinity};

#[derive(Parser)]
#[command(name = "concerto-cloud")]
#[command(about = "Manage Concerto instances and TCP load balancers", long_about = None)]
struct Cli {
    /// Provider configuration file (TOML)
    #[arg(short, long, default_value = "/etc/concerto/concerto-cloud.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List instances
    Instances {
        /// Regular expression the whole instance name must match
        #[arg(short, long, default_value = ".*")]
        filter: String,
    },
    /// Show one instance
    Instance {
        /// Instance name (fqdn)
        name: String,
    },
    /// Manage TCP load balancers
    Lb {
        #[command(subcommand)]
        command: LbCommands,
    },
}

#[derive(Subcommand)]
enum LbCommands {
    /// Show a load balancer's ingress
    Get {
        name: String,
    },
    /// Create a load balancer or converge its members
    Ensure {
        name: String,
        /// Port exposed by the load balancer
        #[arg(short, long)]
        port: u16,
        /// Port traffic is sent to on each node
        #[arg(short, long)]
        node_port: u16,
        /// Backend host name (repeatable)
        #[arg(long = "host")]
        hosts: Vec<String>,
    },
    /// Converge members of an existing load balancer
    Update {
        name: String,
        /// Backend host name (repeatable)
        #[arg(long = "host")]
        hosts: Vec<String>,
    },
    /// Delete a load balancer if it exists
    Delete {
        name: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = ProviderConfig::load(&cli.config)?;
    config.logging.init();
    let cloud = ConcertoCloud::from_config(&config)?;

    match cli.command {
        Commands::Instances { filter } => {
            cmd_instances(&cloud, &filter)?;
        }
        Commands::Instance { name } => {
            cmd_instance(&cloud, &name)?;
        }
        Commands::Lb { command } => match command {
            LbCommands::Get { name } => {
                cmd_lb_get(&cloud, &name)?;
            }
            LbCommands::Ensure { name, port, node_port, hosts } => {
                cmd_lb_ensure(&cloud, &name, port, node_port, &hosts)?;
            }
            LbCommands::Update { name, hosts } => {
                cmd_lb_update(&cloud, &name, &hosts)?;
            }
            LbCommands::Delete { name } => {
                cmd_lb_delete(&cloud, &name)?;
            }
        },
    }

    Ok(())
}

fn cmd_instances(cloud: &ConcertoCloud, filter: &str) -> Result<(), Box<dyn std::error::Error>> {
    let instances = cloud.instances(filter)?;

    if instances.is_empty() {
        println!("No instances found.");
        return Ok(());
    }

    println!("{:<40} {:<16} {:<40}", "NAME", "ADDRESS", "ID");
    println!("{}", "-".repeat(96));
    for instance in instances {
        println!(
            "{:<40} {:<16} {:<40}",
            instance.name, instance.address, instance.id
        );
    }

    Ok(())
}

fn cmd_instance(cloud: &ConcertoCloud, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let instance = cloud.instance(name)?;
    let resources = cloud.node_resources(name)?;

    println!("Instance '{}'", instance.name);
    println!("  ID:      {}", instance.id);
    for address in cloud.node_addresses(name)? {
        println!("  Address: {} ({:?})", address.address, address.kind);
    }
    println!("  CPU:     {}m", resources.cpu_millicores);
    println!("  Memory:  {} MiB", instance.memory_mib());
    println!("  Storage: {} GiB", instance.storage_gib());

    Ok(())
}

fn cmd_lb_get(cloud: &ConcertoCloud, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    match cloud.get_tcp_load_balancer(name)? {
        Some(status) => {
            println!("Load balancer '{}'", name);
            println!("  Ingress: {}", status.hostname().unwrap_or("-"));
        }
        None => println!("Load balancer '{}' not found.", name),
    }

    Ok(())
}

fn cmd_lb_ensure(
    cloud: &ConcertoCloud,
    name: &str,
    port: u16,
    node_port: u16,
    hosts: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Ensuring load balancer '{}'...", name);
    println!("  Port: {} -> {}", port, node_port);
    println!("  Hosts: {}", hosts.len());

    let ports = [ServicePort { port, node_port }];
    let status = cloud.ensure_tcp_load_balancer(name, None, &ports, hosts, SessionAffinity::None)?;

    println!("Load balancer '{}' ready at {}", name, status.hostname().unwrap_or("-"));
    Ok(())
}

fn cmd_lb_update(
    cloud: &ConcertoCloud,
    name: &str,
    hosts: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let diff = cloud.update_tcp_load_balancer(name, hosts)?;

    if diff.is_empty() {
        println!("Load balancer '{}' already up to date.", name);
        return Ok(());
    }
    for address in &diff.to_remove {
        println!("  - {}", address);
    }
    for address in &diff.to_add {
        println!("  + {}", address);
    }
    println!("Load balancer '{}' updated ({} changes).", name, diff.len());

    Ok(())
}

fn cmd_lb_delete(cloud: &ConcertoCloud, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("Deleting load balancer '{}'...", name);
    cloud.ensure_tcp_load_balancer_deleted(name)?;
    println!("Load balancer '{}' deleted.", name);

    Ok(())
}
