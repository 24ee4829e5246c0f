use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use itertools::Itertools;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sbcni::config::{Installer, NetConf, NetConfList, SbcniConfig};
use sbcni::net::{BridgeManager, MacAddress, Netlink};
use sbcni::types::CmdArgs;
use sbcni::{BridgePlugin, PinnedRuntime};

/// A command line tool to drive and inspect the bridge CNI plugin
#[derive(Parser)]
#[clap(name = "sbcni-ctl", author, version, about)]
struct Cli {
    /// Enable verbose output
    #[clap(short, long)]
    verbose: bool,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Attach a namespace to a bridge, as ADD would
    Add {
        /// Path of the container network namespace
        #[clap(long)]
        netns: PathBuf,

        /// Interface name inside the namespace
        #[clap(long, default_value = "eth0")]
        ifname: String,

        /// Bridge name
        #[clap(long)]
        bridge: String,

        /// Container address (CIDR notation)
        #[clap(long)]
        ip: String,
    },

    /// Detach a namespace and remove the bridge, as DEL would
    Del {
        /// Path of the container network namespace
        #[clap(long)]
        netns: PathBuf,

        /// Interface name inside the namespace
        #[clap(long, default_value = "eth0")]
        ifname: String,

        /// Bridge name
        #[clap(long)]
        bridge: String,
    },

    /// Generate a network configuration list
    Generate {
        /// Bridge name
        #[clap(long)]
        bridge: String,

        /// Container address (CIDR notation)
        #[clap(long)]
        ip: String,

        /// Network name
        #[clap(long, default_value = "sbcni")]
        name: String,

        /// Output file path
        #[clap(long)]
        output: Option<PathBuf>,
    },

    /// Create CNI directories and write a default network configuration
    Install {
        /// Skip confirmation
        #[clap(long)]
        yes: bool,

        /// CNI config directory
        #[clap(long, default_value = "/etc/cni/net.d")]
        conf_dir: PathBuf,

        /// CNI bin directory
        #[clap(long, default_value = "/opt/cni/bin")]
        bin_dir: PathBuf,

        /// Bridge name
        #[clap(long)]
        bridge: Option<String>,

        /// Container address (CIDR notation)
        #[clap(long)]
        ip: Option<String>,
    },

    /// Status of a bridge and its ports
    Status {
        /// Bridge name
        #[clap(long)]
        bridge: String,
    },

    /// Print a freshly generated MAC address
    Mac,
}

/// Arguments the runtime would hand the plugin, built from flags
fn manual_args(netns: PathBuf, ifname: String, conf: &NetConf) -> Result<CmdArgs> {
    Ok(CmdArgs {
        container_id: format!("sbcni-ctl-{}", std::process::id()),
        netns: netns.display().to_string(),
        ifname,
        args: HashMap::new(),
        path: String::new(),
        stdin_data: serde_json::to_vec(conf)?,
    })
}

fn confirm(prompt: &str) -> Result<bool> {
    println!("{prompt}");
    println!("Continue? [y/N]");
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

async fn show_status(bridge_name: &str) -> Result<()> {
    let nl = Netlink::connect()?;
    let link = nl.link_by_name(bridge_name).await?;
    let state = if link.is_up() { "up" } else { "down" };
    let bridge = BridgeManager::new(&nl).lookup(bridge_name).await?;
    let ports = bridge.ports(&nl).await?;

    println!("Bridge {} (index {}):", bridge.name, bridge.index);
    println!("  State: {state}");
    println!("  MTU: {}", bridge.mtu);
    if ports.is_empty() {
        println!("  Ports: none");
    } else {
        println!("  Ports: {}", ports.iter().map(|p| &p.name).join(", "));
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Configure logging based on verbosity
    let log_level = if cli.verbose { "debug" } else { "info" };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(log_level))
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set default subscriber")?;

    let runtime = PinnedRuntime::new()?;

    match cli.command {
        Commands::Add { netns, ifname, bridge, ip } => {
            let conf = NetConf::new_default("sbcni-ctl", &bridge, Some(&ip));
            let args = manual_args(netns, ifname, &conf)?;
            runtime.block_on(BridgePlugin::new(conf, args).add_network())?;
            println!("Attached {} to bridge {}", ip, bridge);
        }

        Commands::Del { netns, ifname, bridge } => {
            let conf = NetConf::new_default("sbcni-ctl", &bridge, None);
            let args = manual_args(netns, ifname, &conf)?;
            runtime.block_on(BridgePlugin::new(conf, args).del_network())?;
            println!("Detached from bridge {} and removed it", bridge);
        }

        Commands::Generate { bridge, ip, name, output } => {
            // Reject what ADD would reject
            NetConf::new_default(&name, &bridge, Some(&ip)).attachment()?;
            let list = NetConfList::single(&name, &bridge, &ip);
            let config_json = serde_json::to_string_pretty(&list)?;

            if let Some(path) = output {
                fs::write(&path, config_json)?;
                println!("Network configuration written to {}", path.display());
            } else {
                println!("{}", config_json);
            }
        }

        Commands::Install { yes, conf_dir, bin_dir, bridge, ip } => {
            let defaults = SbcniConfig::default();
            let config = SbcniConfig {
                cni_bin_dir: bin_dir,
                cni_conf_dir: conf_dir,
                default_bridge: bridge.unwrap_or(defaults.default_bridge),
                default_ip: ip.unwrap_or(defaults.default_ip),
                default_network: defaults.default_network,
            };

            let prompt = format!(
                "This will write a bridge network configuration to {}.",
                config.cni_conf_dir.display()
            );
            if !yes && !confirm(&prompt)? {
                println!("Installation aborted.");
                return Ok(());
            }

            let path = Installer::new(config).install()?;
            info!(path = %path.display(), "installed network configuration");
            println!("Network configuration installed at {}", path.display());
        }

        Commands::Status { bridge } => {
            runtime.block_on(show_status(&bridge))?;
        }

        Commands::Mac => {
            println!("{}", MacAddress::random()?);
        }
    }

    Ok(())
}
