//! peerweave CLI: initialize a node, run its engine, and manage networks.

mod cli;
mod cmd;
mod config;

use clap::Parser;
use cli::{Cli, Commands, NetworkCommands, ShardCommands};
use tracing_subscriber::EnvFilter;

fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    // The global subscriber depends on the loaded log level, so config
    // warnings go through a temporary one.
    let boot = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_writer(std::io::stderr)
        .finish();
    let node_config =
        tracing::subscriber::with_default(boot, || config::load_config(cli.config.as_deref()));
    init_tracing(&node_config.log_level);

    let result = match cli.command {
        Commands::Init { address, force } => {
            cmd::init::cmd_init(cli.config.as_deref(), node_config, &address, force)
        }
        Commands::Start => cmd::init::cmd_start(node_config),
        Commands::Network(sub) => match sub {
            NetworkCommands::Create { name, timeout } => {
                cmd::network::cmd_network_create(node_config, &name, timeout)
            }
            NetworkCommands::List => cmd::network::cmd_network_list(node_config),
            NetworkCommands::Show { name } => cmd::network::cmd_network_show(node_config, &name),
            NetworkCommands::Join { host, port, name } => {
                cmd::network::cmd_network_join(node_config, &host, port, &name)
            }
            NetworkCommands::Fetch { remote, name } => {
                cmd::network::cmd_network_fetch(node_config, &remote, &name)
            }
            NetworkCommands::Push { remote, name } => {
                cmd::network::cmd_network_push(node_config, &remote, &name)
            }
            NetworkCommands::Prune { name } => cmd::network::cmd_network_prune(node_config, &name),
        },
        Commands::Shard(sub) => match sub {
            ShardCommands::Create { network, peers } => {
                cmd::network::cmd_shard_create(node_config, &network, &peers)
            }
            ShardCommands::Repartition {
                network,
                shard,
                exponent,
            } => cmd::network::cmd_shard_repartition(node_config, &network, &shard, exponent),
        },
        Commands::SendMessage {
            network,
            message_type,
            priority,
            to,
            message,
        } => cmd::network::cmd_send_message(
            node_config,
            &network,
            &message_type,
            priority,
            to.as_deref(),
            &message,
        ),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
