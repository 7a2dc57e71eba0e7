pub mod commands;

use clap::Parser;
use commands::Commands;
use shared::compositing::CompositeStrategy;
use shared::models::compression::CompressionState;
use shared::networking::{client::ClientConfig, server::ServerConfig};
use uuid::Uuid;

/// Parallel rendering over TCP: a sort-last render group on one side, a
/// desktop display client on the other.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => {
            let address = match args.address {
                Some(address) => address,
                None => "localhost".to_string(),
            };
            let port = match args.port {
                Some(port) => port,
                None => 8787,
            };
            let width = match args.width {
                Some(width) => width,
                None => 640,
            };
            let height = match args.height {
                Some(height) => height,
                None => 480,
            };
            let ranks = match args.ranks {
                Some(ranks) => ranks,
                None => 4,
            };
            let strategy = match args.strategy {
                Some(strategy) => strategy,
                None => CompositeStrategy::TreeComposite,
            };

            let mut config = ServerConfig::new(address, port, width, height, ranks, strategy);
            if let Some(factor) = args.max_reduction_factor {
                config.max_reduction_factor = factor;
            }
            server::run_server(&config).await;
        }
        Commands::Client(args) => {
            let name = match &args.name {
                Some(name) => name.to_owned(),
                None => format!("display-{}", Uuid::new_v4()),
            };
            let address = match args.address {
                Some(address) => address,
                None => "localhost".to_string(),
            };
            let port = match args.port {
                Some(port) => port,
                None => 8787,
            };

            let mut config = ClientConfig::new(name, address, port);
            if let Some(level) = args.squirt {
                config.compression = CompressionState::new(true, level);
            }
            if let Some(rate) = args.update_rate {
                config.desired_update_rate = rate;
            }
            config.save_dir = args.save_dir;
            config.headless = args.headless;
            client::run_client(&config).await;
        }
    }
}
