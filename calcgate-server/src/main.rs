use calcgate_server::{RuntimeConfig, Settings, run_server};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "calcgate")]
#[command(about = "Capacity-aware dispatcher for calculation clusters")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Server {
        /// Optional configuration file; environment variables override it
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Validate the configuration and print the cluster table
    CheckConfig {
        /// Optional configuration file; environment variables override it
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "calcgate=info,calcgate_core=info,calcgate_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server { config } => {
            let runtime_config = load_runtime_config(config.as_deref());

            tracing::info!(
                "Starting Calcgate: bind={} backend={} clusters={}",
                runtime_config.bind_addr,
                runtime_config.state_backend,
                runtime_config.clusters.len()
            );

            if let Err(e) = run_server(runtime_config).await {
                tracing::error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::CheckConfig { config } => {
            let runtime_config = load_runtime_config(config.as_deref());

            println!("state backend: {}", runtime_config.state_backend);
            println!("callback url:  {}/callback", runtime_config.callback_base_url);
            for (index, cluster) in runtime_config.clusters.iter().enumerate() {
                println!(
                    "{:>3}. {} url={} max_capacity={} max_file_size={}",
                    index + 1,
                    cluster.name,
                    cluster.url,
                    cluster.max_capacity,
                    cluster.max_file_size
                );
            }
        }
    }
}

fn load_runtime_config(path: Option<&str>) -> RuntimeConfig {
    let settings = match Settings::load(path) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    match settings.resolve() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Invalid config: {}", e);
            std::process::exit(1);
        }
    }
}
