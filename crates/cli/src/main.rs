use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "apex-trade")]
#[command(about = "Unattended AI trading agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading agent daemon
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Halt trading for the current day
    Halt {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Reason recorded alongside the halt
        #[arg(short, long)]
        reason: String,
    },
    /// Resume trading for the current day
    Resume {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Run one signal/risk pass and print the verdict without executing
    SignalOnce {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Run { config } => {
            commands::run_daemon(&config).await?;
        }
        Commands::Halt { config, reason } => {
            commands::halt(&config, &reason).await?;
        }
        Commands::Resume { config } => {
            commands::resume(&config).await?;
        }
        Commands::SignalOnce { config } => {
            commands::signal_once(&config).await?;
        }
    }

    Ok(())
}
