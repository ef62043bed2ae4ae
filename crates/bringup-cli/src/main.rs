mod cmd;
mod output;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ugv-bringup",
    about = "Sequenced ros2_control bringup: joint state broadcaster, then diff drive controller",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the startup plan without running anything
    Describe,

    /// Run the startup sequence against the controller manager
    Launch,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Launch => tracing::Level::INFO,
        Commands::Describe => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Describe => cmd::describe::run(cli.json),
        Commands::Launch => cmd::launch::run(cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
