use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use voxgate::configuration::config::Config;
use voxgate::controller::controller_handler::Controller;
use voxgate::{logging, VERSION};

#[derive(Parser)]
#[command(name = "voxgate")]
#[command(version)]
#[command(about = "Headless voice channel gateway for radio-style push-to-talk")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(env = "VOXGATE_CONFIG", default_value = "voxgate.toml")]
    config_file: PathBuf,

    /// Start on this account instead of the configured account_index
    #[arg(long)]
    account_index: Option<usize>,

    /// Override [logging] level
    #[arg(long)]
    log_level: Option<String>,
}

/// Logger used before the configuration is known, so load errors are visible.
fn fallback_logger() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .try_init();
}

fn load_config(args: &Args) -> Result<Config, String> {
    let mut config = Config::from_file(&args.config_file).map_err(|e| {
        format!(
            "Unable to import configuration from {}: {}",
            args.config_file.display(),
            e
        )
    })?;

    if let Some(index) = args.account_index {
        config.account_index = index;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    config
        .validate()
        .map_err(|e| format!("Invalid command line override: {}", e))?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            fallback_logger();
            error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init(&config.logging) {
        fallback_logger();
        error!("Unable to set up logging: {}", e);
        std::process::exit(1);
    }

    println!(
        "
==============================================================================
                          v  o  x  g  a  t  e
              Headless voice channel gateway v{}
==============================================================================
",
        VERSION
    );

    info!(
        "Configuration imported from {}",
        args.config_file.display()
    );

    let controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = controller.run().await {
        error!("voxgate stopped on a fatal error: {}", e);
        std::process::exit(1);
    }
    info!("voxgate stopped");
}
