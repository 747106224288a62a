use clap::Parser;
use log::{error, info};

use collabnotes::{App, Cli, Config, Session};

pub fn initialize_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .format_module_path(true)
        .init();

    info!("Logger initialized");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    initialize_logger(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let session = Session::open(config.file_backend(), config.remote_policy);
    let mut app = App::new(session, config, config_path, cli.verbose);

    let outcome = app.run(cli.command).await;
    app.shutdown();

    if let Err(e) = outcome {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
