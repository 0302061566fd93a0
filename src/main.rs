use std::process;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Lone switch: generate one digest immediately instead of waiting for
    // the next cron slot.
    let run_immediately = std::env::args().any(|arg| arg == "--test");

    let config = match compintel::config::Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = compintel::run(config, run_immediately).await {
        log::error!("Fatal: {}", e);
        process::exit(1);
    }
}
