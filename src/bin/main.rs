use std::{
    error::Error,
    path::{Path, PathBuf},
    sync::{Arc, mpsc},
};
use tracing::{error, info};

use warden::{
    cli::{Commands, parse_args},
    config::{Config, load_config},
    install::{self, ServiceDefinition},
    logs::{self, TracingSink},
    runtime::{enter_root, resolve_root},
    service::Warden,
};

fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args();

    let root = resolve_root()?;
    enter_root(&root)?;

    // Logging is not up yet; returning the error reports it on stderr.
    let config = load_config(&root)?;

    let override_level = args.log_level.map(|level| level.to_string());
    logs::init(&config.logging, &root, override_level.as_deref())?;

    match args.command() {
        Commands::Install => {
            let def = service_definition(&config, &root)?;
            let path = install::install(&def)?;
            println!("Installed '{}' ({})", def.name, path.display());
        }
        Commands::Uninstall => {
            let def = service_definition(&config, &root)?;
            install::uninstall(&def)?;
            println!("Uninstalled '{}'", def.name);
        }
        Commands::Status => {
            let def = service_definition(&config, &root)?;
            install::status(&def)?;
        }
        Commands::Run => run(root, config)?,
    }

    Ok(())
}

fn service_definition(config: &Config, root: &Path) -> Result<ServiceDefinition, Box<dyn Error>> {
    let executable = std::env::current_exe()?;
    Ok(ServiceDefinition::new(
        &config.service,
        executable,
        root.to_path_buf(),
    ))
}

fn run(root: PathBuf, config: Config) -> Result<(), Box<dyn Error>> {
    let warden = Warden::new(root, config, Arc::new(TracingSink));
    let (tx, rx) = mpsc::channel();
    register_signal_handler(tx)?;

    if let Err(err) = warden.run(rx) {
        error!("warden exited with error: {err}");
        return Err(err.into());
    }

    Ok(())
}

fn register_signal_handler(shutdown: mpsc::Sender<()>) -> Result<(), Box<dyn Error>> {
    ctrlc::set_handler(move || {
        info!("Shutdown requested");
        let _ = shutdown.send(());
    })?;

    Ok(())
}
