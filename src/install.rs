//! Registration with the host OS service manager.
//!
//! Linux uses a systemd unit, macOS a launchd daemon. In both cases the installed
//! service runs `<warden> run` from the root directory.
use std::{
    path::{Path, PathBuf},
    process::Command,
};

use tracing::{debug, info};

use crate::config::ServiceConfig;
use crate::constants::RUN_SUBCOMMAND;
use crate::error::InstallError;

/// Everything needed to describe the service to a service manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub name: String,
    pub display_name: String,
    pub description: String,
    /// Absolute path of the warden executable.
    pub executable: PathBuf,
    /// Directory the service runs in.
    pub root: PathBuf,
}

impl ServiceDefinition {
    pub fn new(service: &ServiceConfig, executable: PathBuf, root: PathBuf) -> Self {
        Self {
            name: service.name.clone(),
            display_name: service.display_name.clone(),
            description: service.description.clone(),
            executable,
            root,
        }
    }
}

/// Renders a systemd unit that keeps `warden run` alive.
pub fn render_systemd_unit(def: &ServiceDefinition) -> String {
    format!(
        "[Unit]\n\
         Description={display}: {description}\n\
         After=network.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         ExecStart=\"{exe}\" {run}\n\
         WorkingDirectory={root}\n\
         Restart=always\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        display = def.display_name,
        description = def.description,
        exe = def.executable.display(),
        run = RUN_SUBCOMMAND,
        root = def.root.display(),
    )
}

/// Renders a launchd property list that keeps `warden run` alive.
pub fn render_launchd_plist(def: &ServiceDefinition) -> Result<Vec<u8>, InstallError> {
    use plist::{Dictionary, Value};

    let mut dict = Dictionary::new();
    dict.insert("Label".into(), Value::String(def.name.clone()));
    dict.insert(
        "ProgramArguments".into(),
        Value::Array(vec![
            Value::String(def.executable.display().to_string()),
            Value::String(RUN_SUBCOMMAND.to_string()),
        ]),
    );
    dict.insert(
        "WorkingDirectory".into(),
        Value::String(def.root.display().to_string()),
    );
    dict.insert("RunAtLoad".into(), Value::Boolean(true));
    dict.insert("KeepAlive".into(), Value::Boolean(true));

    let mut buf = Vec::new();
    Value::Dictionary(dict).to_writer_xml(&mut buf)?;
    Ok(buf)
}

/// Runs a service manager command, failing on a non-zero exit.
fn run_command(program: &str, args: &[&str]) -> Result<(), InstallError> {
    let command = format!("{program} {}", args.join(" "));
    debug!("Running `{command}`");

    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|source| InstallError::Spawn {
            command: command.clone(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(InstallError::CommandFailed {
            command,
            code: status.code(),
        })
    }
}

fn write_definition(path: &Path, contents: &[u8]) -> Result<(), InstallError> {
    std::fs::write(path, contents).map_err(|source| InstallError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_definition(path: &Path) -> Result<(), InstallError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(InstallError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Where the service definition lives on this platform.
pub fn definition_path(def: &ServiceDefinition) -> Result<PathBuf, InstallError> {
    if cfg!(target_os = "linux") {
        Ok(Path::new(crate::constants::SYSTEMD_UNIT_DIR)
            .join(format!("{}.service", def.name)))
    } else if cfg!(target_os = "macos") {
        Ok(Path::new(crate::constants::LAUNCHD_DAEMON_DIR)
            .join(format!("{}.plist", def.name)))
    } else {
        Err(InstallError::UnsupportedPlatform)
    }
}

/// Registers the service and starts it.
pub fn install(def: &ServiceDefinition) -> Result<PathBuf, InstallError> {
    let path = definition_path(def)?;
    let path_str = path.display().to_string();

    if cfg!(target_os = "macos") {
        write_definition(&path, &render_launchd_plist(def)?)?;
        run_command("launchctl", &["load", "-w", &path_str])?;
    } else {
        write_definition(&path, render_systemd_unit(def).as_bytes())?;
        run_command("systemctl", &["daemon-reload"])?;
        run_command("systemctl", &["enable", "--now", &def.name])?;
    }

    info!("Installed service '{}' at {}", def.name, path.display());
    Ok(path)
}

/// Stops the service and removes its registration.
///
/// A failure to stop is logged and does not prevent removal.
pub fn uninstall(def: &ServiceDefinition) -> Result<(), InstallError> {
    let path = definition_path(def)?;
    let path_str = path.display().to_string();

    if cfg!(target_os = "macos") {
        if let Err(err) = run_command("launchctl", &["unload", "-w", &path_str]) {
            tracing::warn!("{err}");
        }
        remove_definition(&path)?;
    } else {
        if let Err(err) = run_command("systemctl", &["disable", "--now", &def.name]) {
            tracing::warn!("{err}");
        }
        remove_definition(&path)?;
        run_command("systemctl", &["daemon-reload"])?;
    }

    info!("Uninstalled service '{}'", def.name);
    Ok(())
}

/// Prints the service manager's view of the installed service.
pub fn status(def: &ServiceDefinition) -> Result<(), InstallError> {
    definition_path(def)?;
    if cfg!(target_os = "macos") {
        run_command("launchctl", &["list", &def.name])
    } else {
        run_command("systemctl", &["status", "--no-pager", &def.name])
    }
}
