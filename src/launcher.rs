//! Decides what `linoffice-setup launch` opens: the main window or the installer.

use crate::config::{Paths, CONTAINER_NAME, MAIN_APP_INTERPRETER, SETUP_COMPLETE_MARKER};
use crate::debug;
use crate::terminal::ExternalCommandRunner;
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchQuestion {
    SetupIncomplete,
    ContainerMissing,
}

impl LaunchQuestion {
    pub fn message(self) -> &'static str {
        match self {
            LaunchQuestion::SetupIncomplete => {
                "Setup might be incomplete.\nDo you want to open the installer again?"
            }
            LaunchQuestion::ContainerMissing => {
                "LinOffice container can't be found.\n\
                 It could have been deleted.\n\
                 Open the installer again?"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchDecision {
    OpenMain,
    OpenInstaller,
    Ask(LaunchQuestion),
}

pub fn decide(container_found: bool, setup_ok: bool) -> LaunchDecision {
    match (container_found, setup_ok) {
        (true, true) => LaunchDecision::OpenMain,
        (true, false) => LaunchDecision::Ask(LaunchQuestion::SetupIncomplete),
        (false, true) => LaunchDecision::Ask(LaunchQuestion::ContainerMissing),
        (false, false) => LaunchDecision::OpenInstaller,
    }
}

/// The setup script records a finished Office install in its progress log
pub fn setup_completed(progress_log: &Path) -> bool {
    match std::fs::read(progress_log) {
        Ok(bytes) => String::from_utf8_lossy(&bytes)
            .lines()
            .any(|line| line.contains(SETUP_COMPLETE_MARKER)),
        Err(_) => false,
    }
}

/// Whether `podman ps -a` lists the container. Any failure counts as "no".
pub fn container_exists(name: &str) -> bool {
    match Command::new("podman")
        .args(["ps", "-a", "--format", "{{.Names}}"])
        .output()
    {
        Ok(output) => container_listed(&String::from_utf8_lossy(&output.stdout), name),
        Err(e) => {
            debug::warn(&format!("Could not query podman: {}", e));
            false
        }
    }
}

fn container_listed(names: &str, name: &str) -> bool {
    names.lines().any(|line| line.trim() == name)
}

/// Look at the machine and decide
pub fn evaluate(paths: &Paths) -> LaunchDecision {
    let container_found = container_exists(CONTAINER_NAME);
    let setup_ok = setup_completed(&paths.setup_progress_log);
    let decision = decide(container_found, setup_ok);
    debug::log(&format!(
        "Launch: container={} setup_ok={} -> {:?}",
        container_found, setup_ok, decision
    ));
    decision
}

/// Start the main LinOffice window, detached
pub fn open_main(runner: &dyn ExternalCommandRunner, paths: &Paths) -> std::io::Result<u32> {
    runner.run(
        MAIN_APP_INTERPRETER,
        &[paths.main_window_script.to_string_lossy().to_string()],
    )
}
