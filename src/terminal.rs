//! Running external commands the installer does not supervise.
//!
//! The container cleanup and the main window are started detached and
//! forgotten; only whether the launch worked is reported back.

use crate::config::TERMINAL_CANDIDATES;
use crate::debug;
use crate::error::TerminalUnavailable;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Starts a named program with arguments and returns its PID
pub trait ExternalCommandRunner {
    fn run(&self, name: &str, args: &[String]) -> std::io::Result<u32>;
}

/// Spawns detached processes in their own process group
#[derive(Debug, Default, Clone)]
pub struct DetachedRunner {
    working_dir: Option<PathBuf>,
}

impl DetachedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start programs from `dir` (the main window loads its UI files relative to it)
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
        }
    }
}

impl ExternalCommandRunner for DetachedRunner {
    fn run(&self, name: &str, args: &[String]) -> std::io::Result<u32> {
        let mut cmd = Command::new(name);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        let child = cmd.spawn()?;
        debug::log(&format!("Started detached {} {:?} (PID {})", name, args, child.id()));
        Ok(child.id())
    }
}

/// Run `script` in the first terminal emulator that starts.
/// Never retried: the caller reports the error and moves on.
pub fn run_in_terminal(
    runner: &dyn ExternalCommandRunner,
    script: &Path,
) -> Result<u32, TerminalUnavailable> {
    let script_arg = script.to_string_lossy().to_string();
    let mut tried = Vec::new();

    for candidate in TERMINAL_CANDIDATES {
        let Some((program, rest)) = candidate.split_first() else {
            continue;
        };
        let args: Vec<String> = rest
            .iter()
            .map(|a| if *a == "{script}" { script_arg.clone() } else { a.to_string() })
            .collect();

        match runner.run(program, &args) {
            Ok(pid) => return Ok(pid),
            Err(e) => {
                debug::log(&format!("Terminal {} unavailable: {}", program, e));
                tried.push(program.to_string());
            }
        }
    }

    debug::error(&format!("No terminal could run {:?}", script));
    Err(TerminalUnavailable {
        script: script.to_path_buf(),
        tried: tried.join(", "),
    })
}

/// Make sure a script we are about to hand to a terminal is executable
#[cfg(unix)]
pub fn ensure_executable(script: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(script)?.permissions();
    if perms.mode() & 0o111 == 0 {
        perms.set_mode(0o755);
        std::fs::set_permissions(script, perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn ensure_executable(script: &Path) -> std::io::Result<()> {
    std::fs::metadata(script).map(|_| ())
}
