//! Runs `linoffice-setup update` as a child so the GUI can show its output
//! and answer its yes/no question.

use crate::error::SupervisorError;
use crate::gate::{Activity, ActivityGate, ActivityPermit};
use crate::log_render::LogLine;
use crate::supervisor::{CommandSpec, Notifier, Supervisor};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;

/// The child asks this before downloading anything
const QUESTION_MARKER: &str = "(y/n)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Idle,
    Checking,
    AwaitingAnswer,
    Applying,
    Finished(Option<i32>),
}

#[derive(Debug, Error)]
pub enum UpdateRunError {
    #[error("an update is already running")]
    AlreadyActive,
    #[error("cannot update while an {0} is running")]
    Busy(Activity),
    #[error("the updater is not waiting for an answer")]
    NotAsked,
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

pub struct UpdateRun {
    supervisor: Supervisor,
    gate: ActivityGate,
    permit: Option<ActivityPermit>,
    phase: UpdatePhase,
    scanned: usize,
}

impl UpdateRun {
    pub fn new(handle: Handle, gate: ActivityGate) -> Self {
        Self {
            supervisor: Supervisor::new(handle, Duration::from_secs(2)),
            gate,
            permit: None,
            phase: UpdatePhase::Idle,
            scanned: 0,
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.supervisor = self.supervisor.with_notifier(notifier);
        self
    }

    /// `<exe> update --dir <install_dir>`
    pub fn command_for(exe: &Path, install_dir: &Path) -> CommandSpec {
        CommandSpec::new(exe, install_dir)
            .arg("update")
            .arg("--dir")
            .arg(install_dir.to_string_lossy())
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.phase, UpdatePhase::Idle | UpdatePhase::Finished(_))
    }

    pub fn lines(&self) -> &[LogLine] {
        self.supervisor.session().map(|s| s.lines()).unwrap_or(&[])
    }

    pub fn start(&mut self, spec: &CommandSpec) -> Result<(), UpdateRunError> {
        if self.is_active() {
            return Err(UpdateRunError::AlreadyActive);
        }
        let permit = self.gate.try_acquire(Activity::Update).map_err(UpdateRunError::Busy)?;
        self.supervisor.start(spec)?;
        self.permit = Some(permit);
        self.scanned = 0;
        self.phase = UpdatePhase::Checking;
        Ok(())
    }

    pub fn poll(&mut self) -> usize {
        let new_lines = self.supervisor.drain();
        let Some(session) = self.supervisor.session() else {
            return new_lines;
        };

        let asked = session.lines()[self.scanned..]
            .iter()
            .any(|l| l.plain.contains(QUESTION_MARKER));
        self.scanned = session.lines().len();
        let exit = session.exit();

        if asked && self.phase == UpdatePhase::Checking {
            self.phase = UpdatePhase::AwaitingAnswer;
        }
        if let Some(exit) = exit {
            if self.is_active() {
                self.phase = UpdatePhase::Finished(exit.code());
                self.permit = None;
            }
        }
        new_lines
    }

    /// Forward the user's choice to the child
    pub fn answer(&mut self, yes: bool) -> Result<(), UpdateRunError> {
        if self.phase != UpdatePhase::AwaitingAnswer {
            return Err(UpdateRunError::NotAsked);
        }
        let session = self.supervisor.session().ok_or(SupervisorError::NoSession)?;
        session.send_input(if yes { "y\n" } else { "n\n" })?;
        self.phase = UpdatePhase::Applying;
        Ok(())
    }

    /// Window closed: kill the child if it is still around
    pub fn cancel(&mut self) {
        if self.supervisor.is_running() {
            let _ = self.supervisor.cancel(false);
        }
    }
}
