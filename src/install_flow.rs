//! The installation state machine.
//!
//! Sequences supervisor sessions through start, failure, retry and abort.
//! The GUI calls [`InstallFlow::poll`] every frame; all transitions caused by
//! the child (output, exit, grace period expiry) happen there.

use crate::config::{Paths, MAIN_APP_INTERPRETER};
use crate::debug;
use crate::error::{SupervisorError, TerminalUnavailable};
use crate::gate::{Activity, ActivityGate, ActivityPermit};
use crate::supervisor::{CommandSpec, Notifier, Session, SessionOutcome, Supervisor};
use crate::terminal::{ensure_executable, run_in_terminal, ExternalCommandRunner};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;

/// Why the last attempt failed, shown in the Retry / Show log / Exit dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub message: String,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Success,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallState {
    Idle,
    Running,
    AwaitingUserDecision(Failure),
    Retrying,
    AbortConfirming,
    AbortingGraceful,
    AbortingForced,
    Terminated(Termination),
}

impl InstallState {
    /// A child may still be alive in these states
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            InstallState::Running
                | InstallState::Retrying
                | InstallState::AbortConfirming
                | InstallState::AbortingGraceful
                | InstallState::AbortingForced
        )
    }
}

/// Buttons of the failure dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry,
    ViewLog,
    Exit,
}

/// Container removal offered after an abort
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOffer {
    NotOffered,
    Offered,
    Declined,
    Started(u32),
    Failed(String),
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("an installation is already running")]
    AlreadyActive,
    #[error("cannot start while an {0} is running")]
    Busy(Activity),
    #[error(transparent)]
    Launch(#[from] SupervisorError),
    #[error("{action} is not possible while {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: InstallState,
    },
}

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("container removal is not on offer")]
    NotOffered,
    #[error("cleanup script not found: {0:?}")]
    MissingScript(PathBuf),
    #[error(transparent)]
    Terminal(#[from] TerminalUnavailable),
}

pub struct InstallFlow {
    supervisor: Supervisor,
    paths: Paths,
    command: CommandSpec,
    gate: ActivityGate,
    permit: Option<ActivityPermit>,
    state: InstallState,
    resume_state: Option<InstallState>,
    attempts: u32,
    cleanup: CleanupOffer,
}

impl InstallFlow {
    pub fn new(handle: Handle, paths: Paths, gate: ActivityGate, grace: Duration) -> Self {
        let supervisor = Supervisor::new(handle, grace).with_log_file(paths.install_log.clone());
        Self {
            supervisor,
            command: CommandSpec::script(&paths.setup_script),
            paths,
            gate,
            permit: None,
            state: InstallState::Idle,
            resume_state: None,
            attempts: 0,
            cleanup: CleanupOffer::NotOffered,
        }
    }

    /// Run something other than the setup script
    #[cfg(test)]
    pub fn with_command(mut self, command: CommandSpec) -> Self {
        self.command = command;
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.supervisor = self.supervisor.with_notifier(notifier);
        self
    }

    pub fn state(&self) -> &InstallState {
        &self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.supervisor.session()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn cleanup(&self) -> &CleanupOffer {
        &self.cleanup
    }

    #[cfg(test)]
    pub fn install_log(&self) -> &std::path::Path {
        &self.paths.install_log
    }

    /// 0–100 for the current session, 0 before the first start
    pub fn progress_percent(&self) -> f64 {
        self.supervisor
            .session()
            .map(|s| s.progress().percent())
            .unwrap_or(0.0)
    }

    fn transition(&mut self, next: InstallState) {
        debug::log(&format!("Install state: {:?} -> {:?}", self.state, next));
        self.state = next;
    }

    /// Idle → Running
    pub fn start(&mut self) -> Result<(), FlowError> {
        match self.state {
            InstallState::Idle => {}
            ref state if state.is_active() => return Err(FlowError::AlreadyActive),
            ref state => {
                return Err(FlowError::InvalidTransition {
                    action: "start",
                    state: state.clone(),
                })
            }
        }

        let permit = self.gate.try_acquire(Activity::Install).map_err(FlowError::Busy)?;
        debug::log_section("Starting Installation");
        self.launch()?;
        self.permit = Some(permit);
        self.transition(InstallState::Running);
        Ok(())
    }

    fn launch(&mut self) -> Result<(), SupervisorError> {
        self.attempts += 1;
        debug::log(&format!("Attempt {}", self.attempts));
        match self.supervisor.start(&self.command) {
            Ok(_) => Ok(()),
            Err(e) => {
                debug::error(&e.to_string());
                Err(e)
            }
        }
    }

    /// Drain child output and apply child-driven transitions. Never blocks.
    pub fn poll(&mut self) -> usize {
        let new_lines = self.supervisor.drain();

        let Some(session) = self.supervisor.session() else {
            return new_lines;
        };
        let outcome = session.outcome();
        let forcing = session.is_forcing();

        match self.state {
            InstallState::Running => match outcome {
                SessionOutcome::Pending => {}
                SessionOutcome::Success(_) => {
                    self.permit = None;
                    self.transition(InstallState::Terminated(Termination::Success));
                }
                SessionOutcome::Failure(code) => {
                    let failure = Failure {
                        message: self.failure_message(),
                        exit_code: Some(code),
                    };
                    self.transition(InstallState::AwaitingUserDecision(failure));
                }
                SessionOutcome::Aborted => self.finish_abort(),
            },
            InstallState::AbortingGraceful | InstallState::AbortingForced
                if outcome != SessionOutcome::Pending =>
            {
                self.finish_abort()
            }
            InstallState::AbortingGraceful if forcing => {
                self.transition(InstallState::AbortingForced);
            }
            _ => {}
        }

        new_lines
    }

    fn failure_message(&self) -> String {
        self.supervisor
            .session()
            .and_then(Session::last_error)
            .map(|line| line.plain.clone())
            .unwrap_or_else(|| "Unknown error".to_string())
    }

    fn finish_abort(&mut self) {
        self.permit = None;
        self.cleanup = CleanupOffer::Offered;
        self.transition(InstallState::Terminated(Termination::Aborted));
    }

    /// Answer the failure dialog. `ViewLog` returns the log to show and keeps the dialog open.
    pub fn decide(&mut self, decision: Decision) -> Result<Option<PathBuf>, FlowError> {
        if !matches!(self.state, InstallState::AwaitingUserDecision(_)) {
            return Err(FlowError::InvalidTransition {
                action: "decide",
                state: self.state.clone(),
            });
        }

        match decision {
            Decision::ViewLog => Ok(Some(self.paths.install_log.clone())),
            Decision::Exit => {
                self.resume_state = Some(self.state.clone());
                self.transition(InstallState::AbortConfirming);
                Ok(None)
            }
            Decision::Retry => {
                self.transition(InstallState::Retrying);
                match self.launch() {
                    Ok(()) => {
                        self.transition(InstallState::Running);
                        Ok(None)
                    }
                    Err(e) => {
                        let failure = Failure {
                            message: e.to_string(),
                            exit_code: None,
                        };
                        self.transition(InstallState::AwaitingUserDecision(failure));
                        Err(e.into())
                    }
                }
            }
        }
    }

    /// Running → AbortConfirming. Nothing is sent to the child yet.
    pub fn request_abort(&mut self) -> Result<(), FlowError> {
        if self.state != InstallState::Running {
            return Err(FlowError::InvalidTransition {
                action: "abort",
                state: self.state.clone(),
            });
        }
        self.resume_state = Some(InstallState::Running);
        self.transition(InstallState::AbortConfirming);
        Ok(())
    }

    /// Back to wherever the abort was requested from, untouched
    pub fn decline_abort(&mut self) -> Result<(), FlowError> {
        if self.state != InstallState::AbortConfirming {
            return Err(FlowError::InvalidTransition {
                action: "decline abort",
                state: self.state.clone(),
            });
        }
        let resume = self.resume_state.take().unwrap_or(InstallState::Running);
        self.transition(resume);
        Ok(())
    }

    /// Interrupt the child; it is killed if still alive after the grace period
    pub fn confirm_abort(&mut self) -> Result<(), FlowError> {
        if self.state != InstallState::AbortConfirming {
            return Err(FlowError::InvalidTransition {
                action: "confirm abort",
                state: self.state.clone(),
            });
        }
        self.resume_state = None;
        debug::log_section("Aborting Installation");

        if self.supervisor.is_running() {
            self.supervisor.cancel(true)?;
            self.transition(InstallState::AbortingGraceful);
        } else {
            self.finish_abort();
        }
        Ok(())
    }

    /// Start the container removal script in a terminal. Attempted at most once.
    pub fn run_cleanup(&mut self, runner: &dyn ExternalCommandRunner) -> Result<u32, CleanupError> {
        if self.cleanup != CleanupOffer::Offered {
            return Err(CleanupError::NotOffered);
        }

        let script = self.paths.remove_container_script.clone();
        if !script.is_file() {
            self.cleanup = CleanupOffer::Failed(format!("Script not found: {}", script.display()));
            return Err(CleanupError::MissingScript(script));
        }
        if let Err(e) = ensure_executable(&script) {
            debug::warn(&format!("Could not make {:?} executable: {}", script, e));
        }

        match run_in_terminal(runner, &script) {
            Ok(pid) => {
                self.cleanup = CleanupOffer::Started(pid);
                Ok(pid)
            }
            Err(e) => {
                self.cleanup = CleanupOffer::Failed(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Open the main LinOffice window after a successful install
    pub fn finish(&self, runner: &dyn ExternalCommandRunner) -> Result<u32, FlowError> {
        if self.state != InstallState::Terminated(Termination::Success) {
            return Err(FlowError::InvalidTransition {
                action: "finish",
                state: self.state.clone(),
            });
        }
        let script = self.paths.main_window_script.to_string_lossy().to_string();
        runner
            .run(MAIN_APP_INTERPRETER, &[script])
            .map_err(|source| {
                FlowError::Launch(SupervisorError::Launch {
                    program: MAIN_APP_INTERPRETER.to_string(),
                    source,
                })
            })
    }

    pub fn decline_cleanup(&mut self) {
        if self.cleanup == CleanupOffer::Offered {
            self.cleanup = CleanupOffer::Declined;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::tests::FakeRunner;
    use std::path::Path;
    use std::time::Instant;

    struct Fixture {
        _tmp: tempfile::TempDir,
        dir: PathBuf,
        gate: ActivityGate,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let dir = tmp.path().to_path_buf();
            Self {
                _tmp: tmp,
                dir,
                gate: ActivityGate::new(),
            }
        }

        fn flow(&self, body: &str, grace: Duration) -> InstallFlow {
            std::fs::write(self.dir.join("setup.sh"), format!("#!/bin/bash\n{}\n", body)).unwrap();
            let paths = Paths::for_install_dir(&self.dir).with_data_dir(&self.dir.join("data"));
            InstallFlow::new(Handle::current(), paths, self.gate.clone(), grace)
        }
    }

    async fn poll_until(flow: &mut InstallFlow, what: impl Fn(&InstallState) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            flow.poll();
            if what(flow.state()) {
                return;
            }
            assert!(Instant::now() < deadline, "stuck in {:?}", flow.state());
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    async fn wait_for_output(flow: &mut InstallFlow, needle: &str) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            flow.poll();
            if flow.session().is_some_and(|s| s.lines().iter().any(|l| l.plain == needle)) {
                return;
            }
            assert!(Instant::now() < deadline, "no {:?} in output", needle);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn clean_run_terminates_with_success() {
        let fx = Fixture::new();
        let mut flow = fx.flow(
            "echo 'Step 1: Checks'\necho 'Step 8: Done'",
            Duration::from_secs(10),
        );

        flow.start().unwrap();
        assert_eq!(flow.state(), &InstallState::Running);
        assert_eq!(fx.gate.current(), Some(Activity::Install));

        poll_until(&mut flow, |s| matches!(s, InstallState::Terminated(_))).await;
        assert_eq!(flow.state(), &InstallState::Terminated(Termination::Success));
        assert_eq!(flow.progress_percent(), 100.0);
        assert_eq!(fx.gate.current(), None);
        assert_eq!(flow.cleanup(), &CleanupOffer::NotOffered);

        let log = std::fs::read_to_string(flow.install_log()).unwrap();
        assert_eq!(log, "Step 1: Checks\nStep 8: Done\n");

        let runner = FakeRunner::with(&["python3"]);
        assert_eq!(flow.finish(&runner).unwrap(), 4242);
        let calls = runner.calls.borrow();
        assert!(Path::new(&calls[0].1[0]).ends_with("gui/mainwindow.py"));
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let fx = Fixture::new();
        let mut flow = fx.flow("echo ready\nsleep 60", Duration::from_millis(100));
        flow.start().unwrap();
        assert!(matches!(flow.start(), Err(FlowError::AlreadyActive)));

        flow.request_abort().unwrap();
        assert!(matches!(flow.start(), Err(FlowError::AlreadyActive)));
        flow.confirm_abort().unwrap();
        poll_until(&mut flow, |s| matches!(s, InstallState::Terminated(_))).await;
    }

    #[tokio::test]
    async fn running_update_blocks_install() {
        let fx = Fixture::new();
        let mut flow = fx.flow("true", Duration::from_secs(1));
        let _update = fx.gate.try_acquire(Activity::Update).unwrap();

        assert!(matches!(flow.start(), Err(FlowError::Busy(Activity::Update))));
        assert_eq!(flow.state(), &InstallState::Idle);
        assert!(flow.session().is_none());
    }

    #[tokio::test]
    async fn launch_error_surfaces_immediately() {
        let fx = Fixture::new();
        let mut flow = fx
            .flow("true", Duration::from_secs(1))
            .with_command(CommandSpec::new(fx.dir.join("missing-binary"), &fx.dir));

        assert!(matches!(flow.start(), Err(FlowError::Launch(SupervisorError::Launch { .. }))));
        assert_eq!(flow.state(), &InstallState::Idle);
        assert_eq!(fx.gate.current(), None);
    }

    #[tokio::test]
    async fn failure_offers_retry_with_fresh_session() {
        let fx = Fixture::new();
        let marker = fx.dir.join("tried");
        let body = format!(
            "if [ -f '{m}' ]; then echo 'Step 2: again'; exit 0; fi\n\
             touch '{m}'\n\
             echo 'Step 4: Pulling'\n\
             echo 'ERROR: image pull failed'\n\
             exit 2",
            m = marker.display()
        );
        let mut flow = fx.flow(&body, Duration::from_secs(10));

        flow.start().unwrap();
        poll_until(&mut flow, |s| matches!(s, InstallState::AwaitingUserDecision(_))).await;
        assert_eq!(
            flow.state(),
            &InstallState::AwaitingUserDecision(Failure {
                message: "ERROR: image pull failed".into(),
                exit_code: Some(2),
            })
        );
        assert_eq!(flow.progress_percent(), 37.5);

        let log = flow.decide(Decision::ViewLog).unwrap();
        assert_eq!(log.as_deref(), Some(flow.install_log()));
        assert!(matches!(flow.state(), InstallState::AwaitingUserDecision(_)));

        flow.decide(Decision::Retry).unwrap();
        assert_eq!(flow.state(), &InstallState::Running);
        assert_eq!(flow.attempts(), 2);
        assert_eq!(flow.progress_percent(), 0.0);

        poll_until(&mut flow, |s| matches!(s, InstallState::Terminated(_))).await;
        assert_eq!(flow.state(), &InstallState::Terminated(Termination::Success));
    }

    #[tokio::test]
    async fn failure_without_error_line_is_unknown() {
        let fx = Fixture::new();
        let mut flow = fx.flow("echo nothing useful\nexit 1", Duration::from_secs(10));
        flow.start().unwrap();
        poll_until(&mut flow, |s| matches!(s, InstallState::AwaitingUserDecision(_))).await;
        match flow.state() {
            InstallState::AwaitingUserDecision(f) => assert_eq!(f.message, "Unknown error"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn declined_abort_changes_nothing() {
        let fx = Fixture::new();
        let mut flow = fx.flow(
            "echo 'Step 4: Working'\necho ready\nsleep 60",
            Duration::from_millis(100),
        );
        flow.start().unwrap();
        wait_for_output(&mut flow, "ready").await;

        let lines_before = flow.session().unwrap().lines().len();
        let progress_before = flow.progress_percent();

        flow.request_abort().unwrap();
        assert_eq!(flow.state(), &InstallState::AbortConfirming);
        flow.decline_abort().unwrap();

        assert_eq!(flow.state(), &InstallState::Running);
        let session = flow.session().unwrap();
        assert!(session.is_running());
        assert!(!session.cancel_requested());
        assert_eq!(session.lines().len(), lines_before);
        assert_eq!(flow.progress_percent(), progress_before);
        assert_eq!(progress_before, 37.5);

        flow.request_abort().unwrap();
        flow.confirm_abort().unwrap();
        poll_until(&mut flow, |s| matches!(s, InstallState::Terminated(_))).await;
    }

    #[tokio::test]
    async fn stubborn_child_is_forced_and_cleanup_offered_once() {
        let fx = Fixture::new();
        let mut flow = fx.flow("trap '' INT\necho ready\nsleep 60", Duration::from_millis(300));
        flow.start().unwrap();
        wait_for_output(&mut flow, "ready").await;

        flow.request_abort().unwrap();
        flow.confirm_abort().unwrap();
        assert_eq!(flow.state(), &InstallState::AbortingGraceful);
        assert!(flow.session().unwrap().cancel_requested());

        poll_until(&mut flow, |s| *s != InstallState::AbortingGraceful).await;
        assert!(matches!(
            flow.state(),
            InstallState::AbortingForced | InstallState::Terminated(Termination::Aborted)
        ));
        poll_until(&mut flow, |s| matches!(s, InstallState::Terminated(_))).await;
        assert_eq!(flow.state(), &InstallState::Terminated(Termination::Aborted));
        assert!(flow.progress_percent() < 100.0);
        assert_eq!(fx.gate.current(), None);

        assert_eq!(flow.cleanup(), &CleanupOffer::Offered);
        let script = flow.paths.remove_container_script.clone();
        std::fs::create_dir_all(script.parent().unwrap()).unwrap();
        std::fs::write(&script, "podman rm -f LinOffice\n").unwrap();

        let runner = FakeRunner::with(&[]);
        assert!(matches!(flow.run_cleanup(&runner), Err(CleanupError::Terminal(_))));
        assert!(matches!(flow.cleanup(), CleanupOffer::Failed(_)));
        assert!(matches!(flow.run_cleanup(&runner), Err(CleanupError::NotOffered)));
        assert_eq!(runner.calls.borrow().len(), crate::config::TERMINAL_CANDIDATES.len());
    }

    #[tokio::test]
    async fn exit_after_failure_goes_through_confirmation() {
        let fx = Fixture::new();
        let mut flow = fx.flow("echo 'ERROR: no podman'\nexit 1", Duration::from_secs(10));
        flow.start().unwrap();
        poll_until(&mut flow, |s| matches!(s, InstallState::AwaitingUserDecision(_))).await;
        let failed = flow.state().clone();
        assert!(flow.finish(&FakeRunner::with(&["python3"])).is_err());

        flow.decide(Decision::Exit).unwrap();
        assert_eq!(flow.state(), &InstallState::AbortConfirming);
        flow.decline_abort().unwrap();
        assert_eq!(flow.state(), &failed);

        flow.decide(Decision::Exit).unwrap();
        flow.confirm_abort().unwrap();
        assert_eq!(flow.state(), &InstallState::Terminated(Termination::Aborted));

        let runner = FakeRunner::with(&["konsole"]);
        assert!(matches!(flow.run_cleanup(&runner), Err(CleanupError::MissingScript(_))));
        assert!(runner.calls.borrow().is_empty());
    }

    #[tokio::test]
    async fn cleanup_runs_in_first_terminal() {
        let fx = Fixture::new();
        let mut flow = fx.flow("exit 1", Duration::from_secs(10));
        flow.start().unwrap();
        poll_until(&mut flow, |s| matches!(s, InstallState::AwaitingUserDecision(_))).await;
        flow.decide(Decision::Exit).unwrap();
        flow.confirm_abort().unwrap();

        let script = flow.paths.remove_container_script.clone();
        std::fs::create_dir_all(script.parent().unwrap()).unwrap();
        std::fs::write(&script, "true\n").unwrap();

        let runner = FakeRunner::with(&["gnome-terminal"]);
        assert_eq!(flow.run_cleanup(&runner).unwrap(), 4242);
        assert_eq!(flow.cleanup(), &CleanupOffer::Started(4242));
        let calls = runner.calls.borrow();
        assert_eq!(calls.last().unwrap().1.last().map(String::as_str), script.to_str());
        assert!(Path::new(&calls.last().unwrap().1[2]).ends_with("remove_container.sh"));
    }
}
