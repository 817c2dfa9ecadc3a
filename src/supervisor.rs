//! Child process supervision for the setup script (and the updater child).
//!
//! A [`Session`] owns one running child. Its stdout and stderr share one
//! pipe, which a background task reads, splits into lines and queues; the
//! owner calls
//! [`Session::drain`] whenever it gets the chance (the GUI does so every
//! frame). The log buffer, progress and last error are updated there and
//! nowhere else.

use crate::debug;
use crate::error::SupervisorError;
use crate::log_render::LogLine;
use crate::progress::ProgressState;
use std::fs::{File, OpenOptions};
use std::io::Write;
#[cfg(unix)]
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
#[cfg(unix)]
use tokio::net::unix::pipe;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How long to wait for the output readers after the child is gone.
/// Grandchildren that inherited the pipes can keep them open forever.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Called from reader tasks whenever new output is queued
pub type Notifier = Arc<dyn Fn() + Send + Sync>;

/// What to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// `bash <script>`, run from the script's directory
    pub fn script(script: &Path) -> Self {
        let dir = script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(crate::config::SCRIPT_SHELL, dir).arg(script.to_string_lossy())
    }

    fn display(&self) -> String {
        let mut s = self.program.to_string_lossy().to_string();
        for a in &self.args {
            s.push(' ');
            s.push_str(a);
        }
        s
    }
}

/// How the child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exited on its own with this code
    Exited(i32),
    /// Terminated by a signal it did not handle
    Signaled(i32),
    /// Killed by the supervisor
    ForceKilled,
    /// The watcher task went away without reporting
    Lost,
}

impl ExitOutcome {
    /// Exit code in shell convention (128 + signal for signals)
    pub fn code(self) -> Option<i32> {
        match self {
            ExitOutcome::Exited(code) => Some(code),
            ExitOutcome::Signaled(sig) => Some(128 + sig),
            ExitOutcome::ForceKilled | ExitOutcome::Lost => None,
        }
    }

    fn from_status(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitOutcome::Exited(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return ExitOutcome::Signaled(sig);
            }
        }
        ExitOutcome::Lost
    }
}

/// Terminal result of a session as the rest of the app sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Pending,
    Success(i32),
    Failure(i32),
    Aborted,
}

#[derive(Debug)]
enum SessionEvent {
    /// Bytes exactly as read, for the install log
    Output(Vec<u8>),
    Line(LogLine),
    Exited(ExitOutcome),
}

/// Splits a byte stream on `\n`, `\r\n` and lone `\r`
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
    after_cr: bool,
}

impl LineSplitter {
    pub fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        for &b in data {
            if self.after_cr {
                self.after_cr = false;
                if b == b'\n' {
                    continue;
                }
            }
            match b {
                b'\n' => lines.push(std::mem::take(&mut self.buf)),
                b'\r' => {
                    lines.push(std::mem::take(&mut self.buf));
                    self.after_cr = true;
                }
                _ => self.buf.push(b),
            }
        }
        lines
    }

    /// Whatever is left after the stream closed without a terminator
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        self.after_cr = false;
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

/// One run of a child process plus everything derived from its output
pub struct Session {
    command: String,
    pid: Option<u32>,
    handle: Handle,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    input: mpsc::UnboundedSender<Vec<u8>>,
    force_kill: CancellationToken,
    exited: CancellationToken,
    lines: Vec<LogLine>,
    progress: ProgressState,
    last_error: Option<LogLine>,
    exit: Option<ExitOutcome>,
    cancel_requested: bool,
    log_file: Option<File>,
}

impl Session {
    /// Spawn `spec` in its own process group and start reading its output
    pub fn spawn(
        handle: &Handle,
        spec: &CommandSpec,
        log_path: Option<&Path>,
        notifier: Option<Notifier>,
    ) -> Result<Session, SupervisorError> {
        let _guard = handle.enter();

        let launch_error = |source: std::io::Error| SupervisorError::Launch {
            program: spec.display(),
            source,
        };

        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        let output = {
            cmd.process_group(0);
            merged_output(&mut cmd).map_err(launch_error)?
        };
        #[cfg(not(unix))]
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let spawned = cmd.spawn();
        // Closes our copies of the output pipe's write end
        drop(cmd);
        let mut child = spawned.map_err(launch_error)?;
        let pid = child.id();

        debug::log_section("Starting Session");
        debug::log(&format!("Command: {}", spec.display()));
        debug::log(&format!("Working dir: {:?}", spec.working_dir));
        debug::log(&format!("PID: {:?}", pid));

        let (event_tx, events) = mpsc::unbounded_channel();
        let (input, mut input_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let force_kill = CancellationToken::new();
        let exited = CancellationToken::new();

        let mut readers = Vec::new();
        #[cfg(unix)]
        readers.push(handle.spawn(read_lines(output, event_tx.clone(), notifier.clone())));
        #[cfg(not(unix))]
        {
            if let Some(stdout) = child.stdout.take() {
                readers.push(handle.spawn(read_lines(stdout, event_tx.clone(), notifier.clone())));
            }
            if let Some(stderr) = child.stderr.take() {
                readers.push(handle.spawn(read_lines(stderr, event_tx.clone(), notifier.clone())));
            }
        }

        if let Some(mut stdin) = child.stdin.take() {
            handle.spawn(async move {
                while let Some(bytes) = input_rx.recv().await {
                    if stdin.write_all(&bytes).await.is_err() || stdin.flush().await.is_err() {
                        debug::warn("Child closed its input");
                        break;
                    }
                }
            });
        }

        let force = force_kill.clone();
        let done = exited.clone();
        handle.spawn(async move {
            let outcome = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => ExitOutcome::from_status(status),
                    Err(e) => {
                        debug::error(&format!("Failed to wait for child: {}", e));
                        ExitOutcome::Lost
                    }
                },
                _ = force.cancelled() => {
                    if let Some(pid) = pid {
                        signal_group(pid, GroupSignal::Kill);
                    }
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    ExitOutcome::ForceKilled
                }
            };

            let _ = tokio::time::timeout(READER_DRAIN_TIMEOUT, async {
                for reader in readers {
                    let _ = reader.await;
                }
            })
            .await;

            debug::log(&format!("Child exited: {:?}", outcome));
            done.cancel();
            let _ = event_tx.send(SessionEvent::Exited(outcome));
            if let Some(notify) = notifier {
                notify();
            }
        });

        let log_file = log_path.and_then(open_append);

        Ok(Session {
            command: spec.display(),
            pid,
            handle: handle.clone(),
            events,
            input,
            force_kill,
            exited,
            lines: Vec::new(),
            progress: ProgressState::new(),
            last_error: None,
            exit: None,
            cancel_requested: false,
            log_file,
        })
    }

    /// Apply everything currently queued; never waits. Returns the number of new lines.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    if matches!(event, SessionEvent::Line(_)) {
                        count += 1;
                    }
                    self.apply(event);
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if self.exit.is_none() {
                        self.apply(SessionEvent::Exited(ExitOutcome::Lost));
                    }
                    break;
                }
            }
        }
        count
    }

    /// Wait until the child is gone and all its output has been applied
    pub async fn wait(&mut self) -> ExitOutcome {
        loop {
            if let Some(exit) = self.exit {
                return exit;
            }
            match self.events.recv().await {
                Some(event) => self.apply(event),
                None => self.apply(SessionEvent::Exited(ExitOutcome::Lost)),
            }
        }
    }

    fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Output(bytes) => {
                if let Some(file) = self.log_file.as_mut() {
                    let _ = file.write_all(&bytes);
                }
            }
            SessionEvent::Line(line) => {
                if line.reports_error() {
                    self.last_error = Some(line.clone());
                }
                if let Some(marker) = line.marker {
                    self.progress.observe(marker);
                }
                self.lines.push(line);
            }
            SessionEvent::Exited(exit) => {
                if let Some(code) = exit.code() {
                    self.progress.finish(code);
                }
                self.exit = Some(exit);
            }
        }
    }

    /// Interrupt the child's process group. With `graceful` the group gets
    /// SIGINT and is killed once `grace` has passed; otherwise it is killed now.
    pub fn cancel(&mut self, graceful: bool, grace: Duration) {
        if !self.is_running() {
            return;
        }
        self.cancel_requested = true;

        if !graceful {
            debug::log("Force-killing session");
            self.force_kill.cancel();
            return;
        }

        match self.pid {
            Some(pid) => {
                debug::log(&format!("Sending SIGINT to process group {}", pid));
                signal_group(pid, GroupSignal::Interrupt);
            }
            None => debug::warn("Child has no PID, skipping interrupt"),
        }

        let force = self.force_kill.clone();
        let exited = self.exited.clone();
        self.handle.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(grace) => {
                    debug::warn("Child still alive after grace period, killing it");
                    force.cancel();
                }
                _ = exited.cancelled() => {}
            }
        });
    }

    /// Kill the whole process group right away, without waiting for the reaper
    pub fn terminate_now(&mut self) {
        if !self.is_running() {
            return;
        }
        self.cancel_requested = true;
        if let Some(pid) = self.pid {
            signal_group(pid, GroupSignal::Kill);
        }
        self.force_kill.cancel();
    }

    /// Forward text to the child's stdin
    pub fn send_input(&self, text: &str) -> Result<(), SupervisorError> {
        self.input
            .send(text.as_bytes().to_vec())
            .map_err(|_| SupervisorError::Input("child input is closed".to_string()))
    }

    /// True until the exit has been observed by `drain`/`wait`
    pub fn is_running(&self) -> bool {
        self.exit.is_none()
    }

    /// The grace period ran out and the supervisor is killing the child
    pub fn is_forcing(&self) -> bool {
        self.force_kill.is_cancelled()
    }

    #[cfg(test)]
    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub fn exit(&self) -> Option<ExitOutcome> {
        self.exit
    }

    pub fn outcome(&self) -> SessionOutcome {
        match self.exit {
            None => SessionOutcome::Pending,
            Some(_) if self.cancel_requested => SessionOutcome::Aborted,
            Some(ExitOutcome::Exited(0)) => SessionOutcome::Success(0),
            Some(exit) => SessionOutcome::Failure(exit.code().unwrap_or(-1)),
        }
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    pub fn progress(&self) -> ProgressState {
        self.progress
    }

    pub fn last_error(&self) -> Option<&LogLine> {
        self.last_error.as_ref()
    }

    #[cfg(test)]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

/// Owner of the single current session
pub struct Supervisor {
    handle: Handle,
    grace: Duration,
    log_path: Option<PathBuf>,
    notifier: Option<Notifier>,
    current: Option<Session>,
}

impl Supervisor {
    pub fn new(handle: Handle, grace: Duration) -> Self {
        Self {
            handle,
            grace,
            log_path: None,
            notifier: None,
            current: None,
        }
    }

    /// Append every raw output line to this file
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Called whenever a session has new output (e.g. to request a repaint)
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Start a new session, killing whatever the previous one left running
    pub fn start(&mut self, spec: &CommandSpec) -> Result<&mut Session, SupervisorError> {
        if let Some(previous) = self.current.as_mut() {
            previous.terminate_now();
        }
        self.current = None;

        let session = Session::spawn(
            &self.handle,
            spec,
            self.log_path.as_deref(),
            self.notifier.clone(),
        )?;
        Ok(self.current.insert(session))
    }

    pub fn cancel(&mut self, graceful: bool) -> Result<(), SupervisorError> {
        let grace = self.grace;
        let session = self.current.as_mut().ok_or(SupervisorError::NoSession)?;
        session.cancel(graceful, grace);
        Ok(())
    }

    pub fn drain(&mut self) -> usize {
        self.current.as_mut().map(Session::drain).unwrap_or(0)
    }

    pub fn session(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    #[cfg(test)]
    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.current.as_mut()
    }

    pub fn is_running(&self) -> bool {
        self.current.as_ref().is_some_and(Session::is_running)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(session) = self.current.as_mut() {
            session.terminate_now();
        }
    }
}

async fn read_lines<R: AsyncRead + Unpin>(
    mut reader: R,
    tx: mpsc::UnboundedSender<SessionEvent>,
    notifier: Option<Notifier>,
) {
    let mut splitter = LineSplitter::default();
    let mut buf = [0u8; 4096];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug::warn(&format!("Output read error: {}", e));
                break;
            }
        };
        let _ = tx.send(SessionEvent::Output(buf[..n].to_vec()));
        for raw in splitter.feed(&buf[..n]) {
            let _ = tx.send(SessionEvent::Line(LogLine::new(&raw)));
        }
        if let Some(notify) = &notifier {
            notify();
        }
    }
    if let Some(raw) = splitter.finish() {
        let _ = tx.send(SessionEvent::Line(LogLine::new(&raw)));
    }
}

fn open_append(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            debug::warn(&format!("Cannot create log directory {:?}: {}", parent, e));
            return None;
        }
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(e) => {
            debug::warn(&format!("Cannot open install log {:?}: {}", path, e));
            None
        }
    }
}

/// Point stdout and stderr at one pipe and return its read end
#[cfg(unix)]
fn merged_output(cmd: &mut tokio::process::Command) -> std::io::Result<pipe::Receiver> {
    let (reader, writer) = std::io::pipe()?;
    cmd.stdout(Stdio::from(writer.try_clone()?)).stderr(Stdio::from(writer));
    pipe::Receiver::from_owned_fd(OwnedFd::from(reader))
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Interrupt,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: GroupSignal) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let signal = match signal {
        GroupSignal::Interrupt => Signal::SIGINT,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    // The child leads its own process group, so its pid names the group
    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        debug::warn(&format!("killpg({}, {:?}) failed: {}", pid, signal, e));
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: GroupSignal) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_render::Severity;
    use std::time::Instant;

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("script.sh");
        std::fs::write(&path, format!("#!/bin/bash\n{}\n", body)).unwrap();
        path
    }

    async fn wait_for_line(session: &mut Session, needle: &str) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            session.drain();
            if session.lines().iter().any(|l| l.plain.contains(needle)) {
                return;
            }
            assert!(Instant::now() < deadline, "timed out waiting for {:?}", needle);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[test]
    fn splitter_handles_every_terminator() {
        let mut s = LineSplitter::default();
        let lines = s.feed(b"one\ntwo\r\nthree\rfour");
        assert_eq!(lines, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
        assert_eq!(s.finish(), Some(b"four".to_vec()));
        assert_eq!(s.finish(), None);
    }

    #[test]
    fn splitter_joins_crlf_across_chunks() {
        let mut s = LineSplitter::default();
        assert_eq!(
            s.feed(b"Downloading Windows 11: 5%\r"),
            vec![b"Downloading Windows 11: 5%".to_vec()]
        );
        assert!(s.feed(b"\n").is_empty());
        assert_eq!(s.feed(b"\n"), vec![Vec::<u8>::new()]);
    }

    #[tokio::test]
    async fn clean_exit_completes_progress() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(
            tmp.path(),
            "echo 'Step 1: Checking'\necho 'Step 3: Pulling'\necho -e '\\e[32mSUCCESS:\\e[0m done'",
        );
        let log = tmp.path().join("logs").join("install.log");

        let spec = CommandSpec::script(&script);
        let mut session = Session::spawn(&Handle::current(), &spec, Some(&log), None).unwrap();
        assert_eq!(session.wait().await, ExitOutcome::Exited(0));

        assert_eq!(session.outcome(), SessionOutcome::Success(0));
        assert_eq!(session.progress().percent(), 100.0);
        assert_eq!(session.lines().len(), 3);
        assert_eq!(session.lines()[2].severity, Severity::Success);
        assert!(session.last_error().is_none());

        let logged = std::fs::read(&log).unwrap();
        assert!(logged.starts_with(b"Step 1: Checking\nStep 3: Pulling\n\x1b[32mSUCCESS:"));
    }

    #[tokio::test]
    async fn failure_keeps_last_error_and_partial_progress() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(
            tmp.path(),
            "echo 'Step 3: Pulling'\n\
             echo 'ERROR: first'\n\
             echo 'ERROR: podman not found'\n\
             echo 'warning on stderr' >&2\n\
             echo 'cleanup'\n\
             exit 3",
        );

        let spec = CommandSpec::script(&script);
        let mut session = Session::spawn(&Handle::current(), &spec, None, None).unwrap();
        assert_eq!(session.wait().await, ExitOutcome::Exited(3));

        assert_eq!(session.outcome(), SessionOutcome::Failure(3));
        assert_eq!(session.progress().percent(), 25.0);
        assert_eq!(session.last_error().map(|l| l.plain.as_str()), Some("ERROR: podman not found"));
        assert_eq!(session.lines().len(), 5);
        assert!(session.lines().iter().any(|l| l.plain == "warning on stderr"));
    }

    #[tokio::test]
    async fn stdout_and_stderr_arrive_in_write_order() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(
            tmp.path(),
            "for i in $(seq 1 50); do\n  echo \"out $i\"\n  echo \"ERROR: err $i\" >&2\ndone",
        );
        let log = tmp.path().join("install.log");

        let spec = CommandSpec::script(&script);
        let mut session = Session::spawn(&Handle::current(), &spec, Some(&log), None).unwrap();
        assert_eq!(session.wait().await, ExitOutcome::Exited(0));

        let expected: Vec<String> = (1..=50)
            .flat_map(|i| [format!("out {i}"), format!("ERROR: err {i}")])
            .collect();
        let seen: Vec<&str> = session.lines().iter().map(|l| l.plain.as_str()).collect();
        assert_eq!(seen, expected);
        assert_eq!(
            session.last_error().map(|l| l.plain.as_str()),
            Some("ERROR: err 50")
        );

        let logged = std::fs::read_to_string(&log).unwrap();
        assert_eq!(logged, expected.join("\n") + "\n");
    }

    #[tokio::test]
    async fn install_log_keeps_original_terminators() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(
            tmp.path(),
            "printf 'Downloading Windows 11: 5%%\\rDownloading Windows 11: 9%%\\r\\nok\\n'",
        );
        let log = tmp.path().join("install.log");

        let spec = CommandSpec::script(&script);
        let mut session = Session::spawn(&Handle::current(), &spec, Some(&log), None).unwrap();
        assert_eq!(session.wait().await, ExitOutcome::Exited(0));

        assert_eq!(session.lines().len(), 3);
        assert_eq!(
            std::fs::read(&log).unwrap(),
            b"Downloading Windows 11: 5%\rDownloading Windows 11: 9%\r\nok\n".to_vec()
        );
    }

    #[tokio::test]
    async fn indented_error_lines_are_not_the_failure_reason() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(
            tmp.path(),
            "echo 'ERROR: podman not found'\necho '   ERROR: see above'\nexit 1",
        );

        let spec = CommandSpec::script(&script);
        let mut session = Session::spawn(&Handle::current(), &spec, None, None).unwrap();
        assert_eq!(session.wait().await, ExitOutcome::Exited(1));

        assert_eq!(session.lines()[1].severity, Severity::Error);
        assert_eq!(
            session.last_error().map(|l| l.plain.as_str()),
            Some("ERROR: podman not found")
        );
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new(tmp.path().join("does-not-exist"), tmp.path());
        match Session::spawn(&Handle::current(), &spec, None, None) {
            Err(SupervisorError::Launch { .. }) => {}
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("spawn should fail"),
        }
    }

    #[tokio::test]
    async fn cooperative_child_exits_on_interrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(
            tmp.path(),
            "trap 'echo interrupted; exit 130' INT\necho ready\nwhile true; do sleep 0.1; done",
        );

        let spec = CommandSpec::script(&script);
        let mut session = Session::spawn(&Handle::current(), &spec, None, None).unwrap();
        wait_for_line(&mut session, "ready").await;

        session.cancel(true, Duration::from_secs(30));
        let exit = tokio::time::timeout(Duration::from_secs(10), session.wait()).await.unwrap();

        assert_eq!(exit, ExitOutcome::Exited(130));
        assert!(!session.is_forcing());
        assert_eq!(session.outcome(), SessionOutcome::Aborted);
        assert!(session.lines().iter().any(|l| l.plain == "interrupted"));
    }

    #[tokio::test]
    async fn stubborn_child_is_killed_after_grace_period() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "trap '' INT\necho ready\nsleep 60");

        let spec = CommandSpec::script(&script);
        let mut session = Session::spawn(&Handle::current(), &spec, None, None).unwrap();
        wait_for_line(&mut session, "ready").await;

        let started = Instant::now();
        session.cancel(true, Duration::from_millis(300));
        let exit = tokio::time::timeout(Duration::from_secs(10), session.wait()).await.unwrap();

        assert_eq!(exit, ExitOutcome::ForceKilled);
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(session.is_forcing());
        assert_eq!(session.outcome(), SessionOutcome::Aborted);
        assert!(session.progress().percent() < 100.0);
    }

    #[tokio::test]
    async fn input_is_forwarded_to_child() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(
            tmp.path(),
            "echo 'Continue? (y/n)'\nread answer\necho \"answer=$answer\"",
        );

        let spec = CommandSpec::script(&script);
        let mut session = Session::spawn(&Handle::current(), &spec, None, None).unwrap();
        wait_for_line(&mut session, "(y/n)").await;
        session.send_input("y\n").unwrap();

        assert_eq!(session.wait().await, ExitOutcome::Exited(0));
        assert!(session.lines().iter().any(|l| l.plain == "answer=y"));
    }

    #[tokio::test]
    async fn starting_again_kills_the_previous_child() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "trap '' INT\necho ready\nsleep 60");
        let quick = tmp.path().join("quick.sh");
        std::fs::write(&quick, "echo second\n").unwrap();

        let mut supervisor = Supervisor::new(Handle::current(), Duration::from_secs(30));
        let first_pid = supervisor.start(&CommandSpec::script(&script)).unwrap().pid().unwrap();
        wait_for_line(supervisor.session_mut().unwrap(), "ready").await;

        let second = supervisor.start(&CommandSpec::script(&quick)).unwrap();
        assert_eq!(second.wait().await, ExitOutcome::Exited(0));

        // The old group is gone once SIGKILL has been delivered and reaped
        let deadline = Instant::now() + Duration::from_secs(5);
        let first = nix::unistd::Pid::from_raw(first_pid as i32);
        while nix::sys::signal::kill(first, None).is_ok() {
            assert!(Instant::now() < deadline, "previous child survived");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
