// Copyright (C) 2026 LinOffice contributors
// Licensed under AGPL-3.0-or-later

use crate::config::{setup_theme, Paths, ABORT_GRACE_PERIOD};
use crate::gate::ActivityGate;
use crate::github::ReleaseInfo;
use crate::install_flow::InstallFlow;
use crate::launcher::LaunchQuestion;
use crate::supervisor::Notifier;
use crate::terminal::DetachedRunner;
use crate::update_prompt::UpdateRun;
use egui_thematic::ThemeEditorState;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

/// Result of the "Check for updates" button
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    Checking,
    Available(ReleaseInfo),
    UpToDate,
}

pub struct SetupApp {
    pub(super) paths: Paths,

    // Install and update flows; both share one activity gate
    pub(super) flow: InstallFlow,
    pub(super) update: UpdateRun,

    // Release check
    pub(super) update_check: Option<UpdateCheck>,
    pub(super) update_check_rx: Option<mpsc::UnboundedReceiver<Option<ReleaseInfo>>>,
    pub(super) show_update_window: bool,

    // Dialog state that is not part of the install flow
    pub(super) launch_question: Option<LaunchQuestion>,
    pub(super) install_log_view: Option<String>,
    pub(super) notice: Option<String>,

    pub(super) log_messages: Vec<String>,
    pub(super) runner: DetachedRunner,

    // Theme editor
    pub(super) theme_state: ThemeEditorState,
    pub(super) show_theme_editor: bool,
    pub(super) show_log: bool,
    pub(super) last_system_dark_mode: bool,

    // Dropped last: the flows' tasks live on it
    pub(super) runtime: Runtime,
}

impl SetupApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        paths: Paths,
        launch_question: Option<LaunchQuestion>,
    ) -> std::io::Result<Self> {
        setup_theme(&cc.egui_ctx);

        let runtime = Runtime::new()?;
        let gate = ActivityGate::new();

        let ctx = cc.egui_ctx.clone();
        let notifier: Notifier = Arc::new(move || ctx.request_repaint());

        let flow = InstallFlow::new(
            runtime.handle().clone(),
            paths.clone(),
            gate.clone(),
            ABORT_GRACE_PERIOD,
        )
        .with_notifier(notifier.clone());
        let update = UpdateRun::new(runtime.handle().clone(), gate).with_notifier(notifier);

        let is_dark = cc.egui_ctx.style().visuals.dark_mode;

        let mut app = Self {
            paths,
            flow,
            update,
            update_check: None,
            update_check_rx: None,
            show_update_window: false,
            launch_question,
            install_log_view: None,
            notice: None,
            log_messages: Vec::new(),
            runner: DetachedRunner::new(),
            theme_state: ThemeEditorState::default(),
            show_theme_editor: false,
            show_log: false,
            last_system_dark_mode: is_dark,
            runtime,
        };

        app.theme_state.current_config = app.get_theme_config();
        app.log(&format!("Install directory: {}", app.paths.install_dir.display()));

        Ok(app)
    }
}
