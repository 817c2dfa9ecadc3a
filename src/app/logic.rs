// Copyright (C) 2026 LinOffice contributors
// Licensed under AGPL-3.0-or-later

use super::{SetupApp, UpdateCheck};
use crate::config::CURRENT_VERSION;
use crate::debug;
use crate::github::{http_client, ReleaseFeed, Version};
use crate::install_flow::{Decision, InstallState};
use crate::terminal::DetachedRunner;
use crate::update_prompt::UpdateRun;
use eframe::egui;
use tokio::sync::mpsc;

/// Messages kept for the side panel
const MAX_MESSAGES: usize = 100;

impl SetupApp {
    pub(super) fn log(&mut self, msg: &str) {
        debug::log(msg);
        self.log_messages.push(msg.to_string());
        if self.log_messages.len() > MAX_MESSAGES {
            self.log_messages.remove(0);
        }
    }

    /// Apply child output and exits gathered since the last frame
    pub(super) fn poll_background(&mut self) {
        let before = self.flow.state().clone();
        self.flow.poll();
        if *self.flow.state() != before {
            match self.flow.state().clone() {
                InstallState::Terminated(t) => {
                    self.log(&format!("Installation finished: {:?}", t));
                }
                InstallState::AwaitingUserDecision(f) => {
                    self.log(&format!("Installation failed: {}", f.message));
                }
                InstallState::AbortingForced => {
                    self.log("Setup did not stop in time, terminating it");
                }
                _ => {}
            }
        }

        self.update.poll();

        if let Some(rx) = &mut self.update_check_rx {
            if let Ok(result) = rx.try_recv() {
                self.update_check_rx = None;
                self.update_check = Some(match result {
                    Some(info) => {
                        self.log(&format!("Version {} is available", info.version));
                        UpdateCheck::Available(info)
                    }
                    None => UpdateCheck::UpToDate,
                });
            }
        }
    }

    pub(super) fn start_installation(&mut self) {
        self.launch_question = None;
        match self.flow.start() {
            Ok(()) => {
                let command = self
                    .flow
                    .session()
                    .map(|s| s.command().to_string())
                    .unwrap_or_default();
                self.log(&format!("Installation started: {}", command));
            }
            Err(e) => {
                self.log(&format!("Could not start installation: {}", e));
                self.notice = Some(e.to_string());
            }
        }
    }

    pub(super) fn answer_failure(&mut self, decision: Decision) {
        match self.flow.decide(decision) {
            Ok(Some(log_path)) => {
                self.install_log_view = Some(match std::fs::read_to_string(&log_path) {
                    Ok(contents) => contents,
                    Err(e) => format!("Failed to read {}: {}", log_path.display(), e),
                });
            }
            Ok(None) => {
                if decision == Decision::Retry {
                    self.log(&format!("Retrying installation (attempt {})", self.flow.attempts()));
                }
            }
            Err(e) => {
                self.log(&format!("Retry failed: {}", e));
            }
        }
    }

    pub(super) fn abort_installation(&mut self) {
        if let Err(e) = self.flow.request_abort() {
            debug::warn(&e.to_string());
        }
    }

    pub(super) fn confirm_abort(&mut self, confirmed: bool) {
        let result = if confirmed {
            self.log("Aborting installation...");
            self.flow.confirm_abort()
        } else {
            self.flow.decline_abort()
        };
        if let Err(e) = result {
            debug::warn(&e.to_string());
        }
    }

    pub(super) fn remove_container(&mut self, confirmed: bool) {
        if !confirmed {
            self.flow.decline_cleanup();
            return;
        }
        match self.flow.run_cleanup(&self.runner) {
            Ok(pid) => self.log(&format!("Container removal started (PID {})", pid)),
            Err(e) => {
                self.log(&format!("Container removal failed: {}", e));
                self.notice = Some(format!(
                    "{}\n\nPlease run {} manually.",
                    e,
                    self.paths.remove_container_script.display()
                ));
            }
        }
    }

    /// Open the main window and close the installer
    pub(super) fn finish(&mut self, ctx: &egui::Context) {
        let gui_dir = self
            .paths
            .main_window_script
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| self.paths.install_dir.clone());
        match self.flow.finish(&DetachedRunner::in_dir(gui_dir)) {
            Ok(_) => ctx.send_viewport_cmd(egui::ViewportCommand::Close),
            Err(e) => {
                self.log(&format!("Could not open LinOffice: {}", e));
                self.notice = Some(e.to_string());
            }
        }
    }

    pub(super) fn check_for_updates(&mut self, ctx: egui::Context) {
        if self.update_check_rx.is_some() {
            return;
        }
        self.log("Checking for updates...");
        self.update_check = Some(UpdateCheck::Checking);

        let (tx, rx) = mpsc::unbounded_channel();
        self.update_check_rx = Some(rx);

        self.runtime.spawn(async move {
            let result = match (http_client(), CURRENT_VERSION.parse::<Version>()) {
                (Ok(client), Ok(current)) => {
                    ReleaseFeed::new(client).check_for_update(&current).await
                }
                (Err(e), _) | (_, Err(e)) => {
                    debug::warn(&format!("Update check unavailable: {}", e));
                    None
                }
            };
            let _ = tx.send(result);
            ctx.request_repaint();
        });
    }

    /// Run `<self> update` as a child; its question is answered from the update window
    pub(super) fn start_update(&mut self) {
        let exe = match std::env::current_exe() {
            Ok(exe) => exe,
            Err(e) => {
                self.notice = Some(format!("Cannot locate the updater: {}", e));
                return;
            }
        };
        let spec = UpdateRun::command_for(&exe, &self.paths.install_dir);
        match self.update.start(&spec) {
            Ok(()) => {
                self.update_check = None;
                self.show_update_window = true;
                self.log("Updater started");
            }
            Err(e) => {
                self.log(&format!("Could not start update: {}", e));
                self.notice = Some(e.to_string());
            }
        }
    }

    pub(super) fn answer_update(&mut self, yes: bool) {
        if let Err(e) = self.update.answer(yes) {
            self.log(&format!("Could not answer updater: {}", e));
        }
    }

    pub(super) fn close_update_window(&mut self) {
        self.update.cancel();
        self.show_update_window = false;
    }

    pub(super) fn copy_debug_log(&mut self) {
        match debug::read_contents() {
            Ok(contents) => {
                let copied = arboard::Clipboard::new()
                    .and_then(|mut clipboard| clipboard.set_text(contents));
                match copied {
                    Ok(_) => self.log("Log copied to clipboard"),
                    Err(e) => self.log(&format!("Failed to copy to clipboard: {}", e)),
                }
            }
            Err(e) => self.log(&format!("Failed to read log file: {}", e)),
        }
    }

    /// Closing the window while setup runs asks to abort first
    pub(super) fn handle_close_request(&mut self, ctx: &egui::Context) {
        if !ctx.input(|i| i.viewport().close_requested()) {
            return;
        }
        if self.flow.state().is_active() {
            ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
            if *self.flow.state() == InstallState::Running {
                self.abort_installation();
            }
        } else if self.update.is_active() {
            self.close_update_window();
        }
    }
}
