// ============================================================================
// UI RENDERING
// ============================================================================
// Welcome page (Install / Check for updates), progress page (bar, colored
// script output, Abort) and the modal dialogs driven by the install flow.
// All state changes go through logic.rs; this file only draws and dispatches.
// ============================================================================

use super::{SetupApp, UpdateCheck};
use crate::config::{APP_NAME, CURRENT_VERSION};
use crate::install_flow::{CleanupOffer, Decision, Failure, InstallState, Termination};
use crate::launcher::LaunchQuestion;
use crate::log_render::{LogColor, LogLine};
use crate::update_prompt::UpdatePhase;
use eframe::egui;
use egui_thematic::render_theme_panel;
use std::time::Duration;

const GREEN: egui::Color32 = egui::Color32::from_rgb(104, 157, 106);
const RED: egui::Color32 = egui::Color32::from_rgb(251, 73, 52);
const AMBER: egui::Color32 = egui::Color32::from_rgb(250, 189, 47);

/// While a child runs, poll at least this often (grace period expiry has no output)
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Which modal is on screen, if any
#[derive(Debug, Clone, PartialEq)]
enum Dialog {
    Notice(String),
    InstallLog,
    Launch(LaunchQuestion),
    Failure(Failure),
    ConfirmAbort,
    Aborting,
    RemoveContainer,
    Aborted,
    Complete,
}

impl SetupApp {
    fn active_dialog(&self) -> Option<Dialog> {
        if let Some(notice) = &self.notice {
            return Some(Dialog::Notice(notice.clone()));
        }
        if self.install_log_view.is_some() {
            return Some(Dialog::InstallLog);
        }
        match self.flow.state() {
            InstallState::Idle => self.launch_question.map(Dialog::Launch),
            InstallState::AwaitingUserDecision(failure) => Some(Dialog::Failure(failure.clone())),
            InstallState::AbortConfirming => Some(Dialog::ConfirmAbort),
            InstallState::AbortingGraceful | InstallState::AbortingForced => Some(Dialog::Aborting),
            InstallState::Terminated(Termination::Aborted) => {
                if *self.flow.cleanup() == CleanupOffer::Offered {
                    Some(Dialog::RemoveContainer)
                } else {
                    Some(Dialog::Aborted)
                }
            }
            InstallState::Terminated(Termination::Success) => Some(Dialog::Complete),
            InstallState::Running | InstallState::Retrying => None,
        }
    }
}

fn log_color(color: LogColor, visuals: &egui::Visuals) -> egui::Color32 {
    match color {
        LogColor::Default => visuals.text_color(),
        LogColor::Red => RED,
        LogColor::Green => GREEN,
        LogColor::Amber => AMBER,
    }
}

/// Script output with its ANSI colors; keyword lines are drawn brighter
fn render_log_lines(ui: &mut egui::Ui, lines: &[LogLine]) {
    let visuals = ui.visuals().clone();
    let font = egui::TextStyle::Monospace.resolve(ui.style());

    egui::ScrollArea::vertical()
        .stick_to_bottom(true)
        .auto_shrink([false, false])
        .show_rows(ui, font.size + 2.0, lines.len(), |ui, range| {
            ui.set_width(ui.available_width());
            for line in &lines[range] {
                let rendered = line.render();
                let mut job = egui::text::LayoutJob::default();
                for span in &rendered.spans {
                    let mut color = log_color(span.color, &visuals);
                    if rendered.emphasized && span.color == LogColor::Default {
                        color = visuals.strong_text_color();
                    }
                    job.append(
                        &span.text,
                        0.0,
                        egui::TextFormat {
                            font_id: font.clone(),
                            color,
                            ..Default::default()
                        },
                    );
                }
                ui.label(job);
            }
        });
}

fn dialog_buttons(ui: &mut egui::Ui, labels: &[&str]) -> Option<usize> {
    let mut clicked = None;
    ui.horizontal(|ui| {
        for (idx, label) in labels.iter().enumerate() {
            if ui.add(egui::Button::new(*label).min_size(egui::vec2(88.0, 28.0))).clicked() {
                clicked = Some(idx);
            }
        }
    });
    clicked
}

impl eframe::App for SetupApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_background();
        self.handle_close_request(ctx);

        let dialog = self.active_dialog();
        let show_modal = dialog.is_some();

        // Sync with system theme if it changes
        let is_dark = ctx.style().visuals.dark_mode;
        if is_dark != self.last_system_dark_mode {
            self.last_system_dark_mode = is_dark;
            self.theme_state.current_config = self.get_theme_config();
        }

        if !show_modal {
            render_theme_panel(ctx, &mut self.theme_state, &mut self.show_theme_editor);

            let toggle = egui::KeyboardShortcut::new(egui::Modifiers::CTRL, egui::Key::T);
            if ctx.input_mut(|i| i.consume_shortcut(&toggle)) {
                self.show_theme_editor = !self.show_theme_editor;
            }
        }

        if self.flow.state().is_active() || self.update.is_active() {
            ctx.request_repaint_after(POLL_INTERVAL);
        }

        if let Some(dialog) = dialog {
            self.show_dialog(ctx, dialog);
        }

        if self.show_update_window {
            self.render_update_window(ctx);
        }

        if self.show_log {
            egui::SidePanel::right("log_panel")
                .resizable(true)
                .default_width(320.0)
                .min_width(200.0)
                .show(ctx, |ui| {
                    ui.add_space(8.0);
                    ui.horizontal(|ui| {
                        ui.heading("Debug Log");
                        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                            if ui.button("X").on_hover_text("Close Log").clicked() {
                                self.show_log = false;
                            }
                        });
                    });
                    ui.horizontal(|ui| {
                        if ui.button("📋 Copy to Clipboard").clicked() {
                            self.copy_debug_log();
                        }
                        ui.label(format!(
                            "Log: {:?}",
                            crate::debug::get_log_path().file_name().unwrap_or_default()
                        ));
                    });
                    ui.separator();
                    egui::ScrollArea::vertical()
                        .stick_to_bottom(true)
                        .auto_shrink([false, false])
                        .show(ui, |ui| {
                            for msg in &self.log_messages {
                                ui.label(egui::RichText::new(msg).monospace().small());
                            }
                        });
                });
        }

        let panel_frame =
            egui::Frame::central_panel(&ctx.style()).fill(ctx.style().visuals.panel_fill);

        egui::CentralPanel::default().frame(panel_frame).show(ctx, |ui| {
            ui.add_enabled_ui(!show_modal, |ui| {
                ui.horizontal(|ui| {
                    ui.heading(format!("{} Setup", APP_NAME));
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        let theme_button =
                            ui.button("🎨").on_hover_text("Toggle Theme Editor (Ctrl+T)");
                        if theme_button.clicked() {
                            self.show_theme_editor = !self.show_theme_editor;
                        }
                        if ui.button("📜").on_hover_text("Toggle Log Area").clicked() {
                            self.show_log = !self.show_log;
                        }
                    });
                });
                ui.separator();
                ui.add_space(8.0);

                if *self.flow.state() == InstallState::Idle {
                    self.show_welcome(ui, ctx);
                } else {
                    self.show_progress(ui);
                }
            });
        });
    }
}

impl SetupApp {
    fn show_welcome(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.vertical_centered(|ui| {
            ui.add_space(24.0);
            ui.label(format!(
                "This will set up the {} container and install Microsoft Office inside it.",
                APP_NAME
            ));
            ui.label("The download is large and the installation can take a long time.");
            ui.add_space(24.0);

            let busy = self.update.is_active();
            ui.add_enabled_ui(!busy, |ui| {
                let button = egui::Button::new("Install")
                    .min_size(egui::vec2(96.0, 48.0))
                    .fill(GREEN);
                if ui.add(button).clicked() {
                    self.start_installation();
                }
            });

            ui.add_space(12.0);
            let checking = matches!(self.update_check, Some(UpdateCheck::Checking));
            ui.add_enabled_ui(!checking && !busy, |ui| {
                if ui.button("Check for updates").clicked() {
                    self.check_for_updates(ctx.clone());
                }
            });

            ui.add_space(8.0);
            match self.update_check.clone() {
                Some(UpdateCheck::Checking) => {
                    ui.add(egui::Spinner::new().color(ui.visuals().selection.bg_fill));
                }
                Some(UpdateCheck::UpToDate) => {
                    ui.label(format!("{} {} is up to date.", APP_NAME, CURRENT_VERSION));
                }
                Some(UpdateCheck::Available(info)) => {
                    ui.colored_label(
                        GREEN,
                        format!(
                            "New version available: {} (Current: {})",
                            info.version, CURRENT_VERSION
                        ),
                    );
                    if ui.button("Update now").clicked() {
                        self.start_update();
                    }
                }
                None => {}
            }

            ui.add_space(24.0);
            let install_dir = format!("Install directory: {}", self.paths.install_dir.display());
            ui.label(
                egui::RichText::new(install_dir)
                    .small()
                    .color(ui.visuals().weak_text_color()),
            );
        });
    }

    fn show_progress(&mut self, ui: &mut egui::Ui) {
        let fraction = (self.flow.progress_percent() / 100.0) as f32;
        let status = match self.flow.state() {
            InstallState::Running | InstallState::Retrying => "Installing...",
            InstallState::AbortConfirming
            | InstallState::AbortingGraceful
            | InstallState::AbortingForced => "Stopping...",
            InstallState::AwaitingUserDecision(_) => "Installation failed",
            InstallState::Terminated(Termination::Success) => "Installation complete",
            InstallState::Terminated(Termination::Aborted) => "Installation aborted",
            InstallState::Idle => "",
        };

        ui.horizontal(|ui| {
            ui.label(status);
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let can_abort = *self.flow.state() == InstallState::Running;
                let button = egui::Button::new("Abort").fill(RED);
                if ui.add_enabled(can_abort, button).clicked() {
                    self.abort_installation();
                }
            });
        });
        ui.add_space(4.0);
        ui.add(
            egui::ProgressBar::new(fraction)
                .fill(ui.visuals().selection.bg_fill)
                .desired_height(16.0)
                .show_percentage(),
        );
        ui.add_space(8.0);

        egui::Frame::new()
            .fill(ui.visuals().extreme_bg_color)
            .inner_margin(6.0)
            .show(ui, |ui| {
                let lines = self.flow.session().map(|s| s.lines()).unwrap_or(&[]);
                render_log_lines(ui, lines);
            });
    }

    fn show_dialog(&mut self, ctx: &egui::Context, dialog: Dialog) {
        // Background Dimmer - paint at Background layer, below everything
        let screen_rect = ctx.viewport_rect();
        let dimmer = egui::LayerId::new(egui::Order::Background, egui::Id::from("modal_dimmer"));
        ctx.layer_painter(dimmer)
            .rect_filled(screen_rect, 0.0, egui::Color32::from_black_alpha(140));

        let window_frame = egui::Frame::window(&ctx.style())
            .fill(ctx.style().visuals.window_fill)
            .stroke(ctx.style().visuals.window_stroke);

        let title = match &dialog {
            Dialog::Notice(_) => "Error",
            Dialog::InstallLog => "Installation Log",
            Dialog::Launch(_) => APP_NAME,
            Dialog::Failure(_) => "Installation Failed",
            Dialog::ConfirmAbort => "Abort Installation",
            Dialog::Aborting => "Aborting",
            Dialog::RemoveContainer => "Remove Container?",
            Dialog::Aborted => "Installation Aborted",
            Dialog::Complete => "Installation Complete",
        };

        egui::Window::new(title)
            .order(egui::Order::Foreground)
            .collapsible(false)
            .resizable(matches!(dialog, Dialog::InstallLog))
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .frame(window_frame)
            .show(ctx, |ui| {
                ui.set_max_width(520.0);
                ui.add_space(8.0);
                match dialog {
                    Dialog::Notice(message) => {
                        ui.colored_label(ui.visuals().error_fg_color, message);
                        ui.add_space(12.0);
                        if dialog_buttons(ui, &["OK"]).is_some() {
                            self.notice = None;
                        }
                    }
                    Dialog::InstallLog => {
                        let text = self.install_log_view.clone().unwrap_or_default();
                        egui::ScrollArea::vertical()
                            .max_height(320.0)
                            .stick_to_bottom(true)
                            .show(ui, |ui| {
                                ui.add(
                                    egui::TextEdit::multiline(&mut text.as_str())
                                        .font(egui::TextStyle::Monospace)
                                        .desired_width(f32::INFINITY)
                                        .interactive(false),
                                );
                            });
                        ui.add_space(8.0);
                        if dialog_buttons(ui, &["Close"]).is_some() {
                            self.install_log_view = None;
                        }
                    }
                    Dialog::Launch(question) => {
                        ui.label(question.message());
                        ui.add_space(12.0);
                        match dialog_buttons(ui, &["Open installer", "Open LinOffice"]) {
                            Some(0) => self.launch_question = None,
                            Some(_) => {
                                let result = crate::launcher::open_main(&self.runner, &self.paths);
                                match result {
                                    Ok(_) => ctx.send_viewport_cmd(egui::ViewportCommand::Close),
                                    Err(e) => {
                                        let message = format!("Could not open LinOffice: {}", e);
                                        self.notice = Some(message);
                                    }
                                }
                                self.launch_question = None;
                            }
                            None => {}
                        }
                    }
                    Dialog::Failure(failure) => {
                        ui.label("The installation did not complete:");
                        ui.add_space(4.0);
                        ui.colored_label(ui.visuals().error_fg_color, &failure.message);
                        if let Some(code) = failure.exit_code {
                            ui.label(
                                egui::RichText::new(format!("Exit code {}", code))
                                    .small()
                                    .color(ui.visuals().weak_text_color()),
                            );
                        }
                        ui.add_space(12.0);
                        match dialog_buttons(ui, &["Try again", "Show log", "Exit"]) {
                            Some(0) => self.answer_failure(Decision::Retry),
                            Some(1) => self.answer_failure(Decision::ViewLog),
                            Some(_) => self.answer_failure(Decision::Exit),
                            None => {}
                        }
                    }
                    Dialog::ConfirmAbort => {
                        ui.label("Are you sure you want to abort the installation?");
                        ui.add_space(12.0);
                        match dialog_buttons(ui, &["Yes", "No"]) {
                            Some(0) => self.confirm_abort(true),
                            Some(_) => self.confirm_abort(false),
                            None => {}
                        }
                    }
                    Dialog::Aborting => {
                        ui.horizontal(|ui| {
                            ui.add(egui::Spinner::new().color(ui.visuals().selection.bg_fill));
                            if *self.flow.state() == InstallState::AbortingForced {
                                ui.label("Setup did not stop in time, terminating it...");
                            } else {
                                ui.label("Waiting for setup to stop...");
                            }
                        });
                    }
                    Dialog::RemoveContainer => {
                        ui.label(format!(
                            "Do you want to remove the {} container that was partially set up?",
                            APP_NAME
                        ));
                        ui.add_space(12.0);
                        match dialog_buttons(ui, &["Yes", "No"]) {
                            Some(0) => self.remove_container(true),
                            Some(_) => self.remove_container(false),
                            None => {}
                        }
                    }
                    Dialog::Aborted => {
                        ui.label("The installation was aborted.");
                        if let CleanupOffer::Started(pid) = self.flow.cleanup() {
                            ui.label(format!(
                                "Container removal is running in a terminal (PID {}).",
                                pid
                            ));
                        }
                        ui.add_space(12.0);
                        if dialog_buttons(ui, &["Close"]).is_some() {
                            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                        }
                    }
                    Dialog::Complete => {
                        let message = format!("{} was installed successfully.", APP_NAME);
                        ui.colored_label(GREEN, message);
                        ui.add_space(12.0);
                        if dialog_buttons(ui, &["Finish"]).is_some() {
                            self.finish(ctx);
                        }
                    }
                }
                ui.add_space(8.0);
            });
    }

    fn render_update_window(&mut self, ctx: &egui::Context) {
        let mut open = true;
        egui::Window::new("Update")
            .collapsible(false)
            .default_size(egui::vec2(520.0, 320.0))
            .open(&mut open)
            .show(ctx, |ui| {
                egui::Frame::new()
                    .fill(ui.visuals().extreme_bg_color)
                    .inner_margin(6.0)
                    .show(ui, |ui| {
                        ui.set_min_height(200.0);
                        render_log_lines(ui, self.update.lines());
                    });
                ui.add_space(8.0);

                match self.update.phase() {
                    UpdatePhase::AwaitingAnswer => {
                        ui.label("Do you want to download and install the update?");
                        match dialog_buttons(ui, &["Yes", "No"]) {
                            Some(0) => self.answer_update(true),
                            Some(_) => self.answer_update(false),
                            None => {}
                        }
                    }
                    UpdatePhase::Finished(code) => {
                        if code != Some(0) {
                            let color = ui.visuals().error_fg_color;
                            ui.colored_label(color, "The updater did not finish cleanly.");
                        }
                        if dialog_buttons(ui, &["Close"]).is_some() {
                            self.close_update_window();
                        }
                    }
                    UpdatePhase::Checking | UpdatePhase::Applying => {
                        ui.add(egui::Spinner::new().color(ui.visuals().selection.bg_fill));
                    }
                    UpdatePhase::Idle => {}
                }
            });
        if !open {
            self.close_update_window();
        }
    }
}
