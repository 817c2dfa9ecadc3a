// Copyright (C) 2026 LinOffice contributors
// Licensed under AGPL-3.0-or-later

use super::SetupApp;
use egui_thematic::ThemeConfig;

impl SetupApp {
    /// Gruvbox with LinOffice's green as the accent
    pub(super) fn get_theme_config(&self) -> ThemeConfig {
        ThemeConfig {
            name: "LinOffice".to_string(),
            dark_mode: true,
            override_hyperlink_color: Some([131, 165, 152, 255]),
            override_selection_bg: Some([104, 157, 106, 255]),
            override_widget_hovered_bg_fill: Some([104, 157, 106, 60]),
            override_widget_hovered_bg_stroke_color: Some([104, 157, 106, 255]),
            override_widget_active_bg_fill: Some([104, 157, 106, 100]),
            override_widget_active_bg_stroke_color: Some([104, 157, 106, 255]),
            ..ThemeConfig::gruvbox_dark_preset()
        }
    }
}
