// Copyright (C) 2026 LinOffice contributors
// Licensed under AGPL-3.0-or-later

// Module structure for the setup window:
//
// - state.rs: SetupApp struct and initialization
// - theme.rs: Theme configuration
// - logic.rs: Reactions to button presses and background results
// - ui.rs: UI rendering (eframe::App implementation)

mod state;
mod theme;
mod logic;
mod ui;

pub use state::{SetupApp, UpdateCheck};
