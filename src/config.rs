// ============================================================================
// SETUP CONFIGURATION
// ============================================================================
// Compile-time settings for the LinOffice installer and updater.
//
// Runtime locations (install directory, log files, scripts) live in `Paths`
// and are passed to the flows that need them; nothing below is mutable.
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

// ----------------------------------------------------------------------------
// BRANDING
// ----------------------------------------------------------------------------

/// Product name shown in window titles and dialogs
pub const APP_NAME: &str = "LinOffice";

/// Window title (displayed in title bar)
pub const WINDOW_TITLE: &str = "LinOffice Installer";

/// Default window size (width, height)
pub const WINDOW_SIZE: (f32, f32) = (720.0, 480.0);

/// Minimum window size (width, height)
pub const WINDOW_MIN_SIZE: (f32, f32) = (600.0, 400.0);

/// Name of the podman container provisioned by the setup script
pub const CONTAINER_NAME: &str = "LinOffice";

// ----------------------------------------------------------------------------
// RELEASE FEED
// ----------------------------------------------------------------------------

pub const REPO_OWNER: &str = "eylenburg";
pub const REPO_NAME: &str = "linoffice";

/// Version of this build, compared against the release feed
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Base URL of the releases API
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Base URL used to build tag archive links
pub const GITHUB_WEB_BASE: &str = "https://github.com";

/// User-Agent string for HTTP requests to GitHub
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Optional personal access token, useful when hitting API rate limits
pub const GITHUB_TOKEN_ENV: &str = "LINOFFICE_GITHUB_TOKEN";

/// Every network request is bounded by this timeout
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Redirect hops followed when downloading a release archive
pub const MAX_REDIRECTS: usize = 10;

/// Largest release archive accepted (source archives are a few MB)
pub const MAX_ARCHIVE_SIZE: u64 = 256 * 1024 * 1024;

/// Relative paths inside the install directory that an update never overwrites.
/// These hold the user's local configuration and regional overrides.
pub const PRESERVE_FILES: &[&str] = &[
    "config/compose.yaml",
    "config/linoffice.conf",
    "config/oem/registry/regional_settings.reg",
];

// ----------------------------------------------------------------------------
// INSTALL PROCESS
// ----------------------------------------------------------------------------

/// Time the setup script gets to react to SIGINT before it is killed
pub const ABORT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Interpreter used to run the setup and cleanup scripts
pub const SCRIPT_SHELL: &str = "bash";

/// Marker written to the setup progress log once Office is installed
pub const SETUP_COMPLETE_MARKER: &str = "office_installed";

/// Interpreter for the main LinOffice window
pub const MAIN_APP_INTERPRETER: &str = "python3";

/// Terminal emulators tried, in order, for detached scripts.
/// `{script}` is replaced by the script path.
pub const TERMINAL_CANDIDATES: &[&[&str]] = &[
    &["konsole", "--hold", "-e", "bash", "{script}"],
    &["gnome-terminal", "--", "bash", "{script}"],
    &["xfce4-terminal", "--hold", "-e", "bash", "{script}"],
    &["lxterminal", "-e", "bash", "{script}"],
    &["mate-terminal", "--disable-factory", "-e", "bash", "{script}"],
    &["xterm", "-hold", "-e", "bash", "{script}"],
];

// ----------------------------------------------------------------------------
// RUNTIME PATHS
// ----------------------------------------------------------------------------

/// Filesystem locations used by the installer, updater and launcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Root of the LinOffice checkout (holds setup.sh, gui/, config/)
    pub install_dir: PathBuf,
    /// Script run by the installer
    pub setup_script: PathBuf,
    /// Script offered after an aborted install to delete the container
    pub remove_container_script: PathBuf,
    /// Main application window, started once setup has finished
    pub main_window_script: PathBuf,
    /// Full, unmodified output of every install run (append-only)
    pub install_log: PathBuf,
    /// Written by the setup script; holds `SETUP_COMPLETE_MARKER` on success
    pub setup_progress_log: PathBuf,
}

impl Paths {
    /// Build the standard layout for an install directory
    pub fn for_install_dir(install_dir: impl Into<PathBuf>) -> Self {
        let install_dir = install_dir.into();
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| home_dir().join(".local").join("share"))
            .join("linoffice");

        Self {
            setup_script: install_dir.join("setup.sh"),
            remove_container_script: install_dir
                .join("gui")
                .join("installer")
                .join("remove_container.sh"),
            main_window_script: install_dir.join("gui").join("mainwindow.py"),
            install_log: data_dir.join("windows_install.log"),
            setup_progress_log: data_dir.join("setup_progress.log"),
            install_dir,
        }
    }

    /// Layout relative to the running executable
    pub fn detect() -> Self {
        let install_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::for_install_dir(install_dir)
    }

    /// Keep every log and state file below `dir`
    #[cfg(test)]
    pub fn with_data_dir(mut self, dir: &Path) -> Self {
        self.install_log = dir.join("windows_install.log");
        self.setup_progress_log = dir.join("setup_progress.log");
        self
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(std::env::temp_dir)
}

// ============================================================================
// THEME SETUP (internal use)
// ============================================================================

pub fn setup_theme(ctx: &egui::Context) {
    use egui_thematic::ThemeConfig;

    ctx.set_visuals(ThemeConfig::gruvbox_dark_preset().to_visuals());
}
