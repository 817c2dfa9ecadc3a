mod app;
mod config;
mod debug;
mod error;
mod gate;
mod github;
mod install_flow;
mod launcher;
mod log_render;
mod progress;
mod supervisor;
mod terminal;
mod update_prompt;
mod updater;

use app::SetupApp;
use clap::{Parser, Subcommand};
use config::{Paths, CURRENT_VERSION, WINDOW_MIN_SIZE, WINDOW_SIZE, WINDOW_TITLE};
use eframe::egui;
use launcher::{LaunchDecision, LaunchQuestion};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "linoffice-setup",
    version,
    about = "Installer, updater and launcher for LinOffice"
)]
struct Cli {
    /// LinOffice directory (defaults to the directory of this executable)
    #[arg(long, global = true, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Setup script to run instead of <DIR>/setup.sh
    #[arg(long, value_name = "FILE")]
    script: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check for a newer release and install it over DIR
    Update {
        /// Do not ask before downloading
        #[arg(short, long)]
        yes: bool,

        /// Release feed to use, as owner/repo or a GitHub URL
        #[arg(long)]
        repo: Option<String>,
    },
    /// Open LinOffice, or the installer if setup has not finished
    Launch,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    // `update` normally runs as a child of the GUI and shares its log
    debug::init(!matches!(cli.command, Some(Command::Update { .. })));

    let mut paths = cli.dir.map(Paths::for_install_dir).unwrap_or_else(Paths::detect);
    if let Some(script) = cli.script {
        paths.setup_script = script;
    }
    debug::log(&format!("Paths: {:?}", paths));

    match cli.command {
        None => run_gui(paths, None),
        Some(Command::Update { yes, repo }) => run_update(&paths, yes, repo.as_deref()),
        Some(Command::Launch) => run_launcher(paths),
    }
}

fn run_gui(paths: Paths, question: Option<LaunchQuestion>) -> ExitCode {
    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([WINDOW_SIZE.0, WINDOW_SIZE.1])
        .with_min_inner_size([WINDOW_MIN_SIZE.0, WINDOW_MIN_SIZE.1])
        .with_resizable(true);

    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    let result = eframe::run_native(
        WINDOW_TITLE,
        options,
        Box::new(move |cc| Ok(Box::new(SetupApp::new(cc, paths, question)?))),
    );

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug::error(&format!("GUI failed: {}", e));
            eprintln!("Failed to open the setup window: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_update(paths: &Paths, yes: bool, repo: Option<&str>) -> ExitCode {
    debug::log_section("Console Update");
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome: Result<updater::ConsoleOutcome, error::UpdateError> = runtime.block_on(async {
        let mut feed = github::ReleaseFeed::new(github::http_client()?);
        if let Some(repo) = repo {
            feed = feed.with_repo(repo)?;
        }
        let current: github::Version = CURRENT_VERSION.parse()?;

        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        let mut out = std::io::stdout();
        updater::run_console_update(&feed, &current, &paths.install_dir, yes, &mut input, &mut out)
            .await
            .map_err(|source| error::UpdateError::Io {
                path: PathBuf::from("<stdio>"),
                source,
            })
    });

    match outcome {
        Ok(outcome) => {
            debug::log(&format!("Console update finished: {:?}", outcome));
            ExitCode::from(outcome.exit_code() as u8)
        }
        Err(e) => {
            debug::error(&e.to_string());
            eprintln!("Update failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_launcher(paths: Paths) -> ExitCode {
    debug::log_section("Launcher");
    match launcher::evaluate(&paths) {
        LaunchDecision::OpenMain => {
            let gui_dir = paths
                .main_window_script
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| paths.install_dir.clone());
            match launcher::open_main(&terminal::DetachedRunner::in_dir(gui_dir), &paths) {
                Ok(_) => ExitCode::SUCCESS,
                Err(e) => {
                    debug::error(&format!("Could not open LinOffice: {}", e));
                    eprintln!("Could not open LinOffice: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        LaunchDecision::OpenInstaller => run_gui(paths, None),
        LaunchDecision::Ask(question) => run_gui(paths, Some(question)),
    }
}
