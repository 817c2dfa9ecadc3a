// Centralized debug logging for the LinOffice setup tool
// Logs are written to a temp file and can be shown or copied from the GUI

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

lazy_static::lazy_static! {
    static ref DEBUG_LOG: Mutex<DebugLog> = Mutex::new(DebugLog::new());
}

const LOG_FILE_NAME: &str = "linoffice_setup_debug.txt";

pub struct DebugLog {
    path: PathBuf,
    enabled: bool,
}

impl DebugLog {
    fn new() -> Self {
        Self {
            path: std::env::temp_dir().join(LOG_FILE_NAME),
            enabled: true,
        }
    }
}

/// Write the log header. Only the top-level process starts a fresh log;
/// an updater run by the GUI appends to the GUI's log.
pub fn init(fresh: bool) {
    if let Ok(debug_log) = DEBUG_LOG.lock() {
        write_header(&debug_log.path, fresh);
    }
}

fn write_header(path: &Path, fresh: bool) {
    let file = if fresh {
        File::create(path)
    } else {
        OpenOptions::new().create(true).append(true).open(path)
    };
    if let Ok(mut f) = file {
        let _ = writeln!(f, "=== LinOffice Setup Debug Log ===");
        let _ = writeln!(f, "Log file: {:?}", path);
        let _ = writeln!(f, "Version: {}", env!("CARGO_PKG_VERSION"));
        let _ = writeln!(f, "PID: {}", std::process::id());
        let _ = writeln!(f, "Timestamp: {:?}", std::time::SystemTime::now());
        let _ = writeln!(f, "Platform: {}", std::env::consts::OS);
        let _ = writeln!(f, "Arch: {}", std::env::consts::ARCH);
        let _ = writeln!(f);
    }
}

/// Log a debug message
pub fn log(message: &str) {
    if let Ok(debug_log) = DEBUG_LOG.lock() {
        if debug_log.enabled {
            if let Ok(mut f) = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&debug_log.path)
            {
                let timestamp = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                let _ = writeln!(f, "[{}] {}", timestamp, message);
            }
        }
    }
}

/// Log a section header
pub fn log_section(section: &str) {
    log(&format!("\n=== {} ===", section));
}

/// Log a warning. Warnings are things the user can keep working through.
pub fn warn(message: &str) {
    log(&format!("WARNING: {}", message));
}

/// Log an error
pub fn error(message: &str) {
    log(&format!("ERROR: {}", message));
}

/// Get the path to the debug log file
pub fn get_log_path() -> PathBuf {
    if let Ok(debug_log) = DEBUG_LOG.lock() {
        debug_log.path.clone()
    } else {
        std::env::temp_dir().join(LOG_FILE_NAME)
    }
}

/// Read the whole debug log, for the log panel and the clipboard button
pub fn read_contents() -> Result<String, String> {
    let path = get_log_path();
    std::fs::read_to_string(&path).map_err(|e| format!("Failed to read log file {:?}: {}", path, e))
}
