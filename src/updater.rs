//! Download a tagged release archive and unpack it over the install directory.
//!
//! Files listed in the preserve-set are never written. There is no staging:
//! an error midway leaves the files written so far in place.

use crate::config::{MAX_ARCHIVE_SIZE, MAX_REDIRECTS, PRESERVE_FILES};
use crate::debug;
use crate::error::UpdateError;
use crate::github::{ReleaseFeed, Version};
use futures_util::StreamExt;
use reqwest::header::LOCATION;
use reqwest::Url;
use std::fs::{self, File};
use std::io::{BufRead, Cursor, Write};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Written,
    Preserved,
}

/// What one apply run did, file by file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    pub target_dir: PathBuf,
    pub preserve: Vec<String>,
    pub files: Vec<(PathBuf, FileOutcome)>,
}

impl UpdatePlan {
    pub fn new(target_dir: &Path, preserve: &[&str]) -> Self {
        Self {
            target_dir: target_dir.to_path_buf(),
            preserve: preserve.iter().map(|p| p.to_string()).collect(),
            files: Vec::new(),
        }
    }

    fn is_preserved(&self, relative: &str) -> bool {
        self.preserve.iter().any(|p| p == relative)
    }

    pub fn written(&self) -> usize {
        self.count(FileOutcome::Written)
    }

    pub fn preserved(&self) -> usize {
        self.count(FileOutcome::Preserved)
    }

    fn count(&self, outcome: FileOutcome) -> usize {
        self.files.iter().filter(|(_, o)| *o == outcome).count()
    }
}

#[derive(Debug)]
pub enum UpdateResult {
    Applied(UpdatePlan),
    Failed(String),
}

/// GET `url`, following redirects by hand, and return the body of the final 200
pub async fn fetch_archive(
    client: &reqwest::Client,
    url: &str,
    token: Option<&str>,
) -> Result<Vec<u8>, UpdateError> {
    fetch_limited(client, url, token, MAX_ARCHIVE_SIZE).await
}

async fn fetch_limited(
    client: &reqwest::Client,
    url: &str,
    token: Option<&str>,
    limit: u64,
) -> Result<Vec<u8>, UpdateError> {
    let mut current = Url::parse(url).map_err(|_| UpdateError::InvalidUrl(url.to_string()))?;

    for _ in 0..=MAX_REDIRECTS {
        let mut request = client.get(current.clone());
        if let Some(token) = token {
            request = request.header("Authorization", format!("token {}", token));
        }
        let response = request.send().await?;
        let status = response.status().as_u16();

        if REDIRECT_STATUSES.contains(&status) {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| UpdateError::MissingLocation(current.to_string()))?;
            let next = current
                .join(location)
                .map_err(|_| UpdateError::InvalidUrl(location.to_string()))?;
            debug::log(&format!("Redirected to: {}", next));
            current = next;
            continue;
        }

        if status != 200 {
            return Err(UpdateError::Status {
                status,
                url: current.to_string(),
            });
        }

        if response.content_length().is_some_and(|len| len > limit) {
            return Err(UpdateError::TooLarge { limit });
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(UpdateError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }
        debug::log(&format!("Downloaded {} bytes from {}", body.len(), current));
        return Ok(body);
    }

    Err(UpdateError::TooManyRedirects(MAX_REDIRECTS))
}

/// Unpack `archive` into `target_dir`, dropping its single top-level folder
pub fn apply_archive(
    archive: &[u8],
    target_dir: &Path,
    preserve: &[&str],
) -> Result<UpdatePlan, UpdateError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    let mut plan = UpdatePlan::new(target_dir, preserve);

    // The first entry with a slash names the top-level folder, e.g. `linoffice-2.2.0/`
    let mut prefix = None;
    for i in 0..zip.len() {
        let entry = zip.by_index(i)?;
        if let Some((top, _)) = entry.name().split_once('/') {
            prefix = Some(format!("{}/", top));
            break;
        }
    }
    let prefix = prefix
        .ok_or_else(|| UpdateError::Archive("could not determine top-level folder".to_string()))?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        let Some(relative) = name.strip_prefix(&prefix).filter(|r| !r.is_empty()) else {
            debug::warn(&format!("Skipping entry outside {}: {}", prefix, name));
            continue;
        };
        if entry.enclosed_name().is_none() {
            debug::warn(&format!("Skipping unsafe path: {}", name));
            continue;
        }

        let relative_path = PathBuf::from(relative);
        if plan.is_preserved(relative) {
            debug::log(&format!("Preserving {}", relative));
            plan.files.push((relative_path, FileOutcome::Preserved));
            continue;
        }

        let target = target_dir.join(&relative_path);
        let io_err = |source| UpdateError::Io {
            path: target.clone(),
            source,
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut out = File::create(&target).map_err(io_err)?;
        std::io::copy(&mut entry, &mut out).map_err(io_err)?;

        plan.files.push((relative_path, FileOutcome::Written));
    }

    debug::log(&format!(
        "Applied update to {:?}: {} written, {} preserved",
        target_dir,
        plan.written(),
        plan.preserved()
    ));
    Ok(plan)
}

/// Download and apply in one go; errors are folded into `Failed`
pub async fn apply_update(
    client: &reqwest::Client,
    url: &str,
    token: Option<&str>,
    target_dir: &Path,
    preserve: &[&str],
) -> UpdateResult {
    debug::log_section("Applying Update");
    let result = match fetch_archive(client, url, token).await {
        Ok(bytes) => apply_archive(&bytes, target_dir, preserve),
        Err(e) => Err(e),
    };
    match result {
        Ok(plan) => UpdateResult::Applied(plan),
        Err(e) => {
            debug::error(&format!("Update failed: {}", e));
            UpdateResult::Failed(e.to_string())
        }
    }
}

/// How a console update run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleOutcome {
    Unavailable,
    UpToDate,
    Declined,
    Updated(usize),
    Failed,
}

impl ConsoleOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            ConsoleOutcome::Unavailable | ConsoleOutcome::Failed => 1,
            _ => 0,
        }
    }
}

/// The `update` subcommand: check, ask, download, apply.
/// The question ends with a newline so a supervising GUI sees it as a line.
pub async fn run_console_update<R: BufRead, W: Write>(
    feed: &ReleaseFeed,
    current: &Version,
    target_dir: &Path,
    assume_yes: bool,
    input: &mut R,
    out: &mut W,
) -> std::io::Result<ConsoleOutcome> {
    writeln!(out, "Checking for updates...")?;
    out.flush()?;

    let latest = match feed.latest_stable().await {
        Ok(Some(info)) => info,
        Ok(None) => {
            writeln!(out, "Failed to fetch release information.")?;
            return Ok(ConsoleOutcome::Unavailable);
        }
        Err(UpdateError::VersionParse(tag)) => {
            debug::warn(&format!("Invalid version tag {:?}", tag));
            writeln!(out, "Invalid version format in latest release.")?;
            return Ok(ConsoleOutcome::Unavailable);
        }
        Err(e) => {
            debug::warn(&format!("Release check failed: {}", e));
            writeln!(out, "Error fetching releases: {}", e)?;
            writeln!(out, "Failed to fetch release information.")?;
            return Ok(ConsoleOutcome::Unavailable);
        }
    };

    if !latest.version.is_newer_than(current) {
        writeln!(
            out,
            "No update needed. Current version: {}, Latest: {}",
            current, latest.version
        )?;
        return Ok(ConsoleOutcome::UpToDate);
    }

    writeln!(
        out,
        "New version available: {} (Current: {}) Do you want to update?",
        latest.version, current
    )?;

    if !assume_yes {
        writeln!(out, "Do you want to download and install the update? (y/n): ")?;
        out.flush()?;
        let mut answer = String::new();
        input.read_line(&mut answer)?;
        if answer.trim().to_lowercase() != "y" {
            writeln!(out, "Update cancelled.")?;
            return Ok(ConsoleOutcome::Declined);
        }
    }

    writeln!(out, "Using download URL: {}", latest.archive_url)?;
    out.flush()?;

    let result = apply_update(
        feed.client(),
        &latest.archive_url,
        feed.token(),
        target_dir,
        PRESERVE_FILES,
    )
    .await;
    match result {
        UpdateResult::Applied(plan) => {
            for (path, _) in plan.files.iter().filter(|(_, o)| *o == FileOutcome::Preserved) {
                writeln!(out, "Preserving {}", path.display())?;
            }
            writeln!(out, "Update completed successfully. Updated {} files.", plan.written())?;
            writeln!(out, "Please restart the application to use the new version.")?;
            Ok(ConsoleOutcome::Updated(plan.written()))
        }
        UpdateResult::Failed(reason) => {
            writeln!(out, "Error during update: {}", reason)?;
            writeln!(out, "Update failed.")?;
            writeln!(
                out,
                "Please download the latest version manually from {}",
                feed.releases_page()
            )?;
            Ok(ConsoleOutcome::Failed)
        }
    }
}
