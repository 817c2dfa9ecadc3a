use crate::config::{
    GITHUB_API_BASE, GITHUB_TOKEN_ENV, GITHUB_WEB_BASE, HTTP_TIMEOUT, REPO_NAME, REPO_OWNER,
    USER_AGENT,
};
use crate::debug;
use crate::error::UpdateError;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    pub name: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
}

/// A release version: `MAJOR.MINOR.PATCH` with no pre-release or build part
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(semver::Version);

impl Version {
    pub fn is_newer_than(&self, other: &Version) -> bool {
        self > other
    }
}

impl FromStr for Version {
    type Err = UpdateError;

    /// Accepts one optional leading `v`
    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let s = tag.strip_prefix('v').unwrap_or(tag);
        match semver::Version::parse(s) {
            Ok(version) if version.pre.is_empty() && version.build.is_empty() => {
                Ok(Version(version))
            }
            _ => Err(UpdateError::VersionParse(tag.to_string())),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A stable release worth offering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub version: Version,
    pub draft: bool,
    pub prerelease: bool,
    pub archive_url: String,
}

/// The HTTP client shared by the feed and the archive download.
/// Redirects are followed by hand so relative `Location`s and the hop limit are ours.
pub fn http_client() -> Result<reqwest::Client, UpdateError> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .build()?)
}

/// The repository's release list
#[derive(Debug, Clone)]
pub struct ReleaseFeed {
    client: reqwest::Client,
    api_base: String,
    web_base: String,
    owner: String,
    repo: String,
    token: Option<String>,
}

impl ReleaseFeed {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_base: GITHUB_API_BASE.to_string(),
            web_base: GITHUB_WEB_BASE.to_string(),
            owner: REPO_OWNER.to_string(),
            repo: REPO_NAME.to_string(),
            token: std::env::var(GITHUB_TOKEN_ENV).ok().filter(|t| !t.trim().is_empty()),
        }
    }

    /// Point at a fork, given as `owner/repo` or a GitHub URL
    pub fn with_repo(mut self, repo_url: &str) -> Result<Self, UpdateError> {
        let (owner, repo) = parse_github_url(repo_url).map_err(UpdateError::InvalidUrl)?;
        self.owner = owner;
        self.repo = repo;
        Ok(self)
    }

    #[cfg(test)]
    pub fn with_bases(mut self, api_base: &str, web_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.web_base = web_base.trim_end_matches('/').to_string();
        self
    }

    #[cfg(test)]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Page the user can download releases from by hand
    pub fn releases_page(&self) -> String {
        format!("{}/{}/{}/releases", self.web_base, self.owner, self.repo)
    }

    pub fn archive_url(&self, version: &Version) -> String {
        format!(
            "{}/{}/{}/archive/refs/tags/v{}.zip",
            self.web_base, self.owner, self.repo, version
        )
    }

    pub async fn fetch_releases(&self) -> Result<Vec<Release>, UpdateError> {
        let api_url = format!("{}/repos/{}/{}/releases", self.api_base, self.owner, self.repo);
        debug::log(&format!("Fetching releases from {}", api_url));

        let mut request = self
            .client
            .get(&api_url)
            .header("Accept", "application/vnd.github.v3+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("token {}", token));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(UpdateError::Status {
                status: response.status().as_u16(),
                url: api_url,
            });
        }

        Ok(response.json::<Vec<Release>>().await?)
    }

    /// Newest stable release, or `None` if the feed lists none
    pub async fn latest_stable(&self) -> Result<Option<ReleaseInfo>, UpdateError> {
        let releases = self.fetch_releases().await?;
        let Some(release) = select_stable(&releases) else {
            return Ok(None);
        };
        let version: Version = release.tag_name.parse()?;
        let archive_url = self.archive_url(&version);
        Ok(Some(ReleaseInfo {
            version,
            draft: release.draft,
            prerelease: release.prerelease,
            archive_url,
        }))
    }

    /// A release newer than `current`, if there is one. Failures only get logged.
    pub async fn check_for_update(&self, current: &Version) -> Option<ReleaseInfo> {
        match self.latest_stable().await {
            Ok(Some(info)) if info.version.is_newer_than(current) => {
                debug::log(&format!("Update available: {} (current {})", info.version, current));
                Some(info)
            }
            Ok(Some(info)) => {
                debug::log(&format!(
                    "No update needed: latest {} (current {})",
                    info.version, current
                ));
                None
            }
            Ok(None) => {
                debug::log("No stable release found");
                None
            }
            Err(e) => {
                debug::warn(&format!("Update check failed: {}", e));
                None
            }
        }
    }
}

/// First entry that is neither a draft nor a prerelease. The feed lists newest first.
pub fn select_stable(releases: &[Release]) -> Option<&Release> {
    releases.iter().find(|r| !r.draft && !r.prerelease)
}

fn parse_github_url(url: &str) -> Result<(String, String), String> {
    // https://github.com/owner/repo(.git) or owner/repo
    let url = url.trim();
    let url = url.strip_suffix(".git").unwrap_or(url);

    let path = match url.split_once("github.com") {
        Some((_, rest)) => rest.trim_start_matches(':'),
        None => url,
    };
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        [owner, repo] => Ok((owner.to_string(), repo.to_string())),
        [owner, repo, ..] if url.contains("github.com") => {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(format!("{} (use owner/repo or https://github.com/owner/repo)", url)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(tag: &str, draft: bool, prerelease: bool) -> serde_json::Value {
        serde_json::json!({
            "tag_name": tag,
            "name": tag,
            "draft": draft,
            "prerelease": prerelease,
        })
    }

    fn feed(server: &mockito::ServerGuard) -> ReleaseFeed {
        ReleaseFeed::new(http_client().unwrap())
            .with_bases(&server.url(), &server.url())
            .with_token(None)
    }

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn versions_order_numerically() {
        assert!(v("2.2.0").is_newer_than(&v("2.1.0")));
        assert!(v("10.0.0").is_newer_than(&v("2.2.0")));
        assert!(v("2.1.10").is_newer_than(&v("2.1.9")));
        assert!(!v("2.1.0").is_newer_than(&v("2.1.0")));
        assert_eq!(v("v2.1.0"), v("2.1.0"));
        assert_eq!(v("v2.1.0").to_string(), "2.1.0");
    }

    #[test]
    fn malformed_versions_are_rejected() {
        for tag in [
            "", "v", "2.1", "2.1.0.1", "2.1.x", "2.1.0-beta", "2.1.0+build.5", "latest",
            "vv2.1.0", "2..1", " 2.1.0",
        ] {
            assert!(tag.parse::<Version>().is_err(), "{tag:?} should not parse");
        }
    }

    #[test]
    fn stable_selection_skips_drafts_and_prereleases() {
        let releases: Vec<Release> = serde_json::from_value(serde_json::json!([
            release("v3.0.0", true, false),
            release("v2.9.0", false, true),
            release("v2.2.0", false, false),
            release("v2.1.0", false, false),
        ]))
        .unwrap();
        assert_eq!(select_stable(&releases).unwrap().tag_name, "v2.2.0");
        assert!(select_stable(&releases[..2]).is_none());
    }

    #[test]
    fn test_parse_github_url() {
        for url in [
            "https://github.com/owner/repo",
            "https://github.com/owner/repo.git",
            "https://github.com/owner/repo/releases",
            "git@github.com:owner/repo.git",
            "owner/repo",
        ] {
            assert_eq!(
                parse_github_url(url).unwrap(),
                ("owner".to_string(), "repo".to_string()),
                "{url}"
            );
        }
        assert!(parse_github_url("just-a-name").is_err());
    }

    #[test]
    fn archive_url_uses_tag_layout() {
        let feed = ReleaseFeed::new(reqwest::Client::new())
            .with_bases("https://github.com", "https://github.com");
        assert_eq!(
            feed.archive_url(&v("2.2.0")),
            "https://github.com/eylenburg/linoffice/archive/refs/tags/v2.2.0.zip"
        );
    }

    #[tokio::test]
    async fn newer_stable_release_is_offered() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/eylenburg/linoffice/releases")
            .match_header("accept", "application/vnd.github.v3+json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!([
                    release("v2.3.0-rc1", false, true),
                    release("v2.2.0", false, false),
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let info = feed(&server).check_for_update(&v("2.1.0")).await.unwrap();
        assert_eq!(info.version, v("2.2.0"));
        assert!(!info.prerelease);
        assert!(info.archive_url.ends_with("/eylenburg/linoffice/archive/refs/tags/v2.2.0.zip"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn same_version_is_not_an_update() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/eylenburg/linoffice/releases")
            .with_status(200)
            .with_body(serde_json::json!([release("v2.1.0", false, false)]).to_string())
            .create_async()
            .await;

        assert!(feed(&server).check_for_update(&v("2.1.0")).await.is_none());
    }

    #[tokio::test]
    async fn feed_failures_mean_no_update() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/eylenburg/linoffice/releases")
            .with_status(403)
            .with_body("rate limited")
            .create_async()
            .await;
        let feed = feed(&server);
        assert!(feed.check_for_update(&v("0.0.1")).await.is_none());
        assert!(matches!(
            feed.latest_stable().await,
            Err(UpdateError::Status { status: 403, .. })
        ));
    }

    #[tokio::test]
    async fn malformed_tag_or_body_means_no_update() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/eylenburg/linoffice/releases")
            .with_status(200)
            .with_body(
                serde_json::json!([
                    release("nightly", false, false),
                    release("v9.0.0", false, false),
                ])
                .to_string(),
            )
            .create_async()
            .await;
        let feed = feed(&server);
        assert!(feed.check_for_update(&v("0.0.1")).await.is_none());
        assert!(matches!(feed.latest_stable().await, Err(UpdateError::VersionParse(_))));

        let mut broken = mockito::Server::new_async().await;
        broken
            .mock("GET", "/repos/eylenburg/linoffice/releases")
            .with_status(200)
            .with_body("{not json")
            .create_async()
            .await;
        assert!(ReleaseFeed::new(http_client().unwrap())
            .with_bases(&broken.url(), &broken.url())
            .check_for_update(&v("0.0.1"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn token_is_sent_when_configured() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/someone/fork/releases")
            .match_header("authorization", "token s3cret")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let feed = feed(&server)
            .with_repo("https://github.com/someone/fork")
            .unwrap()
            .with_token(Some("s3cret".into()));
        assert_eq!(feed.latest_stable().await.unwrap(), None);
        mock.assert_async().await;
    }
}
