//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Metadata cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path to the SQLite cache file.
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    /// How long a writer waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("picsync-metadata-cache.db")
}

fn default_busy_timeout_secs() -> u64 {
    5
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

/// Scheduling and publishing knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Repeat the sync on this interval (e.g. "30m"). Absent means run once.
    #[serde(default, with = "humantime_serde")]
    pub every: Option<Duration>,
    /// Pause after uploads so the destination can index new items.
    #[serde(default = "default_ingest_delay", with = "humantime_serde")]
    pub ingest_delay: Duration,
}

fn default_ingest_delay() -> Duration {
    Duration::from_secs(5)
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            every: None,
            ingest_delay: default_ingest_delay(),
        }
    }
}

/// Source album references for one destination album.
///
/// One album may mix services; every listed album feeds the same
/// destination album.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AlbumSources {
    /// Google Photos album ids.
    #[serde(default)]
    pub googlephotos: Vec<String>,
    /// SmugMug album keys.
    #[serde(default)]
    pub smugmug: Vec<String>,
}

impl AlbumSources {
    /// Cache namespace of the Google Photos source.
    pub const GOOGLEPHOTOS: &'static str = "googlephotos";
    /// Cache namespace of the SmugMug source.
    pub const SMUGMUG: &'static str = "smugmug";

    /// `(namespace, album ref)` pairs in configuration order.
    pub fn refs(&self) -> impl Iterator<Item = (&'static str, &str)> {
        let googlephotos = self
            .googlephotos
            .iter()
            .map(|r| (Self::GOOGLEPHOTOS, r.as_str()));
        let smugmug = self.smugmug.iter().map(|r| (Self::SMUGMUG, r.as_str()));
        googlephotos.chain(smugmug)
    }

    pub fn is_empty(&self) -> bool {
        self.googlephotos.is_empty() && self.smugmug.is_empty()
    }
}

/// One album pair: sources feeding a destination album of the same name.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlbumConfig {
    /// Destination album name.
    pub name: String,
    /// Compute and log the work list without touching the destination.
    #[serde(default)]
    pub dry_run: bool,
    /// Republish the presentation even when nothing changed.
    #[serde(default)]
    pub force_publish: bool,
    /// Fail the pair, instead of skipping it, when the sources are empty.
    #[serde(default)]
    pub strict_empty_source: bool,
    #[serde(default)]
    pub sources: AlbumSources,
}

/// Whether cached hashes for a source may be trusted without re-downloading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CachePolicy {
    /// The service never changes bytes behind an id; entries never go stale.
    Immutable,
    /// Entries older than this are re-downloaded and re-hashed.
    RevalidateAfter(Duration),
}

impl CachePolicy {
    /// Whether an entry last refreshed `age` ago must be downloaded again.
    pub fn is_stale(&self, age: Duration) -> bool {
        match self {
            Self::Immutable => false,
            Self::RevalidateAfter(max_age) => age >= *max_age,
        }
    }
}

/// Google Photos adapter configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GooglePhotosConfig {
    /// OAuth access token obtained out of band.
    pub access_token: String,
    #[serde(default = "default_googlephotos_api_base")]
    pub api_base: String,
    #[serde(default = "default_googlephotos_page_size")]
    pub page_size: u32,
    /// Re-download items whose cache entry is older than this. By default
    /// Google Photos ids are treated as immutable.
    #[serde(default, with = "humantime_serde")]
    pub revalidate_after: Option<Duration>,
}

fn default_googlephotos_api_base() -> String {
    "https://photoslibrary.googleapis.com".to_string()
}

fn default_googlephotos_page_size() -> u32 {
    100
}

impl GooglePhotosConfig {
    pub fn cache_policy(&self) -> CachePolicy {
        match self.revalidate_after {
            Some(max_age) => CachePolicy::RevalidateAfter(max_age),
            None => CachePolicy::Immutable,
        }
    }
}

/// SmugMug adapter configuration.
///
/// Requests are signed with OAuth 1.0a; the access token pair is obtained
/// out of band.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SmugMugConfig {
    /// Consumer (API) key.
    pub api_key: String,
    /// Consumer (API) secret.
    pub api_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
    #[serde(default = "default_smugmug_api_base")]
    pub api_base: String,
    #[serde(default = "default_smugmug_page_size")]
    pub page_size: u32,
    /// Re-download items whose cache entry is older than this.
    #[serde(default, with = "humantime_serde")]
    pub revalidate_after: Option<Duration>,
}

fn default_smugmug_api_base() -> String {
    "https://api.smugmug.com".to_string()
}

fn default_smugmug_page_size() -> u32 {
    100
}

impl SmugMugConfig {
    pub fn cache_policy(&self) -> CachePolicy {
        match self.revalidate_after {
            Some(max_age) => CachePolicy::RevalidateAfter(max_age),
            None => CachePolicy::Immutable,
        }
    }
}

/// Nixplay adapter configuration.
///
/// The session cookie and CSRF token come from an existing browser or
/// login session; this program never logs in itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NixplayConfig {
    pub session_cookie: String,
    pub csrf_token: String,
    #[serde(default = "default_nixplay_api_base")]
    pub api_base: String,
    #[serde(default = "default_nixplay_page_size")]
    pub page_size: u32,
}

fn default_nixplay_api_base() -> String {
    "https://api.nixplay.com".to_string()
}

fn default_nixplay_page_size() -> u32 {
    100
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub albums: Vec<AlbumConfig>,
    pub googlephotos: Option<GooglePhotosConfig>,
    pub smugmug: Option<SmugMugConfig>,
    pub nixplay: Option<NixplayConfig>,
}

impl AppConfig {
    /// Validate the album list and service sections.
    ///
    /// Returns warnings for settings that are allowed but suspicious, and an
    /// error for settings the sync cannot run with.
    pub fn validate(&self) -> crate::Result<Vec<String>> {
        let mut warnings = Vec::new();

        if self.sync.every == Some(Duration::ZERO) {
            return Err(crate::Error::InvalidConfig(
                "sync.every cannot be 0; omit it to run once".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for album in &self.albums {
            if album.name.trim().is_empty() {
                return Err(crate::Error::InvalidConfig(
                    "album name cannot be empty".to_string(),
                ));
            }
            if !names.insert(album.name.as_str()) {
                return Err(crate::Error::InvalidConfig(format!(
                    "album '{}' is configured more than once",
                    album.name
                )));
            }
            if album.sources.is_empty() {
                warnings.push(format!(
                    "album '{}' has no sources and will never be changed",
                    album.name
                ));
            }
            if !album.sources.googlephotos.is_empty() && self.googlephotos.is_none() {
                return Err(crate::Error::InvalidConfig(format!(
                    "album '{}' uses googlephotos sources but no [googlephotos] section is set",
                    album.name
                )));
            }
            if !album.sources.smugmug.is_empty() && self.smugmug.is_none() {
                return Err(crate::Error::InvalidConfig(format!(
                    "album '{}' uses smugmug sources but no [smugmug] section is set",
                    album.name
                )));
            }
        }

        if !self.albums.is_empty() && self.nixplay.is_none() {
            return Err(crate::Error::InvalidConfig(
                "albums are configured but no [nixplay] section is set".to_string(),
            ));
        }

        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn album(name: &str, sources: &[&str]) -> AlbumConfig {
        AlbumConfig {
            name: name.to_string(),
            dry_run: false,
            force_publish: false,
            strict_empty_source: false,
            sources: AlbumSources {
                googlephotos: sources.iter().map(|s| s.to_string()).collect(),
                smugmug: Vec::new(),
            },
        }
    }

    fn services() -> AppConfig {
        AppConfig {
            googlephotos: Some(GooglePhotosConfig {
                access_token: "token".to_string(),
                api_base: default_googlephotos_api_base(),
                page_size: 100,
                revalidate_after: None,
            }),
            nixplay: Some(NixplayConfig {
                session_cookie: "sessionid=abc".to_string(),
                csrf_token: "csrf".to_string(),
                api_base: default_nixplay_api_base(),
                page_size: 100,
            }),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{
            "sync": {"every": "1h 30m"},
            "albums": [{"name": "Kitchen", "sources": {"googlephotos": ["abc"]}}]
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.sync.every, Some(Duration::from_secs(5400)));
        assert_eq!(config.sync.ingest_delay, Duration::from_secs(5));
        assert_eq!(config.cache.path, PathBuf::from("picsync-metadata-cache.db"));
        assert!(!config.albums[0].dry_run);
        assert!(!config.albums[0].force_publish);
    }

    #[test]
    fn test_validate_rejects_duplicate_album_names() {
        let mut config = services();
        config.albums = vec![album("Kitchen", &["a"]), album("Kitchen", &["b"])];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_warns_on_sourceless_album() {
        let mut config = services();
        config.albums = vec![album("Kitchen", &[])];
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("no sources"));
    }

    #[test]
    fn test_validate_requires_service_sections() {
        let config = AppConfig {
            albums: vec![album("Kitchen", &["a"])],
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_smugmug_section_for_smugmug_sources() {
        let mut config = services();
        let mut kitchen = album("Kitchen", &["gp-1"]);
        kitchen.sources.smugmug = vec!["AbC123".to_string()];
        config.albums = vec![kitchen];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("[smugmug]"));

        config.smugmug = Some(SmugMugConfig {
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            access_token: "token".to_string(),
            access_token_secret: "token-secret".to_string(),
            api_base: default_smugmug_api_base(),
            page_size: 100,
            revalidate_after: None,
        });
        assert!(config.validate().unwrap().is_empty());
    }

    #[test]
    fn test_album_sources_refs_mix_services() {
        let sources = AlbumSources {
            googlephotos: vec!["gp-1".to_string()],
            smugmug: vec!["AbC123".to_string()],
        };
        let refs: Vec<_> = sources.refs().collect();
        assert_eq!(
            refs,
            vec![
                (AlbumSources::GOOGLEPHOTOS, "gp-1"),
                (AlbumSources::SMUGMUG, "AbC123")
            ]
        );
        assert!(!sources.is_empty());
        assert!(AlbumSources::default().is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = services();
        config.sync.every = Some(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_policy() {
        let mut gp = services().googlephotos.unwrap();
        assert_eq!(gp.cache_policy(), CachePolicy::Immutable);
        assert!(!gp.cache_policy().is_stale(Duration::from_secs(u32::MAX as u64)));

        gp.revalidate_after = Some(Duration::from_secs(60));
        let policy = gp.cache_policy();
        assert!(!policy.is_stale(Duration::from_secs(59)));
        assert!(policy.is_stale(Duration::from_secs(60)));
        assert!(CachePolicy::RevalidateAfter(Duration::ZERO).is_stale(Duration::ZERO));
    }
}
