//! Layered configuration with figment.
//!
//! Later layers win:
//!
//! 1. built-in defaults
//! 2. `memebot.{profile}.toml` next to the main file
//! 3. the main file (`memebot.toml`; YAML with the `yaml-config` feature)
//! 4. `MEMEBOT_SECTION__KEY` variables, e.g. `MEMEBOT_IMAGE_API__API_KEY`
//! 5. the variables older deployments used (`TG_BOT_TOKEN`, `ARK_API_KEY`, ...)
//! 6. [`ConfigLoader::set`] overrides
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .profile("prod")
//!     .file("./memebot.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::BotConfig;

/// Environment variables kept from earlier deployments, mapped onto the
/// schema. When two names map to the same key the later one wins.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("BOT_TOKEN", "telegram.token"),
    ("TG_BOT_TOKEN", "telegram.token"),
    ("DOUBAO_API_KEY", "image_api.api_key"),
    ("ARK_API_KEY", "image_api.api_key"),
    ("DOUBAO_IMAGE_MODEL", "image_api.model"),
    ("DOUBAO_IMAGE_URL", "image_api.endpoint"),
    ("TOS_ENDPOINT", "storage.endpoint"),
    ("TOS_BUCKET", "storage.bucket"),
    ("TOS_ACCESS_KEY", "storage.access_token"),
];

/// Selects the `memebot.{profile}.toml` layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name; `prod` and `dev` are accepted as short forms.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `MEMEBOT_PROFILE`, defaulting to Development.
    pub fn from_env() -> Self {
        std::env::var("MEMEBOT_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Layered configuration loader.
///
/// The main file is either given with [`file`](Self::file) or found as the
/// first `memebot.*`/`config.*` file in the search paths. A sibling named
/// after the profile (`memebot.production.toml`) is merged underneath it.
pub struct ConfigLoader {
    /// Programmatic overrides, merged last.
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory to look for the main file in.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds `~/.config/memebot` (or the platform equivalent).
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join("memebot")),
            None => self,
        }
    }

    /// Loads exactly this file instead of searching; it must exist.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Skips `MEMEBOT_*` and the legacy variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Overrides one key, e.g. `.set("dispatch.max_concurrency", 2)`.
    pub fn set<T: serde::Serialize>(mut self, key: &str, value: T) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    pub fn load(self) -> ConfigResult<BotConfig> {
        let profile = self.profile.clone();
        let config: BotConfig = self.build_figment()?.extract().map_err(|e| {
            ConfigError::ParseError(format!("Failed to extract configuration: {e}"))
        })?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            sections = ?config.sections.keys().collect::<Vec<_>>(),
            "Configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(BotConfig::default()));

        match self.main_file()? {
            Some(path) => {
                let sibling = self.profile_sibling(&path);
                if sibling.is_file() {
                    debug!(path = %sibling.display(), "Loading profile config");
                    figment = merge_file(figment, &sibling)?;
                }
                info!(path = %path.display(), "Loading configuration file");
                figment = merge_file(figment, &path)?;
            }
            None => warn!(paths = ?self.search_paths, "No configuration file found, using defaults"),
        }

        if self.load_env {
            figment = merge_env(figment);
        }

        let overrides = std::mem::take(&mut self.overrides);
        Ok(figment.merge(overrides))
    }

    fn main_file(&self) -> ConfigResult<Option<PathBuf>> {
        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            return Ok(Some(path.clone()));
        }

        let mut search_paths = self.search_paths.clone();
        if search_paths.is_empty() {
            search_paths = Self::new().with_current_dir().with_user_config_dir().search_paths;
        }
        Ok(search_paths
            .iter()
            .flat_map(|dir| FILE_NAMES.iter().map(move |name| dir.join(name)))
            .find(|path| path.is_file()))
    }

    /// `memebot.toml` → `memebot.{profile}.toml` in the same directory.
    fn profile_sibling(&self, path: &Path) -> PathBuf {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("memebot");
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
        path.with_file_name(format!("{stem}.{}.{ext}", self.profile.as_str()))
    }
}

/// Main file names, in search order, for the enabled formats.
const FILE_NAMES: &[&str] = &[
    #[cfg(feature = "toml-config")]
    "memebot.toml",
    #[cfg(feature = "yaml-config")]
    "memebot.yaml",
    #[cfg(feature = "yaml-config")]
    "memebot.yml",
    #[cfg(feature = "toml-config")]
    "config.toml",
    #[cfg(feature = "yaml-config")]
    "config.yaml",
    #[cfg(feature = "yaml-config")]
    "config.yml",
];

/// Merges one file, picking the provider by extension.
fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        ext => Err(ConfigError::ParseError(format!(
            "Unsupported or disabled configuration file format: .{ext}"
        ))),
    }
}

/// `MEMEBOT_SECTION__KEY` variables, then the legacy names.
fn merge_env(figment: Figment) -> Figment {
    trace!("Loading environment variables with MEMEBOT_ prefix");
    let mut figment = figment.merge(
        Env::prefixed("MEMEBOT_")
            .ignore(&["PROFILE"])
            .split("__")
            .map(|key| key.as_str().replace("__", ".").into()),
    );
    for (var, key) in LEGACY_ENV {
        if let Ok(value) = std::env::var(var)
            && !value.is_empty()
        {
            debug!(var, key, "Applying legacy environment variable");
            figment = figment.merge(Serialized::default(key, value));
        }
    }
    figment
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("memebot-config-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_default_config() {
        let config = ConfigLoader::new()
            .search_path(scratch_dir("empty"))
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.dispatch.max_concurrency, 8);
        assert!(config.sections.is_empty());
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("prod"), Profile::Production);
        assert_eq!(Profile::parse("DEV"), Profile::Development);
        assert_eq!(Profile::parse("staging"), Profile::Custom("staging".into()));
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_profile_file_under_main_file() {
        let dir = scratch_dir("layers");
        std::fs::write(
            dir.join("memebot.toml"),
            "[dispatch]\nmax_concurrency = 4\n\n[telegram]\ntoken = \"main\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("memebot.production.toml"),
            "[dispatch]\nmax_concurrency = 2\ndefault_deadline_ms = 5000\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .profile("production")
            .search_path(&dir)
            .without_env()
            .load()
            .unwrap();

        // The main file wins over the profile file; untouched keys survive.
        assert_eq!(config.dispatch.max_concurrency, 4);
        assert_eq!(config.dispatch.default_deadline_ms, 5000);
        assert!(config.has_section("telegram"));
    }

    #[test]
    fn test_overrides_win() {
        let config = ConfigLoader::new()
            .search_path(scratch_dir("overrides"))
            .without_env()
            .set("pipeline.stage_max_attempts", 5)
            .load()
            .unwrap();
        assert_eq!(config.pipeline.stage_max_attempts, 5);
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_explicit_file_takes_profile_sibling() {
        let dir = scratch_dir("explicit");
        let main = dir.join("bot.toml");
        std::fs::write(&main, "[dispatch]\nmax_concurrency = 3\n").unwrap();
        std::fs::write(
            dir.join("bot.staging.toml"),
            "[dispatch]\nmax_concurrency = 1\ndefault_deadline_ms = 7000\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .profile("staging")
            .file(&main)
            .without_env()
            .load()
            .unwrap();
        assert_eq!(config.dispatch.max_concurrency, 3);
        assert_eq!(config.dispatch.default_deadline_ms, 7000);
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = ConfigLoader::new()
            .file("/definitely/not/here/memebot.toml")
            .without_env()
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
