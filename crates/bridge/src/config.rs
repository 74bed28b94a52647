use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::descriptor::ModuleDescriptor;
use crate::source::{self, CanonicalSourceName};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {origin}: {source}")]
    Parse {
        origin: String,
        source: toml::de::Error,
    },
}

/// Bridge configuration, usually `bridge.toml`:
///
/// ```toml
/// bundle = "http://localhost:8081/index.bundle?platform=ios"
///
/// [[module]]
/// name = "DevMenu"
/// config = { manifestUrl = "https://exp.host/@demo/app" }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct BridgeConfig {
    pub bundle: Option<String>,
    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleDescriptor>,
}

impl BridgeConfig {
    pub fn load() -> Self {
        let path = match Self::find_config_path() {
            Some(path) => path,
            None => return Self::default(),
        };

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("{}", err);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, &path.display().to_string())
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Self::parse(contents, "inline config")
    }

    fn parse(contents: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })
    }

    pub fn descriptors(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    pub fn bundle_source_name(&self) -> Option<CanonicalSourceName> {
        self.bundle.as_deref().map(source::canonicalize)
    }

    fn find_config_path() -> Option<PathBuf> {
        find_config_path_with(&|key| std::env::var_os(key).map(PathBuf::from), &|path| {
            path.exists()
        })
    }
}

fn find_config_path_with<Get, Exists>(env_get: &Get, exists: &Exists) -> Option<PathBuf>
where
    Get: Fn(&str) -> Option<PathBuf>,
    Exists: Fn(&Path) -> bool,
{
    if let Some(path) = env_get("BRIDGE_CONFIG") {
        if exists(&path) {
            return Some(path);
        }
        tracing::warn!("BRIDGE_CONFIG set but file not found: {}", path.display());
    }

    let mut candidates = vec![PathBuf::from("bridge.toml")];
    let config_home =
        env_get("XDG_CONFIG_HOME").or_else(|| env_get("HOME").map(|home| home.join(".config")));
    if let Some(dir) = config_home {
        candidates.push(dir.join("bridge").join("bridge.toml"));
    }

    candidates.into_iter().find(|path| exists(path))
}
