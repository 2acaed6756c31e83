use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PluginError, PluginResult};
use crate::plugins::OnlyIf;

/// Which bindings `PluginLoader::load` keeps when no filter is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterPolicy {
    /// Classes declared by the script
    #[default]
    Classes,
    /// Every top-level binding, builtins included
    All,
    /// Nothing at all
    #[serde(rename = "none")]
    Nothing,
}

/// Loader settings, usually read from a JSON file.
///
/// ```json
/// { "plugin_dir": "plugins/lua", "extension": "lua", "default_filter": "classes", "name_pattern": "^Net" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub plugin_dir: PathBuf,
    pub extension: String,
    pub default_filter: FilterPolicy,
    /// Only names matching this regex are kept by `load`
    pub name_pattern: Option<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            plugin_dir: PathBuf::from("plugins/lua"),
            extension: "lua".to_string(),
            default_filter: FilterPolicy::Classes,
            name_pattern: None,
        }
    }
}

impl LoaderConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> PluginResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PluginError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> PluginResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.name_regex()?;
        Ok(config)
    }

    /// Extension without a leading dot
    pub fn extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }

    /// Build the inclusion filter described by this configuration.
    pub fn only_if(&self) -> PluginResult<OnlyIf> {
        let pattern = self.name_regex()?;
        Ok(match (self.default_filter, pattern) {
            (FilterPolicy::Nothing, _) => OnlyIf::Nothing,
            (FilterPolicy::Classes, None) => OnlyIf::Classes,
            (FilterPolicy::Classes, Some(re)) => OnlyIf::NameMatches(re),
            (FilterPolicy::All, None) => OnlyIf::All,
            (FilterPolicy::All, Some(re)) => OnlyIf::predicate(move |name, _| re.is_match(name)),
        })
    }

    fn name_regex(&self) -> PluginResult<Option<Regex>> {
        self.name_pattern
            .as_deref()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| PluginError::Config(format!("invalid name_pattern {:?}: {}", p, e)))
            })
            .transpose()
    }
}
