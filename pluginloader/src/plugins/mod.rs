use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use mlua::Value;
use tracing::{debug, info, warn};

use crate::config::LoaderConfig;
use crate::error::{PluginError, PluginResult};

mod constructor;
mod filter;
mod lua_plugin;

pub use constructor::{Args, Constructor, Instance};
pub use filter::{Binding, BindingKind, OnlyIf};
use lua_plugin::LuaRuntime;

/// Outcome of scanning a plugin directory.
#[derive(Debug, Default)]
pub struct DirLoadReport {
    pub loaded: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, PluginError)>,
}

/// Loads plugin scripts and keeps the constructors they define.
///
/// ```ignore
/// let mut loader = PluginLoader::new()?;
/// loader.load_file("plugins/lua/greeter.lua", OnlyIf::default())?;
/// let greeter = loader.construct("Greeter", Args::new().named("name", "world"))?;
/// ```
pub struct PluginLoader {
    plugins: HashMap<String, Constructor>,
    loaded_files: Vec<PathBuf>,
    config: LoaderConfig,
    runtime: LuaRuntime,
}

impl PluginLoader {
    pub fn new() -> PluginResult<Self> {
        Self::with_config(LoaderConfig::default())
    }

    pub fn with_config(config: LoaderConfig) -> PluginResult<Self> {
        Ok(Self {
            plugins: HashMap::new(),
            loaded_files: Vec::new(),
            config,
            runtime: LuaRuntime::new()?,
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn plugins(&self) -> &HashMap<String, Constructor> {
        &self.plugins
    }

    pub fn get(&self, name: &str) -> Option<&Constructor> {
        self.plugins.get(name)
    }

    /// Plugin names in ascending order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn loaded_files(&self) -> &[PathBuf] {
        &self.loaded_files
    }

    /// Execute `path` in a fresh namespace and keep the bindings `only_if` accepts.
    ///
    /// Bindings are visited in ascending name order and committed one at a
    /// time, so a failing predicate leaves the earlier names in place. Read and
    /// execution errors are returned before anything is committed. Names
    /// already present are replaced.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P, only_if: impl Into<OnlyIf>) -> PluginResult<()> {
        let path = path.as_ref();
        let only_if = only_if.into();
        let namespace = self.runtime.execute(path)?;

        let mut retained = 0usize;
        for (name, value) in lua_plugin::bindings(&namespace)? {
            let kind = self.runtime.kind_of(&value)?;
            if !only_if.retains(&name, &Binding::with_value(kind, &self.runtime.lua, &value))? {
                debug!(plugin = %name, %kind, "skipping binding");
                continue;
            }
            // classes assigned to a global are already named; this covers the rest
            if let Value::Table(class) = &value {
                if kind == BindingKind::Class {
                    lua_plugin::record_type_name(class, &name)?;
                }
            }
            let constructor = Constructor::new(&self.runtime, name.clone(), kind, value)?;
            if self.plugins.insert(name.clone(), constructor).is_some() {
                debug!(plugin = %name, "replacing previously loaded plugin");
            } else {
                debug!(plugin = %name, %kind, "registered plugin");
            }
            retained += 1;
        }

        info!(path = %path.display(), retained, "loaded plugin file");
        self.loaded_files.push(path.to_path_buf());
        Ok(())
    }

    /// `load_file` with the filter from the loader configuration.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> PluginResult<()> {
        let only_if = self.config.only_if()?;
        self.load_file(path, only_if)
    }

    /// Load every file with the configured extension in `dir`.
    ///
    /// A file that fails to load is reported and skipped.
    pub fn load_dir<P: AsRef<Path>>(&mut self, dir: P) -> PluginResult<DirLoadReport> {
        let dir = dir.as_ref();
        let ext = self.config.extension().to_string();
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(ext.as_str()))
            .collect();
        paths.sort();

        let mut report = DirLoadReport::default();
        for path in paths {
            match self.load(&path) {
                Ok(()) => report.loaded.push(path),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load plugin file");
                    report.failed.push((path, e));
                }
            }
        }
        Ok(report)
    }

    /// Load the configured plugin directory.
    pub fn load_plugins(&mut self) -> PluginResult<DirLoadReport> {
        let dir = self.config.plugin_dir.clone();
        self.load_dir(dir)
    }

    pub fn construct(&self, name: &str, args: Args) -> PluginResult<Instance> {
        self.get(name)
            .ok_or_else(|| PluginError::UnknownPlugin(name.to_string()))?
            .construct(args)
    }

    /// Drop every plugin and start over with a new interpreter.
    pub fn unload_all(&mut self) -> PluginResult<()> {
        self.runtime = LuaRuntime::new()?;
        self.plugins.clear();
        self.loaded_files.clear();
        Ok(())
    }
}
