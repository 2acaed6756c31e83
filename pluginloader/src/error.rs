//! Plugin loader error types

use thiserror::Error;

/// Errors raised while loading plugin files or constructing plugins.
///
/// I/O and interpreter errors are passed through untouched so callers see
/// exactly what reading or executing the file produced.
#[derive(Error, Debug)]
pub enum PluginError {
    /// Reading a plugin file or directory failed
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The script failed to parse or raised while running
    #[error(transparent)]
    Lua(#[from] mlua::Error),

    /// Invalid loader configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Loader configuration is not valid JSON
    #[error("Invalid loader configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// No plugin registered under this name
    #[error("Plugin not found: {0}")]
    UnknownPlugin(String),

    /// The binding holds a value that cannot produce instances
    #[error("{name} is not constructible")]
    NotConstructible { name: String },

    #[error("{name}() got an unexpected keyword argument '{arg}'")]
    UnexpectedArgument { name: String, arg: String },

    #[error("{name}() got multiple values for argument '{arg}'")]
    DuplicateArgument { name: String, arg: String },

    #[error("{name}() takes {expected} positional arguments but {given} were given")]
    TooManyArguments {
        name: String,
        expected: usize,
        given: usize,
    },

    /// Raised by an inclusion predicate while deciding on a binding
    #[error("Predicate failed on {name}: {message}")]
    Predicate { name: String, message: String },
}

pub type PluginResult<T> = Result<T, PluginError>;

impl PluginError {
    /// Build a predicate failure for `name`
    pub fn predicate(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Predicate {
            name: name.into(),
            message: message.into(),
        }
    }
}
