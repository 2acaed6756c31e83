//! Load plugin classes from Lua scripts.
//!
//! Each plugin file runs in its own namespace table. Classes the script
//! declares with the `class` builtin become named [`Constructor`]s:
//!
//! ```lua
//! Greeter = class()
//!
//! function Greeter:init(name)
//!     self.name = name
//! end
//! ```
//!
//! ```ignore
//! use pluginloader::{Args, OnlyIf, PluginLoader};
//!
//! let mut loader = PluginLoader::new()?;
//! loader.load_file("greeter.lua", OnlyIf::default())?;
//! let greeter = loader.construct("Greeter", Args::new().named("name", "world"))?;
//! assert_eq!(greeter.type_name(), "Greeter");
//! ```
//!
//! Which bindings are kept is controlled by [`OnlyIf`]: classes only (the
//! default), `true` for every binding including the namespace builtins,
//! `false` for none, or a predicate over the name and [`Binding`].

pub mod config;
pub mod error;
pub mod plugins;

pub use config::{FilterPolicy, LoaderConfig};
pub use error::{PluginError, PluginResult};
pub use plugins::{Args, Binding, BindingKind, Constructor, DirLoadReport, Instance, OnlyIf, PluginLoader};
