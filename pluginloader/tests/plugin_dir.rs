//! Directory scanning and the bundled sample plugins.

use std::fs;
use std::path::PathBuf;

use pluginloader::{Args, FilterPolicy, LoaderConfig, OnlyIf, PluginError, PluginLoader};
use tempfile::TempDir;

fn sample_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../plugins/lua")
}

fn sample_loader() -> PluginLoader {
    let config = LoaderConfig {
        plugin_dir: sample_dir(),
        ..LoaderConfig::default()
    };
    PluginLoader::with_config(config).unwrap()
}

#[test]
fn test_load_sample_plugins() {
    let mut loader = sample_loader();

    let report = loader.load_plugins().unwrap();

    assert_eq!(report.loaded.len(), 2);
    assert!(report.failed.is_empty());
    assert_eq!(loader.names(), vec!["Counter", "Greeter"]);
}

#[test]
fn test_sample_greeter() {
    let mut loader = sample_loader();
    loader.load_plugins().unwrap();

    let greeter = loader.construct("Greeter", Args::new().named("name", "world")).unwrap();
    assert_eq!(greeter.type_name(), "Greeter");
    assert_eq!(greeter.call_method::<String>("greet", Args::new()).unwrap(), "Hello, world!");

    let custom = loader.construct("Greeter", Args::new().arg("Ada").named("greeting", "Hi")).unwrap();
    assert_eq!(custom.call_method::<String>("greet", Args::new()).unwrap(), "Hi, Ada!");
}

#[test]
fn test_sample_counter() {
    let mut loader = sample_loader();
    loader.load_plugins().unwrap();

    let counter = loader.construct("Counter", Args::new().arg(10)).unwrap();
    assert_eq!(counter.call_method::<i64>("increment", Args::new()).unwrap(), 11);
    assert_eq!(counter.call_method::<i64>("increment", Args::new().named("step", 4)).unwrap(), 15);
    assert_eq!(counter.get::<i64>("value").unwrap(), 15);
}

#[test]
fn test_factory_functions_construct_instances() {
    let mut loader = sample_loader();
    loader.load_file(sample_dir().join("counter.lua"), true).unwrap();

    let counter = loader.construct("new_counter", Args::new().named("start", 3)).unwrap();

    assert_eq!(counter.type_name(), "Counter");
    assert_eq!(counter.get::<i64>("value").unwrap(), 3);
}

#[test]
fn test_dir_scan_skips_failures_and_other_extensions() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a_good.lua"), "Good = class()").unwrap();
    fs::write(dir.path().join("b_broken.lua"), "Broken = class(").unwrap();
    fs::write(dir.path().join("c_notes.txt"), "Ignored = class()").unwrap();
    let mut loader = PluginLoader::new().unwrap();

    let report = loader.load_dir(dir.path()).unwrap();

    assert_eq!(report.loaded, vec![dir.path().join("a_good.lua")]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, dir.path().join("b_broken.lua"));
    assert!(matches!(report.failed[0].1, PluginError::Lua(_)));
    assert_eq!(loader.names(), vec!["Good"]);
}

#[test]
fn test_missing_dir_is_io_error() {
    let mut loader = PluginLoader::new().unwrap();

    let err = loader.load_dir("/no/such/plugins").unwrap_err();

    assert!(matches!(err, PluginError::Io(_)));
}

#[test]
fn test_configured_policy_applies_to_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plugin.lua");
    fs::write(&path, "Foo = class()\nlimit = 2\n").unwrap();
    let config = LoaderConfig {
        default_filter: FilterPolicy::All,
        ..LoaderConfig::default()
    };
    let mut loader = PluginLoader::with_config(config).unwrap();

    loader.load(&path).unwrap();

    assert_eq!(loader.names(), vec!["Foo", "class", "limit"]);
}

#[test]
fn test_unload_all() {
    let mut loader = sample_loader();
    loader.load_plugins().unwrap();
    let counter = loader.get("Counter").unwrap().clone();

    loader.unload_all().unwrap();

    assert!(loader.is_empty());
    assert!(loader.loaded_files().is_empty());
    let instance = counter.construct(Args::new().arg(1)).unwrap();
    assert_eq!(instance.get::<i64>("value").unwrap(), 1);

    loader.load_file(sample_dir().join("greeter.lua"), OnlyIf::default()).unwrap();
    assert_eq!(loader.names(), vec!["Greeter"]);
}
