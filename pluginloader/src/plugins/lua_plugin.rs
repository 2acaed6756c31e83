use mlua::{Function, Lua, LuaOptions, MultiValue, StdLib, Table, Value};
use std::fs;
use std::path::Path;
use std::rc::Rc;

use crate::error::PluginResult;
use crate::plugins::filter::BindingKind;

/// Name of the builtin every plugin namespace starts with.
pub const CLASS_BUILTIN: &str = "class";

const CLASS_META_KEY: &str = "pluginloader.class_meta";
const CLASS_BUILTIN_KEY: &str = "pluginloader.class";
const PARAM_NAMES_KEY: &str = "pluginloader.param_names";
const BIND_GLOBAL_KEY: &str = "pluginloader.bind_global";

/// Field holding a class's base class
pub const BASE_FIELD: &str = "__base";

const PARAM_NAMES_SRC: &str = r#"
local getinfo, getlocal = debug.getinfo, debug.getlocal
return function(f)
    local info = getinfo(f, "u")
    local names = {}
    for i = 1, info.nparams do
        names[i] = getlocal(f, i)
    end
    return names, info.isvararg
end
"#;

/// One Lua state shared by every file a loader executes.
///
/// Scripts never see the host globals table directly: each file runs with its
/// own environment table that falls back to the globals for reads only.
pub struct LuaRuntime {
    pub lua: Rc<Lua>,
}

impl LuaRuntime {
    pub fn new() -> PluginResult<Self> {
        // SAFETY: unsafe_new_with turns off mlua's safe mode, which loads the
        // debug library and lets scripts load C modules. register_api removes
        // debug (kept only inside the parameter-name helper), package.loadlib,
        // package.cpath and the C searchers before any script runs.
        let lua = unsafe { Lua::unsafe_new_with(StdLib::ALL_SAFE | StdLib::DEBUG, LuaOptions::new()) };
        let runtime = LuaRuntime { lua: Rc::new(lua) };
        runtime.register_api()?;
        Ok(runtime)
    }

    fn register_api(&self) -> PluginResult<()> {
        let lua = &*self.lua;

        let param_names: Function = lua.load(PARAM_NAMES_SRC).set_name("=param_names").eval()?;
        lua.set_named_registry_value(PARAM_NAMES_KEY, param_names)?;
        let globals = lua.globals();
        globals.raw_set("debug", Value::Nil)?;
        let package: Table = globals.get("package")?;
        let loaded: Table = package.get("loaded")?;
        loaded.raw_set("debug", Value::Nil)?;
        package.raw_set("loadlib", Value::Nil)?;
        package.raw_set("cpath", "")?;
        // only the preload and Lua file searchers stay
        let searchers: Table = package.get("searchers")?;
        for i in (3..=searchers.raw_len()).rev() {
            searchers.raw_set(i, Value::Nil)?;
        }

        let class_meta = lua.create_table()?;
        class_meta.raw_set(
            "__call",
            lua.create_function(|lua, (class, args): (Table, MultiValue)| instantiate(lua, class, args))?,
        )?;
        class_meta.raw_set("__index", lua.create_function(inherited)?)?;
        lua.set_named_registry_value(CLASS_META_KEY, class_meta)?;

        let class_builtin = lua.create_function(declare_class)?;
        lua.set_named_registry_value(CLASS_BUILTIN_KEY, class_builtin)?;

        let newindex = lua.create_function(bind_global)?;
        lua.set_named_registry_value(BIND_GLOBAL_KEY, newindex)?;
        Ok(())
    }

    /// Read `path` and run it in a fresh namespace, returning that namespace.
    pub fn execute(&self, path: &Path) -> PluginResult<Table<'_>> {
        let code = fs::read_to_string(path)?;
        self.execute_chunk(&format!("@{}", path.display()), &code)
    }

    pub fn execute_chunk(&self, chunk_name: &str, code: &str) -> PluginResult<Table<'_>> {
        let namespace = self.new_namespace()?;
        self.lua
            .load(code)
            .set_name(chunk_name)
            .set_environment(namespace.clone())
            .exec()?;
        Ok(namespace)
    }

    fn new_namespace(&self) -> mlua::Result<Table<'_>> {
        let lua = &*self.lua;
        let namespace = lua.create_table()?;
        let class_builtin: Function = lua.named_registry_value(CLASS_BUILTIN_KEY)?;
        namespace.raw_set(CLASS_BUILTIN, class_builtin)?;

        let fallback = lua.create_table()?;
        fallback.raw_set("__index", lua.globals())?;
        let newindex: Function = lua.named_registry_value(BIND_GLOBAL_KEY)?;
        fallback.raw_set("__newindex", newindex)?;
        namespace.set_metatable(Some(fallback));
        Ok(namespace)
    }

    pub fn kind_of(&self, value: &Value) -> mlua::Result<BindingKind> {
        Ok(match value {
            Value::Table(t) if is_class(&self.lua, t)? => BindingKind::Class,
            Value::Table(_) => BindingKind::Table,
            Value::Function(_) => BindingKind::Function,
            Value::String(_) => BindingKind::String,
            Value::Integer(_) | Value::Number(_) => BindingKind::Number,
            Value::Boolean(_) => BindingKind::Boolean,
            Value::Nil => BindingKind::Nil,
            _ => BindingKind::Other,
        })
    }
}

/// String-keyed entries of `namespace`, sorted by name.
pub fn bindings<'lua>(namespace: &Table<'lua>) -> mlua::Result<Vec<(String, Value<'lua>)>> {
    let mut found = Vec::new();
    for pair in namespace.clone().pairs::<Value, Value>() {
        let (key, value) = pair?;
        if let Value::String(name) = key {
            found.push((name.to_string_lossy().into_owned(), value));
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

pub fn is_class(lua: &Lua, table: &Table) -> mlua::Result<bool> {
    let class_meta: Table = lua.named_registry_value(CLASS_META_KEY)?;
    Ok(table.get_metatable().map_or(false, |meta| meta == class_meta))
}

/// Give a class `name` as its type name, unless it already has one.
///
/// Namespaces call this on the first assignment of a class to a global, so
/// `Foo = class()` names the class `Foo` and a later `Alias = Foo` does not
/// rename it.
pub fn record_type_name(class: &Table, name: &str) -> mlua::Result<()> {
    if let Value::Nil = class.raw_get::<_, Value>("__name")? {
        class.raw_set("__name", name)?;
    }
    Ok(())
}

pub fn type_name_of(class: &Table) -> mlua::Result<Option<String>> {
    class.raw_get("__name")
}

/// Parameter names of a Lua function and whether it takes varargs.
pub fn parameters(lua: &Lua, f: &Function) -> mlua::Result<(Vec<String>, bool)> {
    let helper: Function = lua.named_registry_value(PARAM_NAMES_KEY)?;
    helper.call(f.clone())
}

/// `__newindex` of every namespace: stamps classes with the global they are
/// first assigned to.
fn bind_global<'lua>(
    lua: &'lua Lua,
    (namespace, key, value): (Table<'lua>, Value<'lua>, Value<'lua>),
) -> mlua::Result<()> {
    if let (Value::String(name), Value::Table(class)) = (&key, &value) {
        if is_class(lua, class)? {
            record_type_name(class, &name.to_string_lossy())?;
        }
    }
    namespace.raw_set(key, value)
}

/// `__index` of the class metatable: missing class members come from the
/// base class, given as `__base` or as an `__index` table other than the class.
fn inherited<'lua>(_: &'lua Lua, (class, key): (Table<'lua>, Value<'lua>)) -> mlua::Result<Value<'lua>> {
    if let Value::Table(base) = class.raw_get::<_, Value>(BASE_FIELD)? {
        return base.get(key);
    }
    match class.raw_get::<_, Value>("__index")? {
        Value::Table(parent) if parent != class => parent.get(key),
        _ => Ok(Value::Nil),
    }
}

/// `class([body [, base]])`
fn declare_class<'lua>(
    lua: &'lua Lua,
    (body, base): (Option<Table<'lua>>, Option<Table<'lua>>),
) -> mlua::Result<Table<'lua>> {
    let class = match body {
        Some(body) => body,
        None => lua.create_table()?,
    };
    if let Some(base) = base {
        class.raw_set(BASE_FIELD, base)?;
    }
    if let Value::Nil = class.raw_get::<_, Value>("__index")? {
        class.raw_set("__index", class.clone())?;
    }
    let class_meta: Table = lua.named_registry_value(CLASS_META_KEY)?;
    class.set_metatable(Some(class_meta));
    Ok(class)
}

/// Create an instance of `class` and run its `init` with `args`.
pub fn instantiate<'lua>(
    lua: &'lua Lua,
    class: Table<'lua>,
    args: MultiValue<'lua>,
) -> mlua::Result<Table<'lua>> {
    let instance = lua.create_table()?;
    instance.set_metatable(Some(class.clone()));
    match class.get::<_, Value>("init")? {
        Value::Function(init) => {
            let mut call_args = vec![Value::Table(instance.clone())];
            call_args.extend(args);
            init.call::<_, ()>(MultiValue::from_vec(call_args))?;
        }
        _ if args.is_empty() => {}
        _ => {
            let name = type_name_of(&class)?.unwrap_or_else(|| CLASS_BUILTIN.to_string());
            return Err(mlua::Error::RuntimeError(format!("{}() takes no arguments", name)));
        }
    }
    Ok(instance)
}
