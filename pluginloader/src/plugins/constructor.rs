use std::fmt;
use std::rc::Rc;

use mlua::{Function, Lua, LuaSerdeExt, MultiValue, RegistryKey, Table, Value};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::{PluginError, PluginResult};
use crate::plugins::filter::BindingKind;
use crate::plugins::lua_plugin::{self, LuaRuntime};

/// Arguments forwarded to a plugin constructor or method.
///
/// Named arguments are matched against the Lua parameter names, so
/// `Args::new().arg(5)` and `Args::new().named("a", 5)` reach `init(self, a)`
/// the same way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    positional: Vec<JsonValue>,
    named: Vec<(String, JsonValue)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<JsonValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.named.push((name.into(), value.into()));
        self
    }

    pub fn positional_args(&self) -> &[JsonValue] {
        &self.positional
    }

    pub fn named_args(&self) -> &[(String, JsonValue)] {
        &self.named
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// Lay out positional and named arguments in parameter order.
///
/// Unfilled parameters get `nil`. Extra positionals are only accepted when
/// the callee takes varargs.
fn bind_arguments<T: Clone>(
    callee: &str,
    params: &[String],
    vararg: bool,
    positional: Vec<T>,
    named: Vec<(String, T)>,
    nil: T,
) -> PluginResult<Vec<T>> {
    if !vararg && positional.len() > params.len() {
        return Err(PluginError::TooManyArguments {
            name: callee.to_string(),
            expected: params.len(),
            given: positional.len(),
        });
    }

    let mut slots: Vec<Option<T>> = positional.into_iter().map(Some).collect();
    for (arg, value) in named {
        let index = params
            .iter()
            .position(|p| *p == arg)
            .ok_or_else(|| PluginError::UnexpectedArgument {
                name: callee.to_string(),
                arg: arg.clone(),
            })?;
        if slots.len() <= index {
            slots.resize(index + 1, None);
        }
        if slots[index].is_some() {
            return Err(PluginError::DuplicateArgument {
                name: callee.to_string(),
                arg,
            });
        }
        slots[index] = Some(value);
    }

    Ok(slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| nil.clone()))
        .collect())
}

fn json_to_lua<'lua>(lua: &'lua Lua, value: &JsonValue) -> mlua::Result<Value<'lua>> {
    match value {
        JsonValue::Null => Ok(Value::Nil),
        other => lua.to_value(other),
    }
}

/// How the callee receives its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallStyle {
    /// The first parameter is the receiver, whatever it is called
    Method,
    Function,
}

/// Resolve `args` against `f`'s parameters.
fn resolve_args<'lua>(
    lua: &'lua Lua,
    callee: &str,
    f: Option<&Function<'lua>>,
    style: CallStyle,
    args: &Args,
) -> PluginResult<MultiValue<'lua>> {
    let (mut params, vararg) = match f {
        Some(f) => lua_plugin::parameters(lua, f)?,
        None => (Vec::new(), false),
    };
    if style == CallStyle::Method && !params.is_empty() {
        params.remove(0);
    }

    let positional = args
        .positional
        .iter()
        .map(|v| json_to_lua(lua, v))
        .collect::<mlua::Result<Vec<_>>>()?;
    let named = args
        .named
        .iter()
        .map(|(k, v)| -> mlua::Result<(String, Value<'lua>)> { Ok((k.clone(), json_to_lua(lua, v)?)) })
        .collect::<mlua::Result<Vec<_>>>()?;

    let values = bind_arguments(callee, &params, vararg, positional, named, Value::Nil)?;
    Ok(MultiValue::from_vec(values))
}

/// A named entry of a loaded plugin file.
///
/// Holds the Lua value through the registry, so it outlives the loader that
/// produced it and keeps its interpreter alive.
#[derive(Clone)]
pub struct Constructor {
    name: String,
    kind: BindingKind,
    lua: Rc<Lua>,
    key: Rc<RegistryKey>,
}

impl Constructor {
    pub(crate) fn new(
        runtime: &LuaRuntime,
        name: String,
        kind: BindingKind,
        value: Value,
    ) -> PluginResult<Self> {
        let key = runtime.lua.create_registry_value(value)?;
        Ok(Self {
            name,
            kind,
            lua: Rc::clone(&runtime.lua),
            key: Rc::new(key),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    pub fn is_class(&self) -> bool {
        self.kind == BindingKind::Class
    }

    /// Build a new instance.
    ///
    /// Classes are instantiated and their `init` runs with `args`. Plain
    /// functions act as factories and must return a table.
    pub fn construct(&self, args: Args) -> PluginResult<Instance> {
        let lua = &*self.lua;
        let value: Value = lua.registry_value(&self.key)?;
        let instance = match value {
            Value::Table(class) if lua_plugin::is_class(lua, &class)? => {
                let init = match class.get::<_, Value>("init")? {
                    Value::Function(init) => Some(init),
                    _ => None,
                };
                let call_args = resolve_args(lua, &self.name, init.as_ref(), CallStyle::Method, &args)?;
                lua_plugin::instantiate(lua, class, call_args)?
            }
            Value::Function(factory) => {
                let call_args = resolve_args(lua, &self.name, Some(&factory), CallStyle::Function, &args)?;
                match factory.call::<_, Value>(call_args)? {
                    Value::Table(instance) => instance,
                    _ => {
                        return Err(PluginError::NotConstructible {
                            name: self.name.clone(),
                        })
                    }
                }
            }
            _ => {
                return Err(PluginError::NotConstructible {
                    name: self.name.clone(),
                })
            }
        };
        Instance::new(Rc::clone(&self.lua), instance, &self.name)
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// An object produced by a plugin constructor.
pub struct Instance {
    type_name: String,
    lua: Rc<Lua>,
    key: RegistryKey,
}

impl Instance {
    fn new(lua: Rc<Lua>, table: Table, fallback_name: &str) -> PluginResult<Self> {
        let type_name = match table.get_metatable() {
            Some(class) => lua_plugin::type_name_of(&class)?,
            None => None,
        }
        .unwrap_or_else(|| fallback_name.to_string());
        let key = lua.create_registry_value(table)?;
        Ok(Self { type_name, lua, key })
    }

    /// Name of the class this instance was built from
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Read a field, looking through the class for missing keys.
    pub fn get<T: DeserializeOwned>(&self, field: &str) -> PluginResult<T> {
        let table: Table = self.lua.registry_value(&self.key)?;
        let value: Value = table.get(field)?;
        Ok(self.lua.from_value(value)?)
    }

    /// Call `instance:method(...)` and deserialize its first result.
    pub fn call_method<T: DeserializeOwned>(&self, method: &str, args: Args) -> PluginResult<T> {
        let lua = &*self.lua;
        let table: Table = lua.registry_value(&self.key)?;
        let f: Function = table.get(method)?;
        let callee = format!("{}.{}", self.type_name, method);
        let mut call_args = resolve_args(lua, &callee, Some(&f), CallStyle::Method, &args)?.into_vec();
        call_args.insert(0, Value::Table(table));
        let result: Value = f.call(MultiValue::from_vec(call_args))?;
        Ok(lua.from_value(result)?)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_positional_and_named_agree() {
        let p = params(&["a", "b"]);
        let by_position = bind_arguments("Foo", &p, false, vec![1, 2], vec![], 0).unwrap();
        let by_name =
            bind_arguments("Foo", &p, false, vec![], vec![("b".into(), 2), ("a".into(), 1)], 0)
                .unwrap();
        assert_eq!(by_position, vec![1, 2]);
        assert_eq!(by_name, by_position);
    }

    #[test]
    fn test_gaps_are_filled_with_nil() {
        let p = params(&["a", "b", "c"]);
        let slots = bind_arguments("Foo", &p, false, vec![], vec![("c".into(), 3)], 0).unwrap();
        assert_eq!(slots, vec![0, 0, 3]);
    }

    #[test]
    fn test_unknown_keyword() {
        let err = bind_arguments("Foo", &params(&["a"]), false, vec![], vec![("z".into(), 1)], 0)
            .unwrap_err();
        assert_eq!(err.to_string(), "Foo() got an unexpected keyword argument 'z'");
    }

    #[test]
    fn test_duplicate_keyword() {
        let err = bind_arguments("Foo", &params(&["a"]), false, vec![1], vec![("a".into(), 2)], 0)
            .unwrap_err();
        assert!(matches!(err, PluginError::DuplicateArgument { .. }));
    }

    #[test]
    fn test_too_many_positionals() {
        let err = bind_arguments("Foo", &params(&["a"]), false, vec![1, 2], vec![], 0).unwrap_err();
        assert!(matches!(
            err,
            PluginError::TooManyArguments { expected: 1, given: 2, .. }
        ));
        let slots = bind_arguments("Foo", &params(&["a"]), true, vec![1, 2], vec![], 0).unwrap();
        assert_eq!(slots, vec![1, 2]);
    }

    #[test]
    fn test_args_builder() {
        let args = Args::new().arg(5).named("name", "scanner").arg(JsonValue::Null);
        assert_eq!(args.positional_args(), &[JsonValue::from(5), JsonValue::Null]);
        assert_eq!(args.named_args()[0].0, "name");
        assert!(!args.is_empty());
        assert!(Args::new().is_empty());
    }
}
