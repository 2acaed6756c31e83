use std::fmt;

use mlua::{Lua, LuaSerdeExt, Value};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PluginResult;

/// What a top-level binding holds after its script ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingKind {
    /// A table declared through the `class` builtin
    Class,
    Function,
    Table,
    String,
    Number,
    Boolean,
    Nil,
    Other,
}

impl BindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingKind::Class => "class",
            BindingKind::Function => "function",
            BindingKind::Table => "table",
            BindingKind::String => "string",
            BindingKind::Number => "number",
            BindingKind::Boolean => "boolean",
            BindingKind::Nil => "nil",
            BindingKind::Other => "other",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, BindingKind::Class | BindingKind::Function)
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value side of a binding as seen by an inclusion filter.
///
/// Besides the kind, a filter can look into the bound table:
///
/// ```ignore
/// OnlyIf::try_predicate(|_, b| Ok(b.is_class() && b.field::<u32>("version")? >= Some(2)))
/// ```
#[derive(Clone, Copy)]
pub struct Binding<'a> {
    pub kind: BindingKind,
    value: Option<(&'a Lua, &'a Value<'a>)>,
}

impl<'a> Binding<'a> {
    /// A binding known only by its kind
    pub fn new(kind: BindingKind) -> Self {
        Self { kind, value: None }
    }

    pub(crate) fn with_value(kind: BindingKind, lua: &'a Lua, value: &'a Value<'a>) -> Self {
        Self {
            kind,
            value: Some((lua, value)),
        }
    }

    pub fn is_class(&self) -> bool {
        self.kind == BindingKind::Class
    }

    /// The bound Lua value
    pub fn value(&self) -> Option<&'a Value<'a>> {
        self.value.map(|(_, value)| value)
    }

    /// Whether the bound table has `field`, inherited class members included.
    pub fn has_field(&self, field: &str) -> PluginResult<bool> {
        Ok(!matches!(self.lookup(field)?, Value::Nil))
    }

    /// Deserialize a data field of the bound table; `None` when absent.
    pub fn field<T: DeserializeOwned>(&self, field: &str) -> PluginResult<Option<T>> {
        let Some((lua, _)) = self.value else {
            return Ok(None);
        };
        match self.lookup(field)? {
            Value::Nil => Ok(None),
            value => Ok(Some(lua.from_value(value)?)),
        }
    }

    fn lookup(&self, field: &str) -> PluginResult<Value<'a>> {
        match self.value {
            Some((_, Value::Table(table))) => Ok(table.get(field)?),
            _ => Ok(Value::Nil),
        }
    }
}

impl fmt::Debug for Binding<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("kind", &self.kind)
            .field("value", &self.value.map(|(_, value)| value))
            .finish()
    }
}

type Predicate = Box<dyn Fn(&str, &Binding<'_>) -> PluginResult<bool>>;

/// Decides which bindings of an executed script become plugins.
///
/// `Classes` and `All` are deliberately distinct: `All` also keeps the
/// builtins every namespace starts with, `Classes` keeps only what the
/// script declared with `class`.
#[derive(Default)]
pub enum OnlyIf {
    #[default]
    Classes,
    All,
    Nothing,
    /// Classes whose binding name matches
    NameMatches(Regex),
    Predicate(Predicate),
}

impl OnlyIf {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str, &Binding<'_>) -> bool + 'static,
    {
        OnlyIf::Predicate(Box::new(move |name, binding| Ok(f(name, binding))))
    }

    /// A predicate that may fail; its error aborts the load unchanged.
    pub fn try_predicate<F>(f: F) -> Self
    where
        F: Fn(&str, &Binding<'_>) -> PluginResult<bool> + 'static,
    {
        OnlyIf::Predicate(Box::new(f))
    }

    pub fn retains(&self, name: &str, binding: &Binding<'_>) -> PluginResult<bool> {
        match self {
            OnlyIf::Classes => Ok(binding.is_class()),
            OnlyIf::All => Ok(true),
            OnlyIf::Nothing => Ok(false),
            OnlyIf::NameMatches(re) => Ok(binding.is_class() && re.is_match(name)),
            OnlyIf::Predicate(f) => f(name, binding),
        }
    }
}

impl From<bool> for OnlyIf {
    fn from(keep: bool) -> Self {
        if keep {
            OnlyIf::All
        } else {
            OnlyIf::Nothing
        }
    }
}

impl From<Regex> for OnlyIf {
    fn from(re: Regex) -> Self {
        OnlyIf::NameMatches(re)
    }
}

impl fmt::Debug for OnlyIf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnlyIf::Classes => f.write_str("Classes"),
            OnlyIf::All => f.write_str("All"),
            OnlyIf::Nothing => f.write_str("Nothing"),
            OnlyIf::NameMatches(re) => f.debug_tuple("NameMatches").field(&re.as_str()).finish(),
            OnlyIf::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}
