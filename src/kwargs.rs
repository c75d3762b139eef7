//! Resolution of JSON argument objects into typed keyword arguments.
//!
//! A JSON object such as `{"Ecut": 10, "kgrid": [2, 2, 2]}` becomes a [`Kwargs`]
//! bag whose values are [`ArgValue`]s. Two things are special:
//!
//! * an object carrying `$function` (and optionally `$kwargs`) is kept as a
//!   [`Directive`] and never flattened into an ordinary nested bag;
//! * a string equal to a name in the [`Interpolation`] table is replaced by the
//!   live object registered under that name (the same `Arc`, not a copy).
//!
//! Conversion to concrete Rust types happens on extraction through [`FromArg`],
//! so the destination decides whether `[0.0, 0.5, 0.5]` is a list of numbers,
//! a `Vector3<f64>` or a position in bohr.

use crate::error::{JobError, Result};
use crate::units::Bohr;
use nalgebra::Vector3;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

pub const FUNCTION_KEY: &str = "$function";
pub const KWARGS_KEY: &str = "$kwargs";

/// A live object handed to the resolver by the caller.
pub type Opaque = Arc<dyn Any + Send + Sync>;

#[derive(Clone)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ArgValue>),
    Bag(Kwargs),
    Call(Directive),
    Object(Opaque),
}

impl ArgValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ArgValue::Null => "null",
            ArgValue::Bool(_) => "a boolean",
            ArgValue::Int(_) => "an integer",
            ArgValue::Float(_) => "a number",
            ArgValue::Str(_) => "a string",
            ArgValue::List(_) => "a list",
            ArgValue::Bag(_) => "an object",
            ArgValue::Call(_) => "a '$function' directive",
            ArgValue::Object(_) => "an interpolated object",
        }
    }
}

impl fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Null => write!(f, "Null"),
            ArgValue::Bool(b) => write!(f, "Bool({b})"),
            ArgValue::Int(i) => write!(f, "Int({i})"),
            ArgValue::Float(x) => write!(f, "Float({x})"),
            ArgValue::Str(s) => write!(f, "Str({s:?})"),
            ArgValue::List(items) => f.debug_tuple("List").field(items).finish(),
            ArgValue::Bag(bag) => f.debug_tuple("Bag").field(bag).finish(),
            ArgValue::Call(directive) => f.debug_tuple("Call").field(directive).finish(),
            ArgValue::Object(_) => write!(f, "Object(..)"),
        }
    }
}

/// A `{"$function": name, "$kwargs": {...}, ...}` object.
///
/// `kwargs` is kept as raw JSON: whoever dispatches the directive resolves it,
/// with whatever interpolation table is valid at that call site. Keys other
/// than the two reserved ones end up in `options`.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub path: String,
    pub function: String,
    pub kwargs: Map<String, Value>,
    pub options: Map<String, Value>,
}

impl Directive {
    pub fn is_directive(map: &Map<String, Value>) -> bool {
        map.contains_key(FUNCTION_KEY) || map.contains_key(KWARGS_KEY)
    }

    pub fn parse(path: &str, value: &Value) -> Result<Directive> {
        let map = value.as_object().ok_or_else(|| {
            JobError::config(
                path,
                format!(
                    "expected an object with '{FUNCTION_KEY}', found {}",
                    json_kind(value)
                ),
            )
        })?;
        Self::from_map(path, map)
    }

    pub fn from_map(path: &str, map: &Map<String, Value>) -> Result<Directive> {
        let function = match map.get(FUNCTION_KEY) {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            Some(other) => {
                return Err(JobError::config(
                    field_path(path, FUNCTION_KEY),
                    format!("expected a function name, found {}", json_kind(other)),
                ))
            }
            None => {
                return Err(JobError::config(
                    path,
                    format!("'{KWARGS_KEY}' given without '{FUNCTION_KEY}'"),
                ))
            }
        };

        let kwargs = match map.get(KWARGS_KEY) {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(kwargs)) => kwargs.clone(),
            Some(other) => {
                return Err(JobError::config(
                    field_path(path, KWARGS_KEY),
                    format!("expected an object, found {}", json_kind(other)),
                ))
            }
        };

        let options = map
            .iter()
            .filter(|(key, _)| key.as_str() != FUNCTION_KEY && key.as_str() != KWARGS_KEY)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Directive {
            path: path.to_string(),
            function,
            kwargs,
            options,
        })
    }

    /// Fails when plain keys sit next to `$function` where none are accepted.
    pub fn ensure_no_options(&self) -> Result<()> {
        match self.options.keys().next() {
            Some(key) => Err(JobError::config(
                field_path(&self.path, key),
                "unexpected key next to '$function'",
            )),
            None => Ok(()),
        }
    }

    pub fn function_path(&self) -> String {
        field_path(&self.path, FUNCTION_KEY)
    }

    pub fn resolve_kwargs(&self, interpolation: &Interpolation) -> Result<Kwargs> {
        resolve(&field_path(&self.path, KWARGS_KEY), &self.kwargs, interpolation)
    }

    pub fn resolve_options(&self, interpolation: &Interpolation) -> Result<Kwargs> {
        resolve(&self.path, &self.options, interpolation)
    }
}

/// Names a JSON document may use to refer to objects it cannot express itself.
#[derive(Clone, Default)]
pub struct Interpolation {
    entries: HashMap<String, Opaque>,
}

impl Interpolation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Any + Send + Sync>(mut self, name: impl Into<String>, object: Arc<T>) -> Self {
        self.entries.insert(name.into(), object as Opaque);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Opaque> {
        self.entries.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpolation")
            .field("names", &self.names())
            .finish()
    }
}

/// Resolved keyword arguments, keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct Kwargs {
    path: String,
    entries: BTreeMap<String, ArgValue>,
}

impl Kwargs {
    pub fn empty(path: impl Into<String>) -> Self {
        Kwargs {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn key_path(&self, name: &str) -> String {
        field_path(&self.path, name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.entries.get(name)
    }

    pub fn take(&mut self, name: &str) -> Option<ArgValue> {
        self.entries.remove(name)
    }

    /// Removes `name` and converts it; absent and `null` both yield `None`.
    pub fn take_as<T: FromArg>(&mut self, name: &str) -> Result<Option<T>> {
        let path = self.key_path(name);
        match self.take(name) {
            None | Some(ArgValue::Null) => Ok(None),
            Some(value) => T::from_arg(&path, value).map(Some),
        }
    }

    pub fn take_or<T: FromArg>(&mut self, name: &str, default: T) -> Result<T> {
        Ok(self.take_as(name)?.unwrap_or(default))
    }

    pub fn require<T: FromArg>(&mut self, name: &str) -> Result<T> {
        let path = self.key_path(name);
        self.take_as(name)?
            .ok_or_else(|| JobError::config(path, "required argument is missing"))
    }

    /// Removes `name` and downcasts the interpolated object it refers to.
    pub fn take_object<T: Any + Send + Sync>(&mut self, name: &str) -> Result<Option<Arc<T>>> {
        let path = self.key_path(name);
        match self.take(name) {
            None | Some(ArgValue::Null) => Ok(None),
            Some(ArgValue::Object(object)) => object.downcast::<T>().map(Some).map_err(|_| {
                JobError::config(
                    path,
                    format!(
                        "interpolated object is not a {}",
                        std::any::type_name::<T>()
                    ),
                )
            }),
            Some(other) => Err(JobError::config(
                path,
                format!("expected an interpolated object, found {}", other.kind()),
            )),
        }
    }

    /// Fails on the first argument nobody consumed.
    pub fn finish(self) -> Result<()> {
        match self.entries.keys().next() {
            Some(name) => Err(JobError::config(
                field_path(&self.path, name),
                "unexpected argument",
            )),
            None => Ok(()),
        }
    }
}

impl IntoIterator for Kwargs {
    type Item = (String, ArgValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, ArgValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Resolves every key of `map` into a keyword argument.
pub fn resolve(path: &str, map: &Map<String, Value>, interpolation: &Interpolation) -> Result<Kwargs> {
    let mut kwargs = Kwargs::empty(path);
    for (key, value) in map {
        let key_path = field_path(path, key);
        if key == FUNCTION_KEY || key == KWARGS_KEY {
            return Err(JobError::config(
                key_path,
                "directive keys cannot be used as plain arguments",
            ));
        }
        check_identifier(&key_path, key)?;
        let resolved = resolve_value(&key_path, value, interpolation)?;
        kwargs.entries.insert(key.clone(), resolved);
    }
    Ok(kwargs)
}

pub fn resolve_value(path: &str, value: &Value, interpolation: &Interpolation) -> Result<ArgValue> {
    let resolved = match value {
        Value::Null => ArgValue::Null,
        Value::Bool(b) => ArgValue::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ArgValue::Int(i)
            } else if let Some(x) = n.as_f64() {
                ArgValue::Float(x)
            } else {
                return Err(JobError::config(path, format!("number {n} is out of range")));
            }
        }
        Value::String(s) => match interpolation.get(s) {
            Some(object) => ArgValue::Object(Arc::clone(object)),
            None => ArgValue::Str(s.clone()),
        },
        Value::Array(items) => ArgValue::List(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| resolve_value(&index_path(path, i), item, interpolation))
                .collect::<Result<_>>()?,
        ),
        Value::Object(map) if Directive::is_directive(map) => {
            ArgValue::Call(Directive::from_map(path, map)?)
        }
        Value::Object(map) => ArgValue::Bag(resolve(path, map, interpolation)?),
    };
    Ok(resolved)
}

fn check_identifier(path: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(JobError::config(path, "argument names must be identifiers"))
    }
}

pub(crate) fn field_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

pub(crate) fn index_path(parent: &str, index: usize) -> String {
    format!("{parent}[{index}]")
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Conversion from a resolved argument into the type a callee expects.
pub trait FromArg: Sized {
    fn from_arg(path: &str, value: ArgValue) -> Result<Self>;
}

fn mismatch(path: &str, expected: &str, found: &ArgValue) -> JobError {
    JobError::config(path, format!("expected {expected}, found {}", found.kind()))
}

impl FromArg for ArgValue {
    fn from_arg(_path: &str, value: ArgValue) -> Result<Self> {
        Ok(value)
    }
}

impl FromArg for f64 {
    fn from_arg(path: &str, value: ArgValue) -> Result<Self> {
        match value {
            ArgValue::Int(i) => Ok(i as f64),
            ArgValue::Float(x) => Ok(x),
            other => Err(mismatch(path, "a number", &other)),
        }
    }
}

impl FromArg for i64 {
    fn from_arg(path: &str, value: ArgValue) -> Result<Self> {
        match value {
            ArgValue::Int(i) => Ok(i),
            ArgValue::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 9.0e15 => {
                Ok(x as i64)
            }
            other => Err(mismatch(path, "an integer", &other)),
        }
    }
}

impl FromArg for usize {
    fn from_arg(path: &str, value: ArgValue) -> Result<Self> {
        let i = i64::from_arg(path, value)?;
        usize::try_from(i).map_err(|_| {
            JobError::config(path, format!("expected a non-negative integer, found {i}"))
        })
    }
}

impl FromArg for u64 {
    fn from_arg(path: &str, value: ArgValue) -> Result<Self> {
        let i = i64::from_arg(path, value)?;
        u64::try_from(i).map_err(|_| {
            JobError::config(path, format!("expected a non-negative integer, found {i}"))
        })
    }
}

impl FromArg for bool {
    fn from_arg(path: &str, value: ArgValue) -> Result<Self> {
        match value {
            ArgValue::Bool(b) => Ok(b),
            other => Err(mismatch(path, "a boolean", &other)),
        }
    }
}

impl FromArg for String {
    fn from_arg(path: &str, value: ArgValue) -> Result<Self> {
        match value {
            ArgValue::Str(s) => Ok(s),
            other => Err(mismatch(path, "a string", &other)),
        }
    }
}

impl<T: FromArg> FromArg for Vec<T> {
    fn from_arg(path: &str, value: ArgValue) -> Result<Self> {
        match value {
            ArgValue::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| T::from_arg(&index_path(path, i), item))
                .collect(),
            other => Err(mismatch(path, "a list", &other)),
        }
    }
}

impl<T: FromArg, const N: usize> FromArg for [T; N] {
    fn from_arg(path: &str, value: ArgValue) -> Result<Self> {
        let items: Vec<T> = Vec::from_arg(path, value)?;
        let len = items.len();
        items.try_into().map_err(|_| {
            JobError::config(path, format!("expected {N} elements, found {len}"))
        })
    }
}

impl FromArg for Vector3<f64> {
    fn from_arg(path: &str, value: ArgValue) -> Result<Self> {
        let [x, y, z] = <[f64; 3]>::from_arg(path, value)?;
        Ok(Vector3::new(x, y, z))
    }
}

impl FromArg for Bohr<Vector3<f64>> {
    fn from_arg(path: &str, value: ArgValue) -> Result<Self> {
        Vector3::from_arg(path, value).map(Bohr)
    }
}

impl FromArg for Directive {
    fn from_arg(path: &str, value: ArgValue) -> Result<Self> {
        match value {
            ArgValue::Call(directive) => Ok(directive),
            other => Err(mismatch(path, "a '$function' directive", &other)),
        }
    }
}

impl FromArg for Kwargs {
    fn from_arg(path: &str, value: ArgValue) -> Result<Self> {
        match value {
            ArgValue::Bag(kwargs) => Ok(kwargs),
            other => Err(mismatch(path, "an object", &other)),
        }
    }
}
