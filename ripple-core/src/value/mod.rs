//! Plain Data
//!
//! The reactive core operates on a small dynamic data model: primitives plus
//! four raw container kinds (plain objects, arrays, keyed maps and sets).
//! Raw containers are reference-counted and compared by identity, the same
//! way the UI layer compares the objects its expressions evaluate to.
//!
//! Raw containers never track anything. Reads and writes only participate in
//! the dependency graph when they go through a wrapper produced by
//! [`Runtime::wrap`](crate::reactive::Runtime::wrap).

mod json;

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};

/// Insertion-ordered property storage of a plain object.
pub type ObjectMap = IndexMap<Rc<str>, Value>;

/// Insertion-ordered storage of a keyed map.
pub type EntryMap = IndexMap<Value, Value>;

/// Insertion-ordered storage of a set.
pub type EntrySet = IndexSet<Value>;

/// Process-unique identity of a raw container.
///
/// Ids are never reused, so they stay valid keys after the container they
/// named has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawId(u64);

impl RawId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of a raw container. Fixed when the container is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawKind {
    Object,
    Array,
    Map,
    Set,
}

/// Storage of a raw container.
///
/// The variant never changes; only the contents behind the `RefCell` do.
pub enum RawBody {
    Object(RefCell<ObjectMap>),
    Array(RefCell<Vec<Value>>),
    Map(RefCell<EntryMap>),
    Set(RefCell<EntrySet>),
}

struct RawCell {
    id: RawId,
    body: RawBody,
}

/// A raw, untracked container.
///
/// Cloning a `Raw` clones the handle, not the contents.
#[derive(Clone)]
pub struct Raw(Rc<RawCell>);

/// Weak counterpart of [`Raw`], used where a container must not be kept alive.
#[derive(Clone)]
pub(crate) struct WeakRaw(Weak<RawCell>);

impl WeakRaw {
    pub(crate) fn upgrade(&self) -> Option<Raw> {
        self.0.upgrade().map(Raw)
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl Raw {
    fn from_body(body: RawBody) -> Self {
        Self(Rc::new(RawCell {
            id: RawId::next(),
            body,
        }))
    }

    /// Create a plain object from `(key, value)` pairs.
    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<Rc<str>>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from_body(RawBody::Object(RefCell::new(map)))
    }

    /// Create an array.
    pub fn array<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let items = items.into_iter().map(Into::into).collect();
        Self::from_body(RawBody::Array(RefCell::new(items)))
    }

    /// Create a keyed map from `(key, value)` pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from_body(RawBody::Map(RefCell::new(map)))
    }

    /// Create a set.
    pub fn set<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let set = items.into_iter().map(Into::into).collect();
        Self::from_body(RawBody::Set(RefCell::new(set)))
    }

    /// Get the container's identity.
    pub fn id(&self) -> RawId {
        self.0.id
    }

    /// Get the container's kind.
    pub fn kind(&self) -> RawKind {
        match self.0.body {
            RawBody::Object(_) => RawKind::Object,
            RawBody::Array(_) => RawKind::Array,
            RawBody::Map(_) => RawKind::Map,
            RawBody::Set(_) => RawKind::Set,
        }
    }

    /// Direct access to the storage. Reads and writes made here are untracked.
    pub fn body(&self) -> &RawBody {
        &self.0.body
    }

    /// Number of entries, whatever the kind.
    pub fn len(&self) -> usize {
        match self.body() {
            RawBody::Object(m) => m.borrow().len(),
            RawBody::Array(v) => v.borrow().len(),
            RawBody::Map(m) => m.borrow().len(),
            RawBody::Set(s) => s.borrow().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether two handles name the same container.
    pub fn ptr_eq(&self, other: &Raw) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> WeakRaw {
        WeakRaw(Rc::downgrade(&self.0))
    }

    /// Untracked property read on a plain object.
    pub fn get_prop(&self, key: &str) -> Option<Value> {
        match self.body() {
            RawBody::Object(m) => m.borrow().get(key).cloned(),
            _ => None,
        }
    }

    /// Untracked element read on an array.
    pub fn get_index(&self, index: usize) -> Option<Value> {
        match self.body() {
            RawBody::Array(v) => v.borrow().get(index).cloned(),
            _ => None,
        }
    }

    /// The values directly reachable from this container, in iteration order.
    ///
    /// Map keys are included, since a container used as a key is reachable.
    pub(crate) fn children(&self) -> Vec<Value> {
        match self.body() {
            RawBody::Object(m) => m.borrow().values().cloned().collect(),
            RawBody::Array(v) => v.borrow().clone(),
            RawBody::Map(m) => m
                .borrow()
                .iter()
                .flat_map(|(k, v)| [k.clone(), v.clone()])
                .collect(),
            RawBody::Set(s) => s.borrow().iter().cloned().collect(),
        }
    }
}

impl fmt::Debug for Raw {
    // Contents are deliberately not printed: raw graphs may be cyclic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{}(len={})", self.kind(), self.id(), self.len())
    }
}

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(Raw),
}

impl Value {
    /// Build a string value.
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&Raw> {
        match self {
            Value::Object(raw) => Some(raw),
            _ => None,
        }
    }

    /// `Object.is` semantics: NaN equals NaN, `+0` and `-0` differ,
    /// containers compare by identity.
    ///
    /// This is the check writes use to skip no-op assignments.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => {
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b && a.is_sign_negative() == b.is_sign_negative()
                }
            }
            _ => self == other,
        }
    }

    /// Whether both values are the same container.
    pub fn same_identity(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// JS-style string conversion, used by the default array sort.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Object(raw) => match raw.kind() {
                RawKind::Array => raw
                    .children()
                    .iter()
                    .map(|v| {
                        if v.is_nullish() {
                            String::new()
                        } else if let Value::Object(_) = v {
                            // Nested containers are not expanded, which also
                            // keeps cyclic arrays finite.
                            "[object]".to_string()
                        } else {
                            v.to_display_string()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(","),
                RawKind::Map => "[object Map]".to_string(),
                RawKind::Set => "[object Set]".to_string(),
                RawKind::Object => "[object Object]".to_string(),
            },
        }
    }

    fn number_key(n: f64) -> u64 {
        if n.is_nan() {
            f64::NAN.to_bits()
        } else if n == 0.0 {
            0.0f64.to_bits()
        } else {
            n.to_bits()
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let s = if n > 0.0 { "Infinity" } else { "-Infinity" };
        s.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

/// SameValueZero, the equality keyed collections use.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => (a.is_nan() && b.is_nan()) || a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Undefined | Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => Value::number_key(*n).hash(state),
            Value::String(s) => s.hash(state),
            Value::Object(raw) => raw.id().hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(raw) => write!(f, "{raw:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::String(s)
    }
}

impl From<Raw> for Value {
    fn from(raw: Raw) -> Self {
        Value::Object(raw)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn integral_numbers_print_without_fraction() {
        let print = |n: f64| Value::from(n).to_display_string();
        assert_eq!(print(42.0), "42");
        assert_eq!(print(-0.0), "0");
        assert_eq!(print(1e20), "100000000000000000000");
        assert_eq!(print(-1e20), "-100000000000000000000");
        assert_eq!(print(1e21), "1000000000000000000000");
        assert_eq!(print(1.5), "1.5");
        assert!(print(1e19) < print(2e19));
    }

    #[test]
    fn raw_ids_are_unique() {
        let a = Raw::object(Vec::<(&str, Value)>::new());
        let b = Raw::object(Vec::<(&str, Value)>::new());
        assert_ne!(a.id(), b.id());
        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn same_value_zero_for_keys() {
        let mut set = HashSet::new();
        set.insert(Value::Number(f64::NAN));
        set.insert(Value::Number(0.0));
        assert!(set.contains(&Value::Number(f64::NAN)));
        assert!(set.contains(&Value::Number(-0.0)));
    }

    #[test]
    fn same_value_distinguishes_signed_zero() {
        assert!(!Value::Number(0.0).same_value(&Value::Number(-0.0)));
        assert!(Value::Number(f64::NAN).same_value(&Value::Number(f64::NAN)));
        assert!(Value::from("a").same_value(&Value::from("a")));
    }

    #[test]
    fn containers_compare_by_identity() {
        let a = Value::from(Raw::array([1, 2]));
        let b = Value::from(Raw::array([1, 2]));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert!(a.same_identity(&a.clone()));
    }

    #[test]
    fn display_strings_follow_js() {
        assert_eq!(Value::from(10).to_display_string(), "10");
        assert_eq!(Value::from(1.5).to_display_string(), "1.5");
        assert_eq!(Value::Null.to_display_string(), "null");
        let arr = Value::from(Raw::array([Value::from(1), Value::Null, Value::from("x")]));
        assert_eq!(arr.to_display_string(), "1,,x");
    }

    #[test]
    fn debug_does_not_recurse_into_cycles() {
        let obj = Raw::object(Vec::<(&str, Value)>::new());
        if let RawBody::Object(m) = obj.body() {
            m.borrow_mut().insert("self".into(), Value::from(obj.clone()));
        }
        let printed = format!("{:?}", Value::from(obj));
        assert!(printed.starts_with("Object#"));
    }
}
