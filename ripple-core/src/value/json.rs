//! Conversions between [`Value`] and `serde_json::Value`.

use std::collections::HashSet;

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as Json};

use super::{Raw, RawBody, RawId, Value};
use crate::config::SnapshotLimits;
use crate::error::ReactiveError;

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s.into()),
            Json::Array(items) => Value::Object(Raw::array(items.into_iter().map(Value::from))),
            Json::Object(map) => Value::Object(Raw::object(
                map.into_iter().map(|(k, v)| (k, Value::from(v))),
            )),
        }
    }
}

impl Value {
    /// Convert to JSON.
    ///
    /// `undefined` becomes `null`, map keys are stringified and sets become
    /// arrays. Cyclic graphs are rejected, as are graphs nested deeper than
    /// the default snapshot depth.
    pub fn to_json(&self) -> Result<Json, ReactiveError> {
        self.to_json_with_depth(SnapshotLimits::default().max_depth)
    }

    /// [`to_json`](Value::to_json) with an explicit nesting limit below the
    /// root.
    pub fn to_json_with_depth(&self, max_depth: usize) -> Result<Json, ReactiveError> {
        let mut walk = JsonWalk {
            in_progress: HashSet::new(),
            max_depth,
        };
        walk.convert(self, 0)
    }
}

struct JsonWalk {
    in_progress: HashSet<RawId>,
    max_depth: usize,
}

impl JsonWalk {
    fn convert(&mut self, value: &Value, depth: usize) -> Result<Json, ReactiveError> {
        let raw = match value {
            Value::Undefined | Value::Null => return Ok(Json::Null),
            Value::Bool(b) => return Ok(Json::Bool(*b)),
            Value::Number(n) => {
                return Ok(JsonNumber::from_f64(*n).map_or(Json::Null, Json::Number));
            }
            Value::String(s) => return Ok(Json::String(s.to_string())),
            Value::Object(raw) => raw,
        };

        if depth > self.max_depth {
            return Err(ReactiveError::NestingTooDeep {
                id: raw.id(),
                max_depth: self.max_depth,
            });
        }
        if !self.in_progress.insert(raw.id()) {
            return Err(ReactiveError::CyclicValue { id: raw.id() });
        }

        let json = match raw.body() {
            RawBody::Object(m) => {
                let entries: Vec<_> = m.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                let mut out = JsonMap::new();
                for (k, v) in entries {
                    out.insert(k.to_string(), self.convert(&v, depth + 1)?);
                }
                Json::Object(out)
            }
            RawBody::Map(m) => {
                let entries: Vec<_> = m.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                let mut out = JsonMap::new();
                for (k, v) in entries {
                    out.insert(k.to_display_string(), self.convert(&v, depth + 1)?);
                }
                Json::Object(out)
            }
            RawBody::Array(_) | RawBody::Set(_) => {
                let items = raw.children();
                let mut out = Vec::with_capacity(items.len());
                for item in &items {
                    out.push(self.convert(item, depth + 1)?);
                }
                Json::Array(out)
            }
        };

        self.in_progress.remove(&raw.id());
        Ok(json)
    }
}
