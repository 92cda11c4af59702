//! Props and state snapshots.
//!
//! ## Usage
//!
//! Props are immutable once built and shared as [`SharedProps`]. An update
//! replaces the whole snapshot; [`Props::merged_with`] produces the next
//! snapshot from a partial raw update.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

/// Prop key holding the native id used for id to tag lookups.
pub const NATIVE_ID_KEY: &str = "nativeID";

/// Immutable props of one shadow view.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Props {
    values: Map<String, Value>,
}

/// Shared handle to a props snapshot.
pub type SharedProps = Arc<Props>;

impl Props {
    /// Creates props from a JSON object.
    ///
    /// Non-object values produce empty props.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            _ => Self::default(),
        }
    }

    /// Creates props from a map.
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Looks up a raw prop.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the native id, or an empty string when absent.
    pub fn native_id(&self) -> &str {
        self.values
            .get(NATIVE_ID_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Iterates the prop keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Returns `true` when no prop is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns a new snapshot with the top-level keys of `partial` written
    /// over `self`. A `null` value in `partial` removes the key.
    pub fn merged_with(&self, partial: &Value) -> Self {
        let mut values = self.values.clone();
        if let Value::Object(patch) = partial {
            for (key, value) in patch {
                if value.is_null() {
                    values.remove(key);
                } else {
                    values.insert(key.clone(), value.clone());
                }
            }
        }
        Self { values }
    }

    /// Returns the props as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

/// Opaque component state.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct State {
    /// State payload.
    pub data: Value,
}

/// Shared handle to a state snapshot.
pub type SharedState = Arc<State>;

impl State {
    /// Wraps a payload.
    pub fn new(data: Value) -> Self {
        Self { data }
    }
}
