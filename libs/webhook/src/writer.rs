use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};

/// Records the verdict of an admission handler.
///
/// Handlers can only write to it: deny the request and append JSON Patch operations.
/// Clones share the same state, so a writer can be moved into an `async` block freely.
#[derive(Clone, Default)]
pub struct ResponseWriter {
    verdict: Arc<Mutex<Verdict>>,
}

/// Final state of a [`ResponseWriter`], read back once the handler returned.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Verdict {
    pub(crate) patches: Vec<Value>,
    pub(crate) deny: String,
}

impl ResponseWriter {
    /// Deny the admission request. The last message wins.
    pub fn deny(&self, message: impl Into<String>) {
        self.verdict.lock().deny = message.into();
    }

    /// Append a raw JSON Patch operation, without any validation.
    pub fn patch_raw(&self, operation: Map<String, Value>) {
        self.verdict.lock().patches.push(Value::Object(operation));
    }

    pub fn patch_add(&self, path: impl Into<String>, value: impl Into<Value>) {
        self.patch_raw(operation("add", path.into(), Some(("value", value.into()))));
    }

    pub fn patch_remove(&self, path: impl Into<String>) {
        self.patch_raw(operation("remove", path.into(), None));
    }

    pub fn patch_replace(&self, path: impl Into<String>, value: impl Into<Value>) {
        self.patch_raw(operation("replace", path.into(), Some(("value", value.into()))));
    }

    pub fn patch_copy(&self, path: impl Into<String>, from: impl Into<String>) {
        let from = Value::String(from.into());
        self.patch_raw(operation("copy", path.into(), Some(("from", from))));
    }

    pub fn patch_move(&self, path: impl Into<String>, from: impl Into<String>) {
        let from = Value::String(from.into());
        self.patch_raw(operation("move", path.into(), Some(("from", from))));
    }

    pub fn patch_test(&self, path: impl Into<String>, value: impl Into<Value>) {
        self.patch_raw(operation("test", path.into(), Some(("value", value.into()))));
    }

    /// Take the recorded verdict, leaving the writer empty.
    pub(crate) fn take(&self) -> Verdict {
        std::mem::take(&mut *self.verdict.lock())
    }
}

/// Builds `{op, path}` plus the op specific `value` or `from` member.
fn operation(op: &str, path: String, operand: Option<(&str, Value)>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("op".to_string(), Value::String(op.to_string()));
    map.insert("path".to_string(), Value::String(path));
    if let Some((key, value)) = operand {
        map.insert(key.to_string(), value);
    }
    map
}
