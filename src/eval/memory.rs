use std::collections::HashMap;

use crate::eval::value::Value;
use crate::memory::object_path;
use crate::memory::MemoryResult;

/// Read access to path-addressed state, as seen by the expression evaluator.
///
/// `Ok(None)` means the path does not exist. Errors are reserved for paths
/// that cannot be interpreted at all (bad scope, malformed path).
pub trait Memory {
    fn get_value(&self, path: &str) -> MemoryResult<Option<Value>>;
}

/// Memory over a plain value tree. Used for standalone evaluation.
#[derive(Debug, Clone, Default)]
pub struct SimpleMemory {
    root: Value,
}

impl SimpleMemory {
    pub fn new(root: impl Into<Value>) -> Self {
        Self { root: root.into() }
    }

    pub fn set_value(&mut self, path: &str, value: Value) -> MemoryResult<()> {
        object_path::set_path_value(&mut self.root, path, value)
    }

    pub fn root(&self) -> &Value {
        &self.root
    }
}

impl From<serde_json::Value> for SimpleMemory {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value)
    }
}

impl Memory for SimpleMemory {
    fn get_value(&self, path: &str) -> MemoryResult<Option<Value>> {
        Ok(object_path::get_path_value(&self.root, path)?.cloned())
    }
}

/// Local bindings layered over a parent memory, used by the iteration
/// functions to expose the loop variable without touching the parent.
pub struct StackedMemory<'a> {
    locals: HashMap<String, Value>,
    parent: &'a dyn Memory,
}

impl<'a> StackedMemory<'a> {
    pub fn new(parent: &'a dyn Memory) -> Self {
        Self {
            locals: HashMap::new(),
            parent,
        }
    }

    pub fn with_local(mut self, name: impl Into<String>, value: Value) -> Self {
        self.locals.insert(name.into(), value);
        self
    }
}

impl Memory for StackedMemory<'_> {
    fn get_value(&self, path: &str) -> MemoryResult<Option<Value>> {
        let head_end = path
            .find(|c| c == '.' || c == '[')
            .unwrap_or(path.len());
        let (head, rest) = path.split_at(head_end);
        let rest = rest.strip_prefix('.').unwrap_or(rest);
        match self.locals.get(head) {
            Some(local) => Ok(object_path::get_path_value(local, rest)?.cloned()),
            None => self.parent.get_value(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_memory_returns_copies() {
        let mut memory = SimpleMemory::from(json!({"a": {"b": [1, 2]}}));
        let mut copy = memory.get_value("a").unwrap().unwrap();
        copy.as_map_mut().unwrap().clear();
        assert_eq!(
            memory.get_value("a.b[1]").unwrap(),
            Some(Value::Integer(2))
        );
        memory.set_value("a.c", Value::from("x")).unwrap();
        assert_eq!(memory.get_value("a.c").unwrap(), Some(Value::from("x")));
    }

    #[test]
    fn test_stacked_memory_shadows_parent() {
        let parent = SimpleMemory::from(json!({"x": 1, "y": 2}));
        let stacked = StackedMemory::new(&parent).with_local("x", Value::from(json!({"v": 10})));
        assert_eq!(stacked.get_value("x.v").unwrap(), Some(Value::Integer(10)));
        assert_eq!(stacked.get_value("y").unwrap(), Some(Value::Integer(2)));
    }
}
