use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::dialogs::DialogContext;
use crate::eval::Value;
use crate::memory::object_path;
use crate::memory::path_resolver::{default_resolvers, PathResolver};
use crate::memory::scopes::*;
use crate::memory::state_manager::StateValue;
use crate::memory::{MemoryError, MemoryResult, CONVERSATION, TURN, USER};

const FIRST: &str = "first()";

/// The scopes and path resolvers in effect for a dialog context.
///
/// Scope names are unique ignoring case. Resolvers run in registration
/// order, each rewriting the output of the previous one.
#[derive(Clone)]
pub struct ScopeRegistry {
    scopes: Vec<Arc<dyn MemoryScope>>,
    resolvers: Vec<Arc<dyn PathResolver>>,
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        let scopes: Vec<Arc<dyn MemoryScope>> = vec![
            Arc::new(RootMemoryScope::new(USER)),
            Arc::new(RootMemoryScope::new(CONVERSATION)),
            Arc::new(RootMemoryScope::new(TURN)),
            Arc::new(SettingsMemoryScope),
            Arc::new(DialogMemoryScope),
            Arc::new(ThisMemoryScope),
            Arc::new(ClassMemoryScope),
        ];
        Self {
            scopes,
            resolvers: default_resolvers(),
        }
    }
}

impl std::fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeRegistry")
            .field("scopes", &self.scope_names())
            .field("resolvers", &self.resolvers.len())
            .finish()
    }
}

impl ScopeRegistry {
    /// No scopes and no resolvers.
    pub fn empty() -> Self {
        Self {
            scopes: Vec::new(),
            resolvers: Vec::new(),
        }
    }

    pub fn add_scope(&mut self, scope: Arc<dyn MemoryScope>) -> MemoryResult<()> {
        if self.scope(scope.name()).is_some() {
            return Err(MemoryError::DuplicateScope {
                name: scope.name().to_string(),
            });
        }
        self.scopes.push(scope);
        Ok(())
    }

    pub fn add_resolver(&mut self, resolver: Arc<dyn PathResolver>) {
        self.resolvers.push(resolver);
    }

    pub fn scope(&self, name: &str) -> Option<&Arc<dyn MemoryScope>> {
        self.scopes
            .iter()
            .find(|scope| scope.name().eq_ignore_ascii_case(name))
    }

    pub fn scope_names(&self) -> Vec<&str> {
        self.scopes.iter().map(|scope| scope.name()).collect()
    }

    pub fn transform_path(&self, path: &str) -> String {
        self.resolvers
            .iter()
            .fold(path.trim().to_string(), |path, resolver| {
                resolver.transform_path(&path)
            })
    }

    /// Splits `path` into its scope and the path inside the scope root.
    pub fn resolve_scope(
        &self,
        dc: &DialogContext,
        path: &str,
    ) -> MemoryResult<(Arc<dyn MemoryScope>, String)> {
        let path = self.expand_indirection(dc, path.trim())?;
        let path = self.transform_path(&path);

        let mut best: Option<&Arc<dyn MemoryScope>> = None;
        for scope in &self.scopes {
            let name = scope.name();
            let matches = path.len() >= name.len()
                && path.is_char_boundary(name.len())
                && path[..name.len()].eq_ignore_ascii_case(name)
                && matches!(path[name.len()..].chars().next(), None | Some('.') | Some('['));
            if matches && best.map_or(true, |b| b.name().len() < name.len()) {
                best = Some(scope);
            }
        }

        match best {
            Some(scope) => {
                let rest = &path[scope.name().len()..];
                let rest = rest.strip_prefix('.').unwrap_or(rest);
                Ok((scope.clone(), rest.to_string()))
            }
            None => Err(MemoryError::BadScope {
                path,
                scopes: self.scope_names().join(","),
            }),
        }
    }

    // `{x.y}` names the path stored at `x.y`.
    fn expand_indirection(&self, dc: &DialogContext, path: &str) -> MemoryResult<String> {
        let Some(inner) = path.strip_prefix('{').and_then(|p| p.strip_suffix('}')) else {
            return Ok(path.to_string());
        };
        match self.get_value(dc, inner)? {
            Some(Value::String(target)) => Ok(target),
            _ => Err(MemoryError::InvalidPath {
                path: path.to_string(),
                message: format!("'{}' does not hold a path", inner),
            }),
        }
    }

    /// Reads a deep copy of the value at `path`.
    pub fn get_value(&self, dc: &DialogContext, path: &str) -> MemoryResult<Option<Value>> {
        let (scope, rest) = self.resolve_scope(dc, path)?;
        let Some(root) = scope.get_root(dc) else {
            return Ok(None);
        };
        if let Some((before, after)) = split_first(&rest) {
            let Some(container) = object_path::get_path_value(root, before)? else {
                return Ok(None);
            };
            return match first_of(container) {
                Some(first) => Ok(object_path::get_path_value(first, after)?.cloned()),
                None => Ok(None),
            };
        }
        Ok(object_path::get_path_value(root, &rest)?.cloned())
    }

    pub fn set_value(
        &self,
        dc: &mut DialogContext,
        path: &str,
        value: impl Into<StateValue>,
    ) -> MemoryResult<()> {
        let value = match value.into() {
            StateValue::Ready(value) => value,
            StateValue::Pending(_) => {
                return Err(MemoryError::UnresolvedValue {
                    path: path.to_string(),
                })
            }
        };
        let (scope, rest) = self.writable(dc, path)?;
        debug!("set {} ({}:{})", path, scope.name(), rest);
        if rest.is_empty() {
            return scope.set_root(dc, value);
        }
        object_path::set_path_value(scope.root_mut(dc)?, &rest, value)
    }

    /// Removes the leaf at `path`; returns whether anything was removed.
    pub fn remove_value(&self, dc: &mut DialogContext, path: &str) -> MemoryResult<bool> {
        let (scope, rest) = self.writable(dc, path)?;
        if rest.is_empty() {
            return Err(MemoryError::ScopeRootRemoval {
                scope: scope.name().to_string(),
            });
        }
        debug!("remove {} ({}:{})", path, scope.name(), rest);
        object_path::remove_path_value(scope.root_mut(dc)?, &rest)
    }

    fn writable(
        &self,
        dc: &DialogContext,
        path: &str,
    ) -> MemoryResult<(Arc<dyn MemoryScope>, String)> {
        let (scope, rest) = self.resolve_scope(dc, path)?;
        if scope.is_read_only() {
            return Err(MemoryError::ReadOnlyScope {
                scope: scope.name().to_string(),
            });
        }
        if split_first(&rest).is_some() {
            return Err(MemoryError::InvalidPath {
                path: path.to_string(),
                message: format!("{} can only be read", FIRST),
            });
        }
        Ok((scope, rest))
    }

    /// Copies of every writable scope root, keyed by scope name.
    pub fn snapshot(&self, dc: &DialogContext) -> Value {
        let roots: HashMap<String, Value> = self
            .scopes
            .iter()
            .filter(|scope| !scope.is_read_only())
            .filter_map(|scope| {
                scope
                    .get_root(dc)
                    .map(|root| (scope.name().to_string(), root.clone()))
            })
            .collect();
        Value::Map(roots)
    }
}

// Splits `a.b.first().c` into (`a.b`, `c`).
fn split_first(path: &str) -> Option<(&str, &str)> {
    let index = path.find(FIRST)?;
    let before = &path[..index];
    if !(before.is_empty() || before.ends_with('.')) {
        return None;
    }
    let after = &path[index + FIRST.len()..];
    Some((
        before.trim_end_matches('.'),
        after.trim_start_matches('.'),
    ))
}

// Recognizer entities are lists of values, sometimes lists of lists; only
// those two shapes are unwrapped.
fn first_of(value: &Value) -> Option<&Value> {
    match value {
        Value::List(items) => match items.first()? {
            Value::List(inner) => inner.first(),
            first => Some(first),
        },
        other => Some(other),
    }
}
