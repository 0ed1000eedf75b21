//! Dotted/indexed path navigation over [`Value`] trees.
//!
//! Supported syntax: `a.b.c`, `a[0].b`, `a['key with dots']`, `a["key"]`.
//! Property names match case-insensitively, preferring an exact match.

use std::collections::HashMap;

use crate::eval::value::Value;
use crate::memory::{MemoryError, MemoryResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

pub fn parse_path(path: &str) -> MemoryResult<Vec<PathSegment>> {
    let invalid = |message: &str| MemoryError::InvalidPath {
        path: path.to_string(),
        message: message.to_string(),
    };

    let mut segments = Vec::new();
    let mut chars = path.trim().chars().peekable();
    let mut current = String::new();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut current)));
                } else if !matches!(segments.last(), Some(PathSegment::Index(_))) {
                    return Err(invalid("empty segment"));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut current)));
                }
                let mut inner = String::new();
                let mut closed = false;
                let quote = match chars.peek() {
                    Some(q @ ('\'' | '"')) => {
                        let q = *q;
                        chars.next();
                        Some(q)
                    }
                    _ => None,
                };
                while let Some(c) = chars.next() {
                    match quote {
                        Some(q) if c == q => {
                            if chars.next() != Some(']') {
                                return Err(invalid("expected ']' after quoted key"));
                            }
                            closed = true;
                            break;
                        }
                        None if c == ']' => {
                            closed = true;
                            break;
                        }
                        _ => inner.push(c),
                    }
                }
                if !closed {
                    return Err(invalid("unterminated '['"));
                }
                if quote.is_some() {
                    segments.push(PathSegment::Key(inner));
                } else {
                    let index = inner
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| invalid("index must be a non-negative integer"))?;
                    segments.push(PathSegment::Index(index));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        segments.push(PathSegment::Key(current));
    } else if path.trim().ends_with('.') {
        return Err(invalid("trailing '.'"));
    }
    Ok(segments)
}

fn find_key<'a>(map: &'a HashMap<String, Value>, key: &str) -> Option<&'a String> {
    if let Some((k, _)) = map.get_key_value(key) {
        return Some(k);
    }
    map.keys().find(|k| k.eq_ignore_ascii_case(key))
}

pub fn get_path_value<'a>(root: &'a Value, path: &str) -> MemoryResult<Option<&'a Value>> {
    let segments = parse_path(path)?;
    Ok(get_segments(root, &segments))
}

pub fn get_segments<'a>(root: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Map(map)) => {
                let key = find_key(map, key)?;
                map.get(key)?
            }
            (PathSegment::Index(index), Value::List(items)) => items.get(*index)?,
            (PathSegment::Key(key), Value::List(items)) => {
                items.get(key.parse::<usize>().ok()?)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Writes `value` at `path`, creating intermediate objects as needed.
/// A list index may address an existing element or append at `len`.
pub fn set_path_value(root: &mut Value, path: &str, value: Value) -> MemoryResult<()> {
    let segments = parse_path(path)?;
    if segments.is_empty() {
        *root = value;
        return Ok(());
    }

    check_writable(root, &segments, path)?;

    let mut current = root;
    let last = segments.len() - 1;
    for (i, segment) in segments.iter().enumerate() {
        if current.is_null() {
            *current = match segment {
                PathSegment::Key(_) => Value::empty_map(),
                PathSegment::Index(_) => Value::List(Vec::new()),
            };
        }
        let slot = match (segment, current) {
            (PathSegment::Key(key), Value::Map(map)) => {
                let key = find_key(map, key).cloned().unwrap_or_else(|| key.clone());
                map.entry(key).or_insert(Value::Null)
            }
            (PathSegment::Index(index), Value::List(items)) => {
                if *index == items.len() {
                    items.push(Value::Null);
                }
                items.get_mut(*index).ok_or_else(|| MemoryError::InvalidPath {
                    path: path.to_string(),
                    message: format!("index {} is out of range", index),
                })?
            }
            (_, other) => {
                return Err(MemoryError::InvalidPath {
                    path: path.to_string(),
                    message: format!("cannot navigate into a {} value", other.type_name()),
                })
            }
        };
        if i == last {
            *slot = value;
            return Ok(());
        }
        current = slot;
    }
    Ok(())
}

// Walks `segments` without touching `root`, failing where the write would.
// `None` stands for a container the write is going to create.
fn check_writable(root: &Value, segments: &[PathSegment], path: &str) -> MemoryResult<()> {
    let mut current = Some(root);
    for segment in segments {
        current = match (segment, current) {
            (PathSegment::Key(_), None | Some(Value::Null)) => None,
            (PathSegment::Index(0), None | Some(Value::Null)) => None,
            (PathSegment::Key(key), Some(Value::Map(map))) => {
                find_key(map, key).and_then(|key| map.get(key))
            }
            (PathSegment::Index(index), Some(Value::List(items))) if *index <= items.len() => {
                items.get(*index)
            }
            (PathSegment::Index(index), None | Some(Value::Null) | Some(Value::List(_))) => {
                return Err(MemoryError::InvalidPath {
                    path: path.to_string(),
                    message: format!("index {} is out of range", index),
                })
            }
            (_, Some(other)) => {
                return Err(MemoryError::InvalidPath {
                    path: path.to_string(),
                    message: format!("cannot navigate into a {} value", other.type_name()),
                })
            }
        };
    }
    Ok(())
}

/// Removes the leaf addressed by `path`. Returns whether anything was removed.
pub fn remove_path_value(root: &mut Value, path: &str) -> MemoryResult<bool> {
    let mut segments = parse_path(path)?;
    let Some(leaf) = segments.pop() else {
        return Ok(false);
    };

    let mut current = root;
    for segment in &segments {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Map(map)) => match find_key(map, key).cloned() {
                Some(key) => match map.get_mut(&key) {
                    Some(next) => next,
                    None => return Ok(false),
                },
                None => return Ok(false),
            },
            (PathSegment::Index(index), Value::List(items)) => match items.get_mut(*index) {
                Some(next) => next,
                None => return Ok(false),
            },
            _ => return Ok(false),
        };
    }

    Ok(match (leaf, current) {
        (PathSegment::Key(key), Value::Map(map)) => match find_key(map, &key).cloned() {
            Some(key) => map.remove(&key).is_some(),
            None => false,
        },
        (PathSegment::Index(index), Value::List(items)) if index < items.len() => {
            items.remove(index);
            true
        }
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_path() {
        assert_eq!(
            parse_path("a.b[2]['c.d']").unwrap(),
            vec![
                PathSegment::Key("a".into()),
                PathSegment::Key("b".into()),
                PathSegment::Index(2),
                PathSegment::Key("c.d".into()),
            ]
        );
        assert_eq!(parse_path("").unwrap(), vec![]);
        assert!(parse_path("a..b").is_err());
        assert!(parse_path("a[x]").is_err());
        assert!(parse_path("a[0").is_err());
    }

    #[test]
    fn test_get_is_case_insensitive() {
        let root = Value::from(json!({"Name": {"first": "Ada"}, "items": [1, {"x": 2}]}));
        assert_eq!(
            get_path_value(&root, "name.FIRST").unwrap(),
            Some(&Value::from("Ada"))
        );
        assert_eq!(
            get_path_value(&root, "items[1].x").unwrap(),
            Some(&Value::Integer(2))
        );
        assert_eq!(get_path_value(&root, "items[5]").unwrap(), None);
        assert_eq!(get_path_value(&root, "name.first.deeper").unwrap(), None);
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut root = Value::Null;
        set_path_value(&mut root, "a.b.c", Value::from(1)).unwrap();
        assert_eq!(root, Value::from(json!({"a": {"b": {"c": 1}}})));

        set_path_value(&mut root, "a.list[0]", Value::from("x")).unwrap();
        set_path_value(&mut root, "a.list[1]", Value::from("y")).unwrap();
        assert_eq!(
            get_path_value(&root, "a.list").unwrap(),
            Some(&Value::from(json!(["x", "y"])))
        );
        assert!(set_path_value(&mut root, "a.list[5]", Value::Null).is_err());
        assert!(set_path_value(&mut root, "a.b.c.d", Value::Null).is_err());
    }

    #[test]
    fn test_set_reuses_existing_key_casing() {
        let mut root = Value::from(json!({"Name": "a"}));
        set_path_value(&mut root, "name", Value::from("b")).unwrap();
        assert_eq!(root, Value::from(json!({"Name": "b"})));
    }

    #[test]
    fn test_remove() {
        let mut root = Value::from(json!({"a": {"b": 1, "c": [1, 2]}}));
        assert!(remove_path_value(&mut root, "a.B").unwrap());
        assert!(remove_path_value(&mut root, "a.c[0]").unwrap());
        assert!(!remove_path_value(&mut root, "a.missing").unwrap());
        assert_eq!(root, Value::from(json!({"a": {"c": [2]}})));
    }

    #[test]
    fn test_failed_set_leaves_root_untouched() {
        let mut root = Value::from(json!({"a": {"list": [1]}, "n": 3}));
        let before = root.clone();
        for path in ["x.y[3]", "a.list[5]", "a.list.key", "n.inner", "a.new[1].z"] {
            assert!(set_path_value(&mut root, path, Value::Integer(1)).is_err(), "{}", path);
            assert_eq!(root, before, "{}", path);
        }

        set_path_value(&mut root, "x.y[0].z", Value::Integer(1)).unwrap();
        set_path_value(&mut root, "a.list[1]", Value::Integer(2)).unwrap();
        assert_eq!(
            root,
            Value::from(json!({"a": {"list": [1, 2]}, "n": 3, "x": {"y": [{"z": 1}]}}))
        );
    }
}
