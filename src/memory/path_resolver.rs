/// A pure string rewrite that expands a shorthand prefix into a
/// scope-qualified path.
pub trait PathResolver: Send + Sync {
    fn transform_path(&self, path: &str) -> String;
}

/// Rewrites `<alias>name.rest` into `<prefix>name<postfix>.rest`.
///
/// Only applies when the alias starts the path and is directly followed by
/// a name character, so `x.$y` and a bare `$` are left alone.
#[derive(Debug, Clone)]
pub struct AliasPathResolver {
    alias: String,
    prefix: String,
    postfix: String,
}

impl AliasPathResolver {
    pub fn new(alias: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::with_postfix(alias, prefix, "")
    }

    pub fn with_postfix(
        alias: impl Into<String>,
        prefix: impl Into<String>,
        postfix: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            prefix: prefix.into().trim().to_string(),
            postfix: postfix.into().trim().to_string(),
        }
    }

    /// `$name` → `dialog.name`
    pub fn dollar() -> Self {
        Self::new("$", "dialog.")
    }

    /// `#name` → `turn.recognized.intents.name`
    pub fn hash() -> Self {
        Self::new("#", "turn.recognized.intents.")
    }

    /// `@@name` → `turn.recognized.entities.name`
    pub fn at_at() -> Self {
        Self::new("@@", "turn.recognized.entities.")
    }

    /// `@name` → `turn.recognized.entities.name.first()`
    pub fn at() -> Self {
        Self::with_postfix("@", "turn.recognized.entities.", ".first()")
    }

    /// `%name` → `class.name`
    pub fn percent() -> Self {
        Self::new("%", "class.")
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl PathResolver for AliasPathResolver {
    fn transform_path(&self, path: &str) -> String {
        let path = path.trim();
        let Some(rest) = path.strip_prefix(self.alias.as_str()) else {
            return path.to_string();
        };
        if !rest.chars().next().is_some_and(is_name_char) {
            return path.to_string();
        }
        let end = rest.find(['.', '[']).unwrap_or(rest.len());
        let (name, tail) = rest.split_at(end);
        let tail = tail.trim_end_matches('.');
        format!("{}{}{}{}", self.prefix, name, self.postfix, tail)
    }
}

/// Resolvers applied, in order, by a default registry.
pub fn default_resolvers() -> Vec<std::sync::Arc<dyn PathResolver>> {
    vec![
        std::sync::Arc::new(AliasPathResolver::dollar()),
        std::sync::Arc::new(AliasPathResolver::hash()),
        std::sync::Arc::new(AliasPathResolver::at_at()),
        std::sync::Arc::new(AliasPathResolver::at()),
        std::sync::Arc::new(AliasPathResolver::percent()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_all(path: &str) -> String {
        default_resolvers()
            .iter()
            .fold(path.to_string(), |path, resolver| resolver.transform_path(&path))
    }

    #[test]
    fn test_shorthand_prefixes() {
        assert_eq!(apply_all("$name"), "dialog.name");
        assert_eq!(apply_all("$user.age"), "dialog.user.age");
        assert_eq!(apply_all("#Greeting.score"), "turn.recognized.intents.Greeting.score");
        assert_eq!(apply_all("@@city"), "turn.recognized.entities.city");
        assert_eq!(apply_all("@city"), "turn.recognized.entities.city.first()");
        assert_eq!(
            apply_all("@city.name"),
            "turn.recognized.entities.city.first().name"
        );
        assert_eq!(apply_all("%prompt"), "class.prompt");
        assert_eq!(apply_all("$items[0]"), "dialog.items[0]");
    }

    #[test]
    fn test_non_matching_paths_are_untouched() {
        assert_eq!(apply_all("user.name"), "user.name");
        assert_eq!(apply_all("x.$foo"), "x.$foo");
        assert_eq!(apply_all("$"), "$");
        assert_eq!(apply_all("$.x"), "$.x");
    }

    #[test]
    fn test_trailing_dot_is_trimmed() {
        assert_eq!(AliasPathResolver::dollar().transform_path("$name."), "dialog.name");
    }
}
