//! Path patterns for route-scoped voters.
//!
//! Patterns use the familiar express-style syntax:
//! - `:name` captures one path segment
//! - `:name?` captures an optional segment (the leading `/` is optional too)
//! - `:name(\d+)` captures a segment matching a custom expression
//! - `*` captures anything, including `/`; wildcards are named `0`, `1`, ...
//!
//! Matching is case-insensitive, anchored at both ends and tolerates a single
//! trailing slash.

use regex::Regex;

use super::{AuthzError, context::Params};

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
    keys: Vec<String>,
}

impl PathPattern {
    pub fn compile(pattern: &str) -> Result<Self, AuthzError> {
        let mut expr = String::from("(?i)^");
        let mut keys = Vec::new();
        let mut wildcards = 0usize;
        let mut literal = String::new();
        let mut chars = pattern.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                ':' => {
                    let name = take_name(&mut chars);
                    if name.is_empty() {
                        return Err(AuthzError::invalid_argument(format!(
                            "Path pattern '{pattern}' has an unnamed parameter at offset {pos}"
                        )));
                    }
                    let capture = if chars.peek().is_some_and(|&(_, c)| c == '(') {
                        chars.next();
                        take_group(&mut chars).ok_or_else(|| {
                            AuthzError::invalid_argument(format!(
                                "Path pattern '{pattern}' has an unbalanced group for ':{name}'"
                            ))
                        })?
                    } else {
                        "[^/]+?".to_string()
                    };
                    let optional = chars.peek().is_some_and(|&(_, c)| c == '?');
                    if optional {
                        chars.next();
                    }

                    // An optional parameter swallows the separator in front of it
                    let slash = literal.ends_with('/');
                    if optional && slash {
                        literal.pop();
                    }
                    expr.push_str(&regex::escape(&literal));
                    literal.clear();

                    match (optional, slash) {
                        (true, true) => expr.push_str(&format!("(?:/({capture}))?")),
                        (true, false) => expr.push_str(&format!("({capture})?")),
                        (false, _) => expr.push_str(&format!("({capture})")),
                    }
                    keys.push(name);
                }
                '*' => {
                    expr.push_str(&regex::escape(&literal));
                    literal.clear();
                    expr.push_str("(.*)");
                    keys.push(wildcards.to_string());
                    wildcards += 1;
                }
                _ => literal.push(c),
            }
        }

        let literal = literal.strip_suffix('/').unwrap_or(&literal);
        expr.push_str(&regex::escape(literal));
        expr.push_str("/?$");

        let regex = Regex::new(&expr).map_err(|e| {
            AuthzError::invalid_argument(format!("Path pattern '{pattern}' is invalid: {e}"))
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            keys,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Parameter names in declaration order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Match a concrete path, returning the captured parameters.
    ///
    /// Optional parameters that did not participate in the match are absent
    /// from the result.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let captures = self.regex.captures(path)?;
        Some(
            self.keys
                .iter()
                .enumerate()
                .filter_map(|(i, key)| {
                    captures
                        .get(i + 1)
                        .map(|value| (key.as_str(), value.as_str()))
                })
                .collect(),
        )
    }
}

fn take_name<I>(chars: &mut std::iter::Peekable<I>) -> String
where
    I: Iterator<Item = (usize, char)>,
{
    let mut name = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    name
}

/// Read a custom capture expression up to its closing parenthesis.
fn take_group<I>(chars: &mut std::iter::Peekable<I>) -> Option<String>
where
    I: Iterator<Item = (usize, char)>,
{
    let mut depth = 1usize;
    let mut group = String::new();
    let mut escaped = false;
    for (_, c) in chars.by_ref() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '(' {
            depth += 1;
        } else if c == ')' {
            depth -= 1;
            if depth == 0 {
                return Some(format!("(?:{group})"));
            }
        }
        group.push(c);
    }
    None
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn captured(pattern: &str, path: &str) -> Option<Vec<(String, String)>> {
        PathPattern::compile(pattern)
            .unwrap()
            .matches(path)
            .map(|params| {
                params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
    }

    #[rstest]
    #[case::named("/x/:p", "/x/42", Some(vec![("p", "42")]))]
    #[case::trailing_slash("/x/:p", "/x/42/", Some(vec![("p", "42")]))]
    #[case::too_long("/x/:p", "/x/42/extra", None)]
    #[case::missing_segment("/x/:p", "/x", None)]
    #[case::case_insensitive("/Users/:id", "/users/ada", Some(vec![("id", "ada")]))]
    #[case::declaration_order(
        "/orgs/:org/teams/:team",
        "/orgs/acme/teams/core",
        Some(vec![("org", "acme"), ("team", "core")])
    )]
    #[case::optional_present("/files/:name?", "/files/a.txt", Some(vec![("name", "a.txt")]))]
    #[case::optional_absent("/files/:name?", "/files", Some(vec![]))]
    #[case::custom_group("/items/:id(\\d+)", "/items/17", Some(vec![("id", "17")]))]
    #[case::custom_group_mismatch("/items/:id(\\d+)", "/items/abc", None)]
    #[case::wildcard("/static/*", "/static/css/site.css", Some(vec![("0", "css/site.css")]))]
    #[case::literal_dots("/a.b", "/axb", None)]
    fn test_matches(
        #[case] pattern: &str,
        #[case] path: &str,
        #[case] expected: Option<Vec<(&str, &str)>>,
    ) {
        let expected = expected.map(|pairs| {
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>()
        });
        assert_eq!(captured(pattern, path), expected);
    }

    #[test]
    fn test_keys_in_declaration_order() {
        let pattern = PathPattern::compile("/a/:first/b/:second/*").unwrap();
        assert_eq!(pattern.keys(), ["first", "second", "0"]);
        assert_eq!(pattern.as_str(), "/a/:first/b/:second/*");
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(matches!(
            PathPattern::compile("/a/:/b"),
            Err(AuthzError::InvalidArgument(_))
        ));
        assert!(matches!(
            PathPattern::compile("/a/:id(\\d+"),
            Err(AuthzError::InvalidArgument(_))
        ));
    }
}
