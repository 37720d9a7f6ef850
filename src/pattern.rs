//! Path templates.
//!
//! Templates are written as plain paths with placeholders:
//!
//! | Template | Compiled expression |
//! |---|---|
//! | `/users/{id}/books` | `^/users/(?P<id>.+)/books$` |
//! | `/users/{id:[0-9]+}/books` | `^/users/(?P<id>[0-9]+)/books$` |
//! | `/users/{userId}/books/{bookId}` | `^/users/(?P<userId>.+)/books/(?P<bookId>.+)$` |
//!
//! Segments outside placeholders are used as regular-expression text, so a
//! template such as `/.+` matches every path below the root. The template `*`
//! matches every path and captures nothing.

use regex::Regex;

/// The match-all template.
pub const ANY: &str = "*";

/// A compiled path template.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Option<Regex>,
}

impl PathPattern {
    pub fn compile(source: &str) -> Result<Self, regex::Error> {
        if source == ANY {
            return Ok(Self {
                source: source.to_string(),
                regex: None,
            });
        }
        let regex = Regex::new(&template_to_regex(source))?;
        Ok(Self {
            source: source.to_string(),
            regex: Some(regex),
        })
    }

    /// The template as registered.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_wildcard(&self) -> bool {
        self.regex.is_none()
    }

    /// True for the wildcard, a case-insensitive literal match, or a full regex match.
    pub fn matches(&self, path: &str) -> bool {
        match &self.regex {
            None => true,
            Some(regex) => self.source.eq_ignore_ascii_case(path) || regex.is_match(path),
        }
    }

    /// Named placeholder values captured from `path`, in template order.
    pub fn params(&self, path: &str) -> Vec<(String, String)> {
        let Some(regex) = &self.regex else {
            return Vec::new();
        };
        let Some(captures) = regex.captures(path) else {
            return Vec::new();
        };
        regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                captures
                    .name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect()
    }
}

fn template_to_regex(template: &str) -> String {
    let parts: Vec<String> = template
        .split('/')
        .map(|part| {
            let placeholder = part
                .strip_prefix('{')
                .and_then(|p| p.strip_suffix('}'));
            match placeholder {
                Some(inner) => {
                    let (name, expr) = inner.split_once(':').unwrap_or((inner, ".+"));
                    format!("(?P<{}>{})", name, expr)
                }
                None => part.to_string(),
            }
        })
        .collect();
    format!("^{}$", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_to_regex() {
        assert_eq!(template_to_regex("/users/{id}/books"), "^/users/(?P<id>.+)/books$");
        assert_eq!(
            template_to_regex("/users/{id:[0-9]+}/books"),
            "^/users/(?P<id>[0-9]+)/books$"
        );
        assert_eq!(
            template_to_regex("/users/{userId}/books/{bookId}"),
            "^/users/(?P<userId>.+)/books/(?P<bookId>.+)$"
        );
    }

    #[test]
    fn test_matches_is_anchored() {
        let pattern = PathPattern::compile("/{id}/convert").unwrap();
        assert!(pattern.matches("/abc123/convert"));
        assert!(!pattern.matches("/abc123/convert/more"));
        assert!(!pattern.matches("/abc123/view"));
    }

    #[test]
    fn test_typed_placeholder() {
        let pattern = PathPattern::compile("/users/{id:[0-9]+}").unwrap();
        assert!(pattern.matches("/users/42"));
        assert!(!pattern.matches("/users/abc"));
    }

    #[test]
    fn test_params_extraction() {
        let pattern = PathPattern::compile("/users/{userId}/books/{bookId}").unwrap();
        let params = pattern.params("/users/u1/books/b2");
        assert_eq!(
            params,
            vec![
                ("userId".to_string(), "u1".to_string()),
                ("bookId".to_string(), "b2".to_string())
            ]
        );
        assert!(pattern.params("/other").is_empty());
    }

    #[test]
    fn test_wildcard_and_literal() {
        let any = PathPattern::compile(ANY).unwrap();
        assert!(any.is_wildcard());
        assert!(any.matches("/anything/at/all"));
        assert!(any.params("/x").is_empty());

        let literal = PathPattern::compile("/Users").unwrap();
        assert!(literal.matches("/users"));
    }

    #[test]
    fn test_invalid_expression_is_rejected() {
        assert!(PathPattern::compile("/users/{id:[0-9}").is_err());
    }
}
