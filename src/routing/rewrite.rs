//! Prefix rewriting.
//!
//! The matched prefix is replaced; the remainder of the path is kept.
//! An empty or "/" replacement strips the prefix.

/// Replacement for a matched prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRewrite {
    /// Replacement without trailing slash; "" strips the prefix.
    replacement: String,
}

impl PathRewrite {
    pub fn new(replacement: impl Into<String>) -> Self {
        let replacement = replacement.into();
        Self {
            replacement: replacement.trim_end_matches('/').to_string(),
        }
    }

    /// Configured replacement as written, "/" when the prefix is stripped.
    pub fn replacement(&self) -> &str {
        if self.replacement.is_empty() {
            "/"
        } else {
            &self.replacement
        }
    }

    /// Rewrite given the path remainder after the matched prefix.
    pub fn apply(&self, remainder: &str) -> String {
        let rest = remainder.trim_start_matches('/');
        match (self.replacement.is_empty(), rest.is_empty()) {
            (true, true) => "/".to_string(),
            (true, false) => format!("/{}", rest),
            (false, true) => self.replacement.clone(),
            (false, false) => format!("{}/{}", self.replacement, rest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_prefix() {
        let rewrite = PathRewrite::new("/");
        assert_eq!(rewrite.apply("/chat"), "/chat");
        assert_eq!(rewrite.apply(""), "/");
        assert_eq!(rewrite.apply("/"), "/");
        assert_eq!(PathRewrite::new("").apply("/a/b"), "/a/b");
    }

    #[test]
    fn replace_prefix() {
        let rewrite = PathRewrite::new("/v2/");
        assert_eq!(rewrite.apply("/tools"), "/v2/tools");
        assert_eq!(rewrite.apply(""), "/v2");
    }

    #[test]
    fn keeps_trailing_slash_of_remainder() {
        assert_eq!(PathRewrite::new("/api").apply("/x/"), "/api/x/");
    }
}
