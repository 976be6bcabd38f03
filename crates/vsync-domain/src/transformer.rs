//! Path transformation pipeline: ordered path rewriters, first match wins,
//! identity at tail.

use std::collections::HashMap;

use regex::Regex;

use crate::error::{Error, Kind};

/// `transform(path) -> (newPath, matched)` capability. A pack is an
/// ordered sequence of such capabilities.
pub trait Transform: Send + Sync {
    /// Attempt to rewrite `path`. Returns `(_, false)` if this rule does
    /// not apply.
    fn transform(&self, path: &str) -> (String, bool);
}

/// A named-group regex rewrite rule: `{name, from, to}`. A rule matches a
/// path iff every named group in `from` captured a non-empty substring.
#[derive(Debug)]
pub struct TransformRule {
    name: String,
    from: Regex,
    to: String,
}

impl TransformRule {
    /// Compile a new rule.
    ///
    /// # Errors
    /// Returns [`Kind::Initialization`] if `from` fails to compile.
    pub fn new(name: impl Into<String>, from: &str, to: impl Into<String>) -> Result<Self, Error> {
        let re = Regex::new(from).map_err(|e| {
            Error::fatal(
                "transformer::new_rule",
                format!("from regular expression {from:?}"),
                Kind::Initialization,
            )
            .with_source(e)
        })?;
        Ok(Self {
            name: name.into(),
            from: re,
            to: to.into(),
        })
    }

    /// The rule's name, used only for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Transform for TransformRule {
    fn transform(&self, path: &str) -> (String, bool) {
        let Some(captures) = self.from.captures(path) else {
            return (String::new(), false);
        };

        let mut match_map: HashMap<&str, &str> = HashMap::new();
        for name in self.from.capture_names().flatten() {
            let value = captures.name(name).map_or("", |m| m.as_str());
            match_map.insert(name, value);
        }

        if match_map.is_empty() {
            return (String::new(), false);
        }
        // a named group that never participated in the match counts as
        // empty, same as one that matched an empty string
        if match_map.values().any(|v| v.is_empty()) {
            return (String::new(), false);
        }

        let tokens: Vec<&str> = self
            .to
            .split('/')
            .map(|to_name| match_map.get(to_name).copied().unwrap_or(to_name))
            .collect();

        let joined = tokens.join("/");
        let collapsed = collapse_slashes(&joined);
        (collapsed, true)
    }
}

/// The identity rule: returns the input unchanged with `matched=true`,
/// guaranteeing a pack's totality when placed at the tail.
pub struct IdentityTransform;

impl Transform for IdentityTransform {
    fn transform(&self, path: &str) -> (String, bool) {
        (path.to_owned(), true)
    }
}

fn collapse_slashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_slash = false;
    for c in s.chars() {
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    out
}

/// An ordered sequence of [`Transform`] capabilities, evaluated in
/// declaration order. Returns the first successful rewrite.
pub struct TransformerPack {
    rules: Vec<Box<dyn Transform>>,
}

impl TransformerPack {
    /// Construct an empty pack.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule to the end of the pack.
    pub fn push(&mut self, rule: Box<dyn Transform>) {
        self.rules.push(rule);
    }

    /// The default pack: an identity tail only.
    pub fn default_pack() -> Self {
        let mut pack = Self::new();
        pack.push(Box::new(IdentityTransform));
        pack
    }

    /// Evaluate rules in order, returning the first successful rewrite.
    pub fn transform(&self, path: &str) -> (String, bool) {
        for rule in &self.rules {
            let (out, matched) = rule.transform(path);
            if matched {
                return (out, matched);
            }
        }
        (String::new(), false)
    }
}

impl Default for TransformerPack {
    fn default() -> Self {
        Self::default_pack()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_regex_transformer_matches_documented_cases() {
        let rule = TransformRule::new(
            "test1",
            r"(?P<mount>secret)/(?P<meta>((meta)?data))?/(?P<platform>runner)/(?P<env>(dev|test|stage|prod))?/?(?P<app>\w+)?/?",
            "platform/meta/env/app/secrets",
        )
        .unwrap();

        let (out, ok) = rule.transform("secret/metadata/runner/stage/myapp");
        assert!(ok);
        assert_eq!(out, "runner/metadata/stage/myapp/secrets");

        let (out, ok) = rule.transform("/secret/metadata/runner/stage/myapp/");
        assert!(ok);
        assert_eq!(out, "runner/metadata/stage/myapp/secrets");

        let (_, ok) = rule.transform("/secret/metadata/runner/stage/");
        assert!(!ok);
    }

    #[test]
    fn pack_falls_through_to_identity_tail() {
        let mut pack = TransformerPack::new();
        pack.push(Box::new(
            TransformRule::new("only-foo", "^foo$", "bar").unwrap(),
        ));
        pack.push(Box::new(IdentityTransform));

        let (out, ok) = pack.transform("foo");
        assert!(ok);
        assert_eq!(out, "bar");

        let (out, ok) = pack.transform("unrelated/path");
        assert!(ok);
        assert_eq!(out, "unrelated/path");
    }

    #[test]
    fn pack_without_identity_tail_can_reject() {
        let mut pack = TransformerPack::new();
        pack.push(Box::new(
            TransformRule::new("only-foo", "^foo$", "bar").unwrap(),
        ));

        let (_, ok) = pack.transform("unrelated/path");
        assert!(!ok);
    }

    #[test]
    fn transform_is_idempotent_against_identity_tail() {
        let pack = TransformerPack::default_pack();
        let (once, _) = pack.transform("a/b/c");
        let (twice, _) = pack.transform(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn invalid_regex_fails_at_construction() {
        let err = TransformRule::new("bad", "(unterminated", "x").unwrap_err();
        assert_eq!(err.kind, Kind::Initialization);
    }
}
