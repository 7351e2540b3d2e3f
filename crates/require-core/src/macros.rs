//! Macro scope and `$(name)` substitution for script lines.
//!
//! Local definitions (script arguments and assignments) take precedence over
//! the frames pushed for each line, which carry a snapshot of the
//! environment. A frame lives exactly as long as the [`ScopeGuard`] returned
//! by [`MacroScope::enter`].

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

/// Nesting limit for macro values that reference other macros.
pub const MAX_EXPANSION_DEPTH: usize = 16;

/// Name to value bindings.
pub type Frame = BTreeMap<String, String>;

/// Bindings consulted when expanding a line.
#[derive(Debug, Default, Clone)]
pub struct MacroScope {
    locals: Frame,
    frames: Vec<Frame>,
}

impl MacroScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` for the rest of the script.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        tracing::trace!("macro {name}={value}");
        self.locals.insert(name, value);
    }

    pub fn define_all<I>(&mut self, definitions: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in definitions {
            self.define(name, value);
        }
    }

    /// Push `frame` until the returned guard is dropped.
    pub fn enter(&mut self, frame: Frame) -> ScopeGuard<'_> {
        self.frames.push(frame);
        ScopeGuard { scope: self }
    }

    /// Number of frames currently pushed.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Raw value bound to `name`, innermost binding first.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.locals
            .get(name)
            .or_else(|| self.frames.iter().rev().find_map(|f| f.get(name)))
            .map(String::as_str)
    }

    /// Substitute every `$(name)`, `${name}`, `$(name=default)` and
    /// `${name=default}` in `text`.
    ///
    /// Values are expanded in turn. References to unbound names without a
    /// default are left as written.
    ///
    /// ```
    /// use require_core::macros::MacroScope;
    ///
    /// let mut scope = MacroScope::new();
    /// scope.define("P", "IOC:");
    /// assert_eq!(scope.expand("$(P)ai ${R=x} $(Q)"), "IOC:ai x $(Q)");
    /// ```
    pub fn expand(&self, text: &str) -> String {
        self.expand_at(text, 0)
    }

    fn expand_at(&self, text: &str, depth: usize) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(dollar) = rest.find('$') {
            out.push_str(&rest[..dollar]);
            let after = &rest[dollar + 1..];
            let close = match after.as_bytes().first() {
                Some(b'(') => b')',
                Some(b'{') => b'}',
                _ => {
                    out.push('$');
                    rest = after;
                    continue;
                }
            };
            let Some(end) = matching_close(after, close) else {
                out.push_str(&rest[dollar..]);
                return out;
            };
            let reference = &rest[dollar..=dollar + 1 + end];
            out.push_str(&self.substitute(&after[1..end], reference, depth));
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        out
    }

    fn substitute(&self, body: &str, reference: &str, depth: usize) -> String {
        if depth >= MAX_EXPANSION_DEPTH {
            tracing::warn!("macro recursion too deep expanding {reference}");
            return reference.to_string();
        }
        let (name, default) = match body.split_once('=') {
            Some((name, default)) => (name, Some(default)),
            None => (body, None),
        };
        let name = self.expand_at(name, depth + 1);
        match (self.lookup(&name), default) {
            (Some(value), _) | (None, Some(value)) => self.expand_at(value, depth + 1),
            (None, None) => reference.to_string(),
        }
    }
}

/// Index in `text` of the bracket closing the one at `text[0]`.
fn matching_close(text: &str, close: u8) -> Option<usize> {
    let mut nesting = 0usize;
    for (i, c) in text.bytes().enumerate().skip(1) {
        match c {
            b'(' | b'{' => nesting += 1,
            b')' | b'}' if nesting > 0 => nesting -= 1,
            c if c == close => return Some(i),
            _ => {}
        }
    }
    None
}

/// Active frame of a [`MacroScope`]; popped on drop.
#[derive(Debug)]
pub struct ScopeGuard<'a> {
    scope: &'a mut MacroScope,
}

impl Deref for ScopeGuard<'_> {
    type Target = MacroScope;

    fn deref(&self) -> &MacroScope {
        self.scope
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut MacroScope {
        self.scope
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.scope.frames.pop();
    }
}

/// Parse `name=value[,name=value...]` macro definitions.
///
/// Commas inside quotes do not separate definitions; unescaped quotes are
/// removed from values. Entries without `=` are ignored.
///
/// ```
/// use require_core::macros::parse_definitions;
///
/// let defs = parse_definitions("P=IOC:, LIST=\"a,b\"");
/// assert_eq!(defs, vec![
///     ("P".to_string(), "IOC:".to_string()),
///     ("LIST".to_string(), "a,b".to_string()),
/// ]);
/// ```
pub fn parse_definitions(text: &str) -> Vec<(String, String)> {
    split_unquoted(text, ',')
        .into_iter()
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let Some((name, value)) = entry.split_once('=') else {
                tracing::warn!("ignoring macro definition without value: {entry}");
                return None;
            };
            Some((name.trim().to_string(), strip_quotes(value.trim())))
        })
        .collect()
}

/// Split on `separator` outside of quotes, honouring backslash escapes.
fn split_unquoted(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (c, quote) {
            ('\\', _) => escaped = true,
            ('"' | '\'', None) => quote = Some(c),
            (c, Some(q)) if c == q => quote = None,
            (c, None) if c == separator => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn strip_quotes(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut quote = None;
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match (c, quote) {
            ('\\', _) => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            ('"' | '\'', None) => quote = Some(c),
            (c, Some(q)) if c == q => quote = None,
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(pairs: &[(&str, &str)]) -> Frame {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_locals_shadow_frames() {
        let mut scope = MacroScope::new();
        scope.define("A", "local");
        let guard = scope.enter(frame(&[("A", "env"), ("B", "env")]));
        assert_eq!(guard.lookup("A"), Some("local"));
        assert_eq!(guard.lookup("B"), Some("env"));
    }

    #[test]
    fn test_frame_popped_on_drop() {
        let mut scope = MacroScope::new();
        {
            let mut guard = scope.enter(frame(&[("HOME", "/root")]));
            assert_eq!(guard.depth(), 1);
            assert_eq!(guard.expand("$(HOME)"), "/root");
            guard.define("X", "3");
        }
        assert_eq!(scope.depth(), 0);
        assert_eq!(scope.expand("$(HOME)"), "$(HOME)");
        assert_eq!(scope.expand("$(X)"), "3");
    }

    #[test]
    fn test_frames_refresh_per_line() {
        let mut scope = MacroScope::new();
        for value in ["1", "2"] {
            let guard = scope.enter(frame(&[("V", value)]));
            assert_eq!(guard.expand("v=$(V)"), format!("v={value}"));
        }
    }

    #[test]
    fn test_nested_and_defaults() {
        let mut scope = MacroScope::new();
        scope.define("N", "2");
        scope.define("P2", "second");
        scope.define("REF", "$(P$(N))");
        assert_eq!(scope.expand("$(P$(N))"), "second");
        assert_eq!(scope.expand("${REF}"), "second");
        assert_eq!(scope.expand("$(MISSING=$(N)0)"), "20");
        assert_eq!(scope.expand("$(N=9)"), "2");
    }

    #[test]
    fn test_literals_and_unterminated() {
        let scope = MacroScope::new();
        assert_eq!(scope.expand("cost $5"), "cost $5");
        assert_eq!(scope.expand("end$"), "end$");
        assert_eq!(scope.expand("$(OPEN"), "$(OPEN");
    }

    #[test]
    fn test_self_reference_stops() {
        let mut scope = MacroScope::new();
        scope.define("A", "$(A)");
        assert_eq!(scope.expand("$(A)"), "$(A)");
    }

    #[test]
    fn test_parse_definitions() {
        let defs = parse_definitions(" A = 1 ,B='x, y',C=a\\,b,,D");
        assert_eq!(
            defs,
            vec![
                ("A".to_string(), "1".to_string()),
                ("B".to_string(), "x, y".to_string()),
                ("C".to_string(), "a\\,b".to_string()),
            ]
        );
        assert!(parse_definitions("").is_empty());
    }
}
