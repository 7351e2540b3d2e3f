//! Line-oriented script interpreter.
//!
//! Each line is macro-expanded against the script's local definitions and a
//! fresh snapshot of the environment, echoed, then either stored as a local
//! definition (`NAME=value`) or handed to the host. The first failing host
//! command stops the script.

use crate::context::ResolverContext;
use crate::error::ScriptError;
use crate::expr;
use crate::host::Host;
use crate::macros::{Frame, MacroScope, parse_definitions};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Comment lines that are not echoed.
const QUIET_COMMENT: &str = "#-";
const COMMENT: char = '#';
/// Characters that end the name of an assignment.
const NAME_END: &[char] = &['=', '(', ',', '"', '\'', ' ', '\t'];

/// Run the script at `path`.
///
/// `args` holds `name=value[,name=value...]` definitions visible to every
/// line.
pub fn run_script(
    ctx: &mut ResolverContext,
    host: &mut dyn Host,
    path: &Path,
    args: Option<&str>,
) -> Result<(), ScriptError> {
    let file = File::open(path).map_err(|source| ScriptError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!("running {} with {:?}", path.display(), args.unwrap_or(""));

    let mut scope = MacroScope::new();
    if let Some(args) = args {
        scope.define_all(parse_definitions(args));
    }

    let mut reader = BufReader::new(file);
    let mut raw = String::new();
    let mut line_no = 0;
    loop {
        raw.clear();
        let read = reader
            .read_line(&mut raw)
            .map_err(|source| ScriptError::Read {
                path: path.to_path_buf(),
                line: line_no,
                source,
            })?;
        if read == 0 {
            break;
        }
        line_no += 1;
        let line = raw.trim_end_matches(['\n', '\r']);

        let expanded = {
            let guard = scope.enter(environment_frame(ctx));
            guard.expand(line)
        };

        let text = expanded.trim_start();
        if !text.starts_with(QUIET_COMMENT) {
            host.echo(&expanded);
        }
        if text.is_empty() || text.starts_with(COMMENT) {
            continue;
        }

        if let Some((name, rhs)) = split_assignment(text) {
            let value = evaluate_assignment(rhs);
            tracing::debug!("{}:{line_no}: {name}={value}", path.display());
            scope.define(name, value);
            continue;
        }

        host.dispatch(ctx, text)
            .map_err(|e| ScriptError::Command {
                path: path.to_path_buf(),
                line: line_no,
                command: text.to_string(),
                source: e.into(),
            })?;
    }
    Ok(())
}

fn environment_frame(ctx: &ResolverContext) -> Frame {
    ctx.env
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// `NAME=rhs` when the first name-ending character is `=`.
fn split_assignment(text: &str) -> Option<(&str, &str)> {
    let end = text.find(NAME_END)?;
    if end == 0 || !text[end..].starts_with('=') {
        return None;
    }
    Some((&text[..end], &text[end + 1..]))
}

/// Value of the right hand side of an assignment line.
///
/// Numeric expressions (optionally `%`-formatted) are replaced by their
/// value. Quoted text is copied without its quotes and without evaluation.
/// Everything else is copied as written.
///
/// ```
/// use require_core::script::evaluate_assignment;
///
/// assert_eq!(evaluate_assignment("1+2"), "3");
/// assert_eq!(evaluate_assignment("\"a,b\""), "a,b");
/// assert_eq!(evaluate_assignment("ch%02d 3"), "ch03");
/// ```
pub fn evaluate_assignment(rhs: &str) -> String {
    let mut out = String::with_capacity(rhs.len());
    let mut rest = rhs;

    while !rest.is_empty() {
        if rest.starts_with('%') {
            if let Some((len, rendered)) = expr::parse_formatted(rest) {
                out.push_str(&rendered);
                rest = &rest[len..];
            } else {
                out.push('%');
                rest = &rest[1..];
            }
            continue;
        }
        if let Some((len, value)) = expr::parse_expression(rest) {
            out.push_str(&value.to_string());
            rest = &rest[len..];
        } else if rest.starts_with(['(', '+']) {
            out.push_str(&rest[..1]);
            rest = &rest[1..];
            continue;
        }
        rest = copy_text(rest, &mut out);
    }
    out
}

/// Copy text up to the next possible expression start. Always consumes at
/// least one character of non-empty input. A quoted part ends the copy.
fn copy_text<'a>(text: &'a str, out: &mut String) -> &'a str {
    for (i, c) in text.char_indices() {
        if c == '"' || c == '\'' {
            return copy_quoted(&text[i + 1..], c, out);
        }
        if i > 0 && (c.is_ascii_digit() || c == '(' || c == '%') {
            return &text[i..];
        }
        out.push(c);
    }
    ""
}

/// Copy up to the closing `quote`, keeping escapes as written. A `+`
/// directly after the quote is copied too.
fn copy_quoted<'a>(body: &'a str, quote: char, out: &mut String) -> &'a str {
    let mut chars = body.char_indices();
    let mut rest = "";
    let mut end = body.len();
    while let Some((i, c)) = chars.next() {
        if c == '\\' {
            chars.next();
        } else if c == quote {
            end = i;
            rest = &body[i + 1..];
            break;
        }
    }
    out.push_str(&body[..end]);
    if let Some(after) = rest.strip_prefix('+') {
        out.push('+');
        rest = after;
    }
    rest
}
