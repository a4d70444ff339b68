//! Text-level helpers for CSL command rendering
//!
//! Identifier quoting, string literals, and the line-oriented layout applied to
//! table commands so that a column change shows up as a one-line diff.

use once_cell::sync::Lazy;
use regex::Regex;

/// Indentation used for each element of a broken-out parenthesised list
pub const INDENT: &str = "    ";

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

/// Words that cannot be used as bare entity names
const RESERVED: &[&str] = &[
    "and", "as", "by", "consume", "contains", "count", "database", "datatable", "declare",
    "distinct", "evaluate", "extend", "externaldata", "facet", "false", "filter", "find",
    "fork", "function", "getschema", "has", "in", "invoke", "join", "let", "limit", "lookup",
    "materialize", "mv-expand", "not", "on", "or", "order", "parse", "partition", "print",
    "project", "range", "reduce", "render", "restrict", "sample", "scan", "search", "serialize",
    "set", "sort", "summarize", "table", "take", "top", "toscalar", "true", "union", "where",
    "with",
];

/// Render an entity name, bracket-quoting it when it is not a plain identifier
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_ascii_lowercase();
    if IDENTIFIER.is_match(name) && !RESERVED.contains(&lowered.as_str()) {
        name.to_string()
    } else {
        format!("['{}']", escape(name, '\''))
    }
}

/// Render a double-quoted CSL string literal
pub fn string_literal(value: &str) -> String {
    format!("\"{}\"", escape(value, '"'))
}

/// Escape `value` for use inside a CSL string literal delimited by `quote`
pub fn escape(value: &str, quote: char) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c if c == quote => {
                escaped.push('\\');
                escaped.push(c);
            }
            c => escaped.push(c),
        }
    }
    escaped
}

/// Break every top-level parenthesised list of a single-line command onto
/// indented lines, one element per line.
///
/// `(` is followed by a newline and indentation, each top-level `, ` becomes
/// `,` + newline + indentation, and the matching `)` moves to its own line.
/// String literals, bracket-quoted names, and nested parentheses are copied
/// verbatim, and `()` is left alone. Removing the inserted line breaks and
/// indentation gives back the input exactly.
pub fn break_lists(command: &str) -> String {
    let chars: Vec<char> = command.chars().collect();
    let mut out = String::with_capacity(command.len() + 64);
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(&next) = chars.get(i + 1) {
                    out.push(next);
                    i += 1;
                }
            } else if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' => {
                quote = Some(c);
                out.push(c);
            }
            '(' if depth == 0 && chars.get(i + 1) == Some(&')') => {
                out.push_str("()");
                i += 1;
            }
            '(' => {
                depth += 1;
                out.push(c);
                if depth == 1 {
                    out.push('\n');
                    out.push_str(INDENT);
                }
            }
            ')' => {
                if depth == 1 {
                    out.push('\n');
                }
                depth = depth.saturating_sub(1);
                out.push(c);
            }
            ',' if depth == 1 && chars.get(i + 1) == Some(&' ') => {
                out.push(',');
                out.push('\n');
                out.push_str(INDENT);
                i += 1;
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out
}
