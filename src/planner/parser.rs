// src/planner/parser.rs

//! Plan-line grammar.
//!
//! One task per line:
//!
//! ```text
//! 1. search(query='rust async', limit=5)
//! 2. summarize("$1") (deps: [1])
//! 3. join()
//! ```
//!
//! Keyword arguments become keys of the argument object; positional
//! arguments are keyed by their position (`"0"`, `"1"`, ...). Lines that do
//! not look like a task are ignored.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::dag::{TaskId, TaskSpec};

static TASK_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*+]\s+)?(\d+)\s*[.):]\s*([A-Za-z_][\w.\-]*)\s*\(")
        .expect("task head regex is valid")
});

static DEPS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\(\s*deps\s*:\s*\[([^\]]*)\]\s*\)").expect("deps regex is valid")
});

/// Parse a single plan line, or `None` if it is not a task line.
pub fn parse_task_line(line: &str) -> Option<TaskSpec> {
    let head = TASK_HEAD.captures(line)?;
    let id: TaskId = head[1].parse().ok().filter(|id| *id > 0)?;
    let tool = head[2].to_string();
    let after_open = head.get(0)?.end();

    let (inner, rest) = split_call(&line[after_open..])?;
    let deps = DEPS
        .captures(rest)
        .map(|c| parse_dep_list(&c[1]))
        .unwrap_or_default();

    Some(
        TaskSpec::new(id, tool)
            .with_args(parse_args(inner))
            .with_deps(deps),
    )
}

/// Parse a complete plan text.
pub fn parse_plan(text: &str) -> Vec<TaskSpec> {
    text.lines().filter_map(parse_line_logged).collect()
}

fn parse_line_logged(line: &str) -> Option<TaskSpec> {
    let parsed = parse_task_line(line);
    if parsed.is_none() && !line.trim().is_empty() {
        debug!(line, "ignoring non-task plan line");
    }
    parsed
}

/// Split `"a, b) rest"` at the parenthesis closing the call.
fn split_call(s: &str) -> Option<(&str, &str)> {
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&s[..i], &s[i + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

/// Byte offsets of `target` occurring outside quotes and brackets.
fn top_level_positions(s: &str, target: char) -> Vec<usize> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            c if c == target && depth == 0 => out.push(i),
            _ => {}
        }
    }
    out
}

fn split_top_level(s: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for pos in top_level_positions(s, ',') {
        pieces.push(&s[start..pos]);
        start = pos + 1;
    }
    pieces.push(&s[start..]);
    pieces
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn parse_args(inner: &str) -> Value {
    let mut map = Map::new();
    let mut position = 0usize;

    for piece in split_top_level(inner) {
        let keyword = top_level_positions(piece, '=')
            .first()
            .map(|&eq| (piece[..eq].trim(), piece[eq + 1..].trim()))
            .filter(|(key, _)| is_identifier(key));

        match keyword {
            Some((key, raw)) => {
                map.insert(key.to_string(), parse_value(raw));
            }
            None => {
                map.insert(position.to_string(), parse_value(piece));
                position += 1;
            }
        }
    }

    Value::Object(map)
}

fn parse_value(raw: &str) -> Value {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' || first == b'"') && first == last {
            return Value::String(unescape(&raw[1..raw.len() - 1]));
        }
    }

    match raw {
        "true" | "True" => return Value::Bool(true),
        "false" | "False" => return Value::Bool(false),
        "null" | "None" => return Value::Null,
        _ => {}
    }

    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    if raw.starts_with('[') || raw.starts_with('{') {
        if let Ok(v) = serde_json::from_str(raw) {
            return v;
        }
    }

    Value::String(raw.to_string())
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(c @ ('\\' | '\'' | '"')) => out.push(c),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn parse_dep_list(list: &str) -> Vec<TaskId> {
    list.split(',')
        .filter_map(|d| d.trim().trim_start_matches('$').parse().ok())
        .collect()
}

/// Splits arbitrarily chunked output into complete lines.
///
/// Chunks are raw bytes, so a chunk may end inside a multi-byte character;
/// lines are only decoded once their newline has arrived.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: impl AsRef<[u8]>) -> Vec<String> {
        self.pending.extend_from_slice(chunk.as_ref());
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }

    /// Flush the trailing partial line, if any.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let rest = String::from_utf8_lossy(&rest).into_owned();
        (!rest.trim().is_empty()).then_some(rest)
    }
}

/// Incremental plan parser: feed chunks, get tasks as their lines complete.
#[derive(Debug, Default)]
pub struct PlanParser {
    lines: LineBuffer,
}

impl PlanParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> Vec<TaskSpec> {
        self.lines
            .push(chunk)
            .iter()
            .filter_map(|l| parse_line_logged(l))
            .collect()
    }

    pub fn finish(&mut self) -> Option<TaskSpec> {
        self.lines.finish().as_deref().and_then(parse_line_logged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_keyword_arguments_and_deps() {
        let spec =
            parse_task_line("2. summarize(text='$1', max_words=50) (deps: [1, 3])").unwrap();
        assert_eq!(spec.id, 2);
        assert_eq!(spec.tool, "summarize");
        assert_eq!(spec.args, json!({"text": "$1", "max_words": 50}));
        assert_eq!(spec.deps, vec![1, 3]);
    }

    #[test]
    fn positional_arguments_are_keyed_by_position() {
        let spec = parse_task_line("3. summarize($1, \"$2\")").unwrap();
        assert_eq!(spec.args, json!({"0": "$1", "1": "$2"}));
        assert!(spec.deps.is_empty());
    }

    #[test]
    fn quoted_values_may_contain_separators() {
        let spec = parse_task_line(r#"1. search(q="a, (b) = c", note='it\'s')"#).unwrap();
        assert_eq!(spec.args, json!({"q": "a, (b) = c", "note": "it's"}));
    }

    #[test]
    fn scalars_are_typed() {
        let spec =
            parse_task_line("1. t(a=1, b=2.5, c=true, d=None, e=word, f=[1, 2])").unwrap();
        assert_eq!(
            spec.args,
            json!({"a": 1, "b": 2.5, "c": true, "d": null, "e": "word", "f": [1, 2]})
        );
    }

    #[test]
    fn bullets_and_join_lines_are_accepted() {
        let spec = parse_task_line("  - 4. join()").unwrap();
        assert_eq!(spec.id, 4);
        assert!(spec.is_join());
        assert_eq!(spec.args, json!({}));
    }

    #[test]
    fn rejects_non_task_lines() {
        assert!(parse_task_line("Thought: I should search first").is_none());
        assert!(parse_task_line("0. search('x')").is_none());
        assert!(parse_task_line("1. search('unterminated").is_none());
        assert!(parse_task_line("").is_none());
    }

    #[test]
    fn parse_plan_skips_noise() {
        let plan = "Thought: plan\n1. a()\n\n2. b($1)\n3. join()\n";
        let ids: Vec<_> = parse_plan(plan).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn line_buffer_reassembles_chunks() {
        let mut buf = LineBuffer::new();
        assert!(buf.push("1. a(").is_empty());
        assert_eq!(buf.push("x=1)\r\n2. b"), vec!["1. a(x=1)".to_string()]);
        assert_eq!(buf.push("()\n"), vec!["2. b()".to_string()]);
        assert_eq!(buf.finish(), None);

        buf.push("3. c()");
        assert_eq!(buf.finish().as_deref(), Some("3. c()"));
    }

    #[test]
    fn line_buffer_keeps_characters_split_across_chunks() {
        let bytes = "1. say(text='café')\n".as_bytes();
        let split = bytes.len() - 4; // inside the two-byte 'é'
        let mut buf = LineBuffer::new();
        assert!(buf.push(&bytes[..split]).is_empty());
        assert_eq!(buf.push(&bytes[split..]), vec!["1. say(text='café')".to_string()]);
    }

    #[test]
    fn plan_parser_emits_tasks_as_lines_complete() {
        let mut parser = PlanParser::new();
        let first = parser.feed("1. search(q='a')\n2. sea");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, 1);
        let second = parser.feed("rch(q='b')\n3. join(");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, 2);
        assert!(parser.feed(")").is_empty());
        let last = parser.finish().unwrap();
        assert!(last.is_join());
    }
}
