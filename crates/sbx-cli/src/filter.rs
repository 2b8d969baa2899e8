//! # Filter Expressions
//!
//! Parses the `--where` argument into condition groups.
//!
//! Syntax:
//! ```text
//! age >= 30 AND name STARTSWITH "Am" OR state IS NULL
//! (status IN ("open", "held") AND total > 10) OR (owner = "k1")
//! ```
//!
//! Without parentheses the whole expression is one AND group. With them,
//! every top-level operand must be a parenthesised group, joined to the
//! previous group by the `AND`/`OR` in front of it. Values read like JSON
//! literals: `12`, `1.5`, `true`, `null`, `"quoted"`; anything else is a
//! bare string.

use sbx_core::{Combinator, Condition, ConditionGroup, Operator, QueryValue};

pub fn parse(input: &str) -> Result<Vec<ConditionGroup>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Vec::new());
    }

    let parts = split_top_level(input)?;

    if !parts.iter().any(|(_, part)| is_group(part)) {
        let mut group = ConditionGroup::new(Combinator::And);
        for (combinator, part) in parts {
            group.conditions.push(parse_condition(combinator, part)?);
        }
        return Ok(vec![group]);
    }

    let mut groups = Vec::new();
    for (combinator, part) in parts {
        if !is_group(part) {
            return Err(format!(
                "'{}' must be parenthesised when groups are used",
                part
            ));
        }
        let mut group = ConditionGroup::new(combinator);
        for (inner, cond) in split_top_level(&part[1..part.len() - 1])? {
            group.conditions.push(parse_condition(inner, cond)?);
        }
        groups.push(group);
    }
    Ok(groups)
}

/// Split on `AND`/`OR` outside quotes and parentheses. The first operand
/// gets `AND`.
fn split_top_level(s: &str) -> Result<Vec<(Combinator, &str)>, String> {
    let bytes = s.as_bytes();
    let mut parts = Vec::new();
    let mut combinator = Combinator::And;
    let mut start = 0;
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            b'"' | b'\'' => quote = Some(c),
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(format!("unbalanced ')' in '{}'", s));
                }
            }
            _ if depth == 0 && (i == 0 || bytes[i - 1].is_ascii_whitespace() || bytes[i - 1] == b')') => {
                if let Some((next, len)) = combinator_at(&bytes[i..]) {
                    parts.push((combinator, non_empty(&s[start..i])?));
                    combinator = next;
                    i += len;
                    start = i;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }

    if quote.is_some() {
        return Err(format!("unterminated string in '{}'", s));
    }
    if depth != 0 {
        return Err(format!("unbalanced '(' in '{}'", s));
    }
    parts.push((combinator, non_empty(&s[start..])?));
    Ok(parts)
}

fn combinator_at(rest: &[u8]) -> Option<(Combinator, usize)> {
    let boundary = |b: Option<&u8>| match b {
        Some(c) => c.is_ascii_whitespace() || *c == b'(',
        None => true,
    };
    if rest.len() >= 3 && rest[..3].eq_ignore_ascii_case(b"AND") && boundary(rest.get(3)) {
        Some((Combinator::And, 3))
    } else if rest.len() >= 2 && rest[..2].eq_ignore_ascii_case(b"OR") && boundary(rest.get(2)) {
        Some((Combinator::Or, 2))
    } else {
        None
    }
}

fn non_empty(part: &str) -> Result<&str, String> {
    let part = part.trim();
    if part.is_empty() {
        Err("empty condition".to_string())
    } else {
        Ok(part)
    }
}

/// `( ... )` where the opening paren closes at the very end.
fn is_group(part: &str) -> bool {
    if !part.starts_with('(') || !part.ends_with(')') {
        return false;
    }
    let mut depth = 0;
    let mut quote: Option<char> = None;
    for (i, c) in part.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 {
                    return i == part.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

fn parse_condition(combinator: Combinator, part: &str) -> Result<Condition, String> {
    let field_end = part
        .find(|c: char| c.is_whitespace() || "<>!=".contains(c))
        .ok_or_else(|| format!("Cannot parse condition: '{}'", part))?;
    let field = &part[..field_end];
    let rest = part[field_end..].trim_start();
    if field.is_empty() {
        return Err(format!("missing field in '{}'", part));
    }

    for (symbol, op) in [
        (">=", Operator::Gte),
        ("<=", Operator::Lte),
        ("!=", Operator::Neq),
        (">", Operator::Gt),
        ("<", Operator::Lt),
        ("=", Operator::Eq),
    ] {
        if let Some(value) = rest.strip_prefix(symbol) {
            return Ok(Condition::new(combinator, field, op, parse_value(value.trim())?));
        }
    }

    let upper = rest.to_ascii_uppercase();
    if upper == "IS NULL" {
        return Ok(Condition::is_null(combinator, field));
    }
    if upper == "IS NOT NULL" {
        return Ok(Condition::is_not_null(combinator, field));
    }
    if let Some(list) = keyword_arg(rest, &upper, "NOT IN") {
        return Ok(Condition::not_in(combinator, field, parse_list(list)?));
    }
    if let Some(list) = keyword_arg(rest, &upper, "IN") {
        return Ok(Condition::is_in(combinator, field, parse_list(list)?));
    }
    if let Some(value) = keyword_arg(rest, &upper, "LIKE") {
        return Ok(Condition::new(combinator, field, Operator::Like, text(value)?));
    }
    if let Some(value) = keyword_arg(rest, &upper, "CONTAINS") {
        return Ok(Condition::contains(combinator, field, &text(value)?));
    }
    if let Some(value) = keyword_arg(rest, &upper, "STARTSWITH") {
        return Ok(Condition::starts_with(combinator, field, &text(value)?));
    }
    if let Some(value) = keyword_arg(rest, &upper, "ENDSWITH") {
        return Ok(Condition::ends_with(combinator, field, &text(value)?));
    }

    Err(format!("Cannot parse condition: '{}'", part))
}

/// Argument after `keyword`, which must be followed by whitespace or `(`.
fn keyword_arg<'a>(rest: &'a str, upper: &str, keyword: &str) -> Option<&'a str> {
    let after = upper.strip_prefix(keyword)?;
    if !(after.starts_with(char::is_whitespace) || after.starts_with('(')) {
        return None;
    }
    Some(rest[keyword.len()..].trim())
}

fn parse_list(s: &str) -> Result<Vec<QueryValue>, String> {
    let inner = s
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| format!("expected a parenthesised list, got '{}'", s))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut items = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, ',') => {
                items.push(parse_value(inner[start..i].trim())?);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(parse_value(inner[start..].trim())?);
    Ok(items)
}

fn unquote(s: &str) -> Option<&str> {
    ['"', '\''].into_iter().find_map(|q| {
        s.strip_prefix(q)
            .and_then(|rest| rest.strip_suffix(q))
    })
}

fn text(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("missing value".to_string());
    }
    Ok(unquote(s).unwrap_or(s).to_string())
}

fn parse_value(s: &str) -> Result<QueryValue, String> {
    if s.is_empty() {
        return Err("missing value".to_string());
    }
    if let Some(quoted) = unquote(s) {
        return Ok(QueryValue::String(quoted.to_string()));
    }
    Ok(if let Ok(n) = s.parse::<i64>() {
        QueryValue::Int(n)
    } else if let Some(n) = s.parse::<f64>().ok().filter(|n| n.is_finite()) {
        QueryValue::Float(n)
    } else if s == "true" {
        QueryValue::Boolean(true)
    } else if s == "false" {
        QueryValue::Boolean(false)
    } else if s == "null" {
        QueryValue::Null
    } else {
        QueryValue::String(s.to_string())
    })
}
