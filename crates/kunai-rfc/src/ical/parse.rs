//! Content-line lexing and component-tree parsing.

use super::{Component, Property};
use crate::error::{RfcError, RfcResult};

/// Unfolds content lines by removing CRLF (or bare LF) sequences followed
/// by a single whitespace character. Bare LF line endings are normalized
/// to CRLF while unfolding.
#[must_use]
pub fn unfold(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let len = bytes.len();
    let mut i = 0;

    while i < len {
        if bytes[i] == b'\r' && i + 1 < len && bytes[i + 1] == b'\n' {
            if i + 2 < len && (bytes[i + 2] == b' ' || bytes[i + 2] == b'\t') {
                i += 3;
            } else {
                result.push_str("\r\n");
                i += 2;
            }
        } else if bytes[i] == b'\n' {
            if i + 1 < len && (bytes[i + 1] == b' ' || bytes[i + 1] == b'\t') {
                i += 2;
            } else {
                result.push_str("\r\n");
                i += 1;
            }
        } else {
            // Copy the whole UTF-8 sequence starting here.
            let ch_len = utf8_len(bytes[i]);
            let end = (i + ch_len).min(len);
            if let Ok(s) = std::str::from_utf8(&bytes[i..end]) {
                result.push_str(s);
            }
            i = end;
        }
    }

    result
}

fn utf8_len(first: u8) -> usize {
    match first {
        b if b < 0x80 => 1,
        b if b & 0xE0 == 0xC0 => 2,
        b if b & 0xF0 == 0xE0 => 3,
        _ => 4,
    }
}

/// Splits one unfolded content line into a [`Property`]. The colon
/// separating name+params from the value is found outside quoted
/// parameter values.
pub(crate) fn parse_content_line(line: &str) -> RfcResult<Property> {
    let mut in_quotes = false;
    let mut colon = None;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => {
                colon = Some(idx);
                break;
            }
            _ => {}
        }
    }
    let colon =
        colon.ok_or_else(|| RfcError::InvalidCalendarData(format!("no value in line: {line}")))?;
    let (head, value) = (&line[..colon], &line[colon + 1..]);

    let mut segments = split_outside_quotes(head, ';');
    let name = segments
        .next()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| RfcError::InvalidCalendarData(format!("empty property name: {line}")))?
        .to_ascii_uppercase();

    let mut params = Vec::new();
    for seg in segments {
        if let Some((pname, pvalue)) = seg.split_once('=') {
            params.push((
                pname.to_ascii_uppercase(),
                pvalue.trim_matches('"').to_string(),
            ));
        }
    }

    Ok(Property {
        name,
        params,
        value: value.to_string(),
    })
}

fn split_outside_quotes(input: &str, sep: char) -> impl Iterator<Item = &str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (idx, ch) in input.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                parts.push(&input[start..idx]);
                start = idx + sep.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts.into_iter()
}

/// Parses the outermost component of the input.
pub(super) fn parse_component(input: &str) -> RfcResult<Component> {
    let unfolded = unfold(input);
    let mut stack: Vec<Component> = Vec::new();
    let mut root: Option<Component> = None;

    for line in unfolded.split("\r\n") {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let property = parse_content_line(line)?;
        match property.name.as_str() {
            "BEGIN" => stack.push(Component::named(property.value)),
            "END" => {
                let done = stack.pop().ok_or_else(|| {
                    RfcError::InvalidCalendarData(format!("END without BEGIN: {line}"))
                })?;
                if !done.name.eq_ignore_ascii_case(property.value.trim()) {
                    return Err(RfcError::InvalidCalendarData(format!(
                        "mismatched END:{} for BEGIN:{}",
                        property.value, done.name
                    )));
                }
                match stack.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => {
                        if root.is_none() {
                            root = Some(done);
                        }
                    }
                }
            }
            _ => {
                if let Some(current) = stack.last_mut() {
                    current.properties.push(property);
                }
                // Properties outside any component are ignored.
            }
        }
    }

    if !stack.is_empty() {
        return Err(RfcError::InvalidCalendarData(format!(
            "unterminated component: {}",
            stack[stack.len() - 1].name
        )));
    }
    root.ok_or_else(|| RfcError::InvalidCalendarData("no component found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfold_joins_folded_lines() {
        let folded = "SUMMARY:This is a lo\r\n ng summary\r\nUID:x\r\n";
        assert_eq!(unfold(folded), "SUMMARY:This is a long summary\r\nUID:x\r\n");
    }

    #[test]
    fn colon_inside_quoted_param_is_not_a_separator() {
        let prop = parse_content_line("ATTENDEE;CN=\"Smith: Bob\":mailto:bob@example.com")
            .expect("parses");
        assert_eq!(prop.name, "ATTENDEE");
        assert_eq!(prop.param("CN"), Some("Smith: Bob"));
        assert_eq!(prop.value, "mailto:bob@example.com");
    }

    #[test]
    fn unbalanced_components_error() {
        assert!(parse_component("BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nEND:VCALENDAR\r\n").is_err());
        assert!(parse_component("BEGIN:VCALENDAR\r\n").is_err());
        assert!(parse_component("X:1\r\n").is_err());
    }
}
