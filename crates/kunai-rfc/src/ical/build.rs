//! Component serialization with RFC 5545 §3.1 folding.

use super::Component;

/// Octet limit per line before folding, excluding the line break.
const FOLD_LIMIT: usize = 75;

/// Folds a single logical line at 75 octets, continuing with CRLF + space.
/// Splits respect UTF-8 boundaries.
#[must_use]
pub fn fold_line(line: &str) -> String {
    if line.len() <= FOLD_LIMIT {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len() + line.len() / FOLD_LIMIT * 3);
    let mut remaining = line;
    let mut limit = FOLD_LIMIT;
    while remaining.len() > limit {
        let mut cut = limit;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }
        out.push_str(&remaining[..cut]);
        out.push_str("\r\n ");
        remaining = &remaining[cut..];
        // Continuation lines lose one octet to the leading space.
        limit = FOLD_LIMIT - 1;
    }
    out.push_str(remaining);
    out
}

pub(super) fn write_component(component: &Component, out: &mut String) {
    out.push_str(&fold_line(&format!("BEGIN:{}", component.name)));
    out.push_str("\r\n");

    for property in &component.properties {
        let mut line = property.name.clone();
        for (pname, pvalue) in &property.params {
            line.push(';');
            line.push_str(pname);
            line.push('=');
            if pvalue.contains([':', ';', ',']) {
                line.push('"');
                line.push_str(pvalue);
                line.push('"');
            } else {
                line.push_str(pvalue);
            }
        }
        line.push(':');
        line.push_str(&property.value);
        out.push_str(&fold_line(&line));
        out.push_str("\r\n");
    }

    for child in &component.children {
        write_component(child, out);
    }

    out.push_str(&fold_line(&format!("END:{}", component.name)));
    out.push_str("\r\n");
}
