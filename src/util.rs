use std::{borrow::Cow, fmt::Write};

use serde_json::Value;

/// Renders `v` in a deterministic text form: object keys sorted
/// lexically, strings JSON-escaped, numbers in their serde_json
/// display form (so `1` and `1.0` stay distinct).
pub(crate) fn canonical(v: &Value) -> String {
    let mut out = String::new();
    write_canonical(v, &mut out);
    out
}

fn write_canonical(v: &Value, out: &mut String) {
    match v {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => write_escaped(s, out),
        Value::Array(arr) => {
            out.push('[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(obj) => {
            let mut keys = obj.keys().collect::<Vec<_>>();
            keys.sort();
            out.push('{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped(k, out);
                out.push(':');
                write_canonical(&obj[k.as_str()], out);
            }
            out.push('}');
        }
    }
}

fn write_escaped(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Fixed-size fingerprint of the canonical form. Two values hash equal
/// iff they are structurally equal, with the integer/float flavor kept
/// apart.
pub(crate) fn digest(v: &Value) -> md5::Digest {
    md5::compute(canonical(v).as_bytes())
}

pub(crate) fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

pub(crate) fn unescape(mut token: &str) -> Result<Cow<str>, ()> {
    let Some(mut tilde) = token.find('~') else {
        return Ok(Cow::Borrowed(token));
    };
    let mut s = String::with_capacity(token.len());
    loop {
        s.push_str(&token[..tilde]);
        token = &token[tilde + 1..];
        match token.chars().next() {
            Some('1') => s.push('/'),
            Some('0') => s.push('~'),
            _ => return Err(()),
        }
        token = &token[1..];
        let Some(i) = token.find('~') else {
            s.push_str(token);
            break;
        };
        tilde = i;
    }
    Ok(Cow::Owned(s))
}

/// Splits `url#fragment` at the first `#`.
pub(crate) fn split(loc: &str) -> (&str, &str) {
    if let Some(i) = loc.find('#') {
        (&loc[..i], &loc[i + 1..])
    } else {
        (loc, "")
    }
}
