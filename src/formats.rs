use std::{
    collections::HashMap,
    net::{Ipv4Addr, Ipv6Addr},
};

use once_cell::sync::Lazy;
use serde_json::Value;

/// A format predicate. Kinds a format does not speak about pass
/// trivially, so a `date-time` check on a number reports no error.
pub type FormatCheck = fn(&Value) -> bool;

pub(crate) static FORMATS: Lazy<HashMap<&'static str, FormatCheck>> = Lazy::new(|| {
    let mut m = HashMap::<&'static str, FormatCheck>::new();
    m.insert("byte", validate_byte);
    m.insert("date", validate_date);
    m.insert("date-time", validate_date_time);
    m.insert("email", validate_email);
    m.insert("ipv4", validate_ipv4);
    m.insert("ipv6", validate_ipv6);
    m.insert("uri", validate_uri);
    m.insert("int32", validate_int32);
    m.insert("int64", validate_int64);
    m.insert("float", validate_number);
    m.insert("double", validate_number);
    m
});

pub fn validate_byte(v: &Value) -> bool {
    let Value::String(s) = v else {
        return true;
    };
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}

pub fn validate_date(v: &Value) -> bool {
    let Value::String(s) = v else {
        return true;
    };
    check_date(s)
}

// yyyy-mm-dd, see https://datatracker.ietf.org/doc/html/rfc3339#section-5.6
fn check_date(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
        return false;
    }
    let mut ymd = s.splitn(3, '-').filter_map(|t| {
        t.bytes()
            .all(|c| c.is_ascii_digit())
            .then(|| t.parse::<usize>().ok())
            .flatten()
    });
    let (Some(y), Some(m), Some(d)) = (ymd.next(), ymd.next(), ymd.next()) else {
        return false;
    };
    if !matches!(m, 1..=12) || !matches!(d, 1..=31) {
        return false;
    }
    match m {
        2 => {
            let leap = y % 4 == 0 && (y % 100 != 0 || y % 400 == 0);
            d <= if leap { 29 } else { 28 }
        }
        4 | 6 | 9 | 11 => d <= 30,
        _ => true,
    }
}

// hh:mm:ss with optional second fraction, then Z or a ±hh:mm offset
fn check_time(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() < 9 || b[2] != b':' || b[5] != b':' || !s.is_char_boundary(8) {
        return false;
    }
    let mut hms = s[..8].splitn(3, ':').filter_map(|t| t.parse::<usize>().ok());
    let (Some(h), Some(m), Some(sec)) = (hms.next(), hms.next(), hms.next()) else {
        return false;
    };
    if h > 23 || m > 59 || sec > 60 {
        return false;
    }

    let mut rest = &s[8..];
    if let Some(frac) = rest.strip_prefix('.') {
        let digits = frac.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return false;
        }
        rest = &frac[digits..];
    }

    if rest == "Z" || rest == "z" {
        return true;
    }
    let rb = rest.as_bytes();
    if rb.len() != 6 || !matches!(rb[0], b'+' | b'-') || rb[3] != b':' {
        return false;
    }
    let mut zhm = rest[1..].splitn(2, ':').filter_map(|t| t.parse::<usize>().ok());
    let (Some(zh), Some(zm)) = (zhm.next(), zhm.next()) else {
        return false;
    };
    zh <= 23 && zm <= 59
}

pub fn validate_date_time(v: &Value) -> bool {
    let Value::String(s) = v else {
        return true;
    };
    let b = s.as_bytes();
    if b.len() < 20 || !matches!(b[10], b't' | b'T') {
        return false;
    }
    check_date(&s[..10]) && check_time(&s[11..])
}

pub fn validate_email(v: &Value) -> bool {
    let Value::String(s) = v else {
        return true;
    };
    let Some(at) = s.rfind('@') else {
        return false;
    };
    let (local, domain) = (&s[..at], &s[at + 1..]);
    if local.is_empty() || domain.is_empty() {
        return false;
    }

    // local part: quoted-string or dot-atom
    let local_ok = if local.starts_with('"') {
        local.len() >= 2 && local.ends_with('"')
    } else {
        local.split('.').all(is_atom)
    };
    if !local_ok {
        return false;
    }

    // domain: dot-atom or address literal
    if let Some(inner) = domain.strip_prefix('[') {
        return inner.strip_suffix(']').map_or(false, |lit| !lit.is_empty());
    }
    domain.split('.').all(is_atom)
}

// RFC 5322 atext
fn is_atom(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'-'
                        | b'/'
                        | b'='
                        | b'?'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'{'
                        | b'|'
                        | b'}'
                        | b'~'
                )
        })
}

pub fn validate_ipv4(v: &Value) -> bool {
    let Value::String(s) = v else {
        return true;
    };
    s.parse::<Ipv4Addr>().is_ok()
}

pub fn validate_ipv6(v: &Value) -> bool {
    let Value::String(s) = v else {
        return true;
    };
    s.parse::<Ipv6Addr>().is_ok()
}

/// Permissive RFC 3986 shape: a scheme followed by non-space content.
pub fn validate_uri(v: &Value) -> bool {
    let Value::String(s) = v else {
        return true;
    };
    let Some(colon) = s.find(':') else {
        return false;
    };
    let scheme = &s[..colon];
    let mut chars = scheme.chars();
    let scheme_ok = chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    scheme_ok && !s.contains(|c: char| c.is_whitespace() || c.is_control())
}

pub fn validate_int32(v: &Value) -> bool {
    let Value::Number(n) = v else {
        return true;
    };
    if let Some(i) = n.as_i64() {
        return i32::try_from(i).is_ok();
    }
    if n.as_u64().is_some() {
        return false; // beyond i64 means beyond i32 too
    }
    n.as_f64().map_or(false, |f| f == (f as i32) as f64)
}

pub fn validate_int64(v: &Value) -> bool {
    let Value::Number(n) = v else {
        return true;
    };
    if n.as_i64().is_some() {
        return true;
    }
    if n.as_u64().is_some() {
        return false;
    }
    n.as_f64().map_or(false, |f| f == (f as i64) as f64)
}

pub fn validate_number(v: &Value) -> bool {
    match v {
        Value::String(s) => s.parse::<f64>().is_ok(),
        _ => true,
    }
}

/// Hostname label rules. Not installed by default; register it under
/// `hostname` to opt in to full domain validation.
///
/// See https://en.wikipedia.org/wiki/Hostname#Restrictions_on_valid_host_names
pub fn validate_hostname(v: &Value) -> bool {
    let Value::String(s) = v else {
        return true;
    };
    let s = s.strip_suffix('.').unwrap_or(s);
    if s.is_empty() || s.len() > 253 {
        return false;
    }
    s.split('.').all(|label| {
        matches!(label.len(), 1..=63)
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_byte() {
        let tests = [
            ("c3VyZS4=", true),
            ("c3VyZS4", true),
            ("", false),
            ("with space", false),
            ("ünïcode", false),
        ];
        for (input, want) in tests {
            assert_eq!(validate_byte(&json!(input)), want, "{input:?}");
        }
        assert!(validate_byte(&json!(42)));
    }

    #[test]
    fn test_date() {
        let tests = [
            ("1963-06-19", true),
            ("2020-02-29", true),
            ("2021-02-29", false),
            ("2000-02-29", true),
            ("1900-02-29", false),
            ("2021-04-31", false),
            ("2021-13-01", false),
            ("2021-00-10", false),
            ("06/19/1963", false),
            ("1963-6-19", false),
        ];
        for (input, want) in tests {
            assert_eq!(validate_date(&json!(input)), want, "{input:?}");
        }
    }

    #[test]
    fn test_date_time() {
        let tests = [
            ("1963-06-19T08:30:06Z", true),
            ("1963-06-19t08:30:06z", true),
            ("1963-06-19T08:30:06.283185Z", true),
            ("1963-06-19T08:30:06+01:00", true),
            ("1963-06-19T08:30:06-05:30", true),
            ("1963-06-19 08:30:06Z", false),
            ("1963-06-19T08:30:06", false),
            ("1963-06-19T08:30:06+0100", false),
            ("1963-06-19T25:30:06Z", false),
            ("1963-06-19T08:61:06Z", false),
        ];
        for (input, want) in tests {
            assert_eq!(validate_date_time(&json!(input)), want, "{input:?}");
        }
    }

    #[test]
    fn test_email() {
        let tests = [
            ("joe.bloggs@example.com", true),
            ("te~st@example.com", true),
            ("\"joe bloggs\"@example.com", true),
            ("joe@[192.168.2.1]", true),
            ("not-an-email", false),
            ("@example.com", false),
            ("joe@", false),
            ("joe bloggs@example.com", false),
            ("joe..bloggs@example.com", false),
        ];
        for (input, want) in tests {
            assert_eq!(validate_email(&json!(input)), want, "{input:?}");
        }
    }

    #[test]
    fn test_ipv4() {
        let tests = [
            ("192.168.0.1", true),
            ("255.255.255.255", true),
            ("256.1.1.1", false),
            ("192.168.0.01", false),
            ("1.2.3", false),
        ];
        for (input, want) in tests {
            assert_eq!(validate_ipv4(&json!(input)), want, "{input:?}");
        }
    }

    #[test]
    fn test_ipv6() {
        assert!(validate_ipv6(&json!("::1")));
        assert!(validate_ipv6(&json!("2001:db8::8a2e:370:7334")));
        assert!(!validate_ipv6(&json!("12345::")));
        assert!(!validate_ipv6(&json!("192.168.0.1")));
    }

    #[test]
    fn test_uri() {
        let tests = [
            ("http://example.com/~user", true),
            ("urn:isbn:0451450523", true),
            ("mailto:joe@example.com", true),
            ("no-colon-here", false),
            ("1http://bad.scheme", false),
            ("http://bad space.com", false),
        ];
        for (input, want) in tests {
            assert_eq!(validate_uri(&json!(input)), want, "{input:?}");
        }
    }

    #[test]
    fn test_int_ranges() {
        assert!(validate_int32(&json!(2147483647)));
        assert!(!validate_int32(&json!(2147483648i64)));
        assert!(validate_int32(&json!(-2147483648i64)));
        assert!(validate_int32(&json!(12.0)));
        assert!(!validate_int32(&json!(12.5)));
        assert!(validate_int64(&json!(9223372036854775807i64)));
        assert!(!validate_int64(&json!(9223372036854775808u64)));
        assert!(validate_int64(&json!("not a number")));
    }

    #[test]
    fn test_hostname() {
        let tests = [
            ("example.com", true),
            ("example.com.", true),
            ("under_score.com", false),
            ("-leading.com", false),
            ("trailing-.com", false),
            ("", false),
        ];
        for (input, want) in tests {
            assert_eq!(validate_hostname(&json!(input)), want, "{input:?}");
        }
    }
}
