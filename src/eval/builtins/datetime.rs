//! Timestamp functions. All of them are pure: they only look at the timestamps passed in.
use chrono::{DateTime, Duration, FixedOffset, SecondsFormat, Utc};

use super::{FuncArgs, FuncDef, FuncError};
use crate::value::{Value, ValueType};

fn parse_timestamp(ts: &str) -> Result<DateTime<FixedOffset>, FuncError> {
    DateTime::parse_from_rfc3339(ts)
        .map_err(|e| format!("not a valid RFC 3339 timestamp {ts:?}: {e}").into())
}

/// Translate a `formatdate` spec (`YYYY-MM-DD hh:mm:ss`, quoted literals in `'...'`)
/// into a chrono format string.
fn translate_format(spec: &str) -> Result<String, FuncError> {
    const TOKENS: &[(&str, &str)] = &[
        ("YYYY", "%Y"),
        ("YY", "%y"),
        ("MMMM", "%B"),
        ("MMM", "%b"),
        ("MM", "%m"),
        ("M", "%-m"),
        ("DD", "%d"),
        ("D", "%-d"),
        ("EEEE", "%A"),
        ("EEE", "%a"),
        ("hh", "%H"),
        ("h", "%-H"),
        ("HH", "%I"),
        ("H", "%-I"),
        ("mm", "%M"),
        ("m", "%-M"),
        ("ss", "%S"),
        ("s", "%-S"),
        ("AA", "%p"),
        ("aa", "%P"),
        ("ZZZZZ", "%:z"),
        ("ZZZZ", "%z"),
        ("ZZZ", "%Z"),
        ("Z", "Z"),
    ];
    let mut out = String::new();
    let mut rest = spec;
    'outer: while let Some(c) = rest.chars().next() {
        if c == '\'' {
            let body = &rest[1..];
            let end = body
                .find('\'')
                .ok_or("unterminated quoted literal in format")?;
            out.push_str(&body[..end].replace('%', "%%"));
            rest = &body[end + 1..];
            continue;
        }
        if c.is_ascii_alphabetic() {
            for (token, chrono_fmt) in TOKENS {
                if let Some(tail) = rest.strip_prefix(token) {
                    out.push_str(chrono_fmt);
                    rest = tail;
                    continue 'outer;
                }
            }
            return Err(format!("invalid date format verb starting at {rest:?}").into());
        }
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    Ok(out)
}

/// Format a timestamp: `formatdate("YYYY-MM-DD", "2020-01-01T00:00:00Z")`
pub fn create_formatdate_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .param(ValueType::String)
        .build(|args: FuncArgs| {
            let fmt = translate_format(args.str(0)?)?;
            let dt = parse_timestamp(args.str(1)?)?;
            Ok(Value::from(dt.format(&fmt).to_string()))
        })
}

/// Parse a duration such as `1h30m`, `-10m` or `1.5h`.
fn parse_duration(s: &str) -> Result<Duration, FuncError> {
    let invalid = || FuncError::from(format!("invalid duration {s:?}"));
    let (negative, mut rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if rest.is_empty() {
        return Err(invalid());
    }
    let mut total_ms = 0.0;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let n: f64 = rest[..num_len].parse().map_err(|_| invalid())?;
        rest = &rest[num_len..];
        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let factor = match &rest[..unit_len] {
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            _ => return Err(invalid()),
        };
        total_ms += n * factor;
        rest = &rest[unit_len..];
    }
    let total_ms = total_ms.round();
    if !total_ms.is_finite() || total_ms.abs() >= i64::MAX as f64 {
        return Err(format!("duration {s:?} is out of range").into());
    }
    let ms = total_ms as i64;
    Duration::try_milliseconds(if negative { -ms } else { ms })
        .ok_or_else(|| format!("duration {s:?} is out of range").into())
}

/// Add a duration to a timestamp; the result is normalized to UTC
pub fn create_timeadd_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .param(ValueType::String)
        .build(|args: FuncArgs| {
            let dt = parse_timestamp(args.str(0)?)?.with_timezone(&Utc);
            let dur = parse_duration(args.str(1)?)?;
            let sum = dt
                .checked_add_signed(dur)
                .ok_or("timeadd result is out of the supported date range")?;
            Ok(Value::from(sum.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
        })
}

/// Compare two timestamps returning -1, 0, or 1
pub fn create_timecmp_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .param(ValueType::String)
        .build(|args: FuncArgs| {
            let ts1 = parse_timestamp(args.str(0)?)?;
            let ts2 = parse_timestamp(args.str(1)?)?;
            let result: i64 = match ts1.cmp(&ts2) {
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
            };
            Ok(Value::from(result))
        })
}
