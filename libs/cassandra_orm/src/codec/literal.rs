//! Text forms of `varint`, `decimal` and `duration` values
//!
//! Decimals render the way Cassandra prints them (plain notation unless the
//! scale is negative or the value is very small, then `1.5E+3` style).
//! Durations use the CQL unit syntax: `1y2mo3w4d5h6m7s8ms9us10ns`.

use num_bigint::{BigInt, Sign};
use scylla::value::{CqlDecimal, CqlDuration, CqlVarint};

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;

pub(super) fn varint_from_i64(value: i64) -> CqlVarint {
    CqlVarint::from_signed_bytes_be(BigInt::from(value).to_signed_bytes_be())
}

pub(super) fn parse_varint(raw: &str) -> Result<CqlVarint, String> {
    raw.trim()
        .parse::<BigInt>()
        .map(|n| CqlVarint::from_signed_bytes_be(n.to_signed_bytes_be()))
        .map_err(|e| format!("'{raw}' is not an integer: {e}"))
}

pub(super) fn render_varint(value: &CqlVarint) -> String {
    BigInt::from_signed_bytes_be(value.as_signed_bytes_be_slice()).to_string()
}

pub(super) fn decimal_from_i64(value: i64) -> CqlDecimal {
    CqlDecimal::from_signed_be_bytes_and_exponent(BigInt::from(value).to_signed_bytes_be(), 0)
}

/// Parse `-12.340`, `7`, `1.5e3` into an unscaled integer and a scale.
pub(super) fn parse_decimal(raw: &str) -> Result<CqlDecimal, String> {
    let invalid = || format!("'{raw}' is not a decimal");
    let trimmed = raw.trim();

    let (mantissa, exponent) = match trimmed.find(['e', 'E']) {
        Some(at) => {
            let exponent = trimmed[at + 1..].parse::<i32>().map_err(|_| invalid())?;
            (&trimmed[..at], exponent)
        }
        None => (trimmed, 0),
    };
    let (sign, unsigned) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa.strip_prefix('+').unwrap_or(mantissa)),
    };
    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let digits = format!("{integer}{fraction}");
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let unscaled: BigInt = format!("{sign}{digits}").parse().map_err(|_| invalid())?;
    let scale = i32::try_from(fraction.len())
        .ok()
        .and_then(|len| len.checked_sub(exponent))
        .ok_or_else(invalid)?;
    Ok(CqlDecimal::from_signed_be_bytes_and_exponent(
        unscaled.to_signed_bytes_be(),
        scale,
    ))
}

pub(super) fn render_decimal(value: &CqlDecimal) -> String {
    let (bytes, scale) = value.as_signed_be_bytes_slice_and_exponent();
    let unscaled = BigInt::from_signed_bytes_be(bytes);
    let sign = if unscaled.sign() == Sign::Minus { "-" } else { "" };
    let digits = unscaled.magnitude().to_string();
    let adjusted = digits.len() as i64 - 1 - i64::from(scale);

    if scale >= 0 && adjusted >= -6 {
        let scale = scale as usize;
        let body = if scale == 0 {
            digits
        } else if digits.len() > scale {
            let (integer, fraction) = digits.split_at(digits.len() - scale);
            format!("{integer}.{fraction}")
        } else {
            format!("0.{}{digits}", "0".repeat(scale - digits.len()))
        };
        return format!("{sign}{body}");
    }

    let (head, tail) = digits.split_at(1);
    let point = if tail.is_empty() { "" } else { "." };
    let exponent_sign = if adjusted >= 0 { "+" } else { "" };
    format!("{sign}{head}{point}{tail}E{exponent_sign}{adjusted}")
}

/// Parse the CQL duration unit syntax, e.g. `-1h30m` or `2mo3d`.
pub(super) fn parse_duration(raw: &str) -> Result<CqlDuration, String> {
    let invalid = |details: &str| format!("'{raw}' is not a duration: {details}");
    let trimmed = raw.trim();
    let (negative, mut rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    if rest.is_empty() {
        return Err(invalid("empty"));
    }

    let (mut months, mut days, mut nanos) = (0i64, 0i64, 0i64);
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| invalid("missing unit"))?;
        if digits_end == 0 {
            return Err(invalid("expected a number"));
        }
        let amount: i64 = rest[..digits_end]
            .parse()
            .map_err(|_| invalid("number out of range"))?;
        let unit_end = rest[digits_end..]
            .find(|c: char| c.is_ascii_digit())
            .map_or(rest.len(), |at| digits_end + at);
        let unit = &rest[digits_end..unit_end];

        let (target, factor) = match unit.to_ascii_lowercase().as_str() {
            "y" => (&mut months, 12),
            "mo" => (&mut months, 1),
            "w" => (&mut days, 7),
            "d" => (&mut days, 1),
            "h" => (&mut nanos, NANOS_PER_HOUR),
            "m" => (&mut nanos, NANOS_PER_MINUTE),
            "s" => (&mut nanos, NANOS_PER_SECOND),
            "ms" => (&mut nanos, NANOS_PER_MILLI),
            "us" | "µs" => (&mut nanos, NANOS_PER_MICRO),
            "ns" => (&mut nanos, 1),
            other => return Err(invalid(&format!("unknown unit '{other}'"))),
        };
        let current = *target;
        *target = amount
            .checked_mul(factor)
            .and_then(|n| current.checked_add(n))
            .ok_or_else(|| invalid("out of range"))?;
        rest = &rest[unit_end..];
    }

    let sign = if negative { -1 } else { 1 };
    let months = i32::try_from(months).map_err(|_| invalid("too many months"))?;
    let days = i32::try_from(days).map_err(|_| invalid("too many days"))?;
    Ok(CqlDuration {
        months: sign * months,
        days: sign * days,
        nanoseconds: sign as i64 * nanos,
    })
}

pub(super) fn render_duration(value: &CqlDuration) -> String {
    let negative = value.months < 0 || value.days < 0 || value.nanoseconds < 0;
    let months = i64::from(value.months).unsigned_abs();
    let days = i64::from(value.days).unsigned_abs();
    let mut nanos = value.nanoseconds.unsigned_abs();

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    let mut push = |amount: u64, unit: &str| {
        if amount > 0 {
            out.push_str(&amount.to_string());
            out.push_str(unit);
        }
    };
    push(months / 12, "y");
    push(months % 12, "mo");
    push(days, "d");
    for (unit, size) in [
        ("h", NANOS_PER_HOUR),
        ("m", NANOS_PER_MINUTE),
        ("s", NANOS_PER_SECOND),
        ("ms", NANOS_PER_MILLI),
        ("us", NANOS_PER_MICRO),
        ("ns", 1),
    ] {
        let size = size as u64;
        push(nanos / size, unit);
        nanos %= size;
    }

    if out.is_empty() {
        return "0s".to_string();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decimal(unscaled: i64, scale: i32) -> CqlDecimal {
        CqlDecimal::from_signed_be_bytes_and_exponent(
            BigInt::from(unscaled).to_signed_bytes_be(),
            scale,
        )
    }

    #[test]
    fn test_decimal_renders_plain_and_scientific() {
        assert_eq!(render_decimal(&decimal(300, 2)), "3.00");
        assert_eq!(render_decimal(&decimal(-5, 2)), "-0.05");
        assert_eq!(render_decimal(&decimal(0, 2)), "0.00");
        assert_eq!(render_decimal(&decimal(42, 0)), "42");
        assert_eq!(render_decimal(&decimal(1, -3)), "1E+3");
        assert_eq!(render_decimal(&decimal(15, -1)), "1.5E+2");
        assert_eq!(render_decimal(&decimal(1, 7)), "1E-7");
    }

    #[test]
    fn test_decimal_parse() {
        assert_eq!(parse_decimal("12.340").unwrap(), decimal(12340, 3));
        assert_eq!(parse_decimal("-0.05").unwrap(), decimal(-5, 2));
        assert_eq!(parse_decimal("1.5e2").unwrap(), decimal(15, -1));
        assert!(parse_decimal("1.2.3").is_err());
        assert!(parse_decimal("abc").is_err());
        assert!(parse_decimal("").is_err());
    }

    #[test]
    fn test_varint_text_form() {
        let big = parse_varint("-123456789012345678901234567890").unwrap();
        assert_eq!(render_varint(&big), "-123456789012345678901234567890");
        assert_eq!(render_varint(&varint_from_i64(255)), "255");
        assert!(parse_varint("12x").is_err());
    }

    #[test]
    fn test_duration_units() {
        let duration = parse_duration("1y2mo3w4d5h6m7s8ms9us10ns").unwrap();
        assert_eq!(duration.months, 14);
        assert_eq!(duration.days, 25);
        assert_eq!(
            duration.nanoseconds,
            5 * NANOS_PER_HOUR
                + 6 * NANOS_PER_MINUTE
                + 7 * NANOS_PER_SECOND
                + 8 * NANOS_PER_MILLI
                + 9 * NANOS_PER_MICRO
                + 10
        );
        assert_eq!(render_duration(&duration), "1y2mo25d5h6m7s8ms9us10ns");
    }

    #[test]
    fn test_negative_and_zero_durations() {
        let duration = parse_duration("-1h30m").unwrap();
        assert_eq!(duration.nanoseconds, -(NANOS_PER_HOUR + 30 * NANOS_PER_MINUTE));
        assert_eq!(render_duration(&duration), "-1h30m");

        let zero = CqlDuration {
            months: 0,
            days: 0,
            nanoseconds: 0,
        };
        assert_eq!(render_duration(&zero), "0s");
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("5 parsecs").is_err());
    }
}
