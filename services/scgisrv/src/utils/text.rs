//! Text rendering shared by status tags and SCGI replies

use std::time::Duration;

/// Render a float the way controller tools print it
///
/// Shortest round-trip digits, always a fractional part for integral
/// values, exponent form outside `[1e-4, 1e16)`.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let magnitude = value.abs();
    if !(1e-4..1e16).contains(&magnitude) {
        let raw = format!("{:e}", value);
        return match raw.split_once('e') {
            Some((mantissa, exp)) => {
                let (sign, digits) = match exp.strip_prefix('-') {
                    Some(d) => ('-', d),
                    None => ('+', exp),
                };
                format!("{mantissa}e{sign}{digits:0>2}")
            },
            None => raw,
        };
    }

    let raw = format!("{}", value);
    if raw.contains('.') {
        raw
    } else {
        raw + ".0"
    }
}

/// `N days, HH:MM:SS`
pub fn humanize_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    format!(
        "{} days, {:02}:{:02}:{:02}",
        seconds / 86_400,
        seconds / 3600 % 24,
        seconds / 60 % 60,
        seconds % 60
    )
}

/// ISO-8859-1 bytes to text; every byte maps to the code point of the same value
pub fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Text to ISO-8859-1; characters outside the charset become `?`
pub fn latin1_encode(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

fn center(value: &str, width: usize) -> String {
    let len = value.chars().count();
    if len >= width {
        return value.to_string();
    }
    let total = width - len;
    // odd margins lean left only for odd widths
    let left = total / 2 + (total & width & 1);
    format!("{}{}{}", " ".repeat(left), value, " ".repeat(total - left))
}

/// Fixed-width text table: centred header, underline, left-justified rows
pub fn tabulate(widths: &[usize], headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(
        headers
            .iter()
            .zip(widths)
            .map(|(h, w)| center(h, *w))
            .collect::<Vec<_>>()
            .join("|"),
    );
    lines.push("_".repeat(widths.iter().sum()));
    for row in rows {
        lines.push(
            row.iter()
                .zip(widths)
                .map(|(v, w)| format!("{v:<w$}", w = *w))
                .collect::<Vec<_>>()
                .join("|"),
        );
    }
    format!("\n{}\n", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(f64::from(0.1f32)), "0.10000000149011612");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(1.5e-5), "1.5e-05");
        assert_eq!(format_float(123456.0), "123456.0");
        assert_eq!(format_float(0.0), "0.0");
    }

    #[test]
    fn test_humanize_duration() {
        assert_eq!(
            humanize_duration(Duration::from_secs(90_061)),
            "1 days, 01:01:01"
        );
        assert_eq!(humanize_duration(Duration::from_secs(17)), "0 days, 00:00:17");
    }

    #[test]
    fn test_center_matches_str_center() {
        assert_eq!(center("ab", 5), "  ab ");
        assert_eq!(center("abc", 6), " abc  ");
        assert_eq!(center("abc", 5), " abc ");
        assert_eq!(center("toolong", 3), "toolong");
    }

    #[test]
    fn test_latin1() {
        let raw = [b'a', 0xE9, 0xFF];
        let text = latin1_decode(&raw);
        assert_eq!(text, "a\u{e9}\u{ff}");
        assert_eq!(latin1_encode(&text), raw);
        assert_eq!(latin1_encode("\u{20ac}"), b"?");
    }

    #[test]
    fn test_tabulate() {
        let table = tabulate(
            &[4, 6],
            &["nad", "ip"],
            &[vec!["10".to_string(), "1.2.3.4".to_string()]],
        );
        assert_eq!(table, "\nnad |  ip  \n__________\n10  |1.2.3.4\n");
    }
}
