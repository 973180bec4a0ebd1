/// Format a floating-point number with thousands separators and a fixed number
/// of decimal places.
///
/// # Examples
///
/// ```
/// use telemetry_core::formatting::format_number;
///
/// assert_eq!(format_number(1234.5,  1), "1,234.5");
/// assert_eq!(format_number(1234567.0, 0), "1,234,567");
/// assert_eq!(format_number(0.0, 2), "0.00");
/// assert_eq!(format_number(-9876.5, 1), "-9,876.5");
/// ```
pub fn format_number(value: f64, decimals: u32) -> String {
    // Handle the sign separately so the thousands grouping works on the
    // absolute value.
    let negative = value < 0.0;
    let abs_value = value.abs();

    // Half-ULP nudge so exact binary midpoints round up.
    let factor = 10_f64.powi(decimals as i32);
    let epsilon = f64::EPSILON * abs_value * factor;
    let rounded = ((abs_value * factor) + epsilon).round() / factor;

    let integer_part = rounded.trunc() as u64;
    let frac_part = rounded - rounded.trunc();

    let int_str = integer_part.to_string();
    let grouped = group_thousands(&int_str);

    let result = if decimals == 0 {
        grouped
    } else {
        let frac_str = format!("{:.prec$}", frac_part, prec = decimals as usize);
        // `frac_str` starts with "0.", e.g. "0.50". Strip the leading "0".
        let decimal_digits = &frac_str[1..];
        format!("{}{}", grouped, decimal_digits)
    };

    if negative {
        format!("-{}", result)
    } else {
        result
    }
}

/// Format a non-negative count with thousands separators.
///
/// ```
/// use telemetry_core::formatting::format_count;
///
/// assert_eq!(format_count(12_345), "12,345");
/// ```
pub fn format_count(count: u64) -> String {
    group_thousands(&count.to_string())
}

/// Calculate `(part / whole) * 100`, rounded to `decimal_places`.
///
/// Returns `0.0` if `whole` is zero to avoid division by zero.
///
/// # Examples
///
/// ```
/// use telemetry_core::formatting::percentage;
///
/// assert!((percentage(50.0, 200.0, 1) - 25.0).abs() < 1e-9);
/// assert_eq!(percentage(0.0, 0.0, 2), 0.0);
/// ```
pub fn percentage(part: f64, whole: f64, decimal_places: u32) -> f64 {
    if whole == 0.0 {
        return 0.0;
    }
    let raw = (part / whole) * 100.0;
    let factor = 10_f64.powi(decimal_places as i32);
    (raw * factor).round() / factor
}

/// Format a percentage with one decimal place and a `%` suffix.
///
/// ```
/// use telemetry_core::formatting::format_percentage;
///
/// assert_eq!(format_percentage(25.0), "25.0%");
/// assert_eq!(format_percentage(33.333), "33.3%");
/// ```
pub fn format_percentage(value: f64) -> String {
    format!("{}%", format_number(value, 1))
}

/// Human-readable label for a statistics category key.
///
/// Underscores become spaces and each word is capitalised, so
/// `jsonp_vulnerable` reads as `Jsonp Vulnerable`. Directive names keep their
/// hyphens.
///
/// ```
/// use telemetry_core::formatting::category_label;
///
/// assert_eq!(category_label("jsonp_vulnerable"), "Jsonp Vulnerable");
/// assert_eq!(category_label("safe"), "Safe");
/// ```
pub fn category_label(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(s: &str) -> String {
    if s.len() <= 3 {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    let remainder = chars.len() % 3;
    for (i, &c) in chars.iter().enumerate() {
        if i != 0 && (i % 3 == remainder) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── format_number ────────────────────────────────────────────────────────

    #[test]
    fn test_format_number_zero() {
        assert_eq!(format_number(0.0, 0), "0");
        assert_eq!(format_number(0.0, 2), "0.00");
    }

    #[test]
    fn test_format_number_with_thousands() {
        assert_eq!(format_number(1_234.5, 1), "1,234.5");
    }

    #[test]
    fn test_format_number_negative() {
        assert_eq!(format_number(-9_876.5, 1), "-9,876.5");
    }

    #[test]
    fn test_format_number_rounds_up() {
        assert_eq!(format_number(1.005, 2), "1.01");
    }

    // ── format_count ─────────────────────────────────────────────────────────

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
    }

    // ── percentage ───────────────────────────────────────────────────────────

    #[test]
    fn test_percentage_basic() {
        let p = percentage(50.0, 200.0, 1);
        assert!((p - 25.0).abs() < 1e-9, "percentage = {p}");
    }

    #[test]
    fn test_percentage_zero_whole() {
        assert_eq!(percentage(10.0, 0.0, 2), 0.0);
    }

    #[test]
    fn test_percentage_one_decimal() {
        let p = percentage(1.0, 3.0, 1);
        assert!((p - 33.3).abs() < 1e-9, "percentage = {p}");
        let p = percentage(2.0, 3.0, 1);
        assert!((p - 66.7).abs() < 1e-9, "percentage = {p}");
    }

    // ── format_percentage ────────────────────────────────────────────────────

    #[test]
    fn test_format_percentage() {
        assert_eq!(format_percentage(100.0), "100.0%");
        assert_eq!(format_percentage(0.0), "0.0%");
        assert_eq!(format_percentage(66.66), "66.7%");
    }

    // ── category_label ───────────────────────────────────────────────────────

    #[test]
    fn test_category_label() {
        assert_eq!(category_label("malicious"), "Malicious");
        assert_eq!(category_label("jsonp_vulnerable"), "Jsonp Vulnerable");
        assert_eq!(category_label("script-src"), "Script-src");
        assert_eq!(category_label(""), "");
    }
}
