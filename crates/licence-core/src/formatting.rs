//! Number, currency and percentage formatting for alert metrics, insights and
//! the text report. All money is GBP.

/// Format a floating-point number with thousands separators and a fixed number
/// of decimal places.
///
/// # Examples
///
/// ```
/// use licence_core::formatting::format_number;
///
/// assert_eq!(format_number(1234.5,  1), "1,234.5");
/// assert_eq!(format_number(1234567.0, 0), "1,234,567");
/// assert_eq!(format_number(-9876.5, 1), "-9,876.5");
/// ```
pub fn format_number(value: f64, decimals: u32) -> String {
    let negative = value < 0.0;
    let abs_value = value.abs();

    // Nudge by a scaled epsilon so exact binary midpoints round up.
    let factor = 10_f64.powi(decimals as i32);
    let epsilon = f64::EPSILON * abs_value * factor;
    let rounded = ((abs_value * factor) + epsilon).round() / factor;

    let grouped = group_thousands(&(rounded.trunc() as u64).to_string());

    let result = if decimals == 0 {
        grouped
    } else {
        let frac_str = format!("{:.prec$}", rounded.fract(), prec = decimals as usize);
        // "0.50" → ".50"
        format!("{}{}", grouped, &frac_str[1..])
    };

    if negative && rounded != 0.0 {
        format!("-{}", result)
    } else {
        result
    }
}

/// Format a GBP amount with two decimal places.
///
/// ```
/// use licence_core::formatting::format_currency;
///
/// assert_eq!(format_currency(1234.56), "£1,234.56");
/// assert_eq!(format_currency(-9.99), "-£9.99");
/// ```
pub fn format_currency(amount: f64) -> String {
    if amount < 0.0 {
        format!("-£{}", format_number(amount.abs(), 2))
    } else {
        format!("£{}", format_number(amount, 2))
    }
}

/// Format a GBP amount rounded to whole pounds, for headline figures.
///
/// ```
/// use licence_core::formatting::format_currency_whole;
///
/// assert_eq!(format_currency_whole(52_340.4), "£52,340");
/// ```
pub fn format_currency_whole(amount: f64) -> String {
    if amount < 0.0 {
        format!("-£{}", format_number(amount.abs(), 0))
    } else {
        format!("£{}", format_number(amount, 0))
    }
}

/// `round(100 × part / whole)`, or 0 when `whole` is zero.
///
/// Not clamped: over-allocation yields values above 100.
pub fn rounded_pct(part: f64, whole: f64) -> u32 {
    if whole <= 0.0 {
        return 0;
    }
    (100.0 * part / whole).round().max(0.0) as u32
}

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
        assert_eq!(format_number(1_000.0, 0), "1,000");
    }

    #[test]
    fn test_format_number_rounds_up() {
        assert_eq!(format_number(1.005, 2), "1.01");
    }

    #[test]
    fn test_format_number_negative_zero_has_no_sign() {
        assert_eq!(format_number(-0.001, 2), "0.00");
    }

    // ── format_currency ──────────────────────────────────────────────────────

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(0.0), "£0.00");
        assert_eq!(format_currency(30.0), "£30.00");
        assert_eq!(format_currency(1_000_000.0), "£1,000,000.00");
        assert_eq!(format_currency(-9.99), "-£9.99");
    }

    #[test]
    fn test_format_currency_whole() {
        assert_eq!(format_currency_whole(360.0), "£360");
        assert_eq!(format_currency_whole(49_999.6), "£50,000");
    }

    // ── rounded_pct ──────────────────────────────────────────────────────────

    #[test]
    fn test_rounded_pct_basic() {
        assert_eq!(rounded_pct(80.0, 100.0), 80);
        assert_eq!(rounded_pct(1.0, 3.0), 33);
        assert_eq!(rounded_pct(2.0, 3.0), 67);
    }

    #[test]
    fn test_rounded_pct_zero_whole() {
        assert_eq!(rounded_pct(5.0, 0.0), 0);
    }

    #[test]
    fn test_rounded_pct_over_allocation_unbounded() {
        assert_eq!(rounded_pct(120.0, 100.0), 120);
    }
}
