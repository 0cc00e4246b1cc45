//! Numeric and text clean-up for provider-supplied values.

use crate::statement::Scalar;

/// Coerce an amount-like scalar into a number.
///
/// Numbers pass through; text is stripped of currency symbols, commas and any
/// other non-numeric characters before parsing.
pub fn coerce_amount(raw: &Scalar) -> Option<f64> {
    match raw {
        Scalar::Number(n) if n.is_finite() => Some(*n),
        Scalar::Number(_) => None,
        Scalar::Text(s) => parse_amount_text(s),
        Scalar::Flag(_) => None,
    }
}

/// Parse the longest leading decimal out of `s` after discarding every
/// character other than ASCII digits and `.`.
///
/// `"₦1,000.50"` parses as `1000.5`; `"1.000.50"` parses as `1.0`.
pub fn parse_amount_text(s: &str) -> Option<f64> {
    let cleaned: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();

    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in cleaned.char_indices() {
        if c == '.' {
            if seen_dot {
                break;
            }
            seen_dot = true;
        }
        end = i + 1;
    }

    let number = &cleaned[..end];
    if !number.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    number.parse().ok()
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naira_amount() {
        assert_eq!(parse_amount_text("₦1,000.50"), Some(1000.50));
        assert_eq!(parse_amount_text("2000"), Some(2000.0));
        assert_eq!(parse_amount_text("NGN 12,345,678.09 CR"), Some(12_345_678.09));
    }

    #[test]
    fn test_unparseable_amounts() {
        assert_eq!(parse_amount_text(""), None);
        assert_eq!(parse_amount_text("N/A"), None);
        assert_eq!(parse_amount_text("."), None);
    }

    #[test]
    fn test_leading_decimal_only() {
        assert_eq!(parse_amount_text("1.000.50"), Some(1.0));
        assert_eq!(parse_amount_text(".5"), Some(0.5));
    }

    #[test]
    fn test_coerce_scalar() {
        assert_eq!(coerce_amount(&Scalar::Number(2000.0)), Some(2000.0));
        assert_eq!(coerce_amount(&Scalar::Text("₦1,000.50".into())), Some(1000.50));
        assert_eq!(coerce_amount(&Scalar::Flag(true)), None);
        assert_eq!(coerce_amount(&Scalar::Number(f64::NAN)), None);
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  NIP\tTRF \n FROM   JOHN "), "NIP TRF FROM JOHN");
    }
}
