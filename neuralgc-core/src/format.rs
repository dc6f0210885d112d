//! Fixed numeric formatting for identities and batch lines.
//!
//! Floats are rendered like C's `%e`: six fractional digits in the mantissa,
//! an explicit exponent sign, and at least two exponent digits. That gives
//! seven significant digits; values that agree to seven significant digits
//! render identically and therefore share an identity.

/// Digits after the decimal point in [`format_sci`].
pub const SCI_PRECISION: usize = 6;

/// Render a float in `%e` notation, e.g. `1.000000e-02`.
pub fn format_sci(value: f64) -> String {
    let raw = format!("{:.*e}", SCI_PRECISION, value);
    // Rust renders `1.000000e-2`; non-finite values have no exponent.
    let Some((mantissa, exponent)) = raw.split_once('e') else {
        return raw;
    };
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };
    format!("{mantissa}e{sign}{digits:0>2}")
}

/// Render an integer in `%d` notation.
pub fn format_int(value: i64) -> String {
    value.to_string()
}

/// Parse a value produced by [`format_sci`] (or any float literal).
pub fn parse_sci(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Round `value` to the precision that survives [`format_sci`].
pub fn quantize(value: f64) -> f64 {
    parse_sci(&format_sci(value)).unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_sci_matches_c_printf() {
        assert_eq!(format_sci(0.01), "1.000000e-02");
        assert_eq!(format_sci(0.001), "1.000000e-03");
        assert_eq!(format_sci(10.0), "1.000000e+01");
        assert_eq!(format_sci(2.0), "2.000000e+00");
        assert_eq!(format_sci(0.0), "0.000000e+00");
        assert_eq!(format_sci(-3.5), "-3.500000e+00");
        assert_eq!(format_sci(1.5e-120), "1.500000e-120");
        assert_eq!(format_sci(123456789.0), "1.234568e+08");
    }

    #[test]
    fn test_close_values_stay_distinct() {
        assert_ne!(format_sci(0.01), format_sci(0.0100001));
        assert_eq!(format_sci(0.0100001), "1.000010e-02");
    }

    #[test]
    fn test_values_beyond_precision_collide() {
        assert_eq!(format_sci(0.01), format_sci(0.010000000001));
    }

    #[test]
    fn test_parse_sci_roundtrip() {
        for v in [0.3, 1e-5, 42.0, 0.828643, 7.196857e-3] {
            let text = format_sci(v);
            let parsed = parse_sci(&text).unwrap();
            assert_eq!(format_sci(parsed), text);
            assert!((parsed - v).abs() <= v.abs() * 1e-6);
        }
    }

    #[test]
    fn test_parse_sci_rejects_garbage() {
        assert!(parse_sci("abc").is_none());
        assert!(parse_sci("inf").is_none());
    }

    #[test]
    fn test_quantize_is_idempotent() {
        let q = quantize(0.123456789);
        assert_eq!(q, quantize(q));
        assert_eq!(format_sci(q), "1.234568e-01");
    }
}
