//! Hash-rate normalisation.
//!
//! Miners report their hash rate as a suffixed string (`"113.13K"`,
//! `"4.021M"`). Everything stored in the registry is converted to one base
//! unit, kH/s, so totals are a plain sum.

/// Multiplier for each suffix, expressed in kH/s.
const SUFFIXES: &[(char, f64)] = &[
    ('K', 1.0),
    ('M', 1_000.0),
    ('G', 1_000_000.0),
    ('T', 1_000_000_000.0),
];

/// Display ladder used by `format_hashrate`, largest first.
const DISPLAY_UNITS: &[(f64, &str)] = &[
    (1_000_000_000.0, "TH/s"),
    (1_000_000.0, "GH/s"),
    (1_000.0, "MH/s"),
    (1.0, "KH/s"),
];

/// Converts a suffixed magnitude string into kH/s.
///
/// Returns `None` for empty input, a prefix that is not a plain decimal
/// number, or a suffix outside {K, M, G, T} (case-insensitive).
pub fn normalize(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let last = raw.chars().last()?;

    let (digits, multiplier) = if last.is_ascii_alphabetic() {
        let upper = last.to_ascii_uppercase();
        let (_, mult) = SUFFIXES.iter().find(|(s, _)| *s == upper)?;
        (raw[..raw.len() - last.len_utf8()].trim_end(), *mult)
    } else {
        // pas de suffixe : valeur brute en H/s
        (raw, 0.001)
    };

    if !is_plain_decimal(digits) {
        return None;
    }

    let value: f64 = digits.parse().ok()?;
    let kh = value * multiplier;
    kh.is_finite().then_some(kh)
}

/// Digits with at most one dot, at least one digit. Rejects signs,
/// exponents and the `inf`/`NaN` spellings `f64::from_str` would accept.
fn is_plain_decimal(s: &str) -> bool {
    let mut dots = 0;
    let mut digits = 0;
    for c in s.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return false,
        }
    }
    digits > 0 && dots <= 1
}

/// Renders a kH/s value with the largest unit that keeps it >= 1.
pub fn format_hashrate(kh: f64) -> String {
    for (scale, unit) in DISPLAY_UNITS {
        if kh >= *scale {
            return format!("{:.2} {}", kh / scale, unit);
        }
    }
    format!("{:.2} H/s", kh * 1_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_kilo_is_base_unit() {
        assert!(approx(normalize("113.13K").unwrap(), 113.13));
    }

    #[test]
    fn test_mega_scales_to_kilo() {
        assert!(approx(normalize("4.021M").unwrap(), 4021.0));
        assert!(approx(normalize("1G").unwrap(), 1_000_000.0));
        assert!(approx(normalize("0.5T").unwrap(), 500_000_000.0));
    }

    #[test]
    fn test_suffix_is_case_insensitive() {
        assert_eq!(normalize("2m"), normalize("2M"));
        assert_eq!(normalize("7k"), Some(7.0));
    }

    #[test]
    fn test_unsuffixed_value_is_hashes_per_second() {
        assert!(approx(normalize("1500").unwrap(), 1.5));
    }

    #[test]
    fn test_whitespace_tolerated() {
        assert!(approx(normalize(" 55.2 K ").unwrap(), 55.2));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("   "), None);
        assert_eq!(normalize("abc"), None);
        assert_eq!(normalize("bad"), None);
        assert_eq!(normalize("12X"), None);
        assert_eq!(normalize("K"), None);
        assert_eq!(normalize("-5K"), None);
        assert_eq!(normalize("1e3K"), None);
        assert_eq!(normalize("inf"), None);
        assert_eq!(normalize("1.2.3M"), None);
        assert_eq!(normalize("12KH"), None);
    }

    #[test]
    fn test_format_picks_largest_unit() {
        assert_eq!(format_hashrate(4100.0), "4.10 MH/s");
        assert_eq!(format_hashrate(113.13), "113.13 KH/s");
        assert_eq!(format_hashrate(2_500_000.0), "2.50 GH/s");
        assert_eq!(format_hashrate(0.0), "0.00 H/s");
    }
}
