// Utility helpers for parsing and basic statistics.
//
// The raw IFs and JMP exports are messy (thousands separators written as
// spaces or commas, empty cells, years exported as floats), so every cell
// goes through one of these before it reaches a typed record.
use num_format::{Locale, ToFormattedString};

/// Parse a cell into `f64` while being forgiving about formatting issues
/// common in spreadsheet exports.
///
/// - Trims whitespace and strips embedded spaces and `","` separators.
/// - Returns `None` for empty cells, unparsable text and non-finite values.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    let cleaned: String = s.chars().filter(|c| *c != ' ' && *c != ',').collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => None,
    }
}

/// Parse a year cell. Accepts `2030` as well as the `2030.0` form some
/// exports produce; fractional years are rejected.
pub fn parse_year(s: Option<&str>) -> Option<i32> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(y) = s.parse::<i32>() {
        return Some(y);
    }
    let f = s.parse::<f64>().ok()?;
    if f.fract() == 0.0 && f.abs() < i32::MAX as f64 {
        Some(f as i32)
    } else {
        None
    }
}

/// Turn an empty (after trimming) cell into `None`.
pub fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Arithmetic mean, `None` for an empty slice.
pub fn average(v: &[f64]) -> Option<f64> {
    if v.is_empty() {
        return None;
    }
    let sum: f64 = v.iter().copied().sum();
    Some(sum / v.len() as f64)
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals with locale-aware thousands separators (`1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

/// `tabled` display hook for optional measurements.
pub fn display_opt_f64(v: &Option<f64>) -> String {
    match v {
        Some(v) => format_number(*v, 2),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_space_and_comma_separated_numbers() {
        assert_eq!(parse_f64_safe(Some(" 1 234.5 ")), Some(1234.5));
        assert_eq!(parse_f64_safe(Some("1,234")), Some(1234.0));
        assert_eq!(parse_f64_safe(Some("")), None);
        assert_eq!(parse_f64_safe(Some("n/a")), None);
        assert_eq!(parse_f64_safe(Some("NaN")), None);
        assert_eq!(parse_f64_safe(None), None);
    }

    #[test]
    fn parses_float_formatted_years() {
        assert_eq!(parse_year(Some("2030")), Some(2030));
        assert_eq!(parse_year(Some("2030.0")), Some(2030));
        assert_eq!(parse_year(Some("2030.5")), None);
        assert_eq!(parse_year(Some("Year")), None);
    }

    #[test]
    fn average_of_empty_is_none() {
        assert_eq!(average(&[]), None);
        assert_eq!(average(&[1.0, 3.0]), Some(2.0));
    }

    #[test]
    fn formats_with_separators() {
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_number(-5.0, 1), "-5.0");
        assert_eq!(format_int(9855), "9,855");
    }
}
