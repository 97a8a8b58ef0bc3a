//! Brazilian formatting for money and monthly rates: dot-grouped thousands,
//! comma decimals (`R$ 1.234,56`, `1,50% a.m.`).

/// Formats a BRL amount with Brazilian separators.
pub fn fmt_brl(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let cents = (value.abs() * 100.0).round() as u64;
    let units = (cents / 100).to_string();
    let frac = cents % 100;

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, digit) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    format!("R$ {sign}{grouped},{frac:02}")
}

/// Formats a monthly rate already expressed in percent.
pub fn fmt_pct(value: f64) -> String {
    format!("{}% a.m.", format!("{value:.2}").replace('.', ","))
}

/// `-` placeholder for a value the upstream stages never resolved.
pub fn fmt_brl_opt(value: Option<f64>) -> String {
    value.map(fmt_brl).unwrap_or_else(|| "-".to_string())
}

pub fn fmt_pct_opt(value: Option<f64>) -> String {
    value.map(fmt_pct).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brl_uses_brazilian_separators() {
        assert_eq!(fmt_brl(630.62), "R$ 630,62");
        assert_eq!(fmt_brl(1234.5), "R$ 1.234,50");
        assert_eq!(fmt_brl(1_000_000.0), "R$ 1.000.000,00");
    }

    #[test]
    fn brl_handles_small_and_negative_values() {
        assert_eq!(fmt_brl(0.0), "R$ 0,00");
        assert_eq!(fmt_brl(0.05), "R$ 0,05");
        assert_eq!(fmt_brl(-42.1), "R$ -42,10");
    }

    #[test]
    fn pct_uses_comma_decimal() {
        assert_eq!(fmt_pct(1.5), "1,50% a.m.");
        assert_eq!(fmt_pct(0.0), "0,00% a.m.");
    }

    #[test]
    fn optional_formatters_fall_back_to_dash() {
        assert_eq!(fmt_brl_opt(None), "-");
        assert_eq!(fmt_pct_opt(None), "-");
        assert_eq!(fmt_brl_opt(Some(10.0)), "R$ 10,00");
    }
}
