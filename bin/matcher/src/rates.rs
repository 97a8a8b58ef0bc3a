//! Interest-rate mathematics: recovering the monthly rate a user is paying
//! from the loan's observable numbers, and the remaining balance those
//! numbers imply. Rates cross these functions in monthly percent.

/// Which amortization system prices the loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Amortization {
    /// Constant total payment; the rate is recovered numerically.
    Price,
    /// Constant principal payment; the rate falls out in closed form.
    Sac,
}

const TOLERANCE: f64 = 1e-6;
const MAX_ITERATIONS: usize = 100;

/// PRICE payment for a given monthly rate. A zero rate degenerates to
/// straight division.
pub fn price_payment(total_value: f64, installment_count: i32, monthly_rate: f64) -> f64 {
    let n = installment_count as f64;
    if monthly_rate == 0.0 {
        return total_value / n;
    }
    let factor = (1.0 + monthly_rate).powf(n);
    total_value * (monthly_rate * factor) / (factor - 1.0)
}

/// Inverts the PRICE payment formula by bisection on `[0, 1]` monthly.
/// Returns the rate in percent, or `None` for unusable inputs.
pub fn price_monthly_rate(
    total_value: f64,
    installment_count: i32,
    installment_amount: f64,
) -> Option<f64> {
    if installment_amount <= 0.0 || total_value <= 0.0 || installment_count <= 0 {
        return None;
    }

    let mut lower = 0.0_f64;
    let mut upper = 1.0_f64;

    for _ in 0..MAX_ITERATIONS {
        let mid = (lower + upper) / 2.0;
        let payment = price_payment(total_value, installment_count, mid);

        if (payment - installment_amount).abs() < TOLERANCE {
            return Some(mid * 100.0);
        }
        if payment < installment_amount {
            lower = mid;
        } else {
            upper = mid;
        }
    }

    Some((lower + upper) / 2.0 * 100.0)
}

/// SAC closed form: the interest portion of the current payment divided by
/// the balance outstanding when it was due. Percent, or `None` when the
/// implied balance is not positive.
pub fn sac_monthly_rate(
    total_value: f64,
    installment_count: i32,
    current_installment_number: i32,
    installment_amount: f64,
) -> Option<f64> {
    if installment_count <= 0 {
        return None;
    }
    let amortization = total_value / installment_count as f64;
    let remaining = (installment_count - current_installment_number + 1) as f64;
    let balance = amortization * remaining;
    if balance <= 0.0 {
        return None;
    }
    let interest_portion = installment_amount - amortization;
    Some(interest_portion / balance * 100.0)
}

/// Balance still owed, per system. PRICE discounts the remaining payments
/// at the recovered rate; at rate zero that collapses to a plain sum.
pub fn remaining_balance(
    system: Amortization,
    total_value: f64,
    installment_count: i32,
    current_installment_number: i32,
    monthly_rate_percent: f64,
    installment_amount: f64,
) -> f64 {
    let remaining = (installment_count - current_installment_number + 1) as f64;
    match system {
        Amortization::Sac => total_value / installment_count as f64 * remaining,
        Amortization::Price => {
            let rate = monthly_rate_percent / 100.0;
            if rate == 0.0 {
                installment_amount * remaining
            } else {
                installment_amount * (1.0 - (1.0 + rate).powf(-remaining)) / rate
            }
        }
    }
}

/// Interest saved over the remaining installments by moving from the
/// current rate to the offered one. Never negative.
pub fn potential_savings(
    remaining_amount: f64,
    remaining_installments: i32,
    current_rate_percent: f64,
    new_rate_percent: f64,
) -> f64 {
    let delta = (current_rate_percent - new_rate_percent) / 100.0;
    (remaining_amount * delta * remaining_installments as f64).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_payment_degenerates_at_zero_rate() {
        assert_eq!(price_payment(1200.0, 12, 0.0), 100.0);
    }

    #[test]
    fn price_payment_grows_with_the_rate() {
        let flat = price_payment(50_000.0, 60, 0.0);
        let low = price_payment(50_000.0, 60, 0.01);
        let high = price_payment(50_000.0, 60, 0.03);
        assert!(flat < low && low < high);
    }

    #[test]
    fn price_inversion_round_trips_across_the_rate_grid() {
        let total_value = 50_000.0;
        for &rate in &[0.001, 0.005, 0.01, 0.02, 0.05, 0.10] {
            for &count in &[12, 36, 60, 120, 240] {
                let payment = price_payment(total_value, count, rate);
                let recovered = price_monthly_rate(total_value, count, payment)
                    .expect("inversion must succeed for a consistent payment");
                assert!(
                    (recovered / 100.0 - rate).abs() < 1e-4,
                    "rate {rate} over {count} months recovered as {recovered}%"
                );
            }
        }
    }

    #[test]
    fn price_inversion_rejects_unusable_inputs() {
        assert!(price_monthly_rate(0.0, 60, 630.62).is_none());
        assert!(price_monthly_rate(50_000.0, 0, 630.62).is_none());
        assert!(price_monthly_rate(50_000.0, 60, 0.0).is_none());
        assert!(price_monthly_rate(50_000.0, 60, -1.0).is_none());
    }

    #[test]
    fn price_inversion_of_an_interest_free_loan_is_zero() {
        let recovered = price_monthly_rate(1200.0, 12, 100.0).unwrap();
        assert!(recovered.abs() < 1e-4);
    }

    #[test]
    fn sac_rate_is_exact() {
        // amortization 2000, balance 2000 * 49 = 98000, interest 980 -> 1%.
        let rate = sac_monthly_rate(120_000.0, 60, 12, 2_980.0).unwrap();
        assert!((rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sac_rate_rejects_exhausted_loans() {
        assert!(sac_monthly_rate(120_000.0, 0, 1, 2_980.0).is_none());
        assert!(sac_monthly_rate(120_000.0, 12, 14, 1_000.0).is_none());
    }

    #[test]
    fn sac_remaining_balance_is_linear_in_installments_left() {
        let balance = remaining_balance(Amortization::Sac, 120_000.0, 60, 12, 1.0, 2_980.0);
        assert!((balance - 98_000.0).abs() < 1e-9);
    }

    #[test]
    fn price_remaining_balance_discounts_at_the_rate() {
        let balance = remaining_balance(Amortization::Price, 50_000.0, 60, 12, 1.0, 1_112.22);
        let remaining = 49.0;
        let expected = 1_112.22 * (1.0 - 1.01_f64.powf(-remaining)) / 0.01;
        assert!((balance - expected).abs() < 1e-9);
        assert!(balance < 1_112.22 * remaining);
    }

    #[test]
    fn price_remaining_balance_at_zero_rate_is_a_plain_sum() {
        let balance = remaining_balance(Amortization::Price, 50_000.0, 60, 12, 0.0, 833.33);
        assert!((balance - 833.33 * 49.0).abs() < 1e-9);
    }

    #[test]
    fn savings_scale_with_the_rate_gap() {
        let savings = potential_savings(98_000.0, 49, 3.0, 1.5);
        assert!((savings - 98_000.0 * 0.015 * 49.0).abs() < 1e-9);
    }

    #[test]
    fn savings_never_go_negative() {
        assert_eq!(potential_savings(98_000.0, 49, 1.0, 1.5), 0.0);
    }
}
