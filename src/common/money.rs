// src/common/money.rs

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::common::error::AppError;

/// Shape of a `NUMERIC(precision, scale)` column.
#[derive(Debug, Clone, Copy)]
pub struct Numeric {
    pub precision: u32,
    pub scale: u32,
}

/// Savings, loans, insurance cover and transactions.
pub const AMOUNT: Numeric = Numeric { precision: 12, scale: 2 };
/// Insurance premiums.
pub const PREMIUM: Numeric = Numeric { precision: 10, scale: 2 };
/// Yearly loan interest, in percent.
pub const RATE: Numeric = Numeric { precision: 5, scale: 2 };

impl Numeric {
    /// Rejects values the column would round or overflow on.
    pub fn check(self, value: Decimal) -> Result<(), String> {
        if value.normalize().scale() > self.scale {
            return Err(format!(
                "Ensure that there are no more than {} decimal places.",
                self.scale
            ));
        }

        let whole_digits = self.precision - self.scale;
        if value.abs().trunc() >= Decimal::from(10i64.pow(whole_digits)) {
            return Err(format!(
                "Ensure that there are no more than {} digits before the decimal point.",
                whole_digits
            ));
        }

        Ok(())
    }
}

/// Collects per-key problems with money fields, then fails them all at once.
#[derive(Debug, Default)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, message: impl Into<String>) {
        self.0.entry(key.to_string()).or_insert_with(|| message.into());
    }

    /// Strictly positive and storable in `column`.
    pub fn positive(&mut self, key: &str, value: Decimal, column: Numeric) {
        if value <= Decimal::ZERO {
            self.add(key, "must be greater than zero");
        } else if let Err(message) = column.check(value) {
            self.add(key, message);
        }
    }

    /// Zero or more and storable in `column`.
    pub fn non_negative(&mut self, key: &str, value: Decimal, column: Numeric) {
        if value.is_sign_negative() && !value.is_zero() {
            self.add(key, "must not be negative");
        } else if let Err(message) = column.check(value) {
            self.add(key, message);
        }
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(AppError::InvalidFields(self.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    fn problem(column: Numeric, raw: &str) -> Option<String> {
        let mut errors = FieldErrors::new();
        errors.positive("amount", dec(raw), column);
        match errors.finish() {
            Ok(()) => None,
            Err(AppError::InvalidFields(fields)) => Some(fields["amount"].clone()),
            Err(other) => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn amounts_fit_numeric_12_2() {
        assert_eq!(problem(AMOUNT, "0.01"), None);
        assert_eq!(problem(AMOUNT, "9999999999.99"), None);
        // trailing zeros do not count as precision
        assert_eq!(problem(AMOUNT, "10.500"), None);

        assert_eq!(problem(AMOUNT, "0").as_deref(), Some("must be greater than zero"));
        assert_eq!(problem(AMOUNT, "-500").as_deref(), Some("must be greater than zero"));
        assert!(problem(AMOUNT, "0.004").unwrap().contains("2 decimal places"));
        assert!(problem(AMOUNT, "10.005").unwrap().contains("2 decimal places"));
        assert!(problem(AMOUNT, "10000000000").unwrap().contains("10 digits"));
    }

    #[test]
    fn premiums_fit_numeric_10_2() {
        assert_eq!(problem(PREMIUM, "99999999.99"), None);
        assert!(problem(PREMIUM, "100000000").unwrap().contains("8 digits"));
    }

    #[test]
    fn rates_fit_numeric_5_2() {
        let check = |raw: &str| {
            let mut errors = FieldErrors::new();
            errors.non_negative("interest_rate", dec(raw), RATE);
            errors.finish()
        };

        assert!(check("0").is_ok());
        assert!(check("999.99").is_ok());
        assert!(matches!(check("1000"), Err(AppError::InvalidFields(_))));
        assert!(matches!(check("12.345"), Err(AppError::InvalidFields(_))));
        match check("-1") {
            Err(AppError::InvalidFields(fields)) => assert_eq!(fields["interest_rate"], "must not be negative"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn every_bad_key_is_reported() {
        let mut errors = FieldErrors::new();
        errors.positive("coverage_amount", dec("0"), AMOUNT);
        errors.positive("premium", dec("0.001"), PREMIUM);
        errors.add("end_date", "must not be before start_date");

        match errors.finish() {
            Err(AppError::InvalidFields(fields)) => assert_eq!(fields.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }
}
