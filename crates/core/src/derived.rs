//! Derived clinical and operational values.
//!
//! These are pure functions. Entities call them from [`crate::Entity::derive`] so the derived
//! value is written in the same transaction as the fields it depends on.

use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};

/// Body mass index from height in centimetres and weight in kilograms.
///
/// Rounded to two decimal places with banker's rounding. `None` unless both inputs are
/// present and height is positive.
pub fn bmi(height_cm: Option<Decimal>, weight_kg: Option<Decimal>) -> Option<Decimal> {
    let (height_cm, weight_kg) = (height_cm?, weight_kg?);
    if height_cm <= Decimal::ZERO {
        return None;
    }
    let height_m = height_cm / Decimal::ONE_HUNDRED;
    let value = weight_kg.checked_div(height_m.checked_mul(height_m)?)?;
    Some(value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven))
}

/// Whole years between `date_of_birth` and `today`.
///
/// The year is only counted once the (month, day) of the birthday has been reached.
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> i32 {
    let had_birthday = (today.month(), today.day()) >= (date_of_birth.month(), date_of_birth.day());
    today.year() - date_of_birth.year() - i32::from(!had_birthday)
}

/// Overall performance rating: the sum of the ratings floor-divided by their count.
pub fn overall_rating(ratings: &[u8]) -> u8 {
    if ratings.is_empty() {
        return 0;
    }
    let sum: u32 = ratings.iter().map(|r| u32::from(*r)).sum();
    // Ratings are bounded by u8, so the mean is too.
    (sum / ratings.len() as u32) as u8
}

/// Inventory value: unit cost times quantity.
///
/// `None` when the unit cost is unknown or the product does not fit a decimal.
pub fn inventory_total(unit_cost: Option<Decimal>, quantity: u32) -> Option<Decimal> {
    unit_cost?
        .checked_mul(Decimal::from(quantity))
        .map(|total| total.round_dp(2))
}
