//! Grading math shared by the record model and the roster summaries.
//! Marks are integers in the roster file; everything derived from them is
//! computed on demand and never stored.

/// Fixed maximum a record is scored against: three coursework pieces at 20
/// marks each plus a 100-mark exam. The denominator is this constant, not
/// whatever the row actually holds.
pub const MAX_TOTAL: f64 = 160.0;

/// Half-up 2-decimal rounding: `Int(100*x + 0.5) / 100`.
/// `.xx5` always rounds up (63.125 -> 63.13), unlike bankers' rounding.
pub fn round_half_up_2(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

/// Percentage of the fixed 160-mark maximum, rounded to 2 decimals.
pub fn percentage_of(total: i64) -> f64 {
    round_half_up_2(total as f64 * 100.0 / MAX_TOTAL)
}

/// Letter bucket for a percentage. Lower bounds are inclusive, checked in
/// descending order.
pub fn letter_grade(percentage: f64) -> &'static str {
    if percentage >= 70.0 {
        "A"
    } else if percentage >= 60.0 {
        "B"
    } else if percentage >= 50.0 {
        "C"
    } else if percentage >= 40.0 {
        "D"
    } else {
        "F"
    }
}

/// Mean of the given percentages, rounded to 2 decimals. None when there is
/// nothing to average; an empty roster never divides by zero.
pub fn average_percentage<I>(percentages: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut sum = 0.0;
    let mut count = 0usize;
    for p in percentages {
        sum += p;
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some(round_half_up_2(sum / count as f64))
}
