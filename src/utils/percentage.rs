use chrono::Duration;

/// Rounded share of `value` in `whole` as a whole percentage. Returns 0 for an empty whole.
pub fn percent_of(value: Duration, whole: Duration) -> u8 {
    let whole = i128::from(whole.num_milliseconds());
    if whole <= 0 {
        return 0;
    }
    // Integer half-up rounding keeps the result independent of float representation.
    let value = i128::from(value.num_milliseconds().max(0));
    ((value * 200 + whole) / (whole * 2)).min(100) as u8
}

/// Rounds every value to a whole percentage of `whole` and hands the rounding remainder to the
/// first entry, so that the result sums to exactly 100. Callers pass values ranked from the
/// largest down. When the first entry can't take the whole correction (many small values that
/// all rounded up), the rest moves on to the following entries.
///
/// Returns an empty vector when `whole` is zero.
pub fn distribute_percentages(values: &[Duration], whole: Duration) -> Vec<u8> {
    if values.is_empty() || whole <= Duration::zero() {
        return vec![];
    }

    let mut rounded = values
        .iter()
        .map(|v| i64::from(percent_of(*v, whole)))
        .collect::<Vec<_>>();
    let mut remainder = 100 - rounded.iter().sum::<i64>();
    for share in rounded.iter_mut() {
        if remainder == 0 {
            break;
        }
        let adjusted = (*share + remainder).clamp(0, 100);
        remainder -= adjusted - *share;
        *share = adjusted;
    }

    rounded.into_iter().map(|v| v as u8).collect()
}
