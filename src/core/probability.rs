//! Probability helpers shared by config parsing and event synthesis.

use rand::Rng;

/// Number of slots a probability is scaled to before a weighted draw.
pub const CHOICE_RESOLUTION: f64 = 10.0;

/// Error while normalizing a weight array.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    #[error("weights sum to zero, distribution is undefined")]
    ZeroTotal,
}

/// Error while drawing a weighted choice.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChoiceError {
    #[error("{items} choices but {weights} weights")]
    LengthMismatch { items: usize, weights: usize },
    #[error("every weight rounds to zero slots")]
    EmptyDistribution,
}

/// Turns non-negative magnitudes into a distribution summing to 1.
///
/// Negative weights count by their absolute value.
pub fn normalize(weights: &[f64]) -> Result<Vec<f64>, NormalizeError> {
    let magnitudes: Vec<f64> = weights.iter().map(|weight| weight.abs()).collect();
    let total: f64 = magnitudes.iter().sum();
    if total == 0.0 || !total.is_finite() {
        return Err(NormalizeError::ZeroTotal);
    }
    Ok(magnitudes.into_iter().map(|weight| weight / total).collect())
}

/// Draws one item according to `distribution`.
///
/// Each probability is rounded to a whole number of slots out of
/// [`CHOICE_RESOLUTION`], and a slot is picked uniformly from the combined
/// virtual array. A split such as 4%/96% therefore always picks the second
/// item.
pub fn weighted_choice<'a, T>(
    items: &'a [T],
    distribution: &[f64],
    rng: &mut impl Rng,
) -> Result<&'a T, ChoiceError> {
    if items.len() != distribution.len() {
        return Err(ChoiceError::LengthMismatch {
            items: items.len(),
            weights: distribution.len(),
        });
    }

    let slots: Vec<usize> = distribution.iter().map(|p| slot_count(*p)).collect();
    let total: usize = slots.iter().sum();
    if total == 0 {
        return Err(ChoiceError::EmptyDistribution);
    }

    let mut draw = rng.gen_range(0..total);
    for (item, count) in items.iter().zip(&slots) {
        if draw < *count {
            return Ok(item);
        }
        draw -= count;
    }

    Err(ChoiceError::EmptyDistribution)
}

fn slot_count(probability: f64) -> usize {
    let scaled = (probability * CHOICE_RESOLUTION).round();
    if scaled.is_finite() && scaled > 0.0 {
        scaled as usize
    } else {
        0
    }
}
