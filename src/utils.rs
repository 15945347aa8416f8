use rand_distr::{Distribution, Normal};

use crate::Float;

pub fn gauss_random(mean: Float, std: Float) -> Float {
    match Normal::new(mean, std) {
        Ok(normal) => normal.sample(&mut rand::thread_rng()),
        // non-finite std
        Err(_) => mean,
    }
}

pub fn randn(mu: Float, std: Float) -> Float {
    mu + gauss_random(0.0, 1.0) * std
}

/// Index of the largest value. Ties go to the lowest index, `None` for an
/// empty slice.
pub fn argmax(values: &[Float]) -> Option<usize> {
    let (first, rest) = values.split_first()?;

    let mut maxv = *first;
    let mut maxi = 0;
    for (i, value) in rest.iter().copied().enumerate() {
        if value > maxv {
            maxv = value;
            maxi = i + 1;
        }
    }
    Some(maxi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_picks_first_maximum() {
        assert_eq!(argmax(&[0.0, 1.0, 0.0, 1.0]), Some(1));
        assert_eq!(argmax(&[0.0, 0.0, 0.0]), Some(0));
        assert_eq!(argmax(&[-2.0, -1.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn randn_with_zero_std_is_mean() {
        assert_eq!(randn(3.0, 0.0), 3.0);
    }
}
