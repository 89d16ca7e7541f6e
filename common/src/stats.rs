//! Aggregations applied after group-by: plain moments plus the Student-t 95%
//! confidence bounds the scatter figures draw as error bars.

/// Two-sided 95% quantiles t(0.975, df) for df 1..=30.
const T_975: [f64; 30] = [
    12.706, 4.303, 3.182, 2.776, 2.571, 2.447, 2.365, 2.306, 2.262, 2.228, 2.201, 2.179, 2.160,
    2.145, 2.131, 2.120, 2.110, 2.101, 2.093, 2.086, 2.080, 2.074, 2.069, 2.064, 2.060, 2.056,
    2.052, 2.048, 2.045, 2.042,
];
const Z_975: f64 = 1.960;

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

pub fn median(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

pub fn min(xs: &[f64]) -> f64 {
    xs.iter().copied().fold(f64::NAN, f64::min)
}

pub fn max(xs: &[f64]) -> f64 {
    xs.iter().copied().fold(f64::NAN, f64::max)
}

/// Linear-interpolated percentile, `p` in 0..=100.
pub fn percentile(xs: &[f64], p: f64) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (rank - lo as f64) * (sorted[hi] - sorted[lo])
    }
}

/// Sample standard deviation (n - 1 denominator).
pub fn stddev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return f64::NAN;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (xs.len() - 1) as f64;
    var.sqrt()
}

/// Lower bound of the two-sided 95% confidence interval of the mean. With
/// fewer than two samples the bound collapses to the mean.
pub fn ci_lower(xs: &[f64]) -> f64 {
    mean(xs) - ci_half_width(xs)
}

/// Upper bound of the two-sided 95% confidence interval of the mean.
pub fn ci_upper(xs: &[f64]) -> f64 {
    mean(xs) + ci_half_width(xs)
}

fn ci_half_width(xs: &[f64]) -> f64 {
    let n = xs.len();
    if n < 2 {
        return 0.0;
    }
    let t = if n - 1 <= T_975.len() {
        T_975[n - 2]
    } else {
        Z_975
    };
    t * stddev(xs) / (n as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn moments() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        assert!(close(mean(&xs), 2.5));
        assert!(close(median(&xs), 2.5));
        assert!(close(median(&[3.0, 1.0, 2.0]), 2.0));
        assert!(close(min(&xs), 1.0));
        assert!(close(max(&xs), 4.0));
        assert!(close(stddev(&[2.0, 4.0]), std::f64::consts::SQRT_2));
    }

    #[test]
    fn percentiles() {
        let xs = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert!(close(percentile(&xs, 0.0), 10.0));
        assert!(close(percentile(&xs, 50.0), 30.0));
        assert!(close(percentile(&xs, 95.0), 48.0));
        assert!(close(percentile(&xs, 100.0), 50.0));
    }

    #[test]
    fn ci_brackets_the_mean_symmetrically() {
        let xs = [10.0, 12.0, 14.0, 16.0];
        let m = mean(&xs);
        let lo = ci_lower(&xs);
        let hi = ci_upper(&xs);
        assert!(lo < m && m < hi);
        assert!(close(m - lo, hi - m));
        // t(0.975, 3) = 3.182, s = sqrt(20/3), n = 4
        let expected = 3.182 * (20.0f64 / 3.0).sqrt() / 2.0;
        assert!(close(hi - m, expected));
    }

    #[test]
    fn ci_collapses_for_single_sample() {
        let xs = [42.0];
        assert!(close(ci_lower(&xs), 42.0));
        assert!(close(ci_upper(&xs), 42.0));
    }
}
