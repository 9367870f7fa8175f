/// Computes the dot-product of `a` and `b`.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    return a
        .iter()
        .zip(b)
        .map(|(&ai, &bi)| ai * bi)
        .reduce(|x, y| x + y)
        .unwrap_or(0.0);
}

/// Computes the squared 2-norm of `a`.
pub fn norm_sq(a: &[f64]) -> f64 {
    let mut sqsum = 0.0;
    for i in 0..a.len() {
        sqsum += a[i] * a[i];
    }
    sqsum
}

/// Returns the 2-norm (Euclidean) of `a`.
pub fn norm(a: &[f64]) -> f64 {
    f64::sqrt(norm_sq(a))
}

/// Computes the infinity norm: `max(abs(a))`
pub fn norm_inf(a: &[f64]) -> f64 {
    let mut max = 0.0;
    for i in 0..a.len() {
        let absvi = a[i].abs();
        if absvi > max {
            max = absvi
        }
    }
    max
}

/// Computes `max(abs(a - b))` without forming the difference.
pub fn norm_inf_diff(a: &[f64], b: &[f64]) -> f64 {
    let mut max = 0.0;
    for i in 0..a.len() {
        let absvi = (a[i] - b[i]).abs();
        if absvi > max {
            max = absvi
        }
    }
    max
}

/// Returns true when every component of `a` is finite.
pub fn all_finite(a: &[f64]) -> bool {
    a.iter().all(|v| v.is_finite())
}
