//! Vector similarity math. Index vectors are L2-normalized, so cosine = dot product.

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn norm(a: &[f32]) -> f32 {
    dot(a, a).sqrt()
}

/// Normalize in place. Zero vectors are left untouched; returns false for them.
pub fn l2_normalize(v: &mut [f32]) -> bool {
    let n = norm(v);
    if n == 0.0 || !n.is_finite() {
        return false;
    }
    for x in v.iter_mut() { *x /= n; }
    true
}

/// Cosine similarity of arbitrary vectors; 0.0 when either has zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let denom = norm(a) * norm(b);
    if denom == 0.0 { 0.0 } else { dot(a, b) / denom }
}

pub fn euclidean(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Element-wise mean of the given rows. Empty input yields a zero vector.
pub fn mean<'a, I>(rows: I, dim: usize) -> Vec<f32>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut acc = vec![0f64; dim];
    let mut count = 0usize;
    for row in rows {
        for (a, &x) in acc.iter_mut().zip(row) { *a += f64::from(x); }
        count += 1;
    }
    if count == 0 {
        return vec![0.0; dim];
    }
    acc.into_iter().map(|a| (a / count as f64) as f32).collect()
}
