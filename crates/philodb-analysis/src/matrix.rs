//! Cosine similarity matrices between school vectors.

use philodb_core::similarity::{cosine, norm};

use crate::groups::SchoolVectors;

/// Square, symmetric matrix over one corpus's schools; the diagonal is 1 for
/// every school with a non-zero mean vector and 0 otherwise.
pub fn self_similarity(groups: &SchoolVectors) -> Vec<Vec<f32>> {
    let n = groups.len();
    let mut m = vec![vec![0f32; n]; n];
    for i in 0..n {
        m[i][i] = if norm(&groups.vectors[i]) > 0.0 { 1.0 } else { 0.0 };
        for j in (i + 1)..n {
            let s = cosine(&groups.vectors[i], &groups.vectors[j]);
            m[i][j] = s;
            m[j][i] = s;
        }
    }
    m
}

/// Rows are `a`'s schools, columns are `b`'s.
pub fn cross_similarity(a: &SchoolVectors, b: &SchoolVectors) -> Vec<Vec<f32>> {
    a.vectors
        .iter()
        .map(|va| b.vectors.iter().map(|vb| cosine(va, vb)).collect())
        .collect()
}
