//! Agglomerative clustering with Ward linkage over Euclidean distances.
//!
//! The output follows the usual linkage-matrix layout: row `s` merges clusters
//! `row[0]` and `row[1]` (leaves are `0..n`, the cluster formed at step `s` is
//! `n + s`) at distance `row[2]`, giving a cluster of `row[3]` leaves.

use philodb_core::similarity::euclidean;

pub type LinkageRow = [f64; 4];

/// Ward linkage via the Lance-Williams update.
///
/// Ties between equally close pairs go to the pair with the lowest cluster
/// ids, so the result is reproducible for a fixed input order.
pub fn ward_linkage(points: &[Vec<f32>]) -> Vec<LinkageRow> {
    let n = points.len();
    if n < 2 {
        return Vec::new();
    }
    let mut dist = vec![vec![0f64; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = euclidean(&points[i], &points[j]);
            dist[i][j] = d;
            dist[j][i] = d;
        }
    }
    // slot -> (cluster id, size); None once merged away
    let mut active: Vec<Option<(usize, usize)>> = (0..n).map(|i| Some((i, 1))).collect();
    let mut rows = Vec::with_capacity(n - 1);

    for step in 0..n - 1 {
        let mut best: Option<(f64, (usize, usize), usize, usize)> = None;
        for a in 0..n {
            let Some((id_a, _)) = active[a] else { continue };
            for b in (a + 1)..n {
                let Some((id_b, _)) = active[b] else { continue };
                let d = dist[a][b];
                let key = (id_a.min(id_b), id_a.max(id_b));
                let better = match best {
                    None => true,
                    Some((bd, best_key, _, _)) => d < bd || (d == bd && key < best_key),
                };
                if better { best = Some((d, key, a, b)); }
            }
        }
        let Some((d, _, a, b)) = best else { break };
        let (Some((id_a, size_a)), Some((id_b, size_b))) = (active[a], active[b]) else { break };
        let merged = size_a + size_b;
        rows.push([id_a.min(id_b) as f64, id_a.max(id_b) as f64, d, merged as f64]);

        for k in 0..n {
            if k == a || k == b { continue; }
            let Some((_, size_k)) = active[k] else { continue };
            let (sa, sb, sk) = (size_a as f64, size_b as f64, size_k as f64);
            let total = sa + sb + sk;
            let sq = ((sa + sk) * dist[a][k].powi(2) + (sb + sk) * dist[b][k].powi(2) - sk * d.powi(2)) / total;
            let updated = sq.max(0.0).sqrt();
            dist[a][k] = updated;
            dist[k][a] = updated;
        }
        active[a] = Some((n + step, merged));
        active[b] = None;
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_than_two_points_have_no_merges() {
        assert!(ward_linkage(&[]).is_empty());
        assert!(ward_linkage(&[vec![1.0]]).is_empty());
    }

    #[test]
    fn merges_closest_pairs_first() {
        let points = vec![vec![0.0], vec![10.0], vec![1.0], vec![11.0]];
        let z = ward_linkage(&points);
        assert_eq!(z.len(), 3);
        assert_eq!(z[0], [0.0, 2.0, 1.0, 2.0]);
        assert_eq!(z[1], [1.0, 3.0, 1.0, 2.0]);
        assert_eq!((z[2][0], z[2][1], z[2][3]), (4.0, 5.0, 4.0));
        // ward distance between {0,1} and {10,11}: sqrt(2 * 2 * 2 / 4) * 10
        assert!((z[2][2] - 20.0 / 2f64.sqrt() * 1.0).abs() < 1e-9);
    }

    #[test]
    fn three_points_match_known_linkage() {
        let z = ward_linkage(&[vec![0.0, 0.0], vec![0.0, 1.0], vec![4.0, 0.0]]);
        assert_eq!(z[0][..2], [0.0, 1.0]);
        assert!((z[0][2] - 1.0).abs() < 1e-12);
        let expected = ((2.0 * 16.0 + 2.0 * 17.0 - 1.0) / 3.0f64).sqrt();
        assert_eq!(z[1][..2], [2.0, 3.0]);
        assert!((z[1][2] - expected).abs() < 1e-12);
        assert_eq!(z[1][3], 3.0);
    }

    #[test]
    fn distances_are_monotone() {
        let points: Vec<Vec<f32>> = (0..8).map(|i| vec![(i * i) as f32, (i % 3) as f32]).collect();
        let z = ward_linkage(&points);
        assert_eq!(z.len(), 7);
        assert!(z.windows(2).all(|w| w[0][2] <= w[1][2] + 1e-12));
        assert_eq!(z[6][3], 8.0);
    }
}
