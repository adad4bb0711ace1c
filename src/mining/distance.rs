use crate::math::matrix::Matrix;

/// Squared Euclidean distance.
pub fn sqdist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Squared Euclidean distances between all rows of `embeddings` (`n × d`).
///
/// The result is `n × n`, exactly symmetric with a zero diagonal. Differences
/// are summed directly rather than expanded as `‖a‖² + ‖b‖² − 2a·b`, so no
/// negative values appear through cancellation. For unit vectors every entry
/// lies in [0, 4].
pub fn pairwise_sqdist(embeddings: &Matrix) -> Matrix {
    let n = embeddings.rows;
    let mut dist = Matrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = sqdist(embeddings.row(i), embeddings.row(j));
            dist.data[i][j] = d;
            dist.data[j][i] = d;
        }
    }
    dist
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::matrix::l2_normalize;
    use proptest::prelude::*;

    #[test]
    fn matches_hand_computed_distances() {
        let e = Matrix::from_data(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]]);
        let d = pairwise_sqdist(&e);
        assert_eq!(d.data, vec![
            vec![0.0, 2.0, 4.0],
            vec![2.0, 0.0, 2.0],
            vec![4.0, 2.0, 0.0],
        ]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn symmetric_zero_diagonal_and_bounded_for_unit_rows(
            rows in prop::collection::vec(prop::collection::vec(-1.0f64..1.0, 4), 1..8),
        ) {
            let normalized: Vec<Vec<f64>> = rows.iter()
                .map(|r| if r.iter().all(|&x| x == 0.0) { vec![1.0, 0.0, 0.0, 0.0] } else { l2_normalize(r) })
                .collect();
            let d = pairwise_sqdist(&Matrix::from_data(normalized));
            for i in 0..d.rows {
                prop_assert_eq!(d.data[i][i], 0.0);
                for j in 0..d.cols {
                    prop_assert_eq!(d.data[i][j], d.data[j][i]);
                    prop_assert!(d.data[i][j] >= 0.0 && d.data[i][j] <= 4.0 + 1e-12);
                }
            }
        }
    }
}
