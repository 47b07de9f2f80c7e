use crate::error::UscanError;
use crate::UscanResult;

const UNIT_TOL: f64 = 1e-8;
const PIVOT_TOL: f64 = 1e-12;

/// Lower-triangular Cholesky factor of a correlation matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CholeskyFactor {
    lower: Vec<Vec<f64>>,
}

impl CholeskyFactor {
    /// Factor for independent assets.
    pub fn identity(n_assets: usize) -> Self {
        let lower = (0..n_assets)
            .map(|i| {
                let mut row = vec![0.0; n_assets];
                row[i] = 1.0;
                row
            })
            .collect();
        Self { lower }
    }

    /// Factor an explicit correlation matrix.
    ///
    /// The matrix must be `n_assets` square, finite, symmetric, carry a unit
    /// diagonal, have off-diagonal entries in [-1, 1] and be strictly
    /// positive definite. Nothing is repaired: a bad matrix is an error.
    pub fn from_correlation(matrix: &[Vec<f64>], n_assets: usize) -> UscanResult<Self> {
        if matrix.len() != n_assets {
            return Err(UscanError::DimensionMismatch {
                expected: n_assets,
                found: matrix.len(),
            });
        }
        if let Some(row) = matrix.iter().find(|row| row.len() != n_assets) {
            return Err(UscanError::DimensionMismatch {
                expected: n_assets,
                found: row.len(),
            });
        }

        for i in 0..n_assets {
            if !matrix[i][i].is_finite() || (matrix[i][i] - 1.0).abs() > UNIT_TOL {
                return Err(UscanError::InvalidCorrelation(format!(
                    "diagonal entry ({i},{i}) is {}, expected 1",
                    matrix[i][i]
                )));
            }
            for j in 0..i {
                let (a, b) = (matrix[i][j], matrix[j][i]);
                if !a.is_finite() || !b.is_finite() {
                    return Err(UscanError::InvalidCorrelation(format!(
                        "entry ({i},{j}) is not finite"
                    )));
                }
                if (a - b).abs() > UNIT_TOL {
                    return Err(UscanError::InvalidCorrelation(format!(
                        "not symmetric at ({i},{j}): {a} vs {b}"
                    )));
                }
                if a.abs() > 1.0 + UNIT_TOL {
                    return Err(UscanError::InvalidCorrelation(format!(
                        "entry ({i},{j}) = {a} lies outside [-1, 1]"
                    )));
                }
            }
        }

        let mut lower = vec![vec![0.0_f64; n_assets]; n_assets];
        for i in 0..n_assets {
            for j in 0..=i {
                let mut sum = matrix[i][j];
                for k in 0..j {
                    sum -= lower[i][k] * lower[j][k];
                }

                if i == j {
                    if sum <= PIVOT_TOL {
                        return Err(UscanError::InvalidCorrelation(format!(
                            "matrix is not positive definite (pivot {i} = {sum:e})"
                        )));
                    }
                    lower[i][i] = sum.sqrt();
                } else {
                    lower[i][j] = sum / lower[j][j];
                }
            }
        }

        Ok(Self { lower })
    }

    /// Identity when no matrix is supplied, otherwise a validated factor.
    pub fn resolve(matrix: Option<&[Vec<f64>]>, n_assets: usize) -> UscanResult<Self> {
        match matrix {
            Some(m) => Self::from_correlation(m, n_assets),
            None => Ok(Self::identity(n_assets)),
        }
    }

    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &[Vec<f64>] {
        &self.lower
    }

    /// `out = L · indep`.
    pub fn correlate(&self, indep: &[f64], out: &mut [f64]) {
        for (i, row) in self.lower.iter().enumerate() {
            out[i] = row
                .iter()
                .zip(indep)
                .take(i + 1)
                .map(|(l, z)| l * z)
                .sum();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_identity_when_absent() {
        let f = CholeskyFactor::resolve(None, 3).unwrap();
        assert_eq!(f, CholeskyFactor::identity(3));
        let mut out = [0.0; 3];
        f.correlate(&[0.5, -1.0, 2.0], &mut out);
        assert_eq!(out, [0.5, -1.0, 2.0]);
    }

    #[test]
    fn test_two_asset_factor() {
        let rho = 0.6;
        let m = vec![vec![1.0, rho], vec![rho, 1.0]];
        let f = CholeskyFactor::from_correlation(&m, 2).unwrap();
        let l = f.lower();
        assert_eq!(l[0], vec![1.0, 0.0]);
        assert!((l[1][0] - rho).abs() < 1e-15);
        assert!((l[1][1] - (1.0_f64 - rho * rho).sqrt()).abs() < 1e-15);
    }

    #[test]
    fn test_factor_reproduces_matrix() {
        let m = vec![
            vec![1.0, 0.3, 0.2],
            vec![0.3, 1.0, 0.5],
            vec![0.2, 0.5, 1.0],
        ];
        let f = CholeskyFactor::from_correlation(&m, 3).unwrap();
        let l = f.lower();
        for i in 0..3 {
            for j in 0..3 {
                let v: f64 = (0..3).map(|k| l[i][k] * l[j][k]).sum();
                assert!((v - m[i][j]).abs() < 1e-12, "({i},{j}) = {v}");
            }
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let m = vec![vec![1.0, 0.2], vec![0.2, 1.0]];
        let err = CholeskyFactor::from_correlation(&m, 3).unwrap_err();
        assert!(matches!(
            err,
            UscanError::DimensionMismatch {
                expected: 3,
                found: 2
            }
        ));

        let ragged = vec![vec![1.0, 0.2], vec![0.2]];
        assert!(matches!(
            CholeskyFactor::from_correlation(&ragged, 2),
            Err(UscanError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_not_positive_definite() {
        let m = vec![
            vec![1.0, 0.95, 0.95],
            vec![0.95, 1.0, -0.95],
            vec![0.95, -0.95, 1.0],
        ];
        assert!(matches!(
            CholeskyFactor::from_correlation(&m, 3),
            Err(UscanError::InvalidCorrelation(_))
        ));

        // Perfect correlation is singular.
        let singular = vec![vec![1.0, 1.0], vec![1.0, 1.0]];
        assert!(matches!(
            CholeskyFactor::from_correlation(&singular, 2),
            Err(UscanError::InvalidCorrelation(_))
        ));
    }

    #[test]
    fn test_malformed_entries() {
        let asym = vec![vec![1.0, 0.2], vec![0.3, 1.0]];
        assert!(CholeskyFactor::from_correlation(&asym, 2).is_err());

        let bad_diag = vec![vec![2.0, 0.0], vec![0.0, 1.0]];
        assert!(CholeskyFactor::from_correlation(&bad_diag, 2).is_err());

        let out_of_range = vec![vec![1.0, 1.5], vec![1.5, 1.0]];
        assert!(CholeskyFactor::from_correlation(&out_of_range, 2).is_err());

        let nan = vec![vec![1.0, f64::NAN], vec![f64::NAN, 1.0]];
        assert!(CholeskyFactor::from_correlation(&nan, 2).is_err());
    }
}
