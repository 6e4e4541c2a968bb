//! Distance metrics for vector similarity.
//!
//! A [`Metric`] computes a distance between two vectors where **lower is
//! better**. The search queues order distances through [`cmp_unit`] and
//! [`cmp_bound`]; the latter extends the distance order with a top element
//! (`None` = +∞) so a tombstoned entry point can seed a search without
//! polluting the real distance domain.

use crate::item::SparseVector;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A distance function over vectors of type `V`.
///
/// `Unit` is the distance value; it only needs a partial order, which the
/// index totalizes via [`cmp_unit`] (incomparable values compare equal).
pub trait Metric<V>: Send + Sync {
    /// The distance value type.
    type Unit: Copy + PartialOrd + Send + Sync;

    /// Distance between `u` and `v`. Lower means more similar.
    fn distance(&self, u: &V, v: &V) -> Self::Unit;
}

/// Total order on distance values; incomparable pairs (NaN) compare equal.
#[inline]
pub fn cmp_unit<U: PartialOrd>(a: &U, b: &U) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

/// Total order on optional distances where `None` is the top element:
/// greater than every real distance and equal to itself.
#[inline]
pub fn cmp_bound<U: PartialOrd>(a: &Option<U>, b: &Option<U>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => cmp_unit(x, y),
    }
}

/// Euclidean (L2) distance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Euclidean;

/// Squared Euclidean distance. Same ordering as [`Euclidean`], no sqrt.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SquaredEuclidean;

/// Cosine distance: `1 - cos(u, v)`. Range `[0, 2]`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Cosine;

/// Inner-product distance: `1 - dot(u, v)`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct InnerProduct;

/// Manhattan (L1) distance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Manhattan;

/// Canberra distance: sum of `|u - v| / (|u| + |v|)` over the coordinates.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Canberra;

/// Bray-Curtis dissimilarity: `sum|u - v| / sum|u + v|`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BrayCurtis;

/// Correlation distance: `1 - pearson(u, v)`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Correlation;

/// Inner-product distance over sparse vectors with sorted indices.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SparseInnerProduct;

impl Metric<Vec<f32>> for Euclidean {
    type Unit = f32;

    fn distance(&self, u: &Vec<f32>, v: &Vec<f32>) -> f32 {
        let mut sum = 0.0f32;
        for i in 0..u.len() {
            let d = u[i] - v[i];
            sum += d * d;
        }
        sum.sqrt()
    }
}

impl Metric<Vec<f64>> for Euclidean {
    type Unit = f64;

    fn distance(&self, u: &Vec<f64>, v: &Vec<f64>) -> f64 {
        let mut sum = 0.0f64;
        for i in 0..u.len() {
            let d = u[i] - v[i];
            sum += d * d;
        }
        sum.sqrt()
    }
}

impl Metric<Vec<f32>> for SquaredEuclidean {
    type Unit = f32;

    fn distance(&self, u: &Vec<f32>, v: &Vec<f32>) -> f32 {
        let mut sum = 0.0f32;
        for i in 0..u.len() {
            let d = u[i] - v[i];
            sum += d * d;
        }
        sum
    }
}

impl Metric<Vec<f64>> for SquaredEuclidean {
    type Unit = f64;

    fn distance(&self, u: &Vec<f64>, v: &Vec<f64>) -> f64 {
        let mut sum = 0.0f64;
        for i in 0..u.len() {
            let d = u[i] - v[i];
            sum += d * d;
        }
        sum
    }
}

impl Metric<Vec<f32>> for Cosine {
    type Unit = f32;

    fn distance(&self, u: &Vec<f32>, v: &Vec<f32>) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_u = 0.0f32;
        let mut norm_v = 0.0f32;
        for i in 0..u.len() {
            dot += u[i] * v[i];
            norm_u += u[i] * u[i];
            norm_v += v[i] * v[i];
        }
        1.0 - dot / (norm_u.sqrt() * norm_v.sqrt())
    }
}

impl Metric<Vec<f64>> for Cosine {
    type Unit = f64;

    fn distance(&self, u: &Vec<f64>, v: &Vec<f64>) -> f64 {
        let mut dot = 0.0f64;
        let mut norm_u = 0.0f64;
        let mut norm_v = 0.0f64;
        for i in 0..u.len() {
            dot += u[i] * v[i];
            norm_u += u[i] * u[i];
            norm_v += v[i] * v[i];
        }
        1.0 - dot / (norm_u.sqrt() * norm_v.sqrt())
    }
}

impl Metric<Vec<f32>> for InnerProduct {
    type Unit = f32;

    fn distance(&self, u: &Vec<f32>, v: &Vec<f32>) -> f32 {
        let mut dot = 0.0f32;
        for i in 0..u.len() {
            dot += u[i] * v[i];
        }
        1.0 - dot
    }
}

impl Metric<Vec<f64>> for InnerProduct {
    type Unit = f64;

    fn distance(&self, u: &Vec<f64>, v: &Vec<f64>) -> f64 {
        let mut dot = 0.0f64;
        for i in 0..u.len() {
            dot += u[i] * v[i];
        }
        1.0 - dot
    }
}

impl Metric<Vec<f32>> for Manhattan {
    type Unit = f32;

    fn distance(&self, u: &Vec<f32>, v: &Vec<f32>) -> f32 {
        let mut sum = 0.0f32;
        for i in 0..u.len() {
            sum += (u[i] - v[i]).abs();
        }
        sum
    }
}

impl Metric<Vec<f64>> for Manhattan {
    type Unit = f64;

    fn distance(&self, u: &Vec<f64>, v: &Vec<f64>) -> f64 {
        let mut sum = 0.0f64;
        for i in 0..u.len() {
            sum += (u[i] - v[i]).abs();
        }
        sum
    }
}

impl Metric<Vec<f32>> for Canberra {
    type Unit = f32;

    fn distance(&self, u: &Vec<f32>, v: &Vec<f32>) -> f32 {
        let mut sum = 0.0f32;
        for i in 0..u.len() {
            let denom = u[i].abs() + v[i].abs();
            if denom > 0.0 {
                sum += (u[i] - v[i]).abs() / denom;
            }
        }
        sum
    }
}

impl Metric<Vec<f64>> for Canberra {
    type Unit = f64;

    fn distance(&self, u: &Vec<f64>, v: &Vec<f64>) -> f64 {
        let mut sum = 0.0f64;
        for i in 0..u.len() {
            let denom = u[i].abs() + v[i].abs();
            if denom > 0.0 {
                sum += (u[i] - v[i]).abs() / denom;
            }
        }
        sum
    }
}

impl Metric<Vec<f32>> for BrayCurtis {
    type Unit = f32;

    fn distance(&self, u: &Vec<f32>, v: &Vec<f32>) -> f32 {
        let mut num = 0.0f32;
        let mut denom = 0.0f32;
        for i in 0..u.len() {
            num += (u[i] - v[i]).abs();
            denom += (u[i] + v[i]).abs();
        }
        if denom > 0.0 {
            num / denom
        } else {
            0.0
        }
    }
}

impl Metric<Vec<f64>> for BrayCurtis {
    type Unit = f64;

    fn distance(&self, u: &Vec<f64>, v: &Vec<f64>) -> f64 {
        let mut num = 0.0f64;
        let mut denom = 0.0f64;
        for i in 0..u.len() {
            num += (u[i] - v[i]).abs();
            denom += (u[i] + v[i]).abs();
        }
        if denom > 0.0 {
            num / denom
        } else {
            0.0
        }
    }
}

impl Metric<Vec<f32>> for Correlation {
    type Unit = f32;

    fn distance(&self, u: &Vec<f32>, v: &Vec<f32>) -> f32 {
        let n = u.len() as f32;
        let mean_u = u.iter().sum::<f32>() / n;
        let mean_v = v.iter().sum::<f32>() / n;
        let mut cov = 0.0f32;
        let mut var_u = 0.0f32;
        let mut var_v = 0.0f32;
        for i in 0..u.len() {
            let du = u[i] - mean_u;
            let dv = v[i] - mean_v;
            cov += du * dv;
            var_u += du * du;
            var_v += dv * dv;
        }
        1.0 - cov / (var_u.sqrt() * var_v.sqrt())
    }
}

impl Metric<Vec<f64>> for Correlation {
    type Unit = f64;

    fn distance(&self, u: &Vec<f64>, v: &Vec<f64>) -> f64 {
        let n = u.len() as f64;
        let mean_u = u.iter().sum::<f64>() / n;
        let mean_v = v.iter().sum::<f64>() / n;
        let mut cov = 0.0f64;
        let mut var_u = 0.0f64;
        let mut var_v = 0.0f64;
        for i in 0..u.len() {
            let du = u[i] - mean_u;
            let dv = v[i] - mean_v;
            cov += du * dv;
            var_u += du * du;
            var_v += dv * dv;
        }
        1.0 - cov / (var_u.sqrt() * var_v.sqrt())
    }
}

impl Metric<SparseVector<f32>> for SparseInnerProduct {
    type Unit = f32;

    fn distance(&self, u: &SparseVector<f32>, v: &SparseVector<f32>) -> f32 {
        let mut dot = 0.0f32;
        let mut i = 0;
        let mut j = 0;
        while i < u.indices.len() && j < v.indices.len() {
            match u.indices[i].cmp(&v.indices[j]) {
                Ordering::Equal => {
                    dot += u.values[i] * v.values[j];
                    i += 1;
                    j += 1;
                }
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
            }
        }
        1.0 - dot
    }
}

impl Metric<SparseVector<f64>> for SparseInnerProduct {
    type Unit = f64;

    fn distance(&self, u: &SparseVector<f64>, v: &SparseVector<f64>) -> f64 {
        let mut dot = 0.0f64;
        let mut i = 0;
        let mut j = 0;
        while i < u.indices.len() && j < v.indices.len() {
            match u.indices[i].cmp(&v.indices[j]) {
                Ordering::Equal => {
                    dot += u.values[i] * v.values[j];
                    i += 1;
                    j += 1;
                }
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
            }
        }
        1.0 - dot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_3_4_5() {
        let u = vec![0.0f32, 0.0];
        let v = vec![3.0f32, 4.0];
        assert!((Euclidean.distance(&u, &v) - 5.0).abs() < 1e-6);
        assert!((SquaredEuclidean.distance(&u, &v) - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_f64() {
        let u = vec![1.0f64, 1.0];
        let v = vec![1.0f64, 1.0];
        assert_eq!(Euclidean.distance(&u, &v), 0.0);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let u = vec![1.0f32, 0.0];
        let v = vec![0.0f32, 1.0];
        assert!((Cosine.distance(&u, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_parallel() {
        let u = vec![1.0f32, 2.0, 3.0];
        let v = vec![2.0f32, 4.0, 6.0];
        assert!(Cosine.distance(&u, &v).abs() < 1e-6);
    }

    #[test]
    fn test_inner_product() {
        let u = vec![1.0f32, 2.0];
        let v = vec![3.0f32, 4.0];
        assert!((InnerProduct.distance(&u, &v) - (1.0 - 11.0)).abs() < 1e-6);
    }

    #[test]
    fn test_manhattan() {
        let u = vec![1.0f32, -1.0, 2.0];
        let v = vec![0.0f32, 1.0, 0.0];
        assert!((Manhattan.distance(&u, &v) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_canberra() {
        let u = vec![1.0f64, 0.0];
        let v = vec![3.0f64, 0.0];
        // |1-3| / (1+3) = 0.5; the zero coordinate contributes nothing
        assert!((Canberra.distance(&u, &v) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_bray_curtis() {
        let u = vec![1.0f32, 2.0];
        let v = vec![3.0f32, 2.0];
        // |1-3| + |2-2| = 2 over |1+3| + |2+2| = 8
        assert!((BrayCurtis.distance(&u, &v) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_correlation_perfectly_correlated() {
        let u = vec![1.0f32, 2.0, 3.0, 4.0];
        let v = vec![10.0f32, 20.0, 30.0, 40.0];
        assert!(Correlation.distance(&u, &v).abs() < 1e-5);
    }

    #[test]
    fn test_correlation_anti_correlated() {
        let u = vec![1.0f64, 2.0, 3.0];
        let v = vec![3.0f64, 2.0, 1.0];
        assert!((Correlation.distance(&u, &v) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_sparse_inner_product() {
        let u = SparseVector::new(vec![0, 2, 5], vec![1.0f32, 2.0, 3.0]);
        let v = SparseVector::new(vec![2, 5, 9], vec![4.0f32, 1.0, 7.0]);
        // Overlap at 2 and 5: 2*4 + 3*1 = 11
        assert!((SparseInnerProduct.distance(&u, &v) - (1.0 - 11.0)).abs() < 1e-6);
    }

    #[test]
    fn test_sparse_disjoint() {
        let u = SparseVector::new(vec![0, 1], vec![1.0f64, 1.0]);
        let v = SparseVector::new(vec![2, 3], vec![1.0f64, 1.0]);
        assert_eq!(SparseInnerProduct.distance(&u, &v), 1.0);
    }

    #[test]
    fn test_cmp_unit_total_order() {
        assert_eq!(cmp_unit(&1.0f32, &2.0), Ordering::Less);
        assert_eq!(cmp_unit(&2.0f32, &1.0), Ordering::Greater);
        assert_eq!(cmp_unit(&f32::NAN, &1.0), Ordering::Equal);
    }

    #[test]
    fn test_cmp_bound_top_element() {
        assert_eq!(cmp_bound(&None::<f32>, &Some(f32::MAX)), Ordering::Greater);
        assert_eq!(cmp_bound(&Some(f32::MAX), &None), Ordering::Less);
        assert_eq!(cmp_bound(&None::<f32>, &None), Ordering::Equal);
        assert_eq!(cmp_bound(&Some(1.0f32), &Some(2.0)), Ordering::Less);
    }
}
