//! Distance metrics and the per-index kernel dispatch table.
//!
//! A [`DistanceKernel`] is built once at index construction: it resolves the
//! metric and the vector dimension to a concrete function pointer, so the hot
//! loops never branch on either. Common embedding dimensions resolve to
//! monomorphized kernels with compile-time trip counts; everything else uses
//! the adaptive-length kernels in [`crate::simd`].

use crate::simd;
use serde::{Deserialize, Serialize};

/// Distance metric for vector similarity.
///
/// Every metric is expressed as a *distance* (lower is closer) so the index
/// can order candidates uniformly: cosine similarity becomes `1 - sim`
/// (zero-norm inputs map to 2.0, the maximum), and dot product is negated
/// for maximum-inner-product search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean (L2) distance.
    #[default]
    Euclidean,
    /// Cosine distance, `1 - cos(a, b)`.
    Cosine,
    /// Negated dot product (maximum inner product search).
    DotProduct,
}

type KernelFn = fn(&[f32], &[f32]) -> f32;

fn l2_generic(a: &[f32], b: &[f32]) -> f32 {
    simd::l2(a, b)
}

fn cosine_generic(a: &[f32], b: &[f32]) -> f32 {
    simd::cosine(a, b)
}

fn neg_dot_generic(a: &[f32], b: &[f32]) -> f32 {
    -simd::dot(a, b)
}

macro_rules! l2_fixed_kernel {
    ($d:literal) => {
        (|a: &[f32], b: &[f32]| simd::squared_l2_fixed::<$d>(a, b).sqrt()) as KernelFn
    };
}

macro_rules! neg_dot_fixed_kernel {
    ($d:literal) => {
        (|a: &[f32], b: &[f32]| -simd::dot_fixed::<$d>(a, b)) as KernelFn
    };
}

fn select_l2(dim: usize) -> KernelFn {
    match dim {
        64 => l2_fixed_kernel!(64),
        96 => l2_fixed_kernel!(96),
        128 => l2_fixed_kernel!(128),
        256 => l2_fixed_kernel!(256),
        384 => l2_fixed_kernel!(384),
        512 => l2_fixed_kernel!(512),
        768 => l2_fixed_kernel!(768),
        1024 => l2_fixed_kernel!(1024),
        1536 => l2_fixed_kernel!(1536),
        _ => l2_generic,
    }
}

fn select_neg_dot(dim: usize) -> KernelFn {
    match dim {
        64 => neg_dot_fixed_kernel!(64),
        96 => neg_dot_fixed_kernel!(96),
        128 => neg_dot_fixed_kernel!(128),
        256 => neg_dot_fixed_kernel!(256),
        384 => neg_dot_fixed_kernel!(384),
        512 => neg_dot_fixed_kernel!(512),
        768 => neg_dot_fixed_kernel!(768),
        1024 => neg_dot_fixed_kernel!(1024),
        1536 => neg_dot_fixed_kernel!(1536),
        _ => neg_dot_generic,
    }
}

/// Resolved distance function for one index.
///
/// Cheap to copy; the graph, flat buffer, and segments all share one value.
#[derive(Clone, Copy)]
pub struct DistanceKernel {
    metric: DistanceMetric,
    dimension: usize,
    f: KernelFn,
}

impl std::fmt::Debug for DistanceKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistanceKernel")
            .field("metric", &self.metric)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl DistanceKernel {
    /// Resolves the kernel for a metric and dimension.
    #[must_use]
    pub fn new(metric: DistanceMetric, dimension: usize) -> Self {
        let f = match metric {
            DistanceMetric::Euclidean => select_l2(dimension),
            DistanceMetric::Cosine => cosine_generic,
            DistanceMetric::DotProduct => select_neg_dot(dimension),
        };
        Self {
            metric,
            dimension,
            f,
        }
    }

    /// Computes the distance between two vectors of this kernel's dimension.
    #[inline]
    #[must_use]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        (self.f)(a, b)
    }

    /// Returns the metric this kernel was resolved for.
    #[must_use]
    pub const fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Returns the dimension this kernel was resolved for.
    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }
}
