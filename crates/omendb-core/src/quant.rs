//! Binary quantization: one bit per dimension, Hamming pre-filtering.
//!
//! Codes are compared with XOR + popcount during graph traversal to skip
//! float distance computations for hopeless candidates. The float distance
//! is always recomputed for anything that reaches the result set, so the
//! quantizer only ever affects speed, not correctness of returned distances.

use crate::simd;

/// Spread below which a vector is treated as constant.
const CONSTANT_EPSILON: f32 = 1e-6;

/// One-bit-per-dimension encoder.
///
/// The threshold is the arithmetic mean of the vector. Constant vectors
/// (max - min below epsilon) would encode to all-zeros under any threshold,
/// which makes every pair of them Hamming-identical; those get alternating
/// bits instead so code density stays near 50%.
#[derive(Debug, Clone, Copy)]
pub struct BinaryQuantizer {
    dimension: usize,
    code_len: usize,
}

impl BinaryQuantizer {
    /// Creates a quantizer for the given dimension.
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self {
            dimension,
            code_len: dimension.div_ceil(8),
        }
    }

    /// Bytes per code: `ceil(dim / 8)`.
    #[must_use]
    pub const fn code_len(&self) -> usize {
        self.code_len
    }

    /// Encodes a vector into `code_len` bytes, bit `i` little-endian within
    /// byte `i / 8`.
    #[must_use]
    pub fn encode(&self, vector: &[f32]) -> Vec<u8> {
        debug_assert_eq!(vector.len(), self.dimension);

        let mut code = vec![0u8; self.code_len];
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        let mut sum = 0.0f64;
        for &v in vector {
            min = min.min(v);
            max = max.max(v);
            sum += f64::from(v);
        }

        if max - min < CONSTANT_EPSILON {
            for i in (1..self.dimension).step_by(2) {
                code[i / 8] |= 1 << (i % 8);
            }
            return code;
        }

        #[allow(clippy::cast_precision_loss)]
        let threshold = (sum / self.dimension as f64) as f32;
        for (i, &v) in vector.iter().enumerate() {
            if v > threshold {
                code[i / 8] |= 1 << (i % 8);
            }
        }
        code
    }

    /// Approximates the L2 distance of the original vectors from two codes.
    ///
    /// `sqrt(hamming / dim) * sqrt(dim)`; the dim factors cancel, leaving
    /// `sqrt(hamming)`.
    #[inline]
    #[must_use]
    pub fn binary_distance(&self, a: &[u8], b: &[u8]) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let h = simd::hamming(a, b) as f32;
        h.sqrt()
    }
}

/// Flattened storage for binary codes, parallel to the float arena.
///
/// Codes are appended in numeric-id order and immutable once written.
#[derive(Debug, Clone)]
pub struct BinaryCodeStore {
    quantizer: BinaryQuantizer,
    data: Vec<u8>,
    count: usize,
}

impl BinaryCodeStore {
    /// Creates an empty code store for the given dimension.
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self {
            quantizer: BinaryQuantizer::new(dimension),
            data: Vec::new(),
            count: 0,
        }
    }

    /// Encodes and appends a vector's code; ids are assigned densely in
    /// append order, matching the arena.
    pub fn push(&mut self, vector: &[f32]) {
        let code = self.quantizer.encode(vector);
        self.data.extend_from_slice(&code);
        self.count += 1;
    }

    /// Returns the code for a numeric id.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&[u8]> {
        let idx = id as usize;
        if idx >= self.count {
            return None;
        }
        let start = idx * self.quantizer.code_len();
        Some(&self.data[start..start + self.quantizer.code_len()])
    }

    /// Approximate L2 distance between a query code and a stored code.
    #[inline]
    #[must_use]
    pub fn distance_to(&self, query_code: &[u8], id: u32) -> Option<f32> {
        self.get(id)
            .map(|code| self.quantizer.binary_distance(query_code, code))
    }

    /// Encodes a query vector (not stored).
    #[must_use]
    pub fn encode_query(&self, query: &[f32]) -> Vec<u8> {
        self.quantizer.encode(query)
    }

    /// Number of stored codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if no codes are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Drops all codes.
    pub fn clear(&mut self) {
        self.data.clear();
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_bit_positions() {
        let q = BinaryQuantizer::new(4);
        // Mean = 0.5; bits set where v > 0.5.
        let code = q.encode(&[1.0, 0.0, 1.0, 0.0]);
        assert_eq!(code, vec![0b0000_0101]);
    }

    #[test]
    fn test_encode_little_endian_across_bytes() {
        let q = BinaryQuantizer::new(10);
        let mut v = vec![0.0; 10];
        v[8] = 10.0;
        v[9] = 10.0;
        let code = q.encode(&v);
        assert_eq!(code.len(), 2);
        assert_eq!(code[0], 0);
        assert_eq!(code[1], 0b0000_0011);
    }

    #[test]
    fn test_constant_vector_alternates() {
        let q = BinaryQuantizer::new(8);
        let code = q.encode(&[0.25; 8]);
        // Odd positions set: bits 1,3,5,7.
        assert_eq!(code, vec![0b1010_1010]);
        let ones: u32 = code.iter().map(|b| b.count_ones()).sum();
        assert_eq!(ones, 4);
    }

    #[test]
    fn test_constant_vectors_same_code() {
        let q = BinaryQuantizer::new(16);
        assert_eq!(q.encode(&[1.0; 16]), q.encode(&[-3.0; 16]));
    }

    #[test]
    fn test_binary_distance_zero_for_identical() {
        let q = BinaryQuantizer::new(32);
        let v: Vec<f32> = (0..32).map(|i| (i as f32 * 0.9).sin()).collect();
        let code = q.encode(&v);
        assert_eq!(q.binary_distance(&code, &code), 0.0);
    }

    #[test]
    fn test_store_roundtrip() {
        let mut store = BinaryCodeStore::new(16);
        let a: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let b: Vec<f32> = (0..16).map(|i| -(i as f32)).collect();
        store.push(&a);
        store.push(&b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).unwrap(), store.encode_query(&a).as_slice());
        assert!(store.get(2).is_none());
        // Opposite orderings disagree on every non-threshold bit.
        let d = store
            .distance_to(&store.encode_query(&a), 1)
            .unwrap();
        assert!(d > 0.0);
    }

    #[test]
    fn test_correlation_with_l2_on_unit_vectors() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let dim = 64;
        let store = BinaryCodeStore::new(dim);
        let mut rng = StdRng::seed_from_u64(42);
        let mut unit = |rng: &mut StdRng| -> Vec<f32> {
            let v: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
            let n = crate::simd::norm(&v).max(1e-12);
            v.into_iter().map(|x| x / n).collect()
        };

        let pairs = 2_000;
        let mut xs = Vec::with_capacity(pairs);
        let mut ys = Vec::with_capacity(pairs);
        for _ in 0..pairs {
            let a = unit(&mut rng);
            let b = unit(&mut rng);
            let ca = store.encode_query(&a);
            let cb = store.encode_query(&b);
            xs.push(f64::from(BinaryQuantizer::new(dim).binary_distance(&ca, &cb)));
            ys.push(f64::from(crate::simd::l2(&a, &b)));
        }

        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        let mx = mean(&xs);
        let my = mean(&ys);
        let mut cov = 0.0;
        let mut vx = 0.0;
        let mut vy = 0.0;
        for (x, y) in xs.iter().zip(&ys) {
            cov += (x - mx) * (y - my);
            vx += (x - mx) * (x - mx);
            vy += (y - my) * (y - my);
        }
        let pearson = cov / (vx.sqrt() * vy.sqrt());
        assert!(pearson >= 0.7, "pearson = {pearson}");
    }
}
