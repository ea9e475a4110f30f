//! Cosine distance for HNSW: a scalar computation, no SIMD.

/// Cosine similarity in `[-1, 1]`. Zero vectors are treated as having zero
/// similarity to anything (including each other), which gives a
/// "maximally dissimilar" distance of `1.0` for zero vectors rather than
/// an undefined `0/0`.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vector dimensions must match");
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Cosine distance: `1 - cosine_similarity`, in `[0, 2]`.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_zero_distance() {
        let a = vec![1.0, 2.0, 3.0];
        assert!(cosine_distance(&a, &a) < 1e-5);
    }

    #[test]
    fn orthogonal_vectors_have_unit_distance() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn opposite_vectors_have_max_distance() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-5);
    }

    #[test]
    fn zero_vector_is_maximally_dissimilar() {
        let zero = vec![0.0, 0.0, 0.0];
        let other = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_distance(&zero, &other), 1.0);
        assert_eq!(cosine_distance(&zero, &zero), 1.0);
    }
}
