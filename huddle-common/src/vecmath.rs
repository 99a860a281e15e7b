//! Vector math for embedding similarity
//!
//! Pure functions over variable-length embedding vectors. Vectors of
//! unequal length are compared index-wise with missing entries treated
//! as zero, so a dimension mismatch pads rather than rejects.

/// Cosine similarity between two vectors.
///
/// Returns `dot(a,b) / (|a|*|b|)`. A zero norm is replaced by 1 in the
/// denominator, so the zero vector compares as 0 to everything instead
/// of producing NaN.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len().max(b.len());
    let mut dot = 0.0;
    let mut na = 0.0;
    let mut nb = 0.0;
    for i in 0..len {
        let ai = a.get(i).copied().unwrap_or(0.0);
        let bi = b.get(i).copied().unwrap_or(0.0);
        dot += ai * bi;
        na += ai * ai;
        nb += bi * bi;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom == 0.0 {
        dot
    } else {
        dot / denom
    }
}

/// Element-wise mean of a set of vectors.
///
/// Output dimension is the maximum dimension among the inputs, with
/// missing entries treated as zero. An empty input yields an empty
/// vector.
pub fn mean(vectors: &[Vec<f64>]) -> Vec<f64> {
    if vectors.is_empty() {
        return Vec::new();
    }
    let dim = vectors.iter().map(|v| v.len()).max().unwrap_or(0);
    let mut out = vec![0.0; dim];
    for v in vectors {
        for (i, slot) in out.iter_mut().enumerate() {
            *slot += v.get(i).copied().unwrap_or(0.0);
        }
    }
    let n = vectors.len() as f64;
    for slot in out.iter_mut() {
        *slot /= n;
    }
    out
}
