//! Similarity math used by the in-memory index.

/// Cosine of the angle between `a` and `b`, clamped to `[-1.0, 1.0]`.
///
/// Mismatched lengths, empty input, and zero vectors score `0.0` so a bad
/// vector ranks below every real match instead of poisoning the sort.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, aa, bb) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, aa, bb), (x, y)| {
            (dot + x * y, aa + x * x, bb + y * y)
        });

    let norms = (aa * bb).sqrt();
    if norms <= f32::EPSILON {
        return 0.0;
    }
    (dot / norms).clamp(-1.0, 1.0)
}
