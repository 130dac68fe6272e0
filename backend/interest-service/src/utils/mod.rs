// Vector math for interest profiles

/// Distance reported when either side is a zero vector (or the shapes differ)
pub const MAX_COSINE_DISTANCE: f64 = 2.0;

/// `sum[i] += weight * vec[i]`
///
/// Callers guarantee equal lengths; extra components on either side are ignored.
pub fn scaled_add(sum: &mut [f64], vec: &[f32], weight: f64) {
    for (acc, &component) in sum.iter_mut().zip(vec) {
        *acc += weight * component as f64;
    }
}

/// Weighted mean `sum / total_weight`, `None` when there is no weight yet
pub fn mean(sum: &[f64], total_weight: f64) -> Option<Vec<f32>> {
    if total_weight == 0.0 {
        return None;
    }

    Some(sum.iter().map(|&s| (s / total_weight) as f32).collect())
}

/// `1 - cosine_similarity(a, b)`, in `[0, 2]`.
///
/// A zero vector has no direction, so it is treated as maximally distant
/// from everything instead of dividing by zero.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return MAX_COSINE_DISTANCE;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return MAX_COSINE_DISTANCE;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    (1.0 - similarity).clamp(0.0, MAX_COSINE_DISTANCE)
}
