use rankfuse_core::error::EvalError;

fn check_dimensions(a: &[f32], b: &[f32]) -> Result<(), EvalError> {
    if a.len() != b.len() {
        return Err(EvalError::malformed(format!(
            "vector dimensions differ: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32, EvalError> {
    check_dimensions(a, b)?;
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

/// Cosine similarity in [-1, 1]; 0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, EvalError> {
    let dot = dot_product(a, b)?;
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f32, EvalError> {
    check_dimensions(a, b)?;
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt())
}
