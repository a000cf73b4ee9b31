//! Vector arithmetic shared by encoders and the index.

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Scale to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize_in_place(v: &mut [f32]) {
    let n = norm(v);
    if n > 1e-9 {
        v.iter_mut().for_each(|x| *x /= n);
    }
}

/// Cosine similarity; zero when either vector has no length.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let denom = norm(a) * norm(b);
    if denom <= 1e-9 {
        0.0
    } else {
        dot(a, b) / denom
    }
}

/// Symmetric int8 quantization. Returns the codes and the dequantization scale.
pub fn quantize_i8(v: &[f32]) -> (Vec<i8>, f32) {
    let max_abs = v.iter().fold(0.0f32, |m, x| m.max(x.abs()));
    if max_abs <= 1e-12 {
        return (vec![0; v.len()], 0.0);
    }
    let scale = max_abs / 127.0;
    let codes = v
        .iter()
        .map(|x| (x / scale).round().clamp(-127.0, 127.0) as i8)
        .collect();
    (codes, scale)
}

pub fn dot_i8(a: &[i8], b: &[i8]) -> i32 {
    a.iter().zip(b).map(|(x, y)| *x as i32 * *y as i32).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0f32, 4.0, 0.0, 0.0];
        l2_normalize_in_place(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert!((norm(&v) - 1.0).abs() < 1e-6);

        let mut zero = vec![0.0f32; 4];
        l2_normalize_in_place(&mut zero);
        assert!(zero.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_cosine_bounds() {
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_quantized_dot_tracks_float_dot() {
        let a = [0.5f32, -0.25, 0.8, 0.1];
        let b = [0.4f32, 0.3, 0.7, -0.2];
        let (qa, sa) = quantize_i8(&a);
        let (qb, sb) = quantize_i8(&b);
        let approx = dot_i8(&qa, &qb) as f32 * sa * sb;
        assert!((approx - dot(&a, &b)).abs() < 0.02);
    }
}
