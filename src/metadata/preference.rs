//! Client preferences

/// One client-stated acceptability weight for a piece of metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Preference<T> {
    /// Preferred metadata
    pub metadata: T,
    /// Quality in `[0, 1]`
    pub quality: f32,
}

impl<T> Preference<T> {
    /// Create a preference, clamping the quality into `[0, 1]`
    #[must_use]
    pub fn new(metadata: T, quality: f32) -> Self {
        let quality = if quality.is_nan() {
            0.0
        } else {
            quality.clamp(0.0, 1.0)
        };
        Self { metadata, quality }
    }

    /// Create a preference with the maximum quality
    #[must_use]
    pub fn full(metadata: T) -> Self {
        Self::new(metadata, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_is_clamped() {
        assert!((Preference::new("a", 2.5).quality - 1.0).abs() < f32::EPSILON);
        assert!(Preference::new("a", -1.0).quality.abs() < f32::EPSILON);
        assert!(Preference::new("a", f32::NAN).quality.abs() < f32::EPSILON);
    }
}
