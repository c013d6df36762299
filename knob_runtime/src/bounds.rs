/// Decimal places kept on every canonical knob value.
pub const VALUE_PRECISION: i32 = 4;

/// A value forced into bounds, flagged when the input lay outside them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clamped {
    pub value: f64,
    pub clamped: bool,
}

/// Force `value` into `[min, max]`.
///
/// Every write to a knob passes through here.
pub fn clamp(value: f64, min: f64, max: f64) -> Clamped {
    Clamped {
        value: value.max(min).min(max),
        clamped: value < min || value > max,
    }
}

/// Round to [`VALUE_PRECISION`] decimal places.
pub fn round_to_precision(value: f64) -> f64 {
    let scale = 10f64.powi(VALUE_PRECISION);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inside_bounds_is_untouched() {
        let result = clamp(0.4, 0.0, 1.0);
        assert_eq!(result.value, 0.4);
        assert!(!result.clamped);
    }

    #[test]
    fn edges_are_not_clamped() {
        assert!(!clamp(0.0, 0.0, 1.0).clamped);
        assert!(!clamp(1.0, 0.0, 1.0).clamped);
    }

    #[test]
    fn outside_bounds_is_flagged() {
        let high = clamp(1.1, 0.0, 1.0);
        assert_eq!(high.value, 1.0);
        assert!(high.clamped);

        let low = clamp(-3.0, -0.5, 0.5);
        assert_eq!(low.value, -0.5);
        assert!(low.clamped);
    }

    #[test]
    fn rounding_removes_float_drift() {
        let mut value = 0.0;
        for _ in 0..7 {
            value = round_to_precision(value + 0.1);
        }
        assert_eq!(value, 0.7);
        assert_eq!(round_to_precision(0.123_456), 0.1235);
    }
}
