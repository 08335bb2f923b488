//! Range validation table from spec §3.3. Values outside range are
//! rejected (not clamped) — only clock skew is ever clamped.

pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }
}

pub const SYSTOLIC: Range = Range::new(40.0, 260.0);
pub const DIASTOLIC: Range = Range::new(20.0, 200.0);
pub const PULSE: Range = Range::new(20.0, 250.0);
pub const SPO2: Range = Range::new(50.0, 100.0);
pub const TEMP: Range = Range::new(20.0, 45.0);
pub const WEIGHT: Range = Range::new(0.5, 500.0);
pub const GLUCOSE: Range = Range::new(10.0, 800.0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn systolic_boundaries() {
        assert!(SYSTOLIC.contains(40.0));
        assert!(SYSTOLIC.contains(260.0));
        assert!(!SYSTOLIC.contains(39.0));
        assert!(!SYSTOLIC.contains(261.0));
    }

    #[test]
    fn glucose_boundaries() {
        assert!(GLUCOSE.contains(10.0));
        assert!(GLUCOSE.contains(800.0));
        assert!(!GLUCOSE.contains(9.9));
        assert!(!GLUCOSE.contains(800.1));
    }
}
