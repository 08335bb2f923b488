use ingest_core::ranges;
use ingest_core::PayloadError;

fn check(field: &str, value: f64, range: ranges::Range) -> Result<(), PayloadError> {
    if range.contains(value) {
        Ok(())
    } else {
        Err(PayloadError::OutOfRange {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}

pub fn systolic(v: f64) -> Result<(), PayloadError> {
    check("systolic", v, ranges::SYSTOLIC)
}
pub fn diastolic(v: f64) -> Result<(), PayloadError> {
    check("diastolic", v, ranges::DIASTOLIC)
}
pub fn pulse(v: f64) -> Result<(), PayloadError> {
    check("pulse", v, ranges::PULSE)
}
pub fn spo2(v: f64) -> Result<(), PayloadError> {
    check("spo2", v, ranges::SPO2)
}
pub fn temp(v: f64) -> Result<(), PayloadError> {
    check("temp", v, ranges::TEMP)
}
pub fn weight(v: f64) -> Result<(), PayloadError> {
    check("weight", v, ranges::WEIGHT)
}
pub fn glucose(v: f64) -> Result<(), PayloadError> {
    check("glucose", v, ranges::GLUCOSE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_systolic() {
        assert!(systolic(500.0).is_err());
        assert!(systolic(128.0).is_ok());
    }
}
