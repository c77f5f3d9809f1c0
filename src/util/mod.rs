//! Global utility functions, publicly re-exported in `prelude.rs`.

pub mod general;
pub mod smoothing;
pub mod window;

pub use general::*;
pub use smoothing::Smoother;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amplitude_conversion() {
        let level = 0.5;
        let db = level_to_db(level);
        assert!(within_tolerance(db, -6.020_599_913_279_624, f64::EPSILON));
        assert!(within_tolerance(db_to_level(db), level, f64::EPSILON));
    }

    #[test]
    fn test_silent_level_boundary() {
        assert_eq!(Db::from_level(0.0), Db::Silent);
        assert_eq!(Db::from_level(-1.0), Db::Silent);
        assert!(matches!(Db::from_level(1.0), Db::Level(x) if x.abs() < 1e-12));
        assert!(within_tolerance(
            Db::from_level(0.0).or_floor(-100.0),
            -100.0,
            f64::EPSILON,
        ));
    }
}
