pub mod catalogue;
pub mod import_unit;

pub use catalogue::{DimensionRow, Unit, University};
pub use import_unit::{ImportUnit, Offering, UniversityInfo, UNKNOWN_CREDIT_POINTS};
