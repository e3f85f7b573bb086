pub use cancellation::*;
pub use enums::*;
pub use events::*;
pub use result::*;

pub mod cancellation;
pub mod enums;
pub mod events;
pub mod result;

pub use crate::astro_math::{Degrees, Hours};

/// One arcsecond in degrees.
pub const ARCSEC: Degrees = 1.0 / 3600.0;
