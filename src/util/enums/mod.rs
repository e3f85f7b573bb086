pub mod axis;
pub mod hemisphere;
pub mod run_state;
pub mod slew_type;
pub mod tracking_rate;

pub use axis::*;
pub use hemisphere::*;
pub use run_state::*;
pub use slew_type::*;
pub use tracking_rate::*;

// The Alpaca device vocabulary is shared with the adapter layer; alias
// it here so the core has one import path for it.
pub use ascom_alpaca::api::telescope::{
    AlignmentMode, DriveRate, EquatorialCoordinateType, GuideDirection, PierSide, TelescopeAxis,
};
