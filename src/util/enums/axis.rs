use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// The two motor axes. Primary is RA/Az, secondary Dec/Alt.
#[derive(
    Debug,
    Eq,
    PartialEq,
    Copy,
    Clone,
    Hash,
    Serialize,
    Deserialize,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(u8)]
pub enum Axis {
    Primary = 0,
    Secondary = 1,
}

impl Axis {
    pub const BOTH: [Axis; 2] = [Axis::Primary, Axis::Secondary];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn other(self) -> Axis {
        match self {
            Axis::Primary => Axis::Secondary,
            Axis::Secondary => Axis::Primary,
        }
    }
}
