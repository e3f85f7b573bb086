/// What the slew engine is currently doing; doubles as the slew-state
/// reported while an operation is in flight.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SlewType {
    #[default]
    None,
    MoveAxis,
    Park,
    Home,
    RaDec,
    AltAz,
}

impl SlewType {
    pub fn is_slewing(self) -> bool {
        !matches!(self, SlewType::None)
    }

    /// Goto-style slews have a destination; MoveAxis does not.
    pub fn is_goto(self) -> bool {
        matches!(
            self,
            SlewType::Park | SlewType::Home | SlewType::RaDec | SlewType::AltAz
        )
    }
}
