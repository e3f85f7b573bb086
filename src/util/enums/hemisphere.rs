use crate::astro_math::Degrees;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Hemisphere {
    Northern,
    Southern,
}

impl Hemisphere {
    pub fn from_latitude(latitude: Degrees) -> Self {
        if latitude < 0. {
            Hemisphere::Southern
        } else {
            Hemisphere::Northern
        }
    }

    pub fn is_northern(self) -> bool {
        matches!(self, Hemisphere::Northern)
    }
}
