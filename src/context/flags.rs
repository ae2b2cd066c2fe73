// PopContext
// copyright zipxing@hotmail.com 2022～2025

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Sub-phases of one cook. Clearing a bit lets a driver (a scrubbing
    /// viewer, say) recook partially. Combinations are not validated.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CookFlags: u8 {
        const REAP        = 0b0000_0001;
        const PREP        = 0b0000_0010;
        const APPLY_RULES = 0b0000_0100;
        const COOK        = 0b0000_1000;
        /// solve the first cook after a reset instead of only recording time
        const COOK_FIRST  = 0b0001_0000;
    }
}

impl Default for CookFlags {
    fn default() -> Self {
        CookFlags::REAP | CookFlags::PREP | CookFlags::APPLY_RULES | CookFlags::COOK
    }
}

bitflags! {
    /// Built-in per-particle rules to skip for a whole cook.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct RuleSuppression: u16 {
        const POSITION = 0b0000_0001;
        /// no velocity change at all (implies ACCEL and DRAG)
        const VELOCITY = 0b0000_0010;
        const ROTATION = 0b0000_0100;
        const AGE      = 0b0000_1000;
        const DRAG     = 0b0001_0000;
        const ACCEL    = 0b0010_0000;
        const DEATH    = 0b0100_0000;
    }
}

bitflags! {
    /// Values of the `state` point attribute.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ParticleState: u32 {
        const DYING    = 0b0001;
        const STOPPED  = 0b0010;
        const COLLIDED = 0b0100;
        const STUCK    = 0b1000;
    }
}
