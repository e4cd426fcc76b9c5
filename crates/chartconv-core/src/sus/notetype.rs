//! Numeric note codes of the line-oriented text format.
//!
//! One code space per channel family. Taps and directionals are overlaid on
//! hold/guide points to recover criticality, judgement, ease, and flick
//! direction, since the hold channels themselves only carry chain roles.

pub(crate) mod tap {
    pub const TAP: u8 = 1;
    pub const C_TAP: u8 = 2;
    pub const FLICK: u8 = 3;
    pub const TRACE: u8 = 5;
    pub const C_TRACE: u8 = 6;
    pub const ELASER: u8 = 7;
    pub const C_ELASER: u8 = 8;
}

pub(crate) mod air {
    pub const UP: u8 = 1;
    pub const DOWN: u8 = 2;
    pub const LEFT_UP: u8 = 3;
    pub const RIGHT_UP: u8 = 4;
    pub const LEFT_DOWN: u8 = 5;
    pub const RIGHT_DOWN: u8 = 6;
}

pub(crate) mod slide {
    pub const START: u8 = 1;
    pub const END: u8 = 2;
    pub const VISIBLE_STEP: u8 = 3;
    pub const STEP: u8 = 5;
}

pub(crate) mod guide {
    pub const START: u8 = 1;
    pub const END: u8 = 2;
    pub const STEP: u8 = 5;
}
