use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Interpolation curve between two chain points.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Ease {
    #[default]
    Linear,
    In,
    Out,
    InOut,
    OutIn,
}

impl Ease {
    /// Entity-graph wire value.
    pub fn wire_value(&self) -> i64 {
        match self {
            Self::OutIn => -2,
            Self::Out => -1,
            Self::Linear => 0,
            Self::In => 1,
            Self::InOut => 2,
        }
    }

    pub fn from_wire_value(value: i64) -> Option<Self> {
        match value {
            -2 => Some(Self::OutIn),
            -1 => Some(Self::Out),
            0 => Some(Self::Linear),
            1 => Some(Self::In),
            2 => Some(Self::InOut),
            _ => None,
        }
    }

    /// Collapses the extended curves onto the three every format supports.
    pub fn collapse_extended(&self) -> Self {
        match self {
            Self::InOut => Self::Out,
            Self::OutIn => Self::In,
            other => *other,
        }
    }
}

/// Flick direction on a tap or hold end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Left,
    Up,
    Right,
}

impl Direction {
    pub fn wire_value(&self) -> i64 {
        match self {
            Self::Left => -1,
            Self::Up => 0,
            Self::Right => 1,
        }
    }

    pub fn from_wire_value(value: i64) -> Option<Self> {
        match value {
            -1 => Some(Self::Left),
            0 => Some(Self::Up),
            1 => Some(Self::Right),
            _ => None,
        }
    }
}

/// How a hold endpoint is judged.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JudgeKind {
    #[default]
    Normal,
    Trace,
    None,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GuideColor {
    Neutral,
    Red,
    #[default]
    Green,
    Blue,
    Yellow,
    Purple,
    Cyan,
    Black,
}

impl GuideColor {
    pub fn wire_value(&self) -> i64 {
        match self {
            Self::Neutral => 0,
            Self::Red => 1,
            Self::Green => 2,
            Self::Blue => 3,
            Self::Yellow => 4,
            Self::Purple => 5,
            Self::Cyan => 6,
            Self::Black => 7,
        }
    }

    pub fn from_wire_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Neutral),
            1 => Some(Self::Red),
            2 => Some(Self::Green),
            3 => Some(Self::Blue),
            4 => Some(Self::Yellow),
            5 => Some(Self::Purple),
            6 => Some(Self::Cyan),
            7 => Some(Self::Black),
            _ => None,
        }
    }

    /// Collapses the extended palette onto the two-color one used by the
    /// line-oriented format and the oldest binary revision.
    pub fn collapse_extended(&self) -> Self {
        match self {
            Self::Yellow => Self::Yellow,
            _ => Self::Green,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FadeKind {
    #[default]
    Out,
    None,
    In,
}

impl FadeKind {
    pub fn wire_value(&self) -> i64 {
        match self {
            Self::Out => 0,
            Self::None => 1,
            Self::In => 2,
        }
    }

    pub fn from_wire_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Out),
            1 => Some(Self::None),
            2 => Some(Self::In),
            _ => None,
        }
    }
}

/// Interior hold point flavor: a tick follows the chain geometry on its own,
/// an attach point is glued onto the segment passing through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RelayRole {
    Tick,
    Attach,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_ease_wire_round_trip() {
        for ease in [Ease::Linear, Ease::In, Ease::Out, Ease::InOut, Ease::OutIn] {
            assert_eq!(Ease::from_wire_value(ease.wire_value()), Some(ease));
        }
        assert_eq!(Ease::from_wire_value(7), None);
    }

    #[test]
    fn test_ease_collapse_extended() {
        assert_eq!(Ease::InOut.collapse_extended(), Ease::Out);
        assert_eq!(Ease::OutIn.collapse_extended(), Ease::In);
        assert_eq!(Ease::Linear.collapse_extended(), Ease::Linear);
    }

    #[test]
    fn test_color_collapse_extended() {
        assert_eq!(GuideColor::Yellow.collapse_extended(), GuideColor::Yellow);
        assert_eq!(GuideColor::Purple.collapse_extended(), GuideColor::Green);
        assert_eq!(GuideColor::Neutral.collapse_extended(), GuideColor::Green);
    }

    #[test]
    fn test_string_forms() {
        assert_eq!(Ease::InOut.to_string(), "inout");
        assert_eq!(Ease::from_str("outin").unwrap(), Ease::OutIn);
        assert_eq!(Direction::Left.to_string(), "left");
        assert_eq!(JudgeKind::None.to_string(), "none");
        assert_eq!(GuideColor::from_str("yellow").unwrap(), GuideColor::Yellow);
    }
}
