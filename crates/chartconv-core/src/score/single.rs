use serde::{Deserialize, Serialize};

use crate::score::{Direction, round_beat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TapKind {
    #[default]
    Normal,
    Damage,
}

/// A standalone note: tap, flick, trace, or damage.
#[derive(Debug, Clone, PartialEq)]
pub struct Single {
    pub beat: f64,
    pub lane: f64,
    pub size: f64,
    pub critical: bool,
    pub trace: bool,
    pub direction: Option<Direction>,
    pub fake: bool,
    pub kind: TapKind,
    pub time_scale_group: u32,
}

impl Single {
    pub fn tap(beat: f64, lane: f64, size: f64) -> Self {
        Self {
            beat: round_beat(beat),
            lane,
            size,
            critical: false,
            trace: false,
            direction: None,
            fake: false,
            kind: TapKind::Normal,
            time_scale_group: 0,
        }
    }

    pub fn damage(beat: f64, lane: f64, size: f64) -> Self {
        Self {
            kind: TapKind::Damage,
            ..Self::tap(beat, lane, size)
        }
    }

    pub fn is_damage(&self) -> bool {
        self.kind == TapKind::Damage
    }
}
