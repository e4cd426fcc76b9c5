//! Closed mapping from wire-format kind tags to typed archetypes.
//!
//! The wire format distinguishes note variants purely by tag string. Several
//! tags are substrings of others (`TraceNote` of `NonDirectionalTraceFlickNote`,
//! `SlideTickNote` of `AttachedSlideTickNote`), so classification precedence
//! matters. The precedence lives in one priority-ordered table, most specific
//! entries first, so it can be inspected and tested apart from the dispatch.

use crate::score::JudgeKind;

use super::BPM_CHANGE;

/// Typed view of a record's kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archetype {
    BpmChange,
    TimeScaleGroup,
    TimeScaleChange,
    SimLine,
    Tap {
        critical: bool,
        trace: bool,
        flick: bool,
        nondirectional: bool,
    },
    Damage,
    SlideStart {
        critical: bool,
        judge: JudgeKind,
    },
    SlideEnd {
        critical: bool,
        judge: JudgeKind,
        flick: bool,
    },
    /// Joint relay carried by the hold path. `critical: None` is the hidden
    /// variant.
    SlideTick {
        critical: Option<bool>,
    },
    /// Authored attach relay: positioned on the connector, not the path.
    AttachedTick {
        critical: bool,
    },
    /// Synthesized interpolation placeholder, carries no authored data.
    IgnoredTick,
    Connector {
        critical: bool,
    },
    Guide,
    /// Stage plumbing and anything unrecognized; skipped by the reader.
    Other,
}

/// Coarse kind, refined against the tag's modifier substrings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    BpmChange,
    TimeScaleGroup,
    TimeScaleChange,
    SimLine,
    Tap,
    NonDirectionalTap,
    Damage,
    SlideStart,
    HiddenSlideStart,
    SlideEnd,
    SlideEndFlick,
    SlideTick,
    HiddenSlideTick,
    AttachedTick,
    IgnoredTick,
    Connector,
    Guide,
}

#[derive(Debug, Clone, Copy)]
enum Match {
    Exact(&'static str),
    Contains(&'static str),
    Suffix(&'static str),
}

impl Match {
    fn matches(self, tag: &str) -> bool {
        match self {
            Match::Exact(s) => tag == s,
            Match::Contains(s) => tag.contains(s),
            Match::Suffix(s) => tag.ends_with(s),
        }
    }
}

/// Priority-ordered dispatch table. First match wins, so exact tags and
/// longer substrings must precede the generic substrings they contain.
static TABLE: &[(Match, Kind)] = &[
    (Match::Exact("IgnoredSlideTickNote"), Kind::IgnoredTick),
    (Match::Exact("HiddenSlideStartNote"), Kind::HiddenSlideStart),
    (Match::Exact("HiddenSlideTickNote"), Kind::HiddenSlideTick),
    (Match::Exact("DamageNote"), Kind::Damage),
    (
        Match::Exact("NonDirectionalTraceFlickNote"),
        Kind::NonDirectionalTap,
    ),
    (Match::Contains("AttachedSlideTickNote"), Kind::AttachedTick),
    (Match::Contains("SlideTickNote"), Kind::SlideTick),
    (Match::Contains("SlideEndFlickNote"), Kind::SlideEndFlick),
    (Match::Contains("SlideEndNote"), Kind::SlideEnd),
    (Match::Contains("SlideStartNote"), Kind::SlideStart),
    (Match::Suffix("SlideConnector"), Kind::Connector),
    (Match::Exact("Guide"), Kind::Guide),
    (Match::Exact(BPM_CHANGE), Kind::BpmChange),
    (Match::Exact("TimeScaleGroup"), Kind::TimeScaleGroup),
    (Match::Exact("TimeScaleChange"), Kind::TimeScaleChange),
    (Match::Exact("SimLine"), Kind::SimLine),
    (Match::Contains("TraceFlickNote"), Kind::Tap),
    (Match::Contains("TraceNote"), Kind::Tap),
    (Match::Contains("FlickNote"), Kind::Tap),
    (Match::Contains("TapNote"), Kind::Tap),
];

/// Classifies a wire kind tag. Unknown tags become [`Archetype::Other`].
pub fn classify(tag: &str) -> Archetype {
    let Some(kind) = TABLE
        .iter()
        .find(|(m, _)| m.matches(tag))
        .map(|&(_, kind)| kind)
    else {
        return Archetype::Other;
    };

    let critical = tag.contains("Critical");
    let trace = tag.contains("Trace");
    match kind {
        Kind::BpmChange => Archetype::BpmChange,
        Kind::TimeScaleGroup => Archetype::TimeScaleGroup,
        Kind::TimeScaleChange => Archetype::TimeScaleChange,
        Kind::SimLine => Archetype::SimLine,
        Kind::Tap => Archetype::Tap {
            critical,
            trace,
            flick: tag.contains("Flick"),
            nondirectional: false,
        },
        Kind::NonDirectionalTap => Archetype::Tap {
            critical: false,
            trace: true,
            flick: true,
            nondirectional: true,
        },
        Kind::Damage => Archetype::Damage,
        Kind::SlideStart => Archetype::SlideStart {
            critical,
            judge: if trace {
                JudgeKind::Trace
            } else {
                JudgeKind::Normal
            },
        },
        Kind::HiddenSlideStart => Archetype::SlideStart {
            critical: false,
            judge: JudgeKind::None,
        },
        Kind::SlideEnd => Archetype::SlideEnd {
            critical,
            judge: if trace {
                JudgeKind::Trace
            } else {
                JudgeKind::Normal
            },
            flick: false,
        },
        Kind::SlideEndFlick => Archetype::SlideEnd {
            critical,
            judge: JudgeKind::Normal,
            flick: true,
        },
        Kind::SlideTick => Archetype::SlideTick {
            critical: Some(critical),
        },
        Kind::HiddenSlideTick => Archetype::SlideTick { critical: None },
        Kind::AttachedTick => Archetype::AttachedTick { critical },
        Kind::IgnoredTick => Archetype::IgnoredTick,
        Kind::Connector => Archetype::Connector { critical },
        Kind::Guide => Archetype::Guide,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specific_tags_beat_generic_substrings() {
        assert_eq!(
            classify("NonDirectionalTraceFlickNote"),
            Archetype::Tap {
                critical: false,
                trace: true,
                flick: true,
                nondirectional: true,
            }
        );
        assert_eq!(
            classify("CriticalAttachedSlideTickNote"),
            Archetype::AttachedTick { critical: true }
        );
        assert_eq!(classify("IgnoredSlideTickNote"), Archetype::IgnoredTick);
        assert_eq!(
            classify("HiddenSlideTickNote"),
            Archetype::SlideTick { critical: None }
        );
    }

    #[test]
    fn test_slide_note_variants() {
        assert_eq!(
            classify("CriticalTraceSlideStartNote"),
            Archetype::SlideStart {
                critical: true,
                judge: JudgeKind::Trace,
            }
        );
        assert_eq!(
            classify("HiddenSlideStartNote"),
            Archetype::SlideStart {
                critical: false,
                judge: JudgeKind::None,
            }
        );
        assert_eq!(
            classify("NormalSlideEndFlickNote"),
            Archetype::SlideEnd {
                critical: false,
                judge: JudgeKind::Normal,
                flick: true,
            }
        );
        assert_eq!(
            classify("CriticalSlideConnector"),
            Archetype::Connector { critical: true }
        );
    }

    #[test]
    fn test_tap_variants() {
        assert_eq!(
            classify("NormalTapNote"),
            Archetype::Tap {
                critical: false,
                trace: false,
                flick: false,
                nondirectional: false,
            }
        );
        assert_eq!(
            classify("CriticalTraceNote"),
            Archetype::Tap {
                critical: true,
                trace: true,
                flick: false,
                nondirectional: false,
            }
        );
    }

    #[test]
    fn test_unknown_tags_are_other() {
        assert_eq!(classify("Initialization"), Archetype::Other);
        assert_eq!(classify("InputManager"), Archetype::Other);
        assert_eq!(classify("Stage"), Archetype::Other);
        assert_eq!(classify(""), Archetype::Other);
    }
}
