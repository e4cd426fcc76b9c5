//! Compact JSON note-list format.
//!
//! The closest wire format to the in-memory model: a top-level `usc` object
//! holding an `objects` array plus the audio offset, each object tagged by
//! `type`. Documents are written at version 2; versions 1 and 2 are
//! accepted on read.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::score::{
    Bpm, Direction, Ease, EndPoint, Event, FadeKind, Guide, GuideColor, GuidePoint, HoldPoint,
    JudgeKind, MetaData, RelayPoint, RelayRole, Score, Single, Slide, StartPoint, TICKS_PER_BEAT,
    TimeScaleGroup, TimeScalePoint, round_beat,
};

const WRITE_VERSION: u32 = 2;
const SUPPORTED_VERSIONS: [u32; 2] = [1, 2];

#[derive(Debug, Serialize, Deserialize)]
struct UscFile {
    usc: UscBody,
    version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct UscBody {
    objects: Vec<UscObject>,
    #[serde(default)]
    offset: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum UscObject {
    Bpm {
        beat: f64,
        bpm: f64,
    },
    TimeScaleGroup {
        changes: Vec<UscTimeScalePoint>,
    },
    #[serde(rename_all = "camelCase")]
    Single {
        beat: f64,
        #[serde(default)]
        critical: bool,
        lane: f64,
        size: f64,
        #[serde(default)]
        time_scale_group: f64,
        #[serde(default)]
        trace: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        direction: Option<Direction>,
    },
    #[serde(rename_all = "camelCase")]
    Damage {
        beat: f64,
        lane: f64,
        size: f64,
        #[serde(default)]
        time_scale_group: f64,
    },
    Slide {
        critical: bool,
        connections: Vec<UscConnection>,
    },
    Guide {
        color: GuideColor,
        fade: FadeKind,
        midpoints: Vec<UscPoint>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UscTimeScalePoint {
    beat: f64,
    time_scale: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum UscConnection {
    #[serde(rename_all = "camelCase")]
    Start {
        beat: f64,
        critical: bool,
        ease: Ease,
        judge_type: JudgeKind,
        lane: f64,
        size: f64,
        #[serde(default)]
        time_scale_group: f64,
    },
    #[serde(rename_all = "camelCase")]
    Tick {
        beat: f64,
        ease: Ease,
        lane: f64,
        size: f64,
        #[serde(default)]
        time_scale_group: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        critical: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    Attach {
        beat: f64,
        ease: Ease,
        lane: f64,
        size: f64,
        #[serde(default)]
        time_scale_group: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        critical: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    End {
        beat: f64,
        critical: bool,
        judge_type: JudgeKind,
        lane: f64,
        size: f64,
        #[serde(default)]
        time_scale_group: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        direction: Option<Direction>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UscPoint {
    beat: f64,
    ease: Ease,
    lane: f64,
    size: f64,
    #[serde(default)]
    time_scale_group: f64,
}

/// Parses a document. A tempo-less chart gets the default tempo.
pub fn load(bytes: &[u8]) -> Result<Score> {
    let file: UscFile = serde_json::from_slice(bytes)?;
    if !SUPPORTED_VERSIONS.contains(&file.version) {
        return Err(Error::InvalidChart(format!(
            "unsupported document version {}",
            file.version
        )));
    }

    let mut score = Score::new(MetaData {
        wave_offset: file.usc.offset,
        requests: vec![format!("ticks_per_beat {TICKS_PER_BEAT}")],
        ..MetaData::default()
    });
    for object in file.usc.objects {
        score.events.push(object.into_event());
    }
    score.ensure_tempo();
    debug!(events = score.events.len(), "note list loaded");
    Ok(score)
}

/// Serializes a score in canonical event order.
pub fn export(score: &Score) -> Result<Vec<u8>> {
    let mut score = score.clone();
    score.sort_canonical();

    let objects = score.events.iter().map(UscObject::from_event).collect();
    let file = UscFile {
        usc: UscBody {
            objects,
            offset: score.metadata.wave_offset,
        },
        version: WRITE_VERSION,
    };
    Ok(serde_json::to_vec_pretty(&file)?)
}

impl UscObject {
    fn from_event(event: &Event) -> Self {
        match event {
            Event::Tempo(bpm) => UscObject::Bpm {
                beat: bpm.beat,
                bpm: bpm.bpm,
            },
            Event::SpeedTimeline(group) => UscObject::TimeScaleGroup {
                changes: group
                    .changes
                    .iter()
                    .map(|c| UscTimeScalePoint {
                        beat: c.beat,
                        time_scale: c.time_scale,
                    })
                    .collect(),
            },
            Event::Tap(note) if note.is_damage() => UscObject::Damage {
                beat: note.beat,
                lane: note.lane,
                size: note.size,
                time_scale_group: note.time_scale_group as f64,
            },
            Event::Tap(note) => UscObject::Single {
                beat: note.beat,
                critical: note.critical,
                lane: note.lane,
                size: note.size,
                time_scale_group: note.time_scale_group as f64,
                trace: note.trace,
                direction: note.direction,
            },
            Event::Hold(slide) => UscObject::Slide {
                critical: slide.critical,
                connections: slide.connections.iter().map(UscConnection::from_point).collect(),
            },
            Event::Guide(guide) => UscObject::Guide {
                color: guide.color,
                fade: guide.fade,
                midpoints: guide
                    .midpoints
                    .iter()
                    .map(|p| UscPoint {
                        beat: p.beat,
                        ease: p.ease,
                        lane: p.lane,
                        size: p.size,
                        time_scale_group: p.time_scale_group as f64,
                    })
                    .collect(),
            },
        }
    }

    fn into_event(self) -> Event {
        match self {
            UscObject::Bpm { beat, bpm } => Event::Tempo(Bpm::new(beat, bpm)),
            UscObject::TimeScaleGroup { changes } => {
                let mut group = TimeScaleGroup::default();
                for change in changes {
                    group.push(TimeScalePoint {
                        beat: round_beat(change.beat),
                        time_scale: change.time_scale,
                    });
                }
                Event::SpeedTimeline(group)
            }
            UscObject::Single {
                beat,
                critical,
                lane,
                size,
                time_scale_group,
                trace,
                direction,
            } => Event::Tap(Single {
                critical,
                trace,
                direction,
                time_scale_group: tsg(time_scale_group),
                ..Single::tap(beat, lane, size)
            }),
            UscObject::Damage {
                beat,
                lane,
                size,
                time_scale_group,
            } => Event::Tap(Single {
                time_scale_group: tsg(time_scale_group),
                ..Single::damage(beat, lane, size)
            }),
            UscObject::Slide {
                critical,
                connections,
            } => {
                let mut slide = Slide::new(critical);
                for connection in connections {
                    slide.push(connection.into_point());
                }
                Event::Hold(slide)
            }
            UscObject::Guide {
                color,
                fade,
                midpoints,
            } => {
                let mut guide = Guide::new(color, fade);
                for point in midpoints {
                    guide.push(GuidePoint {
                        beat: round_beat(point.beat),
                        ease: point.ease,
                        lane: point.lane,
                        size: point.size,
                        time_scale_group: tsg(point.time_scale_group),
                    });
                }
                Event::Guide(guide)
            }
        }
    }
}

impl UscConnection {
    fn from_point(point: &HoldPoint) -> Self {
        match point {
            HoldPoint::Start(p) => UscConnection::Start {
                beat: p.beat,
                critical: p.critical,
                ease: p.ease,
                judge_type: p.judge,
                lane: p.lane,
                size: p.size,
                time_scale_group: p.time_scale_group as f64,
            },
            HoldPoint::Relay(p) => {
                let (beat, ease, lane, size) = (p.beat, p.ease, p.lane, p.size);
                let time_scale_group = p.time_scale_group as f64;
                match p.role {
                    RelayRole::Tick => UscConnection::Tick {
                        beat,
                        ease,
                        lane,
                        size,
                        time_scale_group,
                        critical: p.critical,
                    },
                    RelayRole::Attach => UscConnection::Attach {
                        beat,
                        ease,
                        lane,
                        size,
                        time_scale_group,
                        critical: p.critical,
                    },
                }
            }
            HoldPoint::End(p) => UscConnection::End {
                beat: p.beat,
                critical: p.critical,
                judge_type: p.judge,
                lane: p.lane,
                size: p.size,
                time_scale_group: p.time_scale_group as f64,
                direction: p.direction,
            },
        }
    }

    fn into_point(self) -> HoldPoint {
        match self {
            UscConnection::Start {
                beat,
                critical,
                ease,
                judge_type,
                lane,
                size,
                time_scale_group,
            } => HoldPoint::Start(StartPoint {
                beat: round_beat(beat),
                lane,
                size,
                critical,
                ease,
                judge: judge_type,
                time_scale_group: tsg(time_scale_group),
            }),
            UscConnection::Tick {
                beat,
                ease,
                lane,
                size,
                time_scale_group,
                critical,
            } => HoldPoint::Relay(RelayPoint {
                beat: round_beat(beat),
                lane,
                size,
                ease,
                role: RelayRole::Tick,
                critical,
                time_scale_group: tsg(time_scale_group),
            }),
            UscConnection::Attach {
                beat,
                ease,
                lane,
                size,
                time_scale_group,
                critical,
            } => HoldPoint::Relay(RelayPoint {
                beat: round_beat(beat),
                lane,
                size,
                ease,
                role: RelayRole::Attach,
                critical,
                time_scale_group: tsg(time_scale_group),
            }),
            UscConnection::End {
                beat,
                critical,
                judge_type,
                lane,
                size,
                time_scale_group,
                direction,
            } => HoldPoint::End(EndPoint {
                beat: round_beat(beat),
                lane,
                size,
                critical,
                judge: judge_type,
                direction,
                time_scale_group: tsg(time_scale_group),
            }),
        }
    }
}

/// Some writers emit the group index as a float.
fn tsg(value: f64) -> u32 {
    value.max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_inserts_default_tempo() {
        let doc = br#"{"usc":{"objects":[],"offset":0.0},"version":2}"#;
        let score = load(doc).unwrap();
        let bpm = score.tempos().next().unwrap();
        assert_eq!(bpm.bpm, 160.0);
        assert_eq!(bpm.beat, 0.0);
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let doc = br#"{"usc":{"objects":[],"offset":0.0},"version":9}"#;
        assert!(matches!(load(doc), Err(Error::InvalidChart(_))));
    }

    #[test]
    fn test_single_wire_shape() {
        let doc = br#"{
            "usc": {
                "objects": [
                    {
                        "type": "single",
                        "beat": 4.0,
                        "critical": true,
                        "lane": -1.5,
                        "size": 1.5,
                        "timeScaleGroup": 0,
                        "trace": false,
                        "direction": "left"
                    }
                ],
                "offset": -0.02
            },
            "version": 2
        }"#;
        let score = load(doc).unwrap();
        assert_eq!(score.metadata.wave_offset, -0.02);
        let note = score.taps().next().unwrap();
        assert!(note.critical);
        assert_eq!(note.direction, Some(Direction::Left));
        assert_eq!(note.lane, -1.5);
    }

    #[test]
    fn test_slide_round_trip() {
        let mut slide = Slide::new(true);
        slide.push(HoldPoint::Start(StartPoint {
            beat: 0.0,
            lane: -2.0,
            size: 1.5,
            critical: true,
            ease: Ease::In,
            judge: JudgeKind::Normal,
            time_scale_group: 0,
        }));
        slide.push(HoldPoint::Relay(RelayPoint {
            beat: 1.0,
            lane: 0.0,
            size: 1.5,
            ease: Ease::Linear,
            role: RelayRole::Tick,
            critical: None,
            time_scale_group: 0,
        }));
        slide.push(HoldPoint::End(EndPoint {
            beat: 2.0,
            lane: 2.0,
            size: 1.5,
            critical: true,
            judge: JudgeKind::Normal,
            direction: Some(Direction::Up),
            time_scale_group: 0,
        }));
        let mut score = Score::default();
        score.events.push(Event::Tempo(Bpm::new(0.0, 120.0)));
        score.events.push(Event::Hold(slide));

        let bytes = export(&score).unwrap();
        let loaded = load(&bytes).unwrap();
        let round_tripped = loaded.holds().next().unwrap();
        let original = score.holds().next().unwrap();
        assert_eq!(round_tripped, original);
    }

    #[test]
    fn test_tick_hides_absent_critical() {
        let mut slide = Slide::new(false);
        slide.push(HoldPoint::Start(StartPoint {
            beat: 0.0,
            lane: 0.0,
            size: 1.0,
            critical: false,
            ease: Ease::Linear,
            judge: JudgeKind::Normal,
            time_scale_group: 0,
        }));
        slide.push(HoldPoint::Relay(RelayPoint {
            beat: 1.0,
            lane: 0.0,
            size: 1.0,
            ease: Ease::Linear,
            role: RelayRole::Tick,
            critical: None,
            time_scale_group: 0,
        }));
        slide.push(HoldPoint::End(EndPoint {
            beat: 2.0,
            lane: 0.0,
            size: 1.0,
            critical: false,
            judge: JudgeKind::Normal,
            direction: None,
            time_scale_group: 0,
        }));
        let mut score = Score::default();
        score.events.push(Event::Hold(slide));
        let bytes = export(&score).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        // A hidden tick carries no critical key at all.
        assert!(!text.contains(r#""critical": null"#));
    }
}
