//! Lowering of a [`Score`] into the flat record graph.
//!
//! Every emitted record gets a lazily assigned base36 name. Holds become
//! joint records plus one connector record per segment; interpolation
//! placeholder records are synthesized on a half-beat cadence across each
//! hold so the engine has anchors to evaluate eases at. Guides become one
//! record per segment carrying the full start/head/tail/end quadruple.
//! Simultaneous-note markers are recomputed from scratch.

use tracing::debug;

use crate::error::{Error, Result};
use crate::score::{
    Event, FadeKind, Guide, HoldPoint, JudgeKind, RelayRole, Score, Single, Slide, TapKind,
    TimeScaleGroup, round_beat,
};

use super::{BEAT, BPM, BPM_CHANGE, EntityField, LevelData, LevelDataEntity};

const EPSILON: f64 = 1e-6;

/// Beat distance under which two notes count as simultaneous.
const SIM_TOLERANCE: f64 = 1e-2;

/// Cadence of synthesized interpolation placeholders, in beats.
const ATTACH_CADENCE: f64 = 0.5;

/// Upper bound on placeholders synthesized per hold. A hold long enough to
/// hit this is beyond anything an engine will play.
const MAX_SYNTH_ATTACH: usize = 100_000;

#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Gzip the serialized document.
    pub compress: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { compress: true }
    }
}

/// Lowers a score into a document. Extended eases are collapsed and a
/// default tempo is synthesized first; the input is not mutated.
pub fn write(score: &Score) -> Result<LevelData> {
    let mut score = score.clone();
    score.replace_extended_ease();
    score.ensure_tempo();
    score.sort_canonical();

    let mut writer = Writer::default();
    writer.push_plain("Initialization");
    writer.push_plain("InputManager");
    writer.push_plain("Stage");
    writer.write_speed_timelines(&score);

    for event in &score.events {
        match event {
            Event::Tempo(bpm) => {
                let name = writer.next_ref();
                writer.push(
                    BPM_CHANGE,
                    name,
                    vec![
                        EntityField::value(BEAT, bpm.beat),
                        EntityField::value(BPM, bpm.bpm),
                    ],
                );
            }
            Event::SpeedTimeline(_) => {}
            Event::Tap(note) => writer.write_tap(note),
            Event::Hold(slide) => writer.write_hold(slide)?,
            Event::Guide(guide) => writer.write_guide(guide),
        }
    }

    writer.write_sim_markers();
    debug!(entities = writer.entities.len(), "graph lowered");
    Ok(LevelData {
        bgm_offset: score.metadata.wave_offset,
        entities: writer.entities,
    })
}

#[derive(Default)]
struct Writer {
    entities: Vec<LevelDataEntity>,
    ref_counter: u64,
    /// Simultaneity-eligible visible notes: (beat, lane, name).
    sim_notes: Vec<(f64, f64, String)>,
}

impl Writer {
    fn next_ref(&mut self) -> String {
        let name = base36(self.ref_counter);
        self.ref_counter += 1;
        name
    }

    fn push(&mut self, archetype: &str, name: String, data: Vec<EntityField>) {
        self.entities.push(LevelDataEntity {
            archetype: archetype.to_string(),
            data,
            name: Some(name),
        });
    }

    fn push_plain(&mut self, archetype: &str) {
        let name = self.next_ref();
        self.push(archetype, name, Vec::new());
    }

    fn mark_sim(&mut self, beat: f64, lane: f64, name: &str) {
        self.sim_notes.push((beat, lane, name.to_string()));
    }

    /// Speed timelines are written under the `tsg:i` / `tsc:i:j` naming
    /// convention, each group chaining to the next and each change to the
    /// next within its group. A document with no timeline gets the identity
    /// pair so the engine always finds layer 0.
    fn write_speed_timelines(&mut self, score: &Score) {
        let timelines: Vec<&TimeScaleGroup> = score.speed_timelines().collect();
        if timelines.is_empty() {
            self.push(
                "TimeScaleGroup",
                "tsg:0".into(),
                vec![
                    EntityField::reference("first", "tsc:0:0"),
                    EntityField::value("length", 0.0),
                ],
            );
            self.push(
                "TimeScaleChange",
                "tsc:0:0".into(),
                vec![
                    EntityField::value(BEAT, 0.0),
                    EntityField::value("timeScale", 1.0),
                    EntityField::reference("timeScaleGroup", "tsg:0"),
                ],
            );
            return;
        }

        let last = timelines.len() - 1;
        for (index, timeline) in timelines.iter().enumerate() {
            let next = if index == last {
                EntityField::value("next", -1.0)
            } else {
                EntityField::reference("next", format!("tsg:{}", index + 1))
            };
            self.push(
                "TimeScaleGroup",
                format!("tsg:{index}"),
                vec![
                    EntityField::reference("first", format!("tsc:{index}:0")),
                    EntityField::value("length", timeline.changes.len() as f64),
                    next,
                ],
            );
        }
        for (index, timeline) in timelines.iter().enumerate() {
            let mut changes = timeline.changes.clone();
            changes.sort_by(|a, b| {
                a.beat
                    .partial_cmp(&b.beat)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let last_change = changes.len().saturating_sub(1);
            for (change_index, change) in changes.iter().enumerate() {
                let next = if change_index == last_change {
                    EntityField::value("next", -1.0)
                } else {
                    EntityField::reference("next", format!("tsc:{index}:{}", change_index + 1))
                };
                // A zero scale would stall the engine's integration.
                let scale = if change.time_scale == 0.0 {
                    1e-6
                } else {
                    change.time_scale
                };
                self.push(
                    "TimeScaleChange",
                    format!("tsc:{index}:{change_index}"),
                    vec![
                        EntityField::value(BEAT, change.beat),
                        EntityField::value("timeScale", scale),
                        next,
                    ],
                );
            }
        }
    }

    fn write_tap(&mut self, note: &Single) {
        let name = self.next_ref();
        let mut data = vec![
            EntityField::value(BEAT, note.beat),
            EntityField::value("lane", note.lane),
            EntityField::value("size", note.size),
        ];

        let archetype = if note.kind == TapKind::Damage {
            "DamageNote"
        } else {
            if let Some(direction) = note.direction {
                data.push(EntityField::value(
                    "direction",
                    direction.wire_value() as f64,
                ));
            }
            self.mark_sim(note.beat, note.lane, &name);
            match (note.critical, note.trace, note.direction.is_some()) {
                (false, false, false) => "NormalTapNote",
                (true, false, false) => "CriticalTapNote",
                (false, true, false) => "NormalTraceNote",
                (true, true, false) => "CriticalTraceNote",
                (false, false, true) => "NormalFlickNote",
                (true, false, true) => "CriticalFlickNote",
                (false, true, true) => "NormalTraceFlickNote",
                (true, true, true) => "CriticalTraceFlickNote",
            }
        };

        data.push(EntityField::reference(
            "timeScaleGroup",
            format!("tsg:{}", note.time_scale_group),
        ));
        self.push(archetype, name, data);
    }

    fn write_hold(&mut self, slide: &Slide) -> Result<()> {
        let start = slide
            .start()
            .ok_or_else(|| Error::InvalidChart("hold without a start point".into()))?;
        let end = slide
            .end()
            .ok_or_else(|| Error::InvalidChart("hold without an end point".into()))?;

        // Joints anchor the connector chain; authored attach relays ride on
        // the connectors instead.
        let joints: Vec<&HoldPoint> = slide.joints().collect();
        let attaches: Vec<_> = slide
            .connections
            .iter()
            .filter_map(|point| match point {
                HoldPoint::Relay(p) if p.role == RelayRole::Attach => Some(p),
                _ => None,
            })
            .collect();
        let synth_beats = synth_attach_beats(start.beat, end.beat)?;

        let joint_names: Vec<String> = joints.iter().map(|_| self.next_ref()).collect();
        let attach_names: Vec<String> = attaches.iter().map(|_| self.next_ref()).collect();
        let synth_names: Vec<String> = synth_beats.iter().map(|_| self.next_ref()).collect();
        let connector_names: Vec<String> =
            (1..joints.len()).map(|_| self.next_ref()).collect();

        let start_type = match start.judge {
            JudgeKind::Normal => 0.0,
            JudgeKind::Trace => 1.0,
            JudgeKind::None => 2.0,
        };

        // Start joint.
        let start_archetype = match (start.judge, start.critical) {
            (JudgeKind::None, _) => "HiddenSlideStartNote",
            (JudgeKind::Trace, false) => "NormalTraceSlideStartNote",
            (JudgeKind::Trace, true) => "CriticalTraceSlideStartNote",
            (JudgeKind::Normal, false) => "NormalSlideStartNote",
            (JudgeKind::Normal, true) => "CriticalSlideStartNote",
        };
        if start.judge != JudgeKind::None {
            self.mark_sim(start.beat, start.lane, &joint_names[0]);
        }
        self.push(
            start_archetype,
            joint_names[0].clone(),
            vec![
                EntityField::value(BEAT, start.beat),
                EntityField::value("lane", start.lane),
                EntityField::value("size", start.size),
                EntityField::reference("timeScaleGroup", format!("tsg:{}", start.time_scale_group)),
            ],
        );

        // Interior tick relays.
        for (joint, name) in joints.iter().zip(&joint_names).skip(1) {
            let HoldPoint::Relay(relay) = joint else {
                continue;
            };
            let archetype = match relay.critical {
                None => "HiddenSlideTickNote",
                Some(false) => "NormalSlideTickNote",
                Some(true) => "CriticalSlideTickNote",
            };
            self.push(
                archetype,
                name.clone(),
                vec![
                    EntityField::value(BEAT, relay.beat),
                    EntityField::value("lane", relay.lane),
                    EntityField::value("size", relay.size),
                    EntityField::reference(
                        "timeScaleGroup",
                        format!("tsg:{}", relay.time_scale_group),
                    ),
                ],
            );
        }

        // End joint. A judgement-less tail is written as a hidden relay.
        let end_name = joint_names
            .last()
            .cloned()
            .unwrap_or_else(|| unreachable!("joints always include start and end"));
        let last_connector = connector_names
            .last()
            .cloned()
            .ok_or_else(|| Error::InvalidChart("hold with fewer than two joints".into()))?;
        let mut end_data = vec![
            EntityField::value(BEAT, end.beat),
            EntityField::value("lane", end.lane),
            EntityField::value("size", end.size),
            EntityField::reference("timeScaleGroup", format!("tsg:{}", end.time_scale_group)),
        ];
        let end_archetype = if end.judge == JudgeKind::None {
            "HiddenSlideTickNote"
        } else {
            self.mark_sim(end.beat, end.lane, &end_name);
            if end.direction.is_some() {
                end_data.push(EntityField::value(
                    "direction",
                    end.direction.map(|d| d.wire_value() as f64).unwrap_or(0.0),
                ));
                if end.critical {
                    "CriticalSlideEndFlickNote"
                } else {
                    "NormalSlideEndFlickNote"
                }
            } else {
                match (end.critical, end.judge) {
                    (true, JudgeKind::Trace) => "CriticalTraceSlideEndNote",
                    (false, JudgeKind::Trace) => "NormalTraceSlideEndNote",
                    (true, _) => "CriticalSlideEndNote",
                    (false, _) => "NormalSlideEndNote",
                }
            }
        };
        end_data.push(EntityField::reference("slide", last_connector));
        self.push(end_archetype, end_name, end_data);

        // Connectors, one per adjacent joint pair. A connector carries the
        // ease of its head.
        let connector_archetype = if slide.critical {
            "CriticalSlideConnector"
        } else {
            "NormalSlideConnector"
        };
        for (segment, name) in connector_names.iter().enumerate() {
            let head = joints[segment];
            self.push(
                connector_archetype,
                name.clone(),
                vec![
                    EntityField::reference("start", joint_names[0].clone()),
                    EntityField::reference("end", joint_names[joints.len() - 1].clone()),
                    EntityField::reference("head", joint_names[segment].clone()),
                    EntityField::reference("tail", joint_names[segment + 1].clone()),
                    EntityField::value("ease", head.ease().wire_value() as f64),
                    EntityField::value("startType", start_type),
                ],
            );
        }

        // The connector segment an attach rides on is the one whose head is
        // the last joint at or before the attach's beat.
        let segment_of = |beat: f64| -> Option<usize> {
            let next = joints.iter().position(|j| j.beat() > beat)?;
            next.checked_sub(1)
        };

        for (relay, name) in attaches.iter().zip(&attach_names) {
            let archetype = match relay.critical {
                Some(true) => "CriticalAttachedSlideTickNote",
                _ => "NormalAttachedSlideTickNote",
            };
            let mut data = vec![
                EntityField::value(BEAT, relay.beat),
                EntityField::value("lane", relay.lane),
                EntityField::value("size", relay.size),
                EntityField::reference(
                    "timeScaleGroup",
                    format!("tsg:{}", relay.time_scale_group),
                ),
            ];
            if let Some(segment) = segment_of(relay.beat) {
                data.push(EntityField::reference(
                    "attach",
                    connector_names[segment].clone(),
                ));
            }
            self.push(archetype, name.clone(), data);
        }

        for (beat, name) in synth_beats.iter().zip(&synth_names) {
            let mut data = vec![EntityField::value(BEAT, *beat)];
            if let Some(segment) = segment_of(*beat) {
                data.push(EntityField::reference(
                    "attach",
                    connector_names[segment].clone(),
                ));
            }
            self.push("IgnoredSlideTickNote", name.clone(), data);
        }
        Ok(())
    }

    fn write_guide(&mut self, guide: &Guide) {
        let Some(start) = guide.midpoints.first() else {
            return;
        };
        let Some(end) = guide.midpoints.last() else {
            return;
        };
        let fade = match guide.fade {
            FadeKind::Out => 0.0,
            FadeKind::None => 1.0,
            FadeKind::In => 2.0,
        };
        for pair in guide.midpoints.windows(2) {
            let (head, tail) = (&pair[0], &pair[1]);
            let name = self.next_ref();
            self.push(
                "Guide",
                name,
                vec![
                    EntityField::value("color", guide.color.wire_value() as f64),
                    EntityField::value("fade", fade),
                    EntityField::value("ease", head.ease.wire_value() as f64),
                    EntityField::value("startLane", start.lane),
                    EntityField::value("startSize", start.size),
                    EntityField::value("startBeat", start.beat),
                    EntityField::reference(
                        "startTimeScaleGroup",
                        format!("tsg:{}", start.time_scale_group),
                    ),
                    EntityField::value("headLane", head.lane),
                    EntityField::value("headSize", head.size),
                    EntityField::value("headBeat", head.beat),
                    EntityField::reference(
                        "headTimeScaleGroup",
                        format!("tsg:{}", head.time_scale_group),
                    ),
                    EntityField::value("tailLane", tail.lane),
                    EntityField::value("tailSize", tail.size),
                    EntityField::value("tailBeat", tail.beat),
                    EntityField::reference(
                        "tailTimeScaleGroup",
                        format!("tsg:{}", tail.time_scale_group),
                    ),
                    EntityField::value("endLane", end.lane),
                    EntityField::value("endSize", end.size),
                    EntityField::value("endBeat", end.beat),
                    EntityField::reference(
                        "endTimeScaleGroup",
                        format!("tsg:{}", end.time_scale_group),
                    ),
                ],
            );
        }
    }

    /// Recomputes simultaneous-note markers: eligible notes are clustered by
    /// beat within a small tolerance, ordered by lane, and each adjacent pair
    /// in a cluster gets one marker.
    fn write_sim_markers(&mut self) {
        let mut notes = std::mem::take(&mut self.sim_notes);
        notes.sort_by(|a, b| {
            (a.0, a.1)
                .partial_cmp(&(b.0, b.1))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut cluster_start = 0;
        for i in 1..=notes.len() {
            let cluster_ends =
                i == notes.len() || (notes[i].0 - notes[i - 1].0).abs() > SIM_TOLERANCE;
            if !cluster_ends {
                continue;
            }
            for pair in notes[cluster_start..i].windows(2) {
                let name = self.next_ref();
                self.push(
                    "SimLine",
                    name,
                    vec![
                        EntityField::reference("a", pair[0].2.clone()),
                        EntityField::reference("b", pair[1].2.clone()),
                    ],
                );
            }
            cluster_start = i;
        }
    }
}

/// Beats of the synthesized interpolation placeholders for a hold: every
/// half beat from the first half-beat line strictly after the start, up to
/// but excluding the end.
fn synth_attach_beats(start: f64, end: f64) -> Result<Vec<f64>> {
    let first = (((start + EPSILON) / ATTACH_CADENCE).floor() + 1.0) * ATTACH_CADENCE;
    let mut beats = Vec::new();
    let mut step = 0usize;
    loop {
        let beat = round_beat(first + step as f64 * ATTACH_CADENCE);
        if beat + EPSILON >= end {
            break;
        }
        if beats.len() >= MAX_SYNTH_ATTACH {
            return Err(Error::ResolutionExhausted { beat, lane: 0.0 });
        }
        beats.push(beat);
        step += 1;
    }
    Ok(beats)
}

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
