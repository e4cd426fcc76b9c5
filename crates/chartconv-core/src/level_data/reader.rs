//! Reconstruction of a [`Score`] from the flat record graph.
//!
//! Holds arrive as a bag of joint records plus connector records, each
//! connector naming its chain's `start`/`end` and one `head`/`tail` segment.
//! Connectors are grouped by their (start, end) pair and re-chained
//! head-to-tail; a joint's ease is the ease of its outgoing connector.
//! Guides arrive as one record per segment carrying the full
//! start/head/tail/end quadruple and are grouped by (start, end, color).

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::score::{
    Bpm, Direction, Ease, EndPoint, Event, FadeKind, Guide, GuideColor, GuidePoint, HoldPoint,
    JudgeKind, MetaData, RelayPoint, RelayRole, Score, Single, Slide, StartPoint, TICKS_PER_BEAT,
    TimeScaleGroup, TimeScalePoint, round_beat,
};

use super::arena::{Arena, Record, RecordId};
use super::archetype::Archetype;
use super::{BEAT, BPM, LevelData};

/// Hard cap on connector-chain traversal, against reference cycles in
/// hostile or corrupt documents.
const MAX_CHAIN_HOPS: usize = 4096;

/// Reconstructs a score from a parsed document.
pub fn read(doc: &LevelData) -> Result<Score> {
    Reader::new(doc).run()
}

struct Reader<'a> {
    doc: &'a LevelData,
    arena: Arena,
}

/// A hold under reconstruction: chained joints plus attach relays gathered
/// in a second pass over the record list.
struct HoldBuild {
    start: StartPoint,
    end: EndPoint,
    relays: Vec<RelayPoint>,
    critical: bool,
}

impl<'a> Reader<'a> {
    fn new(doc: &'a LevelData) -> Self {
        Self {
            doc,
            arena: Arena::build(doc),
        }
    }

    fn run(self) -> Result<Score> {
        let mut score = Score::new(MetaData {
            wave_offset: self.doc.bgm_offset,
            requests: vec![format!("ticks_per_beat {TICKS_PER_BEAT}")],
            ..MetaData::default()
        });

        self.read_speed_timelines(&mut score);
        self.read_tempos(&mut score);
        self.read_taps(&mut score);
        self.read_holds(&mut score)?;
        self.read_guides(&mut score)?;

        score.ensure_speed_timeline();
        score.sort_canonical();
        debug!(events = score.events.len(), "graph reconstructed");
        Ok(score)
    }

    /// Speed timelines follow the `tsg:i` / `tsc:i:j` naming convention;
    /// a group record carries `length` and its changes are looked up by name.
    fn read_speed_timelines(&self, score: &mut Score) {
        let mut groups: BTreeMap<u32, TimeScaleGroup> = BTreeMap::new();
        for (_, record) in self.arena.iter() {
            if record.archetype != Archetype::TimeScaleGroup {
                continue;
            }
            let Some(index) = record.name.as_deref().and_then(parse_tsg_index) else {
                continue;
            };
            let length = record.value("length").unwrap_or(0.0).max(0.0) as usize;
            let mut group = TimeScaleGroup::default();
            for change_index in 0..length {
                let Some(id) = self.arena.lookup(&format!("tsc:{index}:{change_index}")) else {
                    continue;
                };
                let change = self.arena.get(id);
                group.push(TimeScalePoint {
                    beat: round_beat(change.value(BEAT).unwrap_or(0.0)),
                    time_scale: change.value("timeScale").unwrap_or(1.0),
                });
            }
            group.ensure_initial();
            groups.insert(index, group);
        }
        for group in groups.into_values() {
            score.events.push(Event::SpeedTimeline(group));
        }
    }

    fn read_tempos(&self, score: &mut Score) {
        for (_, record) in self.arena.iter() {
            if record.archetype != Archetype::BpmChange {
                continue;
            }
            let beat = record.value(BEAT).unwrap_or(0.0);
            let bpm = record
                .value(BPM)
                .or_else(|| record.value("bpm"))
                .unwrap_or(crate::score::DEFAULT_BPM);
            score.events.push(Event::Tempo(Bpm::new(beat, bpm)));
        }
    }

    fn read_taps(&self, score: &mut Score) {
        for (id, record) in self.arena.iter() {
            let note = match record.archetype {
                Archetype::Tap {
                    critical,
                    trace,
                    flick,
                    nondirectional,
                } => {
                    let Some(note) = self.read_tap(record, critical, trace, flick, nondirectional)
                    else {
                        warn!(record = self.arena.display(id), "note record without beat, skipped");
                        continue;
                    };
                    note
                }
                Archetype::Damage => {
                    let Some(beat) = record.value(BEAT) else {
                        continue;
                    };
                    Single {
                        time_scale_group: self.tsg_of(record),
                        ..Single::damage(
                            beat,
                            record.value("lane").unwrap_or(0.0),
                            record.value("size").unwrap_or(0.0),
                        )
                    }
                }
                _ => continue,
            };
            score.events.push(Event::Tap(note));
        }
    }

    fn read_tap(
        &self,
        record: &Record,
        critical: bool,
        trace: bool,
        flick: bool,
        nondirectional: bool,
    ) -> Option<Single> {
        let beat = record.value(BEAT)?;
        let direction = if nondirectional {
            // No model equivalent; the closest visible rendition.
            warn!("non-directional trace flick converted to an upward one");
            Some(Direction::Up)
        } else if flick {
            record
                .value("direction")
                .and_then(|v| Direction::from_wire_value(v.round() as i64))
        } else {
            None
        };
        Some(Single {
            critical,
            trace,
            direction,
            time_scale_group: self.tsg_of(record),
            ..Single::tap(
                beat,
                record.value("lane").unwrap_or(0.0),
                record.value("size").unwrap_or(0.0),
            )
        })
    }

    fn read_holds(&self, score: &mut Score) -> Result<()> {
        // Group connectors by their (start, end) pair; each group is one hold.
        let mut groups: BTreeMap<(RecordId, RecordId), Vec<RecordId>> = BTreeMap::new();
        for (id, record) in self.arena.iter() {
            let Archetype::Connector { .. } = record.archetype else {
                continue;
            };
            let start = self.required_ref(id, record, "start")?;
            let end = self.required_ref(id, record, "end")?;
            groups.entry((start, end)).or_default().push(id);
        }

        let mut holds: Vec<HoldBuild> = Vec::new();
        let mut connector_owner: HashMap<RecordId, usize> = HashMap::new();
        for ((start, end), connectors) in groups {
            let hold_index = holds.len();
            for &connector in &connectors {
                connector_owner.insert(connector, hold_index);
            }
            holds.push(self.build_hold(start, end, &connectors)?);
        }

        // Attach relays reference a connector, not a joint; route each to the
        // hold owning that connector. Placeholder ticks carry no authored
        // data and are dropped.
        for (id, record) in self.arena.iter() {
            let Archetype::AttachedTick { critical } = record.archetype else {
                continue;
            };
            let Some(hold_index) = record
                .reference("attach")
                .and_then(|conn| connector_owner.get(&conn))
            else {
                warn!(
                    record = self.arena.display(id),
                    "attach relay references no known connector, skipped"
                );
                continue;
            };
            holds[*hold_index].relays.push(RelayPoint {
                beat: round_beat(record.value(BEAT).unwrap_or(0.0)),
                lane: record.value("lane").unwrap_or(0.0),
                size: record.value("size").unwrap_or(0.0),
                ease: Ease::Linear,
                role: RelayRole::Attach,
                critical: Some(critical),
                time_scale_group: self.tsg_of(record),
            });
        }

        for hold in holds {
            let mut slide = Slide::new(hold.critical);
            slide.push(HoldPoint::Start(hold.start));
            for relay in hold.relays {
                slide.push(HoldPoint::Relay(relay));
            }
            slide.push(HoldPoint::End(hold.end));
            score.events.push(Event::Hold(slide));
        }
        Ok(())
    }

    fn build_hold(
        &self,
        start: RecordId,
        end: RecordId,
        connectors: &[RecordId],
    ) -> Result<HoldBuild> {
        let chain = self.chain_connectors(start, end, connectors)?;

        let first = self.arena.get(chain[0]);
        let start_record = self.arena.get(start);
        let Archetype::SlideStart {
            critical: start_critical,
            judge: start_judge,
        } = start_record.archetype
        else {
            return Err(Error::graph(
                self.arena.display(start),
                "hold start is not a start-note record",
            ));
        };
        let Archetype::Connector {
            critical: chain_critical,
        } = first.archetype
        else {
            unreachable!("grouped records are connectors");
        };

        let start_point = StartPoint {
            beat: round_beat(start_record.value(BEAT).unwrap_or(0.0)),
            lane: start_record.value("lane").unwrap_or(0.0),
            size: start_record.value("size").unwrap_or(0.0),
            critical: start_critical || chain_critical,
            ease: self.connector_ease(chain[0])?,
            judge: start_judge,
            time_scale_group: self.tsg_of(start_record),
        };

        // Each interior joint is the tail of one connector and the head of
        // the next; its ease is the outgoing connector's.
        let mut relays = Vec::new();
        for window in chain.windows(2) {
            let joint = self
                .arena
                .get(window[0])
                .reference("tail")
                .ok_or_else(|| {
                    Error::graph(self.arena.display(window[0]), "connector tail is unresolved")
                })?;
            let record = self.arena.get(joint);
            let Archetype::SlideTick { critical } = record.archetype else {
                return Err(Error::graph(
                    self.arena.display(joint),
                    "interior hold joint is not a relay record",
                ));
            };
            relays.push(RelayPoint {
                beat: round_beat(record.value(BEAT).unwrap_or(0.0)),
                lane: record.value("lane").unwrap_or(0.0),
                size: record.value("size").unwrap_or(0.0),
                ease: self.connector_ease(window[1])?,
                role: RelayRole::Tick,
                critical,
                time_scale_group: self.tsg_of(record),
            });
        }

        let end_record = self.arena.get(end);
        let end_point = match end_record.archetype {
            Archetype::SlideEnd {
                critical,
                judge,
                flick,
            } => EndPoint {
                beat: round_beat(end_record.value(BEAT).unwrap_or(0.0)),
                lane: end_record.value("lane").unwrap_or(0.0),
                size: end_record.value("size").unwrap_or(0.0),
                critical,
                judge,
                direction: flick
                    .then(|| record_direction(end_record))
                    .flatten(),
                time_scale_group: self.tsg_of(end_record),
            },
            // A hidden tail is written as a plain hidden relay record.
            Archetype::SlideTick { critical: None } => EndPoint {
                beat: round_beat(end_record.value(BEAT).unwrap_or(0.0)),
                lane: end_record.value("lane").unwrap_or(0.0),
                size: end_record.value("size").unwrap_or(0.0),
                critical: false,
                judge: JudgeKind::None,
                direction: None,
                time_scale_group: self.tsg_of(end_record),
            },
            _ => {
                return Err(Error::graph(
                    self.arena.display(end),
                    "hold end is not an end-note record",
                ));
            }
        };

        Ok(HoldBuild {
            critical: start_point.critical,
            start: start_point,
            end: end_point,
            relays,
        })
    }

    /// Re-chains a group of connectors head-to-tail from `start` to `end`.
    fn chain_connectors(
        &self,
        start: RecordId,
        end: RecordId,
        connectors: &[RecordId],
    ) -> Result<Vec<RecordId>> {
        let mut by_head: HashMap<RecordId, RecordId> = HashMap::new();
        for &connector in connectors {
            let record = self.arena.get(connector);
            let head = self.required_ref(connector, record, "head")?;
            if by_head.insert(head, connector).is_some() {
                return Err(Error::graph(
                    self.arena.display(connector),
                    "two connectors share the same head",
                ));
            }
        }

        let mut chain = Vec::with_capacity(connectors.len());
        let mut cursor = start;
        let max_hops = MAX_CHAIN_HOPS.min(connectors.len() + 1);
        for _ in 0..max_hops {
            let Some(&connector) = by_head.get(&cursor) else {
                return Err(Error::graph(
                    self.arena.display(cursor),
                    "connector chain breaks before reaching the hold end",
                ));
            };
            chain.push(connector);
            cursor = self
                .arena
                .get(connector)
                .reference("tail")
                .ok_or_else(|| {
                    Error::graph(self.arena.display(connector), "connector tail is unresolved")
                })?;
            if cursor == end {
                if chain.len() != connectors.len() {
                    return Err(Error::graph(
                        self.arena.display(start),
                        "connector chain leaves unreachable connectors",
                    ));
                }
                return Ok(chain);
            }
        }
        Err(Error::graph(
            self.arena.display(start),
            "connector chain never reaches the hold end",
        ))
    }

    fn connector_ease(&self, connector: RecordId) -> Result<Ease> {
        let record = self.arena.get(connector);
        let value = record.value("ease").ok_or_else(|| {
            Error::graph(self.arena.display(connector), "connector is missing its ease")
        })?;
        Ease::from_wire_value(value.round() as i64).ok_or_else(|| {
            Error::graph(
                self.arena.display(connector),
                format!("unknown ease value {value}"),
            )
        })
    }

    fn read_guides(&self, score: &mut Score) -> Result<()> {
        struct Segment {
            start: GuidePoint,
            head: GuidePoint,
            tail: GuidePoint,
            ease: Ease,
            color: GuideColor,
            fade: FadeKind,
        }

        // Group key: quantized start and end quadruples plus color, so two
        // disjoint rails between the same endpoints in different colors stay
        // separate.
        let mut groups: BTreeMap<(PointKey, PointKey, i64), Vec<Segment>> = BTreeMap::new();
        for (id, record) in self.arena.iter() {
            if record.archetype != Archetype::Guide {
                continue;
            }
            let start = self.guide_point(record, "start");
            let head = self.guide_point(record, "head");
            let tail = self.guide_point(record, "tail");
            let end = self.guide_point(record, "end");
            let ease_value = record.value("ease").ok_or_else(|| {
                Error::graph(self.arena.display(id), "guide segment is missing its ease")
            })?;
            let ease = Ease::from_wire_value(ease_value.round() as i64).ok_or_else(|| {
                Error::graph(
                    self.arena.display(id),
                    format!("unknown ease value {ease_value}"),
                )
            })?;
            let color = match record.value("color") {
                Some(v) => GuideColor::from_wire_value(v.round() as i64).ok_or_else(|| {
                    Error::graph(self.arena.display(id), format!("unknown guide color {v}"))
                })?,
                None => GuideColor::default(),
            };
            let fade = match record.value("fade") {
                Some(v) => FadeKind::from_wire_value(v.round() as i64).ok_or_else(|| {
                    Error::graph(self.arena.display(id), format!("unknown fade value {v}"))
                })?,
                None => FadeKind::default(),
            };
            groups
                .entry((point_key(&start), point_key(&end), color.wire_value()))
                .or_default()
                .push(Segment {
                    start,
                    head,
                    tail,
                    ease,
                    color,
                    fade,
                });
        }

        for (_, mut segments) in groups {
            segments.sort_by(|a, b| {
                (a.head.beat, a.tail.beat)
                    .partial_cmp(&(b.head.beat, b.tail.beat))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let first = &segments[0];
            let mut guide = Guide::new(first.color, first.fade);
            let mut midpoints = vec![first.start.clone()];
            for segment in &segments {
                // The segment's ease belongs to its head, which is the most
                // recently appended midpoint.
                if let Some(last) = midpoints.last_mut() {
                    last.ease = segment.ease;
                }
                midpoints.push(segment.tail.clone());
            }
            if let Some(last) = midpoints.last_mut() {
                last.ease = Ease::Linear;
            }
            for point in midpoints {
                guide.push(point);
            }
            score.events.push(Event::Guide(guide));
        }
        Ok(())
    }

    fn guide_point(&self, record: &Record, prefix: &str) -> GuidePoint {
        GuidePoint {
            beat: round_beat(record.value(&format!("{prefix}Beat")).unwrap_or(0.0)),
            lane: record.value(&format!("{prefix}Lane")).unwrap_or(0.0),
            size: record.value(&format!("{prefix}Size")).unwrap_or(0.0),
            ease: Ease::Linear,
            time_scale_group: self.tsg_key(record, &format!("{prefix}TimeScaleGroup")),
        }
    }

    fn required_ref(&self, id: RecordId, record: &Record, key: &str) -> Result<RecordId> {
        record.reference(key).ok_or_else(|| {
            let reason = match record.ref_name(key) {
                Some(target) => format!("{key} references unknown record {target:?}"),
                None => format!("{key} reference is missing"),
            };
            Error::graph(self.arena.display(id), reason)
        })
    }

    /// Speed-timeline membership of a note record, from its
    /// `timeScaleGroup` field.
    fn tsg_of(&self, record: &Record) -> u32 {
        self.tsg_key(record, "timeScaleGroup")
    }

    fn tsg_key(&self, record: &Record, key: &str) -> u32 {
        if let Some(id) = record.reference(key)
            && let Some(name) = self.arena.get(id).name.as_deref()
            && let Some(index) = parse_tsg_index(name)
        {
            return index;
        }
        if let Some(target) = record.ref_name(key)
            && let Some(index) = parse_tsg_index(target)
        {
            return index;
        }
        record.value(key).map(|v| v.max(0.0) as u32).unwrap_or(0)
    }
}

type PointKey = (i64, i64, i64, u32);

fn point_key(point: &GuidePoint) -> PointKey {
    (
        (point.beat * 1e6).round() as i64,
        (point.lane * 1e6).round() as i64,
        (point.size * 1e6).round() as i64,
        point.time_scale_group,
    )
}

fn parse_tsg_index(name: &str) -> Option<u32> {
    name.strip_prefix("tsg:")?.parse().ok()
}

fn record_direction(record: &Record) -> Option<Direction> {
    record
        .value("direction")
        .and_then(|v| Direction::from_wire_value(v.round() as i64))
}
