//! Codec for the line-oriented text chart format.
//!
//! The format has no direct notion of criticality, judgement, ease, or flick
//! direction on hold and guide points. Instead a tap or directional note is
//! overlaid at the same (tick, lane) and its code carries the attribute.
//! Loading consumes those overlays; whatever taps and directionals remain
//! afterwards are standalone notes.

mod line;
mod notetype;

use tracing::debug;

use crate::error::{Error, Result};
use crate::score::{
    Bpm, Direction, Ease, EndPoint, Event, FadeKind, Guide, GuideColor, GuidePoint, HoldPoint,
    JudgeKind, MetaData, RelayPoint, RelayRole, Score, Single, Slide, StartPoint, TimeScaleGroup,
    TimeScalePoint, round_beat,
};

use line::{RawNote, RawScore};
use notetype::{air, guide, slide, tap};

fn tick_to_beat(tick: i64, tpb: i64) -> f64 {
    round_beat(tick as f64 / tpb as f64)
}

fn beat_to_tick(beat: f64, tpb: i64) -> i64 {
    (beat * tpb as f64).round() as i64
}

/// Wire lane is the left edge on a 0-based 36-column grid; model lane is the
/// center on a signed, zero-centered axis.
fn to_model_lane(lane: u8, width: u8) -> f64 {
    f64::from(lane) + f64::from(width) / 2.0 - 8.0
}

fn to_model_size(width: u8) -> f64 {
    f64::from(width) / 2.0
}

fn to_wire_lane(lane: f64, size: f64) -> u8 {
    (lane - size + 8.0).floor().clamp(0.0, 35.0) as u8
}

fn to_wire_width(size: f64) -> u8 {
    (size * 2.0).ceil().clamp(1.0, 35.0) as u8
}

/// Removes and returns the code of the overlay note at (tick, lane), if any.
fn take_overlay(notes: &mut Vec<RawNote>, tick: i64, lane: u8) -> Option<u8> {
    let index = notes.iter().position(|n| n.tick == tick && n.lane == lane)?;
    Some(notes.remove(index).kind)
}

fn overlay_critical(code: Option<u8>) -> bool {
    matches!(code, Some(tap::C_TAP | tap::C_TRACE | tap::C_ELASER))
}

fn overlay_trace(code: Option<u8>) -> bool {
    matches!(code, Some(tap::TRACE | tap::C_TRACE))
}

fn overlay_judge(code: Option<u8>) -> JudgeKind {
    match code {
        Some(tap::TRACE | tap::C_TRACE) => JudgeKind::Trace,
        Some(tap::ELASER | tap::C_ELASER) => JudgeKind::None,
        _ => JudgeKind::Normal,
    }
}

fn overlay_ease(code: Option<u8>) -> Ease {
    match code {
        Some(air::DOWN) => Ease::In,
        Some(air::LEFT_DOWN | air::RIGHT_DOWN) => Ease::Out,
        _ => Ease::Linear,
    }
}

fn overlay_direction(code: Option<u8>) -> Option<Direction> {
    match code {
        Some(air::UP) => Some(Direction::Up),
        Some(air::LEFT_UP) => Some(Direction::Left),
        Some(air::RIGHT_UP) => Some(Direction::Right),
        _ => None,
    }
}

fn decode(bytes: &[u8]) -> Result<String> {
    let (text, _, had_errors) = encoding_rs::UTF_8.decode(bytes);
    if !had_errors {
        return Ok(text.into_owned());
    }
    debug!("document is not valid UTF-8, retrying as Shift-JIS");
    let (text, _, had_errors) = encoding_rs::SHIFT_JIS.decode(bytes);
    if had_errors {
        return Err(Error::Encoding(
            "document is neither valid UTF-8 nor Shift-JIS".to_string(),
        ));
    }
    Ok(text.into_owned())
}

pub fn load(bytes: &[u8]) -> Result<Score> {
    let mut raw = line::parse(&decode(bytes)?)?;
    let tpb = raw.ticks_per_beat();

    let mut score = Score::new(MetaData {
        title: raw.title.clone(),
        artist: raw.artist.clone(),
        designer: raw.designer.clone(),
        wave_offset: -raw.wave_offset,
        requests: raw.requests.clone(),
    });

    for &(tick, bpm) in &raw.bpms {
        score
            .events
            .push(Event::Tempo(Bpm::new(tick_to_beat(tick, tpb), bpm)));
    }

    let mut timeline = TimeScaleGroup::default();
    for &(tick, value) in &raw.speeds {
        timeline.push(TimeScalePoint {
            beat: tick_to_beat(tick, tpb),
            time_scale: value,
        });
    }
    timeline.sort_changes();
    timeline.ensure_initial();
    score.events.push(Event::SpeedTimeline(timeline));

    let chains = std::mem::take(&mut raw.slides);
    for chain in &chains {
        if let Some(hold) = lift_hold(chain, &mut raw, tpb) {
            score.events.push(Event::Hold(hold));
        }
    }

    let guide_chains = std::mem::take(&mut raw.guides);
    for chain in &guide_chains {
        if let Some(lifted) = lift_guide(chain, &mut raw, tpb) {
            score.events.push(Event::Guide(lifted));
        }
    }

    // Whatever overlays the chains did not consume are standalone notes.
    let taps = std::mem::take(&mut raw.taps);
    for note in taps {
        let direction_code = take_overlay(&mut raw.directionals, note.tick, note.lane);
        let mut single = Single::tap(
            tick_to_beat(note.tick, tpb),
            to_model_lane(note.lane, note.width),
            to_model_size(note.width),
        );
        single.critical = overlay_critical(Some(note.kind));
        single.trace = overlay_trace(Some(note.kind));
        single.direction = overlay_direction(direction_code);
        score.events.push(Event::Tap(single));
    }

    score.ensure_tempo();
    score.sort_canonical();
    Ok(score)
}

fn lift_hold(chain: &[RawNote], raw: &mut RawScore, tpb: i64) -> Option<Slide> {
    if chain.len() < 2 {
        debug!("hold chain with fewer than two points, skipped");
        return None;
    }
    let mut hold = Slide::new(false);
    let last = chain.len() - 1;
    for (index, point) in chain.iter().enumerate() {
        let tap_code = take_overlay(&mut raw.taps, point.tick, point.lane);
        let air_code = take_overlay(&mut raw.directionals, point.tick, point.lane);
        let beat = tick_to_beat(point.tick, tpb);
        let lane = to_model_lane(point.lane, point.width);
        let size = to_model_size(point.width);

        if index == 0 {
            hold.critical = overlay_critical(tap_code);
            hold.push(HoldPoint::Start(StartPoint {
                beat,
                lane,
                size,
                critical: hold.critical,
                ease: overlay_ease(air_code),
                judge: overlay_judge(tap_code),
                time_scale_group: 0,
            }));
        } else if index == last {
            hold.push(HoldPoint::End(EndPoint {
                beat,
                lane,
                size,
                critical: overlay_critical(tap_code),
                judge: overlay_judge(tap_code),
                direction: overlay_direction(air_code),
                time_scale_group: 0,
            }));
        } else {
            let mut relay = RelayPoint {
                beat,
                lane,
                size,
                ease: overlay_ease(air_code),
                role: RelayRole::Tick,
                critical: Some(hold.critical),
                time_scale_group: 0,
            };
            if point.kind == slide::VISIBLE_STEP {
                if tap_code == Some(tap::FLICK) {
                    relay.role = RelayRole::Attach;
                }
            } else if point.kind == slide::STEP {
                relay.critical = None;
            }
            hold.push(HoldPoint::Relay(relay));
        }
    }
    Some(hold)
}

fn lift_guide(chain: &[RawNote], raw: &mut RawScore, tpb: i64) -> Option<Guide> {
    if chain.len() < 2 {
        debug!("guide chain with fewer than two points, skipped");
        return None;
    }
    let mut lifted = Guide::new(GuideColor::Green, FadeKind::Out);
    for (index, point) in chain.iter().enumerate() {
        let tap_code = take_overlay(&mut raw.taps, point.tick, point.lane);
        let air_code = take_overlay(&mut raw.directionals, point.tick, point.lane);
        if index == 0 && overlay_critical(tap_code) {
            lifted.color = GuideColor::Yellow;
        }
        lifted.push(GuidePoint {
            beat: tick_to_beat(point.tick, tpb),
            lane: to_model_lane(point.lane, point.width),
            size: to_model_size(point.width),
            ease: overlay_ease(air_code),
            time_scale_group: 0,
        });
    }
    Some(lifted)
}

/// Lowers a chart to the text format. Extended eases and guide colors are
/// collapsed and fake and damage notes are dropped, since the format cannot
/// express them.
pub fn export(score: &Score) -> Result<String> {
    let mut score = score.clone();
    score.replace_extended_ease();
    score.replace_extended_guide_colors();
    score.delete_fake_notes();
    score.delete_damage_notes();
    score.ensure_tempo();
    score.sort_canonical();

    let tpb = i64::from(score.metadata.ticks_per_beat());
    let mut lowering = Lowering {
        tpb,
        raw: RawScore {
            title: score.metadata.title.clone(),
            artist: score.metadata.artist.clone(),
            designer: score.metadata.designer.clone(),
            wave_offset: -score.metadata.wave_offset,
            requests: score.metadata.requests.clone(),
            bar_lengths: vec![(0, 4.0)],
            ..RawScore::default()
        },
    };

    for event in &score.events {
        match event {
            Event::Tempo(bpm) => {
                lowering
                    .raw
                    .bpms
                    .push((beat_to_tick(bpm.beat, tpb), bpm.bpm));
            }
            Event::SpeedTimeline(group) => {
                for change in &group.changes {
                    lowering
                        .raw
                        .speeds
                        .push((beat_to_tick(change.beat, tpb), change.time_scale));
                }
            }
            Event::Tap(single) => lowering.lower_tap(single),
            Event::Hold(hold) => lowering.lower_hold(hold),
            Event::Guide(lifted) => lowering.lower_guide(lifted),
        }
    }

    Ok(line::dump(&lowering.raw))
}

struct Lowering {
    tpb: i64,
    raw: RawScore,
}

impl Lowering {
    fn place(&self, beat: f64, lane: f64, size: f64, kind: u8) -> RawNote {
        RawNote {
            tick: beat_to_tick(beat, self.tpb),
            lane: to_wire_lane(lane, size),
            width: to_wire_width(size),
            kind,
        }
    }

    fn tap_overlay(&mut self, beat: f64, lane: f64, size: f64, kind: u8) {
        let note = self.place(beat, lane, size, kind);
        self.raw.taps.push(note);
    }

    fn air_overlay(&mut self, beat: f64, lane: f64, size: f64, kind: u8) {
        let note = self.place(beat, lane, size, kind);
        self.raw.directionals.push(note);
    }

    fn ease_overlay(&mut self, beat: f64, lane: f64, size: f64, ease: Ease) {
        match ease {
            Ease::In => self.air_overlay(beat, lane, size, air::DOWN),
            Ease::Out => self.air_overlay(beat, lane, size, air::RIGHT_DOWN),
            _ => {}
        }
    }

    fn direction_overlay(&mut self, beat: f64, lane: f64, size: f64, direction: Direction) {
        let code = match direction {
            Direction::Up => air::UP,
            Direction::Left => air::LEFT_UP,
            Direction::Right => air::RIGHT_UP,
        };
        self.air_overlay(beat, lane, size, code);
    }

    fn endpoint_overlay(
        &mut self,
        beat: f64,
        lane: f64,
        size: f64,
        judge: JudgeKind,
        critical: bool,
        always_mark_normal: bool,
    ) {
        let code = match (judge, critical) {
            (JudgeKind::None, true) => Some(tap::C_ELASER),
            (JudgeKind::None, false) => Some(tap::ELASER),
            (JudgeKind::Trace, true) => Some(tap::C_TRACE),
            (JudgeKind::Trace, false) => Some(tap::TRACE),
            (JudgeKind::Normal, true) if always_mark_normal => Some(tap::C_TAP),
            (JudgeKind::Normal, _) => None,
        };
        if let Some(code) = code {
            self.tap_overlay(beat, lane, size, code);
        }
    }

    fn lower_tap(&mut self, single: &Single) {
        let code = match (single.trace, single.critical) {
            (true, true) => tap::C_TRACE,
            (true, false) => tap::TRACE,
            (false, true) => tap::C_TAP,
            (false, false) => tap::TAP,
        };
        self.tap_overlay(single.beat, single.lane, single.size, code);
        if let Some(direction) = single.direction {
            self.direction_overlay(single.beat, single.lane, single.size, direction);
        }
    }

    fn lower_hold(&mut self, hold: &Slide) {
        let mut chain = Vec::new();
        for point in &hold.connections {
            match point {
                HoldPoint::Start(p) => {
                    self.ease_overlay(p.beat, p.lane, p.size, p.ease);
                    self.endpoint_overlay(p.beat, p.lane, p.size, p.judge, p.critical, true);
                    chain.push(self.place(p.beat, p.lane, p.size, slide::START));
                }
                HoldPoint::Relay(p) => {
                    // A curved relay needs a tap marker for the directional
                    // overlay to land on.
                    if p.ease != Ease::Linear {
                        self.tap_overlay(p.beat, p.lane, p.size, tap::TAP);
                        self.ease_overlay(p.beat, p.lane, p.size, p.ease);
                    }
                    match p.role {
                        RelayRole::Tick => {
                            let code = if p.critical.is_none() {
                                slide::STEP
                            } else {
                                slide::VISIBLE_STEP
                            };
                            chain.push(self.place(p.beat, p.lane, p.size, code));
                        }
                        RelayRole::Attach => {
                            self.tap_overlay(p.beat, p.lane, p.size, tap::FLICK);
                            chain.push(self.place(p.beat, p.lane, p.size, slide::VISIBLE_STEP));
                        }
                    }
                }
                HoldPoint::End(p) => {
                    // A normal-judged end is only marked when it both flicks
                    // and is critical; plain ends carry no overlay.
                    let mark_normal = p.direction.is_some();
                    self.endpoint_overlay(p.beat, p.lane, p.size, p.judge, p.critical, mark_normal);
                    if let Some(direction) = p.direction {
                        self.direction_overlay(p.beat, p.lane, p.size, direction);
                    }
                    chain.push(self.place(p.beat, p.lane, p.size, slide::END));
                }
            }
        }
        self.raw.slides.push(chain);
    }

    fn lower_guide(&mut self, lifted: &Guide) {
        let yellow = lifted.color == GuideColor::Yellow;
        let mut chain = Vec::new();
        let last = lifted.midpoints.len().saturating_sub(1);
        for (index, point) in lifted.midpoints.iter().enumerate() {
            if index == 0 {
                let code = if yellow { tap::C_ELASER } else { tap::ELASER };
                self.tap_overlay(point.beat, point.lane, point.size, code);
                self.ease_overlay(point.beat, point.lane, point.size, point.ease);
                chain.push(self.place(point.beat, point.lane, point.size, guide::START));
            } else if index == last {
                if yellow {
                    self.tap_overlay(point.beat, point.lane, point.size, tap::C_ELASER);
                }
                chain.push(self.place(point.beat, point.lane, point.size, guide::END));
            } else {
                // Yellow marks every midpoint; green only marks curved ones,
                // since the color is recovered from the head alone.
                if yellow {
                    self.tap_overlay(point.beat, point.lane, point.size, tap::C_ELASER);
                } else if point.ease != Ease::Linear {
                    self.tap_overlay(point.beat, point.lane, point.size, tap::ELASER);
                }
                self.ease_overlay(point.beat, point.lane, point.size, point.ease);
                chain.push(self.place(point.beat, point.lane, point.size, guide::STEP));
            }
        }
        self.raw.guides.push(chain);
    }
}
