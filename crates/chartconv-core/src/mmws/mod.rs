//! Codec for the versioned binary chart format.
//!
//! Three signatures share one layout, differing only in which fields exist:
//! the base editor format, a fork with extended colors, fades, layers and
//! float lanes, and a further fork adding dummy notes. A capability table
//! derived from the signature and version words gates every optional field,
//! so one reader and one writer cover all revisions.

mod bytes;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::score::{
    Bpm, Direction, Ease, EndPoint, Event, FadeKind, Guide, GuideColor, GuidePoint, HoldPoint,
    JudgeKind, MetaData, RelayPoint, RelayRole, Score, Single, Slide, StartPoint, TICKS_PER_BEAT,
    TimeScaleGroup, TimeScalePoint, round_beat,
};

use bytes::{ByteReader, ByteWriter};

const NOTE_CRITICAL: u32 = 1;
const NOTE_FRICTION: u32 = 1 << 1;
const NOTE_DUMMY: u32 = 1 << 2;

const HOLD_START_HIDDEN: u32 = 1;
const HOLD_END_HIDDEN: u32 = 1 << 1;
const HOLD_GUIDE: u32 = 1 << 2;
const HOLD_FAKE: u32 = 1 << 3;

/// Which dialect of the binary format to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// The base editor format, signature `MMWS`.
    Base,
    /// The extended fork, signature `CCMMWS`.
    ChartCyanvas,
    /// The further fork with dummy notes, signature `UCMMWS`.
    UntitledChart,
}

impl Flavor {
    pub fn signature(&self) -> &'static str {
        match self {
            Self::Base => "MMWS",
            Self::ChartCyanvas => "CCMMWS",
            Self::UntitledChart => "UCMMWS",
        }
    }

    fn capabilities(&self) -> Capabilities {
        match self {
            Self::Base => Capabilities::new(0, 0, 4),
            Self::ChartCyanvas => Capabilities::new(0, 6, 4),
            Self::UntitledChart => Capabilities::new(1, 6, 4),
        }
    }
}

/// Fields present in a given revision. Base version gates the old fields,
/// fork version the extended ones.
struct Capabilities {
    skill_fever: bool,
    jacket: bool,
    address: bool,
    hispeed: bool,
    guide_note: bool,
    damage_note: bool,
    lane_extension: bool,
    fade_type: bool,
    guide_color: bool,
    layers: bool,
    waypoints: bool,
    float_lane_width: bool,
    dummy_note: bool,
    /// Version word as serialized after the signature.
    value: u32,
}

impl Capabilities {
    fn new(uc: u16, cc: u16, base: u16) -> Self {
        Self {
            skill_fever: base >= 2,
            jacket: base >= 2,
            address: base >= 3,
            hispeed: base >= 3,
            guide_note: base >= 4,
            damage_note: cc >= 1,
            lane_extension: cc >= 1,
            fade_type: cc >= 2,
            guide_color: cc >= 3,
            layers: cc >= 4,
            waypoints: cc >= 5,
            float_lane_width: cc >= 6,
            dummy_note: cc >= 6 && uc >= 1,
            value: if uc > 0 {
                u32::from(uc)
            } else if cc > 0 {
                u32::from(base) | u32::from(cc) << 16
            } else {
                u32::from(base)
            },
        }
    }
}

fn tick_to_beat(tick: u32) -> f64 {
    round_beat(f64::from(tick) / f64::from(TICKS_PER_BEAT))
}

fn beat_to_tick(beat: f64) -> u32 {
    (beat * f64::from(TICKS_PER_BEAT)).round().max(0.0) as u32
}

fn ease_code(ease: Ease) -> u32 {
    match ease {
        Ease::Linear => 0,
        Ease::In => 1,
        Ease::Out => 2,
        Ease::InOut => 3,
        Ease::OutIn => 4,
    }
}

fn ease_from_code(code: u32) -> Result<Ease> {
    match code {
        0 => Ok(Ease::Linear),
        1 => Ok(Ease::In),
        2 => Ok(Ease::Out),
        3 => Ok(Ease::InOut),
        4 => Ok(Ease::OutIn),
        _ => Err(Error::InvalidChart(format!("unknown ease code {code}"))),
    }
}

fn flick_code(direction: Option<Direction>) -> u32 {
    match direction {
        None => 0,
        Some(Direction::Up) => 1,
        Some(Direction::Left) => 2,
        Some(Direction::Right) => 3,
    }
}

fn flick_from_code(code: u32) -> Result<Option<Direction>> {
    match code {
        0 => Ok(None),
        1 => Ok(Some(Direction::Up)),
        2 => Ok(Some(Direction::Left)),
        3 => Ok(Some(Direction::Right)),
        _ => Err(Error::InvalidChart(format!("unknown flick code {code}"))),
    }
}

/// Where in a record a point sits; gates the flick, step, and ease fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PointKind {
    Tap,
    Start,
    Mid,
    End,
}

/// One point as laid out on the wire, before lifting into the model.
#[derive(Debug, Clone, Default)]
struct WirePoint {
    beat: f64,
    lane: f64,
    size: f64,
    layer: u32,
    direction: Option<Direction>,
    critical: bool,
    trace: bool,
    fake: bool,
    step: u32,
    ease: Ease,
}

impl WirePoint {
    fn judge(&self, hidden: bool) -> JudgeKind {
        if self.trace {
            JudgeKind::Trace
        } else if hidden {
            JudgeKind::None
        } else {
            JudgeKind::Normal
        }
    }
}

fn read_point(r: &mut ByteReader, caps: &Capabilities, kind: PointKind) -> Result<WirePoint> {
    let tick = r.read_u32()?;
    let (lane, width) = if caps.float_lane_width {
        (f64::from(r.read_f32()?), f64::from(r.read_f32()?))
    } else {
        (f64::from(r.read_i32()?), f64::from(r.read_i32()?))
    };
    let layer = if caps.layers { r.read_u32()? } else { 0 };
    let direction = if matches!(kind, PointKind::Tap | PointKind::End) {
        flick_from_code(r.read_u32()?)?
    } else {
        None
    };
    let flag = r.read_u32()?;
    let step = if kind == PointKind::Mid { r.read_u32()? } else { 0 };
    let ease = if matches!(kind, PointKind::Start | PointKind::Mid) {
        ease_from_code(r.read_u32()?)?
    } else {
        Ease::Linear
    };
    Ok(WirePoint {
        beat: tick_to_beat(tick),
        lane: lane - 6.0 + width / 2.0,
        size: width / 2.0,
        layer,
        direction,
        critical: flag & NOTE_CRITICAL != 0,
        trace: flag & NOTE_FRICTION != 0,
        fake: caps.dummy_note && flag & NOTE_DUMMY != 0,
        step,
        ease,
    })
}

fn write_point(w: &mut ByteWriter, caps: &Capabilities, kind: PointKind, p: &WirePoint) {
    w.write_u32(beat_to_tick(p.beat));
    if caps.float_lane_width {
        w.write_f32((p.lane + 6.0 - p.size) as f32);
        w.write_f32((p.size * 2.0) as f32);
    } else {
        w.write_i32((p.lane + 6.0 - p.size).round() as i32);
        w.write_i32((p.size * 2.0).round() as i32);
    }
    if caps.layers {
        w.write_u32(p.layer);
    }
    if matches!(kind, PointKind::Tap | PointKind::End) {
        w.write_u32(flick_code(p.direction));
    }
    let mut flag = 0;
    if p.critical {
        flag |= NOTE_CRITICAL;
    }
    if p.trace {
        flag |= NOTE_FRICTION;
    }
    if p.fake {
        flag |= NOTE_DUMMY;
    }
    w.write_u32(flag);
    if kind == PointKind::Mid {
        w.write_u32(p.step);
    }
    if matches!(kind, PointKind::Start | PointKind::Mid) {
        w.write_u32(ease_code(p.ease));
    }
}

struct Addresses {
    metadata: usize,
    events: usize,
    taps: usize,
    holds: usize,
    damages: Option<usize>,
    layers: Option<usize>,
}

pub fn load(bytes: &[u8]) -> Result<Score> {
    let mut r = ByteReader::new(bytes);
    let signature = r.read_cstr()?;
    let caps = match signature.as_str() {
        "MMWS" => Capabilities::new(0, 0, r.read_u32()? as u16),
        "CCMMWS" => {
            let base = r.read_u16()?;
            let cc = r.read_u16()?;
            Capabilities::new(0, cc, base)
        }
        "UCMMWS" => Capabilities::new(r.read_u32()? as u16, 6, 4),
        _ => {
            return Err(Error::InvalidChart(format!(
                "unrecognized signature {signature:?}"
            )));
        }
    };
    debug!(signature, version = caps.value, "loading binary chart");

    let addresses = if caps.address {
        let metadata = r.read_u32()? as usize;
        let events = r.read_u32()? as usize;
        let taps = r.read_u32()? as usize;
        let holds = r.read_u32()? as usize;
        let damages = if caps.damage_note {
            Some(r.read_u32()? as usize)
        } else {
            None
        };
        let layers = if caps.layers {
            Some(r.read_u32()? as usize)
        } else {
            None
        };
        if caps.waypoints {
            r.read_u32()?;
        }
        Some(Addresses {
            metadata,
            events,
            taps,
            holds,
            damages,
            layers,
        })
    } else {
        None
    };

    if let Some(a) = &addresses {
        r.set_position(a.metadata)?;
    }
    let title = r.read_cstr()?;
    let designer = r.read_cstr()?;
    let artist = r.read_cstr()?;
    let _music_file = r.read_cstr()?;
    let wave_offset = f64::from(r.read_f32()?) / -1000.0;
    let metadata = MetaData {
        title,
        artist,
        designer,
        wave_offset,
        requests: Vec::new(),
    };

    // Speed-timeline layer count lives at the end of the document; it must
    // be known before the change points are read.
    let mut groups = vec![TimeScaleGroup::default()];
    if let Some(layers_at) = addresses.as_ref().and_then(|a| a.layers) {
        r.set_position(layers_at)?;
        let count = r.read_u32()? as usize;
        groups = vec![TimeScaleGroup::default(); count.max(1)];
    }

    if let Some(a) = &addresses {
        r.set_position(a.events)?;
    }
    let tempos = read_events(&mut r, &caps, &mut groups)?;

    if let Some(a) = &addresses {
        r.set_position(a.taps)?;
    }
    let mut taps = read_taps(&mut r, &caps, false)?;

    if let Some(a) = &addresses {
        r.set_position(a.holds)?;
    }
    let holds = read_holds(&mut r, &caps)?;

    if let Some(damages_at) = addresses.as_ref().and_then(|a| a.damages) {
        r.set_position(damages_at)?;
        taps.extend(read_taps(&mut r, &caps, true)?);
    }

    let mut score = Score::new(metadata);
    for mut group in groups {
        group.sort_changes();
        score.events.push(Event::SpeedTimeline(group));
    }
    score.events.extend(tempos.into_iter().map(Event::Tempo));
    score.events.extend(taps.into_iter().map(Event::Tap));
    score.events.extend(holds);
    score.ensure_tempo();
    score.sort_canonical();
    Ok(score)
}

fn read_events(
    r: &mut ByteReader,
    caps: &Capabilities,
    groups: &mut [TimeScaleGroup],
) -> Result<Vec<Bpm>> {
    let time_signature_count = r.read_u32()? as usize;
    r.skip(time_signature_count * 12)?;

    let tempo_count = r.read_u32()? as usize;
    let mut tempos = Vec::with_capacity(tempo_count);
    for _ in 0..tempo_count {
        let tick = r.read_u32()?;
        let bpm = f64::from(r.read_f32()?);
        tempos.push(Bpm::new(tick_to_beat(tick), bpm));
    }

    if caps.hispeed {
        let change_count = r.read_u32()? as usize;
        for _ in 0..change_count {
            let tick = r.read_u32()?;
            let scale = f64::from(r.read_f32()?);
            let layer = if caps.layers { r.read_u32()? as usize } else { 0 };
            let group = if layer < groups.len() {
                &mut groups[layer]
            } else {
                warn!(layer, "speed change references a missing layer, using 0");
                &mut groups[0]
            };
            group.push(TimeScalePoint {
                beat: tick_to_beat(tick),
                time_scale: scale,
            });
        }
    }

    if caps.skill_fever {
        // Skill and fever markers have no model counterpart.
        let skill_count = r.read_u32()? as usize;
        r.skip(skill_count * 4)?;
        let _fever_chance = r.read_i32()?;
        let _fever_start = r.read_i32()?;
    }
    Ok(tempos)
}

fn read_taps(r: &mut ByteReader, caps: &Capabilities, damage: bool) -> Result<Vec<Single>> {
    let count = r.read_u32()? as usize;
    let mut notes = Vec::with_capacity(count);
    for _ in 0..count {
        let p = read_point(r, caps, PointKind::Tap)?;
        let mut single = if damage {
            Single::damage(p.beat, p.lane, p.size)
        } else {
            Single::tap(p.beat, p.lane, p.size)
        };
        single.critical = p.critical;
        single.trace = p.trace;
        single.direction = p.direction;
        single.fake = p.fake;
        single.time_scale_group = p.layer;
        notes.push(single);
    }
    Ok(notes)
}

fn read_holds(r: &mut ByteReader, caps: &Capabilities) -> Result<Vec<Event>> {
    let count = r.read_u32()? as usize;
    let mut holds = Vec::with_capacity(count);
    for _ in 0..count {
        let flag = if caps.guide_note { r.read_u32()? } else { 0 };
        let start = read_point(r, caps, PointKind::Start)?;
        let fade = if caps.fade_type { r.read_u32()? } else { 0 };
        let color = if caps.guide_color {
            r.read_u32()?
        } else if start.critical {
            GuideColor::Yellow.wire_value() as u32
        } else {
            GuideColor::Green.wire_value() as u32
        };
        let step_count = r.read_u32()? as usize;

        if flag & HOLD_GUIDE != 0 {
            let color = GuideColor::from_wire_value(i64::from(color))
                .ok_or_else(|| Error::InvalidChart(format!("unknown guide color {color}")))?;
            let fade = FadeKind::from_wire_value(i64::from(fade))
                .ok_or_else(|| Error::InvalidChart(format!("unknown fade type {fade}")))?;
            let mut guide = Guide::new(color, fade);
            guide.push(guide_point(&start, start.ease));
            for _ in 0..step_count {
                let p = read_point(r, caps, PointKind::Mid)?;
                guide.push(guide_point(&p, p.ease));
            }
            let end = read_point(r, caps, PointKind::End)?;
            guide.push(guide_point(&end, Ease::Linear));
            holds.push(Event::Guide(guide));
        } else {
            let mut slide = Slide::new(start.critical);
            slide.fake = flag & HOLD_FAKE != 0;
            slide.push(HoldPoint::Start(StartPoint {
                beat: start.beat,
                lane: start.lane,
                size: start.size,
                critical: start.critical,
                ease: start.ease,
                judge: start.judge(flag & HOLD_START_HIDDEN != 0),
                time_scale_group: start.layer,
            }));
            for _ in 0..step_count {
                let p = read_point(r, caps, PointKind::Mid)?;
                slide.push(HoldPoint::Relay(RelayPoint {
                    beat: p.beat,
                    lane: p.lane,
                    size: p.size,
                    ease: p.ease,
                    role: if p.step == 2 {
                        RelayRole::Attach
                    } else {
                        RelayRole::Tick
                    },
                    critical: if p.step == 1 { None } else { Some(p.critical) },
                    time_scale_group: p.layer,
                }));
            }
            let end = read_point(r, caps, PointKind::End)?;
            slide.push(HoldPoint::End(EndPoint {
                beat: end.beat,
                lane: end.lane,
                size: end.size,
                critical: end.critical,
                judge: end.judge(flag & HOLD_END_HIDDEN != 0),
                direction: end.direction,
                time_scale_group: end.layer,
            }));
            holds.push(Event::Hold(slide));
        }
    }
    Ok(holds)
}

fn guide_point(p: &WirePoint, ease: Ease) -> GuidePoint {
    GuidePoint {
        beat: p.beat,
        lane: p.lane,
        size: p.size,
        ease,
        time_scale_group: p.layer,
    }
}

/// Lowers a chart to the binary format. Each flavor first drops what it
/// cannot represent: the base format loses extended eases, colors, lanes,
/// fake and damage notes; the middle fork loses fake notes only.
pub fn export(score: &Score, flavor: Flavor) -> Result<Vec<u8>> {
    let mut score = score.clone();
    match flavor {
        Flavor::Base => {
            score.replace_extended_ease();
            score.replace_extended_guide_colors();
            score.delete_fake_notes();
            score.delete_damage_notes();
            score.strip_extended_lanes();
        }
        Flavor::ChartCyanvas => score.delete_fake_notes(),
        Flavor::UntitledChart => {}
    }
    score.ensure_tempo();
    score.ensure_speed_timeline();
    score.sort_canonical();

    let caps = flavor.capabilities();
    let mut w = ByteWriter::new();
    w.write_cstr(flavor.signature())?;
    w.write_u32(caps.value);

    let table_offset = w.position();
    if caps.address {
        let slots = 4
            + usize::from(caps.damage_note)
            + usize::from(caps.layers)
            + usize::from(caps.waypoints);
        w.fill_zero(4 * slots);
    }
    let mut addresses = Vec::new();

    addresses.push(w.position());
    write_metadata(&mut w, &caps, &score)?;

    addresses.push(w.position());
    write_events(&mut w, &caps, &score);

    addresses.push(w.position());
    write_taps(&mut w, &caps, &score, false);

    addresses.push(w.position());
    write_holds(&mut w, &caps, &score);

    if caps.damage_note {
        addresses.push(w.position());
        write_taps(&mut w, &caps, &score, true);
    }

    if caps.layers {
        addresses.push(w.position());
        let layers = score.speed_timelines().count();
        w.write_u32(layers as u32);
        for i in 0..layers {
            w.write_cstr(&format!("#{}", i + 1))?;
        }
    }

    if caps.waypoints {
        addresses.push(w.position());
        w.write_u32(0);
    }

    if caps.address {
        for (slot, address) in addresses.iter().enumerate() {
            w.patch_u32(table_offset + 4 * slot, *address as u32)?;
        }
    }
    Ok(w.into_inner())
}

/// Greatest distance any point reaches beyond the base 12-lane field.
fn lane_extension(score: &Score) -> u32 {
    fn offset(lane: f64, size: f64) -> f64 {
        let reach = if lane > 0.0 { lane + size } else { size - lane };
        (reach - 6.0).max(0.0)
    }
    let mut max = 0.0f64;
    for event in &score.events {
        match event {
            Event::Tap(n) => max = max.max(offset(n.lane, n.size)),
            Event::Hold(slide) => {
                for p in &slide.connections {
                    max = max.max(offset(p.lane(), p.size()));
                }
            }
            Event::Guide(guide) => {
                for p in &guide.midpoints {
                    max = max.max(offset(p.lane, p.size));
                }
            }
            _ => {}
        }
    }
    max.ceil() as u32
}

fn write_metadata(w: &mut ByteWriter, caps: &Capabilities, score: &Score) -> Result<()> {
    w.write_cstr(&score.metadata.title)?;
    w.write_cstr(&score.metadata.designer)?;
    w.write_cstr(&score.metadata.artist)?;
    w.write_cstr("")?; // music file
    w.write_f32((score.metadata.wave_offset * -1000.0) as f32);
    if caps.jacket {
        w.write_cstr("")?; // jacket file
    }
    if caps.lane_extension {
        w.write_u32(lane_extension(score));
    }
    Ok(())
}

fn write_events(w: &mut ByteWriter, caps: &Capabilities, score: &Score) {
    w.write_u32(0); // time signatures

    let tempos: Vec<&Bpm> = score.tempos().collect();
    w.write_u32(tempos.len() as u32);
    for tempo in tempos {
        w.write_u32(beat_to_tick(tempo.beat));
        w.write_f32(tempo.bpm as f32);
    }

    if caps.hispeed {
        let groups: Vec<&TimeScaleGroup> = score.speed_timelines().collect();
        if caps.layers {
            let total: usize = groups.iter().map(|g| g.changes.len()).sum();
            w.write_u32(total as u32);
            for (layer, group) in groups.iter().enumerate() {
                for change in &group.changes {
                    w.write_u32(beat_to_tick(change.beat));
                    w.write_f32(change.time_scale as f32);
                    w.write_u32(layer as u32);
                }
            }
        } else {
            let changes = groups.first().map(|g| g.changes.as_slice()).unwrap_or(&[]);
            w.write_u32(changes.len() as u32);
            for change in changes {
                w.write_u32(beat_to_tick(change.beat));
                w.write_f32(change.time_scale as f32);
            }
        }
    }

    if caps.skill_fever {
        w.write_u32(0); // skills
        w.write_i32(-1); // fever chance tick
        w.write_i32(-1); // fever start tick
    }
}

fn write_taps(w: &mut ByteWriter, caps: &Capabilities, score: &Score, damage: bool) {
    let notes: Vec<&Single> = score.taps().filter(|n| n.is_damage() == damage).collect();
    w.write_u32(notes.len() as u32);
    for note in notes {
        let p = WirePoint {
            beat: note.beat,
            lane: note.lane,
            size: note.size,
            layer: note.time_scale_group,
            direction: note.direction,
            critical: note.critical,
            trace: note.trace,
            fake: note.fake,
            ..WirePoint::default()
        };
        write_point(w, caps, PointKind::Tap, &p);
    }
}

fn write_holds(w: &mut ByteWriter, caps: &Capabilities, score: &Score) {
    let slides: Vec<&Slide> = score.holds().collect();
    let guides: Vec<&Guide> = score.guides().filter(|g| g.midpoints.len() >= 2).collect();
    w.write_u32((slides.len() + guides.len()) as u32);

    for slide in slides {
        let mut flag = 0;
        if slide.start().is_some_and(|s| s.judge == JudgeKind::None) {
            flag |= HOLD_START_HIDDEN;
        }
        if slide.end().is_some_and(|e| e.judge == JudgeKind::None) {
            flag |= HOLD_END_HIDDEN;
        }
        if slide.fake {
            flag |= HOLD_FAKE;
        }
        if caps.guide_note {
            w.write_u32(flag);
        }

        let mids: Vec<&RelayPoint> = slide
            .connections
            .iter()
            .filter_map(|p| match p {
                HoldPoint::Relay(p) => Some(p),
                _ => None,
            })
            .collect();

        if let Some(start) = slide.start() {
            let p = WirePoint {
                beat: start.beat,
                lane: start.lane,
                size: start.size,
                layer: start.time_scale_group,
                critical: start.critical,
                trace: start.judge == JudgeKind::Trace,
                ease: start.ease,
                ..WirePoint::default()
            };
            write_point(w, caps, PointKind::Start, &p);
        }

        if caps.fade_type {
            w.write_u32(FadeKind::Out.wire_value() as u32);
        }
        if caps.guide_color {
            w.write_u32(GuideColor::Green.wire_value() as u32);
        }

        w.write_u32(mids.len() as u32);
        for mid in mids {
            let p = WirePoint {
                beat: mid.beat,
                lane: mid.lane,
                size: mid.size,
                layer: mid.time_scale_group,
                critical: mid.critical.unwrap_or(false) || slide.critical,
                step: match (mid.role, mid.critical) {
                    (RelayRole::Attach, _) => 2,
                    (RelayRole::Tick, None) => 1,
                    (RelayRole::Tick, Some(_)) => 0,
                },
                ease: mid.ease,
                ..WirePoint::default()
            };
            write_point(w, caps, PointKind::Mid, &p);
        }

        if let Some(end) = slide.end() {
            let p = WirePoint {
                beat: end.beat,
                lane: end.lane,
                size: end.size,
                layer: end.time_scale_group,
                direction: end.direction,
                critical: end.critical,
                trace: end.judge == JudgeKind::Trace,
                ..WirePoint::default()
            };
            write_point(w, caps, PointKind::End, &p);
        }
    }

    for guide in guides {
        if caps.guide_note {
            w.write_u32(HOLD_GUIDE);
        }
        let head = &guide.midpoints[0];
        let tail = &guide.midpoints[guide.midpoints.len() - 1];
        let mids = &guide.midpoints[1..guide.midpoints.len() - 1];

        let p = WirePoint {
            beat: head.beat,
            lane: head.lane,
            size: head.size,
            layer: head.time_scale_group,
            ease: head.ease,
            ..WirePoint::default()
        };
        write_point(w, caps, PointKind::Start, &p);

        if caps.fade_type {
            w.write_u32(guide.fade.wire_value() as u32);
        }
        if caps.guide_color {
            w.write_u32(guide.color.wire_value() as u32);
        }

        w.write_u32(mids.len() as u32);
        for mid in mids {
            let p = WirePoint {
                beat: mid.beat,
                lane: mid.lane,
                size: mid.size,
                layer: mid.time_scale_group,
                ease: mid.ease,
                ..WirePoint::default()
            };
            write_point(w, caps, PointKind::Mid, &p);
        }

        let p = WirePoint {
            beat: tail.beat,
            lane: tail.lane,
            size: tail.size,
            layer: tail.time_scale_group,
            ..WirePoint::default()
        };
        write_point(w, caps, PointKind::End, &p);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_score() -> Score {
        let mut score = Score::default();
        score.metadata.title = "song".to_string();
        score.metadata.artist = "artist".to_string();
        score.metadata.designer = "mapper".to_string();
        score.metadata.wave_offset = 0.25;

        score.events.push(Event::Tempo(Bpm::new(0.0, 120.0)));

        let mut layer0 = TimeScaleGroup::identity();
        layer0.push(TimeScalePoint {
            beat: 2.0,
            time_scale: 0.5,
        });
        score.events.push(Event::SpeedTimeline(layer0));
        score
            .events
            .push(Event::SpeedTimeline(TimeScaleGroup::identity()));

        let mut flick = Single::tap(1.0, -2.0, 1.5);
        flick.critical = true;
        flick.direction = Some(Direction::Left);
        flick.time_scale_group = 1;
        score.events.push(Event::Tap(flick));
        score.events.push(Event::Tap(Single::damage(2.0, 3.0, 1.0)));

        let mut slide = Slide::new(true);
        slide.push(HoldPoint::Start(StartPoint {
            beat: 0.5,
            lane: 0.0,
            size: 2.0,
            critical: true,
            ease: Ease::OutIn,
            judge: JudgeKind::None,
            time_scale_group: 0,
        }));
        slide.push(HoldPoint::Relay(RelayPoint {
            beat: 1.0,
            lane: 1.0,
            size: 2.0,
            ease: Ease::In,
            role: RelayRole::Tick,
            critical: None,
            time_scale_group: 0,
        }));
        slide.push(HoldPoint::Relay(RelayPoint {
            beat: 1.5,
            lane: 1.0,
            size: 2.0,
            ease: Ease::Linear,
            role: RelayRole::Attach,
            critical: Some(true),
            time_scale_group: 0,
        }));
        slide.push(HoldPoint::End(EndPoint {
            beat: 2.0,
            lane: 2.0,
            size: 2.0,
            critical: true,
            judge: JudgeKind::Normal,
            direction: Some(Direction::Up),
            time_scale_group: 0,
        }));
        score.events.push(Event::Hold(slide));

        let mut guide = Guide::new(GuideColor::Purple, FadeKind::In);
        for (beat, ease) in [(0.0, Ease::Out), (1.0, Ease::In), (2.0, Ease::Linear)] {
            guide.push(GuidePoint {
                beat,
                lane: -3.0,
                size: 1.5,
                ease,
                time_scale_group: 1,
            });
        }
        score.events.push(Event::Guide(guide));
        score.sort_canonical();
        score
    }

    #[test]
    fn test_full_round_trip_extended_flavor() {
        let score = full_score();
        let bytes = export(&score, Flavor::UntitledChart).unwrap();
        let reloaded = load(&bytes).unwrap();
        assert_eq!(reloaded.metadata.title, "song");
        assert_eq!(reloaded.metadata.wave_offset, 0.25);
        assert_eq!(reloaded.events, score.events);
    }

    #[test]
    fn test_base_flavor_drops_extended_features() {
        let score = full_score();
        let bytes = export(&score, Flavor::Base).unwrap();
        let reloaded = load(&bytes).unwrap();

        // Damage notes cannot be expressed; extended colors collapse.
        assert!(reloaded.taps().all(|n| !n.is_damage()));
        assert!(
            reloaded
                .guides()
                .all(|g| matches!(g.color, GuideColor::Green | GuideColor::Yellow))
        );
        // Extended eases collapse onto in/out.
        let start = reloaded.holds().next().unwrap().start().unwrap();
        assert_eq!(start.ease, Ease::In);
    }

    #[test]
    fn test_base_flavor_keeps_single_speed_layer() {
        let score = full_score();
        let bytes = export(&score, Flavor::Base).unwrap();
        let reloaded = load(&bytes).unwrap();
        assert_eq!(reloaded.speed_timelines().count(), 1);
        let layer = reloaded.speed_timelines().next().unwrap();
        assert_eq!(layer.changes.len(), 2);
    }

    #[test]
    fn test_unknown_signature_rejected() {
        let mut w = ByteWriter::new();
        w.write_cstr("XXWS").unwrap();
        w.write_u32(4);
        assert!(matches!(
            load(&w.into_inner()),
            Err(Error::InvalidChart(_))
        ));
    }

    #[test]
    fn test_truncated_document_rejected() {
        let score = full_score();
        let bytes = export(&score, Flavor::UntitledChart).unwrap();
        assert!(load(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn test_export_synthesizes_tempo() {
        let bytes = export(&Score::default(), Flavor::UntitledChart).unwrap();
        let reloaded = load(&bytes).unwrap();
        let bpm = reloaded.tempos().next().unwrap();
        assert_eq!(bpm.bpm, 160.0);
    }
}
