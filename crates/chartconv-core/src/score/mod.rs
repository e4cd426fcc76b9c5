//! The shared in-memory chart representation.
//!
//! Every format codec reads and/or produces a [`Score`]: metadata plus a bag
//! of events (tempo changes, speed timelines, taps, holds, guides). Lane and
//! width stay continuous (`f64`, center-zero coordinates) inside the model;
//! discretization only happens at format boundaries.

mod enums;
mod guide;
mod single;
mod slide;
mod timing;

pub use enums::*;
pub use guide::*;
pub use single::*;
pub use slide::*;
pub use timing::*;

use tracing::debug;

/// Default tick resolution of the line-oriented text format.
pub const TICKS_PER_BEAT: u32 = 480;

/// Smallest time increment the overlap resolver moves notes by, in beats.
/// One 1920th-of-a-whole-note tick, rounded to beat precision.
pub const BEAT_PER_TICK: f64 = 0.002083;

/// Bucket width used for overlap lookups, in beats.
pub const BAR_INTERVAL: f64 = 0.5;

/// Offset from the center-zero lane coordinate to the left-edge-1 occupancy
/// grid used when computing collisions.
pub const LANE_OFFSET: i32 = 7;

/// Tempo synthesized when an input document carries none.
pub const DEFAULT_BPM: f64 = 160.0;

/// Beats are kept at micro-beat precision at every format boundary.
pub fn round_beat(beat: f64) -> f64 {
    (beat * 1e6).round() / 1e6
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetaData {
    pub title: String,
    pub artist: String,
    pub designer: String,
    pub wave_offset: f64,
    pub requests: Vec<String>,
}

impl MetaData {
    /// Resolves the tick resolution from `ticks_per_beat` requests,
    /// defaulting to [`TICKS_PER_BEAT`].
    pub fn ticks_per_beat(&self) -> u32 {
        self.requests
            .iter()
            .filter_map(|r| r.strip_prefix("ticks_per_beat"))
            .filter_map(|rest| rest.trim().parse().ok())
            .next()
            .unwrap_or(TICKS_PER_BEAT)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Tempo(Bpm),
    SpeedTimeline(TimeScaleGroup),
    Tap(Single),
    Hold(Slide),
    Guide(Guide),
}

impl Event {
    /// Canonical ordering of event classes in a serialized document.
    fn sort_class(&self) -> u8 {
        match self {
            Event::Tempo(_) => 1,
            Event::SpeedTimeline(_) => 2,
            Event::Tap(_) => 3,
            Event::Hold(_) => 4,
            Event::Guide(_) => 5,
        }
    }
}

/// Root aggregate: metadata plus an unordered bag of events.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Score {
    pub metadata: MetaData,
    pub events: Vec<Event>,
}

impl Score {
    pub fn new(metadata: MetaData) -> Self {
        Self {
            metadata,
            events: Vec::new(),
        }
    }

    pub fn taps(&self) -> impl Iterator<Item = &Single> {
        self.events.iter().filter_map(|e| match e {
            Event::Tap(n) => Some(n),
            _ => None,
        })
    }

    pub fn holds(&self) -> impl Iterator<Item = &Slide> {
        self.events.iter().filter_map(|e| match e {
            Event::Hold(n) => Some(n),
            _ => None,
        })
    }

    pub fn guides(&self) -> impl Iterator<Item = &Guide> {
        self.events.iter().filter_map(|e| match e {
            Event::Guide(n) => Some(n),
            _ => None,
        })
    }

    pub fn tempos(&self) -> impl Iterator<Item = &Bpm> {
        self.events.iter().filter_map(|e| match e {
            Event::Tempo(n) => Some(n),
            _ => None,
        })
    }

    pub fn speed_timelines(&self) -> impl Iterator<Item = &TimeScaleGroup> {
        self.events.iter().filter_map(|e| match e {
            Event::SpeedTimeline(n) => Some(n),
            _ => None,
        })
    }

    /// Stable-sorts events into canonical class order: tempo, speed
    /// timelines, taps, holds, guides.
    pub fn sort_canonical(&mut self) {
        self.events.sort_by_key(Event::sort_class);
    }

    /// Synthesizes the default tempo timeline when the document carries none.
    /// Every exporter calls this before lowering.
    pub fn ensure_tempo(&mut self) {
        if self.tempos().next().is_none() {
            debug!("no tempo timeline found, synthesizing {DEFAULT_BPM} BPM at beat 0");
            self.events.insert(0, Event::Tempo(Bpm::new(0.0, DEFAULT_BPM)));
        }
    }

    /// Synthesizes a single identity speed timeline when the document
    /// carries none, so layer 0 always exists.
    pub fn ensure_speed_timeline(&mut self) {
        if self.speed_timelines().next().is_none() {
            self.events
                .insert(0, Event::SpeedTimeline(TimeScaleGroup::identity()));
        }
    }

    /// Collapses the extended ease curves onto in/out/linear for targets
    /// without them.
    pub fn replace_extended_ease(&mut self) {
        for event in &mut self.events {
            match event {
                Event::Hold(slide) => {
                    for point in &mut slide.connections {
                        match point {
                            HoldPoint::Start(p) => p.ease = p.ease.collapse_extended(),
                            HoldPoint::Relay(p) => p.ease = p.ease.collapse_extended(),
                            HoldPoint::End(_) => {}
                        }
                    }
                }
                Event::Guide(guide) => {
                    for point in &mut guide.midpoints {
                        point.ease = point.ease.collapse_extended();
                    }
                }
                _ => {}
            }
        }
    }

    /// Collapses the extended guide palette onto green/yellow for targets
    /// without it.
    pub fn replace_extended_guide_colors(&mut self) {
        for event in &mut self.events {
            if let Event::Guide(guide) = event {
                guide.color = guide.color.collapse_extended();
            }
        }
    }

    /// Removes fake notes for targets that cannot represent them.
    pub fn delete_fake_notes(&mut self) {
        self.events.retain(|e| match e {
            Event::Tap(n) => !n.fake,
            Event::Hold(n) => !n.fake,
            _ => true,
        });
    }

    /// Removes damage notes for targets that cannot represent them.
    pub fn delete_damage_notes(&mut self) {
        self.events.retain(|e| !matches!(e, Event::Tap(n) if n.is_damage()));
    }

    /// Clamps lanes into the base 12-lane field for targets without lane
    /// extension. Width is preserved; the note slides inward.
    pub fn strip_extended_lanes(&mut self) {
        fn clamp(lane: &mut f64, size: f64) {
            let half = 6.0 - size;
            if half < 0.0 {
                *lane = 0.0;
            } else {
                *lane = lane.clamp(-half, half);
            }
        }
        for event in &mut self.events {
            match event {
                Event::Tap(n) => clamp(&mut n.lane, n.size),
                Event::Hold(slide) => {
                    for point in &mut slide.connections {
                        match point {
                            HoldPoint::Start(p) => clamp(&mut p.lane, p.size),
                            HoldPoint::Relay(p) => clamp(&mut p.lane, p.size),
                            HoldPoint::End(p) => clamp(&mut p.lane, p.size),
                        }
                    }
                }
                Event::Guide(guide) => {
                    for point in &mut guide.midpoints {
                        clamp(&mut point.lane, point.size);
                    }
                }
                _ => {}
            }
        }
    }

    /// For guides that never fade, duplicates the tail one tick early so the
    /// terminal segment renders at full strength on engines that fade the
    /// last segment unconditionally.
    pub fn add_point_without_fade(&mut self) {
        for event in &mut self.events {
            if let Event::Guide(guide) = event {
                if guide.fade != FadeKind::None {
                    continue;
                }
                let Some(tail) = guide.midpoints.last().cloned() else {
                    continue;
                };
                guide.push(GuidePoint {
                    beat: round_beat(tail.beat - BEAT_PER_TICK),
                    ease: Ease::Linear,
                    lane: tail.lane,
                    size: tail.size,
                    time_scale_group: tail.time_scale_group,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slide_with_eases(eases: [Ease; 2]) -> Slide {
        let mut slide = Slide::new(false);
        slide.push(HoldPoint::Start(StartPoint {
            beat: 0.0,
            lane: 0.0,
            size: 1.5,
            critical: false,
            ease: eases[0],
            judge: JudgeKind::Normal,
            time_scale_group: 0,
        }));
        slide.push(HoldPoint::Relay(RelayPoint {
            beat: 1.0,
            lane: 0.0,
            size: 1.5,
            ease: eases[1],
            role: RelayRole::Tick,
            critical: Some(false),
            time_scale_group: 0,
        }));
        slide.push(HoldPoint::End(EndPoint {
            beat: 2.0,
            lane: 0.0,
            size: 1.5,
            critical: false,
            judge: JudgeKind::Normal,
            direction: None,
            time_scale_group: 0,
        }));
        slide
    }

    #[test]
    fn test_ensure_tempo_synthesizes_default() {
        let mut score = Score::default();
        score.ensure_tempo();
        let bpm = score.tempos().next().unwrap();
        assert_eq!(bpm.beat, 0.0);
        assert_eq!(bpm.bpm, DEFAULT_BPM);

        // A second call must not duplicate it.
        score.ensure_tempo();
        assert_eq!(score.tempos().count(), 1);
    }

    #[test]
    fn test_sort_canonical_class_order() {
        let mut score = Score::default();
        score.events.push(Event::Guide(Guide::new(GuideColor::Green, FadeKind::Out)));
        score.events.push(Event::Tap(Single::tap(0.0, 0.0, 1.0)));
        score.events.push(Event::Tempo(Bpm::new(0.0, 120.0)));
        score.sort_canonical();
        assert!(matches!(score.events[0], Event::Tempo(_)));
        assert!(matches!(score.events[1], Event::Tap(_)));
        assert!(matches!(score.events[2], Event::Guide(_)));
    }

    #[test]
    fn test_replace_extended_ease() {
        let mut score = Score::default();
        score.events.push(Event::Hold(slide_with_eases([Ease::InOut, Ease::OutIn])));
        score.replace_extended_ease();
        let slide = score.holds().next().unwrap();
        assert_eq!(slide.connections[0].ease(), Ease::Out);
        assert_eq!(slide.connections[1].ease(), Ease::In);
    }

    #[test]
    fn test_delete_fake_and_damage() {
        let mut score = Score::default();
        let mut fake = Single::tap(0.0, 0.0, 1.0);
        fake.fake = true;
        score.events.push(Event::Tap(fake));
        score.events.push(Event::Tap(Single::damage(1.0, 0.0, 1.0)));
        score.events.push(Event::Tap(Single::tap(2.0, 0.0, 1.0)));

        score.delete_fake_notes();
        assert_eq!(score.taps().count(), 2);
        score.delete_damage_notes();
        assert_eq!(score.taps().count(), 1);
    }

    #[test]
    fn test_strip_extended_lanes_clamps_inward() {
        let mut score = Score::default();
        score.events.push(Event::Tap(Single::tap(0.0, 7.5, 1.0)));
        score.strip_extended_lanes();
        let tap = score.taps().next().unwrap();
        assert_eq!(tap.lane, 5.0);
    }

    #[test]
    fn test_add_point_without_fade() {
        let mut score = Score::default();
        let mut guide = Guide::new(GuideColor::Green, FadeKind::None);
        for beat in [0.0, 4.0] {
            guide.push(GuidePoint {
                beat,
                lane: 0.0,
                size: 1.0,
                ease: Ease::Linear,
                time_scale_group: 0,
            });
        }
        score.events.push(Event::Guide(guide));
        score.add_point_without_fade();
        let guide = score.guides().next().unwrap();
        assert_eq!(guide.midpoints.len(), 3);
        let inserted = &guide.midpoints[1];
        assert!((inserted.beat - (4.0 - BEAT_PER_TICK)).abs() < 1e-9);
    }

    #[test]
    fn test_ticks_per_beat_request() {
        let mut metadata = MetaData::default();
        assert_eq!(metadata.ticks_per_beat(), 480);
        metadata.requests.push("ticks_per_beat 960".to_string());
        assert_eq!(metadata.ticks_per_beat(), 960);
    }
}
