//! Cross-format conversion and overlap-resolution pipelines.
//!
//! A score authored once is pushed through each codec pair the way the
//! command-line tool chains them: detect, load, resolve where the target
//! discretizes, export.

use chartconv_core::score::{
    Bpm, Ease, EndPoint, Event, FadeKind, Guide, GuideColor, GuidePoint, HoldPoint, JudgeKind,
    MetaData, RelayPoint, RelayRole, Score, Single, Slide, StartPoint,
};
use chartconv_core::{
    Flavor, Format, ResolvePolicy, detect, level_data, mmws, resolve_overlaps, sus, usc,
};

/// A tick-aligned score with integral lanes, safe for every codec.
fn portable_score() -> Score {
    let mut score = Score::new(MetaData {
        title: "Portable".into(),
        artist: "Nobody".into(),
        designer: "Tester".into(),
        ..MetaData::default()
    });
    score.events.push(Event::Tempo(Bpm::new(0.0, 150.0)));
    score.events.push(Event::Tap(Single::tap(1.0, -2.0, 1.0)));
    score.events.push(Event::Tap(Single {
        critical: true,
        ..Single::tap(1.5, 3.0, 1.0)
    }));

    let mut slide = Slide::new(false);
    slide.push(HoldPoint::Start(StartPoint {
        beat: 2.0,
        lane: 0.0,
        size: 1.0,
        critical: false,
        ease: Ease::Out,
        judge: JudgeKind::Normal,
        time_scale_group: 0,
    }));
    slide.push(HoldPoint::Relay(RelayPoint {
        beat: 3.0,
        lane: 1.0,
        size: 1.0,
        ease: Ease::Linear,
        role: RelayRole::Tick,
        critical: Some(false),
        time_scale_group: 0,
    }));
    slide.push(HoldPoint::End(EndPoint {
        beat: 4.0,
        lane: 2.0,
        size: 1.0,
        critical: false,
        judge: JudgeKind::Normal,
        direction: None,
        time_scale_group: 0,
    }));
    score.events.push(Event::Hold(slide));

    let mut guide = Guide::new(GuideColor::Green, FadeKind::Out);
    guide.push(GuidePoint {
        beat: 5.0,
        lane: -3.0,
        size: 1.0,
        ease: Ease::Linear,
        time_scale_group: 0,
    });
    guide.push(GuidePoint {
        beat: 6.0,
        lane: 3.0,
        size: 1.0,
        ease: Ease::Linear,
        time_scale_group: 0,
    });
    score.events.push(Event::Guide(guide));

    score
}

mod detection {
    use super::*;

    #[test]
    fn test_detects_every_exported_format() {
        let score = portable_score();

        let text = sus::export(&score).unwrap();
        assert_eq!(detect(text.as_bytes()).unwrap(), Format::Sus);

        let json = usc::export(&score).unwrap();
        assert_eq!(detect(&json).unwrap(), Format::Usc);

        for compress in [false, true] {
            let bytes =
                level_data::export(&score, &level_data::WriteOptions { compress }).unwrap();
            assert_eq!(
                detect(&bytes).unwrap(),
                Format::LevelData {
                    compressed: compress,
                    extended: true,
                }
            );
        }

        for flavor in [Flavor::Base, Flavor::ChartCyanvas, Flavor::UntitledChart] {
            let bytes = mmws::export(&score, flavor).unwrap();
            assert_eq!(detect(&bytes).unwrap(), Format::Mmws(flavor));
        }
    }
}

mod round_trips {
    use super::*;

    #[test]
    fn test_text_to_json_to_text_preserves_notes() {
        let mut score = portable_score();
        score.sort_canonical();

        let text = sus::export(&score).unwrap();
        let from_text = sus::load(text.as_bytes()).unwrap();

        let json = usc::export(&from_text).unwrap();
        let mut from_json = usc::load(&json).unwrap();
        from_json.sort_canonical();

        assert_eq!(from_json.taps().count(), score.taps().count());
        assert_eq!(from_json.holds().count(), 1);
        assert_eq!(from_json.guides().count(), 1);

        let taps: Vec<(f64, f64)> = from_json.taps().map(|t| (t.beat, t.lane)).collect();
        assert_eq!(taps, vec![(1.0, -2.0), (1.5, 3.0)]);
        assert!(from_json.taps().any(|t| t.critical));

        let hold = from_json.holds().next().unwrap();
        assert_eq!(hold.start().unwrap().ease, Ease::Out);
        assert_eq!(hold.end().unwrap().beat, 4.0);
    }

    #[test]
    fn test_json_to_document_to_json() {
        let mut score = portable_score();
        // The document always carries at least the identity timeline.
        score.ensure_speed_timeline();
        score.sort_canonical();

        let json = usc::export(&score).unwrap();
        let loaded = usc::load(&json).unwrap();
        let doc = level_data::export(&loaded, &level_data::WriteOptions::default()).unwrap();
        let mut back = level_data::load(&doc).unwrap();
        back.sort_canonical();

        assert_eq!(back.events, score.events);
    }

    #[test]
    fn test_binary_flavor_preserves_portable_score() {
        let mut score = portable_score();
        score.ensure_speed_timeline();
        score.sort_canonical();

        let bytes = mmws::export(&score, Flavor::ChartCyanvas).unwrap();
        let mut back = mmws::load(&bytes).unwrap();
        back.sort_canonical();

        assert_eq!(back.events, score.events);
    }
}

mod tempo_synthesis {
    use super::*;

    #[test]
    fn test_tempo_less_score_exports_with_default_tempo() {
        let mut score = Score::default();
        score.events.push(Event::Tap(Single::tap(1.0, 0.0, 2.0)));

        let text = sus::export(&score).unwrap();
        let restored = sus::load(text.as_bytes()).unwrap();
        let tempos: Vec<f64> = restored.tempos().map(|t| t.bpm).collect();
        assert_eq!(tempos, vec![160.0]);

        let json = usc::export(&score).unwrap();
        let restored = usc::load(&json).unwrap();
        assert!(restored.tempos().any(|t| t.beat == 0.0 && t.bpm == 160.0));
    }
}

mod resolution {
    use super::*;

    fn stacked_score() -> Score {
        let mut score = Score::default();
        score.events.push(Event::Tempo(Bpm::new(0.0, 160.0)));
        // Three taps declared on the same cell.
        for _ in 0..3 {
            score.events.push(Event::Tap(Single::tap(1.0, 0.0, 2.0)));
        }
        // A hold relay on the same cell as one more tap.
        let mut slide = Slide::new(false);
        slide.push(HoldPoint::Start(StartPoint {
            beat: 0.0,
            lane: 0.0,
            size: 2.0,
            critical: false,
            ease: Ease::Linear,
            judge: JudgeKind::Normal,
            time_scale_group: 0,
        }));
        slide.push(HoldPoint::Relay(RelayPoint {
            beat: 2.0,
            lane: 0.0,
            size: 2.0,
            ease: Ease::Linear,
            role: RelayRole::Tick,
            critical: Some(false),
            time_scale_group: 0,
        }));
        slide.push(HoldPoint::End(EndPoint {
            beat: 3.0,
            lane: 0.0,
            size: 2.0,
            critical: false,
            judge: JudgeKind::Normal,
            direction: None,
            time_scale_group: 0,
        }));
        score.events.push(Event::Hold(slide));
        score.events.push(Event::Tap(Single::tap(2.0, 0.0, 2.0)));
        score
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let policy = ResolvePolicy::default();
        let mut once = stacked_score();
        resolve_overlaps(&mut once, &policy).unwrap();
        let mut twice = once.clone();
        resolve_overlaps(&mut twice, &policy).unwrap();
        assert_eq!(twice, once);
    }

    #[test]
    fn test_stacked_taps_survive_discretizing_export() {
        let policy = ResolvePolicy::default();
        let mut score = stacked_score();
        resolve_overlaps(&mut score, &policy).unwrap();

        let text = sus::export(&score).unwrap();
        let restored = sus::load(text.as_bytes()).unwrap();
        assert_eq!(restored.taps().count(), score.taps().count());

        // Every (beat, lane) cell is now unique across judged points.
        let mut cells: Vec<(i64, i64)> = restored
            .taps()
            .map(|t| ((t.beat * 480.0).round() as i64, t.lane as i64))
            .collect();
        cells.sort_unstable();
        cells.dedup();
        assert_eq!(cells.len(), restored.taps().count());
    }

    #[test]
    fn test_later_declared_tap_moves() {
        let policy = ResolvePolicy::default();
        let mut score = Score::default();
        score.events.push(Event::Tempo(Bpm::new(0.0, 160.0)));
        score.events.push(Event::Tap(Single::tap(1.0, 0.0, 2.0)));
        score.events.push(Event::Tap(Single::tap(1.0, 0.0, 2.0)));
        resolve_overlaps(&mut score, &policy).unwrap();

        let beats: Vec<f64> = score.taps().map(|t| t.beat).collect();
        assert_eq!(beats[0], 1.0);
        assert!(beats[1] > 1.0);
    }
}
