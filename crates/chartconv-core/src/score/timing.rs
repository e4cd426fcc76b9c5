use crate::score::round_beat;

/// A tempo change.
#[derive(Debug, Clone, PartialEq)]
pub struct Bpm {
    pub beat: f64,
    pub bpm: f64,
}

impl Bpm {
    pub fn new(beat: f64, bpm: f64) -> Self {
        Self {
            beat: round_beat(beat),
            bpm,
        }
    }
}

/// One change point of a speed timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeScalePoint {
    pub beat: f64,
    pub time_scale: f64,
}

/// A named speed timeline ("layer"); notes reference timelines by index and
/// index 0 always exists after normalization.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeScaleGroup {
    pub changes: Vec<TimeScalePoint>,
}

impl TimeScaleGroup {
    pub fn identity() -> Self {
        Self {
            changes: vec![TimeScalePoint {
                beat: 0.0,
                time_scale: 1.0,
            }],
        }
    }

    pub fn push(&mut self, point: TimeScalePoint) {
        self.changes.push(point);
    }

    pub fn sort_changes(&mut self) {
        self.changes
            .sort_by(|a, b| a.beat.partial_cmp(&b.beat).unwrap_or(std::cmp::Ordering::Equal));
    }

    /// Ensures a change exists at beat 0 so the timeline has a defined
    /// initial scale.
    pub fn ensure_initial(&mut self) {
        if !self.changes.iter().any(|c| c.beat == 0.0) {
            self.changes.insert(
                0,
                TimeScalePoint {
                    beat: 0.0,
                    time_scale: 1.0,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_timeline() {
        let group = TimeScaleGroup::identity();
        assert_eq!(group.changes.len(), 1);
        assert_eq!(group.changes[0].time_scale, 1.0);
    }

    #[test]
    fn test_ensure_initial_only_when_missing() {
        let mut group = TimeScaleGroup::default();
        group.push(TimeScalePoint {
            beat: 2.0,
            time_scale: 0.5,
        });
        group.ensure_initial();
        assert_eq!(group.changes.len(), 2);
        assert_eq!(group.changes[0].beat, 0.0);

        group.ensure_initial();
        assert_eq!(group.changes.len(), 2);
    }
}
