use crate::score::{Ease, FadeKind, GuideColor};

#[derive(Debug, Clone, PartialEq)]
pub struct GuidePoint {
    pub beat: f64,
    pub lane: f64,
    pub size: f64,
    pub ease: Ease,
    pub time_scale_group: u32,
}

/// A non-judged visual path drawn through ordered points.
#[derive(Debug, Clone, PartialEq)]
pub struct Guide {
    pub color: GuideColor,
    pub fade: FadeKind,
    pub midpoints: Vec<GuidePoint>,
}

impl Guide {
    pub fn new(color: GuideColor, fade: FadeKind) -> Self {
        Self {
            color,
            fade,
            midpoints: Vec::new(),
        }
    }

    pub fn push(&mut self, point: GuidePoint) {
        self.midpoints.push(point);
        self.midpoints
            .sort_by(|a, b| a.beat.partial_cmp(&b.beat).unwrap_or(std::cmp::Ordering::Equal));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_keeps_time_order() {
        let mut guide = Guide::new(GuideColor::Green, FadeKind::Out);
        for beat in [3.0, 1.0, 2.0] {
            guide.push(GuidePoint {
                beat,
                lane: 0.0,
                size: 1.0,
                ease: Ease::Linear,
                time_scale_group: 0,
            });
        }
        let beats: Vec<f64> = guide.midpoints.iter().map(|p| p.beat).collect();
        assert_eq!(beats, vec![1.0, 2.0, 3.0]);
    }
}
