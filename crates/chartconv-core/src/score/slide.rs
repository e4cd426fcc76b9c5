use crate::score::{Direction, Ease, JudgeKind, RelayRole};

/// First point of a hold chain.
#[derive(Debug, Clone, PartialEq)]
pub struct StartPoint {
    pub beat: f64,
    pub lane: f64,
    pub size: f64,
    pub critical: bool,
    pub ease: Ease,
    pub judge: JudgeKind,
    pub time_scale_group: u32,
}

/// Interior point of a hold chain.
///
/// `critical: None` means the point carries no combo or visual judgment at
/// all; it only shapes the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayPoint {
    pub beat: f64,
    pub lane: f64,
    pub size: f64,
    pub ease: Ease,
    pub role: RelayRole,
    pub critical: Option<bool>,
    pub time_scale_group: u32,
}

/// Last point of a hold chain.
#[derive(Debug, Clone, PartialEq)]
pub struct EndPoint {
    pub beat: f64,
    pub lane: f64,
    pub size: f64,
    pub critical: bool,
    pub judge: JudgeKind,
    pub direction: Option<Direction>,
    pub time_scale_group: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HoldPoint {
    Start(StartPoint),
    Relay(RelayPoint),
    End(EndPoint),
}

impl HoldPoint {
    pub fn beat(&self) -> f64 {
        match self {
            Self::Start(p) => p.beat,
            Self::Relay(p) => p.beat,
            Self::End(p) => p.beat,
        }
    }

    pub fn lane(&self) -> f64 {
        match self {
            Self::Start(p) => p.lane,
            Self::Relay(p) => p.lane,
            Self::End(p) => p.lane,
        }
    }

    pub fn size(&self) -> f64 {
        match self {
            Self::Start(p) => p.size,
            Self::Relay(p) => p.size,
            Self::End(p) => p.size,
        }
    }

    /// Curve toward the next point, `Linear` where the format forces it.
    pub fn ease(&self) -> Ease {
        match self {
            Self::Start(p) => p.ease,
            Self::Relay(p) => p.ease,
            Self::End(_) => Ease::Linear,
        }
    }
}

/// A sustained gesture: one Start, zero or more Relays, one End, in time order.
#[derive(Debug, Clone, PartialEq)]
pub struct Slide {
    pub critical: bool,
    pub fake: bool,
    pub connections: Vec<HoldPoint>,
}

impl Slide {
    pub fn new(critical: bool) -> Self {
        Self {
            critical,
            fake: false,
            connections: Vec::new(),
        }
    }

    /// Inserts a point keeping the chain sorted by beat. Relays never land
    /// before the Start or after the End.
    pub fn push(&mut self, point: HoldPoint) {
        self.connections.push(point);
        self.sort_points();
    }

    pub(crate) fn sort_points(&mut self) {
        self.connections.sort_by(|a, b| {
            let key = |p: &HoldPoint| match p {
                HoldPoint::Start(_) => 0u8,
                HoldPoint::Relay(_) => 1,
                HoldPoint::End(_) => 2,
            };
            a.beat()
                .partial_cmp(&b.beat())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(key(a).cmp(&key(b)))
        });
    }

    pub fn start(&self) -> Option<&StartPoint> {
        match self.connections.first() {
            Some(HoldPoint::Start(p)) => Some(p),
            _ => None,
        }
    }

    pub fn end(&self) -> Option<&EndPoint> {
        match self.connections.last() {
            Some(HoldPoint::End(p)) => Some(p),
            _ => None,
        }
    }

    /// Structural joints: every point except attach relays, which are glued
    /// onto a segment instead of shaping it.
    pub fn joints(&self) -> impl Iterator<Item = &HoldPoint> {
        self.connections.iter().filter(|p| {
            !matches!(
                p,
                HoldPoint::Relay(RelayPoint {
                    role: RelayRole::Attach,
                    ..
                })
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(beat: f64) -> HoldPoint {
        HoldPoint::Start(StartPoint {
            beat,
            lane: 0.0,
            size: 1.5,
            critical: false,
            ease: Ease::Linear,
            judge: JudgeKind::Normal,
            time_scale_group: 0,
        })
    }

    fn relay(beat: f64, role: RelayRole) -> HoldPoint {
        HoldPoint::Relay(RelayPoint {
            beat,
            lane: 0.0,
            size: 1.5,
            ease: Ease::Linear,
            role,
            critical: Some(false),
            time_scale_group: 0,
        })
    }

    fn end(beat: f64) -> HoldPoint {
        HoldPoint::End(EndPoint {
            beat,
            lane: 0.0,
            size: 1.5,
            critical: false,
            judge: JudgeKind::Normal,
            direction: None,
            time_scale_group: 0,
        })
    }

    #[test]
    fn test_push_keeps_time_order() {
        let mut slide = Slide::new(false);
        slide.push(end(4.0));
        slide.push(start(1.0));
        slide.push(relay(2.5, RelayRole::Tick));
        let beats: Vec<f64> = slide.connections.iter().map(|p| p.beat()).collect();
        assert_eq!(beats, vec![1.0, 2.5, 4.0]);
        assert!(slide.start().is_some());
        assert!(slide.end().is_some());
    }

    #[test]
    fn test_equal_beat_endpoint_ordering() {
        // A relay at the same beat as the start must not displace it.
        let mut slide = Slide::new(false);
        slide.push(relay(1.0, RelayRole::Tick));
        slide.push(start(1.0));
        slide.push(end(2.0));
        assert!(matches!(slide.connections[0], HoldPoint::Start(_)));
    }

    #[test]
    fn test_joints_skip_attach() {
        let mut slide = Slide::new(false);
        slide.push(start(1.0));
        slide.push(relay(1.5, RelayRole::Attach));
        slide.push(relay(2.0, RelayRole::Tick));
        slide.push(end(3.0));
        assert_eq!(slide.joints().count(), 3);
    }
}
