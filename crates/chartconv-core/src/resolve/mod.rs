//! Overlap resolution for targets with a discrete lane/tick grid.
//!
//! Charts authored with fractional lanes and sub-tick timing may place two
//! notes on the same discretized cell. This module detects such collisions
//! and nudges notes one minimum increment at a time, by a priority table
//! keyed on the ordered pair of point roles, until no two notes share a
//! discretized time with overlapping lane ranges. Hold point ordering
//! (`start < relays < end`) is repaired afterwards.

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::score::{
    BAR_INTERVAL, BEAT_PER_TICK, Direction, Event, HoldPoint, JudgeKind, LANE_OFFSET, Score,
    round_beat,
};

/// Discretization policy of the target format.
#[derive(Debug, Clone)]
pub struct ResolvePolicy {
    /// Minimum time increment, in beats, notes are moved by.
    pub min_increment: f64,
    /// Offset from center-zero lanes to the left-edge occupancy grid.
    pub lane_offset: i32,
    /// Upper bound on moves per point before resolution gives up.
    pub max_moves: u32,
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        Self {
            min_increment: BEAT_PER_TICK,
            lane_offset: LANE_OFFSET,
            max_moves: 10_000,
        }
    }
}

/// Role of a flattened candidate point, for the priority table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Tap,
    Start,
    Relay,
    End,
    GuidePoint,
}

/// Where a candidate writes its beat back to.
#[derive(Debug, Clone, Copy)]
enum Owner {
    Tap(usize),
    HoldPoint(usize, usize),
    GuidePoint(usize, usize),
}

#[derive(Debug, Clone)]
struct Candidate {
    beat: f64,
    lane: f64,
    size: f64,
    role: Role,
    judge: JudgeKind,
    trace: bool,
    direction: Option<Direction>,
    owner: Owner,
}

struct Resolver<'a> {
    policy: &'a ResolvePolicy,
    cands: Vec<Candidate>,
    buckets: Vec<Vec<usize>>,
    moves: u64,
}

impl<'a> Resolver<'a> {
    fn new(score: &Score, policy: &'a ResolvePolicy) -> Self {
        let mut cands = Vec::new();
        for (ei, event) in score.events.iter().enumerate() {
            match event {
                Event::Tap(n) => cands.push(Candidate {
                    beat: n.beat,
                    lane: n.lane,
                    size: n.size,
                    role: Role::Tap,
                    judge: JudgeKind::Normal,
                    trace: n.trace,
                    direction: n.direction,
                    owner: Owner::Tap(ei),
                }),
                Event::Hold(slide) => {
                    for (pi, point) in slide.connections.iter().enumerate() {
                        let (role, judge, direction) = match point {
                            HoldPoint::Start(p) => (Role::Start, p.judge, None),
                            HoldPoint::Relay(_) => (Role::Relay, JudgeKind::Normal, None),
                            HoldPoint::End(p) => (Role::End, p.judge, p.direction),
                        };
                        cands.push(Candidate {
                            beat: point.beat(),
                            lane: point.lane(),
                            size: point.size(),
                            role,
                            judge,
                            trace: false,
                            direction,
                            owner: Owner::HoldPoint(ei, pi),
                        });
                    }
                }
                Event::Guide(guide) => {
                    for (pi, point) in guide.midpoints.iter().enumerate() {
                        cands.push(Candidate {
                            beat: point.beat,
                            lane: point.lane,
                            size: point.size,
                            role: Role::GuidePoint,
                            judge: JudgeKind::Normal,
                            trace: false,
                            direction: None,
                            owner: Owner::GuidePoint(ei, pi),
                        });
                    }
                }
                Event::Tempo(_) | Event::SpeedTimeline(_) => {}
            }
        }

        let max_beat = cands.iter().map(|c| c.beat).fold(0.0f64, f64::max);
        let mut buckets = vec![Vec::new(); (max_beat / BAR_INTERVAL) as usize + 2];
        for (i, cand) in cands.iter().enumerate() {
            let idx = bucket_index(cand.beat);
            buckets[idx].push(i);
        }

        Self {
            policy,
            cands,
            buckets,
            moves: 0,
        }
    }

    fn tick_of(&self, beat: f64) -> i64 {
        (beat / self.policy.min_increment).round() as i64
    }

    /// Occupied lane cells as a half-open integer range.
    fn lane_range(&self, cand: &Candidate) -> (i32, i32) {
        let left = (cand.lane - cand.size + self.policy.lane_offset as f64).floor() as i32;
        let cells = (cand.size * 2.0) as i32;
        (left, left + cells)
    }

    /// First candidate colliding with `i` on the discretized grid, scanning
    /// the candidate's own bucket and both adjacent ones.
    fn overlap_of(&self, i: usize) -> Option<usize> {
        let cand = &self.cands[i];
        let tick = self.tick_of(cand.beat);
        let (left, right) = self.lane_range(cand);
        let center = bucket_index(cand.beat);
        let lo = center.saturating_sub(1);
        let hi = (center + 1).min(self.buckets.len() - 1);
        for bucket in &self.buckets[lo..=hi] {
            for &j in bucket {
                if j == i {
                    continue;
                }
                let other = &self.cands[j];
                if self.tick_of(other.beat) != tick {
                    continue;
                }
                let (oleft, oright) = self.lane_range(other);
                if left.max(oleft) < right.min(oright) {
                    return Some(j);
                }
            }
        }
        None
    }

    fn shift(&mut self, i: usize, increments: f64) -> Result<()> {
        self.moves += 1;
        let budget = self.policy.max_moves as u64 * self.cands.len().max(1) as u64;
        if self.moves > budget {
            let cand = &self.cands[i];
            return Err(Error::ResolutionExhausted {
                beat: cand.beat,
                lane: cand.lane,
            });
        }
        let old = bucket_index(self.cands[i].beat);
        let beat = round_beat(self.cands[i].beat + increments * self.policy.min_increment);
        self.cands[i].beat = beat;
        let new = bucket_index(beat);
        if new >= self.buckets.len() {
            self.buckets.resize(new + 1, Vec::new());
        }
        if new != old {
            self.buckets[old].retain(|&j| j != i);
            self.buckets[new].push(i);
        }
        trace!(beat, "moved colliding point");
        Ok(())
    }

    fn shift_later(&mut self, i: usize) -> Result<()> {
        self.shift(i, 1.0)
    }

    fn shift_earlier(&mut self, i: usize) -> Result<()> {
        self.shift(i, -1.0)
    }

    /// Collision policy for a standalone tap.
    fn resolve_tap(&mut self, i: usize) -> Result<()> {
        while let Some(j) = self.overlap_of(i) {
            match self.cands[j].role {
                Role::Tap | Role::Start | Role::Relay | Role::GuidePoint => self.shift_later(j)?,
                Role::End => self.shift_earlier(j)?,
            }
        }
        Ok(())
    }

    /// Collision policy for one hold point, keyed on the ordered role pair.
    fn resolve_hold_point(&mut self, i: usize) -> Result<()> {
        while let Some(j) = self.overlap_of(i) {
            let this = self.cands[i].clone();
            let other = self.cands[j].clone();
            match (this.role, other.role) {
                (Role::Start, Role::Tap) => {
                    if this.judge != JudgeKind::None && other.trace {
                        self.shift_later(j)?;
                    } else {
                        self.shift_later(i)?;
                    }
                }
                (Role::Start, Role::Start) => {
                    if this.judge != JudgeKind::None && other.judge == JudgeKind::None {
                        self.shift_later(j)?;
                    } else {
                        // Same-role tie: the later-declared point yields.
                        self.shift_later(i.max(j))?;
                    }
                }
                (Role::Start, Role::Relay) => self.shift_later(j)?,
                (Role::Start, Role::End) => self.shift_later(i)?,
                (Role::Relay, _) => self.shift_later(i)?,
                (Role::End, Role::Tap) => self.shift_earlier(i)?,
                (Role::End, Role::Start) => self.shift_later(j)?,
                (Role::End, Role::Relay) => self.shift_later(j)?,
                (Role::End, Role::End) => {
                    if this.judge == JudgeKind::None || other.direction.is_some() {
                        self.shift_earlier(i)?;
                    } else if other.judge == JudgeKind::None || this.direction.is_some() {
                        self.shift_earlier(j)?;
                    } else {
                        // Same-role tie: the later-declared point yields.
                        self.shift_earlier(i.max(j))?;
                    }
                }
                (Role::End, _) => self.shift_earlier(i)?,
                _ => self.shift_later(i)?,
            }
        }
        Ok(())
    }

    /// Repair pass: pushes hold points back inside their own start/end
    /// interval, swapping endpoint times as a last resort.
    fn repair_hold(&mut self, points: &[usize]) -> Result<()> {
        let (Some(&start), Some(&end)) = (points.first(), points.last()) else {
            return Ok(());
        };
        for &p in points {
            if self.cands[p].role != Role::End {
                while self.cands[p].beat >= self.cands[end].beat {
                    self.shift_earlier(p)?;
                    while self.overlap_of(p).is_some() {
                        self.shift_earlier(p)?;
                    }
                }
            }
            if self.cands[p].role != Role::Start {
                while self.cands[p].beat <= self.cands[start].beat {
                    self.shift_later(p)?;
                    while self.overlap_of(p).is_some() {
                        self.shift_later(p)?;
                    }
                }
            }
            if self.cands[p].beat > self.cands[end].beat {
                let (a, b) = (self.cands[p].beat, self.cands[end].beat);
                self.cands[p].beat = b;
                self.cands[end].beat = a;
                self.rebucket(p);
                self.rebucket(end);
            }
        }
        Ok(())
    }

    fn rebucket(&mut self, i: usize) {
        let new = bucket_index(self.cands[i].beat);
        if new >= self.buckets.len() {
            self.buckets.resize(new + 1, Vec::new());
        }
        for bucket in &mut self.buckets {
            bucket.retain(|&j| j != i);
        }
        self.buckets[new].push(i);
    }

    /// Collision policy for a guide midpoint: guides always yield, later.
    fn resolve_guide_point(&mut self, i: usize) -> Result<()> {
        while self.overlap_of(i).is_some() {
            self.shift_later(i)?;
        }
        Ok(())
    }
}

fn bucket_index(beat: f64) -> usize {
    (beat.max(0.0) / BAR_INTERVAL) as usize
}

/// Mutates `score` in place so that no two candidate points occupy
/// overlapping discretized lane ranges at the same discretized time.
///
/// Running this on an already-resolved score performs no moves.
pub fn resolve_overlaps(score: &mut Score, policy: &ResolvePolicy) -> Result<()> {
    let mut resolver = Resolver::new(score, policy);

    // Group candidate indices per owning event, in declaration order.
    let mut by_event: Vec<Vec<usize>> = vec![Vec::new(); score.events.len()];
    for (i, cand) in resolver.cands.iter().enumerate() {
        let ei = match cand.owner {
            Owner::Tap(ei) | Owner::HoldPoint(ei, _) | Owner::GuidePoint(ei, _) => ei,
        };
        by_event[ei].push(i);
    }

    for (ei, event) in score.events.iter().enumerate() {
        match event {
            Event::Tap(_) => {
                for &i in &by_event[ei] {
                    resolver.resolve_tap(i)?;
                }
            }
            Event::Hold(_) => {
                for &i in &by_event[ei] {
                    resolver.resolve_hold_point(i)?;
                }
                resolver.repair_hold(&by_event[ei])?;
            }
            Event::Guide(_) => {
                for &i in &by_event[ei] {
                    resolver.resolve_guide_point(i)?;
                }
            }
            Event::Tempo(_) | Event::SpeedTimeline(_) => {}
        }
    }

    debug!(moves = resolver.moves, "overlap resolution complete");

    // Write resolved beats back into the model.
    for cand in &resolver.cands {
        match cand.owner {
            Owner::Tap(ei) => {
                if let Event::Tap(n) = &mut score.events[ei] {
                    n.beat = cand.beat;
                }
            }
            Owner::HoldPoint(ei, pi) => {
                if let Event::Hold(slide) = &mut score.events[ei] {
                    match &mut slide.connections[pi] {
                        HoldPoint::Start(p) => p.beat = cand.beat,
                        HoldPoint::Relay(p) => p.beat = cand.beat,
                        HoldPoint::End(p) => p.beat = cand.beat,
                    }
                }
            }
            Owner::GuidePoint(ei, pi) => {
                if let Event::Guide(guide) = &mut score.events[ei] {
                    guide.midpoints[pi].beat = cand.beat;
                }
            }
        }
    }
    for event in &mut score.events {
        match event {
            Event::Hold(slide) => slide.sort_points(),
            Event::Guide(guide) => guide
                .midpoints
                .sort_by(|a, b| a.beat.partial_cmp(&b.beat).unwrap_or(std::cmp::Ordering::Equal)),
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::Single;

    fn tap(beat: f64, lane: f64, size: f64) -> Event {
        Event::Tap(Single::tap(beat, lane, size))
    }

    #[test]
    fn test_non_overlapping_untouched() {
        let mut score = Score::default();
        score.events.push(tap(1.0, -2.0, 1.0));
        score.events.push(tap(1.0, 2.0, 1.0));
        let before = score.clone();
        resolve_overlaps(&mut score, &ResolvePolicy::default()).unwrap();
        assert_eq!(score, before);
    }

    #[test]
    fn test_same_cell_taps_separate_in_time() {
        let mut score = Score::default();
        score.events.push(tap(4.0, -1.0, 1.0)); // lanes [-2, 0]
        score.events.push(tap(4.0, 0.0, 1.0)); // lanes [-1, 1], overlapping
        resolve_overlaps(&mut score, &ResolvePolicy::default()).unwrap();

        let beats: Vec<f64> = score.taps().map(|n| n.beat).collect();
        assert_ne!(beats[0], beats[1]);
        // The later-declared tap is the one that moved.
        assert_eq!(beats[0], 4.0);
        assert!(beats[1] > 4.0);
    }

    #[test]
    fn test_idempotent_on_resolved_score() {
        let mut score = Score::default();
        score.events.push(tap(4.0, -1.0, 1.0));
        score.events.push(tap(4.0, 0.0, 1.0));
        resolve_overlaps(&mut score, &ResolvePolicy::default()).unwrap();
        let resolved = score.clone();
        resolve_overlaps(&mut score, &ResolvePolicy::default()).unwrap();
        assert_eq!(score, resolved);
    }
}
