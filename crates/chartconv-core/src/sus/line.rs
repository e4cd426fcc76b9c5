//! Line-level codec for the text format.
//!
//! A document is `#KEY value` metadata lines plus `#<header>: <data>` score
//! lines. Score data is a string of two-character cells evenly subdividing
//! one measure; cell position encodes time, the cell itself a (code, width)
//! digit pair. Hold and guide chains are multiplexed onto reusable channel
//! digits, so non-overlapping chains can share a channel.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::error::{Error, Result};

use super::notetype;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawNote {
    pub tick: i64,
    pub lane: u8,
    pub width: u8,
    pub kind: u8,
}

/// The text document, one step above raw lines: positions are absolute
/// ticks, chains are assembled, codes are still wire codes.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RawScore {
    pub title: String,
    pub artist: String,
    pub designer: String,
    pub wave_offset: f64,
    pub requests: Vec<String>,
    pub bpms: Vec<(i64, f64)>,
    pub bar_lengths: Vec<(u32, f64)>,
    pub speeds: Vec<(i64, f64)>,
    pub taps: Vec<RawNote>,
    pub directionals: Vec<RawNote>,
    pub slides: Vec<Vec<RawNote>>,
    pub guides: Vec<Vec<RawNote>>,
}

impl RawScore {
    pub fn ticks_per_beat(&self) -> i64 {
        self.requests
            .iter()
            .filter_map(|r| r.strip_prefix("ticks_per_beat"))
            .filter_map(|rest| rest.trim().parse().ok())
            .next()
            .unwrap_or(480)
    }
}

/// Measure lengths in beats, keyed by the first measure each applies to.
struct BarTable {
    entries: Vec<(u32, f64)>,
}

impl BarTable {
    fn new(mut entries: Vec<(u32, f64)>) -> Self {
        entries.sort_by_key(|e| e.0);
        entries.dedup_by_key(|e| e.0);
        if entries.first().is_none_or(|e| e.0 != 0) {
            entries.insert(0, (0, 4.0));
        }
        Self { entries }
    }

    fn beats_in(&self, measure: u32) -> f64 {
        self.entries
            .iter()
            .rev()
            .find(|(from, _)| *from <= measure)
            .map(|(_, beats)| *beats)
            .unwrap_or(4.0)
    }

    fn ticks_in(&self, measure: u32, tpb: i64) -> i64 {
        (self.beats_in(measure) * tpb as f64).round() as i64
    }

    fn start_tick(&self, measure: u32, tpb: i64) -> i64 {
        let mut tick = 0;
        for m in 0..measure {
            tick += self.ticks_in(m, tpb);
        }
        tick
    }

    /// Measure containing `tick` plus the offset into it.
    fn locate(&self, tick: i64, tpb: i64) -> (u32, i64) {
        let mut measure = 0u32;
        let mut start = 0i64;
        loop {
            let len = self.ticks_in(measure, tpb);
            if tick < start + len || len == 0 {
                return (measure, tick - start);
            }
            start += len;
            measure += 1;
        }
    }
}

fn digit_value(c: char) -> Option<u8> {
    c.to_digit(36).map(|d| d as u8)
}

fn digit_char(v: u8) -> char {
    char::from_digit(u32::from(v), 36).unwrap_or('0')
}

fn strip_quotes(value: &str) -> &str {
    value.trim().trim_matches('"')
}

pub(crate) fn parse(text: &str) -> Result<RawScore> {
    let mut raw = RawScore::default();
    let mut bpm_defs: HashMap<String, f64> = HashMap::new();
    let mut score_lines: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('#') else {
            continue;
        };
        if let Some(colon) = rest.find(':') {
            let header = rest[..colon].trim().to_string();
            let data = rest[colon + 1..].trim().to_string();
            if let Some(id) = header.strip_prefix("BPM")
                && id.len() == 2
            {
                let value = data.parse().map_err(|_| {
                    Error::InvalidChart(format!("bad tempo definition {data:?}"))
                })?;
                bpm_defs.insert(id.to_lowercase(), value);
            } else if header.len() == 5 && header.ends_with("02") && measure_of(&header).is_some()
            {
                let measure = measure_of(&header).unwrap_or(0);
                let beats = data.parse().map_err(|_| {
                    Error::InvalidChart(format!("bad measure length {data:?}"))
                })?;
                raw.bar_lengths.push((measure, beats));
            } else {
                score_lines.push((header, data));
            }
        } else {
            let mut parts = rest.splitn(2, char::is_whitespace);
            let key = parts.next().unwrap_or_default().to_uppercase();
            let value = parts.next().unwrap_or_default();
            match key.as_str() {
                "TITLE" => raw.title = strip_quotes(value).to_string(),
                "ARTIST" => raw.artist = strip_quotes(value).to_string(),
                "DESIGNER" => raw.designer = strip_quotes(value).to_string(),
                "WAVEOFFSET" => raw.wave_offset = value.trim().parse().unwrap_or(0.0),
                "REQUEST" => raw.requests.push(strip_quotes(value).to_string()),
                _ => {}
            }
        }
    }

    let tpb = raw.ticks_per_beat();
    let bars = BarTable::new(raw.bar_lengths.clone());
    let mut slide_streams: BTreeMap<char, Vec<RawNote>> = BTreeMap::new();
    let mut guide_streams: BTreeMap<char, Vec<RawNote>> = BTreeMap::new();

    for (header, data) in score_lines {
        let chars: Vec<char> = header.chars().collect();
        if header.starts_with("TIL") {
            for entry in strip_quotes(&data).split(',') {
                let entry = entry.trim();
                if entry.is_empty() {
                    continue;
                }
                let Some((measure_part, rest)) = entry.split_once('\'') else {
                    continue;
                };
                let Some((offset_part, value_part)) = rest.split_once(':') else {
                    continue;
                };
                let (Ok(measure), Ok(offset), Ok(value)) = (
                    measure_part.trim().parse::<u32>(),
                    offset_part.trim().parse::<i64>(),
                    value_part.trim().parse::<f64>(),
                ) else {
                    warn!(entry, "unparsable speed entry, skipped");
                    continue;
                };
                raw.speeds.push((bars.start_tick(measure, tpb) + offset, value));
            }
            continue;
        }

        let Some(measure) = measure_of(&header) else {
            continue;
        };
        let start = bars.start_tick(measure, tpb);
        let measure_ticks = bars.ticks_in(measure, tpb);

        match (chars.len(), chars.get(3)) {
            (5, Some('0')) if chars[4] == '8' => {
                for (tick, cell) in cells(&data, start, measure_ticks) {
                    let Some(&bpm) = bpm_defs.get(&cell.to_lowercase()) else {
                        warn!(id = %cell, "tempo reference without definition, skipped");
                        continue;
                    };
                    raw.bpms.push((tick, bpm));
                }
            }
            (5, Some('1')) => {
                let Some(lane) = digit_value(chars[4]) else {
                    continue;
                };
                push_notes(&mut raw.taps, &data, start, measure_ticks, lane);
            }
            (5, Some('5')) => {
                let Some(lane) = digit_value(chars[4]) else {
                    continue;
                };
                push_notes(&mut raw.directionals, &data, start, measure_ticks, lane);
            }
            (6, Some('3')) => {
                let Some(lane) = digit_value(chars[4]) else {
                    continue;
                };
                let stream = slide_streams.entry(chars[5]).or_default();
                push_notes(stream, &data, start, measure_ticks, lane);
            }
            (6, Some('9')) => {
                let Some(lane) = digit_value(chars[4]) else {
                    continue;
                };
                let stream = guide_streams.entry(chars[5]).or_default();
                push_notes(stream, &data, start, measure_ticks, lane);
            }
            _ => {}
        }
    }

    for stream in slide_streams.into_values() {
        raw.slides
            .extend(split_chains(stream, notetype::slide::START, notetype::slide::END));
    }
    for stream in guide_streams.into_values() {
        raw.guides
            .extend(split_chains(stream, notetype::guide::START, notetype::guide::END));
    }

    raw.bpms.sort_by_key(|b| b.0);
    raw.speeds.sort_by_key(|s| s.0);
    Ok(raw)
}

fn measure_of(header: &str) -> Option<u32> {
    header.get(..3)?.parse().ok()
}

/// Splits a data string into its two-character cells, yielding the absolute
/// tick of each non-empty cell.
fn cells(data: &str, start: i64, measure_ticks: i64) -> Vec<(i64, String)> {
    let chars: Vec<char> = data.chars().filter(|c| !c.is_whitespace()).collect();
    let count = chars.len() / 2;
    if count == 0 {
        return Vec::new();
    }
    let mut out = Vec::new();
    for i in 0..count {
        let cell: String = chars[i * 2..i * 2 + 2].iter().collect();
        if cell == "00" {
            continue;
        }
        let tick = start + (i as i64 * measure_ticks) / count as i64;
        out.push((tick, cell));
    }
    out
}

fn push_notes(out: &mut Vec<RawNote>, data: &str, start: i64, measure_ticks: i64, lane: u8) {
    for (tick, cell) in cells(data, start, measure_ticks) {
        let mut chars = cell.chars();
        let (Some(kind), Some(width)) = (
            chars.next().and_then(digit_value),
            chars.next().and_then(digit_value),
        ) else {
            continue;
        };
        out.push(RawNote {
            tick,
            lane,
            width,
            kind,
        });
    }
}

/// Splits a channel's note stream into chains delimited by start/end codes.
fn split_chains(mut stream: Vec<RawNote>, start_code: u8, end_code: u8) -> Vec<Vec<RawNote>> {
    stream.sort_by_key(|n| (n.tick, n.lane));
    let mut chains = Vec::new();
    let mut current: Option<Vec<RawNote>> = None;
    for note in stream {
        if note.kind == start_code {
            if let Some(open) = current.take() {
                warn!("chain reopened before its end, closing previous");
                chains.push(open);
            }
            current = Some(vec![note]);
        } else if let Some(chain) = current.as_mut() {
            let closes = note.kind == end_code;
            chain.push(note);
            if closes
                && let Some(done) = current.take()
            {
                chains.push(done);
            }
        }
    }
    if let Some(open) = current {
        warn!("chain never closed, kept as-is");
        chains.push(open);
    }
    chains
}

pub(crate) fn dump(raw: &RawScore) -> String {
    let tpb = raw.ticks_per_beat();
    let bars = BarTable::new(raw.bar_lengths.clone());
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!("#TITLE \"{}\"", raw.title));
    lines.push(format!("#ARTIST \"{}\"", raw.artist));
    lines.push(format!("#DESIGNER \"{}\"", raw.designer));
    lines.push(format!("#WAVEOFFSET {}", raw.wave_offset));
    for request in &raw.requests {
        lines.push(format!("#REQUEST \"{request}\""));
    }
    lines.push(String::new());

    for (measure, beats) in &raw.bar_lengths {
        lines.push(format!("#{measure:03}02: {beats}"));
    }

    // Tempo definitions are deduplicated; per-measure reference lines point
    // back at them by a two-digit id.
    let mut bpm_ids: Vec<f64> = Vec::new();
    for &(_, bpm) in &raw.bpms {
        if !bpm_ids.contains(&bpm) {
            bpm_ids.push(bpm);
        }
    }
    for (index, bpm) in bpm_ids.iter().enumerate() {
        lines.push(format!("#BPM{}: {bpm}", id_str(index)));
    }
    let mut bpm_cells: BTreeMap<u32, Vec<(i64, String)>> = BTreeMap::new();
    for &(tick, bpm) in &raw.bpms {
        let (measure, offset) = bars.locate(tick, tpb);
        let index = bpm_ids.iter().position(|b| *b == bpm).unwrap_or(0);
        bpm_cells.entry(measure).or_default().push((offset, id_str(index)));
    }
    for (measure, cells) in bpm_cells {
        for data in pack_cells(bars.ticks_in(measure, tpb), cells) {
            lines.push(format!("#{measure:03}08: {data}"));
        }
    }

    if !raw.speeds.is_empty() {
        let entries: Vec<String> = raw
            .speeds
            .iter()
            .map(|&(tick, value)| {
                let (measure, offset) = bars.locate(tick, tpb);
                format!("{measure}'{offset}:{value}")
            })
            .collect();
        lines.push(format!("#TIL00: \"{}\"", entries.join(", ")));
        lines.push("#HISPEED 00".to_string());
        lines.push("#MEASUREHS 00".to_string());
    }
    lines.push(String::new());

    emit_notes(&mut lines, &bars, tpb, &raw.taps, |measure, lane| {
        format!("#{measure:03}1{}", digit_char(lane))
    });
    emit_notes(&mut lines, &bars, tpb, &raw.directionals, |measure, lane| {
        format!("#{measure:03}5{}", digit_char(lane))
    });
    emit_chains(&mut lines, &bars, tpb, &raw.slides, '3');
    emit_chains(&mut lines, &bars, tpb, &raw.guides, '9');

    lines.push(String::new());
    lines.join("\n")
}

fn id_str(index: usize) -> String {
    let value = index + 1;
    format!(
        "{}{}",
        digit_char((value / 36 % 36) as u8),
        digit_char((value % 36) as u8)
    )
}

fn emit_notes(
    lines: &mut Vec<String>,
    bars: &BarTable,
    tpb: i64,
    notes: &[RawNote],
    header: impl Fn(u32, u8) -> String,
) {
    let mut grouped: BTreeMap<(u32, u8), Vec<(i64, String)>> = BTreeMap::new();
    for note in notes {
        let (measure, offset) = bars.locate(note.tick, tpb);
        grouped.entry((measure, note.lane)).or_default().push((
            offset,
            format!("{}{}", digit_char(note.kind), digit_char(note.width)),
        ));
    }
    for ((measure, lane), cells) in grouped {
        for data in pack_cells(bars.ticks_in(measure, tpb), cells) {
            lines.push(format!("{}: {data}", header(measure, lane)));
        }
    }
}

/// Chains sharing a channel digit must not overlap in time; channels are
/// assigned greedily in chain start order and recycled once free.
fn emit_chains(
    lines: &mut Vec<String>,
    bars: &BarTable,
    tpb: i64,
    chains: &[Vec<RawNote>],
    family: char,
) {
    let mut order: Vec<usize> = (0..chains.len()).collect();
    order.sort_by_key(|&i| chains[i].first().map(|n| n.tick).unwrap_or(0));

    let mut channel_free_at: Vec<i64> = Vec::new();
    for &index in &order {
        let chain = &chains[index];
        let (Some(first), Some(last)) = (
            chain.iter().map(|n| n.tick).min(),
            chain.iter().map(|n| n.tick).max(),
        ) else {
            continue;
        };
        let channel = match channel_free_at.iter().position(|&free| free < first) {
            Some(c) => c,
            None => {
                channel_free_at.push(i64::MIN);
                channel_free_at.len() - 1
            }
        };
        channel_free_at[channel] = last;

        let mut grouped: BTreeMap<(u32, u8), Vec<(i64, String)>> = BTreeMap::new();
        for note in chain {
            let (measure, offset) = bars.locate(note.tick, tpb);
            grouped.entry((measure, note.lane)).or_default().push((
                offset,
                format!("{}{}", digit_char(note.kind), digit_char(note.width)),
            ));
        }
        for ((measure, lane), cells) in grouped {
            for data in pack_cells(bars.ticks_in(measure, tpb), cells) {
                lines.push(format!(
                    "#{measure:03}{family}{}{}: {data}",
                    digit_char(lane),
                    digit_char(channel as u8)
                ));
            }
        }
    }
}

/// Packs (offset, cell) pairs into data strings subdividing one measure on
/// the coarsest grid that hits every offset. Cells colliding on an offset
/// spill onto additional lines.
fn pack_cells(measure_ticks: i64, cells: Vec<(i64, String)>) -> Vec<String> {
    let mut layers: Vec<Vec<(i64, String)>> = Vec::new();
    for cell in cells {
        match layers
            .iter_mut()
            .find(|layer| layer.iter().all(|(off, _)| *off != cell.0))
        {
            Some(layer) => layer.push(cell),
            None => layers.push(vec![cell]),
        }
    }

    layers
        .into_iter()
        .map(|layer| {
            let step = layer
                .iter()
                .fold(measure_ticks, |acc, (off, _)| gcd(acc, *off))
                .max(1);
            let count = (measure_ticks / step).max(1) as usize;
            let mut slots = vec!["00".to_string(); count];
            for (offset, cell) in layer {
                let index = (offset / step) as usize;
                if index < count {
                    slots[index] = cell;
                }
            }
            slots.concat()
        })
        .collect()
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 { a.abs() } else { gcd(b, a % b) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_cells_coarsest_grid() {
        let packed = pack_cells(1920, vec![(0, "11".into()), (960, "21".into())]);
        assert_eq!(packed, vec!["1121".to_string()]);
    }

    #[test]
    fn test_pack_cells_spills_collisions() {
        let packed = pack_cells(1920, vec![(0, "11".into()), (0, "22".into())]);
        assert_eq!(packed.len(), 2);
    }

    #[test]
    fn test_parse_taps_and_bpm() {
        let text = concat!(
            "#TITLE \"song\"\n",
            "#WAVEOFFSET -0.5\n",
            "#REQUEST \"ticks_per_beat 480\"\n",
            "#BPM01: 160\n",
            "#00008: 01\n",
            "#00010: 14\n",
        );
        let raw = parse(text).unwrap();
        assert_eq!(raw.title, "song");
        assert_eq!(raw.wave_offset, -0.5);
        assert_eq!(raw.bpms, vec![(0, 160.0)]);
        assert_eq!(
            raw.taps,
            vec![RawNote {
                tick: 0,
                lane: 0,
                width: 4,
                kind: 1,
            }]
        );
    }

    #[test]
    fn test_round_trip_through_text() {
        let raw = RawScore {
            title: "t".into(),
            requests: vec!["ticks_per_beat 480".into()],
            bpms: vec![(0, 160.0)],
            bar_lengths: vec![(0, 4.0)],
            taps: vec![
                RawNote {
                    tick: 480,
                    lane: 5,
                    width: 3,
                    kind: 1,
                },
                RawNote {
                    tick: 960,
                    lane: 8,
                    width: 2,
                    kind: 2,
                },
            ],
            slides: vec![vec![
                RawNote {
                    tick: 0,
                    lane: 4,
                    width: 4,
                    kind: 1,
                },
                RawNote {
                    tick: 1920,
                    lane: 6,
                    width: 4,
                    kind: 2,
                },
            ]],
            ..RawScore::default()
        };
        let text = dump(&raw);
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.taps, raw.taps);
        assert_eq!(parsed.slides, raw.slides);
        assert_eq!(parsed.bpms, raw.bpms);
    }

    #[test]
    fn test_channel_reuse_for_disjoint_chains() {
        let chain = |start: i64| {
            vec![
                RawNote {
                    tick: start,
                    lane: 4,
                    width: 2,
                    kind: 1,
                },
                RawNote {
                    tick: start + 480,
                    lane: 4,
                    width: 2,
                    kind: 2,
                },
            ]
        };
        let raw = RawScore {
            bpms: vec![(0, 160.0)],
            bar_lengths: vec![(0, 4.0)],
            slides: vec![chain(0), chain(3840)],
            ..RawScore::default()
        };
        let text = dump(&raw);
        // Both chains fit on channel 0 since they never overlap.
        assert!(text.contains("#000340"));
        assert!(text.contains("#002340"));
        assert!(!text.contains("#000341"), "unexpected second channel");
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.slides.len(), 2);
    }
}
