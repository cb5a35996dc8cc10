//! Choosing rows and columns of signal matrices, and the rows/columns that have to be
//! added to signals when a route needs an indicator combination the matrix does not have.

use crate::network::SignalId;
use crate::signal::{Cell, Signal, Speed, TrackType};
use serde::Serialize;
use std::collections::BTreeMap;

/// Index of the entry whose speed fits `target` best: the greatest speed not above the
/// target, else the smallest speed above it, else the entry at `fallback`.
fn select_speed<'a>(
    entries: impl Iterator<Item = (usize, &'a Speed)> + Clone,
    target: Speed,
) -> Option<usize> {
    match target {
        Speed::Stop | Speed::Dark | Speed::TargetOnly => entries
            .clone()
            .find(|(_, s)| **s == target)
            .map(|(i, _)| i),
        Speed::Kmh(_) | Speed::Unlimited => {
            let t = target.rank()?;
            let proceed = entries.clone().filter(|(_, s)| s.is_proceed());
            let below = proceed
                .clone()
                .filter(|(_, s)| s.rank().map_or(false, |r| r <= t))
                .fold(None, |best: Option<(usize, f64)>, (i, s)| {
                    let r = s.rank().unwrap_or(0.0);
                    match best {
                        Some((_, b)) if b >= r => best,
                        _ => Some((i, r)),
                    }
                });
            if let Some((i, _)) = below {
                return Some(i);
            }
            let above = proceed
                .filter(|(_, s)| s.rank().map_or(false, |r| r > t))
                .fold(None, |best: Option<(usize, f64)>, (i, s)| {
                    let r = s.rank().unwrap_or(f64::INFINITY);
                    match best {
                        Some((_, b)) if b <= r => best,
                        _ => Some((i, r)),
                    }
                });
            if let Some((i, _)) = above {
                return Some(i);
            }
            entries.clone().find(|(_, s)| **s == Speed::Dark).map(|(i, _)| i)
        }
    }
}

/// Row of `signal` for a route of the given classes at the given speed.
pub fn select_row(signal: &Signal, classes: u8, speed: Speed) -> Option<usize> {
    let rows = signal
        .rows
        .iter()
        .enumerate()
        .filter(move |(_, r)| r.classes & classes != 0)
        .map(|(i, r)| (i, &r.speed));
    select_speed(rows, speed)
}

/// Column of a distant signal announcing the given speed at the next main signal.
pub fn select_column(signal: &Signal, speed: Speed) -> Option<usize> {
    select_speed(signal.columns.iter().enumerate(), speed)
}

/// Replacement row for the track type, falling back to a row valid for all track types.
pub fn select_replacement_row(signal: &Signal, track_type: TrackType) -> Option<usize> {
    signal
        .replacement_rows
        .iter()
        .position(|t| *t == Some(track_type))
        .or_else(|| signal.replacement_rows.iter().position(|t| t.is_none()))
}

/// Sign frames a route with this track type and direction target needs in addition to the
/// regular aspect.
pub fn indicator_frames(signal: &Signal, track_type: TrackType, direction: &str) -> u64 {
    let mut frames = 0;
    if track_type == TrackType::Opposing {
        frames |= signal.opposing_track_frames;
    }
    if !direction.is_empty() {
        frames |= signal
            .direction_indicators
            .iter()
            .filter(|i| i.target == direction)
            .fold(0, |acc, i| acc | i.frames);
    }
    frames
}

pub fn pre_indicator_frames(signal: &Signal, direction: &str) -> u64 {
    if direction.is_empty() {
        return 0;
    }
    signal
        .direction_pre_indicators
        .iter()
        .filter(|i| i.target == direction)
        .fold(0, |acc, i| acc | i.frames)
}

/// A matrix row or column added to a signal: a copy of `source` with `frames` OR-ed into
/// all of its cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Extension {
    pub source: usize,
    pub frames: u64,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SignalExtensions {
    pub rows: Vec<Extension>,
    pub columns: Vec<Extension>,
}

/// Rows and columns appended to signals during aiming. Signals themselves stay read-only;
/// indices handed out here continue after the signal's own rows and columns.
#[derive(Debug, Default)]
pub struct SignalCatalog {
    extensions: BTreeMap<SignalId, SignalExtensions>,
}

impl SignalCatalog {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn extensions(&self) -> &BTreeMap<SignalId, SignalExtensions> {
        &self.extensions
    }

    fn row_source(&self, id: SignalId, signal: &Signal, row: usize) -> (usize, u64) {
        if row < signal.rows.len() {
            return (row, 0);
        }
        match self
            .extensions
            .get(&id)
            .and_then(|e| e.rows.get(row - signal.rows.len()))
        {
            Some(ext) => (ext.source, ext.frames),
            None => (row, 0),
        }
    }

    fn column_source(&self, id: SignalId, signal: &Signal, column: usize) -> (usize, u64) {
        if column < signal.width() {
            return (column, 0);
        }
        match self
            .extensions
            .get(&id)
            .and_then(|e| e.columns.get(column - signal.width()))
        {
            Some(ext) => (ext.source, ext.frames),
            None => (column, 0),
        }
    }

    /// Cell content including appended rows and columns.
    pub fn cell(&self, id: SignalId, signal: &Signal, row: usize, column: usize) -> Cell {
        let (row, row_frames) = self.row_source(id, signal, row);
        let (column, column_frames) = self.column_source(id, signal, column);
        let cell = signal.cell(row, column);
        Cell {
            frames: cell.frames | row_frames | column_frames,
            speed: cell.speed,
        }
    }

    /// Row showing `row` plus `frames`. Returns an existing row with that content if there is
    /// one, otherwise appends a new row.
    pub fn get_or_append_row(&mut self, id: SignalId, signal: &Signal, row: usize, frames: u64) -> usize {
        if frames == 0 {
            return row;
        }
        let (source, source_frames) = self.row_source(id, signal, row);
        let frames = frames | source_frames;
        let wanted = |c: usize| signal.cell(source, c).frames | frames;

        // A row of the signal itself may already show the combination.
        if let Some(existing) = (0..signal.rows.len()).find(|&r| {
            r != source
                && signal.rows[r] == signal.rows[source]
                && (0..signal.width()).all(|c| signal.cell(r, c).frames == wanted(c))
        }) {
            return existing;
        }

        let ext = Extension { source, frames };
        let rows = &mut self.extensions.entry(id).or_default().rows;
        let idx = match rows.iter().position(|e| *e == ext) {
            Some(idx) => idx,
            None => {
                rows.push(ext);
                rows.len() - 1
            }
        };
        signal.rows.len() + idx
    }

    /// Column showing `column` plus `frames`, appended if needed.
    pub fn get_or_append_column(
        &mut self,
        id: SignalId,
        signal: &Signal,
        column: usize,
        frames: u64,
    ) -> usize {
        if frames == 0 {
            return column;
        }
        let (source, source_frames) = self.column_source(id, signal, column);
        let frames = frames | source_frames;
        let wanted = |r: usize| signal.cell(r, source).frames | frames;

        if let Some(existing) = (0..signal.columns.len()).find(|&c| {
            c != source
                && signal.columns[c] == signal.columns[source]
                && (0..signal.rows.len()).all(|r| signal.cell(r, c).frames == wanted(r))
        }) {
            return existing;
        }

        let ext = Extension { source, frames };
        let columns = &mut self.extensions.entry(id).or_default().columns;
        let idx = match columns.iter().position(|e| *e == ext) {
            Some(idx) => idx,
            None => {
                columns.push(ext);
                columns.len() - 1
            }
        };
        signal.width() + idx
    }

    /// `row` extended by the indicators this route needs.
    pub fn indicator_row(
        &mut self,
        id: SignalId,
        signal: &Signal,
        row: usize,
        track_type: TrackType,
        direction: &str,
    ) -> usize {
        let frames = indicator_frames(signal, track_type, direction);
        self.get_or_append_row(id, signal, row, frames)
    }

    pub fn pre_indicator_column(
        &mut self,
        id: SignalId,
        signal: &Signal,
        column: usize,
        direction: &str,
    ) -> usize {
        let frames = pre_indicator_frames(signal, direction);
        self.get_or_append_column(id, signal, column, frames)
    }
}
