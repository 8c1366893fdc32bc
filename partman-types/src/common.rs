// SPDX-License-Identifier: GPL-3.0-only

//! Sector ranges, size constants and size formatting helpers

use anyhow::Result;
use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};

pub const KIBIBYTE: u64 = 1024;
pub const MEBIBYTE: u64 = 1024 * KIBIBYTE;
pub const GIBIBYTE: u64 = 1024 * MEBIBYTE;

/// Partition alignment boundary (1 MiB), standard for modern disks
pub const ALIGNMENT_BYTES: u64 = MEBIBYTE;

const UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];
/// Accepted on input with the same 1024-based meaning as [`UNITS`]
const IEC_UNITS: [&str; 9] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];

/// A half-open sector range `[start, end)` on one device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectorRange {
    /// First sector (inclusive)
    pub start: u64,

    /// End sector (exclusive)
    pub end: u64,
}

impl SectorRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of sectors covered
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when both ranges share at least one sector.
    ///
    /// An empty range overlaps a non-empty one when its start lies inside it, so
    /// zero-length placeholders can still be located by position.
    pub fn overlaps(&self, other: &SectorRange) -> bool {
        if self.is_empty() || other.is_empty() {
            let (point, range) = if self.is_empty() {
                (self.start, other)
            } else {
                (other.start, self)
            };
            return range.start <= point && point < range.end.max(range.start + 1);
        }
        self.start < other.end && other.start < self.end
    }

    /// True when `other` lies entirely inside this range
    pub fn contains(&self, other: &SectorRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn contains_sector(&self, sector: u64) -> bool {
        self.start <= sector && sector < self.end
    }

    /// Clamp this range to fit within `bounds`
    pub fn clamp_to(&self, bounds: &SectorRange) -> Self {
        let start = self.start.clamp(bounds.start, bounds.end);
        let end = self.end.clamp(start, bounds.end);
        Self { start, end }
    }
}

pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

pub fn align_down(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value / alignment * alignment
}

/// Convert bytes to human-readable format (e.g., "1.50 GB")
pub fn bytes_to_pretty(bytes: &u64, add_bytes: bool) -> String {
    let mut steps = 0;
    let mut val = *bytes as f64;

    while val >= 1024. && steps < UNITS.len() - 1 {
        val /= 1024.;
        steps += 1;
    }

    if add_bytes {
        format!(
            "{:.2} {} ({} bytes)",
            val,
            UNITS[steps],
            bytes.to_formatted_string(&Locale::en)
        )
    } else {
        format!("{:.2} {}", val, UNITS[steps])
    }
}

/// Parse human-readable format to bytes (e.g., "1.5 GB" -> bytes)
pub fn pretty_to_bytes(pretty: &str) -> Result<u64> {
    let mut parts = pretty.split_whitespace();
    let value: f64 = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("Invalid input: {pretty:?}"))?
        .parse()?;
    let unit = parts.next().unwrap_or("B");

    let steps = UNITS
        .iter()
        .position(|candidate| candidate.eq_ignore_ascii_case(unit))
        .or_else(|| {
            IEC_UNITS
                .iter()
                .position(|candidate| candidate.eq_ignore_ascii_case(unit))
        })
        .ok_or_else(|| anyhow::anyhow!("Invalid unit: {unit}"))?;

    if value < 0. {
        return Err(anyhow::anyhow!("Negative size: {pretty:?}"));
    }

    Ok((value * 1024_f64.powi(steps as i32)) as u64)
}
