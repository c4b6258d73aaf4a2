//! Byte storage behind the span tree.
//!
//! A [`Buffer`] holds two regions: the original text, exactly as parsed, and
//! the boneyard, an append-only overflow region for text that mutations
//! create. Spans never own text; they hold [`Slice`]s into one of the two
//! regions. Slices are offsets rather than pointers, so a boneyard that
//! reallocates while growing never invalidates a slice handed out earlier.

use crate::errors::{Error, Result};
use std::collections::HashMap;
use std::fmt;

/// Which region a slice points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Original,
    Boneyard,
}

/// A half-open byte range `[start, end)` inside one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct Slice {
    pub region: Region,
    pub start: usize,
    pub end: usize,
}

impl Slice {
    pub fn new(region: Region, start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "slice start {start} past end {end}");
        Self { region, start, end }
    }

    /// Empty slice anchored at `at`.
    pub fn empty(region: Region, at: usize) -> Self {
        Self::new(region, at, at)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, other: &Slice) -> bool {
        self.region == other.region && self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let region = match self.region {
            Region::Original => "original",
            Region::Boneyard => "boneyard",
        };
        write!(f, "{region}[{}..{})", self.start, self.end)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Buffer {
    original: String,
    boneyard: String,
    // Repeated separators (" = ", ", ", "\n") are written once and shared.
    interned: HashMap<String, Slice>,
}

impl Buffer {
    pub fn new(original: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            boneyard: String::new(),
            interned: HashMap::new(),
        }
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn boneyard(&self) -> &str {
        &self.boneyard
    }

    pub fn region(&self, region: Region) -> &str {
        match region {
            Region::Original => &self.original,
            Region::Boneyard => &self.boneyard,
        }
    }

    /// Text behind a slice.
    ///
    /// Every slice this crate produces lies on UTF-8 boundaries inside its
    /// region; a foreign or corrupted slice yields an empty string rather
    /// than a panic.
    pub fn slice_text(&self, slice: &Slice) -> &str {
        self.region(slice.region)
            .get(slice.start..slice.end)
            .unwrap_or_default()
    }

    /// Whether `slice` lies inside its region on character boundaries.
    pub fn is_well_formed(&self, slice: &Slice) -> bool {
        self.region(slice.region)
            .get(slice.start..slice.end)
            .is_some()
    }

    /// Append `text` to the boneyard and return the slice covering it.
    pub fn append_boneyard(&mut self, text: &str) -> Result<Slice> {
        self.boneyard.try_reserve(text.len()).map_err(Error::NoMem)?;
        let start = self.boneyard.len();
        self.boneyard.push_str(text);
        Ok(Slice::new(Region::Boneyard, start, self.boneyard.len()))
    }

    /// Like [`append_boneyard`](Self::append_boneyard) but reuses an earlier
    /// copy of the same text.
    pub fn intern(&mut self, text: &str) -> Result<Slice> {
        if let Some(slice) = self.interned.get(text) {
            return Ok(*slice);
        }
        let slice = self.append_boneyard(text)?;
        self.interned.try_reserve(1).map_err(Error::NoMem)?;
        self.interned.insert(text.to_string(), slice);
        Ok(slice)
    }

    /// Bytes in the boneyard, reachable or not.
    pub fn boneyard_len(&self) -> usize {
        self.boneyard.len()
    }
}
