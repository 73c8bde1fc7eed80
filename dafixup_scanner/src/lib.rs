use std::collections::HashMap;
use std::fmt::Display;

use anyhow::{bail, Error, Result};

/// A byte signature with a per-byte mask. Byte `i` of the haystack matches
/// when `data & mask[i] == sig[i]`, so a mask of `0x00` is a full wildcard
/// and `0x0f`/`0xf0` wildcard a single nibble.
#[derive(Clone, Eq, PartialEq)]
pub struct Pattern {
    sig: Vec<u8>,
    mask: Vec<u8>,
}

impl TryFrom<&str> for Pattern {
    type Error = Error;
    fn try_from(string: &str) -> Result<Self> {
        Self::new(string)
    }
}

impl Pattern {
    fn parse_hex_pattern(s: &str) -> Option<(u8, u8)> {
        if s.len() == 2 {
            let mut sig = 0;
            let mut mask = 0;
            for (i, b) in s.chars().enumerate() {
                let i = (1 - i) * 4;
                if let Some(digit) = b.to_digit(16) {
                    sig |= (digit as u8) << i;
                    mask |= 0xf << i;
                } else if b != '?' {
                    return None;
                }
            }
            Some((sig, mask))
        } else {
            None
        }
    }

    /// Parse a pattern of whitespace separated hex bytes, e.g.
    /// `"83 F8 03 74 ?? 83 F8 02"`.
    pub fn new<S: AsRef<str>>(s: S) -> Result<Self> {
        let mut sig = vec![];
        let mut mask = vec![];

        for w in s.as_ref().split_whitespace() {
            if let Some((s, m)) = Self::parse_hex_pattern(w) {
                sig.push(s);
                mask.push(m);
            } else {
                bail!("bad pattern word \"{}\"", w);
            }
        }
        if sig.is_empty() {
            bail!("pattern must match at least one byte");
        }
        if mask[0] != 0xff {
            bail!("pattern must not begin with a wildcard");
        }

        Ok(Self { sig, mask })
    }

    /// Create a fully concrete pattern from literal bytes.
    pub fn from_bytes(sig: Vec<u8>) -> Result<Self> {
        if sig.is_empty() {
            bail!("pattern must match at least one byte");
        }
        Ok(Self {
            mask: vec![0xff; sig.len()],
            sig,
        })
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.sig.len()
    }

    pub fn sig(&self) -> &[u8] {
        &self.sig
    }

    pub fn mask(&self) -> &[u8] {
        &self.mask
    }

    /// Indices of fully wildcarded bytes.
    pub fn wildcards(&self) -> Vec<usize> {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(i, m)| (*m == 0).then_some(i))
            .collect()
    }

    /// Whether the window starting at `index` matches. The caller must
    /// guarantee `index + self.len() <= data.len()`.
    #[inline(always)]
    pub fn is_match(&self, data: &[u8], index: usize) -> bool {
        for i in 0..self.len() {
            if data[index + i] & self.mask[i] != self.sig[i] {
                return false;
            }
        }
        true
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (sig, mask)) in self.sig.iter().zip(&self.mask).enumerate() {
            if i != 0 {
                write!(f, " ")?;
            }
            match mask {
                0x00 => write!(f, "??")?,
                0xff => write!(f, "{:02X}", sig)?,
                0x0f => write!(f, "?{:X}", sig & 0xf)?,
                0xf0 => write!(f, "{:X}?", sig >> 4)?,
                _ => write!(f, "??")?,
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pattern(\"{self}\")")
    }
}

/// Offset of the lowest match, scanning candidate windows in strictly
/// increasing order. Windows that would run past the end of `data` are never
/// considered, so the scan cannot read out of bounds.
pub fn first_match(pattern: &Pattern, data: &[u8]) -> Option<usize> {
    let last = data.len().checked_sub(pattern.len())?;
    memchr::memchr_iter(pattern.sig[0], &data[..last + 1]).find(|&i| pattern.is_match(data, i))
}

/// Every match offset of every pattern, binned per pattern in ascending
/// order. The bulk of the buffer is sharded across threads; a sequential
/// tail pass covers windows the longest pattern cannot occupy.
pub fn scan_pattern(patterns: &[&Pattern], data: &[u8]) -> Vec<Vec<usize>> {
    use rayon::prelude::*;

    let mut bins = patterns.iter().map(|_| vec![]).collect::<Vec<_>>();

    if patterns.is_empty() || data.is_empty() {
        return bins;
    }

    let mut anchor_bins: HashMap<u8, Vec<(usize, &Pattern)>> = Default::default();
    for (pi, p) in patterns.iter().enumerate() {
        anchor_bins.entry(p.sig[0]).or_default().push((pi, p));
    }
    let anchors = Vec::from_iter(anchor_bins.keys().copied());

    let max = patterns.iter().map(|p| p.len()).max().unwrap();

    // cut the middle short such that even the longest pattern doesn't have to
    // bounds check
    let middle = &data[0..data.len().saturating_sub(max - 1)];

    let chunk_size = (middle.len()
        / std::thread::available_parallelism().unwrap_or(std::num::NonZeroUsize::new(1).unwrap()))
    .max(1);
    let chunks: Vec<_> = middle.chunks(chunk_size).enumerate().collect();

    let mut matches: Vec<(usize, usize)> = chunks
        .par_iter()
        .map(|(index, chunk)| {
            let mut matches = vec![];
            let offset = index * chunk_size;

            for first in &anchors {
                for i in memchr::memchr_iter(*first, chunk) {
                    let j = offset + i;
                    for (pi, p) in &anchor_bins[first] {
                        if p.is_match(data, j) {
                            matches.push((*pi, j));
                        }
                    }
                }
            }
            matches
        })
        .flatten()
        .collect();

    // tail: shorter patterns still fit where the longest cannot
    let start = middle.len();
    for (pi, p) in patterns.iter().enumerate() {
        let Some(last) = data.len().checked_sub(p.len()) else {
            continue;
        };
        for i in start..last + 1 {
            if p.is_match(data, i) {
                matches.push((pi, i));
            }
        }
    }

    for (pi, offset) in matches {
        bins[pi].push(offset);
    }
    for bin in &mut bins {
        bin.sort_unstable();
    }

    bins
}
