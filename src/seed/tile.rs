//! Packed tile (k-mer) encoding.
//!
//! Tiles are 10 or 11 bases packed two bits per base into a `u32` key.
//! Any tile touching an ambiguity code has no encoding and therefore
//! never matches anything.

use rustc_hash::FxHashSet;

use crate::error::{EngineError, Result};
use crate::sequence::base_val;

/// Encode the tile starting at `start`, or `None` if it runs off the end
/// or contains an ambiguous base.
#[inline]
pub fn encode_tile(seq: &[u8], start: usize, tile_size: usize) -> Option<u32> {
    if start + tile_size > seq.len() {
        return None;
    }
    let mut code: u32 = 0;
    for &base in &seq[start..start + tile_size] {
        code = (code << 2) | base_val(base)?;
    }
    Some(code)
}

/// Decode a packed tile back into lowercase bases.
pub fn decode_tile(code: u32, tile_size: usize) -> Vec<u8> {
    let mut seq = vec![0u8; tile_size];
    let mut c = code;
    for slot in seq.iter_mut().rev() {
        *slot = match c & 3 {
            0 => b't',
            1 => b'c',
            2 => b'a',
            3 => b'g',
            _ => unreachable!(),
        };
        c >>= 2;
    }
    seq
}

/// True if the tile is a single-base homopolymer (poly-A/C/G/T).
///
/// Homopolymer tiles swamp the index with useless hits and are always
/// excluded, independent of the overuse cap.
pub fn is_homopolymer(code: u32, tile_size: usize) -> bool {
    let first = code >> (2 * (tile_size - 1)) & 3;
    let mut poly: u32 = 0;
    for _ in 0..tile_size {
        poly = (poly << 2) | first;
    }
    poly == code
}

/// Parse an overused-tile exclusion list: one k-mer string per line,
/// each exactly `tile_size` unambiguous bases.
pub fn parse_overused_list<S: AsRef<str>>(lines: &[S], tile_size: usize) -> Result<FxHashSet<u32>> {
    let mut set = FxHashSet::default();
    for line in lines {
        let word = line.as_ref().trim();
        if word.is_empty() {
            continue;
        }
        if word.len() != tile_size {
            return Err(EngineError::Config(format!(
                "overused tile '{word}' has length {}, expected {tile_size}",
                word.len()
            )));
        }
        let lower = word.to_ascii_lowercase();
        let code = encode_tile(lower.as_bytes(), 0, tile_size).ok_or_else(|| {
            EngineError::Config(format!("overused tile '{word}' contains ambiguous bases"))
        })?;
        set.insert(code);
    }
    Ok(set)
}
