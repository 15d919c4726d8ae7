//! Tile index over the target sequence collection.
//!
//! Built once per target set, read-only afterwards; concurrent lookups
//! need no locking. The index maps each packed tile to its occurrence
//! list and answers "where might this query align" with candidate
//! clumps, trading alignments shorter than `min_match_tiles * tile_size`
//! identical bases for a search bounded by shared-tile density.

pub mod tile;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::AlignConfig;
use crate::error::{EngineError, Result};
use crate::sequence::{Alphabet, SeqId, SequenceStore};
use tile::{encode_tile, is_homopolymer};

/// A candidate region of similarity, found by shared-tile counting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clump {
    pub target: SeqId,
    pub t_start: usize,
    pub t_len: usize,
    /// Approximate extent within the query window that produced the hits.
    pub q_start: usize,
    pub q_len: usize,
}

/// Diagonal bucket width for hit accumulation. Hits whose
/// (target − query) offsets land within one bucket of each other are
/// counted toward the same candidate.
const DIAG_BUCKET: i64 = 256;

#[derive(Debug, Default, Clone)]
struct BucketHits {
    count: usize,
    t_min: usize,
    t_max: usize,
    q_min: usize,
    q_max: usize,
}

/// The tile index ("pattern space") over a set of target sequences.
pub struct TileIndex {
    tile_size: usize,
    postings: FxHashMap<u32, Vec<(SeqId, u32)>>,
    overused: FxHashSet<u32>,
    targets: Vec<SeqId>,
}

impl TileIndex {
    /// Build an index over `targets`.
    ///
    /// Tiles in `overused` (e.g. a precomputed list of genome-saturating
    /// k-mers) are never indexed. Without such a list, any tile whose
    /// occurrence count reaches `config.max_tile_occurrences` is flagged
    /// overused and its list discarded, bounding memory on repeat-dense
    /// targets. Tiles containing ambiguity codes are simply never keys.
    pub fn build(
        store: &SequenceStore,
        targets: &[SeqId],
        config: &AlignConfig,
        overused: Option<FxHashSet<u32>>,
    ) -> Result<TileIndex> {
        config.validate()?;
        let tile_size = config.tile_size;
        let mut overused = overused.unwrap_or_default();
        let mut postings: FxHashMap<u32, Vec<(SeqId, u32)>> = FxHashMap::default();

        for &target in targets {
            let seq = store.get(target)?;
            if seq.alphabet != Alphabet::Dna {
                return Err(EngineError::Config(format!(
                    "tile index requires nucleotide targets, {} is protein",
                    seq.name
                )));
            }
            let bases = seq.bases();
            if bases.len() < tile_size {
                continue;
            }
            for offset in 0..=bases.len() - tile_size {
                let Some(code) = encode_tile(bases, offset, tile_size) else {
                    continue;
                };
                if overused.contains(&code) || is_homopolymer(code, tile_size) {
                    continue;
                }
                let list = postings.entry(code).or_default();
                if list.len() + 1 >= config.max_tile_occurrences {
                    overused.insert(code);
                } else {
                    list.push((target, offset as u32));
                }
            }
        }

        // Lists that crossed the cap mid-build are dead weight.
        for code in &overused {
            postings.remove(code);
        }

        Ok(TileIndex {
            tile_size,
            postings,
            overused,
            targets: targets.to_vec(),
        })
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    pub fn targets(&self) -> &[SeqId] {
        &self.targets
    }

    /// Number of distinct indexed tiles.
    pub fn distinct_tiles(&self) -> usize {
        self.postings.len()
    }

    pub fn is_overused(&self, code: u32) -> bool {
        self.overused.contains(&code)
    }

    /// Find candidate clumps for a window of the query.
    ///
    /// Walks non-overlapping query tiles, accumulates hit counts per
    /// (target, diagonal bucket), and merges buckets that clear
    /// `min_match_tiles` (counting the adjacent bucket, so runs that
    /// straddle a bucket edge still qualify) into clumps when their
    /// target extents fall within `max_clump_gap` of each other. Clump
    /// extents get `min_match_tiles * tile_size` of padding on each side
    /// so the aligner sees the full neighborhood. Read-only; returns an
    /// empty list when nothing matches.
    pub fn find_candidate_clumps(
        &self,
        store: &SequenceStore,
        query: &[u8],
        window: std::ops::Range<usize>,
        config: &AlignConfig,
    ) -> Result<Vec<Clump>> {
        let tile_size = self.tile_size;
        let bases = query;
        let window_end = window.end.min(bases.len());
        if window.start >= window_end || window_end - window.start < tile_size {
            return Ok(Vec::new());
        }

        let mut buckets: FxHashMap<(SeqId, i64), BucketHits> = FxHashMap::default();
        let mut q_off = window.start;
        while q_off + tile_size <= window_end {
            if let Some(code) = encode_tile(bases, q_off, tile_size) {
                if !is_homopolymer(code, tile_size) {
                    if let Some(list) = self.postings.get(&code) {
                        for &(target, t_off) in list {
                            let t_off = t_off as usize;
                            let diag = t_off as i64 - q_off as i64;
                            let key = (target, diag.div_euclid(DIAG_BUCKET));
                            let hits = buckets.entry(key).or_default();
                            if hits.count == 0 {
                                hits.t_min = t_off;
                                hits.t_max = t_off + tile_size;
                                hits.q_min = q_off;
                                hits.q_max = q_off + tile_size;
                            } else {
                                hits.t_min = hits.t_min.min(t_off);
                                hits.t_max = hits.t_max.max(t_off + tile_size);
                                hits.q_min = hits.q_min.min(q_off);
                                hits.q_max = hits.q_max.max(q_off + tile_size);
                            }
                            hits.count += 1;
                        }
                    }
                }
            }
            q_off += tile_size;
        }

        // A bucket qualifies when it and its right neighbor together
        // reach the tile quorum.
        let mut significant: Vec<((SeqId, i64), BucketHits)> = buckets
            .iter()
            .filter(|(key, hits)| {
                let (target, diag) = **key;
                let right = buckets.get(&(target, diag + 1)).map_or(0, |h| h.count);
                let left = buckets.get(&(target, diag - 1)).map_or(0, |h| h.count);
                hits.count + right.max(left) >= config.min_match_tiles
            })
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        significant.sort_by_key(|((target, _), hits)| (*target, hits.t_min, hits.t_max));

        let padding = config.min_match_tiles * tile_size;
        let mut clumps: Vec<Clump> = Vec::new();
        for ((target, _), hits) in significant {
            if let Some(last) = clumps.last_mut() {
                if last.target == target
                    && hits.t_min <= last.t_start + last.t_len + config.max_clump_gap
                {
                    let t_end = (last.t_start + last.t_len).max(hits.t_max);
                    last.t_len = t_end - last.t_start;
                    let q_end = (last.q_start + last.q_len).max(hits.q_max);
                    last.q_start = last.q_start.min(hits.q_min);
                    last.q_len = q_end - last.q_start;
                    continue;
                }
            }
            clumps.push(Clump {
                target,
                t_start: hits.t_min,
                t_len: hits.t_max - hits.t_min,
                q_start: hits.q_min,
                q_len: hits.q_max - hits.q_min,
            });
        }

        for clump in &mut clumps {
            let t_size = store.get(clump.target)?.len();
            let t_end = (clump.t_start + clump.t_len + padding).min(t_size);
            clump.t_start = clump.t_start.saturating_sub(padding);
            clump.t_len = t_end - clump.t_start;
        }
        Ok(clumps)
    }
}
