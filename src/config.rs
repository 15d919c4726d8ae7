//! Alignment configuration and stringency policies.

use crate::error::{EngineError, Result};

/// Alignment stringency regime.
///
/// Controls gap-penalty coefficients and block-merge thresholds in both
/// the local aligner and the stitcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stringency {
    /// No mismatches or gaps permitted; a single block or nothing.
    Exact,
    /// cDNA against genomic: one-sided target gaps (introns) are nearly
    /// free when flanked by splice consensus; everything else penalized.
    Cdna,
    /// Symmetric gap penalties, tuned for same-species genomic-genomic
    /// comparison.
    Tight,
    /// Relaxed divergence limits for more distant homology.
    Loose,
}

impl Stringency {
    pub fn is_cdna(self) -> bool {
        matches!(self, Stringency::Cdna)
    }
}

/// Engine configuration.
///
/// Constructed via [`AlignConfig::new`], which validates the packed-tile
/// assumptions up front so a bad setup fails before any work is done.
#[derive(Debug, Clone)]
pub struct AlignConfig {
    /// Tile (k-mer) length; the packed encoding supports 10 or 11.
    pub tile_size: usize,
    /// Minimum shared tiles before a diagonal bucket becomes a clump.
    pub min_match_tiles: usize,
    /// Maximum target-coordinate gap when merging nearby tile buckets
    /// into one clump.
    pub max_clump_gap: usize,
    /// Tiles occurring at least this often in the targets are dropped
    /// from the index unless an explicit overused list is supplied.
    pub max_tile_occurrences: usize,
    pub stringency: Stringency,
    /// Minimum aligned bases (matches + repeat matches) to report.
    pub min_bases: usize,
    /// Reject alignments with a milli-bad value above this.
    pub max_bad_parts_per_thousand: usize,
    /// Skip clumps where the target sequence is the query itself
    /// (self-vs-self assembly comparisons).
    pub avoid_self_self: bool,
    /// Cut stitched chains at target gaps larger than this.
    pub max_intron: usize,
    /// Bundles with more blocks than this are trimmed to the
    /// highest-scoring subset before graph construction.
    pub max_bundle_blocks: usize,
    /// Maximum stitched alignments to recover per bundle.
    pub max_alignments_per_bundle: usize,
    /// Show an indicatif progress bar during batch runs.
    pub show_progress: bool,
}

pub const DEFAULT_MAX_INTRON: usize = 750_000;

impl AlignConfig {
    pub fn new(tile_size: usize, stringency: Stringency) -> Result<Self> {
        if tile_size != 10 && tile_size != 11 {
            return Err(EngineError::Config(format!(
                "tile size must be 10 or 11, got {tile_size}"
            )));
        }
        Ok(AlignConfig {
            tile_size,
            min_match_tiles: 4,
            max_clump_gap: 32 * 1024,
            max_tile_occurrences: 1024,
            stringency,
            min_bases: 25,
            max_bad_parts_per_thousand: 100,
            avoid_self_self: false,
            max_intron: DEFAULT_MAX_INTRON,
            max_bundle_blocks: 3000,
            max_alignments_per_bundle: 16,
            show_progress: false,
        })
    }

    /// Validate cross-field constraints not expressible at construction.
    pub fn validate(&self) -> Result<()> {
        if self.tile_size != 10 && self.tile_size != 11 {
            return Err(EngineError::Config(format!(
                "tile size must be 10 or 11, got {}",
                self.tile_size
            )));
        }
        if self.min_match_tiles == 0 {
            return Err(EngineError::Config(
                "min_match_tiles must be at least 1".into(),
            ));
        }
        if self.max_bad_parts_per_thousand > 1000 {
            return Err(EngineError::Config(format!(
                "max_bad_parts_per_thousand is parts per thousand, got {}",
                self.max_bad_parts_per_thousand
            )));
        }
        if self.max_bundle_blocks < 2 {
            return Err(EngineError::Config(
                "max_bundle_blocks must allow at least 2 blocks".into(),
            ));
        }
        Ok(())
    }
}
