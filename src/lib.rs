//! tilestitch: a tile-seeded approximate local alignment engine.
//!
//! Three cooperating pieces find where a small query sequence aligns in
//! a large target collection:
//!
//! - [`seed::TileIndex`] maps packed k-mer tiles to their target
//!   occurrences and turns shared-tile density into candidate clumps,
//!   skipping overused tiles so repeat regions cannot blow up the
//!   search.
//! - [`align::LocalAligner`] produces a best-effort gapped local
//!   alignment of a query window against a clump, as an ordered chain
//!   of exact-match blocks, under one of four stringency regimes.
//! - [`stitch::ChainStitcher`] chains the fragment pool for one
//!   query/target pair into optimal non-overlapping alignments by
//!   dynamic programming, resolving block overlaps at the base level
//!   and sliding intron boundaries onto splice consensus.
//!
//! [`pipeline::Pipeline`] wires the three together for whole queries on
//! both strands; [`report::AlignmentSummary`] is the output contract.

pub mod align;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod seed;
pub mod sequence;
pub mod stitch;

pub use align::{AlignBlock, LocalAligner};
pub use config::{AlignConfig, Stringency};
pub use error::EngineError;
pub use pipeline::Pipeline;
pub use report::AlignmentSummary;
pub use seed::TileIndex;
pub use sequence::{Sequence, SequenceStore};
pub use stitch::{Bundle, ChainStitcher};
