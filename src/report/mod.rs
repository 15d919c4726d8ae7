//! Alignment summaries: the counts, spans and quality measure the
//! reporting layer consumes.

use crate::align::block::AlignBlock;
use crate::config::{AlignConfig, Stringency};
use crate::sequence::SeqId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn as_char(self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }
}

/// Blocks at the chain ends shorter than this (and separated from the
/// main body) are excluded from the solid span, keeping those query
/// bases available to align elsewhere.
const MIN_SOLID_SEGMENT: usize = 11;

/// Everything the downstream reporter needs about one accepted
/// alignment.
#[derive(Debug, Clone)]
pub struct AlignmentSummary {
    pub query: SeqId,
    pub target: SeqId,
    pub strand: Strand,
    /// Ascending block list in aligned-strand coordinates.
    pub blocks: Vec<AlignBlock>,
    pub matches: usize,
    pub rep_matches: usize,
    pub mismatches: usize,
    pub n_count: usize,
    pub q_insert_count: usize,
    pub q_insert_bases: usize,
    pub t_insert_count: usize,
    pub t_insert_bases: usize,
    /// Query span in forward-strand convention (reverse hits flipped).
    pub q_start: usize,
    pub q_end: usize,
    pub t_start: usize,
    pub t_end: usize,
    /// Query span of the solid core, forward-strand convention.
    pub solid_q_start: usize,
    pub solid_q_end: usize,
    pub score: i64,
    pub milli_bad: usize,
}

/// Parts-per-thousand badness: mismatches plus insertions plus span
/// disagreement, per aligned base. Under cDNA stringency target-side
/// insertions are expected introns and do not count, and neither does a
/// longer target span.
pub fn milli_bad(
    matches: usize,
    rep_matches: usize,
    mismatches: usize,
    q_insert_count: usize,
    t_insert_count: usize,
    q_span: usize,
    t_span: usize,
    stringency: Stringency,
) -> usize {
    let aligned = matches + rep_matches;
    if aligned == 0 {
        return 1000;
    }
    let is_cdna = stringency.is_cdna();
    let insert_count = q_insert_count + if is_cdna { 0 } else { t_insert_count };
    let size_diff = if q_span >= t_span {
        q_span - t_span
    } else if is_cdna {
        0
    } else {
        t_span - q_span
    };
    1000 * (mismatches + insert_count + size_diff) / aligned
}

/// First block index (in iteration order) where the chain becomes
/// solid: a long segment, or a run of nearby segments adding up.
fn solid_anchor<'b>(iter: impl Iterator<Item = (usize, &'b AlignBlock)>) -> Option<usize> {
    let mut run_total = 0;
    let mut prev: Option<&AlignBlock> = None;
    for (i, block) in iter {
        let seg = block.len();
        run_total += seg;
        if seg > MIN_SOLID_SEGMENT || run_total > MIN_SOLID_SEGMENT * 2 {
            return Some(i);
        }
        if let Some(p) = prev {
            let gap = block.q_start.max(p.q_end) - p.q_end.min(block.q_start);
            if gap > 1 {
                run_total = 0;
            }
        }
        prev = Some(block);
    }
    None
}

/// Query extent of the solid part of the chain: strips unanchored
/// micro-blocks off both ends the way the reporting layer expects.
fn solid_span(blocks: &[AlignBlock]) -> Option<(usize, usize)> {
    let start_ix = solid_anchor(blocks.iter().enumerate())?;
    let end_ix = solid_anchor(blocks.iter().enumerate().rev())?;
    if end_ix < start_ix {
        return None;
    }
    let start = blocks[start_ix].q_start;
    let end = blocks[end_ix].q_end;
    if end - start >= MIN_SOLID_SEGMENT {
        Some((start, end))
    } else {
        None
    }
}

/// Summarize a stitched chain against its sequences.
///
/// `q` and `t` are the aligned-orientation bases the block coordinates
/// refer to (for reverse-strand hits, `q` is the reverse complement);
/// `q_full_len` is the query length, used to flip reverse-strand spans
/// into forward convention. `repeat_mask` marks target bases that score
/// as repeat matches.
#[allow(clippy::too_many_arguments)]
pub fn summarize(
    query: SeqId,
    target: SeqId,
    blocks: Vec<AlignBlock>,
    score: i64,
    q: &[u8],
    t: &[u8],
    q_full_len: usize,
    repeat_mask: Option<&[bool]>,
    strand: Strand,
    stringency: Stringency,
) -> AlignmentSummary {
    let mut matches = 0;
    let mut rep_matches = 0;
    let mut mismatches = 0;
    let mut n_count = 0;
    for block in &blocks {
        for i in 0..block.len() {
            let qb = q[block.q_start + i];
            let tb = t[block.t_start + i];
            if qb == b'n' || tb == b'n' {
                n_count += 1;
            } else if qb == tb {
                if repeat_mask.is_some_and(|m| m[block.t_start + i]) {
                    rep_matches += 1;
                } else {
                    matches += 1;
                }
            } else {
                mismatches += 1;
            }
        }
    }

    let mut q_insert_count = 0;
    let mut q_insert_bases = 0;
    let mut t_insert_count = 0;
    let mut t_insert_bases = 0;
    for w in blocks.windows(2) {
        let q_gap = w[1].q_start - w[0].q_end;
        let t_gap = w[1].t_start - w[0].t_end;
        if q_gap > 0 {
            q_insert_count += 1;
            q_insert_bases += q_gap;
        }
        if t_gap > 0 {
            t_insert_count += 1;
            t_insert_bases += t_gap;
        }
    }

    let aligned_q_start = blocks.first().map_or(0, |b| b.q_start);
    let aligned_q_end = blocks.last().map_or(0, |b| b.q_end);
    let t_start = blocks.first().map_or(0, |b| b.t_start);
    let t_end = blocks.last().map_or(0, |b| b.t_end);

    let (q_start, q_end) = match strand {
        Strand::Forward => (aligned_q_start, aligned_q_end),
        Strand::Reverse => (q_full_len - aligned_q_end, q_full_len - aligned_q_start),
    };
    let (solid_raw_start, solid_raw_end) =
        solid_span(&blocks).unwrap_or((aligned_q_start, aligned_q_end));
    let (solid_q_start, solid_q_end) = match strand {
        Strand::Forward => (solid_raw_start, solid_raw_end),
        Strand::Reverse => (q_full_len - solid_raw_end, q_full_len - solid_raw_start),
    };

    let milli_bad = milli_bad(
        matches,
        rep_matches,
        mismatches,
        q_insert_count,
        t_insert_count,
        aligned_q_end - aligned_q_start,
        t_end - t_start,
        stringency,
    );

    AlignmentSummary {
        query,
        target,
        strand,
        blocks,
        matches,
        rep_matches,
        mismatches,
        n_count,
        q_insert_count,
        q_insert_bases,
        t_insert_count,
        t_insert_bases,
        q_start,
        q_end,
        t_start,
        t_end,
        solid_q_start,
        solid_q_end,
        score,
        milli_bad,
    }
}

impl AlignmentSummary {
    /// Acceptance filter: enough aligned bases, and badness under the
    /// configured ceiling. Rejection is silent by design.
    pub fn accepted(&self, config: &AlignConfig) -> bool {
        self.matches + self.rep_matches >= config.min_bases
            && self.milli_bad <= config.max_bad_parts_per_thousand
    }
}
