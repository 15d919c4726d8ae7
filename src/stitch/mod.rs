//! Stitching: glue a bundle of raw alignment chains for one
//! query/target pair into the optimal non-overlapping chains.
//!
//! The raw chains come from overlapping query windows and from multiple
//! candidate clumps, so they duplicate and contradict each other. One
//! pass normalizes them into a flat block pool; a dynamic program over
//! the stitch graph extracts the best chain; blocks it did not use go
//! back into the pool, and the loop repeats to recover secondary
//! alignments until the pool's best falls under the acceptance floor.

mod graph;

pub use graph::find_crossover;

use log::warn;

use crate::align::block::{self, AlignBlock};
use crate::align::local::LocalAligner;
use crate::align::scorer;
use crate::config::AlignConfig;
use crate::sequence::SeqId;

/// The raw alignment chains for one (query, target) pair, awaiting
/// stitching.
#[derive(Debug, Default)]
pub struct Bundle {
    pub query: SeqId,
    pub target: SeqId,
    pub chains: Vec<Vec<AlignBlock>>,
}

impl Bundle {
    pub fn new(query: SeqId, target: SeqId) -> Self {
        Bundle {
            query,
            target,
            chains: Vec::new(),
        }
    }

    pub fn push(&mut self, chain: Vec<AlignBlock>) {
        if !chain.is_empty() {
            self.chains.push(chain);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    fn block_count(&self) -> usize {
        self.chains.iter().map(|c| c.len()).sum()
    }
}

/// One stitched alignment chain and its score.
#[derive(Debug, Clone)]
pub struct StitchedChain {
    pub blocks: Vec<AlignBlock>,
    pub score: i64,
}

/// Everything a stitch run produced for one bundle.
#[derive(Debug, Default)]
pub struct StitchOutcome {
    /// Accepted chains, best first.
    pub chains: Vec<StitchedChain>,
    /// True when the bundle blew the block cap and was trimmed to its
    /// highest-scoring subset; results are best-effort, not complete.
    pub truncated: bool,
}

/// Floor applied to the stitch-time score threshold. Scores improve as
/// chains merge, so rejecting hard here would discard fragments that
/// would have stitched into something reportable.
const STITCH_MIN_SCORE: i64 = 20;

/// Gaps at least this big on both sides are worth a middle-exon search.
const MIDDLE_EXON_MIN_GAP: usize = 3;

pub struct ChainStitcher<'c> {
    config: &'c AlignConfig,
}

impl<'c> ChainStitcher<'c> {
    pub fn new(config: &'c AlignConfig) -> Self {
        ChainStitcher { config }
    }

    /// Stitch a bundle against its query and target bases.
    ///
    /// `q` and `t` are the same slices the bundle's block coordinates
    /// refer to. Returns accepted chains best-first; an empty outcome is
    /// the normal "nothing good enough" result.
    pub fn stitch(&self, bundle: Bundle, q: &[u8], t: &[u8], is_protein: bool) -> StitchOutcome {
        let mut outcome = StitchOutcome::default();
        if bundle.is_empty() {
            return outcome;
        }
        let stringency = self.config.stringency;
        let min_score = (self.config.min_bases as i64).min(STITCH_MIN_SCORE);

        let total = bundle.block_count();
        let mut pool: Vec<AlignBlock> = Vec::with_capacity(total);
        for chain in bundle.chains {
            pool.extend(chain);
        }
        block::sort_query_first(&mut pool);
        normalize(&mut pool);

        let mut first_time = true;
        let mut remaining = self.config.max_alignments_per_bundle;
        while !pool.is_empty() && remaining > 0 {
            if pool.len() > self.config.max_bundle_blocks {
                trim_to_best(&mut pool, self.config.max_bundle_blocks, q, t, is_protein);
                warn!(
                    "bundle exceeded {} blocks; trimmed to highest-scoring subset",
                    self.config.max_bundle_blocks
                );
                outcome.truncated = true;
            }

            let best = graph::find_best_chain(&pool, q, t, stringency, is_protein);
            let mut chain = best.blocks;
            pool = best.leftovers;

            block::merge_query_overlaps(&mut chain);
            block::remove_empty(&mut chain);
            if chain.is_empty() {
                break;
            }
            block::merge_target_overlaps(&mut chain);
            block::remove_empty(&mut chain);
            force_monotonic(&mut chain, q, t, is_protein);

            if first_time && stringency.is_cdna() && !is_protein {
                self.recover_middle_exons(&mut chain, q, t);
                block::merge_query_overlaps(&mut chain);
                force_monotonic(&mut chain, q, t, is_protein);
            }

            self.cut_at_big_introns(&mut chain, &mut pool);
            if !is_protein {
                scorer::slide_introns(&mut chain, q, t);
            }
            block::remove_empty(&mut chain);
            if chain.is_empty() {
                break;
            }

            let score = scorer::chain_score_bio(&chain, q, t, stringency, is_protein);
            if score < min_score {
                // The pool's best is under the floor; nothing later in
                // the worklist can do better.
                break;
            }
            outcome.chains.push(StitchedChain { blocks: chain, score });
            remaining -= 1;
            first_time = false;
        }
        outcome
    }

    /// Between well-separated stitched blocks, run the local aligner on
    /// the gap and splice in whatever monotonic sub-chain it finds.
    /// Recovers small exons that fell between clump windows.
    fn recover_middle_exons(&self, chain: &mut Vec<AlignBlock>, q: &[u8], t: &[u8]) {
        let aligner = LocalAligner::new(self.config.stringency);
        let mut spliced: Vec<AlignBlock> = Vec::with_capacity(chain.len());
        for i in 0..chain.len() {
            if i > 0 {
                let left = chain[i - 1];
                let right = chain[i];
                if right.q_start >= left.q_end + MIDDLE_EXON_MIN_GAP
                    && right.t_start >= left.t_end + MIDDLE_EXON_MIN_GAP
                {
                    if let Some(mut sub) =
                        aligner.align(&q[left.q_end..right.q_start], &t[left.t_end..right.t_start])
                    {
                        for b in &mut sub {
                            b.q_start += left.q_end;
                            b.q_end += left.q_end;
                            b.t_start += left.t_end;
                            b.t_end += left.t_end;
                        }
                        sub.retain(|b| !b.is_empty());
                        if block::is_monotonic(&sub) {
                            spliced.extend(sub);
                        }
                    }
                }
            }
            spliced.push(chain[i]);
        }
        *chain = spliced;
    }

    /// Cut the chain at the first target gap over `max_intron`; the
    /// severed tail rejoins the pool for separate stitching.
    fn cut_at_big_introns(&self, chain: &mut Vec<AlignBlock>, pool: &mut Vec<AlignBlock>) {
        let max_intron = self.config.max_intron as i64;
        let cut_at = chain.windows(2).position(|w| {
            w[1].t_start as i64 - w[0].t_end as i64 > max_intron
        });
        if let Some(at) = cut_at {
            let tail = chain.split_off(at + 1);
            pool.extend(tail);
            block::sort_query_first(pool);
        }
    }
}

/// Flatten-normalization: fold same-diagonal blocks that overlap or
/// abut into one spanning block. Overlapping query windows produce many
/// duplicated and staggered copies of the same match; folding them here
/// keeps the graph free of same-diagonal overlap edges, which price
/// terribly. Restores query order afterwards.
fn normalize(pool: &mut Vec<AlignBlock>) {
    pool.sort_by_key(|b| (b.diagonal(), b.q_start));
    let mut merged: Vec<AlignBlock> = Vec::with_capacity(pool.len());
    for &b in pool.iter() {
        if let Some(last) = merged.last_mut() {
            if last.diagonal() == b.diagonal() && b.q_start <= last.q_end {
                last.q_end = last.q_end.max(b.q_end);
                last.t_end = last.t_end.max(b.t_end);
                continue;
            }
        }
        merged.push(b);
    }
    *pool = merged;
    block::sort_query_first(pool);
}

/// Keep only the `cap` highest-scoring blocks, restoring query order.
fn trim_to_best(pool: &mut Vec<AlignBlock>, cap: usize, q: &[u8], t: &[u8], is_protein: bool) {
    pool.sort_by_cached_key(|b| {
        std::cmp::Reverse(scorer::bio_match_score(
            is_protein,
            &q[b.q_start..b.q_end],
            &t[b.t_start..b.t_end],
        ))
    });
    pool.truncate(cap);
    block::sort_query_first(pool);
}

/// Drop blocks that violate strictly increasing order in either
/// coordinate, cheapest first. Rarely needed; crossover trims keep DP
/// output monotonic except around aggressive target overlaps.
fn force_monotonic(chain: &mut Vec<AlignBlock>, q: &[u8], t: &[u8], is_protein: bool) {
    while !block::is_monotonic(chain) {
        let mut worst: Option<(usize, i64)> = None;
        for i in 1..chain.len() {
            if chain[i - 1].q_end > chain[i].q_start || chain[i - 1].t_end > chain[i].t_start {
                for candidate in [i - 1, i] {
                    let b = chain[candidate];
                    let s = scorer::bio_match_score(
                        is_protein,
                        &q[b.q_start..b.q_end],
                        &t[b.t_start..b.t_end],
                    );
                    if worst.map_or(true, |(_, ws)| s < ws) {
                        worst = Some((candidate, s));
                    }
                }
            }
        }
        match worst {
            Some((idx, _)) => {
                chain.remove(idx);
            }
            None => break,
        }
    }
}
