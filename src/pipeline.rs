//! The engine boundary: from a query sequence to accepted alignment
//! summaries.
//!
//! The driver that owns file discovery and report formatting lives
//! outside this crate; it hands us a built store and index and consumes
//! [`AlignmentSummary`] values. Each (query, strand) task is
//! independent, allocates its own bundles, and shares nothing but the
//! read-only index, so the batch entry point fans tasks out with rayon.

use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::align::local::LocalAligner;
use crate::config::AlignConfig;
use crate::error::{EngineError, Result};
use crate::report::{self, AlignmentSummary, Strand};
use crate::seed::TileIndex;
use crate::sequence::{Alphabet, SeqId, SequenceStore};
use crate::stitch::{Bundle, ChainStitcher};

/// Query windows longer than this are cut down to the preferred size.
const MAX_WINDOW: usize = 700;
const PREFERRED_WINDOW: usize = 500;
/// Consecutive windows overlap by this much so alignments spanning a
/// window edge appear (in fragments) in both; stitching reassembles
/// them.
const WINDOW_OVERLAP: usize = 250;

pub struct Pipeline<'a> {
    store: &'a SequenceStore,
    index: &'a TileIndex,
    config: &'a AlignConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a SequenceStore, index: &'a TileIndex, config: &'a AlignConfig) -> Self {
        Pipeline {
            store,
            index,
            config,
        }
    }

    /// Align one query on both strands and return every accepted
    /// alignment, ascending by target then forward-strand query start.
    pub fn align_query(&self, query_id: SeqId) -> Result<Vec<AlignmentSummary>> {
        let query = self.store.get(query_id)?;
        if query.alphabet != Alphabet::Dna {
            return Err(EngineError::Config(format!(
                "pipeline queries must be nucleotide, {} is protein",
                query.name
            )));
        }
        let mut summaries = Vec::new();
        self.align_strand(query_id, query.bases(), Strand::Forward, &mut summaries)?;
        let reversed = query.reverse_complement();
        self.align_strand(query_id, reversed.bases(), Strand::Reverse, &mut summaries)?;
        summaries.sort_by_key(|s| (s.target, s.q_start, s.t_start));
        Ok(summaries)
    }

    /// Align a batch of queries in parallel over the shared index.
    ///
    /// A data inconsistency aborts only the task that hit it (with a
    /// warning); the rest of the batch proceeds.
    pub fn align_batch(&self, queries: &[SeqId]) -> anyhow::Result<Vec<AlignmentSummary>> {
        let bar = if self.config.show_progress {
            let bar = ProgressBar::new(queries.len() as u64);
            bar.set_style(ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}",
            )?);
            Some(bar)
        } else {
            None
        };

        let results: Vec<Vec<AlignmentSummary>> = queries
            .par_iter()
            .map(|&query_id| {
                let out = match self.align_query(query_id) {
                    Ok(summaries) => summaries,
                    Err(err) => {
                        warn!("skipping query {query_id}: {err}");
                        Vec::new()
                    }
                };
                if let Some(bar) = &bar {
                    bar.inc(1);
                }
                out
            })
            .collect();
        if let Some(bar) = &bar {
            bar.finish();
        }
        Ok(results.into_iter().flatten().collect())
    }

    /// One strand of one query: window, seed, align, bundle, stitch,
    /// summarize, filter.
    fn align_strand(
        &self,
        query_id: SeqId,
        bases: &[u8],
        strand: Strand,
        summaries: &mut Vec<AlignmentSummary>,
    ) -> Result<()> {
        let query_name = &self.store.get(query_id)?.name;
        let aligner = LocalAligner::new(self.config.stringency);
        let mut bundles: FxHashMap<SeqId, Bundle> = FxHashMap::default();

        let total = bases.len();
        let mut window_start = 0;
        loop {
            let remaining = total - window_start;
            let window_len = if remaining > MAX_WINDOW {
                PREFERRED_WINDOW
            } else {
                remaining
            };
            let window = window_start..window_start + window_len;
            let query_window = &bases[window.clone()];

            let clumps =
                self.index
                    .find_candidate_clumps(self.store, bases, window.clone(), self.config)?;

            for clump in clumps {
                let target_seq = self.store.get(clump.target)?;
                if self.config.avoid_self_self && target_seq.name == *query_name {
                    continue;
                }
                let t_window = clump.t_start..(clump.t_start + clump.t_len).min(target_seq.len());
                if let Some(mut chain) =
                    aligner.align(query_window, &target_seq.bases()[t_window.clone()])
                {
                    for block in &mut chain {
                        block.q_start += window.start;
                        block.q_end += window.start;
                        block.t_start += t_window.start;
                        block.t_end += t_window.start;
                    }
                    bundles
                        .entry(clump.target)
                        .or_insert_with(|| Bundle::new(query_id, clump.target))
                        .push(chain);
                }
            }

            window_start += window_len;
            if window_start >= total {
                break;
            }
            window_start = window_start.saturating_sub(WINDOW_OVERLAP);
        }

        let stitcher = ChainStitcher::new(self.config);
        let mut pairs: Vec<(SeqId, Bundle)> = bundles.into_iter().collect();
        pairs.sort_by_key(|(id, _)| *id);
        for (target_id, bundle) in pairs {
            let target_seq = self.store.get(target_id)?;
            let outcome = stitcher.stitch(bundle, bases, target_seq.bases(), false);
            for stitched in outcome.chains {
                let summary = report::summarize(
                    query_id,
                    target_id,
                    stitched.blocks,
                    stitched.score,
                    bases,
                    target_seq.bases(),
                    total,
                    self.store.repeat_mask(target_id),
                    strand,
                    self.config.stringency,
                );
                if summary.accepted(self.config) {
                    summaries.push(summary);
                }
            }
        }
        Ok(())
    }
}
