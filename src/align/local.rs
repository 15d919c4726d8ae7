//! Heuristic gapped local alignment of a small query against a candidate
//! target region.
//!
//! The search runs in stages: exact match short-circuit; selection of
//! statistically improbable query oligos ("tiles") and collection of all
//! their target occurrences; weaving the hits into a best candidate chain
//! by diagonal lumping and region merging; recursive refinement between
//! tiles at a relaxed probability budget; then block expansion (through
//! ambiguity codes, by fuzzy windows, and across single skips) until the
//! blocks abut or extension stops paying. All block surgery happens on an
//! owned `Vec<AlignBlock>` sorted by query start.

use crate::align::block::{self, AlignBlock};
use crate::align::scorer;
use crate::config::Stringency;

/// Hits closer than this to a lump's diagonal join it.
const LUMP_DIAG_SLOP: i64 = 2;
/// Proto-region lists longer than this are thinned before merging.
const MAX_PROTO_REGIONS: usize = 200;
/// Overlap compatibility divisor for proto-region merging: regions may
/// share at most a quarter of the smaller side.
const MERGE_OVERLAP_DIVISOR: usize = 4;
/// Recursion guard for between-tile refinement. The probability budget
/// doubles and the windows shrink every level, so this is never reached
/// on real sequences.
const MAX_WEAVE_DEPTH: usize = 40;

/// Smallest exponent `p` with `4^p >= x`.
fn next_power_of_four(x: usize) -> usize {
    let mut p = 0;
    let mut v: usize = 1;
    while v < x {
        v *= 4;
        p += 1;
    }
    p
}

/// Base composition of the target region, as probabilities.
fn make_freq_table(t: &[u8]) -> [f64; 4] {
    let mut histo = [0usize; 4];
    for &b in t {
        if let Some(v) = crate::sequence::base_val(b) {
            histo[v as usize] += 1;
        }
    }
    let total: usize = histo.iter().sum();
    if total == 0 {
        return [0.25; 4];
    }
    let mut freq = [0.0; 4];
    for i in 0..4 {
        freq[i] = histo[i] as f64 / total as f64;
    }
    freq
}

/// Probability of this oligo arising from the background composition.
fn oligo_prob(oligo: &[u8], freq: &[f64; 4]) -> f64 {
    let mut prob = 1.0;
    for &b in oligo {
        if let Some(v) = crate::sequence::base_val(b) {
            prob *= freq[v as usize];
        }
    }
    prob
}

/// Find the shortest prefix region of `needle` whose random-match
/// probability drops below `max_prob`. Ambiguous bases restart the run.
fn find_improbable_oligo(
    needle: &[u8],
    max_prob: f64,
    freq: &[f64; 4],
) -> Option<(usize, usize, f64)> {
    let mut total_prob = 1.0;
    let mut start = 0;
    for (i, &b) in needle.iter().enumerate() {
        match crate::sequence::base_val(b) {
            None => {
                total_prob = 1.0;
                start = i + 1;
            }
            Some(v) => {
                total_prob *= freq[v as usize];
                if total_prob <= max_prob {
                    return Some((start, i - start + 1, total_prob));
                }
            }
        }
    }
    None
}

/// True if the oligo repeats with period 1, 2, or any period up to half
/// its length. Repetitive oligos make worthless tiles.
fn has_internal_repeat(oligo: &[u8]) -> bool {
    let len = oligo.len();
    let max_rep = (len + 1) / 2;
    for rep_size in 1..=max_rep {
        if oligo[rep_size..]
            .iter()
            .enumerate()
            .all(|(i, &b)| b == oligo[i % rep_size])
        {
            return true;
        }
    }
    false
}

/// Find an improbable oligo free of short internal repeats, searching
/// forward past any repetitive candidates. Returns window-relative
/// (offset, length).
fn find_good_oligo(
    needle: &[u8],
    from: usize,
    max_prob: f64,
    freq: &[f64; 4],
) -> Option<(usize, usize)> {
    let mut base = from;
    loop {
        let (start, len, _prob) = find_improbable_oligo(&needle[base..], max_prob, freq)?;
        let abs_start = base + start;
        if has_internal_repeat(&needle[abs_start..abs_start + len]) {
            base = abs_start + len;
            if base >= needle.len() {
                return None;
            }
        } else {
            return Some((abs_start, len));
        }
    }
}

/// All occurrences of `pattern` in `hay` starting at or after `from`.
fn occurrences(pattern: &[u8], hay: &[u8], from: usize) -> Vec<usize> {
    let mut found = Vec::new();
    if pattern.is_empty() || hay.len() < pattern.len() {
        return found;
    }
    let mut at = from;
    while at + pattern.len() <= hay.len() {
        match hay[at..]
            .windows(pattern.len())
            .position(|w| w == pattern)
        {
            Some(rel) => {
                found.push(at + rel);
                at = at + rel + pattern.len();
            }
            None => break,
        }
    }
    found
}

/// First exact occurrence of `needle` in `hay`.
fn exact_find(needle: &[u8], hay: &[u8]) -> Option<usize> {
    if needle.is_empty() || hay.len() < needle.len() {
        return None;
    }
    hay.windows(needle.len()).position(|w| w == needle)
}

/// Grow a block outward as far as the sequences agree exactly, within
/// the given window.
fn expand_exact(block: &mut AlignBlock, q: &[u8], t: &[u8], w: &Window) {
    while block.q_start > w.q_lo && block.t_start > w.t_lo && q[block.q_start - 1] == t[block.t_start - 1]
    {
        block.q_start -= 1;
        block.t_start -= 1;
    }
    while block.q_end < w.q_hi && block.t_end < w.t_hi && q[block.q_end] == t[block.t_end] {
        block.q_end += 1;
        block.t_end += 1;
    }
}

/// The window a block may expand inside: the span between its chain
/// neighbors, or the alignment bounds at the ends.
#[derive(Debug, Clone, Copy)]
struct Window {
    q_lo: usize,
    q_hi: usize,
    t_lo: usize,
    t_hi: usize,
}

// ---------------------------------------------------------------------------
// Weave: turn raw tile hits into the best-looking candidate chain.
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ProtoRegion {
    blocks: Vec<AlignBlock>,
    q_start: usize,
    q_end: usize,
    t_start: usize,
    t_end: usize,
    score: i64,
}

impl ProtoRegion {
    fn from_blocks(blocks: Vec<AlignBlock>) -> Self {
        let q_start = blocks.iter().map(|b| b.q_start).min().unwrap_or(0);
        let q_end = blocks.iter().map(|b| b.q_end).max().unwrap_or(0);
        let t_start = blocks.iter().map(|b| b.t_start).min().unwrap_or(0);
        let t_end = blocks.iter().map(|b| b.t_end).max().unwrap_or(0);
        ProtoRegion {
            blocks,
            q_start,
            q_end,
            t_start,
            t_end,
            score: 0,
        }
    }

    fn matched_bases(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum()
    }

    fn absorb(&mut self, other: ProtoRegion) {
        self.q_start = self.q_start.min(other.q_start);
        self.q_end = self.q_end.max(other.q_end);
        self.t_start = self.t_start.min(other.t_start);
        self.t_end = self.t_end.max(other.t_end);
        self.blocks.extend(other.blocks);
    }
}

/// Group hits that sit within [`LUMP_DIAG_SLOP`] of a drifting diagonal.
fn lump_hits_by_diagonal(mut hits: Vec<AlignBlock>) -> Vec<ProtoRegion> {
    let mut protos = Vec::new();
    while !hits.is_empty() {
        let mut lump = vec![hits.remove(0)];
        let mut last_diag = lump[0].diagonal();
        hits.retain(|hit| {
            let diag = hit.diagonal();
            if (last_diag - LUMP_DIAG_SLOP..=last_diag + LUMP_DIAG_SLOP).contains(&diag) {
                last_diag = diag;
                lump.push(*hit);
                false
            } else {
                true
            }
        });
        protos.push(ProtoRegion::from_blocks(lump));
    }
    protos
}

/// Can `b` be folded into `a`? Only if it overlaps nothing already in
/// `a` by more than a quarter of the smaller party (floor 2), on either
/// coordinate.
fn can_merge(a: &ProtoRegion, b: &ProtoRegion) -> bool {
    let b_size = b.q_end - b.q_start;
    for block in &a.blocks {
        let a_size = block.len();
        let max_overlap = (a_size.min(b_size) / MERGE_OVERLAP_DIVISOR).max(2);
        let q_over = b.q_end.min(block.q_end) as i64 - b.q_start.max(block.q_start) as i64;
        if q_over >= max_overlap as i64 {
            return false;
        }
        let t_over = b.t_end.min(block.t_end) as i64 - b.t_start.max(block.t_start) as i64;
        if t_over >= max_overlap as i64 {
            return false;
        }
    }
    true
}

/// Affinity of a merger: prefers small forward gaps, abhors backward
/// jumps and query-side gaps.
fn merge_affinity(a: &ProtoRegion, b: &ProtoRegion, is_cdna: bool) -> i64 {
    let mut t_gap = b.t_start as i64 - a.t_end as i64;
    let mut q_gap = b.q_start as i64 - a.q_end as i64;
    if t_gap < 0 {
        t_gap = -8 * t_gap;
        if !is_cdna || t_gap < 32 {
            t_gap = t_gap * t_gap;
        }
    }
    if q_gap < 0 {
        q_gap = -8 * q_gap;
    }
    -t_gap - q_gap * q_gap
}

/// Greedily merge compatible proto-regions, best-affinity pair first.
fn merge_proto_regions(mut protos: Vec<ProtoRegion>, is_cdna: bool) -> Vec<ProtoRegion> {
    loop {
        let mut best: Option<(usize, usize, i64)> = None;
        for i in 0..protos.len() {
            for j in i + 1..protos.len() {
                if can_merge(&protos[i], &protos[j]) {
                    let affinity = merge_affinity(&protos[i], &protos[j], is_cdna);
                    if best.map_or(true, |(_, _, s)| affinity > s) {
                        best = Some((i, j, affinity));
                    }
                }
            }
        }
        let Some((i, j, _)) = best else {
            return protos;
        };
        let absorbed = protos.remove(j);
        protos[i].absorb(absorbed);
    }
}

/// Empty out whichever side of a backward target jump covers less of
/// the query, then sweep.
fn remove_throwbacks(blocks: &mut Vec<AlignBlock>) {
    for i in 1..blocks.len() {
        if blocks[i - 1].t_start > blocks[i].t_start {
            if blocks[i - 1].len() > blocks[i].len() {
                let b = &mut blocks[i];
                b.q_start = b.q_end;
                b.t_start = b.t_end;
            } else {
                let b = &mut blocks[i - 1];
                b.q_start = b.q_end;
                b.t_start = b.t_end;
            }
        }
    }
    block::remove_empty(blocks);
}

/// Weave tile hits into the best candidate chain. Returns the chain and
/// its score.
fn weave(
    mut hits: Vec<AlignBlock>,
    q: &[u8],
    t: &[u8],
    stringency: Stringency,
) -> Option<(Vec<AlignBlock>, i64)> {
    block::sort_target_first(&mut hits);
    block::dedup_exact(&mut hits);

    let mut protos = lump_hits_by_diagonal(hits);
    if protos.len() > MAX_PROTO_REGIONS {
        protos.sort_by_key(|p| std::cmp::Reverse(p.matched_bases()));
        protos.truncate(MAX_PROTO_REGIONS);
    }
    protos.sort_by_key(|p| p.q_start);
    let mut protos = merge_proto_regions(protos, stringency.is_cdna());
    for proto in &mut protos {
        block::sort_query_first(&mut proto.blocks);
        remove_throwbacks(&mut proto.blocks);
        proto.score = scorer::chain_score(&proto.blocks, q, t, stringency);
    }
    protos
        .into_iter()
        .max_by_key(|p| p.score)
        .map(|p| (p.blocks, p.score))
}

/// Sanity check after the top-level weave: an "alignment" whose tiles
/// could plausibly arise by chance in a window this size is noise.
fn looks_like_chance(blocks: &[AlignBlock], q: &[u8], hay_size: usize, num_tiles: usize, freq: &[f64; 4]) -> bool {
    let all_possibles = (hay_size * num_tiles) as f64;
    let mut prob = 1.0;
    for b in blocks {
        let p = oligo_prob(&q[b.q_start..b.q_end], freq) * all_possibles;
        if p < 1.0 {
            prob *= p;
        }
    }
    prob > 0.1
}

struct WeaveContext {
    freq: [f64; 4],
    check_good_enough: bool,
    stringency: Stringency,
}

/// Find regularly spaced improbable tiles of the query window inside the
/// target window, expand them exactly, and weave them into a chain.
fn find_tiles_between(
    ctx: &mut WeaveContext,
    q: &[u8],
    t: &[u8],
    w: Window,
    prob_max: f64,
) -> Option<Vec<AlignBlock>> {
    let needle = &q[w.q_lo..w.q_hi];
    let hay = &t[w.t_lo..w.t_hi];
    let possible_tiles = hay.len().saturating_sub(next_power_of_four(needle.len())).max(1);
    let tile_prob_one = prob_max / possible_tiles as f64;

    let mut hits: Vec<AlignBlock> = Vec::new();
    let mut num_tiles = 0;
    let mut search_offset = 0;
    while let Some((tile_start, tile_len)) =
        find_good_oligo(needle, search_offset, tile_prob_one, &ctx.freq)
    {
        let tile = &needle[tile_start..tile_start + tile_len];
        for hit_at in occurrences(tile, hay, 0) {
            hits.push(AlignBlock::new(w.q_lo + tile_start, w.t_lo + hit_at, tile_len));
        }
        search_offset = tile_start + tile_len;
        num_tiles += 1;
        if search_offset >= needle.len() {
            break;
        }
    }
    if hits.is_empty() {
        return None;
    }

    for hit in &mut hits {
        expand_exact(hit, q, t, &w);
    }

    let (best, _score) = weave(hits, q, t, ctx.stringency)?;
    if ctx.check_good_enough {
        if looks_like_chance(&best, q, hay.len(), num_tiles, &ctx.freq) {
            return None;
        }
        ctx.check_good_enough = false;
    }
    if best.is_empty() {
        None
    } else {
        Some(best)
    }
}

/// Recursive refinement: weave tiles, then weave again at doubled
/// probability budget inside every remaining gap of at least five bases
/// on both sides, splicing the results in between.
fn recursive_weave(
    ctx: &mut WeaveContext,
    q: &[u8],
    t: &[u8],
    w: Window,
    prob_max: f64,
    level: usize,
) -> Option<Vec<AlignBlock>> {
    if level > MAX_WEAVE_DEPTH {
        return None;
    }
    let tiles = find_tiles_between(ctx, q, t, w, prob_max)?;
    let mut out: Vec<AlignBlock> = Vec::with_capacity(tiles.len());
    for slot in 0..=tiles.len() {
        let (gap_q_lo, gap_t_lo) = if slot == 0 {
            (w.q_lo, w.t_lo)
        } else {
            (tiles[slot - 1].q_end, tiles[slot - 1].t_end)
        };
        let (gap_q_hi, gap_t_hi) = if slot == tiles.len() {
            (w.q_hi, w.t_hi)
        } else {
            (tiles[slot].q_start, tiles[slot].t_start)
        };
        if gap_q_hi > gap_q_lo && gap_t_hi > gap_t_lo {
            let q_dif = gap_q_hi - gap_q_lo;
            let t_dif = gap_t_hi - gap_t_lo;
            if q_dif >= 5 && t_dif >= 5 {
                let sub_window = Window {
                    q_lo: gap_q_lo,
                    q_hi: gap_q_hi,
                    t_lo: gap_t_lo,
                    t_hi: gap_t_hi,
                };
                if let Some(sub) = recursive_weave(ctx, q, t, sub_window, prob_max * 2.0, level + 1)
                {
                    out.extend(sub);
                }
            }
        }
        if slot < tiles.len() {
            out.push(tiles[slot]);
        }
    }
    Some(out)
}

// ---------------------------------------------------------------------------
// Expansion: grow woven blocks until they abut or stop paying.
// ---------------------------------------------------------------------------

/// Scan diagonally ahead of a stalled right end for the next stretch of
/// agreement worth jumping to. The required run length grows with the
/// jump distance so long skips need strong evidence.
fn right_next_match(
    q: &[u8],
    t: &[u8],
    ns: usize,
    ne: usize,
    hs: usize,
    he: usize,
    gap_penalty: i64,
    max_skip: usize,
) -> Option<AlignBlock> {
    let hay_size = (he - hs) as i64;
    let needle_size = (ne - ns) as i64;
    let diag_size = (hay_size + needle_size).min(max_skip as i64);
    for i in 1..=diag_size {
        let mut h_off = i;
        let mut n_off: i64 = 0;
        let match_size = gap_penalty + scorer::digits_base_two(i);
        let h_diff = h_off - hay_size;
        if h_diff > 0 {
            n_off += h_diff;
            h_off -= h_diff;
        }
        while h_off >= 0 {
            let needle_left = needle_size - n_off;
            let hay_left = hay_size - h_off;
            if match_size > needle_left {
                break;
            }
            if match_size <= hay_left {
                let qa = ns + n_off as usize;
                let ta = hs + h_off as usize;
                if q[qa] == t[ta]
                    && q[qa..qa + match_size as usize] == t[ta..ta + match_size as usize]
                {
                    return Some(AlignBlock::new(qa, ta, match_size as usize));
                }
            }
            h_off -= 1;
            n_off += 1;
        }
    }
    None
}

/// Mirror of [`right_next_match`], scanning back from a stalled left end.
fn left_next_match(
    q: &[u8],
    t: &[u8],
    ns: usize,
    ne: usize,
    hs: usize,
    he: usize,
    gap_penalty: i64,
    max_skip: usize,
) -> Option<AlignBlock> {
    let hay_size = (he - hs) as i64;
    let needle_size = (ne - ns) as i64;
    let diag_size = (hay_size + needle_size).min(max_skip as i64);
    for i in 1..=diag_size {
        let mut h_off = i;
        let mut n_off: i64 = 0;
        let match_size = gap_penalty + scorer::digits_base_two(i);
        let h_diff = h_off - hay_size;
        if h_diff > 0 {
            n_off += h_diff;
            h_off -= h_diff;
        }
        while h_off >= 0 {
            let needle_left = needle_size - n_off;
            let hay_left = hay_size - h_off;
            if match_size > needle_left {
                break;
            }
            if match_size <= hay_left {
                let q_end = ne - n_off as usize;
                let t_end = he - h_off as usize;
                if q[q_end - 1] == t[t_end - 1]
                    && q[q_end - match_size as usize..q_end]
                        == t[t_end - match_size as usize..t_end]
                {
                    return Some(AlignBlock {
                        q_start: q_end - match_size as usize,
                        q_end,
                        t_start: t_end - match_size as usize,
                        t_end,
                    });
                }
            }
            h_off -= 1;
            n_off += 1;
        }
    }
    None
}

/// Extend a block leftward: exact runs, then windows of five where at
/// least four bases agree, then (with a skip budget) a jump to the next
/// diagonal match, which becomes a fresh block expanded rightward first.
fn expand_left(
    blocks: &mut Vec<AlignBlock>,
    idx: usize,
    n_lo: usize,
    t_lo: usize,
    num_skips: usize,
    gap_penalty: i64,
    max_skip: usize,
    q: &[u8],
    t: &[u8],
) -> bool {
    let old_start = blocks[idx].q_start;
    let mut skips = num_skips as i64;
    let mut ns = blocks[idx].q_start;
    let mut hs = blocks[idx].t_start;
    loop {
        while ns > n_lo && hs > t_lo && q[ns - 1] == t[hs - 1] {
            ns -= 1;
            hs -= 1;
        }
        if ns <= n_lo || hs <= t_lo {
            blocks[idx].q_start = ns;
            blocks[idx].t_start = hs;
            return ns != old_start;
        }
        let window = 5usize.min(ns - n_lo).min(hs - t_lo);
        let score = if window > 0 {
            scorer::match_score_dna(&q[ns - window..ns], &t[hs - window..hs])
        } else {
            -1
        };
        if window > 0 && score >= window as i64 - 2 {
            ns -= window;
            hs -= window;
        } else if skips > 0 {
            skips -= 1;
            blocks[idx].q_start = ns;
            blocks[idx].t_start = hs;
            if ns - n_lo < 3 {
                return ns != old_start;
            }
            let Some(new_block) = left_next_match(q, t, n_lo, ns, t_lo, hs, gap_penalty, max_skip)
            else {
                return ns != old_start;
            };
            blocks.insert(idx, new_block);
            // The fresh block fills rightward toward the stalled end
            // before we keep pushing left from it.
            expand_right(blocks, idx, ns, hs, 0, gap_penalty, max_skip, q, t);
            ns = blocks[idx].q_start;
            hs = blocks[idx].t_start;
        } else {
            blocks[idx].q_start = ns;
            blocks[idx].t_start = hs;
            return ns != old_start;
        }
    }
}

/// Extend a block rightward; mirror of [`expand_left`].
fn expand_right(
    blocks: &mut Vec<AlignBlock>,
    mut idx: usize,
    n_hi: usize,
    t_hi: usize,
    num_skips: usize,
    gap_penalty: i64,
    max_skip: usize,
    q: &[u8],
    t: &[u8],
) -> bool {
    let old_end = blocks[idx].q_end;
    let mut skips = num_skips as i64;
    let mut ne = blocks[idx].q_end;
    let mut he = blocks[idx].t_end;
    loop {
        while ne < n_hi && he < t_hi && q[ne] == t[he] {
            ne += 1;
            he += 1;
        }
        if ne >= n_hi || he >= t_hi {
            blocks[idx].q_end = ne;
            blocks[idx].t_end = he;
            return ne != old_end;
        }
        let window = 5usize.min(n_hi - ne).min(t_hi - he);
        let score = if window > 0 {
            scorer::match_score_dna(&q[ne..ne + window], &t[he..he + window])
        } else {
            -1
        };
        if window > 0 && score >= window as i64 - 2 {
            ne += window;
            he += window;
        } else if skips > 0 {
            skips -= 1;
            blocks[idx].q_end = ne;
            blocks[idx].t_end = he;
            if n_hi - ne < 3 {
                return ne != old_end;
            }
            let Some(new_block) = right_next_match(q, t, ne, n_hi, he, t_hi, gap_penalty, max_skip)
            else {
                return ne != old_end;
            };
            blocks.insert(idx + 1, new_block);
            idx += 1;
            expand_left(blocks, idx, ne, he, 0, gap_penalty, max_skip, q, t);
            ne = blocks[idx].q_end;
            he = blocks[idx].t_end;
        } else {
            blocks[idx].q_end = ne;
            blocks[idx].t_end = he;
            return ne != old_end;
        }
    }
}

/// Extend a block through ambiguity codes without opening an indel.
fn expand_through_n(block: &mut AlignBlock, q: &[u8], t: &[u8], w: &Window) -> bool {
    let mut expanded = false;
    while block.q_start > w.q_lo && block.t_start > w.t_lo {
        let n = q[block.q_start - 1];
        let h = t[block.t_start - 1];
        if n == h || n == b'n' || h == b'n' {
            block.q_start -= 1;
            block.t_start -= 1;
            expanded = true;
        } else {
            break;
        }
    }
    while block.q_end < w.q_hi && block.t_end < w.t_hi {
        let n = q[block.q_end];
        let h = t[block.t_end];
        if n == h || n == b'n' || h == b'n' {
            block.q_end += 1;
            block.t_end += 1;
            expanded = true;
        } else {
            break;
        }
    }
    expanded
}

fn window_around(blocks: &[AlignBlock], idx: usize, outer: &Window) -> Window {
    Window {
        q_lo: if idx == 0 { outer.q_lo } else { blocks[idx - 1].q_end },
        t_lo: if idx == 0 { outer.t_lo } else { blocks[idx - 1].t_end },
        q_hi: if idx + 1 == blocks.len() {
            outer.q_hi
        } else {
            blocks[idx + 1].q_start
        },
        t_hi: if idx + 1 == blocks.len() {
            outer.t_hi
        } else {
            blocks[idx + 1].t_start
        },
    }
}

/// Run the three expansion passes over every block until nothing moves:
/// through-N first, then indel-free fuzzy extension, then extension with
/// a single skip allowed.
fn expand_all(
    blocks: &mut Vec<AlignBlock>,
    q: &[u8],
    t: &[u8],
    outer: &Window,
    gap_penalty: i64,
    max_skip: usize,
) {
    let mut expanded = true;
    while expanded {
        expanded = false;
        for idx in 0..blocks.len() {
            let w = window_around(blocks, idx, outer);
            expanded |= expand_through_n(&mut blocks[idx], q, t, &w);
        }
        let mut idx = 0;
        while idx < blocks.len() {
            let w = window_around(blocks, idx, outer);
            let before = blocks.len();
            expanded |= expand_left(blocks, idx, w.q_lo, w.t_lo, 0, gap_penalty, max_skip, q, t);
            idx += blocks.len() - before;
            let w = window_around(blocks, idx, outer);
            expanded |= expand_right(blocks, idx, w.q_hi, w.t_hi, 0, gap_penalty, max_skip, q, t);
            idx += 1;
        }
        let mut idx = 0;
        while idx < blocks.len() {
            let w = window_around(blocks, idx, outer);
            let before = blocks.len();
            expanded |= expand_left(blocks, idx, w.q_lo, w.t_lo, 1, gap_penalty, max_skip, q, t);
            let inserted_left = blocks.len() - before;
            idx += inserted_left;
            let w = window_around(blocks, idx, outer);
            let before = blocks.len();
            expanded |= expand_right(blocks, idx, w.q_hi, w.t_hi, 1, gap_penalty, max_skip, q, t);
            let inserted_right = blocks.len() - before;
            idx += 1 + inserted_right;
        }
    }
}

/// Drop whichever side of a monotonicity violation covers less query.
fn enforce_monotonic(blocks: &mut Vec<AlignBlock>) {
    while !block::is_monotonic(blocks) {
        remove_throwbacks(blocks);
        // Throwback removal handles target backtracks; a query-side
        // violation means an unresolved overlap.
        block::sort_query_first(blocks);
        block::merge_query_overlaps(blocks);
        let mut i = 1;
        while i < blocks.len() {
            if blocks[i - 1].t_end > blocks[i].t_start {
                if blocks[i - 1].len() > blocks[i].len() {
                    blocks.remove(i);
                } else {
                    blocks.remove(i - 1);
                }
            } else {
                i += 1;
            }
        }
    }
}

/// Local aligner: the best-effort gapped alignment of `query` against
/// `target` under a stringency policy.
pub struct LocalAligner {
    stringency: Stringency,
}

impl LocalAligner {
    pub fn new(stringency: Stringency) -> Self {
        LocalAligner { stringency }
    }

    pub fn stringency(&self) -> Stringency {
        self.stringency
    }

    /// Align `query` inside `target`, both as lowercase bases. Returns
    /// `None` when no alignment clears the internal noise thresholds; a
    /// normal outcome, not an error. Block coordinates are relative to
    /// the given slices, in ascending order on both sequences.
    pub fn align(&self, query: &[u8], target: &[u8]) -> Option<Vec<AlignBlock>> {
        let stringency = self.stringency;
        if query.len() < 2 || target.len() < 2 {
            return None;
        }

        // An exact hit ends the search immediately.
        if let Some(at) = exact_find(query, target) {
            return Some(vec![AlignBlock::new(0, at, query.len())]);
        }
        if stringency == Stringency::Exact {
            return None;
        }

        let (ini_gap_pen, add_gap_pen, mid_tile_min, prob_mult) = match stringency {
            Stringency::Exact => unreachable!(),
            Stringency::Cdna => (4, 3, 12, 0.001),
            Stringency::Tight => (4, 3, 12, 0.001),
            Stringency::Loose => (4, 3, 4, 0.5),
        };
        let match_size = (next_power_of_four(target.len()) + 1).max(mid_tile_min);

        let outer = Window {
            q_lo: 0,
            q_hi: query.len(),
            t_lo: 0,
            t_hi: target.len(),
        };
        let mut ctx = WeaveContext {
            freq: make_freq_table(target),
            check_good_enough: matches!(stringency, Stringency::Tight | Stringency::Cdna),
            stringency,
        };
        let mut blocks = recursive_weave(&mut ctx, query, target, outer, prob_mult, 1)?;

        block::sort_query_first(&mut blocks);
        block::merge_query_overlaps(&mut blocks);
        expand_all(&mut blocks, query, target, &outer, ini_gap_pen, 1);
        block::merge_query_overlaps(&mut blocks);
        expand_all(&mut blocks, query, target, &outer, add_gap_pen, 2 * match_size);
        block::trim_mismatched_ends(&mut blocks, query, target);
        block::merge_query_overlaps(&mut blocks);
        block::merge_target_overlaps(&mut blocks);
        block::reconsider_aligned_gaps(&mut blocks, query, target, stringency);
        block::remove_empty(&mut blocks);
        block::merge_query_overlaps(&mut blocks);
        enforce_monotonic(&mut blocks);
        if stringency.is_cdna() {
            scorer::slide_introns(&mut blocks, query, target);
        }
        block::remove_empty(&mut blocks);

        if blocks.is_empty() {
            None
        } else {
            Some(blocks)
        }
    }

    /// Align and score in one call.
    pub fn align_scored(&self, query: &[u8], target: &[u8]) -> Option<(Vec<AlignBlock>, i64)> {
        let blocks = self.align(query, target)?;
        let score = scorer::chain_score(&blocks, query, target, self.stringency);
        Some((blocks, score))
    }
}
