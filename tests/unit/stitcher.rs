//! Stitcher tests: crossover resolution, intron joins, acceptance.

use tilestitch::align::scorer;
use tilestitch::report::{self, Strand};
use tilestitch::{AlignBlock, AlignConfig, Bundle, ChainStitcher, Stringency};

fn cfg(stringency: Stringency) -> AlignConfig {
    AlignConfig::new(10, stringency).unwrap()
}

/// Spliced-cDNA join: two tiny exons across a canonical intron stitch
/// into one two-block chain, the gap costs (near) nothing, and the
/// badness measure sees only the six aligned bases.
#[test]
fn intron_join_scores_only_aligned_bases() {
    let mut target = Vec::new();
    target.extend_from_slice(b"aaagt");
    target.extend_from_slice(&vec![b'n'; 50]);
    target.extend_from_slice(b"agccc");
    let query = b"aaaccc".to_vec();

    let mut config = cfg(Stringency::Cdna);
    config.min_bases = 1;
    let stitcher = ChainStitcher::new(&config);
    let mut bundle = Bundle::new(0, 1);
    // Fragments as two exon windows would deliver them.
    bundle.push(vec![AlignBlock::new(0, 0, 3)]);
    bundle.push(vec![AlignBlock::new(3, 57, 3)]);
    let outcome = stitcher.stitch(bundle, &query, &target, false);

    assert_eq!(outcome.chains.len(), 1);
    let chain = &outcome.chains[0].blocks;
    assert_eq!(
        chain,
        &vec![AlignBlock::new(0, 0, 3), AlignBlock::new(3, 57, 3)]
    );
    // The gt..ag flanks drive the join penalty to zero: the chain keeps
    // the full six match points.
    assert_eq!(outcome.chains[0].score, 6);
    assert_eq!(
        scorer::gap_penalty_seq(&chain[0], &chain[1], &target, Stringency::Cdna),
        0
    );

    let summary = report::summarize(
        0,
        1,
        chain.clone(),
        outcome.chains[0].score,
        &query,
        &target,
        query.len(),
        None,
        Strand::Forward,
        Stringency::Cdna,
    );
    assert_eq!(summary.matches, 6);
    assert_eq!(summary.mismatches, 0);
    assert_eq!(summary.milli_bad, 0);
}

/// Crossover resolution: the mismatched base inside an overlap goes to
/// whichever block's native pairing already disagrees with it less.
#[test]
fn crossover_attributes_mismatch_to_the_agreeing_side() {
    // q: 40 bases. Left block pairs q[0..24] with t[0..24] where t[21]
    // mismatches; right block pairs q[20..40] with t[50..70], perfect.
    let q: Vec<u8> = b"acgtaaccttgacgtaggccggatcgatccacgtaacctt".to_vec();
    let mut t: Vec<u8> = q.clone();
    t[21] = if q[21] == b'a' { b'c' } else { b'a' };
    t.extend_from_slice(&vec![b'n'; 10]);
    let right_copy: Vec<u8> = q[20..40].to_vec();
    t.extend_from_slice(&right_copy);

    let config = cfg(Stringency::Cdna);
    let stitcher = ChainStitcher::new(&config);
    let mut bundle = Bundle::new(0, 1);
    bundle.push(vec![AlignBlock::new(0, 0, 24)]);
    bundle.push(vec![AlignBlock::new(20, 50, 20)]);
    let outcome = stitcher.stitch(bundle, &q, &t, false);

    assert_eq!(outcome.chains.len(), 1);
    let chain = &outcome.chains[0].blocks;
    assert_eq!(chain.len(), 2);
    // The crossover lands before the mismatch: the left block gives up
    // the whole overlap, so every kept pairing matches.
    let summary = report::summarize(
        0,
        1,
        chain.clone(),
        outcome.chains[0].score,
        &q,
        &t,
        q.len(),
        None,
        Strand::Forward,
        Stringency::Cdna,
    );
    assert_eq!(summary.mismatches, 0);
    assert_eq!(summary.matches, 40);
    // No query base covered twice.
    assert!(chain[0].q_end <= chain[1].q_start);
}

/// Stitching an already-optimal chain returns it unchanged (and a
/// second pass reproduces the first).
#[test]
fn stitch_is_idempotent_on_optimal_chains() {
    // Exon X, 2-base query insert, exon Z; intron with gt..ag flanks.
    let x = b"acgtaaccttga";
    let z = b"ggatcgatccgtta";
    let mut q: Vec<u8> = Vec::new();
    q.extend_from_slice(x);
    q.extend_from_slice(b"cc");
    q.extend_from_slice(z);
    let mut t: Vec<u8> = Vec::new();
    t.extend_from_slice(x);
    t.extend_from_slice(b"gt");
    t.extend_from_slice(&vec![b'c'; 46]);
    t.extend_from_slice(b"ag");
    t.extend_from_slice(z);

    let config = cfg(Stringency::Cdna);
    let stitcher = ChainStitcher::new(&config);
    let optimal = vec![AlignBlock::new(0, 0, 12), AlignBlock::new(14, 62, 14)];
    let mut bundle = Bundle::new(0, 1);
    bundle.push(optimal.clone());
    let outcome = stitcher.stitch(bundle, &q, &t, false);
    assert_eq!(outcome.chains.len(), 1);
    let first = outcome.chains[0].blocks.clone();
    assert_eq!(first, optimal);

    let mut bundle = Bundle::new(0, 1);
    bundle.push(first.clone());
    let outcome = stitcher.stitch(bundle, &q, &t, false);
    assert_eq!(outcome.chains[0].blocks, first);
}

/// A duplicated region surfaces as a secondary, non-overlapping chain.
#[test]
fn duplicated_target_region_yields_secondary_alignment() {
    let unit: Vec<u8> = b"atcgatgcttagcgtacgtgcattgcaagg".to_vec();
    let mut target = unit.clone();
    target.extend_from_slice(&vec![b'n'; 12]);
    target.extend_from_slice(&unit);
    let query = unit.clone();

    let config = cfg(Stringency::Tight);
    let stitcher = ChainStitcher::new(&config);
    let mut bundle = Bundle::new(0, 1);
    bundle.push(vec![AlignBlock::new(0, 0, 30)]);
    bundle.push(vec![AlignBlock::new(0, 42, 30)]);
    let outcome = stitcher.stitch(bundle, &query, &target, false);
    assert_eq!(outcome.chains.len(), 2);
    // Both copies align perfectly.
    assert_eq!(outcome.chains[0].score, 30);
    assert_eq!(outcome.chains[1].score, 30);
}

/// Protein bundles use protein weights.
#[test]
fn protein_scoring_doubles_match_weight() {
    let q: Vec<u8> = b"mkvlinsswt".to_vec();
    let t = q.clone();
    let mut config = cfg(Stringency::Tight);
    config.min_bases = 10;
    let stitcher = ChainStitcher::new(&config);
    let mut bundle = Bundle::new(0, 1);
    bundle.push(vec![AlignBlock::new(0, 0, 10)]);
    let outcome = stitcher.stitch(bundle, &q, &t, true);
    assert_eq!(outcome.chains.len(), 1);
    assert_eq!(outcome.chains[0].score, 20);
}

/// A chain is cut where the target gap exceeds the intron ceiling.
#[test]
fn oversized_intron_cuts_the_chain() {
    let exon: Vec<u8> = b"atcgatgcttagcgtacgtgcattgcaagg".to_vec();
    let mut target = exon.clone();
    target.extend_from_slice(&vec![b'n'; 500]);
    target.extend_from_slice(&exon);
    let mut query = exon.clone();
    query.extend_from_slice(&exon);

    let mut config = cfg(Stringency::Cdna);
    config.max_intron = 100;
    let stitcher = ChainStitcher::new(&config);
    let mut bundle = Bundle::new(0, 1);
    bundle.push(vec![AlignBlock::new(0, 0, 30)]);
    bundle.push(vec![AlignBlock::new(30, 530, 30)]);
    let outcome = stitcher.stitch(bundle, &query, &target, false);
    // Two separate chains instead of one spanning the 500-base gap.
    assert_eq!(outcome.chains.len(), 2);
    for chain in &outcome.chains {
        assert_eq!(chain.blocks.len(), 1);
    }
}
