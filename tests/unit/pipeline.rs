//! End-to-end pipeline tests: index, align, stitch, report.

use rand::rngs::SmallRng;
use rand::SeedableRng;

use tilestitch::report::Strand;
use tilestitch::{AlignConfig, Pipeline, Sequence, SequenceStore, Stringency, TileIndex};

use crate::helpers::{mutate, random_dna};

#[test]
fn spliced_cdna_aligns_across_the_intron() {
    let mut rng = SmallRng::seed_from_u64(31);
    let exon1 = random_dna(&mut rng, 60);
    let exon2 = random_dna(&mut rng, 60);
    let upstream = random_dna(&mut rng, 150);
    let downstream = random_dna(&mut rng, 150);
    let intron_body = random_dna(&mut rng, 296);

    let mut target = upstream.clone();
    target.extend_from_slice(&exon1);
    target.extend_from_slice(b"gt");
    target.extend_from_slice(&intron_body);
    target.extend_from_slice(b"ag");
    target.extend_from_slice(&exon2);
    target.extend_from_slice(&downstream);

    let mut cdna = exon1.clone();
    cdna.extend_from_slice(&exon2);

    let mut store = SequenceStore::new();
    let t_id = store.add(Sequence::dna("genome", &target));
    let q_id = store.add(Sequence::dna("transcript", &cdna));

    let config = AlignConfig::new(10, Stringency::Cdna).unwrap();
    let index = TileIndex::build(&store, &[t_id], &config, None).unwrap();
    let pipeline = Pipeline::new(&store, &index, &config);
    let summaries = pipeline.align_query(q_id).unwrap();

    let best = summaries
        .iter()
        .filter(|s| s.strand == Strand::Forward)
        .max_by_key(|s| s.matches + s.rep_matches)
        .expect("spliced transcript went unfound");
    assert_eq!(best.matches + best.rep_matches, 120);
    assert_eq!(best.mismatches, 0);
    assert_eq!(best.milli_bad, 0);
    assert_eq!(best.blocks.len(), 2);
    // Block boundaries sit on the splice consensus.
    let left = &best.blocks[0];
    let right = &best.blocks[1];
    assert_eq!(&target[left.t_end..left.t_end + 2], b"gt");
    assert_eq!(&target[right.t_start - 2..right.t_start], b"ag");
    // The 300-base intron costs nothing on the badness scale.
    assert_eq!(right.t_start - left.t_end, 300);
}

#[test]
fn diverged_copy_is_found_with_mismatches_counted() {
    let mut rng = SmallRng::seed_from_u64(32);
    let target = random_dna(&mut rng, 1500);
    // ~1.5% diverged 200-base copy.
    let query = mutate(&mut rng, &target[700..900], 64);

    let mut store = SequenceStore::new();
    let t_id = store.add(Sequence::dna("genome", &target));
    let q_id = store.add(Sequence::dna("read", &query));

    let config = AlignConfig::new(11, Stringency::Tight).unwrap();
    let index = TileIndex::build(&store, &[t_id], &config, None).unwrap();
    let pipeline = Pipeline::new(&store, &index, &config);
    let summaries = pipeline.align_query(q_id).unwrap();

    let best = summaries
        .iter()
        .max_by_key(|s| s.matches + s.rep_matches)
        .expect("diverged copy went unfound");
    assert!(best.matches >= 180);
    assert!(best.milli_bad <= 40, "milli_bad {}", best.milli_bad);
    assert!(best.t_start >= 650 && best.t_end <= 950);
}

#[test]
fn long_query_windows_restitch_seamlessly() {
    let mut rng = SmallRng::seed_from_u64(33);
    let target = random_dna(&mut rng, 3000);
    // A 1200-base query forces several overlapping windows.
    let query: Vec<u8> = target[900..2100].to_vec();

    let mut store = SequenceStore::new();
    let t_id = store.add(Sequence::dna("genome", &target));
    let q_id = store.add(Sequence::dna("long_read", &query));

    let config = AlignConfig::new(10, Stringency::Cdna).unwrap();
    let index = TileIndex::build(&store, &[t_id], &config, None).unwrap();
    let pipeline = Pipeline::new(&store, &index, &config);
    let summaries = pipeline.align_query(q_id).unwrap();

    let best = summaries
        .iter()
        .max_by_key(|s| s.matches + s.rep_matches)
        .expect("windowed query went unfound");
    // Window fragments must reassemble into (near) full coverage with
    // no query base reported twice.
    assert!(
        best.matches >= 1150,
        "stitched coverage only {}",
        best.matches
    );
    for w in best.blocks.windows(2) {
        assert!(w[0].q_end <= w[1].q_start);
    }
    assert_eq!(best.milli_bad, 0);
}

#[test]
fn repeat_mask_shifts_matches_into_rep_matches() {
    let mut rng = SmallRng::seed_from_u64(34);
    let target = random_dna(&mut rng, 800);
    let query: Vec<u8> = target[300..420].to_vec();

    let mut store = SequenceStore::new();
    let t_id = store.add(Sequence::dna("genome", &target));
    let q_id = store.add(Sequence::dna("read", &query));
    // Mask the first half of the copied region.
    let mut mask = vec![false; 800];
    for flag in mask.iter_mut().take(360).skip(300) {
        *flag = true;
    }
    store.set_repeat_mask(t_id, mask).unwrap();

    let config = AlignConfig::new(10, Stringency::Tight).unwrap();
    let index = TileIndex::build(&store, &[t_id], &config, None).unwrap();
    let pipeline = Pipeline::new(&store, &index, &config);
    let summaries = pipeline.align_query(q_id).unwrap();

    let best = summaries
        .iter()
        .max_by_key(|s| s.matches + s.rep_matches)
        .expect("masked copy went unfound");
    assert!(best.rep_matches >= 55, "rep_matches {}", best.rep_matches);
    assert_eq!(best.matches + best.rep_matches, 120);
    assert_eq!(best.milli_bad, 0);
}

#[test]
fn protein_query_is_a_config_error() {
    let mut store = SequenceStore::new();
    let t_id = store.add(Sequence::dna("genome", b"acgtacgtacgtacgtacgt"));
    let p_id = store.add(Sequence::new(
        "peptide",
        tilestitch::sequence::Alphabet::Protein,
        b"MKVLINSSWT",
    ));
    let config = AlignConfig::new(10, Stringency::Tight).unwrap();
    let index = TileIndex::build(&store, &[t_id], &config, None).unwrap();
    let pipeline = Pipeline::new(&store, &index, &config);
    assert!(pipeline.align_query(p_id).is_err());
}

#[test]
fn batch_run_covers_every_query() {
    let mut rng = SmallRng::seed_from_u64(35);
    let target = random_dna(&mut rng, 2000);
    let mut store = SequenceStore::new();
    let t_id = store.add(Sequence::dna("genome", &target));

    let mut query_ids = Vec::new();
    for (i, start) in [100usize, 500, 900, 1300].iter().enumerate() {
        let q: Vec<u8> = target[*start..start + 150].to_vec();
        query_ids.push(store.add(Sequence::dna(format!("q{i}"), &q)));
    }

    let config = AlignConfig::new(10, Stringency::Cdna).unwrap();
    let index = TileIndex::build(&store, &[t_id], &config, None).unwrap();
    let pipeline = Pipeline::new(&store, &index, &config);
    let summaries = pipeline.align_batch(&query_ids).unwrap();

    for &q_id in &query_ids {
        assert!(
            summaries.iter().any(|s| s.query == q_id && s.matches >= 140),
            "query {q_id} missing from batch output"
        );
    }
}
