//! Tile index tests: build-time exclusions and clump finding.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rustc_hash::FxHashSet;

use tilestitch::seed::tile::{encode_tile, parse_overused_list};
use tilestitch::{AlignConfig, Sequence, SequenceStore, Stringency, TileIndex};

use crate::helpers::random_dna;

fn indexed_target(rng: &mut SmallRng, len: usize) -> (SequenceStore, u32, Vec<u8>) {
    let target = random_dna(rng, len);
    let mut store = SequenceStore::new();
    let id = store.add(Sequence::dna("target", &target));
    (store, id, target)
}

#[test]
fn embedded_substring_produces_a_covering_clump() {
    let mut rng = SmallRng::seed_from_u64(11);
    let (store, id, target) = indexed_target(&mut rng, 1000);
    let config = AlignConfig::new(10, Stringency::Cdna).unwrap();
    let index = TileIndex::build(&store, &[id], &config, None).unwrap();

    // A 100-base exact substring of the target must produce at least
    // one clump covering that region.
    let query: Vec<u8> = target[450..550].to_vec();
    let clumps = index
        .find_candidate_clumps(&store, &query, 0..query.len(), &config)
        .unwrap();
    assert!(
        clumps
            .iter()
            .any(|c| c.t_start <= 450 && c.t_start + c.t_len >= 550),
        "no clump covers the source region: {clumps:?}"
    );
}

#[test]
fn query_sharing_no_tile_produces_no_clumps() {
    let mut rng = SmallRng::seed_from_u64(12);
    let (store, id, target) = indexed_target(&mut rng, 1000);
    let config = AlignConfig::new(10, Stringency::Cdna).unwrap();
    let index = TileIndex::build(&store, &[id], &config, None).unwrap();

    let target_tiles: FxHashSet<u32> = (0..=target.len() - 10)
        .filter_map(|i| encode_tile(&target, i, 10))
        .collect();

    // Sample 50-base queries until one shares no 10-mer with the target.
    let query = loop {
        let candidate = random_dna(&mut rng, 50);
        let shares = (0..=candidate.len() - 10)
            .filter_map(|i| encode_tile(&candidate, i, 10))
            .any(|code| target_tiles.contains(&code));
        if !shares {
            break candidate;
        }
    };
    let clumps = index
        .find_candidate_clumps(&store, &query, 0..query.len(), &config)
        .unwrap();
    assert!(clumps.is_empty(), "chance clumps: {clumps:?}");
}

#[test]
fn overused_list_suppresses_lookup() {
    let mut rng = SmallRng::seed_from_u64(13);
    let (store, id, target) = indexed_target(&mut rng, 1000);
    let config = AlignConfig::new(10, Stringency::Cdna).unwrap();

    // Exclude every tile of the region the query comes from.
    let query: Vec<u8> = target[200..300].to_vec();
    let lines: Vec<String> = (0..=query.len() - 10)
        .map(|i| String::from_utf8(query[i..i + 10].to_vec()).unwrap())
        .collect();
    let overused = parse_overused_list(&lines, 10).unwrap();
    let index = TileIndex::build(&store, &[id], &config, Some(overused)).unwrap();

    let clumps = index
        .find_candidate_clumps(&store, &query, 0..query.len(), &config)
        .unwrap();
    assert!(clumps.is_empty());

    // Other regions are unaffected.
    let other: Vec<u8> = target[600..700].to_vec();
    let clumps = index
        .find_candidate_clumps(&store, &other, 0..other.len(), &config)
        .unwrap();
    assert!(!clumps.is_empty());
}

#[test]
fn index_is_shareable_across_threads() {
    let mut rng = SmallRng::seed_from_u64(14);
    let (store, id, target) = indexed_target(&mut rng, 2000);
    let config = AlignConfig::new(11, Stringency::Tight).unwrap();
    let index = TileIndex::build(&store, &[id], &config, None).unwrap();

    // Concurrent lookups over the shared read-only index.
    std::thread::scope(|scope| {
        for start in [100usize, 600, 1200] {
            let query: Vec<u8> = target[start..start + 150].to_vec();
            let index = &index;
            let store = &store;
            let config = &config;
            scope.spawn(move || {
                let clumps = index
                    .find_candidate_clumps(store, &query, 0..query.len(), config)
                    .unwrap();
                assert!(!clumps.is_empty());
            });
        }
    });
}
