use std::collections::BTreeSet;
use std::sync::Arc;

use quiver::automaton::CompiledAutomaton;
use quiver::codec::blocktree::{BlockTreeTermsReader, BlockTreeTermsWriter, TermsMeta};
use quiver::config::BlockTreeConfig;
use quiver::error::QuiverError;
use quiver::index::inverted::InvertedIndex;
use quiver::index::merge::merge_segments;
use quiver::index::{SeekStatus, Terms, TermsEnum, collect_postings, collect_terms};
use quiver::storage::memory::MemoryStorage;
use quiver::storage::{Storage, StorageConfig, StorageFactory};
use quiver::storage::file::FileStorageConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use tempfile::tempdir;

const MAX_STATES: usize = 10_000;

fn terms_of(reader: &BlockTreeTermsReader) -> Vec<String> {
    collect_terms(reader.iterator().unwrap().as_mut())
        .unwrap()
        .into_iter()
        .map(|t| t.term_lossy())
        .collect()
}

fn scenario_docs(index: &mut InvertedIndex, docs: std::ops::Range<u32>, base: u32) {
    for i in docs {
        let c = char::from(b'a' + i as u8);
        index
            .add_document(i - base, [c.to_string(), format!("z{c}")])
            .unwrap();
    }
}

fn assert_scenario_layout(reader: &BlockTreeTermsReader) {
    let stats = reader.compute_stats().unwrap();
    assert_eq!(stats.total_term_count, 50);
    assert_eq!(stats.floor_block_count, 0);
    assert_eq!(stats.floor_sub_block_count, 0);
    assert_eq!(stats.non_floor_block_count, 2);
    assert_eq!(stats.total_block_count, 2);
    // the root block and the "z" block
    assert_eq!(stats.block_count_by_prefix_len, vec![1, 1]);
    assert_eq!(stats.mixed_block_count, 1);
    assert_eq!(stats.terms_only_block_count, 1);

    let terms = terms_of(reader);
    assert_eq!(terms.len(), 50);
    assert_eq!(terms.first().map(String::as_str), Some("a"));
    assert_eq!(terms.last().map(String::as_str), Some("zy"));
    let mut zy = reader.postings_for(b"zy").unwrap().unwrap();
    assert_eq!(collect_postings(zy.as_mut()).unwrap(), vec![(24, 1)]);
}

#[test]
fn test_final_block_written_directly() {
    let storage = Arc::new(MemoryStorage::default());
    let mut index = InvertedIndex::new();
    scenario_docs(&mut index, 0..25, 0);
    index
        .write_segment(storage.clone(), "_0", &BlockTreeConfig::default())
        .unwrap();

    let reader = BlockTreeTermsReader::open(storage.as_ref(), "_0").unwrap();
    assert_scenario_layout(&reader);
}

#[test]
fn test_final_block_written_by_merge() {
    let storage = Arc::new(MemoryStorage::default());
    let config = BlockTreeConfig::default();
    let mut names = Vec::new();
    for (n, start) in (0..25u32).step_by(5).enumerate() {
        let mut index = InvertedIndex::new();
        scenario_docs(&mut index, start..start + 5, start);
        let name = format!("_{n}");
        index.write_segment(storage.clone(), &name, &config).unwrap();
        names.push(name);
    }
    let readers: Vec<BlockTreeTermsReader> = names
        .iter()
        .map(|name| BlockTreeTermsReader::open(storage.as_ref(), name).unwrap())
        .collect();
    let sources: Vec<&BlockTreeTermsReader> = readers.iter().collect();
    let meta = merge_segments(storage.clone(), &sources, "_merged", &config).unwrap();
    assert_eq!(meta.max_doc, 25);

    let merged = BlockTreeTermsReader::open(storage.as_ref(), "_merged").unwrap();
    assert_scenario_layout(&merged);
}

#[test]
fn test_floor_blocks_when_prefix_overflows() {
    let storage = Arc::new(MemoryStorage::default());
    let config = BlockTreeConfig::new(4, 8).unwrap();
    let mut writer = BlockTreeTermsWriter::new(storage.clone(), "_f", 1, &config).unwrap();
    let terms: Vec<String> = (0..40u8).map(|i| format!("k{}", char::from(b'0' + i))).collect();
    for term in &terms {
        writer.add_term(term.as_bytes(), &[(0, 1)]).unwrap();
    }
    let meta: TermsMeta = writer.finish().unwrap();
    assert_eq!(meta.floor_group_count, 1);

    let reader = BlockTreeTermsReader::open(storage.as_ref(), "_f").unwrap();
    let stats = reader.compute_stats().unwrap();
    assert_eq!(stats.floor_block_count, 1);
    assert!(stats.floor_sub_block_count >= 4);
    assert_eq!(stats.total_block_count, meta.block_count);
    assert_eq!(stats.total_term_count, 40);
    assert_eq!(terms_of(&reader), terms);

    // every floor block is reachable by seek
    for term in &terms {
        let mut terms_enum = reader.iterator().unwrap();
        assert!(terms_enum.seek_exact(term.as_bytes()).unwrap(), "{term}");
        assert_eq!(
            terms_enum.seek_ceil(term.as_bytes()).unwrap(),
            SeekStatus::Found
        );
    }
}

fn random_regex(rng: &mut StdRng, depth: u32) -> String {
    let choices = if depth == 0 { 3 } else { 8 };
    match rng.random_range(0..choices) {
        0 => char::from(rng.random_range(b'a'..=b'd')).to_string(),
        1 => ".".to_string(),
        2 => "[b-c]".to_string(),
        3 => format!(
            "{}{}",
            random_regex(rng, depth - 1),
            random_regex(rng, depth - 1)
        ),
        4 => format!(
            "({}|{})",
            random_regex(rng, depth - 1),
            random_regex(rng, depth - 1)
        ),
        5 => format!("({})*", random_regex(rng, depth - 1)),
        6 => format!("({})+", random_regex(rng, depth - 1)),
        _ => format!("({})?", random_regex(rng, depth - 1)),
    }
}

fn random_terms(rng: &mut StdRng, n: usize) -> BTreeSet<String> {
    let mut terms = BTreeSet::new();
    while terms.len() < n {
        let len = rng.random_range(1..7);
        let term: String = (0..len)
            .map(|_| char::from(rng.random_range(b'a'..=b'd')))
            .collect();
        terms.insert(term);
    }
    terms
}

#[test]
fn test_intersect_matches_regex_oracle() {
    let mut rng = StdRng::seed_from_u64(2024);
    for round in 0..10 {
        let n = rng.random_range(1..1500);
        let terms = random_terms(&mut rng, n);
        let storage = Arc::new(MemoryStorage::default());
        let config = BlockTreeConfig::new(4, 8).unwrap();
        let mut writer = BlockTreeTermsWriter::new(storage.clone(), "_r", 1, &config).unwrap();
        for term in &terms {
            writer.add_term(term.as_bytes(), &[(0, 1)]).unwrap();
        }
        writer.finish().unwrap();
        let reader = BlockTreeTermsReader::open(storage.as_ref(), "_r").unwrap();

        for _ in 0..30 {
            let pattern = random_regex(&mut rng, 3);
            let oracle = Regex::new(&format!("^(?:{pattern})$")).unwrap();
            let compiled = CompiledAutomaton::from_regex(&pattern, MAX_STATES).unwrap();

            let expected: Vec<&String> = terms.iter().filter(|t| oracle.is_match(t)).collect();
            let mut matches = reader.intersect(&compiled, None).unwrap();
            let got: Vec<String> = collect_terms(matches.as_mut())
                .unwrap()
                .into_iter()
                .map(|t| t.term_lossy())
                .collect();
            assert_eq!(
                got.iter().collect::<Vec<_>>(),
                expected,
                "round {round}, pattern {pattern}"
            );

            // resume after a start term
            if let Some(start) = terms.iter().nth(terms.len() / 2) {
                let mut matches = reader.intersect(&compiled, Some(start.as_bytes())).unwrap();
                let got: Vec<String> = collect_terms(matches.as_mut())
                    .unwrap()
                    .into_iter()
                    .map(|t| t.term_lossy())
                    .collect();
                let expected: Vec<&String> =
                    expected.iter().copied().filter(|t| *t > start).collect();
                assert_eq!(
                    got.iter().collect::<Vec<_>>(),
                    expected,
                    "round {round}, pattern {pattern}, after {start}"
                );
            }
        }
    }
}

#[test]
fn test_corrupt_files_detected() {
    let storage = Arc::new(MemoryStorage::default());
    let mut index = InvertedIndex::new();
    scenario_docs(&mut index, 0..25, 0);
    index
        .write_segment(storage.clone(), "_c", &BlockTreeConfig::default())
        .unwrap();

    for ext in ["tim", "tip", "tmd", "doc"] {
        let name = format!("_c.{ext}");
        let original = storage.get_file(&name).unwrap();

        // flipped byte in the body
        let mut flipped = original.to_vec();
        let middle = flipped.len() / 2;
        flipped[middle] ^= 0x40;
        storage.put_file(&name, flipped);
        let err = BlockTreeTermsReader::open(storage.as_ref(), "_c").unwrap_err();
        assert!(err.is_corruption(), "{ext}: {err}");

        // truncated
        storage.put_file(&name, original[..original.len() - 3].to_vec());
        let err = BlockTreeTermsReader::open(storage.as_ref(), "_c").unwrap_err();
        assert!(err.is_corruption(), "{ext}: {err}");

        storage.put_file(&name, original.to_vec());
    }
    assert!(BlockTreeTermsReader::open(storage.as_ref(), "_c").is_ok());
}

#[test]
fn test_missing_segment_is_an_error() {
    let storage = MemoryStorage::default();
    let err = BlockTreeTermsReader::open(&storage, "_none").unwrap_err();
    assert!(matches!(err, QuiverError::Storage(_)));
}

#[test]
fn test_file_storage_round_trip() {
    let dir = tempdir().unwrap();
    let storage: Arc<dyn Storage> =
        StorageFactory::create(StorageConfig::File(FileStorageConfig::new(dir.path()))).unwrap();
    let mut index = InvertedIndex::new();
    index.add_document(0, ["arrow", "quiver", "tantivy"]).unwrap();
    index.add_document(2, ["quiver"]).unwrap();
    index
        .write_segment(storage.clone(), "_disk", &BlockTreeConfig::default())
        .unwrap();

    let reader = BlockTreeTermsReader::open(storage.as_ref(), "_disk").unwrap();
    assert_eq!(terms_of(&reader), ["arrow", "quiver", "tantivy"]);
    let stats = reader.get(b"quiver").unwrap().unwrap();
    assert_eq!(stats.doc_freq, 2);
    assert!(reader.get(b"solr").unwrap().is_none());
}

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn test_readers_shared_across_threads() {
    assert_send_sync::<BlockTreeTermsReader>();
    assert_send_sync::<CompiledAutomaton>();

    let storage = Arc::new(MemoryStorage::default());
    let mut rng = StdRng::seed_from_u64(11);
    let terms = random_terms(&mut rng, 800);
    let mut writer =
        BlockTreeTermsWriter::new(storage.clone(), "_t", 1, &BlockTreeConfig::default()).unwrap();
    for term in &terms {
        writer.add_term(term.as_bytes(), &[(0, 1)]).unwrap();
    }
    writer.finish().unwrap();
    let reader = BlockTreeTermsReader::open(storage.as_ref(), "_t").unwrap();
    let compiled = CompiledAutomaton::from_regex("a.*b", MAX_STATES).unwrap();
    let expected = terms
        .iter()
        .filter(|t| t.starts_with('a') && t.ends_with('b'))
        .count();

    // each thread gets its own cursors over the same reader
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let mut matches = reader.intersect(&compiled, None).unwrap();
                assert_eq!(collect_terms(matches.as_mut()).unwrap().len(), expected);
                for term in terms.iter().step_by(37) {
                    let mut terms_enum = reader.iterator().unwrap();
                    assert!(terms_enum.seek_exact(term.as_bytes()).unwrap());
                }
            });
        }
    });
}
