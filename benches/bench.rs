//! Criterion benchmarks for quiver.
//!
//! Covers the hot paths of a term dictionary:
//! - postings block decoding
//! - FST lookups
//! - dictionary iteration, seeking and automaton intersection

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use quiver::automaton::CompiledAutomaton;
use quiver::codec::blocktree::BlockTreeTermsReader;
use quiver::codec::for_util::{BLOCK_SIZE, MAX_ENCODED_WORDS, compress, decompress, num_bits};
use quiver::config::BlockTreeConfig;
use quiver::fst::{Fst, FstBuilder};
use quiver::index::inverted::InvertedIndex;
use quiver::index::{Terms, TermsEnum};
use quiver::storage::memory::MemoryStorage;

/// Generate sorted, distinct pseudo-words.
fn generate_terms(count: usize) -> Vec<String> {
    let syllables = ["ka", "lo", "mi", "nu", "pe", "ra", "si", "to", "ve", "zu"];
    let mut terms: Vec<String> = (0..count)
        .map(|i| {
            let mut n = i;
            let mut term = String::new();
            loop {
                term.push_str(syllables[n % syllables.len()]);
                n /= syllables.len();
                if n == 0 {
                    break;
                }
            }
            term
        })
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

fn build_segment(terms: &[String]) -> BlockTreeTermsReader {
    let storage = Arc::new(MemoryStorage::default());
    let mut index = InvertedIndex::new();
    for (doc, chunk) in terms.chunks(16).enumerate() {
        index.add_document(doc as u32, chunk).unwrap();
    }
    index
        .write_segment(storage.clone(), "_bench", &BlockTreeConfig::default())
        .unwrap();
    BlockTreeTermsReader::open(storage.as_ref(), "_bench").unwrap()
}

fn bench_block_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("postings_block");
    group.throughput(Throughput::Elements(BLOCK_SIZE as u64));

    for bits in [1u32, 7, 16, 32] {
        let limit = if bits == 32 { u32::MAX } else { (1 << bits) - 1 };
        let block: Vec<u32> = (0..BLOCK_SIZE as u32)
            .map(|i| i.wrapping_mul(2_654_435_761) & limit)
            .collect();
        let bits = num_bits(&block);
        let mut packed = [0u32; MAX_ENCODED_WORDS];
        let words = compress(&block, bits, &mut packed).unwrap();
        let mut out = [0u32; BLOCK_SIZE];

        group.bench_function(format!("decompress_{bits}_bits"), |b| {
            b.iter(|| {
                decompress(black_box(bits), black_box(&packed[..words]), &mut out).unwrap();
                black_box(&out);
            })
        });
    }
    group.finish();
}

fn bench_fst(c: &mut Criterion) {
    let terms = generate_terms(10_000);
    let mut builder = FstBuilder::<u64>::new();
    for (i, term) in terms.iter().enumerate() {
        builder.insert(term.as_bytes(), i as u64).unwrap();
    }
    let fst: Fst<u64> = builder.finish().unwrap();

    let mut group = c.benchmark_group("fst");
    group.bench_function("get_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 7919) % terms.len();
            black_box(fst.get(black_box(terms[i].as_bytes())).unwrap())
        })
    });
    group.bench_function("get_miss", |b| {
        b.iter(|| black_box(fst.get(black_box(b"kazzz")).unwrap()))
    });
    group.bench_function("build_1k", |b| {
        let small = &terms[..1000];
        b.iter(|| {
            let mut builder = FstBuilder::<u64>::new();
            for (i, term) in small.iter().enumerate() {
                builder.insert(term.as_bytes(), i as u64).unwrap();
            }
            black_box(builder.finish().unwrap())
        })
    });
    group.finish();
}

fn bench_terms_dictionary(c: &mut Criterion) {
    let terms = generate_terms(20_000);
    let reader = build_segment(&terms);

    let mut group = c.benchmark_group("blocktree");
    group.bench_function("iterate_all", |b| {
        b.iter(|| {
            let mut terms_enum = reader.iterator().unwrap();
            let mut count = 0usize;
            while terms_enum.next().unwrap().is_some() {
                count += 1;
            }
            black_box(count)
        })
    });
    group.bench_function("seek_exact", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 104_729) % terms.len();
            let mut terms_enum = reader.iterator().unwrap();
            black_box(terms_enum.seek_exact(terms[i].as_bytes()).unwrap())
        })
    });

    for pattern in ["ka.*", "(lo|mi)+zu", ".*rasi.*"] {
        let compiled = CompiledAutomaton::from_regex(pattern, 10_000).unwrap();
        group.bench_function(format!("intersect {pattern}"), |b| {
            b.iter(|| {
                let mut matches = reader.intersect(&compiled, None).unwrap();
                let mut count = 0usize;
                while matches.next().unwrap().is_some() {
                    count += 1;
                }
                black_box(count)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_block_decode, bench_fst, bench_terms_dictionary);

criterion_main!(benches);
