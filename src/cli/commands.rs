//! Command implementations for the quiver CLI.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};

use crate::automaton::CompiledAutomaton;
use crate::cli::args::*;
use crate::cli::output::*;
use crate::codec::blocktree::{BlockTreeTermsReader, TermsMeta};
use crate::config::CodecConfig;
use crate::error::{QuiverError, Result};
use crate::index::inverted::InvertedIndex;
use crate::index::merge::merge_segments;
use crate::index::{SeekStatus, Terms, TermsEnum, collect_postings};
use crate::storage::Storage;
use crate::storage::file::{FileStorage, FileStorageConfig};

/// Execute a CLI command.
pub fn execute_command(args: QuiverArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    match &args.command {
        Command::Build(build_args) => build_segment(build_args, &config, &args),
        Command::Lookup(lookup_args) => lookup_term(lookup_args, &args),
        Command::Prefix(prefix_args) => list_prefix(prefix_args, &args),
        Command::Regex(regex_args) => list_regex(regex_args, &config, &args),
        Command::Stats(stats_args) => show_stats(stats_args, &args),
        Command::Merge(merge_args) => merge(merge_args, &config, &args),
    }
}

fn load_config(path: Option<&Path>) -> Result<CodecConfig> {
    match path {
        Some(path) => {
            debug!("loading codec configuration from {}", path.display());
            CodecConfig::from_json_file(path)
        }
        None => Ok(CodecConfig::default()),
    }
}

fn open_storage(directory: &Path) -> Result<Arc<dyn Storage>> {
    Ok(Arc::new(FileStorage::new(FileStorageConfig::new(directory))?))
}

fn open_segment(directory: &Path, segment: &str) -> Result<BlockTreeTermsReader> {
    if !directory.is_dir() {
        return Err(QuiverError::storage(format!(
            "directory not found: {}",
            directory.display()
        )));
    }
    let storage = open_storage(directory)?;
    BlockTreeTermsReader::open(storage.as_ref(), segment)
}

/// Parse the build input into an in-memory index.
///
/// Plain mode puts every line's term into document 0. Document mode reads
/// `doc_id<TAB>term<TAB>term...` lines.
pub fn read_input<R: BufRead>(reader: R, documents: bool) -> Result<InvertedIndex> {
    let mut index = InvertedIndex::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if !documents {
            index.add_posting(line.as_bytes(), 0, 1)?;
            continue;
        }
        let mut fields = line.split('\t');
        let doc = fields.next().unwrap_or_default();
        let doc_id: u32 = doc.trim().parse().map_err(|_| {
            QuiverError::invalid_operation(format!(
                "line {}: invalid document id {doc:?}",
                number + 1
            ))
        })?;
        let tokens: Vec<&str> = fields.filter(|t| !t.is_empty()).collect();
        if tokens.is_empty() {
            warn!("line {}: document {doc_id} has no terms", number + 1);
            continue;
        }
        index.add_document(doc_id, tokens)?;
    }
    Ok(index)
}

fn segment_result(
    meta: &TermsMeta,
    segment: &str,
    sources: Vec<String>,
    start: Instant,
) -> SegmentResult {
    SegmentResult {
        segment: segment.to_string(),
        sources,
        num_terms: meta.num_terms,
        max_doc: meta.max_doc,
        doc_count: meta.doc_count,
        sum_doc_freq: meta.sum_doc_freq,
        sum_total_term_freq: meta.sum_total_term_freq,
        block_count: meta.block_count,
        floor_group_count: meta.floor_group_count,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

fn build_segment(args: &BuildArgs, config: &CodecConfig, cli_args: &QuiverArgs) -> Result<()> {
    let start = Instant::now();
    let index = match &args.input {
        Some(path) => read_input(BufReader::new(File::open(path)?), args.documents)?,
        None => read_input(io::stdin().lock(), args.documents)?,
    };
    info!(
        "read {} terms in {} documents",
        index.term_count(),
        index.num_docs()
    );

    let storage = open_storage(&args.directory)?;
    let meta = index.write_segment(storage, &args.segment, &config.block_tree)?;
    output_result(
        "Segment written",
        &segment_result(&meta, &args.segment, Vec::new(), start),
        cli_args,
    )
}

fn lookup_term(args: &LookupArgs, cli_args: &QuiverArgs) -> Result<()> {
    let reader = open_segment(&args.directory, &args.segment)?;
    let term = args.term.as_bytes();
    let result = match reader.get(term)? {
        Some(stats) => {
            let postings = if args.postings {
                match reader.postings_for(term)? {
                    Some(mut postings) => Some(collect_postings(postings.as_mut())?),
                    None => None,
                }
            } else {
                None
            };
            LookupResult {
                term: args.term.clone(),
                found: true,
                doc_freq: stats.doc_freq,
                total_term_freq: stats.total_term_freq,
                postings,
            }
        }
        None => LookupResult {
            term: args.term.clone(),
            found: false,
            doc_freq: 0,
            total_term_freq: 0,
            postings: None,
        },
    };
    output_result("Lookup", &result, cli_args)
}

fn list_prefix(args: &PrefixArgs, cli_args: &QuiverArgs) -> Result<()> {
    let start = Instant::now();
    let reader = open_segment(&args.directory, &args.segment)?;
    let prefix = args.prefix.as_bytes();
    let mut terms_enum = reader.iterator()?;

    let mut terms = Vec::new();
    let mut truncated = false;
    if terms_enum.seek_ceil(prefix)? != SeekStatus::End {
        loop {
            if !terms_enum.term().starts_with(prefix) {
                break;
            }
            if terms.len() == args.limit {
                truncated = true;
                break;
            }
            terms.push(TermEntry::from(terms_enum.term_stats()));
            if terms_enum.next()?.is_none() {
                break;
            }
        }
    }

    let result = TermListResult {
        query: format!("{}*", args.prefix),
        terms,
        truncated,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    output_result("Prefix listing", &result, cli_args)
}

fn list_regex(args: &RegexArgs, config: &CodecConfig, cli_args: &QuiverArgs) -> Result<()> {
    let start = Instant::now();
    let reader = open_segment(&args.directory, &args.segment)?;
    let compiled =
        CompiledAutomaton::from_regex(&args.pattern, config.automaton.max_determinized_states)?;
    let start_term = args.start_term.as_deref().map(str::as_bytes);
    let mut terms_enum = reader.intersect(&compiled, start_term)?;

    let mut terms = Vec::new();
    let mut truncated = false;
    while terms_enum.next()?.is_some() {
        if terms.len() == args.limit {
            truncated = true;
            break;
        }
        terms.push(TermEntry::from(terms_enum.term_stats()));
    }

    let result = TermListResult {
        query: format!("/{}/", args.pattern),
        terms,
        truncated,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    output_result("Pattern listing", &result, cli_args)
}

fn show_stats(args: &StatsArgs, cli_args: &QuiverArgs) -> Result<()> {
    let reader = open_segment(&args.directory, &args.segment)?;
    let stats = reader.compute_stats()?;
    output_result("Block statistics", &stats, cli_args)
}

fn merge(args: &MergeArgs, config: &CodecConfig, cli_args: &QuiverArgs) -> Result<()> {
    let start = Instant::now();
    let storage = open_storage(&args.directory)?;
    let readers = args
        .segments
        .iter()
        .map(|segment| BlockTreeTermsReader::open(storage.as_ref(), segment))
        .collect::<Result<Vec<_>>>()?;
    let sources: Vec<&BlockTreeTermsReader> = readers.iter().collect();
    let meta = merge_segments(storage.clone(), &sources, &args.target, &config.block_tree)?;
    output_result(
        "Segments merged",
        &segment_result(&meta, &args.target, args.segments.clone(), start),
        cli_args,
    )
}
