//! Merging segments.
//!
//! Segments are merged by a k-way walk over their sorted term enums. The
//! documents of segment `i` are renumbered by adding the `max_doc` of all
//! segments before it, so the merged postings stay sorted.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use log::{debug, info};

use crate::codec::blocktree::{BlockTreeTermsReader, BlockTreeTermsWriter, TermsMeta};
use crate::config::BlockTreeConfig;
use crate::error::{QuiverError, Result};
use crate::index::{NO_MORE_DOCS, TermsEnum};
use crate::storage::Storage;

/// Merge `segments` into a new segment named `target`.
pub fn merge_segments(
    storage: Arc<dyn Storage>,
    segments: &[&BlockTreeTermsReader],
    target: &str,
    config: &BlockTreeConfig,
) -> Result<TermsMeta> {
    if segments.iter().any(|segment| segment.segment() == target) {
        return Err(QuiverError::invalid_operation(format!(
            "merge target {target} is also a source"
        )));
    }
    let mut doc_bases = Vec::with_capacity(segments.len());
    let mut max_doc: u32 = 0;
    for segment in segments {
        doc_bases.push(max_doc);
        max_doc = max_doc.checked_add(segment.meta().max_doc).ok_or_else(|| {
            QuiverError::invalid_operation("merged segment would exceed the document id space")
        })?;
    }

    let mut enums: Vec<Box<dyn TermsEnum + '_>> = Vec::with_capacity(segments.len());
    let mut queue = BinaryHeap::new();
    for (i, segment) in segments.iter().enumerate() {
        let mut terms_enum: Box<dyn TermsEnum + '_> = Box::new(segment.terms_enum());
        if let Some(term) = terms_enum.next()? {
            queue.push(Reverse((term.to_vec(), i)));
        }
        enums.push(terms_enum);
    }

    let mut writer = BlockTreeTermsWriter::new(storage, target, max_doc, config)?;
    let mut same_term = Vec::with_capacity(segments.len());
    while let Some(Reverse((term, first))) = queue.pop() {
        same_term.clear();
        same_term.push(first);
        while let Some(Reverse((next, _))) = queue.peek()
            && *next == term
        {
            if let Some(Reverse((_, i))) = queue.pop() {
                same_term.push(i);
            }
        }
        // segment order keeps renumbered documents increasing
        same_term.sort_unstable();

        writer.start_term(&term)?;
        for &i in &same_term {
            let mut postings = enums[i].postings()?;
            loop {
                let doc = postings.next_doc()?;
                if doc == NO_MORE_DOCS {
                    break;
                }
                writer.add_doc(doc_bases[i] + doc, postings.freq())?;
            }
        }
        writer.finish_term()?;

        for &i in &same_term {
            if let Some(next) = enums[i].next()? {
                queue.push(Reverse((next.to_vec(), i)));
            }
        }
    }

    let meta = writer.finish()?;
    info!(
        "merged {} segments into {target}: {} terms, {} docs",
        segments.len(),
        meta.num_terms,
        meta.max_doc
    );
    debug!("merge doc bases: {doc_bases:?}");
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::inverted::InvertedIndex;
    use crate::index::{Terms, collect_postings, collect_terms};
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_merge_renumbers_docs() {
        let storage = Arc::new(MemoryStorage::default());
        let config = BlockTreeConfig::default();

        let mut a = InvertedIndex::new();
        a.add_document(0, ["apple", "pie"]).unwrap();
        a.add_document(1, ["apple"]).unwrap();
        a.write_segment(storage.clone(), "_a", &config).unwrap();

        let mut b = InvertedIndex::new();
        b.add_document(0, ["banana", "pie", "pie"]).unwrap();
        b.write_segment(storage.clone(), "_b", &config).unwrap();

        let ra = BlockTreeTermsReader::open(storage.as_ref(), "_a").unwrap();
        let rb = BlockTreeTermsReader::open(storage.as_ref(), "_b").unwrap();
        let meta = merge_segments(storage.clone(), &[&ra, &rb], "_ab", &config).unwrap();
        assert_eq!(meta.max_doc, 3);
        assert_eq!(meta.num_terms, 3);

        let merged = BlockTreeTermsReader::open(storage.as_ref(), "_ab").unwrap();
        let terms: Vec<String> = collect_terms(merged.iterator().unwrap().as_mut())
            .unwrap()
            .into_iter()
            .map(|s| s.term_lossy())
            .collect();
        assert_eq!(terms, vec!["apple", "banana", "pie"]);
        let mut pie = merged.postings_for(b"pie").unwrap().unwrap();
        assert_eq!(collect_postings(pie.as_mut()).unwrap(), vec![(0, 1), (2, 2)]);
        assert_eq!(merged.doc_count(), 3);
        assert_eq!(merged.sum_total_term_freq(), 6);
    }

    #[test]
    fn test_merge_nothing() {
        let storage = Arc::new(MemoryStorage::default());
        let meta = merge_segments(storage.clone(), &[], "_empty", &BlockTreeConfig::default())
            .unwrap();
        assert_eq!(meta.num_terms, 0);
        let reader = BlockTreeTermsReader::open(storage.as_ref(), "_empty").unwrap();
        assert!(reader.iterator().unwrap().next().unwrap().is_none());
    }

    #[test]
    fn test_merge_into_source_rejected() {
        let storage = Arc::new(MemoryStorage::default());
        let config = BlockTreeConfig::default();
        let mut a = InvertedIndex::new();
        a.add_document(0, ["apple"]).unwrap();
        a.write_segment(storage.clone(), "_a", &config).unwrap();

        let ra = BlockTreeTermsReader::open(storage.as_ref(), "_a").unwrap();
        let err = merge_segments(storage.clone(), &[&ra, &ra], "_a", &config).unwrap_err();
        assert!(matches!(err, QuiverError::InvalidOperation(_)));

        // the source is still readable
        let reopened = BlockTreeTermsReader::open(storage.as_ref(), "_a").unwrap();
        assert_eq!(reopened.meta().num_terms, 1);
    }
}
