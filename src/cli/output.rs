//! Output formatting for CLI commands.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, QuiverArgs};
use crate::error::Result;
use crate::index::TermStats;

/// Result of writing a segment, by `build` or `merge`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SegmentResult {
    pub segment: String,
    pub sources: Vec<String>,
    pub num_terms: u64,
    pub max_doc: u32,
    pub doc_count: u32,
    pub sum_doc_freq: u64,
    pub sum_total_term_freq: u64,
    pub block_count: u64,
    pub floor_group_count: u64,
    pub duration_ms: u64,
}

/// Result of a single term lookup.
#[derive(Debug, Serialize, Deserialize)]
pub struct LookupResult {
    pub term: String,
    pub found: bool,
    pub doc_freq: u32,
    pub total_term_freq: u64,
    /// `(doc, freq)` pairs, when requested.
    pub postings: Option<Vec<(u32, u32)>>,
}

/// Terms returned by a prefix or pattern query.
#[derive(Debug, Serialize, Deserialize)]
pub struct TermListResult {
    pub query: String,
    pub terms: Vec<TermEntry>,
    /// Whether the listing stopped at the limit.
    pub truncated: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TermEntry {
    pub term: String,
    pub doc_freq: u32,
    pub total_term_freq: u64,
}

impl From<TermStats> for TermEntry {
    fn from(stats: TermStats) -> Self {
        TermEntry {
            term: stats.term_lossy(),
            doc_freq: stats.doc_freq,
            total_term_freq: stats.total_term_freq,
        }
    }
}

/// Output a result in the selected format.
pub fn output_result<T>(message: &str, result: &T, args: &QuiverArgs) -> Result<()>
where
    T: Serialize + fmt::Display,
{
    match args.output_format {
        OutputFormat::Human => {
            if args.verbosity() > 1 {
                println!("{message}");
                println!();
            }
            println!("{result}");
        }
        OutputFormat::Json => {
            let json = if args.pretty {
                serde_json::to_string_pretty(result)?
            } else {
                serde_json::to_string(result)?
            };
            println!("{json}");
        }
    }
    Ok(())
}

impl fmt::Display for SegmentResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "segment {}", self.segment)?;
        if !self.sources.is_empty() {
            writeln!(f, "  merged from: {}", self.sources.join(", "))?;
        }
        writeln!(f, "  terms: {}", self.num_terms)?;
        writeln!(f, "  documents: {} of {}", self.doc_count, self.max_doc)?;
        writeln!(
            f,
            "  postings: {} ({} occurrences)",
            self.sum_doc_freq, self.sum_total_term_freq
        )?;
        writeln!(
            f,
            "  blocks: {} ({} floor groups)",
            self.block_count, self.floor_group_count
        )?;
        write!(f, "  took: {}", format_duration(self.duration_ms))
    }
}

impl fmt::Display for LookupResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.found {
            return write!(f, "{}: not found", self.term);
        }
        write!(
            f,
            "{}: doc_freq={} total_term_freq={}",
            self.term, self.doc_freq, self.total_term_freq
        )?;
        if let Some(postings) = &self.postings {
            for (doc, freq) in postings {
                write!(f, "\n  doc {doc} freq {freq}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for TermListResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.terms {
            writeln!(f, "{}\t{}\t{}", entry.term, entry.doc_freq, entry.total_term_freq)?;
        }
        write!(
            f,
            "{} terms matching {}{} in {}",
            self.terms.len(),
            self.query,
            if self.truncated { " (truncated)" } else { "" },
            format_duration(self.duration_ms)
        )
    }
}

/// Format a duration given in milliseconds.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60_000;
        let seconds = (ms % 60_000) / 1000;
        format!("{minutes}m {seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(500), "500ms");
        assert_eq!(format_duration(1500), "1.5s");
        assert_eq!(format_duration(65_000), "1m 5s");
    }

    #[test]
    fn test_lookup_display() {
        let missing = LookupResult {
            term: "zebra".to_string(),
            found: false,
            doc_freq: 0,
            total_term_freq: 0,
            postings: None,
        };
        assert_eq!(missing.to_string(), "zebra: not found");

        let found = LookupResult {
            term: "apple".to_string(),
            found: true,
            doc_freq: 2,
            total_term_freq: 3,
            postings: Some(vec![(0, 1), (4, 2)]),
        };
        assert_eq!(
            found.to_string(),
            "apple: doc_freq=2 total_term_freq=3\n  doc 0 freq 1\n  doc 4 freq 2"
        );
    }

    #[test]
    fn test_term_list_json() {
        let result = TermListResult {
            query: "ap*".to_string(),
            terms: vec![TermEntry {
                term: "apple".to_string(),
                doc_freq: 1,
                total_term_freq: 1,
            }],
            truncated: false,
            duration_ms: 0,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["terms"][0]["term"], "apple");
        assert!(result.to_string().starts_with("apple\t1\t1\n1 terms matching ap*"));
    }
}
