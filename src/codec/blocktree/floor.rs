//! Cutting an oversized prefix group into floor blocks.

/// A run of pending entries written as one physical block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockSpan {
    pub start: usize,
    pub end: usize,
    /// Lead byte of the block; `None` for the first block of a group.
    pub lead: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitState {
    /// Filling the first block of the group.
    Accumulating,
    /// At least one block was flushed; the open block starts at `lead`.
    FloorContinuation { lead: u8 },
}

/// Greedy floor splitter.
///
/// Entries are pushed in order with the first byte of their suffix. A block
/// may only end where the lead byte changes, so that a reader can pick the
/// floor block of a target from its lead byte alone. At such a boundary the
/// open block is flushed once it holds at least `min` entries and more than
/// `max` entries remain from its start. Whatever is left at the end forms
/// the last block, even if it is smaller than `min`.
#[derive(Debug)]
pub(crate) struct FloorSplitter {
    min: usize,
    max: usize,
    end: usize,
    block_start: usize,
    last_lead: Option<u8>,
    state: SplitState,
    spans: Vec<BlockSpan>,
}

impl FloorSplitter {
    /// Split the pending entries `start..end`.
    pub fn new(min: usize, max: usize, start: usize, end: usize) -> Self {
        FloorSplitter {
            min,
            max,
            end,
            block_start: start,
            last_lead: None,
            state: SplitState::Accumulating,
            spans: Vec::new(),
        }
    }

    /// Feed entry `i` whose suffix starts with `lead` (`None` for an empty
    /// suffix, which can only be the first entry).
    pub fn push(&mut self, i: usize, lead: Option<u8>) {
        if lead == self.last_lead {
            return;
        }
        let items = i - self.block_start;
        if items >= self.min && self.end - self.block_start > self.max {
            self.flush(i);
            self.state = match lead {
                Some(lead) => SplitState::FloorContinuation { lead },
                None => SplitState::Accumulating,
            };
        }
        self.last_lead = lead;
    }

    fn flush(&mut self, end: usize) {
        let lead = match self.state {
            SplitState::Accumulating => None,
            SplitState::FloorContinuation { lead } => Some(lead),
        };
        self.spans.push(BlockSpan {
            start: self.block_start,
            end,
            lead,
        });
        self.block_start = end;
    }

    /// The blocks to write, in order. More than one span means the group is
    /// a floor group.
    pub fn finish(mut self) -> Vec<BlockSpan> {
        if self.block_start < self.end {
            self.flush(self.end);
        }
        self.spans
    }
}
