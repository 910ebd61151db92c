//! Entry selection for pull-mode UTIL propagation.
//!
//! In pull mode a child announces its UTIL space with a header and the
//! parent fetches the entries through ASK requests. [`AskPolicy`] decides
//! which range the parent asks for next; [`PulledSpace`] reassembles the
//! replies.

use std::ops::Range;

use dcopforge_comm::{UtilEntries, UtilHeader};
use dcopforge_config::AskPolicyConfig;
use dcopforge_core::{DcopError, Result, Utility, UtilitySpace};

/// Which entries to request next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskPolicy {
    /// The whole space in one request.
    Whole,
    /// Consecutive ranges of at most `chunk_size` entries.
    Chunked { chunk_size: usize },
}

impl AskPolicy {
    pub fn from_config(config: AskPolicyConfig) -> Self {
        match config {
            AskPolicyConfig::Whole => AskPolicy::Whole,
            AskPolicyConfig::Chunked { chunk_size } => AskPolicy::Chunked { chunk_size },
        }
    }

    /// The next range to request from a space of `size` entries, of which
    /// the first `filled` have arrived. `None` once nothing is missing.
    pub fn next_request(&self, size: usize, filled: usize) -> Option<Range<usize>> {
        if filled >= size {
            return None;
        }
        match *self {
            AskPolicy::Whole => Some(filled..size),
            AskPolicy::Chunked { chunk_size } => {
                let end = size.min(filled.saturating_add(chunk_size.max(1)));
                Some(filled..end)
            }
        }
    }
}

impl From<AskPolicyConfig> for AskPolicy {
    fn from(config: AskPolicyConfig) -> Self {
        AskPolicy::from_config(config)
    }
}

/// A child's UTIL space being fetched entry range by entry range.
#[derive(Debug, Clone)]
pub struct PulledSpace {
    header: UtilHeader,
    utilities: Vec<Utility>,
    requested: Option<Range<usize>>,
}

impl PulledSpace {
    pub fn new(header: UtilHeader) -> Self {
        let utilities = Vec::with_capacity(header.size);
        PulledSpace {
            header,
            utilities,
            requested: None,
        }
    }

    pub fn header(&self) -> &UtilHeader {
        &self.header
    }

    /// Entries received so far.
    pub fn filled(&self) -> usize {
        self.utilities.len()
    }

    pub fn is_complete(&self) -> bool {
        self.filled() >= self.header.size
    }

    /// Picks the next range with `policy` and remembers it as outstanding.
    pub fn next_request(&mut self, policy: &AskPolicy) -> Option<Range<usize>> {
        let range = policy.next_request(self.header.size, self.filled())?;
        self.requested = Some(range.clone());
        Some(range)
    }

    /// Accepts a reply to the outstanding request.
    pub fn accept(&mut self, entries: &UtilEntries) -> Result<()> {
        let Some(requested) = self.requested.take() else {
            return Err(DcopError::ProtocolViolation(format!(
                "unrequested UTIL entries from '{}'",
                entries.sender
            )));
        };
        if entries.offset != requested.start || entries.utilities.len() != requested.len() {
            let got = entries.offset..entries.offset + entries.utilities.len();
            self.requested = Some(requested.clone());
            return Err(DcopError::ProtocolViolation(format!(
                "UTIL entries {got:?} from '{}' do not match request {requested:?}",
                entries.sender
            )));
        }
        self.utilities.extend_from_slice(&entries.utilities);
        Ok(())
    }

    /// Rebuilds the space once every entry has arrived.
    pub fn into_space(self) -> Result<UtilitySpace> {
        if !self.is_complete() {
            return Err(DcopError::InvalidState(format!(
                "UTIL space from '{}' has {} of {} entries",
                self.header.sender,
                self.filled(),
                self.header.size
            )));
        }
        UtilitySpace::new(self.header.scope, self.header.domains, self.utilities)
    }
}
