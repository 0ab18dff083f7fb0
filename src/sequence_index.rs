use std::io;

use crate::faidx::FastaIndex;

/// Random access to reference sequence; shared read-only across scoring threads
pub trait SequenceSource: Sync {
    fn fetch_sequence(&self, chrom: &str, start: u64, end: u64) -> io::Result<Vec<u8>>;
}

impl SequenceSource for FastaIndex {
    fn fetch_sequence(&self, chrom: &str, start: u64, end: u64) -> io::Result<Vec<u8>> {
        FastaIndex::fetch_sequence(self, chrom, start, end)
    }
}

/// Chromosomes held in memory, for unit tests
#[cfg(test)]
#[derive(Default)]
pub struct MemorySequences {
    sequences: rustc_hash::FxHashMap<String, Vec<u8>>,
}

#[cfg(test)]
impl MemorySequences {
    pub fn with(mut self, chrom: &str, sequence: &[u8]) -> Self {
        self.sequences.insert(
            crate::interval::normalize_chrom(chrom).to_string(),
            sequence.to_ascii_uppercase(),
        );
        self
    }
}

#[cfg(test)]
impl SequenceSource for MemorySequences {
    fn fetch_sequence(&self, chrom: &str, start: u64, end: u64) -> io::Result<Vec<u8>> {
        let seq = self
            .sequences
            .get(crate::interval::normalize_chrom(chrom))
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, chrom.to_string()))?;
        seq.get(start as usize..end as usize)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "range out of bounds"))
    }
}
