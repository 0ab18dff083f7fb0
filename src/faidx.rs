use crate::interval::normalize_chrom;
use rust_htslib::faidx;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

// Simple cache for FASTA file handles with random eviction
struct FaidxCache {
    capacity: usize,
    readers: HashMap<PathBuf, faidx::Reader>,
}

impl FaidxCache {
    fn new(capacity: usize) -> Self {
        FaidxCache {
            capacity,
            readers: HashMap::with_capacity(capacity),
        }
    }

    fn get_or_open(&mut self, path: &Path) -> io::Result<&mut faidx::Reader> {
        if !self.readers.contains_key(path) {
            // Evict one random entry if at capacity
            if self.readers.len() >= self.capacity {
                if let Some(key_to_remove) = self.readers.keys().next().cloned() {
                    self.readers.remove(&key_to_remove);
                }
            }

            let reader = faidx::Reader::from_path(path).map_err(|e| {
                io::Error::other(format!(
                    "Failed to open FASTA file '{}': {e}",
                    path.display()
                ))
            })?;
            self.readers.insert(path.to_path_buf(), reader);
        }

        self.readers.get_mut(path).ok_or_else(|| {
            io::Error::other(format!("FASTA reader for '{}' was evicted", path.display()))
        })
    }
}

thread_local! {
    // A reference genome is usually one file, a few at most
    static FAIDX_CACHE: RefCell<FaidxCache> = RefCell::new(FaidxCache::new(4));
}

/// Reference genome spread over one or more indexed FASTA files
#[derive(Debug)]
pub struct FastaIndex {
    fasta_paths: Vec<PathBuf>,
    name_to_fasta: FxHashMap<String, usize>,
    sequence_lengths: FxHashMap<String, u64>,
    // `1` -> `chr1` (or the reverse), whichever spelling the FASTA uses
    aliases: FxHashMap<String, String>,
}

impl FastaIndex {
    fn new() -> Self {
        FastaIndex {
            fasta_paths: Vec::new(),
            name_to_fasta: FxHashMap::default(),
            sequence_lengths: FxHashMap::default(),
            aliases: FxHashMap::default(),
        }
    }

    pub fn build_from_files(fasta_files: &[PathBuf]) -> io::Result<Self> {
        let mut index = FastaIndex::new();

        for (fasta_idx, fasta_path) in fasta_files.iter().enumerate() {
            index.fasta_paths.push(fasta_path.clone());

            let mut fai_name = fasta_path.as_os_str().to_owned();
            fai_name.push(".fai");
            let fai_path = PathBuf::from(fai_name);

            // Let htslib build the .fai when it is missing
            let fai_content = match std::fs::read_to_string(&fai_path) {
                Ok(content) => content,
                Err(_) => match faidx::Reader::from_path(fasta_path) {
                    Ok(_) => std::fs::read_to_string(&fai_path)?,
                    Err(e) => {
                        return Err(io::Error::new(
                            io::ErrorKind::NotFound,
                            format!(
                                "Failed to create FASTA index for '{}': {e}",
                                fasta_path.display()
                            ),
                        ));
                    }
                },
            };

            for line in fai_content.lines() {
                let fields: Vec<&str> = line.split('\t').collect();
                if fields.len() < 2 || fields[0].is_empty() {
                    continue;
                }
                let seq_name = fields[0];
                index.name_to_fasta.insert(seq_name.to_string(), fasta_idx);
                if let Ok(length) = fields[1].parse::<u64>() {
                    index.sequence_lengths.insert(seq_name.to_string(), length);
                }
                index
                    .aliases
                    .entry(normalize_chrom(seq_name).to_string())
                    .or_insert_with(|| seq_name.to_string());
            }
        }

        Ok(index)
    }

    /// Name of `chrom` as spelled in the FASTA, tolerating a missing or extra `chr` prefix
    pub fn resolve_name<'a>(&'a self, chrom: &'a str) -> Option<&'a str> {
        if self.name_to_fasta.contains_key(chrom) {
            return Some(chrom);
        }
        self.aliases.get(normalize_chrom(chrom)).map(String::as_str)
    }

    /// Fetch the half-open range `[start, end)`, upper-cased
    pub fn fetch_sequence(&self, chrom: &str, start: u64, end: u64) -> io::Result<Vec<u8>> {
        let seq_name = self.resolve_name(chrom).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("Sequence '{chrom}' not found in any FASTA file"),
            )
        })?;
        if start >= end {
            return Ok(Vec::new());
        }
        if let Some(length) = self.sequence_lengths.get(seq_name) {
            if end > *length {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Range {seq_name}:{start}-{end} exceeds sequence length {length}"),
                ));
            }
        }
        let fasta_path = &self.fasta_paths[self.name_to_fasta[seq_name]];

        FAIDX_CACHE.with(|cache_cell| -> io::Result<Vec<u8>> {
            let mut cache = cache_cell.borrow_mut();
            let reader = cache.get_or_open(fasta_path)?;

            // fetch_seq takes a 0-based inclusive end coordinate
            match reader.fetch_seq(seq_name, start as usize, (end - 1) as usize) {
                Ok(seq) => {
                    let mut seq_vec = seq.to_vec();
                    unsafe { libc::free(seq.as_ptr() as *mut std::ffi::c_void) }; // Free up memory to avoid memory leak (bug https://github.com/rust-bio/rust-htslib/issues/401#issuecomment-1704290171)
                    seq_vec.make_ascii_uppercase();
                    Ok(seq_vec)
                }
                Err(e) => Err(io::Error::other(format!(
                    "Failed to fetch sequence for {seq_name}:{start}-{end}: {e}"
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_genome(dir: &Path) -> PathBuf {
        let fasta = dir.join("genome.fa");
        std::fs::write(&fasta, ">chr1\nACGTACGTNN\nacgtac\n").unwrap();
        std::fs::write(dir.join("genome.fa.fai"), "chr1\t16\t6\t10\t11\n").unwrap();
        fasta
    }

    #[test]
    fn test_fetch_with_alias() {
        let dir = tempfile::TempDir::new().unwrap();
        let index = FastaIndex::build_from_files(&[write_genome(dir.path())]).unwrap();
        assert_eq!(index.resolve_name("1"), Some("chr1"));
        assert_eq!(index.fetch_sequence("1", 8, 14).unwrap(), b"NNACGT".to_vec());
        assert!(index.fetch_sequence("chr2", 0, 4).is_err());
        assert!(index.fetch_sequence("chr1", 10, 17).is_err());
    }
}
