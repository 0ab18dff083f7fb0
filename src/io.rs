//! File helpers shared by every stage: transparent gzip input and
//! all-or-nothing output artifacts.

use flate2::read::MultiGzDecoder;
use log::debug;
use noodles::bgzf;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub fn is_compressed(path: &Path) -> bool {
    let name = path.to_string_lossy();
    [".gz", ".bgz"].iter().any(|e| name.ends_with(e))
}

/// Open a text input, decompressing `.gz`/`.bgz` files.
/// Plain gzip and BGZF are both multi-member gzip streams, so one decoder reads either.
pub fn open_reader(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let reader: Box<dyn BufRead> = if is_compressed(path) {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(reader)
}

/// Read one line into `buf` without its terminator; `Ok(false)` at end of input.
/// Bytes are not decoded, so one line of bad encoding cannot abort a whole file.
pub fn read_raw_line<R: BufRead + ?Sized>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(false);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(true)
}

enum Sink {
    Plain(BufWriter<File>),
    Bgzf(bgzf::io::Writer<File>),
}

/// Writes to `<path>.tmp` and only renames onto `path` in [`ArtifactWriter::commit`].
/// Dropping an uncommitted writer removes the temporary file.
pub struct ArtifactWriter {
    sink: Option<Sink>,
    tmp_path: PathBuf,
    final_path: PathBuf,
}

impl ArtifactWriter {
    pub fn create(path: &Path) -> io::Result<Self> {
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let file = File::create(&tmp_path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("Failed to create '{}': {}", tmp_path.display(), e),
            )
        })?;
        let sink = if is_compressed(path) {
            Sink::Bgzf(bgzf::io::Writer::new(file))
        } else {
            Sink::Plain(BufWriter::new(file))
        };

        Ok(Self {
            sink: Some(sink),
            tmp_path,
            final_path: path.to_path_buf(),
        })
    }

    fn sink(&mut self) -> io::Result<&mut Sink> {
        self.sink
            .as_mut()
            .ok_or_else(|| io::Error::other("artifact writer already closed"))
    }

    pub fn commit(mut self) -> io::Result<PathBuf> {
        match self.sink()? {
            Sink::Plain(writer) => writer.flush()?,
            Sink::Bgzf(writer) => writer.try_finish()?,
        }
        drop(self.sink.take());
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(self.final_path.clone())
    }
}

impl Drop for ArtifactWriter {
    fn drop(&mut self) {
        // a committed writer has already given up its sink
        if let Some(sink) = self.sink.take() {
            drop(sink);
            if let Err(e) = fs::remove_file(&self.tmp_path) {
                debug!("Cannot remove {}: {}", self.tmp_path.display(), e);
            }
        }
    }
}

impl Write for ArtifactWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.sink()? {
            Sink::Plain(writer) => writer.write(buf),
            Sink::Bgzf(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.sink()? {
            Sink::Plain(writer) => writer.flush(),
            Sink::Bgzf(writer) => writer.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    #[test]
    fn test_artifact_is_renamed_on_commit() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("chr1.pairs.tsv");
        let mut writer = ArtifactWriter::create(&path).unwrap();
        writeln!(writer, "hello").unwrap();
        assert!(!path.exists());
        writer.commit().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
        assert!(!dir.path().join("chr1.pairs.tsv.tmp").exists());
    }

    #[test]
    fn test_uncommitted_artifact_is_removed() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("chr1.ERV.maf.gz");
        {
            let mut writer = ArtifactWriter::create(&path).unwrap();
            writer.write_all(b"##maf version=1\n").unwrap();
            assert!(dir.path().join("chr1.ERV.maf.gz.tmp").exists());
        }
        assert!(!dir.path().join("chr1.ERV.maf.gz.tmp").exists());
        assert!(!path.exists());
    }

    #[test]
    fn test_read_raw_line_strips_terminators() {
        let mut input = Cursor::new(b"a\tb\r\n\xffc\nlast".to_vec());
        let mut buf = Vec::new();
        assert!(read_raw_line(&mut input, &mut buf).unwrap());
        assert_eq!(buf, b"a\tb");
        assert!(read_raw_line(&mut input, &mut buf).unwrap());
        assert_eq!(buf, b"\xffc");
        assert!(read_raw_line(&mut input, &mut buf).unwrap());
        assert_eq!(buf, b"last");
        assert!(!read_raw_line(&mut input, &mut buf).unwrap());
    }

    #[test]
    fn test_compressed_artifact_reads_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("chr1.ERV.maf.gz");
        let mut writer = ArtifactWriter::create(&path).unwrap();
        writer.write_all(b"##maf version=1\n").unwrap();
        writer.commit().unwrap();

        let mut contents = String::new();
        open_reader(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "##maf version=1\n");
    }
}
