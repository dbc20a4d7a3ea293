//! Common, IO-related code.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use flate2::{bufread::MultiGzDecoder, write::GzEncoder, Compression};

/// Magic bytes at the start of gzip (and thus BGZF) streams.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Return whether `content` starts with the gzip magic bytes.
pub fn is_gzip(content: &[u8]) -> bool {
    content.starts_with(&GZIP_MAGIC)
}

/// Transparently wrap in-memory `content` with a gzip decoder.
///
/// Detection is done on the magic bytes rather than on a file name as uploads
/// do not necessarily carry one.  BGZF is a valid multi-member gzip stream and
/// thus handled here as well.
pub fn read_maybe_gz(content: &[u8]) -> Box<dyn BufRead + '_> {
    if is_gzip(content) {
        tracing::trace!("Reading {} bytes as gzip", content.len());
        Box::new(BufReader::new(MultiGzDecoder::new(content)))
    } else {
        tracing::trace!("Reading {} bytes as plain text", content.len());
        Box::new(content)
    }
}

/// Transparently open a file with gzip encoder, or stdout when `path` is `None`.
pub fn open_write_maybe_gz<P>(path: Option<P>) -> Result<Box<dyn Write>, anyhow::Error>
where
    P: AsRef<Path>,
{
    let Some(path) = path else {
        tracing::trace!("Writing to stdout");
        return Ok(Box::new(BufWriter::new(std::io::stdout())));
    };
    if path.as_ref().extension().map(|s| s.to_str()) == Some(Some("gz")) {
        tracing::trace!("Opening {:?} as gzip for writing", path.as_ref());
        let file = File::create(path)?;
        let bufwriter = BufWriter::new(file);
        let encoder = GzEncoder::new(bufwriter, Compression::default());
        Ok(Box::new(encoder))
    } else {
        tracing::trace!("Opening {:?} as plain text for writing", path.as_ref());
        let file = File::create(path)?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

#[cfg(test)]
mod test {
    use std::io::{Read, Write};

    use flate2::{write::GzEncoder, Compression};
    use pretty_assertions::assert_eq;

    #[test]
    fn read_maybe_gz_plain() -> Result<(), anyhow::Error> {
        let mut buf = String::new();
        super::read_maybe_gz(b"##fileformat=VCFv4.2\n").read_to_string(&mut buf)?;

        assert_eq!(buf, "##fileformat=VCFv4.2\n");

        Ok(())
    }

    #[test]
    fn read_maybe_gz_compressed() -> Result<(), anyhow::Error> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"##fileformat=VCFv4.2\n")?;
        let compressed = encoder.finish()?;
        assert!(super::is_gzip(&compressed));

        let mut buf = String::new();
        super::read_maybe_gz(&compressed).read_to_string(&mut buf)?;

        assert_eq!(buf, "##fileformat=VCFv4.2\n");

        Ok(())
    }

    #[test]
    fn open_write_maybe_gz_roundtrip() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let path = tmpdir.join("out.json.gz");
        {
            let mut writer = super::open_write_maybe_gz(Some(&path))?;
            writer.write_all(b"{}")?;
            writer.flush()?;
        }

        let content = std::fs::read(&path)?;
        assert!(super::is_gzip(&content));

        Ok(())
    }
}
