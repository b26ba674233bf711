use flate2::{Compression, write::GzEncoder};
use std::fs::File;
use std::path::Path;

use crate::errors::Error;

/// Output handle: plain file, or gzip compressed on the fly.
pub enum FileDescriptor {
    Plain(File),
    Gzip(GzEncoder<File>),
}

impl std::io::Write for FileDescriptor {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(data),
            Self::Gzip(w) => w.write(data),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Gzip(w) => w.flush(),
        }
    }
}

impl FileDescriptor {
    pub fn create(gzip: bool, path: &Path) -> Result<Self, Error> {
        let fd = File::create(path).map_err(|e| Error::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        if gzip {
            let compression = Compression::new(5);
            Ok(Self::Gzip(GzEncoder::new(fd, compression)))
        } else {
            Ok(Self::Plain(fd))
        }
    }

    /// Terminates the stream, flushing any gzip trailer.
    pub fn finish(self) -> std::io::Result<()> {
        match self {
            Self::Plain(mut w) => {
                use std::io::Write;
                w.flush()
            },
            Self::Gzip(w) => {
                w.finish()?;
                Ok(())
            },
        }
    }
}
