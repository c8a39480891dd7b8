use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum LineReadError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One delimiter-separated record, delimiter stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub number: usize,
    pub text: String,
}

/// Streams `path` record by record into `sender`.
///
/// Meant for files too large to load at once. The channel closing is the
/// end-of-file signal; a final record without a trailing delimiter is still
/// sent. Reading stops early, without error, when the receiver is dropped.
/// Invalid UTF-8 is replaced rather than rejected.
pub async fn read_lines(
    path: impl AsRef<Path>,
    delim: u8,
    sender: mpsc::Sender<Line>,
) -> Result<(), LineReadError> {
    let path = path.as_ref();
    let file = File::open(path).await.map_err(|source| LineReadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut number = 0;

    loop {
        buf.clear();
        let read = reader
            .read_until(delim, &mut buf)
            .await
            .map_err(|source| LineReadError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if read == 0 {
            return Ok(());
        }
        if buf.last() == Some(&delim) {
            buf.pop();
        }

        number += 1;
        let line = Line {
            number,
            text: String::from_utf8_lossy(&buf).into_owned(),
        };
        if sender.send(line).await.is_err() {
            return Ok(());
        }
    }
}
