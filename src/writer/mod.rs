// src/writer/mod.rs
//!
//! # Format Writers
//!
//! Three implementations (Markdown/JSON/YAML) share the `FormatWriter`
//! interface: `start`, `write_file`, `close`. The writer owns draining and
//! closing streamed readers; the processor never touches the file handle
//! once a `WriteRequest` is sent.

mod json;
mod markdown;
mod yaml;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::DigestError;

pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

pub type Sink = Box<dyn AsyncWrite + Unpin + Send>;

/// The three supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Markdown,
    Json,
    Yaml,
}

impl std::str::FromStr for Format {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(Format::Markdown),
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            other => Err(DigestError::Validation {
                path: None,
                message: format!("unsupported output format '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InlineWrite {
    pub path: String,
    pub content: String,
    pub language: String,
    pub size: u64,
}

pub struct StreamedWrite {
    pub path: String,
    pub language: String,
    pub reader: StreamedReader,
    pub size: u64,
}

pub enum WriteRequest {
    Inline(InlineWrite),
    Streamed(StreamedWrite),
}

impl WriteRequest {
    pub fn path(&self) -> &str {
        match self {
            WriteRequest::Inline(w) => &w.path,
            WriteRequest::Streamed(w) => &w.path,
        }
    }
}

/// A reader that yields a header sentinel first, then the underlying file's
/// bytes in chunks. Ownership of the file handle transfers here; the file is
/// closed exactly once, on EOF or on explicit `close`.
pub struct StreamedReader {
    header: Option<Vec<u8>>,
    file: Option<tokio::fs::File>,
    closed: Arc<Mutex<bool>>,
}

impl StreamedReader {
    pub fn new(header: Vec<u8>, file: tokio::fs::File) -> Self {
        StreamedReader {
            header: Some(header),
            file: Some(file),
            closed: Arc::new(Mutex::new(false)),
        }
    }

    /// Returns the next chunk of bytes, or `None` at EOF. The first call
    /// returns the header sentinel.
    pub async fn next_chunk(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        if let Some(header) = self.header.take() {
            return Ok(Some(header));
        }

        let file = match self.file.as_mut() {
            Some(file) => file,
            None => return Ok(None),
        };

        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        let n = file.read(&mut buf).await?;
        if n == 0 {
            self.close().await;
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }

    /// Idempotent; drops the file handle on first call.
    pub async fn close(&mut self) {
        let mut closed = self.closed.lock().unwrap();
        if *closed {
            return;
        }
        *closed = true;
        self.file.take();
    }
}

#[async_trait]
pub trait FormatWriter: Send {
    async fn start(&mut self, sink: &mut Sink, prefix: &str, suffix: &str) -> Result<(), DigestError>;
    async fn write_file(&mut self, sink: &mut Sink, req: WriteRequest) -> Result<(), DigestError>;
    async fn close(&mut self, sink: &mut Sink) -> Result<(), DigestError>;
}

pub fn for_format(format: Format) -> Box<dyn FormatWriter> {
    match format {
        Format::Markdown => Box::new(markdown::MarkdownWriter::new()),
        Format::Json => Box::new(json::JsonWriter::new()),
        Format::Yaml => Box::new(yaml::YamlWriter::new()),
    }
}

pub(crate) async fn write_all(sink: &mut Sink, bytes: &[u8]) -> Result<(), DigestError> {
    sink.write_all(bytes).await.map_err(|e| DigestError::Io {
        path: None,
        message: "failed to write to output sink".to_string(),
        cause: Some(e),
    })
}

/// Validates a relative path used in output framing: non-empty, not
/// absolute, and free of `..` components.
pub(crate) fn validate_path(path: &str) -> Result<(), DigestError> {
    if path.is_empty() {
        return Err(DigestError::Validation {
            path: None,
            message: "output path must not be empty".to_string(),
        });
    }
    let p = std::path::Path::new(path);
    if p.is_absolute() {
        return Err(DigestError::Validation {
            path: Some(p.to_path_buf()),
            message: "output path must be relative".to_string(),
        });
    }
    if p.components()
        .any(|c| c == std::path::Component::ParentDir)
    {
        return Err(DigestError::Validation {
            path: Some(p.to_path_buf()),
            message: "output path must not contain '..'".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    use tokio::io::AsyncWrite;

    /// A trivial in-memory sink that exposes the written bytes after the
    /// writer under test is done with it.
    #[derive(Clone, Default)]
    pub struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        pub fn new() -> Self {
            SharedBuf(Arc::new(Mutex::new(Vec::new())))
        }

        pub fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl AsyncWrite for SharedBuf {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }
}
