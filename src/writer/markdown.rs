use async_trait::async_trait;

use super::{validate_path, write_all, FormatWriter, Sink, WriteRequest};
use crate::error::DigestError;

pub struct MarkdownWriter {
    suffix: String,
}

impl MarkdownWriter {
    pub fn new() -> Self {
        MarkdownWriter {
            suffix: String::new(),
        }
    }
}

#[async_trait]
impl FormatWriter for MarkdownWriter {
    async fn start(&mut self, sink: &mut Sink, prefix: &str, suffix: &str) -> Result<(), DigestError> {
        self.suffix = suffix.to_string();
        if prefix.is_empty() {
            return Ok(());
        }
        write_all(sink, format!("# {prefix}\n\n").as_bytes()).await
    }

    async fn write_file(&mut self, sink: &mut Sink, req: WriteRequest) -> Result<(), DigestError> {
        validate_path(req.path())?;

        match req {
            WriteRequest::Inline(w) => {
                let block = format!(
                    "## File: `{}`\n\n```{}\n{}\n```\n\n",
                    w.path, w.language, w.content
                );
                write_all(sink, block.as_bytes()).await
            }
            WriteRequest::Streamed(mut w) => {
                let header = format!("## File: `{}`\n\n```{}\n", w.path, w.language);
                write_all(sink, header.as_bytes()).await?;

                loop {
                    match w.reader.next_chunk().await {
                        Ok(Some(chunk)) => write_all(sink, &chunk).await?,
                        Ok(None) => break,
                        Err(err) => {
                            tracing::error!(path = %w.path, error = %err, "error streaming file, continuing to next request");
                            w.reader.close().await;
                            break;
                        }
                    }
                }

                write_all(sink, b"\n```\n\n").await
            }
        }
    }

    async fn close(&mut self, sink: &mut Sink) -> Result<(), DigestError> {
        if self.suffix.is_empty() {
            return Ok(());
        }
        write_all(sink, format!("\n# {}\n", self.suffix).as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::test_util::SharedBuf;
    use crate::writer::InlineWrite;

    #[tokio::test]
    async fn inline_file_produces_heading_and_fence() {
        let buf = SharedBuf::new();
        let mut writer = MarkdownWriter::new();
        let mut sink: Sink = Box::new(buf.clone());
        writer.start(&mut sink, "Digest", "").await.unwrap();
        writer
            .write_file(
                &mut sink,
                WriteRequest::Inline(InlineWrite {
                    path: "a.go".to_string(),
                    content: "\n---\na.go\npackage a\n".to_string(),
                    language: "go".to_string(),
                    size: 9,
                }),
            )
            .await
            .unwrap();

        let out = buf.contents();
        assert!(out.starts_with("# Digest\n\n"));
        assert!(out.contains("## File: `a.go`\n\n```go\n"));
    }

    #[tokio::test]
    async fn rejects_path_with_parent_component() {
        let buf = SharedBuf::new();
        let mut writer = MarkdownWriter::new();
        let mut sink: Sink = Box::new(buf);
        let err = writer
            .write_file(
                &mut sink,
                WriteRequest::Inline(InlineWrite {
                    path: "../escape.go".to_string(),
                    content: String::new(),
                    language: "go".to_string(),
                    size: 0,
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DigestError::Validation { .. }));
    }
}
