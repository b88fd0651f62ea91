use async_trait::async_trait;

use super::{write_all, FormatWriter, Sink, WriteRequest};
use crate::error::DigestError;

pub struct JsonWriter {
    wrote_any: bool,
}

impl JsonWriter {
    pub fn new() -> Self {
        JsonWriter { wrote_any: false }
    }
}

/// Escapes a string for embedding inside an already-open JSON string
/// literal, i.e. without the surrounding quotes `serde_json::to_string`
/// would add.
fn escape_fragment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

fn quoted(s: &str) -> String {
    serde_json::to_string(s).expect("string serialization cannot fail")
}

#[async_trait]
impl FormatWriter for JsonWriter {
    async fn start(&mut self, sink: &mut Sink, prefix: &str, suffix: &str) -> Result<(), DigestError> {
        let header = format!(
            "{{\"prefix\":{},\"suffix\":{},\"files\":[",
            quoted(prefix),
            quoted(suffix)
        );
        write_all(sink, header.as_bytes()).await
    }

    async fn write_file(&mut self, sink: &mut Sink, req: WriteRequest) -> Result<(), DigestError> {
        if self.wrote_any {
            write_all(sink, b",").await?;
        }
        self.wrote_any = true;

        match req {
            WriteRequest::Inline(w) => {
                let entry = format!(
                    "{{\"path\":{},\"content\":{},\"language\":{}}}",
                    quoted(&w.path),
                    quoted(&w.content),
                    quoted(&w.language)
                );
                write_all(sink, entry.as_bytes()).await
            }
            WriteRequest::Streamed(mut w) => {
                let open = format!(
                    "{{\"path\":{},\"language\":{},\"content\":\"",
                    quoted(&w.path),
                    quoted(&w.language)
                );
                write_all(sink, open.as_bytes()).await?;

                loop {
                    match w.reader.next_chunk().await {
                        Ok(Some(chunk)) => {
                            let text = String::from_utf8_lossy(&chunk);
                            write_all(sink, escape_fragment(&text).as_bytes()).await?;
                        }
                        Ok(None) => break,
                        Err(err) => {
                            tracing::error!(path = %w.path, error = %err, "error streaming file, continuing to next request");
                            w.reader.close().await;
                            break;
                        }
                    }
                }

                write_all(sink, b"\"}").await
            }
        }
    }

    async fn close(&mut self, sink: &mut Sink) -> Result<(), DigestError> {
        write_all(sink, b"]}").await
    }
}
