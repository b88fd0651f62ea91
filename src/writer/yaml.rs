use async_trait::async_trait;

use super::{write_all, FormatWriter, Sink, WriteRequest};
use crate::error::DigestError;

pub struct YamlWriter;

impl YamlWriter {
    pub fn new() -> Self {
        YamlWriter
    }
}

/// YAML-safe quoting: double-quotes and escapes the string if it contains
/// any of `\n\r\t:"'\`, leaves it bare otherwise.
fn q(s: &str) -> String {
    let needs_quote = s
        .chars()
        .any(|c| matches!(c, '\n' | '\r' | '\t' | ':' | '"' | '\'' | '\\'));
    if !needs_quote {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn indent_block(content: &str) -> String {
    let mut out = String::new();
    for line in content.split('\n') {
        out.push_str("      ");
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[async_trait]
impl FormatWriter for YamlWriter {
    async fn start(&mut self, sink: &mut Sink, prefix: &str, suffix: &str) -> Result<(), DigestError> {
        let header = format!("prefix: {}\nsuffix: {}\nfiles:\n", q(prefix), q(suffix));
        write_all(sink, header.as_bytes()).await
    }

    async fn write_file(&mut self, sink: &mut Sink, req: WriteRequest) -> Result<(), DigestError> {
        match req {
            WriteRequest::Inline(w) => {
                let header = format!(
                    "  - path: {}\n    language: {}\n    content: |\n",
                    q(&w.path),
                    w.language
                );
                write_all(sink, header.as_bytes()).await?;
                write_all(sink, indent_block(&w.content).as_bytes()).await
            }
            WriteRequest::Streamed(mut w) => {
                let header = format!(
                    "  - path: {}\n    language: {}\n    content: |\n",
                    q(&w.path),
                    w.language
                );
                write_all(sink, header.as_bytes()).await?;

                let mut pending = String::new();
                loop {
                    match w.reader.next_chunk().await {
                        Ok(Some(chunk)) => {
                            pending.push_str(&String::from_utf8_lossy(&chunk));
                            while let Some(pos) = pending.find('\n') {
                                let line: String = pending.drain(..=pos).collect();
                                let line = line.trim_end_matches('\n');
                                write_all(sink, format!("      {line}\n").as_bytes()).await?;
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            tracing::error!(path = %w.path, error = %err, "error streaming file, continuing to next request");
                            w.reader.close().await;
                            break;
                        }
                    }
                }
                if !pending.is_empty() {
                    write_all(sink, format!("      {pending}\n").as_bytes()).await?;
                }
                Ok(())
            }
        }
    }

    async fn close(&mut self, _sink: &mut Sink) -> Result<(), DigestError> {
        Ok(())
    }
}
