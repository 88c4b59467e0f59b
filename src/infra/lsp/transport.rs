//! LSP Transport Layer
//!
//! Handles LSP message framing with Content-Length headers over any async
//! byte stream (child stdio in production, in-memory pipes in tests).

use std::io;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::protocol::Message;

/// Reads framed messages from the server
pub struct MessageReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
        }
    }

    /// Read the next message from the server
    ///
    /// LSP messages are framed with headers:
    /// ```text
    /// Content-Length: 123\r\n
    /// \r\n
    /// {"jsonrpc":"2.0",...}
    /// ```
    pub async fn read_message(&mut self) -> io::Result<Message> {
        let content_length = self.read_headers().await?;

        let mut body = vec![0u8; content_length];
        self.reader.read_exact(&mut body).await?;

        let json =
            String::from_utf8(body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        tracing::trace!("LSP <- {}", json);

        Message::parse(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    async fn read_headers(&mut self) -> io::Result<usize> {
        let mut content_length: Option<usize> = None;
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = self.reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Server closed connection",
                ));
            }

            let line = line.trim();

            if line.is_empty() {
                // Tolerate stray blank lines before the first header
                if content_length.is_none() {
                    continue;
                }
                break;
            }

            if let Some((name, value)) = line.split_once(':')
                && name.trim().eq_ignore_ascii_case("content-length")
            {
                content_length = Some(
                    value
                        .trim()
                        .parse()
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
                );
            }
        }

        content_length
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "Missing Content-Length"))
    }
}

/// Serialize and write one framed message
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: Serialize,
{
    let json = serde_json::to_string(message)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    tracing::trace!("LSP -> {}", json);

    let framed = format!("Content-Length: {}\r\n\r\n{}", json.len(), json);
    writer.write_all(framed.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::lsp::protocol::{Notification, Request};

    fn frame(json: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", json.len(), json).into_bytes()
    }

    #[tokio::test]
    async fn test_read_split_frames() {
        let json = r#"{"jsonrpc":"2.0","id":1,"result":null}"#;
        let bytes = frame(json);
        let (head, tail) = bytes.split_at(10);
        let mock = tokio_test::io::Builder::new().read(head).read(tail).build();

        let mut reader = MessageReader::new(mock);
        let message = reader.read_message().await.unwrap();
        assert!(matches!(message, Message::Response(_)));
    }

    #[tokio::test]
    async fn test_read_ignores_extra_headers() {
        let json = r#"{"jsonrpc":"2.0","method":"initialized","params":{}}"#;
        let raw = format!(
            "Content-Type: application/vscode-jsonrpc; charset=utf-8\r\ncontent-length: {}\r\n\r\n{}",
            json.len(),
            json
        );
        let mock = tokio_test::io::Builder::new().read(raw.as_bytes()).build();

        let mut reader = MessageReader::new(mock);
        assert!(matches!(
            reader.read_message().await.unwrap(),
            Message::Notification(_)
        ));
    }

    #[tokio::test]
    async fn test_read_eof_is_unexpected_eof() {
        let mock = tokio_test::io::Builder::new().build();
        let mut reader = MessageReader::new(mock);
        let err = reader.read_message().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_read_missing_length() {
        let mock = tokio_test::io::Builder::new()
            .read(b"X-Other: 1\r\n\r\n")
            .build();
        let mut reader = MessageReader::new(mock);
        let err = reader.read_message().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_content_length_counts_bytes() {
        let note = Notification::new("window/logMessage", Some(serde_json::json!({"m": "é"})));
        let json = serde_json::to_string(&note).unwrap();
        let mock = tokio_test::io::Builder::new().write(&frame(&json)).build();

        let mut writer = mock;
        write_message(&mut writer, &note).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_then_read_over_duplex() {
        let (mut client, server) = tokio::io::duplex(1024);
        let request = Request::new(7, "shutdown", None);
        write_message(&mut client, &request).await.unwrap();

        let mut reader = MessageReader::new(server);
        match reader.read_message().await.unwrap() {
            Message::Request(req) => {
                assert_eq!(req.method, "shutdown");
                assert_eq!(req.id, 7.into());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
