use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder};

use crate::transport::{CancelToken, ChunkUpload, CompleteUpload, FileUpload, TransferError, Transport};

/// Transport speaking the upload endpoints over HTTP.
///
/// Requests are blocking and cannot be interrupted once sent; cancellation
/// takes effect before the next request.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        // No client-side timeout: a transfer runs until the server answers
        // or the batch is cancelled.
        let client = Client::builder()
            .timeout(None)
            .user_agent(concat!("syncbox/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url)
    }

    fn send(&self, req: RequestBuilder, cancel: &CancelToken) -> Result<(), TransferError> {
        cancel.check()?;
        let resp = req
            .send()
            .map_err(|e| TransferError::Network(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().unwrap_or_default();
        Err(TransferError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

fn file_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

impl Transport for HttpTransport {
    fn upload_file(&self, req: &FileUpload<'_>, cancel: &CancelToken) -> Result<(), TransferError> {
        let form = Form::new()
            .part("file", Part::bytes(req.content.to_vec()).file_name(file_name(req.path)))
            .text("path", req.path.to_string())
            .text("size", req.size.to_string())
            .text("mtime", req.mtime.to_rfc3339())
            .text("hash", req.hash.to_string());
        self.send(self.client.post(self.url("upload")).multipart(form), cancel)
    }

    fn upload_chunk(&self, req: &ChunkUpload<'_>, cancel: &CancelToken) -> Result<(), TransferError> {
        let form = Form::new()
            .part("chunk", Part::bytes(req.content.to_vec()).file_name(file_name(req.path)))
            .text("path", req.path.to_string())
            .text("chunkIndex", req.chunk_index.to_string())
            .text("totalChunks", req.total_chunks.to_string())
            .text("uploadId", req.upload_id.to_string())
            .text("hash", req.hash.to_string())
            .text("chunkHash", req.chunk_hash.to_string());
        self.send(self.client.post(self.url("upload/chunk")).multipart(form), cancel)
    }

    fn complete_upload(&self, req: &CompleteUpload<'_>, cancel: &CancelToken) -> Result<(), TransferError> {
        self.send(self.client.post(self.url("upload/complete")).json(req), cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve one request with `status`, returning the raw request text.
    fn one_shot_server(status: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut head = String::new();
            let mut content_length = 0usize;
            let mut chunked = false;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let lower = line.to_ascii_lowercase();
                if let Some(v) = lower.strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap();
                }
                if lower.starts_with("transfer-encoding:") && lower.contains("chunked") {
                    chunked = true;
                }
                head.push_str(&line);
                if line == "\r\n" {
                    break;
                }
            }
            let mut body_buf = Vec::new();
            if chunked {
                loop {
                    let mut size_line = String::new();
                    reader.read_line(&mut size_line).unwrap();
                    let size = usize::from_str_radix(size_line.trim(), 16).unwrap();
                    let mut part = vec![0u8; size + 2];
                    reader.read_exact(&mut part).unwrap();
                    if size == 0 {
                        break;
                    }
                    body_buf.extend_from_slice(&part[..size]);
                }
            } else {
                body_buf.resize(content_length, 0);
                reader.read_exact(&mut body_buf).unwrap();
            }
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            head + &String::from_utf8_lossy(&body_buf)
        });
        (format!("http://{addr}/api/sync/"), handle)
    }

    fn sample_file<'a>(content: &'a [u8]) -> FileUpload<'a> {
        FileUpload {
            path: "docs/readme.md",
            size: content.len() as u64,
            mtime: chrono::Utc::now(),
            hash: "deadbeef",
            content,
        }
    }

    #[test]
    fn test_upload_file_sends_multipart_fields() {
        let (base, server) = one_shot_server("200 OK", "{}");
        let transport = HttpTransport::new(&base).unwrap();
        transport
            .upload_file(&sample_file(b"hello"), &CancelToken::new())
            .unwrap();

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /api/sync/upload HTTP/1.1"));
        assert!(request.contains("name=\"file\"; filename=\"readme.md\""));
        assert!(request.contains("name=\"path\"\r\n\r\ndocs/readme.md"));
        assert!(request.contains("name=\"hash\"\r\n\r\ndeadbeef"));
        assert!(request.contains("hello"));
    }

    #[test]
    fn test_non_success_becomes_http_error() {
        let (base, server) = one_shot_server("503 Service Unavailable", "busy");
        let transport = HttpTransport::new(&base).unwrap();
        let err = transport
            .complete_upload(
                &CompleteUpload {
                    path: "a.bin",
                    upload_id: "u",
                    total_chunks: 2,
                    hash: "h",
                },
                &CancelToken::new(),
            )
            .unwrap_err();
        server.join().unwrap();
        match err {
            TransferError::Http { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "busy");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cancelled_token_sends_nothing() {
        // Nothing listens on this address; a sent request would fail with a
        // network error rather than `Cancelled`.
        let transport = HttpTransport::new("http://127.0.0.1:9").unwrap();
        let token = CancelToken::new();
        token.cancel();
        let err = transport.upload_file(&sample_file(b"x"), &token).unwrap_err();
        assert!(matches!(err, TransferError::Cancelled));
    }
}
