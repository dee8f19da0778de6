use crate::error::{Error, Resource};
use crate::events::{EventSink, UiEvent};
use crate::writer::read_payload;
use anyhow::Result;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound on the buffer reserved from a `Content-Length` header.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

/// Where the three tile-data payloads come from.
pub trait PayloadSource: Send + Sync {
    fn fetch(&self, resource: Resource, sink: &dyn EventSink) -> Result<Vec<u8>>;
}

// ── Remote (HTTP) ───────────────────────────────────────────────────────────

pub struct RemoteSource {
    base_url: String,
    agent: ureq::Agent,
}

impl RemoteSource {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn url(&self, resource: Resource) -> String {
        format!("{}/{}", self.base_url, resource.file_name())
    }
}

fn retrieval_failed(resource: Resource, reason: impl ToString) -> anyhow::Error {
    Error::RetrievalFailed {
        resource,
        reason: reason.to_string(),
    }
    .into()
}

impl PayloadSource for RemoteSource {
    /// Download one resource. Any non-2xx status fails the retrieval; there is no retry.
    fn fetch(&self, resource: Resource, sink: &dyn EventSink) -> Result<Vec<u8>> {
        let url = self.url(resource);
        sink.send(UiEvent::Log(format!("Downloading: {}", url)));

        let resp = self.agent.get(&url).call().map_err(|e| match e {
            ureq::Error::StatusCode(code) => retrieval_failed(resource, format!("HTTP {}", code)),
            other => retrieval_failed(resource, other),
        })?;

        let total_size: u64 = resp
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        sink.send(UiEvent::DownloadStarted { resource, total_bytes: total_size });

        let mut reader = resp.into_body().into_reader();
        // content-length is only a hint
        let mut data = Vec::with_capacity(total_size.min(MAX_PREALLOC) as usize);
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let n = reader
                .read(&mut buffer)
                .map_err(|e| retrieval_failed(resource, e))?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buffer[..n]);
            sink.send(UiEvent::DownloadProgress { bytes_read: data.len() as u64 });
        }

        sink.send(UiEvent::DownloadComplete { resource, size_bytes: data.len() as u64 });
        Ok(data)
    }
}

// ── Local files (offline backfill) ──────────────────────────────────────────

/// Previously downloaded `in.dat` / `va.dat` files, optionally zstd-compressed.
pub struct LocalSource {
    pub data: PathBuf,
    pub header: PathBuf,
    pub config: Option<PathBuf>,
}

impl LocalSource {
    pub fn new(data: PathBuf, header: PathBuf) -> Self {
        Self { data, header, config: None }
    }
}

impl PayloadSource for LocalSource {
    fn fetch(&self, resource: Resource, _sink: &dyn EventSink) -> Result<Vec<u8>> {
        let path = match resource {
            Resource::Data => &self.data,
            Resource::Header => &self.header,
            Resource::Config => self
                .config
                .as_ref()
                .ok_or_else(|| retrieval_failed(resource, "no local config file given"))?,
        };
        read_payload(path).map_err(|e| retrieval_failed(resource, format!("{:#}", e)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::events::PipelineControl;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};
    use std::thread;

    /// Collects events; never pauses.
    pub(crate) struct RecordingSink {
        pub events: Mutex<Vec<UiEvent>>,
        pub control: Arc<PipelineControl>,
    }

    impl RecordingSink {
        pub(crate) fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                control: Arc::new(PipelineControl::new()),
            }
        }
    }

    impl EventSink for RecordingSink {
        fn send(&self, event: UiEvent) {
            self.events.lock().unwrap().push(event);
        }
        fn check(&self) -> Result<()> {
            self.control.check()
        }
        fn wait(&self, _dur: Duration) -> Result<()> {
            self.control.check()
        }
    }

    /// Serve `routes` (path, status, body) over HTTP/1.1, one connection per request.
    pub(crate) fn serve(routes: Vec<(&'static str, u16, Vec<u8>)>) -> String {
        serve_with_length(routes, None)
    }

    /// Like [`serve`], but every response advertises `content_length` when given.
    pub(crate) fn serve_with_length(routes: Vec<(&'static str, u16, Vec<u8>)>, content_length: Option<u64>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                        break;
                    }
                }
                let path = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (status, body) = routes
                    .iter()
                    .find(|(p, _, _)| *p == path)
                    .map(|(_, s, b)| (*s, b.clone()))
                    .unwrap_or((404, b"not found".to_vec()));
                let head = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    content_length.unwrap_or(body.len() as u64)
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&body);
                let _ = stream.flush();
            }
        });
        format!("http://{}/tiles/data", addr)
    }

    #[test]
    fn test_remote_fetch_ok() {
        let base = serve(vec![("/tiles/data/va.dat", 200, b"1181;0;positivi;positivi_1000".to_vec())]);
        let source = RemoteSource::new(&base, Duration::from_secs(5));
        let sink = RecordingSink::new();

        let body = source.fetch(Resource::Header, &sink).unwrap();
        assert_eq!(body, b"1181;0;positivi;positivi_1000");

        let events = sink.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(
            e,
            UiEvent::DownloadComplete { resource: Resource::Header, size_bytes: 29 }
        )));
    }

    #[test]
    fn test_remote_status_error_names_resource() {
        let base = serve(vec![("/tiles/data/in.dat", 503, Vec::new())]);
        let source = RemoteSource::new(&base, Duration::from_secs(5));
        let err = source.fetch(Resource::Data, &RecordingSink::new()).unwrap_err();

        match err.downcast_ref::<Error>() {
            Some(Error::RetrievalFailed { resource, reason }) => {
                assert_eq!(*resource, Resource::Data);
                assert_eq!(reason, "HTTP 503");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_remote_bogus_content_length() {
        let base = serve_with_length(vec![("/tiles/data/in.dat", 200, b"abcd".to_vec())], Some(u64::MAX));
        let source = RemoteSource::new(&base, Duration::from_secs(5));
        // the body ends early, so either the bytes or an error come back; never a panic
        match source.fetch(Resource::Data, &RecordingSink::new()) {
            Ok(body) => assert_eq!(body, b"abcd"),
            Err(e) => assert!(matches!(
                e.downcast_ref::<Error>(),
                Some(Error::RetrievalFailed { resource: Resource::Data, .. })
            )),
        }
    }

    #[test]
    fn test_url_joining() {
        let source = RemoteSource::new("https://example.org/tiles/data/", Duration::from_secs(1));
        assert_eq!(source.url(Resource::Config), "https://example.org/tiles/data/config.json");
    }

    #[test]
    fn test_local_source() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("in_1106.dat");
        let header = dir.path().join("va_1106.dat");
        std::fs::write(&data, [1u8, 0, 0, 0]).unwrap();
        std::fs::write(&header, "a;b;x;y").unwrap();

        let source = LocalSource::new(data, header);
        let sink = RecordingSink::new();
        assert_eq!(source.fetch(Resource::Data, &sink).unwrap(), vec![1, 0, 0, 0]);
        assert_eq!(source.fetch(Resource::Header, &sink).unwrap(), b"a;b;x;y");
        assert!(source.fetch(Resource::Config, &sink).is_err());
    }
}
