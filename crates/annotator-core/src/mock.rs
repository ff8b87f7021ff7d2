//! Scripted test doubles for the pipeline seams.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use crate::api::{ApiResponse, GenerateRequest, GenerativeApi, TransportError};
use crate::backend::{BackendError, PdfBackend};
use crate::retry::Sleeper;

/// A configurable reply for [`MockApi`].
#[derive(Clone, Debug)]
pub enum MockReply {
    /// HTTP 200 whose first candidate carries `text`.
    Text(String),
    /// Any status with a raw body.
    Status { status: u16, body: String },
    /// Connection-level failure.
    TransportError(String),
}

impl MockReply {
    pub fn text(text: &str) -> Self {
        MockReply::Text(text.to_string())
    }

    pub fn status(status: u16) -> Self {
        MockReply::Status {
            status,
            body: String::new(),
        }
    }

    /// Gemini-shaped success body carrying `text`.
    pub fn success_body(text: &str) -> String {
        serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": text}]}}]
        })
        .to_string()
    }
}

/// A hand-rolled mock implementing [`GenerativeApi`].
///
/// Replies are served in order; the last one repeats once the script is
/// exhausted. Every request is recorded for inspection.
pub struct MockApi {
    script: Mutex<Vec<MockReply>>,
    fallback: MockReply,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl MockApi {
    /// A mock that always gives `reply`.
    pub fn new(reply: MockReply) -> Self {
        Self::with_sequence(vec![reply])
    }

    /// A mock that gives `replies` in order, repeating the last one.
    pub fn with_sequence(mut replies: Vec<MockReply>) -> Self {
        assert!(!replies.is_empty(), "sequence must have at least one reply");
        replies.reverse();
        let fallback = replies[0].clone();
        Self {
            script: Mutex::new(replies),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// How many times `generate()` has been called.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Prompt text of every request, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| {
                r.contents
                    .first()
                    .and_then(|c| c.parts.first())
                    .and_then(|p| p.text.clone())
                    .unwrap_or_default()
            })
            .collect()
    }

    fn next_reply(&self) -> MockReply {
        self.script
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl GenerativeApi for MockApi {
    fn generate<'a>(
        &'a self,
        request: &'a GenerateRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + Send + 'a>> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.next_reply();

        Box::pin(async move {
            match reply {
                MockReply::Text(text) => Ok(ApiResponse {
                    status: 200,
                    body: MockReply::success_body(&text),
                }),
                MockReply::Status { status, body } => Ok(ApiResponse { status, body }),
                MockReply::TransportError(msg) => Err(TransportError(msg)),
            }
        })
    }
}

/// A [`Sleeper`] that records requested waits and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn durations(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.slept.lock().unwrap().push(duration);
        Box::pin(std::future::ready(()))
    }
}

/// A [`PdfBackend`] serving canned text keyed by file name.
///
/// Files with no entry fail with [`BackendError::OpenError`], the way an
/// unreadable PDF does.
#[derive(Default)]
pub struct MockPdfBackend {
    texts: HashMap<String, String>,
    extracted: Mutex<Vec<PathBuf>>,
}

impl MockPdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, file_name: &str, text: &str) -> Self {
        self.texts.insert(file_name.to_string(), text.to_string());
        self
    }

    /// Paths passed to `extract_text`, in call order.
    pub fn extracted(&self) -> Vec<PathBuf> {
        self.extracted.lock().unwrap().clone()
    }
}

impl PdfBackend for MockPdfBackend {
    fn extract_text(&self, path: &Path) -> Result<String, BackendError> {
        self.extracted.lock().unwrap().push(path.to_path_buf());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.texts
            .get(&name)
            .cloned()
            .ok_or_else(|| BackendError::OpenError(format!("cannot open {}", name)))
    }
}
