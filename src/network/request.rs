use crate::core::{FrameId, PageId, ProcessId, RequestId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Who issued the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestOrigin {
    Frame,
    /// A dedicated worker, possibly nested; `depth` 1 is a worker started
    /// by the frame itself. Such requests belong to the owning frame.
    DedicatedWorker { depth: u8 },
}

/// How the response body is being read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyConsumer {
    /// Ordinary resource load (images, stylesheets, XHR)
    Resource,
    /// Streamed script compilation; allowed to keep draining while frozen
    ScriptStreamer,
    /// Script reads raw body bytes (`fetch()` body as bytes)
    BytesConsumer,
}

/// One in-flight request attributed to a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub id: RequestId,
    pub page: PageId,
    pub frame: FrameId,
    pub process: ProcessId,
    pub url: String,
    pub origin: RequestOrigin,
    pub consumer: BodyConsumer,
    #[serde(default)]
    pub headers_received: bool,
    #[serde(default)]
    pub body_started: bool,
    #[serde(default)]
    pub total_bytes: u64,
    /// Body bytes that arrived while the page was stored
    #[serde(default)]
    pub bytes_while_frozen: u64,
}

impl RequestDescriptor {
    pub fn new(page: PageId, frame: FrameId, process: ProcessId, url: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            page,
            frame,
            process,
            url: url.into(),
            origin: RequestOrigin::Frame,
            consumer: BodyConsumer::Resource,
            headers_received: false,
            body_started: false,
            total_bytes: 0,
            bytes_while_frozen: 0,
        }
    }

    pub fn from_worker(mut self, depth: u8) -> Self {
        self.origin = RequestOrigin::DedicatedWorker { depth };
        self
    }

    pub fn consumed_by(mut self, consumer: BodyConsumer) -> Self {
        self.consumer = consumer;
        self
    }

    pub fn active_while_frozen(&self) -> bool {
        self.bytes_while_frozen > 0
    }
}

/// Outstanding requests of one page, in start order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSet {
    requests: BTreeMap<RequestId, RequestDescriptor>,
}

impl RequestSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, request: RequestDescriptor) {
        self.requests.insert(request.id, request);
    }

    pub fn get(&self, id: RequestId) -> Option<&RequestDescriptor> {
        self.requests.get(&id)
    }

    pub fn get_mut(&mut self, id: RequestId) -> Option<&mut RequestDescriptor> {
        self.requests.get_mut(&id)
    }

    pub fn remove(&mut self, id: RequestId) -> Option<RequestDescriptor> {
        self.requests.remove(&id)
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.requests.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<RequestId> {
        self.requests.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RequestDescriptor> {
        self.requests.values()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn clear(&mut self) -> Vec<RequestDescriptor> {
        std::mem::take(&mut self.requests).into_values().collect()
    }

    /// Forget the frozen-byte counters, used when a page comes back to life
    pub fn reset_frozen_counters(&mut self) {
        for request in self.requests.values_mut() {
            request.bytes_while_frozen = 0;
        }
    }
}
