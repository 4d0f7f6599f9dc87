use crate::core::{BrowsingInstanceId, CacheIdentity, FrameId, Origin, PageId, ProcessId};
use serde::{Deserialize, Serialize};

/// What the network stack told us about a document's main response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseInfo {
    pub status: Option<u16>,
    pub has_response_head: bool,
    pub is_error_document: bool,
    pub cache_control_no_store: bool,
}

impl Default for ResponseInfo {
    fn default() -> Self {
        Self {
            status: Some(200),
            has_response_head: true,
            is_error_document: false,
            cache_control_no_store: false,
        }
    }
}

/// One frame of a page, owning its child frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    #[serde(default)]
    pub id: FrameId,
    pub url: String,
    #[serde(default)]
    pub process: ProcessId,
    /// `id` attribute of the embedding element
    #[serde(default)]
    pub html_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub is_loading: bool,
    #[serde(default)]
    pub response: ResponseInfo,
    #[serde(default)]
    pub children: Vec<FrameSnapshot>,
}

impl FrameSnapshot {
    pub fn new(url: impl Into<String>, process: ProcessId) -> Self {
        Self {
            id: FrameId::new(),
            url: url.into(),
            process,
            html_id: None,
            name: None,
            src: None,
            is_loading: false,
            response: ResponseInfo::default(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: FrameSnapshot) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_attributes(
        mut self,
        html_id: Option<&str>,
        name: Option<&str>,
        src: Option<&str>,
    ) -> Self {
        self.html_id = html_id.map(str::to_string);
        self.name = name.map(str::to_string);
        self.src = src.map(str::to_string);
        self
    }

    pub fn loading(mut self) -> Self {
        self.is_loading = true;
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.response.status = Some(status);
        self
    }

    pub fn with_response(mut self, response: ResponseInfo) -> Self {
        self.response = response;
        self
    }

    pub fn no_store(mut self) -> Self {
        self.response.cache_control_no_store = true;
        self
    }

    pub fn origin(&self) -> Origin {
        Origin::from_url(&self.url)
    }

    /// Pre-order walk over this frame and all descendants
    pub fn walk(&self) -> Vec<&FrameSnapshot> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(frame) = stack.pop() {
            out.push(frame);
            stack.extend(frame.children.iter().rev());
        }
        out
    }

    pub fn frame_ids(&self) -> Vec<FrameId> {
        self.walk().into_iter().map(|f| f.id).collect()
    }

    pub fn find(&self, id: FrameId) -> Option<&FrameSnapshot> {
        self.walk().into_iter().find(|f| f.id == id)
    }

    pub fn processes(&self) -> Vec<ProcessId> {
        let mut out: Vec<ProcessId> = self.walk().into_iter().map(|f| f.process).collect();
        out.sort();
        out.dedup();
        out
    }
}

/// The top-level document being navigated away from, as the navigation
/// subsystem sees it at that moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    #[serde(default)]
    pub page: PageId,
    #[serde(default)]
    pub browsing_instance: BrowsingInstanceId,
    #[serde(default)]
    pub generation: u64,
    /// Other live tabs/popups in the same browsing-context group that could
    /// script this page (e.g. through window.opener)
    #[serde(default)]
    pub related_active_contents: u32,
    pub root: FrameSnapshot,
}

impl PageSnapshot {
    pub fn new(root: FrameSnapshot) -> Self {
        Self {
            page: PageId::new(),
            browsing_instance: BrowsingInstanceId::new(),
            generation: 0,
            related_active_contents: 0,
            root,
        }
    }

    pub fn in_browsing_instance(mut self, browsing_instance: BrowsingInstanceId, generation: u64) -> Self {
        self.browsing_instance = browsing_instance;
        self.generation = generation;
        self
    }

    pub fn with_related_contents(mut self, count: u32) -> Self {
        self.related_active_contents = count;
        self
    }

    pub fn identity(&self) -> CacheIdentity {
        CacheIdentity::new(self.browsing_instance, self.generation, self.page)
    }

    /// Renderer process of the main frame
    pub fn process(&self) -> ProcessId {
        self.root.process
    }

    pub fn url(&self) -> &str {
        &self.root.url
    }

    pub fn frame_ids(&self) -> Vec<FrameId> {
        self.root.frame_ids()
    }
}
