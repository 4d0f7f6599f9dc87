use super::frame::FrameSnapshot;
use crate::core::{FrameId, Reason, ReasonSet};
use serde::Serialize;

/// Reasons local to one frame, mirroring the frame tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonNode {
    pub frame: FrameId,
    pub url: String,
    pub html_id: Option<String>,
    pub name: Option<String>,
    pub src: Option<String>,
    pub same_origin_with_root: bool,
    pub reasons: ReasonSet,
    pub children: Vec<ReasonNode>,
}

impl ReasonNode {
    /// Empty node for `frame`; children are attached by the caller
    pub fn for_frame(frame: &FrameSnapshot, same_origin_with_root: bool) -> Self {
        Self {
            frame: frame.id,
            url: frame.url.clone(),
            html_id: frame.html_id.clone(),
            name: frame.name.clone(),
            src: frame.src.clone(),
            same_origin_with_root,
            reasons: ReasonSet::new(),
            children: Vec::new(),
        }
    }

    pub fn subtree_blocked(&self) -> bool {
        !self.reasons.is_empty() || self.children.iter().any(ReasonNode::subtree_blocked)
    }

    fn collect_into(&self, out: &mut ReasonSet) {
        out.merge(&self.reasons);
        for child in &self.children {
            child.collect_into(out);
        }
    }

    fn find(&self, frame: FrameId) -> Option<&ReasonNode> {
        if self.frame == frame {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(frame))
    }

    fn page_visible(&self, is_root: bool) -> PageVisibleReasons {
        if !is_root && !self.same_origin_with_root {
            return PageVisibleReasons {
                url: None,
                id: None,
                name: None,
                src: None,
                blocked: self.subtree_blocked(),
                reasons: Vec::new(),
                children: Vec::new(),
            };
        }

        PageVisibleReasons {
            url: Some(self.url.clone()),
            id: self.html_id.clone(),
            name: self.name.clone(),
            src: self.src.clone(),
            blocked: !self.reasons.is_empty(),
            reasons: self
                .reasons
                .kinds()
                .into_iter()
                .map(|k| k.as_str().to_string())
                .collect(),
            children: self.children.iter().map(|c| c.page_visible(false)).collect(),
        }
    }
}

/// Result of one eligibility evaluation.
///
/// Per-node data is written once while the tree is built; [`flatten`]
/// only reads it, so a child's reason can never be lost on the way up.
///
/// [`flatten`]: ReasonTree::flatten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonTree {
    root: ReasonNode,
}

impl ReasonTree {
    pub fn new(root: ReasonNode) -> Self {
        Self { root }
    }

    /// Tree with no frame structure, carrying `reasons` on a bare root
    pub fn from_root_reasons(frame: FrameId, url: impl Into<String>, reasons: ReasonSet) -> Self {
        Self {
            root: ReasonNode {
                frame,
                url: url.into(),
                html_id: None,
                name: None,
                src: None,
                same_origin_with_root: true,
                reasons,
                children: Vec::new(),
            },
        }
    }

    pub fn root(&self) -> &ReasonNode {
        &self.root
    }

    pub fn node(&self, frame: FrameId) -> Option<&ReasonNode> {
        self.root.find(frame)
    }

    /// Union of every node's reasons
    pub fn flatten(&self) -> ReasonSet {
        let mut out = ReasonSet::new();
        self.root.collect_into(&mut out);
        out
    }

    pub fn is_empty(&self) -> bool {
        !self.root.subtree_blocked()
    }

    /// Attach reasons that belong to the page as a whole (evictions,
    /// engine-level policy) to the root node.
    pub fn add_root_reasons(&mut self, reasons: &ReasonSet) {
        self.root.reasons.merge(reasons);
    }

    pub fn add_root_reason(&mut self, reason: impl Into<Reason>) {
        self.root.reasons.insert(reason);
    }

    /// Diagnostics view exposed to the page itself.
    ///
    /// Cross-origin subtrees only reveal whether they block.
    pub fn to_page_visible(&self) -> PageVisibleReasons {
        self.root.page_visible(true)
    }
}

/// Page-visible `notRestoredReasons` structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageVisibleReasons {
    pub url: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub src: Option<String>,
    pub blocked: bool,
    pub reasons: Vec<String>,
    pub children: Vec<PageVisibleReasons>,
}
