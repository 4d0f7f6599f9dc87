use serde::{Deserialize, Serialize};
use url::Url;

/// Web origin of a document or cookie scope.
///
/// Opaque origins (data:, about:blank after sandboxing, unparsable URLs) are
/// never same-origin with anything, including themselves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    Tuple {
        scheme: String,
        host: String,
        port: u16,
    },
    Opaque,
}

impl Origin {
    pub fn from_url(raw: &str) -> Self {
        match Url::parse(raw) {
            Ok(url) => Self::from(&url),
            Err(_) => Origin::Opaque,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Origin::Opaque)
    }

    pub fn is_http_or_https(&self) -> bool {
        match self {
            Origin::Tuple { scheme, .. } => scheme == "http" || scheme == "https",
            Origin::Opaque => false,
        }
    }

    pub fn same_origin(&self, other: &Origin) -> bool {
        match (self, other) {
            (Origin::Opaque, _) | (_, Origin::Opaque) => false,
            (a, b) => a == b,
        }
    }

    /// Scheme plus the last two host labels.
    ///
    /// Good enough to group subdomains of one registrable domain for process
    /// isolation; ports are ignored like browsers ignore them for sites.
    pub fn site(&self) -> Option<String> {
        match self {
            Origin::Tuple { scheme, host, .. } => {
                let labels: Vec<&str> = host.rsplit('.').take(2).collect();
                let registrable = labels.into_iter().rev().collect::<Vec<_>>().join(".");
                Some(format!("{}://{}", scheme, registrable))
            }
            Origin::Opaque => None,
        }
    }
}

impl From<&Url> for Origin {
    fn from(url: &Url) -> Self {
        match url.origin() {
            url::Origin::Tuple(scheme, host, port) => Origin::Tuple {
                scheme,
                host: host.to_string(),
                port,
            },
            url::Origin::Opaque(_) => Origin::Opaque,
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Tuple { scheme, host, port } => write!(f, "{}://{}:{}", scheme, host, port),
            Origin::Opaque => write!(f, "null"),
        }
    }
}
