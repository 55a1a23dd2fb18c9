//! Page-level data: route parameters, metadata and cache policies.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Dynamic route parameters, keyed by segment name.
pub type Params = BTreeMap<String, String>;

/// Query parameters; a key may repeat.
pub type Query = BTreeMap<String, Vec<String>>;

/// Props handed to a render call.
pub type Props = serde_json::Value;

/// One concrete path produced from a route pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticPathEntry {
    /// Values for every dynamic segment of the route.
    #[serde(default)]
    pub params: Params,
}

impl StaticPathEntry {
    /// Create an entry from `(name, value)` pairs.
    pub fn new<K, V>(params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Page-level metadata emitted into the document head.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// Document title.
    #[serde(default)]
    pub title: Option<String>,

    /// Meta description.
    #[serde(default)]
    pub description: Option<String>,

    /// Social preview image URL.
    #[serde(default)]
    pub image: Option<String>,

    /// Meta keywords.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Canonical URL override.
    #[serde(default)]
    pub canonical_url: Option<String>,
}

impl PageMetadata {
    /// Overlay `other` on top of `self`; fields set in `other` win.
    #[must_use]
    pub fn merge(mut self, other: PageMetadata) -> Self {
        if other.title.is_some() {
            self.title = other.title;
        }
        if other.description.is_some() {
            self.description = other.description;
        }
        if other.image.is_some() {
            self.image = other.image;
        }
        if !other.keywords.is_empty() {
            self.keywords = other.keywords;
        }
        if other.canonical_url.is_some() {
            self.canonical_url = other.canonical_url;
        }
        self
    }
}

/// Props and metadata produced for one static path.
#[derive(Debug, Clone, PartialEq)]
pub struct PageProps {
    /// Props passed to the page's render call.
    pub props: Props,

    /// Metadata overriding the page's declared metadata.
    pub metadata: PageMetadata,
}

impl Default for PageProps {
    fn default() -> Self {
        Self {
            props: Props::Object(serde_json::Map::new()),
            metadata: PageMetadata::default(),
        }
    }
}

/// Caching policy for a page's rendered output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CachePolicySpec", into = "CachePolicySpec")]
pub enum CachePolicy {
    /// Never stored; every request renders.
    NoCache,
    /// Stored once and never expires.
    #[default]
    Static,
    /// Stored and refreshed once older than `revalidate_after_secs`.
    Timed {
        /// Freshness window in seconds.
        revalidate_after_secs: u64,
        /// Labels used for bulk invalidation.
        tags: BTreeSet<String>,
    },
}

impl CachePolicy {
    /// Create a timed policy.
    pub fn timed<T: Into<String>>(
        revalidate_after_secs: u64,
        tags: impl IntoIterator<Item = T>,
    ) -> Self {
        Self::Timed {
            revalidate_after_secs,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether rendered output may be stored.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, Self::NoCache)
    }

    /// Invalidation tags carried by entries under this policy.
    #[must_use]
    pub fn tags(&self) -> BTreeSet<String> {
        match self {
            Self::Timed { tags, .. } => tags.clone(),
            Self::NoCache | Self::Static => BTreeSet::new(),
        }
    }
}

/// Declarative spelling of [`CachePolicy`] in frontmatter and cache exports.
///
/// `cache: none`, `cache: static`, or `cache: { revalidate: 60, tags: [posts] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum CachePolicySpec {
    Keyword(String),
    Timed {
        revalidate: u64,
        #[serde(default)]
        tags: BTreeSet<String>,
    },
}

impl TryFrom<CachePolicySpec> for CachePolicy {
    type Error = CoreError;

    fn try_from(spec: CachePolicySpec) -> Result<Self, Self::Error> {
        match spec {
            CachePolicySpec::Keyword(word) => match word.as_str() {
                "none" | "no-cache" => Ok(Self::NoCache),
                "static" => Ok(Self::Static),
                other => Err(CoreError::CachePolicy(format!(
                    "unknown policy `{other}` (expected none, static or a revalidate table)"
                ))),
            },
            CachePolicySpec::Timed { revalidate: 0, .. } => Err(CoreError::CachePolicy(
                "revalidate must be at least one second".to_string(),
            )),
            CachePolicySpec::Timed { revalidate, tags } => Ok(Self::Timed {
                revalidate_after_secs: revalidate,
                tags,
            }),
        }
    }
}

impl From<CachePolicy> for CachePolicySpec {
    fn from(policy: CachePolicy) -> Self {
        match policy {
            CachePolicy::NoCache => Self::Keyword("none".to_string()),
            CachePolicy::Static => Self::Keyword("static".to_string()),
            CachePolicy::Timed {
                revalidate_after_secs,
                tags,
            } => Self::Timed {
                revalidate: revalidate_after_secs,
                tags,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Holder {
        cache: CachePolicy,
    }

    #[test]
    fn test_cache_policy_keywords() {
        let holder: Holder = serde_yaml::from_str("cache: none").unwrap();
        assert_eq!(holder.cache, CachePolicy::NoCache);

        let holder: Holder = serde_yaml::from_str("cache: static").unwrap();
        assert_eq!(holder.cache, CachePolicy::Static);
    }

    #[test]
    fn test_cache_policy_timed() {
        let holder: Holder =
            serde_yaml::from_str("cache:\n  revalidate: 60\n  tags: [posts, blog]").unwrap();
        assert_eq!(holder.cache, CachePolicy::timed(60, ["posts", "blog"]));
        assert_eq!(holder.cache.tags().len(), 2);
    }

    #[test]
    fn test_cache_policy_rejects_zero_and_unknown() {
        assert!(serde_yaml::from_str::<Holder>("cache:\n  revalidate: 0").is_err());
        assert!(serde_yaml::from_str::<Holder>("cache: forever").is_err());
    }

    #[test]
    fn test_cache_policy_serializes_to_declarative_form() {
        let json = serde_json::to_string(&CachePolicy::timed(5, ["posts"])).unwrap();
        assert_eq!(json, r#"{"revalidate":5,"tags":["posts"]}"#);
        assert_eq!(
            serde_json::to_string(&CachePolicy::NoCache).unwrap(),
            r#""none""#
        );
    }

    #[test]
    fn test_metadata_merge() {
        let base = PageMetadata {
            title: Some("Blog".to_string()),
            description: Some("All posts".to_string()),
            ..Default::default()
        };
        let entry = PageMetadata {
            title: Some("Hello".to_string()),
            keywords: vec!["rust".to_string()],
            ..Default::default()
        };

        let merged = base.merge(entry);
        assert_eq!(merged.title.as_deref(), Some("Hello"));
        assert_eq!(merged.description.as_deref(), Some("All posts"));
        assert_eq!(merged.keywords, vec!["rust"]);
    }

    #[test]
    fn test_static_path_entry_new() {
        let entry = StaticPathEntry::new([("slug", "a")]);
        assert_eq!(entry.params.get("slug").map(String::as_str), Some("a"));
    }
}
