//! Request classification.
//!
//! Every intercepted request is classified exactly once; the resulting
//! [`RequestClass`] drives the rest of the pipeline (bypass, navigation
//! recovery, which partition a write-back lands in).

use bridge_traits::http::HttpRequest;
use core_runtime::config::CacheManifest;
use url::Url;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Targets an excluded host. Never touches partitions.
    Excluded,
    /// Not a GET, not http(s), or not a parseable URL. Never touches partitions.
    Other,
    /// GET for a page document.
    Navigable,
    /// GET for a declared third-party library.
    ExternalAsset,
    /// Any other GET.
    StaticAsset,
}

impl RequestClass {
    /// Whether the engine answers this request at all.
    pub fn is_intercepted(self) -> bool {
        !matches!(self, RequestClass::Excluded | RequestClass::Other)
    }
}

/// Classifies requests against a manifest's excluded hosts and external URLs.
#[derive(Debug, Clone)]
pub struct Classifier {
    excluded_hosts: Vec<String>,
    external_urls: Vec<Url>,
}

impl Classifier {
    pub fn new(excluded_hosts: Vec<String>, external_urls: Vec<Url>) -> Self {
        Self {
            excluded_hosts: excluded_hosts
                .into_iter()
                .map(|h| h.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            external_urls: external_urls.into_iter().map(strip_fragment).collect(),
        }
    }

    pub fn from_manifest(manifest: &CacheManifest) -> Result<Self> {
        Ok(Self::new(
            manifest.excluded_hosts.clone(),
            manifest.resolved_optional()?,
        ))
    }

    pub fn classify(&self, request: &HttpRequest) -> RequestClass {
        let Ok(url) = Url::parse(&request.url) else {
            return RequestClass::Other;
        };

        if self.is_excluded(&url) {
            return RequestClass::Excluded;
        }

        if !request.method.is_read() || !matches!(url.scheme(), "http" | "https") {
            return RequestClass::Other;
        }

        if request.is_navigation() {
            RequestClass::Navigable
        } else if self.is_external(&url) {
            RequestClass::ExternalAsset
        } else {
            RequestClass::StaticAsset
        }
    }

    /// Exact host or any subdomain of an excluded entry.
    pub fn is_excluded(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        self.excluded_hosts.iter().any(|entry| {
            host == entry
                || host
                    .strip_suffix(entry.as_str())
                    .is_some_and(|rest| rest.ends_with('.'))
        })
    }

    /// Exact match, or same scheme, host, port and path with a different query.
    pub fn is_external(&self, url: &Url) -> bool {
        let url = strip_fragment(url.clone());
        self.external_urls.iter().any(|declared| {
            *declared == url
                || (declared.scheme() == url.scheme()
                    && declared.host_str() == url.host_str()
                    && declared.port_or_known_default() == url.port_or_known_default()
                    && declared.path() == url.path())
        })
    }
}

fn strip_fragment(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::http::HttpMethod;

    const JSQR: &str = "https://cdnjs.cloudflare.com/ajax/libs/jsqr/1.4.0/jsQR.min.js";

    fn classifier() -> Classifier {
        Classifier::new(
            vec![
                "googleapis.com".to_string(),
                "openlibrary.org".to_string(),
            ],
            vec![Url::parse(JSQR).unwrap()],
        )
    }

    #[test]
    fn test_excluded_host_and_subdomains() {
        let c = classifier();
        for url in [
            "https://googleapis.com/x",
            "https://www.googleapis.com/books/v1/volumes?q=isbn:123",
            "https://covers.openlibrary.org/b/id/1-M.jpg",
        ] {
            assert_eq!(c.classify(&HttpRequest::get(url)), RequestClass::Excluded, "{url}");
        }
    }

    #[test]
    fn test_lookalike_host_is_not_excluded() {
        let c = classifier();
        let req = HttpRequest::get("https://notgoogleapis.com/script.js");
        assert_eq!(c.classify(&req), RequestClass::StaticAsset);
    }

    #[test]
    fn test_excluded_wins_over_method() {
        let c = classifier();
        let req = HttpRequest::new(HttpMethod::Post, "https://www.googleapis.com/upload");
        assert_eq!(c.classify(&req), RequestClass::Excluded);
    }

    #[test]
    fn test_non_get_is_other() {
        let c = classifier();
        for method in [HttpMethod::Post, HttpMethod::Head, HttpMethod::Delete] {
            let req = HttpRequest::new(method, "https://books.example/api/books");
            assert_eq!(c.classify(&req), RequestClass::Other);
        }
    }

    #[test]
    fn test_unparseable_and_non_http_are_other() {
        let c = classifier();
        assert_eq!(c.classify(&HttpRequest::get("not a url")), RequestClass::Other);
        assert_eq!(
            c.classify(&HttpRequest::get("data:text/plain,hello")),
            RequestClass::Other
        );
    }

    #[test]
    fn test_navigation() {
        let c = classifier();
        let req = HttpRequest::navigate("https://books.example/");
        assert_eq!(c.classify(&req), RequestClass::Navigable);
    }

    #[test]
    fn test_external_match_ignores_query_and_fragment() {
        let c = classifier();
        assert_eq!(c.classify(&HttpRequest::get(JSQR)), RequestClass::ExternalAsset);
        assert_eq!(
            c.classify(&HttpRequest::get(format!("{JSQR}?cache-bust=2#top"))),
            RequestClass::ExternalAsset
        );
        assert_eq!(
            c.classify(&HttpRequest::get(
                "https://cdnjs.cloudflare.com/ajax/libs/jsqr/1.3.0/jsQR.min.js"
            )),
            RequestClass::StaticAsset
        );
    }

    #[test]
    fn test_from_manifest_resolves_relative_externals() {
        let manifest = CacheManifest::new(
            "app",
            "1",
            Url::parse("https://books.example/").unwrap(),
        )
        .with_optional(["/vendor/lib.js"]);
        let c = Classifier::from_manifest(&manifest).unwrap();

        assert_eq!(
            c.classify(&HttpRequest::get("https://books.example/vendor/lib.js")),
            RequestClass::ExternalAsset
        );
        assert!(!RequestClass::Other.is_intercepted());
        assert!(RequestClass::ExternalAsset.is_intercepted());
    }
}
