//! Purpose: Immutable URL layout for the asset CDN.
//! Exports: `Endpoints`, `DEFAULT_BASE_URL`.
//! Role: Built once at startup; every fetch URL in the chain comes from here.
//! Invariants: Manifest and generic asset paths differ only in their root segment.
//! Invariants: Both are sharded by the first two hname characters.
use url::Url;

use crate::core::error::{Error, ErrorKind};
use crate::core::hname::shard_prefix;

type ApiResult<T> = Result<T, Error>;

pub const DEFAULT_BASE_URL: &str = "https://assets-umamusume-en.akamaized.net";

const ROOT_PREFIX: &[&str] = &["dl", "vertical"];
const ROOT_SUFFIX: &[&str] = &["manifests", "manifestdat", "root.manifest.bsv.lz4"];
const MANIFEST_ROOT: &[&str] = &["dl", "vertical", "resources", "Manifest"];
const GENERIC_ROOT: &[&str] = &["dl", "vertical", "resources", "Generic"];

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Endpoints {
    base_url: Url,
}

impl Endpoints {
    pub fn new(base_url: &str) -> ApiResult<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn root_manifest_url(&self, app_version: &str) -> ApiResult<Url> {
        if app_version.trim().is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("application version is empty"));
        }
        let mut segments: Vec<&str> = ROOT_PREFIX.to_vec();
        segments.push(app_version);
        segments.extend_from_slice(ROOT_SUFFIX);
        build_url(&self.base_url, &segments)
    }

    pub fn manifest_url(&self, hname: &str) -> ApiResult<Url> {
        sharded_url(&self.base_url, MANIFEST_ROOT, hname)
    }

    pub fn generic_url(&self, hname: &str) -> ApiResult<Url> {
        sharded_url(&self.base_url, GENERIC_ROOT, hname)
    }
}

fn sharded_url(base_url: &Url, root: &[&str], hname: &str) -> ApiResult<Url> {
    if hname.is_empty() {
        return Err(Error::new(ErrorKind::Internal).with_message("empty hname"));
    }
    let mut segments: Vec<&str> = root.to_vec();
    segments.push(shard_prefix(hname));
    segments.push(hname);
    build_url(base_url, &segments)
}

fn normalize_base_url(raw: &str) -> ApiResult<Url> {
    let mut url = Url::parse(raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid base url")
            .with_url(raw)
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("base url must use http or https scheme")
            .with_url(raw));
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Appends segments after any path already present on the base url.
fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Usage)
                .with_message("base url cannot be a base")
                .with_url(base_url.as_str())
        })?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_BASE_URL, Endpoints};
    use crate::core::error::ErrorKind;

    #[test]
    fn root_manifest_url_is_version_scoped() {
        let endpoints = Endpoints::new(DEFAULT_BASE_URL).expect("endpoints");
        let url = endpoints.root_manifest_url("10004010").expect("url");
        assert_eq!(
            url.as_str(),
            "https://assets-umamusume-en.akamaized.net/dl/vertical/10004010/manifests/manifestdat/root.manifest.bsv.lz4"
        );
    }

    #[test]
    fn sharded_urls_differ_only_in_root() {
        let endpoints = Endpoints::new(DEFAULT_BASE_URL).expect("endpoints");
        let hname = "EAOQ3DBNJATH6OEEKH66B7KJZC2YGZ7E";
        assert_eq!(
            endpoints.manifest_url(hname).expect("url").as_str(),
            "https://assets-umamusume-en.akamaized.net/dl/vertical/resources/Manifest/EA/EAOQ3DBNJATH6OEEKH66B7KJZC2YGZ7E"
        );
        assert_eq!(
            endpoints.generic_url(hname).expect("url").as_str(),
            "https://assets-umamusume-en.akamaized.net/dl/vertical/resources/Generic/EA/EAOQ3DBNJATH6OEEKH66B7KJZC2YGZ7E"
        );
    }

    #[test]
    fn base_path_and_trailing_slash_are_kept() {
        let endpoints = Endpoints::new("http://127.0.0.1:8080/mirror/").expect("endpoints");
        let url = endpoints.manifest_url("ABCD").expect("url");
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8080/mirror/dl/vertical/resources/Manifest/AB/ABCD"
        );
    }

    #[test]
    fn app_version_is_a_single_segment() {
        let endpoints = Endpoints::new("http://localhost").expect("endpoints");
        let url = endpoints.root_manifest_url("1/../2").expect("url");
        assert!(url.as_str().contains("/dl/vertical/1%2F..%2F2/manifests/"));

        let err = endpoints.root_manifest_url("  ").expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn rejects_non_http_base() {
        let err = Endpoints::new("ftp://example.com").expect_err("scheme");
        assert_eq!(err.kind(), ErrorKind::Usage);
        let err = Endpoints::new("not a url").expect_err("parse");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
