//! Asset fetcher (§4.1): downloads layer bytes from `http(s)://` and `data:`
//! URLs, with a TTL/size-bounded byte cache and `.png`/`.gif` extension
//! fallback.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::cache::TtlCache;
use crate::error::FetchError;

/// Fetches asset bytes, caching network/`data:` results by URL.
pub struct AssetFetcher {
    client: reqwest::Client,
    cache: TtlCache<Vec<u8>>,
}

impl AssetFetcher {
    #[must_use]
    pub fn new(client: reqwest::Client, ttl: Duration, max_items: usize) -> Self {
        Self {
            client,
            cache: TtlCache::new(ttl, max_items),
        }
    }

    /// Builds the shared `reqwest::Client` used by the fetcher: keep-alive
    /// pooling, a bounded per-host idle-socket count, and a hard per-request
    /// timeout.
    pub fn build_client(request_timeout: Duration) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(request_timeout)
            .pool_max_idle_per_host(50)
            .build()
    }

    /// Fetches `url`, consulting and populating the byte cache for
    /// `http(s)://` URLs. `data:` URLs are decoded directly and never cached
    /// (decoding is pure and cheap, so caching would add overhead for no
    /// benefit).
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if let Some(rest) = url.strip_prefix("data:") {
            return decode_data_url(rest);
        }

        if let Some(cached) = self.cache.get(url) {
            return Ok(cached);
        }

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(FetchError::UnsupportedScheme(url.to_owned()));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Network {
                url: url.to_owned(),
                source,
            })?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(FetchError::Upstream {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| FetchError::Network {
                url: url.to_owned(),
                source,
            })?
            .to_vec();

        self.cache.insert(url.to_owned(), bytes.clone());
        Ok(bytes)
    }

    /// Calls [`Self::fetch`], retrying once with the `.png`/`.gif` extension
    /// swapped if the first attempt fails and the URL ends in one of those
    /// two extensions (optionally followed by a query string).
    pub async fn fetch_with_extension_fallback(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        match self.fetch(url).await {
            Ok(bytes) => Ok(bytes),
            Err(first_error) => match swap_extension(url) {
                Some(fallback_url) => self.fetch(&fallback_url).await.map_err(|_| first_error),
                None => Err(first_error),
            },
        }
    }
}

fn decode_data_url(rest: &str) -> Result<Vec<u8>, FetchError> {
    let Some((header, payload)) = rest.split_once(',') else {
        return Err(FetchError::InvalidDataUrl);
    };
    if !header.ends_with(";base64") {
        return Err(FetchError::InvalidDataUrl);
    }
    BASE64
        .decode(payload)
        .map_err(FetchError::InvalidDataUrlPayload)
}

/// Splits a URL into `(path_without_extension, extension, query)` for
/// `.png`/`.gif` URLs, so the extension can be swapped and the query string
/// reattached.
fn swap_extension(url: &str) -> Option<String> {
    let (path_and_ext, query) = match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    };

    let swapped = if let Some(stem) = path_and_ext.strip_suffix(".png") {
        format!("{stem}.gif")
    } else if let Some(stem) = path_and_ext.strip_suffix(".gif") {
        format!("{stem}.png")
    } else {
        return None;
    };

    match query {
        Some(query) => Some(format!("{swapped}?{query}")),
        None => Some(swapped),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    const TINY_PNG_BASE64: &str =
        "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR4nGNgAAIAAAUAAen63NgAAAAASUVORK5CYII=";

    fn fetcher() -> AssetFetcher {
        AssetFetcher::new(
            reqwest::Client::new(),
            std::time::Duration::from_secs(60),
            100,
        )
    }

    #[tokio::test]
    async fn fetch_decodes_data_url() {
        let url = format!("data:image/png;base64,{TINY_PNG_BASE64}");
        let bytes = fetcher().fetch(&url).await.expect("data url should decode");
        assert_eq!(base64::engine::general_purpose::STANDARD.decode(TINY_PNG_BASE64).unwrap(), bytes);
    }

    #[tokio::test]
    async fn fetch_rejects_malformed_data_url_header() {
        let result = fetcher().fetch("data:image/png,not-base64-marked").await;
        assert_matches!(result, Err(FetchError::InvalidDataUrl));
    }

    #[tokio::test]
    async fn fetch_rejects_invalid_base64_payload() {
        let result = fetcher().fetch("data:image/png;base64,not valid base64!!").await;
        assert_matches!(result, Err(FetchError::InvalidDataUrlPayload(_)));
    }

    #[tokio::test]
    async fn fetch_rejects_unsupported_scheme() {
        let result = fetcher().fetch("ftp://example.com/a.png").await;
        assert_matches!(result, Err(FetchError::UnsupportedScheme(_)));
    }

    #[test]
    fn swap_extension_handles_png_and_gif() {
        assert_eq!(Some("a/b.gif".to_owned()), swap_extension("a/b.png"));
        assert_eq!(Some("a/b.png".to_owned()), swap_extension("a/b.gif"));
    }

    #[test]
    fn swap_extension_preserves_query_string() {
        assert_eq!(
            Some("a/b.gif?v=2".to_owned()),
            swap_extension("a/b.png?v=2")
        );
    }

    #[test]
    fn swap_extension_returns_none_for_other_extensions() {
        assert_eq!(None, swap_extension("a/b.jpg"));
    }
}
