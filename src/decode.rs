//! Image decoder cache (§4.2): decodes bytes into bitmaps via the `image`
//! crate and caches the decoded form keyed by source URL.

use std::time::Duration;

use image::DynamicImage;

use crate::cache::TtlCache;
use crate::error::DecodeError;

/// Decodes and caches bitmaps. A separately budgeted cache from the byte
/// cache, by default half its entry count (§4.2).
pub struct DecoderCache {
    cache: TtlCache<DynamicImage>,
}

impl DecoderCache {
    #[must_use]
    pub fn new(ttl: Duration, max_items: usize) -> Self {
        Self {
            cache: TtlCache::new(ttl, max_items.max(1)),
        }
    }

    /// Returns the decoded bitmap for `key`, decoding `bytes` and inserting
    /// it into the cache on a miss.
    pub fn decode(&self, key: &str, bytes: &[u8]) -> Result<DynamicImage, DecodeError> {
        if let Some(image) = self.cache.get(key) {
            return Ok(image);
        }
        let decoded = image::load_from_memory(bytes)?;
        self.cache.insert(key.to_owned(), decoded.clone());
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const TINY_PNG_BASE64: &str =
        "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR4nGNgAAIAAAUAAen63NgAAAAASUVORK5CYII=";

    fn tiny_png_bytes() -> Vec<u8> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(TINY_PNG_BASE64)
            .unwrap()
    }

    #[test]
    fn decode_caches_by_key() {
        let cache = DecoderCache::new(std::time::Duration::from_secs(60), 10);
        let bytes = tiny_png_bytes();
        let first = cache.decode("layer-a", &bytes).expect("should decode");
        let second = cache.decode("layer-a", &[]).expect("cached hit should not re-decode");
        assert_eq!(first.dimensions(), second.dimensions());
    }

    #[test]
    fn decode_propagates_invalid_bytes() {
        let cache = DecoderCache::new(std::time::Duration::from_secs(60), 10);
        let result = cache.decode("bad", b"not an image");
        assert_matches!(result, Err(DecodeError::Image(_)));
    }
}
