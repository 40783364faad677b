//! On-disk artifact cache (§4.5): content-addressed `<fingerprint>.<ext>`
//! files under a fixed output directory, written atomically and served back
//! as stable, immutable URLs.

use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

const CANDIDATE_EXTENSIONS: [&str; 2] = ["gif", "png"];

/// Owns the output directory and composes public URLs for artifacts in it.
pub struct ArtifactStore {
    output_dir: PathBuf,
    public_base_url: String,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(output_dir: PathBuf, public_base_url: String) -> Self {
        Self {
            output_dir,
            public_base_url: public_base_url.trim_end_matches('/').to_owned(),
        }
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn url_for(&self, fingerprint: &str, ext: &str) -> String {
        format!("{}/out/{fingerprint}.{ext}", self.public_base_url)
    }

    /// Probes for an existing artifact under `.gif` then `.png`; first hit wins.
    pub async fn lookup(&self, fingerprint: &str) -> Option<(String, &'static str)> {
        for ext in CANDIDATE_EXTENSIONS {
            let path = self.output_dir.join(format!("{fingerprint}.{ext}"));
            if fs::try_exists(&path).await.unwrap_or(false) {
                return Some((self.url_for(fingerprint, ext), ext));
            }
        }
        None
    }

    /// Writes `bytes` to `<fingerprint>.<ext>` atomically: write to a sibling
    /// temp file, then `rename` into place, so a concurrent reader never
    /// observes a partial file. Returns the public URL.
    pub async fn write(
        &self,
        fingerprint: &str,
        ext: &str,
        bytes: &[u8],
    ) -> std::io::Result<String> {
        fs::create_dir_all(&self.output_dir).await?;
        let final_path = self.output_dir.join(format!("{fingerprint}.{ext}"));
        let temp_path = self
            .output_dir
            .join(format!(".{fingerprint}-{}.tmp", Uuid::new_v4()));

        fs::write(&temp_path, bytes).await?;
        match fs::rename(&temp_path, &final_path).await {
            Ok(()) => Ok(self.url_for(fingerprint, ext)),
            Err(error) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile_like::TempDir;

    use super::*;

    /// Minimal stand-in so this module doesn't pull in a dev-dependency
    /// solely for a handful of directory-cleanup tests.
    mod tempfile_like {
        use std::path::PathBuf;

        pub struct TempDir(PathBuf);

        impl TempDir {
            pub fn new(label: &str) -> Self {
                let path = std::env::temp_dir().join(format!(
                    "render-service-artifact-test-{label}-{}",
                    uuid::Uuid::new_v4()
                ));
                Self(path)
            }

            pub fn path(&self) -> PathBuf {
                self.0.clone()
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.0);
            }
        }
    }

    #[tokio::test]
    async fn write_then_lookup_round_trips() {
        let dir = TempDir::new("round-trip");
        let store = ArtifactStore::new(dir.path(), "https://example.com".to_owned());

        let url = store.write("abc123", "png", b"fake-png-bytes").await.unwrap();
        assert_eq!("https://example.com/out/abc123.png", url);

        let found = store.lookup("abc123").await;
        assert_eq!(Some(("https://example.com/out/abc123.png".to_owned(), "png")), found);
    }

    #[tokio::test]
    async fn lookup_misses_unknown_fingerprint() {
        let dir = TempDir::new("miss");
        let store = ArtifactStore::new(dir.path(), "https://example.com".to_owned());
        assert_eq!(None, store.lookup("does-not-exist").await);
    }

    #[tokio::test]
    async fn gif_takes_priority_over_png_on_lookup() {
        let dir = TempDir::new("priority");
        let store = ArtifactStore::new(dir.path(), "https://example.com".to_owned());
        store.write("fp", "png", b"png-bytes").await.unwrap();
        store.write("fp", "gif", b"gif-bytes").await.unwrap();

        assert_eq!(
            Some(("https://example.com/out/fp.gif".to_owned(), "gif")),
            store.lookup("fp").await
        );
    }

    #[tokio::test]
    async fn write_leaves_no_temp_file_behind() {
        let dir = TempDir::new("no-temp");
        let store = ArtifactStore::new(dir.path(), "https://example.com".to_owned());
        store.write("fp", "png", b"bytes").await.unwrap();

        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(vec!["fp.png".to_owned()], names);
    }
}
