use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::{ORIGIN, REFERER, USER_AGENT};
use sha2::Digest as _;
use url::Url;

/// Substituted for payloads the decoder rejects, so a corrupt image never
/// aborts a run or shifts page counts.
pub const PLACEHOLDER_JPEG: &[u8] = include_bytes!("assets/fallback.jpg");

/// Matches the quality the bundled PDFs are built for.
const JPEG_QUALITY: u8 = 60;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// On-disk image cache keyed by the SHA-256 of the image URL. An entry that
/// exists is never refetched, which is what makes interrupted runs resumable
/// against the same output folder.
pub struct ImageCache {
    images_dir: PathBuf,
    client: reqwest::Client,
    referer_origin: String,
}

impl ImageCache {
    /// `comic_url` supplies the `Referer`/`Origin` the image host expects;
    /// without them hotlink protection rejects the request.
    pub fn new(out_dir: &Path, comic_url: &Url) -> anyhow::Result<Self> {
        let images_dir = out_dir.join("images");
        std::fs::create_dir_all(&images_dir)
            .with_context(|| format!("create images dir: {}", images_dir.display()))?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build image http client")?;

        Ok(Self {
            images_dir,
            client,
            referer_origin: comic_url.origin().ascii_serialization(),
        })
    }

    /// Deterministic cache path for `image_url`, whether or not it exists yet.
    pub fn cached_path(&self, image_url: &str) -> PathBuf {
        self.images_dir.join(format!("{}.jpg", hash_key(image_url)))
    }

    /// Fetch, transcode and store `image_url` unless its cache entry already
    /// exists; either way, return the entry's path.
    pub async fn ensure_cached(&self, image_url: &str) -> anyhow::Result<PathBuf> {
        let path = self.cached_path(image_url);
        if tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("probe cache entry: {}", path.display()))?
        {
            tracing::debug!(url = image_url, "cache hit");
            return Ok(path);
        }

        let response = self
            .client
            .get(image_url)
            .header(USER_AGENT, "comicbundle/0.1")
            .header(REFERER, &self.referer_origin)
            .header(ORIGIN, &self.referer_origin)
            .send()
            .await
            .with_context(|| format!("GET {image_url}"))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {image_url} returned {status}");
        }
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("read image body: {image_url}"))?;

        let data = match transcode_jpeg(&bytes) {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!(url = image_url, "undecodable image, using placeholder: {err}");
                PLACEHOLDER_JPEG.to_vec()
            }
        };

        // Write-then-rename keeps a torn write of one entry from poisoning
        // the cache for later runs.
        let tmp = self.images_dir.join(format!("{}.jpg.part", hash_key(image_url)));
        tokio::fs::write(&tmp, &data)
            .await
            .with_context(|| format!("write cache entry: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("publish cache entry: {}", path.display()))?;

        Ok(path)
    }
}

fn hash_key(image_url: &str) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(image_url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Re-encode arbitrary raster bytes as JPEG at bounded quality.
fn transcode_jpeg(bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    // The JPEG encoder rejects alpha channels.
    let rgb = image::DynamicImage::ImageRgb8(decoded.to_rgb8());

    let mut out = std::io::Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)?;
    Ok(out.into_inner())
}
