use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write as _};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use url::Url;

use crate::cli::DownloadArgs;
use crate::fetch::run_all;
use crate::formats::{ChapterRecord, ComicInfo};
use crate::image_cache::ImageCache;
use crate::select::{DownloadMode, Selection, select_groups};
use crate::source::{NettruyenSource, Source};

pub async fn run(args: DownloadArgs) -> anyhow::Result<()> {
    let source = Arc::new(NettruyenSource::new().context("build source adapter")?);
    run_with_source(args, source).await
}

/// The whole pipeline: resolve chapters, select groups, fetch chapter pages,
/// fill the image cache, then bundle group by group. Each stage finishes
/// before the next starts.
pub async fn run_with_source(
    args: DownloadArgs,
    source: Arc<dyn Source>,
) -> anyhow::Result<()> {
    let comic_url = Url::parse(&args.url).context("parse --url")?;
    if comic_url.scheme() != "http" && comic_url.scheme() != "https" {
        anyhow::bail!("--url must be http/https: {comic_url}");
    }

    let out_dir = PathBuf::from(&args.out);
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("create output folder: {}", out_dir.display()))?;

    let info = source
        .comic_info(&comic_url)
        .await
        .context("fetch comic info")?;
    tracing::info!(title = %info.title, chapters = info.chapters.len(), "comic resolved");

    let mode = DownloadMode::from(args.mode);
    let mut selection = select_groups(&info.chapters, &mode).context("select chapters")?;

    fetch_chapter_pages(
        Arc::clone(&source),
        &mut selection,
        args.chapter_concurrency,
    )
    .await?;
    write_chapter_snapshot(&out_dir, &info, &selection).context("write chapters.jsonl")?;

    let cache = Arc::new(ImageCache::new(&out_dir, &comic_url).context("open image cache")?);
    fetch_images(Arc::clone(&cache), &selection, args.image_concurrency).await?;

    let output_dir = out_dir.join("output");
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("create output dir: {}", output_dir.display()))?;

    for (part_index, group) in selection.groups.iter().enumerate() {
        tracing::info!("converting part {}/{}", part_index + 1, selection.groups.len());

        let image_paths: Vec<PathBuf> = group
            .iter()
            .flat_map(|chapter| chapter.images.iter())
            .flatten()
            .map(|url| cache.cached_path(url))
            .collect();

        let stem = selection.file_stem(&info.title, &mode, part_index);
        let pdf_path = output_dir.join(format!("{stem}.pdf"));
        crate::pdf::write_group_pdf(&image_paths, &pdf_path)
            .with_context(|| format!("bundle {stem}"))?;
    }

    println!("PDF files are in {}", output_dir.display());
    Ok(())
}

/// Stage 1: fetch every selected chapter page and fill in its image list.
async fn fetch_chapter_pages(
    source: Arc<dyn Source>,
    selection: &mut Selection,
    concurrency: usize,
) -> anyhow::Result<()> {
    let chapter_urls: Vec<(usize, usize, String)> = selection
        .groups
        .iter()
        .enumerate()
        .flat_map(|(group_index, group)| {
            group
                .iter()
                .enumerate()
                .map(move |(offset, chapter)| (group_index, offset, chapter.url.clone()))
        })
        .collect();

    let fetched = run_all("chapter", chapter_urls, concurrency, move |item| {
        let source = Arc::clone(&source);
        async move {
            let (group_index, offset, url) = item;
            let images = source.chapter_images(&url).await?;
            Ok((group_index, offset, images))
        }
    })
    .await
    .context("fetch chapter pages")?;

    for (group_index, offset, images) in fetched {
        selection.groups[group_index][offset].images = images;
    }
    Ok(())
}

/// Stage 2: pull every distinct image into the cache. Duplicate URLs within
/// the batch are collapsed before dispatch, so each key is fetched at most
/// once per run.
async fn fetch_images(
    cache: Arc<ImageCache>,
    selection: &Selection,
    concurrency: usize,
) -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    let image_urls: Vec<String> = selection
        .groups
        .iter()
        .flat_map(|group| group.iter())
        .flat_map(|chapter| chapter.images.iter())
        .flatten()
        .filter(|url| seen.insert((*url).clone()))
        .cloned()
        .collect();

    run_all("image", image_urls, concurrency, move |url| {
        let cache = Arc::clone(&cache);
        async move {
            cache.ensure_cached(&url).await?;
            Ok(())
        }
    })
    .await
    .context("fetch images")?;
    Ok(())
}

/// One jsonl line per selected chapter, in bundle order. Overwritten each
/// run; the cache, not the snapshot, is the source of resumability.
fn write_chapter_snapshot(
    out_dir: &std::path::Path,
    info: &ComicInfo,
    selection: &Selection,
) -> anyhow::Result<()> {
    let path = out_dir.join("chapters.jsonl");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .with_context(|| format!("create chapter snapshot: {}", path.display()))?;
    let mut out = BufWriter::new(file);

    let retrieved_at = chrono::Utc::now().to_rfc3339();
    for chapter in selection.groups.iter().flatten() {
        let index = info
            .chapters
            .iter()
            .position(|c| c.url == chapter.url)
            .ok_or_else(|| anyhow::anyhow!("selected chapter not in list: {}", chapter.url))?;

        let record = ChapterRecord {
            index,
            title: chapter.title.clone(),
            url: chapter.url.clone(),
            image_count: chapter.images.len(),
            retrieved_at: retrieved_at.clone(),
        };
        serde_json::to_writer(&mut out, &record).context("serialize chapter record")?;
        out.write_all(b"\n").context("write chapter record newline")?;
    }

    out.flush().context("flush chapter snapshot")?;
    Ok(())
}
