use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::USER_AGENT;
use scraper::{Html, Selector};
use url::Url;

use crate::formats::{Chapter, ComicInfo};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const AGENT: &str = "comicbundle/0.1";

/// Site adapter: turns a comic page into a chapter list and a chapter page
/// into its image URLs. Constructed once at startup and passed down; the
/// pipeline never reaches for it through globals.
#[async_trait::async_trait]
pub trait Source: Send + Sync {
    async fn comic_info(&self, url: &Url) -> anyhow::Result<ComicInfo>;

    /// Image URLs of one chapter page, in reading order. `None` marks an
    /// `<img>` whose `src` is missing.
    async fn chapter_images(&self, url: &str) -> anyhow::Result<Vec<Option<String>>>;
}

/// Adapter for nettruyen-family markup.
pub struct NettruyenSource {
    client: reqwest::Client,
}

impl NettruyenSource {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build source http client")?;
        Ok(Self { client })
    }

    async fn get_html(&self, url: &str) -> anyhow::Result<String> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, AGENT)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {url} returned {status}");
        }
        response
            .text()
            .await
            .with_context(|| format!("read body: {url}"))
    }
}

#[async_trait::async_trait]
impl Source for NettruyenSource {
    async fn comic_info(&self, url: &Url) -> anyhow::Result<ComicInfo> {
        let html = self.get_html(url.as_str()).await?;
        parse_comic_page(&html, url)
    }

    async fn chapter_images(&self, url: &str) -> anyhow::Result<Vec<Option<String>>> {
        let html = self.get_html(url).await?;
        parse_chapter_page(&html)
    }
}

fn selector(css: &str) -> Selector {
    // Selectors are literals; a parse failure is a programming error.
    Selector::parse(css).expect("parse css selector")
}

/// The site lists chapters newest first; the returned list is oldest first.
fn parse_comic_page(html: &str, page_url: &Url) -> anyhow::Result<ComicInfo> {
    let document = Html::parse_document(html);

    let title = document
        .select(&selector("#item-detail .title-detail"))
        .next()
        .map(|el| el.text().collect::<String>().trim().to_owned())
        .filter(|title| !title.is_empty())
        .ok_or_else(|| anyhow::anyhow!("comic title not found: {page_url}"))?;

    let mut chapters = Vec::new();
    for item in document.select(&selector(".list-chapter ul li:not(.heading)")) {
        let link = item
            .select(&selector(".chapter a"))
            .next()
            .ok_or_else(|| anyhow::anyhow!("chapter link not found: {page_url}"))?;
        let chapter_title = link.text().collect::<String>().trim().to_owned();
        let href = link
            .value()
            .attr("href")
            .ok_or_else(|| anyhow::anyhow!("chapter link has no href: {page_url}"))?;
        if chapter_title.is_empty() {
            anyhow::bail!("chapter link has no title: {page_url}");
        }

        let chapter_url = page_url
            .join(href)
            .with_context(|| format!("resolve chapter url: {href}"))?;

        chapters.push(Chapter {
            title: chapter_title,
            url: chapter_url.to_string(),
            images: Vec::new(),
        });
    }

    if chapters.is_empty() {
        anyhow::bail!("chapter list not found: {page_url}");
    }
    chapters.reverse();

    Ok(ComicInfo { title, chapters })
}

fn parse_chapter_page(html: &str) -> anyhow::Result<Vec<Option<String>>> {
    let document = Html::parse_document(html);

    if document.select(&selector(".box_doc")).next().is_none() {
        anyhow::bail!("chapter page structure not found");
    }

    let images = document
        .select(&selector(".box_doc img"))
        .map(|img| img.value().attr("src").map(normalize_image_src))
        .collect();

    Ok(images)
}

/// The site emits protocol-relative image sources.
fn normalize_image_src(src: &str) -> String {
    match src.strip_prefix("//") {
        Some(rest) => format!("http://{rest}"),
        None => src.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMIC_HTML: &str = r#"<!doctype html>
<html><body>
  <div id="item-detail"><h1 class="title-detail">Test Comic</h1></div>
  <div class="list-chapter">
    <ul>
      <li class="heading"><div class="chapter">Chapter</div></li>
      <li><div class="chapter"><a href="/truyen-tranh/test/chap-3">Chapter 3</a></div></li>
      <li><div class="chapter"><a href="/truyen-tranh/test/chap-2">Chapter 2</a></div></li>
      <li><div class="chapter"><a href="/truyen-tranh/test/chap-1">Chapter 1</a></div></li>
    </ul>
  </div>
</body></html>
"#;

    #[test]
    fn comic_page_yields_oldest_first_with_resolved_urls() -> anyhow::Result<()> {
        let page_url = Url::parse("https://comics.example/truyen-tranh/test")?;
        let info = parse_comic_page(COMIC_HTML, &page_url)?;

        assert_eq!(info.title, "Test Comic");
        let titles: Vec<_> = info.chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["Chapter 1", "Chapter 2", "Chapter 3"]);
        assert_eq!(
            info.chapters[0].url,
            "https://comics.example/truyen-tranh/test/chap-1"
        );
        assert!(info.chapters.iter().all(|c| c.images.is_empty()));
        Ok(())
    }

    #[test]
    fn comic_page_without_title_is_not_found() {
        let page_url = Url::parse("https://comics.example/truyen-tranh/missing").unwrap();
        let err = parse_comic_page("<html><body></body></html>", &page_url).unwrap_err();
        assert!(err.to_string().contains("comic title not found"));
    }

    #[test]
    fn chapter_page_keeps_missing_src_as_none() -> anyhow::Result<()> {
        let html = r#"<div class="box_doc">
            <img src="//img.example/p1.jpg" />
            <img alt="broken" />
            <img src="https://img.example/p3.jpg" />
        </div>"#;
        let images = parse_chapter_page(html)?;

        assert_eq!(
            images,
            vec![
                Some("http://img.example/p1.jpg".to_owned()),
                None,
                Some("https://img.example/p3.jpg".to_owned()),
            ]
        );
        Ok(())
    }

    #[test]
    fn chapter_page_without_reader_block_fails() {
        let err = parse_chapter_page("<div class=\"other\"></div>").unwrap_err();
        assert!(err.to_string().contains("chapter page structure not found"));
    }
}
