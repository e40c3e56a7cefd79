use anyhow::Context as _;
use url::Url;

use crate::cli::ChaptersArgs;
use crate::source::{NettruyenSource, Source};

/// Print the comic title and its chapters, oldest first, with the 1-based
/// numbers the download modes take.
pub async fn run(args: ChaptersArgs) -> anyhow::Result<()> {
    let comic_url = Url::parse(&args.url).context("parse --url")?;
    if comic_url.scheme() != "http" && comic_url.scheme() != "https" {
        anyhow::bail!("--url must be http/https: {comic_url}");
    }

    let source = NettruyenSource::new().context("build source adapter")?;
    let info = source
        .comic_info(&comic_url)
        .await
        .context("fetch comic info")?;

    println!("{}", info.title);
    for (index, chapter) in info.chapters.iter().enumerate() {
        println!("{:>5}  {}", index + 1, chapter.title);
    }

    Ok(())
}
