use serde::{Deserialize, Serialize};

/// One chapter as listed on the comic page, oldest first. `images` is empty
/// until the chapter page itself has been fetched; a `None` entry is an
/// `<img>` without a usable `src`, kept so page counts line up downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub images: Vec<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComicInfo {
    pub title: String,
    pub chapters: Vec<Chapter>,
}

/// One line of `{out}/chapters.jsonl`, written after all chapter pages of a
/// run have been fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterRecord {
    /// 0-based position in the full chapter list.
    pub index: usize,
    pub title: String,
    pub url: String,
    pub image_count: usize,
    pub retrieved_at: String,
}
