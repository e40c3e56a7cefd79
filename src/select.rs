use crate::cli::ModeCommand;
use crate::formats::Chapter;

/// The closed set of download modes. All numbers are 1-based, exactly as the
/// user typed them; `select_groups` validates and converts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadMode {
    All { group_size: usize },
    Groups { group_size: usize, pick: Vec<usize> },
    GroupRange { group_size: usize, start: usize, end: usize },
    Chapter { number: usize },
    ChapterRange { start: usize, end: usize },
    Merge { start: usize, end: usize },
}

impl From<ModeCommand> for DownloadMode {
    fn from(mode: ModeCommand) -> Self {
        match mode {
            ModeCommand::All { group_size } => Self::All { group_size },
            ModeCommand::Groups { group_size, pick } => Self::Groups { group_size, pick },
            ModeCommand::GroupRange {
                group_size,
                start,
                end,
            } => Self::GroupRange {
                group_size,
                start,
                end,
            },
            ModeCommand::Chapter { number } => Self::Chapter { number },
            ModeCommand::ChapterRange { start, end } => Self::ChapterRange { start, end },
            ModeCommand::Merge { start, end } => Self::Merge { start, end },
        }
    }
}

impl DownloadMode {
    /// `Chap` for chapter-oriented modes, `Part` for group-oriented ones.
    fn label(&self) -> &'static str {
        match self {
            Self::Chapter { .. } | Self::ChapterRange { .. } | Self::Merge { .. } => "Chap",
            Self::All { .. } | Self::Groups { .. } | Self::GroupRange { .. } => "Part",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("{what} must be at least 1")]
    Zero { what: &'static str },
    #[error("{what} must not exceed {max} (got {value})")]
    TooLarge {
        what: &'static str,
        value: usize,
        max: usize,
    },
    #[error("end {end} must not be smaller than start {start}")]
    InvertedRange { start: usize, end: usize },
    #[error("at least one group must be picked")]
    NothingPicked,
}

/// Chapters to bundle, partitioned one group per output file, plus the
/// 0-based positions used for file naming. The two run in parallel except in
/// merge mode, where one group carries every included position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub groups: Vec<Vec<Chapter>>,
    pub group_indexes: Vec<usize>,
}

impl Selection {
    /// Output file stem for `groups[part_index]`, without the `.pdf`.
    pub fn file_stem(&self, comic_title: &str, mode: &DownloadMode, part_index: usize) -> String {
        let label = mode.label();
        match mode {
            DownloadMode::Merge { .. } => {
                let first = self.group_indexes.first().copied().unwrap_or(0);
                let last = self.group_indexes.last().copied().unwrap_or(first);
                format!("{comic_title} {label} {} - {}", first + 1, last + 1)
            }
            _ => {
                let number = self.group_indexes[part_index] + 1;
                format!("{comic_title} {label} {number}")
            }
        }
    }
}

/// Partition the full chapter list per the requested mode. Validation
/// failures come back as `SelectError`, never a panic or an abort.
pub fn select_groups(chapters: &[Chapter], mode: &DownloadMode) -> Result<Selection, SelectError> {
    match *mode {
        DownloadMode::All { group_size } => {
            let groups = partition(chapters, group_size)?;
            let group_indexes = (0..groups.len()).collect();
            Ok(Selection {
                groups,
                group_indexes,
            })
        }
        DownloadMode::Groups {
            group_size,
            ref pick,
        } => {
            let all = partition(chapters, group_size)?;
            if pick.is_empty() {
                return Err(SelectError::NothingPicked);
            }
            // Picks keep their original relative order regardless of how the
            // user listed them, and a repeated pick bundles once.
            let mut group_indexes = pick
                .iter()
                .map(|&number| to_index(number, all.len(), "group number"))
                .collect::<Result<Vec<_>, _>>()?;
            group_indexes.sort_unstable();
            group_indexes.dedup();
            let groups = group_indexes.iter().map(|&i| all[i].clone()).collect();
            Ok(Selection {
                groups,
                group_indexes,
            })
        }
        DownloadMode::GroupRange {
            group_size,
            start,
            end,
        } => {
            let all = partition(chapters, group_size)?;
            let group_indexes = to_index_range(start, end, all.len(), "group number")?;
            let groups = group_indexes.iter().map(|&i| all[i].clone()).collect();
            Ok(Selection {
                groups,
                group_indexes,
            })
        }
        DownloadMode::Chapter { number } => {
            let index = to_index(number, chapters.len(), "chapter number")?;
            Ok(Selection {
                groups: vec![vec![chapters[index].clone()]],
                group_indexes: vec![index],
            })
        }
        DownloadMode::ChapterRange { start, end } => {
            let group_indexes = to_index_range(start, end, chapters.len(), "chapter number")?;
            let groups = group_indexes
                .iter()
                .map(|&i| vec![chapters[i].clone()])
                .collect();
            Ok(Selection {
                groups,
                group_indexes,
            })
        }
        DownloadMode::Merge { start, end } => {
            let group_indexes = to_index_range(start, end, chapters.len(), "chapter number")?;
            let merged = group_indexes.iter().map(|&i| chapters[i].clone()).collect();
            Ok(Selection {
                groups: vec![merged],
                group_indexes,
            })
        }
    }
}

/// Consecutive groups of at most `group_size` chapters; the last group may be
/// smaller.
fn partition(chapters: &[Chapter], group_size: usize) -> Result<Vec<Vec<Chapter>>, SelectError> {
    if group_size == 0 {
        return Err(SelectError::Zero { what: "group size" });
    }
    if group_size > chapters.len() {
        return Err(SelectError::TooLarge {
            what: "group size",
            value: group_size,
            max: chapters.len(),
        });
    }
    Ok(chapters.chunks(group_size).map(<[Chapter]>::to_vec).collect())
}

fn to_index(number: usize, max: usize, what: &'static str) -> Result<usize, SelectError> {
    if number == 0 {
        return Err(SelectError::Zero { what });
    }
    if number > max {
        return Err(SelectError::TooLarge {
            what,
            value: number,
            max,
        });
    }
    Ok(number - 1)
}

fn to_index_range(
    start: usize,
    end: usize,
    max: usize,
    what: &'static str,
) -> Result<Vec<usize>, SelectError> {
    let start = to_index(start, max, what)?;
    let end = to_index(end, max, what)?;
    if end < start {
        return Err(SelectError::InvertedRange {
            start: start + 1,
            end: end + 1,
        });
    }
    Ok((start..=end).collect())
}
