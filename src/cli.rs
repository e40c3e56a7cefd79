use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the chapters of a comic, oldest first.
    Chapters(ChaptersArgs),
    /// Download chapters and bundle them into PDF files.
    Download(DownloadArgs),
}

#[derive(Debug, Args)]
pub struct ChaptersArgs {
    /// Comic page URL (must be http/https).
    #[arg(long)]
    pub url: String,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Comic page URL (must be http/https).
    #[arg(long)]
    pub url: String,

    /// Output folder. May already exist; cached images in it are reused.
    #[arg(long)]
    pub out: String,

    /// Maximum concurrent chapter-page requests.
    #[arg(long, default_value_t = 20)]
    pub chapter_concurrency: usize,

    /// Maximum concurrent image requests.
    #[arg(long, default_value_t = 10)]
    pub image_concurrency: usize,

    #[command(subcommand)]
    pub mode: ModeCommand,
}

/// Download modes. All chapter/group numbers are 1-based, as printed by
/// `chapters`.
#[derive(Debug, Subcommand)]
pub enum ModeCommand {
    /// Every chapter, split into groups of `--group-size`, one PDF per group.
    All {
        #[arg(long)]
        group_size: usize,
    },
    /// Split into groups of `--group-size`, keep only the picked groups.
    Groups {
        #[arg(long)]
        group_size: usize,

        /// Comma-separated group numbers, kept in the order given.
        #[arg(long, value_delimiter = ',', required = true)]
        pick: Vec<usize>,
    },
    /// Split into groups of `--group-size`, keep groups `--start` to `--end`.
    GroupRange {
        #[arg(long)]
        group_size: usize,

        #[arg(long)]
        start: usize,

        #[arg(long)]
        end: usize,
    },
    /// A single chapter.
    Chapter {
        #[arg(long)]
        number: usize,
    },
    /// Chapters `--start` to `--end`, one PDF per chapter.
    ChapterRange {
        #[arg(long)]
        start: usize,

        #[arg(long)]
        end: usize,
    },
    /// Chapters `--start` to `--end`, merged into a single PDF.
    Merge {
        #[arg(long)]
        start: usize,

        #[arg(long)]
        end: usize,
    },
}
