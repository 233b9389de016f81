//! Command-line arguments.

use clap::{Parser, ValueEnum};
use pagerun_core::TaskSelection;
use std::path::PathBuf;

/// pagerun - run vision-guided end-to-end web tests
#[derive(Debug, Parser)]
#[command(name = "pagerun")]
#[command(version, about = "Run vision-guided end-to-end web tests", long_about = None)]
pub struct Args {
    /// Task file, or directory of *.json task files
    #[arg(default_value = "tasks")]
    pub tasks: PathBuf,

    /// JSON config file (default: ./pagerun.json if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Only run these task ids (repeatable)
    #[arg(long = "task", value_name = "ID")]
    pub task_ids: Vec<String>,

    /// Only run tasks carrying one of these tags (repeatable)
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Leave out tasks carrying any of these tags (repeatable)
    #[arg(long = "exclude-tag", value_name = "TAG")]
    pub exclude_tags: Vec<String>,

    /// Run tasks marked skip
    #[arg(long)]
    pub include_skipped: bool,

    /// Dispatch tasks by priority (1 = first)
    #[arg(long)]
    pub sort_by_priority: bool,

    /// Number of browsers driven at once
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Round budget for tasks that do not set one
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Browser to drive
    #[arg(long, value_enum)]
    pub browser: Option<Browser>,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// WebDriver endpoint
    #[arg(long)]
    pub webdriver_url: Option<String>,

    /// OpenAI-compatible endpoint of the vision-language model
    #[arg(long)]
    pub vlm_url: Option<String>,

    /// Model name sent to the endpoint
    #[arg(long)]
    pub model: Option<String>,

    /// Write the JSON report here
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Save each round's screenshot under this directory
    #[arg(long)]
    pub screenshots: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Warnings and errors only
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Browser {
    Chrome,
    Firefox,
}

impl Args {
    pub fn selection(&self) -> TaskSelection {
        let mut selection = TaskSelection::new();
        for id in &self.task_ids {
            selection = selection.with_id(id.as_str());
        }
        for tag in &self.tags {
            selection = selection.with_include_tag(tag.as_str());
        }
        for tag in &self.exclude_tags {
            selection = selection.with_exclude_tag(tag.as_str());
        }
        selection
    }

    /// Default `EnvFilter` directive for the chosen verbosity.
    pub fn log_directive(&self) -> &'static str {
        if self.verbose {
            "pagerun=debug"
        } else if self.quiet {
            "pagerun=warn"
        } else {
            "pagerun=info"
        }
    }
}
