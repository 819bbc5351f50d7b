//! CLI output formatting utilities.

use crate::orchestrator::PipelineResult;
use crate::rag::Source;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a cited source.
    pub fn source(index: usize, source: &Source) {
        println!(
            "  {} {} @ {} ({})",
            style(format!("[{}]", index + 1)).cyan(),
            style(&source.title).bold(),
            style(format_timestamp(source.start)).cyan(),
            style(&source.video_id).dim()
        );
        println!("      {}", style(&source.url).dim());
    }

    /// Print an answer with its sources, and optionally timings and cache flags.
    pub fn pipeline_result(result: &PipelineResult, details: bool) {
        println!("\n{}\n", result.answer);

        if !result.sources.is_empty() {
            Output::header("Sources");
            for (i, source) in result.sources.iter().enumerate() {
                Output::source(i, source);
            }
        }

        if details {
            Output::header("Timings");
            for (stage, ms) in &result.timings {
                Output::kv(stage, &format!("{:.1} ms", ms));
            }
            Output::header("Cache");
            for (stage, hit) in &result.cache {
                Output::kv(stage, if *hit { "hit" } else { "miss" });
            }
            println!();
        }
    }

    /// Create a progress bar.
    pub fn progress_bar(len: u64, msg: &str) -> ProgressBar {
        let pb = ProgressBar::new(len);
        if let Ok(template) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(template.progress_chars("#>-"));
        }
        pb.set_message(msg.to_string());
        pb
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(template);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Format seconds as `m:ss`, or `h:mm:ss` past the hour.
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(83.7), "1:23");
        assert_eq!(format_timestamp(3725.0), "1:02:05");
    }
}
