//! Output formatting and styling module.
//!
//! Provides a centralized interface for one-shot CLI output: colored status
//! lines, the progress bar shown while a pass runs, and the per-destination
//! summary table. The long-running watcher reports through `tracing` instead.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Manages all CLI output with consistent styling and formatting.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dumpsort::output::OutputFormatter;
    /// OutputFormatter::success("report_2024.csv -> /archive");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates a progress bar for an organize pass over `total` files.
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Prints how many files went to each destination, plus the skipped total.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dumpsort::output::OutputFormatter;
    /// use std::collections::BTreeMap;
    /// use std::path::PathBuf;
    ///
    /// let mut counts = BTreeMap::new();
    /// counts.insert(PathBuf::from("/archive"), 3);
    /// counts.insert(PathBuf::from("/csv"), 1);
    /// OutputFormatter::summary_table(&counts, 2);
    /// ```
    pub fn summary_table(moved_by_destination: &BTreeMap<PathBuf, usize>, skipped: usize) {
        Self::header("SUMMARY");

        let rows: Vec<(String, usize)> = moved_by_destination
            .iter()
            .map(|(dir, count)| (dir.display().to_string(), *count))
            .collect();
        let moved: usize = rows.iter().map(|(_, count)| count).sum();

        let width = rows
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0)
            .max("Destination".len());

        println!(
            "{:<width$} | {}",
            "Destination".bold(),
            "Files".bold(),
            width = width
        );
        println!("{}", "-".repeat(width + 10));

        for (name, count) in &rows {
            println!(
                "{:<width$} | {} {}",
                name,
                count.to_string().green(),
                file_word(*count),
                width = width
            );
        }

        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {} {}",
            "Moved".bold(),
            moved.to_string().green().bold(),
            file_word(moved),
            width = width
        );
        println!(
            "{:<width$} | {} {}",
            "Skipped".bold(),
            skipped.to_string().yellow().bold(),
            file_word(skipped),
            width = width
        );
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}

fn file_word(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}
