use std::io::Write;
use std::path::Path;

use annotator_core::{PreviewEntry, ProgressEvent, RunSummary};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn short_title(title: &str) -> String {
    if title.chars().count() > 60 {
        let cut: String = title.chars().take(60).collect();
        format!("{}...", cut)
    } else {
        title.to_string()
    }
}

/// Print a real-time progress event.
pub fn print_progress(
    w: &mut dyn Write,
    event: &ProgressEvent,
    color: ColorMode,
) -> std::io::Result<()> {
    match event {
        ProgressEvent::Started { total } => {
            writeln!(w, "Found {} PDF files to annotate", total)?;
            writeln!(w)?;
        }
        ProgressEvent::Classifying {
            index,
            total,
            title,
        } => {
            writeln!(
                w,
                "[{}/{}] Classifying: \"{}\"",
                index + 1,
                total,
                short_title(title)
            )?;
        }
        ProgressEvent::Classified {
            index,
            total,
            category,
            attempts,
            ..
        } => {
            let idx = index + 1;
            let retries = if *attempts > 1 {
                format!(" after {} attempts", attempts)
            } else {
                String::new()
            };
            if category.is_uncategorized() {
                if color.enabled() {
                    writeln!(w, "[{}/{}] -> {}{}", idx, total, category.yellow(), retries)?;
                } else {
                    writeln!(w, "[{}/{}] -> {}{}", idx, total, category, retries)?;
                }
            } else if color.enabled() {
                writeln!(w, "[{}/{}] -> {}{}", idx, total, category.green(), retries)?;
            } else {
                writeln!(w, "[{}/{}] -> {}{}", idx, total, category, retries)?;
            }
        }
        ProgressEvent::ExtractionFailed {
            index,
            total,
            path,
            error,
            ..
        } => {
            let msg = format!("could not read {}: {}", path.display(), error);
            if color.enabled() {
                writeln!(w, "[{}/{}] {} {}", index + 1, total, "SKIPPED:".red(), msg)?;
            } else {
                writeln!(w, "[{}/{}] SKIPPED: {}", index + 1, total, msg)?;
            }
        }
        ProgressEvent::NoText {
            index,
            total,
            title,
        } => {
            let msg = format!("no text found in \"{}\"", short_title(title));
            if color.enabled() {
                writeln!(w, "[{}/{}] {} {}", index + 1, total, "SKIPPED:".yellow(), msg)?;
            } else {
                writeln!(w, "[{}/{}] SKIPPED: {}", index + 1, total, msg)?;
            }
        }
        ProgressEvent::RowSkipped {
            index,
            total,
            reason,
            ..
        } => {
            if color.enabled() {
                writeln!(
                    w,
                    "[{}/{}] {} row not saved ({})",
                    index + 1,
                    total,
                    "WARNING:".yellow(),
                    reason
                )?;
            } else {
                writeln!(
                    w,
                    "[{}/{}] WARNING: row not saved ({})",
                    index + 1,
                    total,
                    reason
                )?;
            }
        }
        ProgressEvent::Complete { .. } => {
            // Reported by print_summary
        }
    }
    Ok(())
}

/// Print the end-of-run counters and where the rows went.
pub fn print_summary(
    w: &mut dyn Write,
    summary: &RunSummary,
    output_path: &Path,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", "SUMMARY".bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "SUMMARY")?;
        writeln!(w, "{}", sep)?;
    }

    writeln!(w, "  PDFs found:          {}", summary.pdfs_found)?;
    if color.enabled() {
        writeln!(
            w,
            "  Classified:          {}",
            summary.classified.to_string().green()
        )?;
    } else {
        writeln!(w, "  Classified:          {}", summary.classified)?;
    }
    if summary.uncategorized > 0 && color.enabled() {
        writeln!(
            w,
            "  Uncategorized:       {}",
            summary.uncategorized.to_string().yellow()
        )?;
    } else {
        writeln!(w, "  Uncategorized:       {}", summary.uncategorized)?;
    }
    let unreadable = summary.extraction_failures + summary.empty_documents;
    if unreadable > 0 && color.enabled() {
        writeln!(w, "  Unreadable PDFs:     {}", unreadable.to_string().red())?;
    } else {
        writeln!(w, "  Unreadable PDFs:     {}", unreadable)?;
    }
    writeln!(w, "  Rows written:        {}", summary.rows_written)?;
    if summary.rows_skipped > 0 {
        writeln!(w, "  Rows skipped:        {}", summary.rows_skipped)?;
    }
    writeln!(w)?;

    if color.enabled() {
        writeln!(
            w,
            "Annotation completed. Results saved to {}",
            output_path.display().cyan()
        )?;
    } else {
        writeln!(
            w,
            "Annotation completed. Results saved to {}",
            output_path.display()
        )?;
    }
    Ok(())
}

/// Print what a dry run found.
pub fn print_preview(
    w: &mut dyn Write,
    dir: &Path,
    entries: &[PreviewEntry],
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(
            w,
            "{} {} ({} PDF files)\n",
            "DRY RUN:".bold().cyan(),
            dir.display().bold(),
            entries.len()
        )?;
    } else {
        writeln!(w, "DRY RUN: {} ({} PDF files)\n", dir.display(), entries.len())?;
    }

    for (i, entry) in entries.iter().enumerate() {
        match &entry.excerpt_chars {
            Ok(0) => {
                if color.enabled() {
                    writeln!(w, "[{}] {} {}", i + 1, short_title(&entry.title), "(no text)".yellow())?;
                } else {
                    writeln!(w, "[{}] {} (no text)", i + 1, short_title(&entry.title))?;
                }
            }
            Ok(chars) => {
                writeln!(
                    w,
                    "[{}] {} ({} chars)",
                    i + 1,
                    short_title(&entry.title),
                    chars
                )?;
            }
            Err(e) => {
                if color.enabled() {
                    writeln!(w, "[{}] {} {}", i + 1, short_title(&entry.title), e.red())?;
                } else {
                    writeln!(w, "[{}] {} ERROR: {}", i + 1, short_title(&entry.title), e)?;
                }
            }
        }
    }
    Ok(())
}
