//! Plain-text run report printed to stdout.

use crate::models::{ArticleRecord, RunResult, RunStatus, WordFrequencyReport};
use crate::utils::preview;
use std::fmt::Write;

/// Characters of article body shown per article.
const BODY_PREVIEW_CHARS: usize = 500;

/// Most frequent words listed in a report.
const TOP_WORDS: usize = 20;

const RULE: &str = "============================================================";

/// Full report of a single run: articles, word counts, status.
pub fn render_run(run: &RunResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "EL PAÍS OPINION DIGEST: {}", run.target);
    let _ = writeln!(out, "{RULE}");

    if run.records.is_empty() {
        let _ = writeln!(out, "\nNo articles were scraped.");
    }
    for record in &run.records {
        render_article(&mut out, record);
    }

    match &run.report {
        Some(report) => render_words(&mut out, report),
        None => {
            let _ = writeln!(out, "\nNo word analysis available.");
        }
    }

    let _ = writeln!(out, "\n{RULE}");
    let _ = writeln!(out, "Status: {}", status_line(run));
    let _ = writeln!(out, "Elapsed: {:.1}s", run.elapsed_ms as f64 / 1000.0);
    out
}

fn render_article(out: &mut String, record: &ArticleRecord) {
    let _ = writeln!(out, "\nArticle {}: {}", record.id, record.title);
    if let Some(translated) = &record.translated_title {
        let _ = writeln!(out, "  English: {translated}");
    }
    let _ = writeln!(out, "  URL: {}", record.url);
    if record.body.is_empty() {
        let _ = writeln!(out, "  Content: (none found)");
    } else {
        let _ = writeln!(out, "  Content: {}", preview(&record.body, BODY_PREVIEW_CHARS));
    }
    let image = match (&record.image_path, &record.image_url) {
        (Some(path), _) => format!("saved to {}", path.display()),
        (None, Some(url)) => format!("not downloaded ({url})"),
        (None, None) => "none".to_string(),
    };
    let _ = writeln!(out, "  Cover image: {image}");
}

fn render_words(out: &mut String, report: &WordFrequencyReport) {
    let _ = writeln!(out, "\nTop words in translated headlines:");
    for (word, count) in report.top_words(TOP_WORDS) {
        let _ = writeln!(out, "  {word:<20} {count}");
    }

    let _ = writeln!(
        out,
        "\nWords repeated more than {} times:",
        report.threshold
    );
    if report.repeated.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for repeated in &report.repeated {
        let _ = writeln!(out, "  '{}': {} occurrences", repeated.word, repeated.count);
        for title in &repeated.titles {
            let _ = writeln!(out, "    - {title}");
        }
    }
}

fn status_line(run: &RunResult) -> String {
    match &run.status {
        RunStatus::Completed => "completed".to_string(),
        RunStatus::Failed(failure) => format!(
            "failed ({:?} during {:?}): {}",
            failure.kind, failure.stage, failure.message
        ),
    }
}

/// One line per target followed by totals.
pub fn render_distributed(results: &[RunResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "DISTRIBUTED RUN SUMMARY");
    let _ = writeln!(out, "{RULE}");

    for run in results {
        let mark = if run.is_completed() { "PASS" } else { "FAIL" };
        let repeated = run.report.as_ref().map_or(0, |r| r.repeated.len());
        let _ = writeln!(
            out,
            "[{mark}] {:<28} articles: {:<3} repeated words: {:<3} {:.1}s",
            run.target,
            run.records.len(),
            repeated,
            run.elapsed_ms as f64 / 1000.0
        );
        if let Some(failure) = run.failure() {
            let _ = writeln!(out, "       cause: {:?}: {}", failure.kind, failure.message);
        }
    }

    let completed = results.iter().filter(|r| r.is_completed()).count();
    let articles: usize = results.iter().map(|r| r.records.len()).sum();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(
        out,
        "Targets: {}  Completed: {}  Failed: {}  Articles: {}",
        results.len(),
        completed,
        results.len() - completed,
        articles
    );
    out
}
