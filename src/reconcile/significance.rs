use serde_json::json;

use crate::error::Result;
use crate::services::{ErrorReporter, Sanitizer};

/// Decides whether an entry update added enough text to notify readers.
///
/// Only growth counts: the new plain text has to be longer than the old by
/// more than `threshold` characters. Edits and trims never qualify.
pub struct SignificanceDetector<'a> {
    sanitizer: &'a dyn Sanitizer,
    reporter: &'a dyn ErrorReporter,
    threshold: usize,
}

impl<'a> SignificanceDetector<'a> {
    pub fn new(
        sanitizer: &'a dyn Sanitizer,
        reporter: &'a dyn ErrorReporter,
        threshold: usize,
    ) -> Self {
        Self {
            sanitizer,
            reporter,
            threshold,
        }
    }

    pub fn is_significant(&self, current_content: &str, new_content: &str) -> bool {
        // Nothing to compare against on a first backfill.
        if current_content.is_empty() {
            return false;
        }

        match self.plain_growth(current_content, new_content) {
            Ok(growth) => growth > self.threshold as i64,
            Err(e) => {
                self.reporter.report(
                    "receiver#detect_significant_change",
                    "detect_significant_change failed",
                    json!({ "error": e.to_string() }),
                );
                false
            }
        }
    }

    fn plain_growth(&self, current_content: &str, new_content: &str) -> Result<i64> {
        let original_length = self.sanitizer.strip(current_content)?.chars().count() as i64;
        let new_length = self.sanitizer.strip(new_content)?.chars().count() as i64;
        Ok(new_length - original_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::services::{HtmlSanitizer, RecordingReporter};

    struct Verbatim;

    impl Sanitizer for Verbatim {
        fn strip(&self, html: &str) -> Result<String> {
            Ok(html.to_string())
        }
    }

    struct Broken;

    impl Sanitizer for Broken {
        fn strip(&self, _html: &str) -> Result<String> {
            Err(AppError::Sanitize("parser exploded".to_string()))
        }
    }

    fn grown_by(base: &str, extra: usize) -> String {
        format!("{base}{}", "x".repeat(extra))
    }

    #[test]
    fn growth_of_51_is_significant() {
        let reporter = RecordingReporter::default();
        let detector = SignificanceDetector::new(&Verbatim, &reporter, 50);
        assert!(detector.is_significant("old", &grown_by("old", 51)));
    }

    #[test]
    fn growth_of_50_is_not_significant() {
        let reporter = RecordingReporter::default();
        let detector = SignificanceDetector::new(&Verbatim, &reporter, 50);
        assert!(!detector.is_significant("old", &grown_by("old", 50)));
    }

    #[test]
    fn shrinking_is_not_significant() {
        let reporter = RecordingReporter::default();
        let detector = SignificanceDetector::new(&Verbatim, &reporter, 50);
        assert!(!detector.is_significant(&"x".repeat(200), "x"));
    }

    #[test]
    fn empty_baseline_is_never_significant() {
        let reporter = RecordingReporter::default();
        let detector = SignificanceDetector::new(&Verbatim, &reporter, 50);
        assert!(!detector.is_significant("", &"x".repeat(10_000)));
    }

    #[test]
    fn markup_does_not_count_towards_growth() {
        let reporter = RecordingReporter::default();
        let detector = SignificanceDetector::new(&HtmlSanitizer, &reporter, 50);
        let wrapped = format!("<div class=\"{}\"><p>Short note</p></div>", "c".repeat(200));
        assert!(!detector.is_significant("<p>Short note</p>", &wrapped));

        let longer = format!("<p>Short note</p><p>{}</p>", "word ".repeat(30));
        assert!(detector.is_significant("<p>Short note</p>", &longer));
    }

    #[test]
    fn linking_existing_words_is_not_growth() {
        let reporter = RecordingReporter::default();
        let detector = SignificanceDetector::new(&HtmlSanitizer, &reporter, 50);
        let href = format!("https://example.com/{}/0123456789", "very/long/path/".repeat(6));
        let linked = format!("<p>Short note <a href=\"{href}\">here</a></p>");

        assert!(!detector.is_significant("<p>Short note here</p>", &linked));
        assert!(reporter.reports().is_empty());
    }

    #[test]
    fn sanitizer_failure_is_reported_and_insignificant() {
        let reporter = RecordingReporter::default();
        let detector = SignificanceDetector::new(&Broken, &reporter, 50);

        assert!(!detector.is_significant("old", &grown_by("old", 500)));
        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].category, "receiver#detect_significant_change");
    }
}
