use std::ops::Range;

use ariadne::{Config, Label, Report, ReportKind, Source};

/// Render an error report over `source`, pointing at `span`.
///
/// The output is plain text so it can be logged or printed from any thread.
pub fn render_report(source_id: &str, source: &str, span: Range<usize>, message: &str) -> String {
    let end = span.end.min(source.len());
    let start = span.start.min(end);

    let report = Report::build(ReportKind::Error, source_id, start)
        .with_config(Config::default().with_color(false))
        .with_message(message)
        .with_label(Label::new((source_id, start..end)).with_message(message))
        .finish();

    let mut buffer = Vec::new();
    if report
        .write((source_id, Source::from(source)), &mut buffer)
        .is_err()
    {
        return format!("{source_id}: {message}");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_mentions_message_and_source() {
        let rendered = render_report("demo.js", "let x = ;\n", 8..9, "unexpected token `;`");
        assert!(rendered.contains("unexpected token"));
        assert!(rendered.contains("demo.js"));
    }

    #[test]
    fn test_out_of_range_span_is_clamped() {
        let rendered = render_report("demo.js", "print(", 40..90, "unexpected end of input");
        assert!(rendered.contains("unexpected end of input"));
    }
}
