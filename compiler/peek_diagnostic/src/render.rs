//! Plain-text rendering of diagnostics against their source.

use std::fmt::Write;

use peek_ir::LineIndex;

use crate::Diagnostic;

/// Render `diagnostic` with file/line/column information and a snippet.
///
/// ```text
/// error[E2002]: unresolved reference: `y`
///  --> <fragment>:1:5
///   |
/// 1 | x + y
///   |     ^ not found in this scope
/// ```
pub fn render(diagnostic: &Diagnostic, source: &str, file: &str) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "{}[{}]: {}",
        diagnostic.severity, diagnostic.code, diagnostic.message
    );

    let index = LineIndex::new(source);
    for label in &diagnostic.labels {
        let start = label.span.start.min(index.source_len());
        let (line, col) = index.line_col(start);
        let gutter = line.to_string().len();
        let pad = " ".repeat(gutter);
        if label.is_primary {
            let _ = write!(out, "\n{pad}--> {file}:{line}:{col}");
        }
        let text = source.lines().nth((line - 1) as usize).unwrap_or("");
        let width = label.span.len().max(1) as usize;
        let _ = write!(
            out,
            "\n{pad} |\n{line} | {text}\n{pad} | {}{} {}",
            " ".repeat((col - 1) as usize),
            if label.is_primary { "^" } else { "-" }.repeat(width.min(text.len().max(1))),
            label.message
        );
    }

    for note in &diagnostic.notes {
        let _ = write!(out, "\n = note: {note}");
    }
    out
}
