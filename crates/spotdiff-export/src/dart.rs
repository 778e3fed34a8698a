//! Dart table export.
//!
//! Emits a `Map<String, List<DifferenceSpot>>` literal the game client
//! pastes into its level data. Only relative coordinates are written, so
//! the table is independent of the asset resolution.
//!
//! ```text
//! // spotdiff
//! static final Map<String, List<DifferenceSpot>> _spotData = {
//!   '1-1': [
//!     const DifferenceSpot(x: 0.5, y: 0.5, radius: 0.24),
//!   ],
//! };
//! ```
//!
//! Stages with no spots are left out.

use std::fmt::Write;

use spotdiff_pipeline::StageResults;

/// Comment lines emitted above the table.
#[derive(Debug, Clone, Default)]
pub struct DartMetadata<'a> {
    /// Emitted as `// Source: <source>`, typically the asset directory.
    pub source: Option<&'a str>,

    /// Free-form description, one `//` line per input line.
    pub description: Option<&'a str>,
}

/// Render accepted spots as a Dart map literal.
///
/// Numbers use Rust's shortest round-trip formatting with a forced
/// decimal point (`1.0`, not `1`), which Dart parses as `double`.
#[must_use]
pub fn to_dart(results: &StageResults, metadata: &DartMetadata<'_>) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "// spotdiff");
    if let Some(source) = metadata.source {
        let _ = writeln!(out, "// Source: {source}");
    }
    if let Some(description) = metadata.description {
        for line in description.lines() {
            let _ = writeln!(out, "// {line}");
        }
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "static final Map<String, List<DifferenceSpot>> _spotData = {{"
    );

    for (stage, spots) in results.iter().filter(|(_, spots)| !spots.is_empty()) {
        let _ = writeln!(out, "  '{}': [", escape(stage));
        for spot in spots {
            let _ = writeln!(
                out,
                "    const DifferenceSpot(x: {:?}, y: {:?}, radius: {:?}),",
                spot.relative_x, spot.relative_y, spot.relative_radius
            );
        }
        let _ = writeln!(out, "  ],");
    }

    out.push_str("};\n");
    out
}

/// Escape a stage id for a single-quoted Dart string.
fn escape(stage: &str) -> String {
    let mut escaped = String::with_capacity(stage.len());
    for c in stage.chars() {
        match c {
            '\\' | '\'' | '$' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}
