//! Plain-text summary table for `generate`.

use protosync_core::pipeline::GenerateReport;

const HEADERS: [&str; 3] = ["Module", "Schema files", "Index mapping"];

/// Render one block per module, one line per schema file.
pub(crate) fn render(report: &GenerateReport) -> String {
    let rows: Vec<[Vec<String>; 3]> = report
        .modules
        .iter()
        .map(|m| {
            [
                vec![m.module.clone()],
                m.files.iter().map(|f| f.file.clone()).collect(),
                m.files.iter().map(|f| f.mapping.to_string()).collect(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (col, lines) in row.iter().enumerate() {
            for line in lines {
                widths[col] = widths[col].max(line.chars().count());
            }
        }
    }

    let rule = format!(
        " {}",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join(" ")
    );

    let mut out = Vec::new();
    out.push(rule.clone());
    out.push(line(&widths, &HEADERS.map(String::from)));
    out.push(rule.clone());
    for row in &rows {
        let height = row.iter().map(Vec::len).max().unwrap_or(1);
        for i in 0..height {
            let cells = [0, 1, 2].map(|col| row[col].get(i).cloned().unwrap_or_default());
            out.push(line(&widths, &cells));
        }
    }
    out.push(rule);
    out.join("\n")
}

fn line(widths: &[usize; 3], cells: &[String; 3]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| format!("{cell:<w$}", w = *w))
        .collect();
    format!("  {}", padded.join("   "))
}
