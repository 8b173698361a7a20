use crate::models::QueryRecord;
use printpdf::{BuiltinFont, Mm, PdfDocument};
use thiserror::Error;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 15.0;
const TOP: f32 = 275.0;
const BOTTOM: f32 = 20.0;
const LINE_HEIGHT: f32 = 6.0;
const WRAP_AT: usize = 90;

#[derive(Debug, Error)]
#[error("PDF generation failed: {0}")]
pub struct PdfError(String);

/// Text-only export of a stored analysis, flowing onto extra pages as needed.
pub fn generate_pdf(record: &QueryRecord) -> Result<Vec<u8>, PdfError> {
    let (doc, page, layer) = PdfDocument::new(
        format!("Analysis: {}", truncate(record.analysis_result.title(), 48)),
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| PdfError(format!("{e:?}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| PdfError(format!("{e:?}")))?;

    let mut current = doc.get_page(page).get_layer(layer);
    current.use_text(winansi("Geri Dönüşüm Analizi"), 20.0, Mm(MARGIN_LEFT), Mm(TOP), &bold);
    current.use_text(truncate(&record.image_url, 140), 9.0, Mm(MARGIN_LEFT), Mm(TOP - 10.0), &font);
    current.use_text(
        record.created_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        9.0,
        Mm(MARGIN_LEFT),
        Mm(TOP - 15.0),
        &font,
    );

    let mut y = TOP - 28.0;
    let mut page_no = 1;
    for (line, heading) in display_lines(record.analysis_result.as_str()) {
        if y < BOTTOM {
            page_no += 1;
            let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), format!("Page {page_no}"));
            current = doc.get_page(page).get_layer(layer);
            y = TOP;
        }
        let (size, face) = if heading { (13.0, &bold) } else { (10.0, &font) };
        current.use_text(winansi(&line), size, Mm(MARGIN_LEFT), Mm(y), face);
        y -= LINE_HEIGHT;
    }

    doc.save_to_bytes().map_err(|e| PdfError(format!("{e:?}")))
}

/// Markdown report lines stripped of markup and wrapped; `true` marks headings.
fn display_lines(markdown: &str) -> Vec<(String, bool)> {
    let mut out = Vec::new();
    for raw in markdown.lines() {
        let (text, heading) = match raw.strip_prefix("### ").or_else(|| raw.strip_prefix("## ")) {
            Some(rest) => (rest, true),
            None => (raw, false),
        };
        let text = text.replace("**", "");
        if text.is_empty() {
            out.push((String::new(), false));
            continue;
        }
        out.extend(wrap(&text, WRAP_AT).into_iter().map(|l| (l, heading)));
    }
    out
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

// Builtin PDF fonts only cover WinAnsi; these Turkish letters fall outside it.
fn winansi(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'ğ' => 'g',
            'Ğ' => 'G',
            'ş' => 's',
            'Ş' => 'S',
            'ı' => 'i',
            'İ' => 'I',
            other => other,
        })
        .collect()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(max).collect::<String>())
    }
}
