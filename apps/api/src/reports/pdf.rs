//! Fixed-layout A4 PDF rendering for interview reports.
//!
//! Pages are built from the standard Helvetica faces so no fonts need to be
//! embedded. Text is greedy word-wrapped against the Helvetica AFM widths and
//! flows onto new pages when the cursor reaches the bottom margin.

use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("PDF encoding failed: {0}")]
    Pdf(String),
}

/// Everything a report needs, gathered before rendering starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewReport {
    pub interview_id: Uuid,
    pub candidate_name: String,
    pub candidate_email: String,
    pub job_title: Option<String>,
    pub score: Option<i32>,
    pub recommendation: Option<String>,
    pub summary: Option<String>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    /// `(speaker, text)` pairs, already trimmed to the excerpt length.
    pub transcript_excerpt: Vec<(String, String)>,
    pub generated_at: DateTime<Utc>,
}

// ────────────────────────────────────────────────────────────────────────────
// Page geometry
// ────────────────────────────────────────────────────────────────────────────

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 56.0;
const TEXT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const LINE_SPACING: f32 = 1.35;
const BULLET_INDENT: f32 = 14.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Face {
    Regular,
    Bold,
}

impl Face {
    fn resource(&self) -> &'static str {
        match self {
            Face::Regular => "F1",
            Face::Bold => "F2",
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Font metrics
// ────────────────────────────────────────────────────────────────────────────

/// Helvetica advance widths in 1/1000 em for ASCII 0x20..=0x7E.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // sp - /
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // : - @
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A-M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N-Z
    278, 278, 278, 469, 556, 333, // [ - `
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a-m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n-z
    334, 260, 334, 584, // { - ~
];

/// Bold faces run roughly five percent wider than regular.
const BOLD_FACTOR: f32 = 1.05;

fn text_width(text: &str, face: Face, size: f32) -> f32 {
    let units: u32 = text
        .chars()
        .map(|c| match c as u32 {
            code @ 0x20..=0x7E => HELVETICA_WIDTHS[(code - 0x20) as usize] as u32,
            _ => 556,
        })
        .sum();
    let factor = if face == Face::Bold { BOLD_FACTOR } else { 1.0 };
    units as f32 / 1000.0 * size * factor
}

/// Greedy word wrap. Words wider than the line are split by character.
fn wrap(text: &str, face: Face, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if text_width(&candidate, face, size) <= max_width {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if text_width(word, face, size) <= max_width {
            current = word.to_string();
            continue;
        }
        for c in word.chars() {
            current.push(c);
            if text_width(&current, face, size) > max_width {
                current.pop();
                lines.push(std::mem::take(&mut current));
                current.push(c);
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Maps text onto what the standard fonts can show under WinAnsi encoding.
fn pdf_safe(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' | '\u{2014}' | '\u{2022}' => '-',
            '\t' | '\n' | '\r' => ' ',
            c if (' '..='~').contains(&c) => c,
            _ => '?',
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Page builder
// ────────────────────────────────────────────────────────────────────────────

struct PageBuilder {
    pages: Vec<Vec<Operation>>,
    current: Vec<Operation>,
    cursor_y: f32,
}

impl PageBuilder {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: Vec::new(),
            cursor_y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn ensure_room(&mut self, height: f32) {
        if self.cursor_y - height < MARGIN && !self.current.is_empty() {
            self.pages.push(std::mem::take(&mut self.current));
            self.cursor_y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn line(&mut self, text: &str, face: Face, size: f32, indent: f32) {
        let height = size * LINE_SPACING;
        self.ensure_room(height);
        self.cursor_y -= height;
        self.current.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![face.resource().into(), size.into()]),
            Operation::new("Td", vec![(MARGIN + indent).into(), self.cursor_y.into()]),
            Operation::new("Tj", vec![Object::string_literal(pdf_safe(text))]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn paragraph(&mut self, text: &str, face: Face, size: f32) {
        for line in wrap(&pdf_safe(text), face, size, TEXT_WIDTH) {
            self.line(&line, face, size, 0.0);
        }
    }

    fn bullet(&mut self, text: &str, size: f32) {
        let lines = wrap(&pdf_safe(text), Face::Regular, size, TEXT_WIDTH - BULLET_INDENT);
        for (i, line) in lines.iter().enumerate() {
            if i == 0 {
                self.line(&format!("-  {line}"), Face::Regular, size, 0.0);
            } else {
                self.line(line, Face::Regular, size, BULLET_INDENT);
            }
        }
    }

    fn heading(&mut self, text: &str) {
        self.gap(10.0);
        // Keep a heading with at least two lines of its section.
        self.ensure_room(14.0 * LINE_SPACING + 2.0 * 10.5 * LINE_SPACING);
        self.line(text, Face::Bold, 14.0, 0.0);
        self.rule();
    }

    fn rule(&mut self) {
        self.cursor_y -= 4.0;
        self.current.extend([
            Operation::new("w", vec![0.5_f32.into()]),
            Operation::new("m", vec![MARGIN.into(), self.cursor_y.into()]),
            Operation::new("l", vec![(PAGE_WIDTH - MARGIN).into(), self.cursor_y.into()]),
            Operation::new("S", vec![]),
        ]);
        self.cursor_y -= 2.0;
    }

    fn gap(&mut self, height: f32) {
        self.cursor_y -= height;
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}

fn assemble(pages: Vec<Vec<Operation>>, title: &str) -> Result<Vec<u8>, RenderError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => regular, "F2" => bold },
    });

    let mut kids: Vec<ObjectId> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations }
            .encode()
            .map_err(|e| RenderError::Pdf(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        kids.push(doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        }));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids.into_iter().map(Object::Reference).collect::<Vec<_>>(),
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(pdf_safe(title)),
        "Producer" => Object::string_literal("hirewire-api"),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| RenderError::Pdf(e.to_string()))?;
    Ok(out)
}

// ────────────────────────────────────────────────────────────────────────────
// Documents
// ────────────────────────────────────────────────────────────────────────────

fn metadata_block(page: &mut PageBuilder, report: &InterviewReport) {
    page.line(
        &format!("Candidate: {} <{}>", report.candidate_name, report.candidate_email),
        Face::Regular,
        10.5,
        0.0,
    );
    if let Some(job) = &report.job_title {
        page.line(&format!("Position: {job}"), Face::Regular, 10.5, 0.0);
    }
    page.line(
        &format!("Generated: {}", report.generated_at.format("%Y-%m-%d %H:%M UTC")),
        Face::Regular,
        10.5,
        0.0,
    );
}

fn score_line(report: &InterviewReport) -> String {
    let score = report
        .score
        .map(|s| format!("{s} / 100"))
        .unwrap_or_else(|| "not scored".to_string());
    match &report.recommendation {
        Some(rec) => format!("Score: {score}    Recommendation: {rec}"),
        None => format!("Score: {score}"),
    }
}

/// The full interview report: assessment plus a transcript excerpt.
pub fn render_report(report: &InterviewReport) -> Result<Vec<u8>, RenderError> {
    let mut page = PageBuilder::new();

    page.line("Interview Report", Face::Bold, 22.0, 0.0);
    page.gap(4.0);
    metadata_block(&mut page, report);
    page.gap(6.0);
    page.line(&score_line(report), Face::Bold, 13.0, 0.0);

    if let Some(summary) = report.summary.as_deref().filter(|s| !s.trim().is_empty()) {
        page.heading("Summary");
        page.paragraph(summary, Face::Regular, 10.5);
    }

    for (title, items) in [("Strengths", &report.strengths), ("Weaknesses", &report.weaknesses)] {
        if items.is_empty() {
            continue;
        }
        page.heading(title);
        for item in items {
            page.bullet(item, 10.5);
        }
    }

    if !report.transcript_excerpt.is_empty() {
        page.heading("Transcript excerpt");
        for (speaker, text) in &report.transcript_excerpt {
            page.paragraph(speaker, Face::Bold, 9.5);
            page.paragraph(text, Face::Regular, 9.5);
            page.gap(3.0);
        }
    }

    assemble(page.finish(), &format!("Interview report - {}", report.candidate_name))
}

/// A one-page digest for sharing with hiring panels.
pub fn render_candidate_summary(report: &InterviewReport) -> Result<Vec<u8>, RenderError> {
    let mut page = PageBuilder::new();

    page.line(&report.candidate_name, Face::Bold, 20.0, 0.0);
    page.gap(4.0);
    metadata_block(&mut page, report);
    page.gap(6.0);
    page.line(&score_line(report), Face::Bold, 13.0, 0.0);

    if let Some(summary) = report.summary.as_deref().filter(|s| !s.trim().is_empty()) {
        page.heading("At a glance");
        page.paragraph(summary, Face::Regular, 10.5);
    }
    if !report.strengths.is_empty() {
        page.heading("Top strengths");
        for item in report.strengths.iter().take(3) {
            page.bullet(item, 10.5);
        }
    }

    assemble(page.finish(), &format!("Candidate summary - {}", report.candidate_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(transcript_turns: usize) -> InterviewReport {
        InterviewReport {
            interview_id: Uuid::new_v4(),
            candidate_name: "Ada Lovelace".into(),
            candidate_email: "ada@example.com".into(),
            job_title: Some("Compiler Engineer".into()),
            score: Some(82),
            recommendation: Some("advance".into()),
            summary: Some("Strong systems background with clear communication.".into()),
            strengths: vec!["Deep knowledge of parsing".into(), "Explains trade-offs".into()],
            weaknesses: vec!["Limited distributed systems exposure".into()],
            transcript_excerpt: (0..transcript_turns)
                .map(|i| {
                    (
                        if i % 2 == 0 { "Interviewer" } else { "Candidate" }.to_string(),
                        "A reasonably long answer that should wrap across more than one line when rendered at the transcript font size.".to_string(),
                    )
                })
                .collect(),
            generated_at: Utc::now(),
        }
    }

    fn page_count(bytes: &[u8]) -> usize {
        Document::load_mem(bytes).unwrap().get_pages().len()
    }

    #[test]
    fn test_report_is_a_pdf() {
        let bytes = render_report(&sample(2)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert_eq!(page_count(&bytes), 1);
    }

    #[test]
    fn test_long_transcript_breaks_pages() {
        let bytes = render_report(&sample(120)).unwrap();
        assert!(page_count(&bytes) > 1);
    }

    #[test]
    fn test_summary_is_single_page() {
        let bytes = render_candidate_summary(&sample(120)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert_eq!(page_count(&bytes), 1);
    }

    #[test]
    fn test_empty_report_still_renders() {
        let mut report = sample(0);
        report.summary = None;
        report.strengths.clear();
        report.weaknesses.clear();
        report.score = None;
        assert!(render_report(&report).unwrap().starts_with(b"%PDF"));
    }

    #[test]
    fn test_wrap_respects_width() {
        let text = "the quick brown fox jumps over the lazy dog ".repeat(10);
        let lines = wrap(&text, Face::Regular, 10.0, 200.0);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| text_width(l, Face::Regular, 10.0) <= 200.0));
    }

    #[test]
    fn test_wrap_splits_oversized_words() {
        let lines = wrap(&"x".repeat(200), Face::Regular, 10.0, 100.0);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat().len(), 200);
    }

    #[test]
    fn test_pdf_safe_replaces_unsupported_characters() {
        assert_eq!(pdf_safe("\u{201C}ok\u{201D} \u{2014} caf\u{e9}"), "\"ok\" - caf?");
    }
}
