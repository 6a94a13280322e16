//! Greedy boundary chunking: fit a sectioned document into messages that
//! each stay under an externally imposed payload ceiling.
//!
//! The algorithm is markup-agnostic. It works on a `{document → sections →
//! items}` tree and an injected measurement closure that must return the size
//! of a candidate message *as the wire actually sees it* (serialized JSON
//! payload bytes, not character count — multi-byte characters and JSON
//! escaping both inflate the real size).

/// Appended where a single item had to be cut at a character boundary.
pub const TRUNCATION_MARKER: &str = " …[truncated]";

/// A composed logical document, pre-chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Envelope heading line, without markup.
    pub title: String,
    pub sections: Vec<Section>,
    /// Envelope footer line, e.g. a provenance note.
    pub footer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: String,
    pub items: Vec<String>,
}

impl Section {
    fn render(&self) -> String {
        let mut out = self.heading.clone();
        for item in &self.items {
            out.push('\n');
            out.push_str(item);
        }
        out
    }

    fn render_partial(&self, items: &[String]) -> String {
        Section {
            heading: self.heading.clone(),
            items: items.to_vec(),
        }
        .render()
    }
}

impl Document {
    /// Wrap a body in the fixed envelope. `part` numbers continuation
    /// messages when the document had to be split.
    fn envelope(&self, body: &str, part: Option<usize>) -> String {
        let title = match part {
            None => format!("# {}", self.title),
            Some(n) => format!("# {} (part {n})", self.title),
        };
        format!("{title}\n\n{body}\n\n{}", self.footer)
    }

    fn render_body(&self) -> String {
        self.sections
            .iter()
            .map(Section::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Split `doc` into one or more envelope-wrapped messages, each measuring at
/// or under `ceiling`.
///
/// Accumulation is greedy at section boundaries; a section that alone
/// overflows a message is split again at item boundaries; an item that alone
/// overflows is truncated at a character boundary and marked. Concatenating
/// the produced messages reproduces every section heading and item line of
/// the document except where the truncation marker applies.
pub fn plan_chunks<M>(doc: &Document, ceiling: usize, measure: M) -> Vec<String>
where
    M: Fn(&str) -> usize,
{
    let whole = doc.envelope(&doc.render_body(), None);
    if measure(&whole) <= ceiling {
        return vec![whole];
    }

    let mut chunks: Vec<String> = Vec::new();
    // Rendered sections accumulated for the chunk currently being built.
    let mut current: Vec<String> = Vec::new();

    for section in &doc.sections {
        let rendered = section.render();

        if !current.is_empty() {
            let candidate = join_body(&current, Some(&rendered));
            if measure(&doc.envelope(&candidate, Some(chunks.len() + 1))) <= ceiling {
                current.push(rendered);
                continue;
            }
            flush(doc, &mut chunks, &mut current);
        }

        // Fresh chunk starting with this section.
        if measure(&doc.envelope(&rendered, Some(chunks.len() + 1))) <= ceiling {
            current.push(rendered);
        } else {
            split_section(doc, section, ceiling, &measure, &mut chunks);
        }
    }

    flush(doc, &mut chunks, &mut current);
    chunks
}

fn join_body(sections: &[String], extra: Option<&str>) -> String {
    let mut parts: Vec<&str> = sections.iter().map(String::as_str).collect();
    if let Some(extra) = extra {
        parts.push(extra);
    }
    parts.join("\n\n")
}

fn flush(doc: &Document, chunks: &mut Vec<String>, current: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    let body = join_body(current, None);
    chunks.push(doc.envelope(&body, Some(chunks.len() + 1)));
    current.clear();
}

/// Item-level greedy accumulation for a section too large for any single
/// message. Each produced chunk repeats the section heading.
fn split_section<M>(
    doc: &Document,
    section: &Section,
    ceiling: usize,
    measure: &M,
    chunks: &mut Vec<String>,
) where
    M: Fn(&str) -> usize,
{
    let mut current: Vec<String> = Vec::new();

    for item in &section.items {
        if !current.is_empty() {
            let mut candidate_items = current.clone();
            candidate_items.push(item.clone());
            let body = section.render_partial(&candidate_items);
            if measure(&doc.envelope(&body, Some(chunks.len() + 1))) <= ceiling {
                current.push(item.clone());
                continue;
            }
            let body = section.render_partial(&current);
            chunks.push(doc.envelope(&body, Some(chunks.len() + 1)));
            current.clear();
        }

        let body = section.render_partial(std::slice::from_ref(item));
        if measure(&doc.envelope(&body, Some(chunks.len() + 1))) <= ceiling {
            current.push(item.clone());
        } else if let Some(truncated) = truncate_item(doc, section, item, ceiling, measure, chunks.len() + 1)
        {
            chunks.push(truncated);
        }
    }

    if !current.is_empty() {
        let body = section.render_partial(&current);
        chunks.push(doc.envelope(&body, Some(chunks.len() + 1)));
    }
}

/// Cut one oversized item at the last character boundary that still fits the
/// ceiling with the marker appended. Returns None only in the pathological
/// case where heading + marker alone overflow the ceiling.
fn truncate_item<M>(
    doc: &Document,
    section: &Section,
    item: &str,
    ceiling: usize,
    measure: &M,
    part: usize,
) -> Option<String>
where
    M: Fn(&str) -> usize,
{
    let mut cut = item;
    loop {
        let candidate = format!("{cut}{TRUNCATION_MARKER}");
        let body = section.render_partial(std::slice::from_ref(&candidate));
        let content = doc.envelope(&body, Some(part));
        if measure(&content) <= ceiling {
            return Some(content);
        }
        let mut chars = cut.char_indices();
        let Some((last, _)) = chars.next_back() else {
            return None;
        };
        cut = &item[..last];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Measurement mirroring the webhook wire format.
    fn wire_len(content: &str) -> usize {
        serde_json::to_vec(&serde_json::json!({
            "msgtype": "markdown",
            "markdown": { "content": content },
        }))
        .unwrap()
        .len()
    }

    fn doc(sections: Vec<Section>) -> Document {
        Document {
            title: "Catalog watch".to_string(),
            sections,
            footer: "> shelfwatch".to_string(),
        }
    }

    fn section(heading: &str, items: usize) -> Section {
        Section {
            heading: format!("## {heading}"),
            items: (0..items)
                .map(|i| format!("{}. 敗北者たち Vol.{i} — long enough line to take space", i + 1))
                .collect(),
        }
    }

    #[test]
    fn small_document_is_one_message() {
        let d = doc(vec![section("2025-05", 3)]);
        let chunks = plan_chunks(&d, 4096, wire_len);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("## 2025-05"));
        assert!(!chunks[0].contains("(part"));
    }

    #[test]
    fn large_document_splits_at_section_boundaries() {
        // Five sections, ~10KB total under the wire encoding.
        let d = doc((0..5).map(|i| section(&format!("2025-0{}", i + 1), 30)).collect());
        assert!(wire_len(&d.envelope(&d.render_body(), None)) > 10_000);

        let chunks = plan_chunks(&d, 4096, wire_len);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(wire_len(chunk) <= 4096, "chunk overflows: {} bytes", wire_len(chunk));
        }

        let all = chunks.join("\n");
        for i in 0..5 {
            assert!(all.contains(&format!("## 2025-0{}", i + 1)));
        }
    }

    #[test]
    fn every_item_line_survives_the_split() {
        let d = doc((0..5).map(|i| section(&format!("2025-0{}", i + 1), 30)).collect());
        let chunks = plan_chunks(&d, 4096, wire_len);
        let all = chunks.join("\n");
        for s in &d.sections {
            for item in &s.items {
                assert!(all.contains(item.as_str()), "lost item {item:?}");
            }
        }
    }

    #[test]
    fn oversized_section_splits_at_item_boundaries_with_repeated_heading() {
        let d = doc(vec![section("2025-05", 200)]);
        let chunks = plan_chunks(&d, 4096, wire_len);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(wire_len(chunk) <= 4096);
            assert!(chunk.contains("## 2025-05"));
        }
    }

    #[test]
    fn oversized_item_is_truncated_with_marker_at_char_boundary() {
        let big = "敗".repeat(4000);
        let d = doc(vec![Section {
            heading: "## 2025-05".to_string(),
            items: vec![big],
        }]);
        let chunks = plan_chunks(&d, 4096, wire_len);
        assert_eq!(chunks.len(), 1);
        assert!(wire_len(&chunks[0]) <= 4096);
        assert!(chunks[0].contains(TRUNCATION_MARKER.trim_start()));
        // Still valid UTF-8 by construction; the cut fell between characters.
        assert!(chunks[0].contains('敗'));
    }

    #[test]
    fn multibyte_content_measured_in_wire_bytes_not_chars() {
        // 1500 CJK chars: ~1.5K "characters" but >4.5KB encoded.
        let items: Vec<String> = (0..50).map(|i| format!("{i}. {}", "書".repeat(30))).collect();
        let d = doc(vec![Section {
            heading: "## 2025-05".to_string(),
            items,
        }]);
        let chunks = plan_chunks(&d, 4096, wire_len);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(wire_len(chunk) <= 4096);
        }
    }

    #[test]
    fn deterministic_for_identical_input() {
        let d = doc((0..3).map(|i| section(&format!("s{i}"), 40)).collect());
        let a = plan_chunks(&d, 4096, wire_len);
        let b = plan_chunks(&d, 4096, wire_len);
        assert_eq!(a, b);
    }
}
