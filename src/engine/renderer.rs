//! Diagram renderer seam and the built-in flowchart syntax checker.
//!
//! The healing loop only needs a fallible `render` call; the concrete
//! renderer (a browser-side mermaid.js instance, a headless renderer, or the
//! built-in checker) is behind the [`DiagramRenderer`] trait.

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use super::types::RenderedDiagram;

/// Diagnostic text from a failed render, taken from the renderer's own
/// error reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderDiagnostic {
    pub message: String,
}

impl RenderDiagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl std::fmt::Display for RenderDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Abstraction over the external rendering capability.
///
/// Input is arbitrary text in the diagram description language; no
/// pre-validation is performed. The call is a suspension point and must be
/// treated as fallible every time.
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    async fn render(&self, source: &str) -> Result<RenderedDiagram, RenderDiagnostic>;
}

// =============================================================================
// FlowchartChecker — built-in renderer
// =============================================================================

/// Built-in renderer: parses Mermaid flowchart syntax and rejects the same
/// constructs mermaid.js rejects (unquoted parentheses or quotes in labels,
/// undefined arrow tokens, unbalanced subgraph blocks, missing header).
///
/// Success yields a layout summary payload rather than an SVG; the point is
/// a renderer that works without a browser and produces
/// `Parse error on line N: ...` diagnostics the repair prompt can quote.
pub struct FlowchartChecker;

#[async_trait]
impl DiagramRenderer for FlowchartChecker {
    async fn render(&self, source: &str) -> Result<RenderedDiagram, RenderDiagnostic> {
        check_flowchart(source)
    }
}

fn arrow_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Thick and dotted variants before the plain ones so the longest token wins.
    RE.get_or_init(|| Regex::new(r"-\.->|={2,3}>|-{2,3}>|-\.-|={3}|-{3}").unwrap())
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(graph|flowchart)(\s+(TD|TB|LR|RL|BT))?\s*$").unwrap())
}

/// Statement keywords that carry no node/edge content.
const PASSTHROUGH_KEYWORDS: [&str; 6] =
    ["classDef", "class", "click", "style", "linkStyle", "direction"];

fn check_flowchart(source: &str) -> Result<RenderedDiagram, RenderDiagnostic> {
    let mut header_seen = false;
    let mut subgraph_depth: i32 = 0;
    let mut node_count = 0usize;
    let mut edge_count = 0usize;

    for (idx, raw) in source.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim().trim_end_matches(';').trim();
        if line.is_empty() || line.starts_with("%%") {
            continue;
        }

        if !header_seen {
            if header_re().is_match(line) {
                header_seen = true;
                continue;
            }
            return Err(parse_error(
                line_no,
                "expected 'graph' or 'flowchart' header with an optional direction (TD, LR, ...)",
            ));
        }

        if let Some(rest) = line.strip_prefix("subgraph") {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                subgraph_depth += 1;
                continue;
            }
        }
        if line == "end" {
            subgraph_depth -= 1;
            if subgraph_depth < 0 {
                return Err(parse_error(line_no, "'end' without a matching 'subgraph'"));
            }
            continue;
        }
        if PASSTHROUGH_KEYWORDS
            .iter()
            .any(|kw| line == *kw || line.starts_with(&format!("{kw} ")))
        {
            continue;
        }

        let (nodes, edges) = check_statement(line, line_no)?;
        node_count += nodes;
        edge_count += edges;
    }

    if !header_seen {
        return Err(RenderDiagnostic::new(
            "Parse error on line 1: empty diagram, nothing to render",
        ));
    }
    if subgraph_depth > 0 {
        return Err(RenderDiagnostic::new(format!(
            "Parse error: {subgraph_depth} unclosed 'subgraph' block(s)"
        )));
    }

    Ok(RenderedDiagram {
        source: source.to_string(),
        payload: format!("flowchart: {node_count} node refs, {edge_count} edges"),
    })
}

/// Validate one node/edge statement. Returns (node refs, edges) seen.
fn check_statement(line: &str, line_no: usize) -> Result<(usize, usize), RenderDiagnostic> {
    let mut nodes = 0usize;
    let mut edges = 0usize;
    let mut rest = line;
    let mut after_arrow = false;

    loop {
        let (segment, remainder) = match arrow_re().find(rest) {
            Some(m) => {
                edges += 1;
                (&rest[..m.start()], Some(&rest[m.end()..]))
            }
            None => (rest, None),
        };

        let mut segment = segment.trim();
        if after_arrow {
            // An edge label directly after the arrow: -->|Yes| Target
            if let Some(stripped) = segment.strip_prefix('|') {
                let close = stripped.find('|').ok_or_else(|| {
                    parse_error(line_no, "unterminated '|' edge label")
                })?;
                segment = stripped[close + 1..].trim();
            }
        }

        if segment.is_empty() {
            if remainder.is_some() || after_arrow {
                return Err(parse_error(line_no, "expected a node next to an arrow"));
            }
        } else {
            // `A & B --> C` declares several refs on one side of an edge.
            for part in segment.split('&') {
                check_node_ref(part.trim(), line_no)?;
                nodes += 1;
            }
        }

        match remainder {
            Some(r) => {
                rest = r;
                after_arrow = true;
            }
            None => break,
        }
    }

    Ok((nodes, edges))
}

/// Validate a single node reference: an alphanumeric ID with an optional
/// shaped label (`[..]`, `(..)`, `([..])`, `{..}`, `((..))`, `>..]`).
fn check_node_ref(text: &str, line_no: usize) -> Result<(), RenderDiagnostic> {
    if text.is_empty() {
        return Err(parse_error(line_no, "empty node reference"));
    }

    let id_len = text
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .count();
    if id_len == 0 {
        return Err(parse_error(
            line_no,
            &format!("node ID must be alphanumeric, got '{text}'"),
        ));
    }
    let rest = &text[id_len..];
    if rest.is_empty() {
        return Ok(());
    }

    // Longest openers first so `([` is not read as `(`.
    const SHAPES: [(&str, &str); 6] = [
        ("([", "])"),
        ("((", "))"),
        ("[", "]"),
        ("(", ")"),
        ("{", "}"),
        (">", "]"),
    ];
    for (open, close) in SHAPES {
        if let Some(inner) = rest.strip_prefix(open) {
            let label = inner.strip_suffix(close).ok_or_else(|| {
                parse_error(line_no, &format!("unclosed '{open}' in node shape"))
            })?;
            return check_label(label, line_no);
        }
    }

    Err(parse_error(
        line_no,
        &format!("unexpected characters after node ID: '{rest}'"),
    ))
}

/// Labels may contain anything when quoted; unquoted labels must avoid the
/// punctuation classes the grammar reserves.
fn check_label(label: &str, line_no: usize) -> Result<(), RenderDiagnostic> {
    let label = label.trim();
    if let Some(inner) = label.strip_prefix('"') {
        return match inner.strip_suffix('"') {
            Some(quoted) if !quoted.contains('"') => Ok(()),
            _ => Err(parse_error(line_no, "unterminated quoted label")),
        };
    }
    for bad in ['(', ')', '"', '&', '[', ']', '{', '}'] {
        if label.contains(bad) {
            return Err(parse_error(
                line_no,
                &format!("character '{bad}' in unquoted label, wrap the label in quotes"),
            ));
        }
    }
    Ok(())
}

fn parse_error(line_no: usize, detail: &str) -> RenderDiagnostic {
    RenderDiagnostic::new(format!("Parse error on line {line_no}: {detail}"))
}
