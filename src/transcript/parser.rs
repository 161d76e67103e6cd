//! Execution transcript parsing.
//!
//! Agents emit a stream of JSON events: `assistant` turns carrying tool-use
//! calls and per-turn token usage, then one terminal `result` event with the
//! overall verdict. The stream arrives as a JSON array or as JSON Lines,
//! sometimes BOM-prefixed, sometimes with trailing garbage from an
//! interrupted process. Parsing is defensive throughout: unparsable lines
//! are skipped, free text is never trusted over structured step evidence,
//! and the explicit error flag is never trusted less than the summary prose.

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::transcript::output::{normalize_path, Verification, VerificationStep, WorkerStatus};

/// Everything extracted from one transcript.
#[derive(Debug, Clone)]
pub struct ParsedTranscript {
    pub status: WorkerStatus,
    pub verification: Option<Verification>,
    pub affected_files: Vec<String>,
    pub tokens_used: Vec<u64>,
    pub duration_ms: Option<u64>,
    pub cost_usd: Option<f64>,
    pub summary: Option<String>,
    /// Whether a terminal `result` event was seen at all.
    pub has_result: bool,
    pub error: Option<String>,
}

/// Per-turn token usage as reported by the agent.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct TokenUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
}

impl TokenUsage {
    fn turn_total(&self) -> u64 {
        self.input_tokens
            + self.output_tokens
            + self.cache_read_input_tokens
            + self.cache_creation_input_tokens
    }
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<serde_json::Value>,
}

/// `content` is a plain string in older transcripts and an array of typed
/// blocks in newer ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Deserialize)]
struct AgentMessage {
    #[serde(default)]
    content: Option<MessageContent>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct TranscriptEvent {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<AgentMessage>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    is_error: Option<bool>,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    total_cost_usd: Option<f64>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

impl TranscriptEvent {
    fn is_assistant_turn(&self) -> bool {
        match self.kind.as_deref() {
            Some("assistant") => true,
            Some(_) => false,
            None => self.message.is_some(),
        }
    }

    fn is_result(&self) -> bool {
        match self.kind.as_deref() {
            Some("result") => true,
            Some(_) => false,
            None => self.message.is_none() && (self.is_error.is_some() || self.subtype.is_some()),
        }
    }
}

/// Terminal result fields, captured from the last `result` event.
#[derive(Debug, Clone, Default)]
struct TerminalResult {
    is_error: Option<bool>,
    subtype: Option<String>,
    duration_ms: Option<u64>,
    summary: Option<String>,
    cost_usd: Option<f64>,
    usage_total: Option<u64>,
}

/// Parses raw transcripts into [`ParsedTranscript`]s.
#[derive(Debug, Clone, Default)]
pub struct TranscriptParser {
    project_root: String,
}

impl TranscriptParser {
    pub fn new(project_root: impl Into<String>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    pub fn parse(&self, raw: &str) -> ParsedTranscript {
        let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);
        let events = parse_events(text);

        let mut affected_files: Vec<String> = Vec::new();
        let mut seen_paths: HashSet<String> = HashSet::new();
        let mut tokens_used: Vec<u64> = Vec::new();
        let mut prose_steps: BTreeMap<u32, bool> = BTreeMap::new();
        let mut table_steps: BTreeMap<u32, bool> = BTreeMap::new();
        let mut terminal: Option<TerminalResult> = None;

        for event in &events {
            if event.is_result() {
                // The last result event wins; earlier ones are stale.
                terminal = Some(TerminalResult {
                    is_error: event.is_error,
                    subtype: event.subtype.clone(),
                    duration_ms: event.duration_ms,
                    summary: event.result.clone(),
                    cost_usd: event.total_cost_usd,
                    usage_total: event.usage.map(|usage| usage.turn_total()),
                });
                continue;
            }
            if !event.is_assistant_turn() {
                continue;
            }
            let Some(message) = &event.message else {
                continue;
            };

            if let Some(usage) = message.usage.or(event.usage) {
                tokens_used.push(usage.turn_total());
            }

            match &message.content {
                Some(MessageContent::Text(text)) => {
                    scan_step_evidence(text, &mut prose_steps, &mut table_steps);
                }
                Some(MessageContent::Blocks(blocks)) => {
                    for block in blocks {
                        if let Some(path) = written_path(block) {
                            let normalized = normalize_path(path, &self.project_root);
                            if seen_paths.insert(normalized.clone()) {
                                affected_files.push(normalized);
                            }
                        }
                        if let Some(text) = &block.text {
                            scan_step_evidence(text, &mut prose_steps, &mut table_steps);
                        }
                    }
                }
                None => {}
            }
        }

        // Table evidence overrides prose evidence for the same step number.
        let mut merged = prose_steps;
        merged.extend(table_steps);
        let steps: Vec<VerificationStep> = merged
            .into_iter()
            .map(|(number, passed)| VerificationStep { number, passed })
            .collect();

        let status = derive_status(terminal.as_ref(), &steps);
        let verification = Verification::from_steps(steps);

        // Explicit per-turn usage beats a total embedded in the result event.
        if tokens_used.is_empty() {
            if let Some(total) = terminal.as_ref().and_then(|result| result.usage_total) {
                if total > 0 {
                    tokens_used.push(total);
                }
            }
        }

        let has_result = terminal.is_some();
        let summary = terminal.as_ref().and_then(|result| result.summary.clone());
        let error = if !has_result {
            Some("transcript ended without a result event".to_string())
        } else if status == WorkerStatus::Error || status == WorkerStatus::Blocked {
            summary.clone().or_else(|| {
                terminal
                    .as_ref()
                    .and_then(|result| result.subtype.clone())
                    .map(|subtype| format!("agent reported {}", subtype))
            })
        } else {
            None
        };

        ParsedTranscript {
            status,
            verification,
            affected_files,
            tokens_used,
            duration_ms: terminal.as_ref().and_then(|result| result.duration_ms),
            cost_usd: terminal.as_ref().and_then(|result| result.cost_usd),
            summary,
            has_result,
            error,
        }
    }
}

/// Parse the event stream: a JSON array when it looks like one, otherwise
/// JSON Lines with unparsable lines skipped.
fn parse_events(text: &str) -> Vec<TranscriptEvent> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        match serde_json::from_str::<Vec<TranscriptEvent>>(trimmed) {
            Ok(events) => return events,
            Err(err) => {
                tracing::warn!(error = %err, "transcript array did not parse, falling back to line-by-line");
            }
        }
    }

    let mut events = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<TranscriptEvent>(line) {
            Ok(event) => events.push(event),
            Err(err) => {
                tracing::debug!(error = %err, "skipping unparsable transcript line");
            }
        }
    }
    events
}

/// The path a write/edit style tool call targets, if this block is one.
fn written_path(block: &ContentBlock) -> Option<&str> {
    if block.kind.as_deref() != Some("tool_use") {
        return None;
    }
    let name = block.name.as_deref()?.to_ascii_lowercase();
    if !name.contains("write") && !name.contains("edit") {
        return None;
    }
    let input = block.input.as_ref()?;
    input
        .get("file_path")
        .or_else(|| input.get("notebook_path"))
        .or_else(|| input.get("path"))
        .and_then(|value| value.as_str())
}

fn prose_step_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bstep\s+(\d+)\s*:\s*(pass|fail)(?:ed)?\b").expect("valid pattern")
    })
}

fn table_step_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\|\s*(\d+)\s*\|[^|\n]*\|\s*\**\s*(pass|fail)(?:ed)?\s*\**\s*\|")
            .expect("valid pattern")
    })
}

fn failure_keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(error|errors|fail|fails|failed|failure|failures|exception|fatal|cannot|unable)\b")
            .expect("valid pattern")
    })
}

fn blocked_keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bblocked\b").expect("valid pattern"))
}

fn pass_indicator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bpass(?:ed|es|ing)?\b").expect("valid pattern"))
}

/// Collect `Step N: PASS/FAIL` prose and `| N | desc | PASS |` table rows.
/// Within each form the last mention of a step number wins.
fn scan_step_evidence(text: &str, prose: &mut BTreeMap<u32, bool>, table: &mut BTreeMap<u32, bool>) {
    for captures in prose_step_re().captures_iter(text) {
        if let (Some(number), Some(verdict)) = (captures.get(1), captures.get(2)) {
            if let Ok(number) = number.as_str().parse::<u32>() {
                prose.insert(number, verdict.as_str().eq_ignore_ascii_case("pass"));
            }
        }
    }
    for captures in table_step_re().captures_iter(text) {
        if let (Some(number), Some(verdict)) = (captures.get(1), captures.get(2)) {
            if let Ok(number) = number.as_str().parse::<u32>() {
                table.insert(number, verdict.as_str().eq_ignore_ascii_case("pass"));
            }
        }
    }
}

/// Derive the overall status.
///
/// Precedence: the explicit error flag or subtype, then a keyword scan of the
/// summary text, then bidirectional reconciliation with the parsed steps. A
/// failed step always forces error; all-passed steps override a
/// keyword-derived error but never an explicit error flag.
fn derive_status(result: Option<&TerminalResult>, steps: &[VerificationStep]) -> WorkerStatus {
    let (mut status, explicit) = match result {
        None => (WorkerStatus::Unknown, false),
        Some(result) => {
            if result.is_error == Some(true) {
                (WorkerStatus::Error, true)
            } else if result
                .subtype
                .as_deref()
                .is_some_and(|subtype| subtype.contains("error"))
            {
                (WorkerStatus::Error, true)
            } else if result.subtype.as_deref() == Some("success")
                || result.is_error == Some(false)
            {
                (WorkerStatus::Success, true)
            } else {
                (
                    scan_summary(result.summary.as_deref().unwrap_or("")),
                    false,
                )
            }
        }
    };

    if steps.iter().any(|step| !step.passed) {
        status = WorkerStatus::Error;
    } else if !steps.is_empty() && !(explicit && status == WorkerStatus::Error) {
        status = WorkerStatus::Success;
    }

    status
}

/// Keyword scan of the free-text summary, with the false-positive guard: a
/// failure keyword with a PASS indicator nearby ("No errors; all steps PASS")
/// is not treated as a failure.
fn scan_summary(summary: &str) -> WorkerStatus {
    if summary.trim().is_empty() {
        return WorkerStatus::Unknown;
    }
    if blocked_keyword_re().is_match(summary) {
        return WorkerStatus::Blocked;
    }
    for keyword in failure_keyword_re().find_iter(summary) {
        if !pass_indicator_near(summary, keyword.start(), keyword.end()) {
            return WorkerStatus::Error;
        }
    }
    WorkerStatus::Success
}

const PASS_GUARD_WINDOW: usize = 48;

fn pass_indicator_near(text: &str, keyword_start: usize, keyword_end: usize) -> bool {
    let start = floor_char_boundary(text, keyword_start.saturating_sub(PASS_GUARD_WINDOW));
    let end = ceil_char_boundary(text, (keyword_end + PASS_GUARD_WINDOW).min(text.len()));
    pass_indicator_re().is_match(&text[start..end])
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
