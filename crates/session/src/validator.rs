//! Rule-based action-item validation.
//!
//! An action item must name a clear task, an owner, a usable deadline, and
//! stay related to the meeting subject. Items failing any criterion are
//! demoted to plain tasks by the extractor, with the failures recorded as the
//! exclusion reason.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use recap_core::Subject;
use recap_llm::{ChatMessage, ChatProvider, coerce};

/// Verbs that mark a task as actionable when they lead the phrase or appear
/// as a whole word.
const ACTION_VERBS: &[&str] = &[
    "add", "align", "analyze", "approve", "assign", "book", "build", "call", "collect",
    "complete", "confirm", "contact", "create", "deploy", "design", "document", "draft",
    "email", "estimate", "finish", "fix", "gather", "implement", "investigate", "merge",
    "migrate", "notify", "organize", "plan", "prepare", "present", "publish", "release",
    "remove", "research", "review", "schedule", "send", "set", "share", "ship", "submit",
    "sync", "test", "update", "verify", "write",
];

/// Leading phrases that make a task too vague to act on.
const VAGUE_PREFIXES: &[&str] = &[
    "follow up", "check", "maybe", "think about", "consider", "look into", "see if", "try to",
];

/// Helper words allowed before the verb ("to send", "should review", ...).
const AUXILIARIES: &[&str] = &["to", "should", "will", "must", "need", "can"];

/// Owner placeholders accepted as an explicit "assignment pending" marker.
const OWNER_PLACEHOLDERS: &[&str] = &["tbd", "need assignment", "to be determined", "unassigned"];

/// Deadline placeholders accepted verbatim.
const DEADLINE_PLACEHOLDERS: &[&str] = &["tbd", "to be determined"];

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));
static SLASH_MDY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").expect("valid regex"));
static SLASH_YMD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}/\d{1,2}/\d{1,2}$").expect("valid regex"));

const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december";
const WEEKDAYS: &str = "monday|tuesday|wednesday|thursday|friday|saturday|sunday";

/// "March 15, 2025" or "March 15 2025".
static MONTH_DAY_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^({MONTHS})\s+\d{{1,2}},?\s+\d{{4}}$")).expect("valid regex")
});
/// "15 March 2025".
static DAY_MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^\d{{1,2}}\s+({MONTHS})\s+\d{{4}}$")).expect("valid regex")
});
/// "Friday, March 21".
static WEEKDAY_MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^({WEEKDAYS}),?\s+({MONTHS})\s+\d{{1,2}}$")).expect("valid regex")
});

/// Outcome of validating one action item.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub valid: bool,
    /// Human-readable descriptions of the failed criteria, empty when valid.
    pub failures: Vec<String>,
}

impl ValidationOutcome {
    pub fn reason(&self) -> Option<String> {
        if self.valid {
            None
        } else {
            Some(format!("invalid action item: {}", self.failures.join("; ")))
        }
    }
}

/// Apply all four criteria. `context` is the chunk content the item came
/// from; `subject` is the current draft subject when one exists.
pub fn validate_action_item(
    content: &str,
    assignee: Option<&str>,
    deadline: Option<&str>,
    subject: Option<&Subject>,
    context: &str,
) -> ValidationOutcome {
    let mut failures = Vec::new();

    if !has_clear_task(content) {
        failures.push("task is vague or lacks an action verb".to_string());
    }
    if !has_owner(assignee) {
        failures.push("no owner assigned".to_string());
    }
    if !has_usable_deadline(deadline) {
        failures.push("deadline is vague or missing".to_string());
    }
    if !is_subject_related(content, subject, context) {
        failures.push("unrelated to the meeting subject".to_string());
    }

    ValidationOutcome { valid: failures.is_empty(), failures }
}

// ── Criterion 1: clear task ───────────────────────────────────────────────────

fn has_clear_task(content: &str) -> bool {
    let normalized = content.trim().to_lowercase();
    if normalized.len() < 5 {
        return false;
    }
    if VAGUE_PREFIXES.iter().any(|prefix| normalized.starts_with(prefix)) {
        return false;
    }

    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    let is_verb =
        |token: &str| ACTION_VERBS.contains(&token.trim_matches(|c: char| !c.is_alphanumeric()));

    let first = tokens.first().copied().unwrap_or("");
    let second = tokens.get(1).copied().unwrap_or("");
    let third = tokens.get(2).copied().unwrap_or("");

    if is_verb(first)
        || (AUXILIARIES.contains(&first) && is_verb(second))
        || ((first == "need" || first == "have") && second == "to" && is_verb(third))
    {
        return true;
    }

    // Broad fallback: any action verb as a whole word anywhere in the text.
    tokens.iter().copied().any(is_verb)
}

// ── Criterion 2: owner ────────────────────────────────────────────────────────

fn has_owner(assignee: Option<&str>) -> bool {
    let Some(owner) = assignee.map(str::trim).filter(|s| !s.is_empty()) else {
        return false;
    };
    let lowered = owner.to_lowercase();
    OWNER_PLACEHOLDERS.contains(&lowered.as_str()) || owner.len() >= 2
}

// ── Criterion 3: deadline ─────────────────────────────────────────────────────

fn has_usable_deadline(deadline: Option<&str>) -> bool {
    let Some(deadline) = deadline.map(str::trim).filter(|s| !s.is_empty()) else {
        return false;
    };
    let lowered = deadline.to_lowercase();
    if DEADLINE_PLACEHOLDERS.contains(&lowered.as_str()) {
        return true;
    }
    ISO_DATE.is_match(deadline)
        || SLASH_MDY.is_match(deadline)
        || SLASH_YMD.is_match(deadline)
        || MONTH_DAY_YEAR.is_match(deadline)
        || DAY_MONTH_YEAR.is_match(deadline)
        || WEEKDAY_MONTH_DAY.is_match(deadline)
}

// ── Criterion 4: subject relation ─────────────────────────────────────────────

fn is_subject_related(content: &str, subject: Option<&Subject>, context: &str) -> bool {
    let Some(subject) = subject else {
        // Nothing to relate to yet — pass.
        return true;
    };

    let haystack = format!("{content} {context}").to_lowercase();
    let mut matches = 0usize;

    let title = subject.title.trim().to_lowercase();
    if !title.is_empty() && haystack.contains(&title) {
        matches += 3;
    }
    let goal = subject.goal.trim().to_lowercase();
    if !goal.is_empty() && haystack.contains(&goal) {
        matches += 2;
    }
    for keyword in &subject.scope_keywords {
        let keyword = keyword.trim().to_lowercase();
        if !keyword.is_empty() && haystack.contains(&keyword) {
            matches += 1;
        }
    }

    let score = matches as f32 / (subject.scope_keywords.len() + 5) as f32;
    score >= 0.3
}

// ── Optional LLM second opinion ───────────────────────────────────────────────

/// Ask the model to re-judge a rule-rejected item. The override succeeds only
/// when the model asserts all four criteria pass; its reasoning then replaces
/// the rule-based exclusion reason.
pub async fn llm_override(
    provider: &dyn ChatProvider,
    content: &str,
    assignee: Option<&str>,
    deadline: Option<&str>,
    max_tokens: u32,
    temperature: f32,
) -> Option<String> {
    let system = "You review candidate action items from a meeting. Judge four criteria: \
        clear_task (a concrete, actionable task), has_owner (a named owner), \
        has_deadline (a specific date), subject_related (on-topic for the meeting). \
        Respond with JSON: {\"clear_task\": bool, \"has_owner\": bool, \
        \"has_deadline\": bool, \"subject_related\": bool, \"reasoning\": string}.";
    let user = format!(
        "Task: {content}\nOwner: {}\nDeadline: {}",
        assignee.unwrap_or("(none)"),
        deadline.unwrap_or("(none)"),
    );

    let response = provider
        .chat_complete(&[ChatMessage::system(system), ChatMessage::user(user)], max_tokens, temperature)
        .await
        .ok()?;
    let value = coerce::extract_json_value(&response)?;

    let all_pass = ["clear_task", "has_owner", "has_deadline", "subject_related"]
        .iter()
        .all(|key| value.get(*key).and_then(|v| v.as_bool()).unwrap_or(false));
    if !all_pass {
        return None;
    }
    debug!("llm validator overrode rule-based rejection");
    Some(coerce::str_or_empty(&value, "reasoning"))
}
