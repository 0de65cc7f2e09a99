use std::fmt;
use std::time::{Duration, Instant};

use crate::activity::{self, Kind};
use crate::api::{QueryRequest, QueryResponse, MAX_RESULTS_RANGE};
use crate::markdown::{self, escape, Document};
use crate::sources::SourcePanel;

pub const IDLE_LABEL: &str = "Search Emails";
pub const AUTH_PROMPT_LABEL: &str = "Click here to authenticate with Gmail";

/// Pause between the backend reply and rendering it, so the "Analyzing"
/// label is readable.
pub const ANALYZE_PACING: Duration = Duration::from_millis(1000);
pub const SOURCES_DELAY: Duration = Duration::from_millis(200);
pub const COMPLETE_LABEL_HOLD: Duration = Duration::from_millis(2000);
pub const ERROR_LABEL_HOLD: Duration = Duration::from_millis(1500);
pub const PRESET_LABEL_HOLD: Duration = Duration::from_millis(1000);

pub const SHAKE: Duration = Duration::from_millis(300);

pub const DEFAULT_EMAIL_COUNT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    EmptyQuery,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyQuery => write!(f, "query is empty"),
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ButtonPhase {
    Idle,
    Searching { max_results: u32 },
    Analyzing,
    Complete { emails: usize, elapsed: Duration },
    Failed,
}

impl ButtonPhase {
    fn label(&self) -> String {
        match self {
            ButtonPhase::Idle => IDLE_LABEL.to_string(),
            ButtonPhase::Searching { max_results } => format!("Searching {} emails...", max_results),
            ButtonPhase::Analyzing => "Analyzing with AI...".to_string(),
            ButtonPhase::Complete { emails, elapsed } => {
                format!("Analysis Complete ({} emails, {}ms)", emails, elapsed.as_millis())
            }
            ButtonPhase::Failed => "Error".to_string(),
        }
    }
}

/// What the answer area shows. `None` on the controller means hidden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerView {
    AuthRequired { message: String },
    DomainError { message: String },
    ConnectionError { message: String },
    Answer {
        search_note: Option<String>,
        document: Document,
        raw: Option<String>,
    },
}

impl AnswerView {
    /// The answer area as an HTML fragment.
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        match self {
            AnswerView::AuthRequired { message } => {
                html.push_str("<div class=\"error-message\"><h3>Authentication Required</h3><p>");
                html.push_str(&escape(message));
                html.push_str("</p><button class=\"auth-prompt-btn\">");
                html.push_str(AUTH_PROMPT_LABEL);
                html.push_str("</button></div>");
            }
            AnswerView::DomainError { message } => {
                html.push_str("<div class=\"error-message\">Error: ");
                html.push_str(&escape(message));
                html.push_str("</div>");
            }
            AnswerView::ConnectionError { message } => {
                html.push_str("<div class=\"error-message\">Connection Error: ");
                html.push_str(&escape(message));
                html.push_str("</div>");
            }
            AnswerView::Answer { search_note, raw, .. } => {
                if let Some(note) = search_note {
                    html.push_str("<div class=\"search-note\"><strong>Search used:</strong> ");
                    html.push_str(&escape(note));
                    html.push_str("</div>");
                }
                html.push_str(&markdown::format(raw.as_deref()));
            }
        }
        html
    }
}

/// Issued for every accepted submission. Results carry the token back so
/// only the latest submission can touch the UI.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub token: u64,
    pub request: QueryRequest,
    pub started: Instant,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Replied(QueryResponse),
    /// Request failed or the body was not JSON.
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowupAction {
    RevealSources(u64),
    ResetLabel(u64),
    ClearFlash(u64),
}

/// Something the shell should do after `after` has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Followup {
    pub after: Duration,
    pub action: FollowupAction,
}

#[derive(Debug, Clone)]
struct Flash {
    id: u64,
    text: String,
}

#[derive(Debug)]
pub struct QueryController {
    latest: u64,
    phase: ButtonPhase,
    flash: Option<Flash>,
    next_flash: u64,
    answer: Option<AnswerView>,
    sources: Option<SourcePanel>,
    sources_shown_at: Option<Instant>,
}

impl Default for QueryController {
    fn default() -> Self {
        QueryController {
            latest: 0,
            phase: ButtonPhase::Idle,
            flash: None,
            next_flash: 0,
            answer: None,
            sources: None,
            sources_shown_at: None,
        }
    }
}

impl QueryController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(&self) -> String {
        match &self.flash {
            Some(flash) => flash.text.clone(),
            None => self.phase.label(),
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.phase, ButtonPhase::Searching { .. } | ButtonPhase::Analyzing)
    }

    pub fn answer(&self) -> Option<&AnswerView> {
        self.answer.as_ref()
    }

    /// The source panel and how long it has been on screen, if revealed.
    pub fn sources(&self, now: Instant) -> Option<(&SourcePanel, Duration)> {
        let panel = self.sources.as_ref()?;
        let shown_at = self.sources_shown_at?;
        Some((panel, now.saturating_duration_since(shown_at)))
    }

    pub fn has_source_content(&self) -> bool {
        self.sources.as_ref().is_some_and(|p| !p.entries.is_empty())
    }

    pub fn submit(&mut self, raw_query: &str, max_results: u32, now: Instant) -> Result<Ticket, ValidationError> {
        let query = raw_query.trim();
        if query.is_empty() {
            activity::log_with(Kind::Warning, "Query rejected - empty input");
            return Err(ValidationError::EmptyQuery);
        }

        self.latest += 1;
        let request = QueryRequest::new(query, max_results);

        self.flash = None;
        self.phase = ButtonPhase::Searching { max_results: request.max_results };
        self.answer = None;
        self.sources_shown_at = None;

        Ok(Ticket { token: self.latest, request, started: now })
    }

    /// The backend replied; switch to the analysing label while the pacing
    /// delay runs. Returns false for a superseded submission.
    pub fn received(&mut self, token: u64) -> bool {
        if token != self.latest {
            return false;
        }
        self.phase = ButtonPhase::Analyzing;
        true
    }

    pub fn apply(&mut self, token: u64, started: Instant, outcome: Outcome, now: Instant) -> Vec<Followup> {
        if token != self.latest {
            activity::log_with(Kind::Warning, format!("Dropping stale response #{}", token));
            return Vec::new();
        }

        let elapsed = now.saturating_duration_since(started);
        let response = match outcome {
            Outcome::Replied(response) => response,
            Outcome::Transport(description) => {
                activity::log_with(Kind::Error, format!("Query failed with error: {}", description));
                self.answer = Some(AnswerView::ConnectionError { message: description });
                return self.fail(token);
            }
        };

        let search_note = response.search_used().map(String::from);
        match response {
            QueryResponse::AuthRequired { error } => {
                activity::log_with(Kind::Warning, "Authentication required for query");
                self.answer = Some(AnswerView::AuthRequired { message: error });
                self.fail(token)
            }
            QueryResponse::DomainError { error } => {
                activity::log_with(Kind::Error, format!("Backend returned error: {}", error));
                self.answer = Some(AnswerView::DomainError { message: error });
                self.fail(token)
            }
            QueryResponse::Success { answer, sources, search_metadata } => {
                if let Some(time) = search_metadata.and_then(|m| m.processing_time) {
                    activity::log(format!("Backend processing time: {}", time));
                }

                self.answer = Some(AnswerView::Answer {
                    search_note,
                    document: answer.as_deref().map(markdown::parse).unwrap_or_default(),
                    raw: answer,
                });

                let mut followups = Vec::new();
                if sources.is_empty() {
                    activity::log("No email sources found");
                    self.sources = None;
                    self.sources_shown_at = None;
                } else {
                    activity::log_with(Kind::Success, format!("Displaying {} email sources", sources.len()));
                    self.sources = Some(SourcePanel::render(&sources));
                    followups.push(Followup {
                        after: SOURCES_DELAY,
                        action: FollowupAction::RevealSources(token),
                    });
                }

                activity::log_with(Kind::Success, format!("Query completed in {}ms", elapsed.as_millis()));
                self.phase = ButtonPhase::Complete { emails: sources.len(), elapsed };
                followups.push(Followup {
                    after: COMPLETE_LABEL_HOLD,
                    action: FollowupAction::ResetLabel(token),
                });
                followups
            }
        }
    }

    fn fail(&mut self, token: u64) -> Vec<Followup> {
        self.phase = ButtonPhase::Failed;
        vec![Followup { after: ERROR_LABEL_HOLD, action: FollowupAction::ResetLabel(token) }]
    }

    pub fn follow_up(&mut self, action: FollowupAction, now: Instant) {
        match action {
            FollowupAction::RevealSources(token) => {
                if token == self.latest && self.has_source_content() {
                    self.sources_shown_at = Some(now);
                }
            }
            FollowupAction::ResetLabel(token) => {
                if token == self.latest && !self.is_busy() {
                    self.phase = ButtonPhase::Idle;
                }
            }
            FollowupAction::ClearFlash(id) => {
                if self.flash.as_ref().is_some_and(|f| f.id == id) {
                    self.flash = None;
                }
            }
        }
    }

    /// Show "Query set!" on the button for a moment. Returns the followup
    /// that restores the label.
    pub fn flash_query_set(&mut self) -> Followup {
        self.next_flash += 1;
        self.flash = Some(Flash { id: self.next_flash, text: "Query set!".to_string() });
        Followup { after: PRESET_LABEL_HOLD, action: FollowupAction::ClearFlash(self.next_flash) }
    }

    /// Hide both result panels, e.g. after logging out.
    pub fn hide_results(&mut self) {
        self.answer = None;
        self.sources_shown_at = None;
    }
}

/// Horizontal offset of the query field while it shakes after an empty
/// submit: 0 -> -4 -> +4 -> 0 px over 300 ms. `None` once finished.
pub fn shake_offset(elapsed: Duration) -> Option<f32> {
    if elapsed >= SHAKE {
        return None;
    }
    let t = elapsed.as_secs_f32() / SHAKE.as_secs_f32();
    let offset = if t < 0.25 {
        -4.0 * (t / 0.25)
    } else if t < 0.75 {
        -4.0 + 8.0 * ((t - 0.25) / 0.5)
    } else {
        4.0 * (1.0 - (t - 0.75) / 0.25)
    };
    Some(offset)
}

/// Parse the email-count field; anything unusable means the default.
pub fn parse_email_count(raw: &str) -> u32 {
    match raw.trim().parse::<u32>() {
        Ok(n) if n > 0 => n,
        _ => DEFAULT_EMAIL_COUNT,
    }
}

pub fn increase_count(raw: &str) -> u32 {
    let current = parse_email_count(raw);
    if current < *MAX_RESULTS_RANGE.end() { current + 1 } else { current }
}

pub fn decrease_count(raw: &str) -> u32 {
    let current = parse_email_count(raw);
    if current > *MAX_RESULTS_RANGE.start() { current - 1 } else { current }
}
