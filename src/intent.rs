//! Intent router: pure keyword classification of the user message.
//!
//! Everything here is deterministic and runs before any network call,
//! so course detection and service routing are unit-testable without
//! mocks.

use serde::Serialize;

use crate::model::ModelMessage;

/// Which service family a message is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceHint {
    Mail,
    Coursework,
    General,
}

/// A course matched from the user's phrasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseHint {
    pub course_id: u64,
    pub keyword: String,
}

/// Classified intent for one message.
#[derive(Debug, Clone)]
pub struct Intent {
    pub service: ServiceHint,
    pub is_assignment_question: bool,
    pub course: Option<CourseHint>,
}

/// Ordered keyword-to-course-id table. First match wins, so broader
/// keywords belong later in the list for a subject ("java" after
/// "java class" would shadow it; the seed data orders specific phrases
/// first within each course).
#[derive(Debug, Clone)]
pub struct CourseMap {
    entries: Vec<(String, u64)>,
}

impl CourseMap {
    pub fn new(entries: Vec<(String, u64)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, id)| (k.to_lowercase(), id))
                .collect(),
        }
    }

    /// The deployed course table.
    pub fn builtin() -> Self {
        Self::new(
            [
                ("java", 61734),
                ("java class", 61734),
                ("programming methods", 61734),
                ("cs1", 61734),
                ("cis-255", 61734),
                ("data structures", 65759),
                ("ds", 65759),
                ("cs2", 65759),
                ("cis-256", 65759),
                ("computer architecture", 65734),
                ("comp arch", 65734),
                ("assembly", 65734),
                ("cis-242", 65734),
                ("object oriented", 60178),
                ("oop", 60178),
                ("program design", 60178),
                ("cis-254", 60178),
                ("unix", 60118),
                ("linux", 60118),
                ("cis-121", 60118),
                ("art", 58733),
                ("art history", 58733),
                ("art-101", 58733),
                ("public speaking", 61843),
                ("speaking", 61843),
                ("communication", 61843),
                ("comm-110", 61843),
                ("c++", 50700),
                ("cpp", 50700),
                ("comp-250", 50700),
            ]
            .into_iter()
            .map(|(k, id)| (k.to_string(), id))
            .collect(),
        )
    }

    /// Scan the message for a course keyword. Insertion order decides
    /// ties: the first entry whose keyword appears in the message wins.
    pub fn detect(&self, message: &str) -> Option<CourseHint> {
        let lower = message.to_lowercase();
        self.entries
            .iter()
            .find(|(keyword, _)| lower.contains(keyword.as_str()))
            .map(|(keyword, course_id)| CourseHint {
                course_id: *course_id,
                keyword: keyword.clone(),
            })
    }
}

const MAIL_KEYWORDS: &[&str] = &["gmail", "email", "e-mail", "inbox", "mail"];

const COURSEWORK_KEYWORDS: &[&str] = &[
    "canvas",
    "course",
    "class",
    "assignment",
    "homework",
    "discussion",
    "quiz",
    "exam",
    "grade",
    "syllabus",
];

const ASSIGNMENT_KEYWORDS: &[&str] = &["assignment", "homework", "due", "deadline"];

fn contains_any(lower: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| lower.contains(k))
}

/// Classify one message. Mail wins over coursework when both families
/// appear ("email my professor about the homework" routes to mail, the
/// action verb's service).
pub fn classify(message: &str, courses: &CourseMap) -> Intent {
    let lower = message.to_lowercase();
    let course = courses.detect(message);

    let service = if contains_any(&lower, MAIL_KEYWORDS) {
        ServiceHint::Mail
    } else if contains_any(&lower, COURSEWORK_KEYWORDS) || course.is_some() {
        ServiceHint::Coursework
    } else {
        ServiceHint::General
    };

    Intent {
        service,
        is_assignment_question: contains_any(&lower, ASSIGNMENT_KEYWORDS),
        course,
    }
}

/// When the previous assistant turn listed assignments and the new
/// message is a short follow-up that names no coursework itself,
/// produce a machine-directed note so the model keeps the thread.
pub fn followup_note(history: &[ModelMessage], message: &str) -> Option<String> {
    let last_assistant = history
        .iter()
        .rev()
        .find(|m| m.role == "assistant")?
        .text();
    if !last_assistant.to_lowercase().contains("assignment") {
        return None;
    }
    let trimmed = message.trim();
    if trimmed.len() > 60 || contains_any(&trimmed.to_lowercase(), COURSEWORK_KEYWORDS) {
        return None;
    }
    Some(
        "Context: the user is following up on the assignment list from your \
         previous reply. Interpret short references (\"the first one\", \
         \"that one\") against that list."
            .to_string(),
    )
}
