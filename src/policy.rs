//! Response policy: the system prompt contract, trivial-reply
//! classification, and assignment-shape inspection of tool results.

use crate::model::{ContentBlock, MessageContent, ModelMessage};

/// Build the system prompt for one turn.
///
/// The four clause groups (voice, tool usage, output shape, no
/// fabrication) are the behavioral contract the orchestrator's retries
/// enforce; wording changes here ripple into retry behavior.
pub fn system_prompt(current_date: &str, timezone: &str) -> String {
    format!(
        "\
You are a warm, intelligent personal assistant who speaks like a real human.
You help students manage time, tasks, and communication using real data from Gmail, Google Calendar, Canvas, and Zoom via tools.

VOICE & STYLE (strict)
- Answer in short, natural paragraphs with complete sentences.
- Do not use bullets, numbered lists, tables, code blocks, or label-style formatting.
- Do not use symbols like \"\u{2022}\", \"|\" or colons-as-labels. Do not use em dashes.
- Do not mention tools, services, connections, accounts, or permissions.
- Begin with the answer itself. Never reply with only \"OK\" (VERY IMPORTANT), \"Sure\", \"Got it\", or similar acknowledgments.

TOOL USAGE CONTRACT (strict)
- If the user asks about any date/day/time/schedule/events, you MUST call the calendar tool first and then answer with the results in natural sentences.
  - Interpret dates in the {timezone} time zone.
  - If a specific calendar date is given (e.g., \"October 29\"), check that 24-hour local window (00:00\u{2013}24:00).
  - If the date is ambiguous (e.g., \"next Friday\"), use the nearest future date in {timezone}.
- If the user asks to email/draft/send, you MUST call the Gmail tool first and then present the email in natural sentences (include subject and a concise body summary in prose).
- If the user asks about assignments/courses, you MUST call the Canvas tool first and only include assignments due today or later.
- Do not guess. Only describe information returned by the tools.

OUTPUT SHAPE (strict)
- One or two compact paragraphs maximum.
- Integrate details naturally in sentences (title, date, time range, location woven into prose).
- If nothing relevant is found, say so plainly in one sentence (e.g., \"I didn't find anything scheduled for that day.\").
- Do not suggest connecting accounts, pressing buttons, or changing settings.
- Do not show raw data, JSON, IDs, or technical descriptions. No meta-process narration.

ERROR/EMPTY RESULTS
- If a tool returns no results or fails, respond naturally without mentioning tools or connections. Provide the best direct answer you can from available results.
- Do not speculate about why something is missing.

COMPLETENESS & TONE
- Always produce a complete, helpful answer in your first message after a user request.
- Keep answers concise, friendly, and confident.
- Avoid filler like \"fetching\" or \"retrieving\".

ENVIRONMENT HINTS
- TODAY: {current_date}
- TIME ZONE: {timezone}"
    )
}

/// Nudge message appended to the transcript when a tool-bearing turn
/// produced no tool call or only an acknowledgment.
pub const RETRY_NUDGE: &str = "Call the appropriate tool now. Return the actual answer in \
     short paragraphs, no acknowledgments.";

/// Whether a reply is a bare acknowledgment like "OK" or "Sure".
pub fn is_trivial(text: &str) -> bool {
    let t = text.trim().to_lowercase();
    if t.is_empty() || t.len() > 12 {
        return false;
    }
    let stripped = t.trim_end_matches(['.', '!']);
    matches!(
        stripped,
        "ok" | "okay" | "sure" | "got it" | "alright" | "k" | "yes" | "yep"
    )
}

/// Whether any executed tool result looks like assignment data.
///
/// Assignment payloads carry `due_at` fields or assignment objects; a
/// bare course listing carries neither. The check is textual over the
/// serialized result content, matching whatever nesting the provider
/// used.
pub fn has_assignment_markers(tool_results: &[ModelMessage]) -> bool {
    tool_results.iter().any(|msg| {
        let blocks = match &msg.content {
            MessageContent::Blocks(blocks) => blocks.as_slice(),
            MessageContent::Text(_) => return false,
        };
        blocks.iter().any(|b| {
            if let ContentBlock::ToolResult { content, .. } = b {
                let text = content.to_string().to_lowercase();
                text.contains("due_at") || text.contains("\"assignment")
            } else {
                false
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_carries_date_and_timezone() {
        let p = system_prompt("October 25, 2025", "America/Los_Angeles");
        assert!(p.contains("TODAY: October 25, 2025"));
        assert!(p.contains("Interpret dates in the America/Los_Angeles time zone."));
        assert!(p.contains("MUST call the Canvas tool"));
        assert!(p.contains("Do not guess."));
    }

    #[test]
    fn trivial_acknowledgments() {
        for s in ["OK", "ok.", "Okay!", "sure", " Got it ", "alright", "k", "Yes!", "yep"] {
            assert!(is_trivial(s), "{s:?} should be trivial");
        }
    }

    #[test]
    fn non_trivial_replies() {
        for s in [
            "",
            "OK, you have two events tomorrow.",
            "Your essay is due Friday.",
            "okey dokey", // not in the accepted set despite its length
        ] {
            assert!(!is_trivial(s), "{s:?} should not be trivial");
        }
    }

    #[test]
    fn assignment_markers_in_tool_results() {
        let with = vec![ModelMessage::user_blocks(vec![ContentBlock::ToolResult {
            tool_use_id: "tu_1".into(),
            content: json!({ "assignments": [{ "name": "Essay", "due_at": "2025-10-31" }] }),
        }])];
        assert!(has_assignment_markers(&with));

        let courses_only = vec![ModelMessage::user_blocks(vec![ContentBlock::ToolResult {
            tool_use_id: "tu_1".into(),
            content: json!({ "courses": [{ "id": 65759, "name": "Data Structures" }] }),
        }])];
        assert!(!has_assignment_markers(&courses_only));

        assert!(!has_assignment_markers(&[]));
    }
}
