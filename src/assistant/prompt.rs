//! Prompt assembly for the assistant.

use super::context::BoundedContext;
use super::gateway::{ChatTurn, CompletionRequest};
use crate::models::enums::MessageRole;

pub const SYSTEM_PROMPT: &str = r#"You are a patient portal assistant. You help patients understand their own medical records. You are NOT a doctor.

Rules:
1. Ground every statement in the patient context below.
2. Never diagnose, prescribe, or recommend treatment changes; suggest discussing those with the healthcare team instead.
3. Say clearly when the documents do not answer the question.
4. Use plain language; explain any medical term you need.

The sections below contain the patient's profile and recent documents. Use ONLY this information."#;

const TITLE_SYSTEM_PROMPT: &str =
    "Summarize the user's message as a conversation title of at most six words. Reply with the title only.";

/// Build the streaming request for an owner exchange: system prompt +
/// context, the recent turns, and the new question last.
pub fn build_request(context: &BoundedContext, question: &str) -> CompletionRequest {
    let mut turns: Vec<ChatTurn> = context
        .history
        .iter()
        .map(|msg| match msg.role {
            MessageRole::User => ChatTurn::user(msg.content.clone()),
            MessageRole::Assistant => ChatTurn::assistant(msg.content.clone()),
        })
        .collect();
    turns.push(ChatTurn::user(question));

    CompletionRequest {
        system: format!("{SYSTEM_PROMPT}\n\n{}", context.context_text()),
        turns,
    }
}

/// Build the request for a guest exchange: the transcript lives on the
/// client, so the turns come in from the request verbatim.
pub fn build_guest_request(context: &BoundedContext, transcript: Vec<ChatTurn>) -> CompletionRequest {
    CompletionRequest {
        system: format!("{SYSTEM_PROMPT}\n\n{}", context.context_text()),
        turns: transcript,
    }
}

/// System + prompt pair for deriving a conversation title.
pub fn title_prompt(first_message: &str) -> (&'static str, String) {
    (TITLE_SYSTEM_PROMPT, first_message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatMessage;
    use chrono::NaiveDateTime;
    use uuid::Uuid;

    fn message(role: MessageRole, content: &str) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn request_ends_with_the_new_question() {
        let context = BoundedContext {
            history: vec![
                message(MessageRole::User, "first"),
                message(MessageRole::Assistant, "reply"),
            ],
            ..Default::default()
        };

        let request = build_request(&context, "second question");
        assert_eq!(request.turns.len(), 3);
        assert_eq!(request.turns[0].role, "user");
        assert_eq!(request.turns[1].role, "assistant");
        assert_eq!(request.turns.last().unwrap().content, "second question");
        assert!(request.system.starts_with(SYSTEM_PROMPT));
    }

    #[test]
    fn guest_request_uses_transcript_verbatim() {
        let context = BoundedContext::default();
        let transcript = vec![
            ChatTurn::user("hola"),
            ChatTurn::assistant("hola, ¿en qué ayudo?"),
            ChatTurn::user("mis resultados"),
        ];
        let request = build_guest_request(&context, transcript);
        assert_eq!(request.turns.len(), 3);
        assert_eq!(request.turns[2].content, "mis resultados");
    }
}
