//! Prompt text sent to the chat model.

use companion_common::{EmotionLabel, EmotionRecord};
use companion_memory::Persona;

/// The user's message annotated with their recent emotion history.
pub fn emotion_annotated_input(message: &str, recent: &[EmotionRecord]) -> String {
    let history = recent
        .iter()
        .map(|r| format!("{} at {}", r.emotion, r.timestamp))
        .collect::<Vec<_>>()
        .join(", ");
    format!("User input: {message}\n(Note: recent emotion changes [{history}])")
}

/// System prompt for a chat turn, with retrieved passages when there are any.
pub fn chat_system_prompt(persona: &Persona, context: Option<&str>) -> String {
    let mut prompt = persona.intro.clone();
    if let Some(context) = context.filter(|c| !c.is_empty()) {
        prompt.push_str(
            "\n\nUse the following excerpts from earlier conversations if they help you \
             answer. If they are not relevant, ignore them.\n",
        );
        prompt.push_str(context);
    }
    prompt
}

pub fn coaching_system_prompt(emotion: EmotionLabel) -> String {
    format!(
        "The user is showing a '{emotion}' emotion. \
         Give them a coaching message that fits the intensity of that emotion."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotated_input_lists_history() {
        let recent = vec![
            EmotionRecord {
                emotion: EmotionLabel::Negative,
                timestamp: "2026-03-02 10:00:00".into(),
            },
            EmotionRecord {
                emotion: EmotionLabel::Neutral,
                timestamp: "2026-03-01 09:00:00".into(),
            },
        ];
        assert_eq!(
            emotion_annotated_input("so tired", &recent),
            "User input: so tired\n(Note: recent emotion changes \
             [negative at 2026-03-02 10:00:00, neutral at 2026-03-01 09:00:00])"
        );
        assert_eq!(
            emotion_annotated_input("hi", &[]),
            "User input: hi\n(Note: recent emotion changes [])"
        );
    }

    #[test]
    fn context_is_appended_only_when_present() {
        let persona = Persona::default();
        assert_eq!(chat_system_prompt(&persona, None), persona.intro);
        assert_eq!(chat_system_prompt(&persona, Some("")), persona.intro);

        let prompt = chat_system_prompt(&persona, Some("- yeonji: my dog is sick"));
        assert!(prompt.starts_with(&persona.intro));
        assert!(prompt.ends_with("- yeonji: my dog is sick"));
    }

    #[test]
    fn coaching_prompt_names_emotion() {
        assert!(coaching_system_prompt(EmotionLabel::SuperNegative).contains("'super negative'"));
    }
}
