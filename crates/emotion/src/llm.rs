//! Sentiment classification by prompting the chat model.

use crate::classifier::EmotionClassifier;
use async_trait::async_trait;
use companion_common::{EmotionLabel, Result};
use companion_llm::{ChatMessage, LlmClient, LlmRequest};
use std::sync::Arc;
use tracing::warn;

const RATING_PROMPT: &str = "Rate the sentiment of the user's message on a scale from \
\"1 star\" (very negative) to \"5 stars\" (very positive). \
Answer with the rating only, for example \"4 stars\".";

pub struct LlmEmotionClassifier {
    llm: Arc<dyn LlmClient>,
}

impl LlmEmotionClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

/// Normalize answers such as "Rating: 2 Stars." or a bare "1" to a star label.
fn star_label(answer: &str) -> Option<String> {
    let lower = answer.to_lowercase();
    let digit = lower.chars().find(|c| ('1'..='5').contains(c))?;
    Some(if digit == '1' {
        "1 star".to_string()
    } else {
        format!("{digit} stars")
    })
}

#[async_trait]
impl EmotionClassifier for LlmEmotionClassifier {
    async fn classify(&self, text: &str) -> Result<EmotionLabel> {
        let mut request =
            LlmRequest::new(vec![ChatMessage::user(text)]).with_system_prompt(RATING_PROMPT);
        request.temperature = Some(0.0);
        request.max_tokens = Some(8);

        let response = self.llm.complete(request).await?;

        match star_label(&response.content) {
            Some(label) => Ok(EmotionLabel::from_star_rating(&label)),
            None => {
                warn!(answer = %response.content, "Unexpected rating from LLM, using neutral");
                Ok(EmotionLabel::Neutral)
            }
        }
    }

    fn name(&self) -> &str {
        "llm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_llm::LlmResponse;
    use parking_lot::Mutex;

    struct Scripted {
        answer: String,
        seen: Mutex<Option<LlmRequest>>,
    }

    #[async_trait]
    impl LlmClient for Scripted {
        async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
            *self.seen.lock() = Some(request);
            Ok(LlmResponse {
                content: self.answer.clone(),
                model: "scripted".into(),
                usage: None,
                finish_reason: Some("stop".into()),
            })
        }
        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn scripted(answer: &str) -> Arc<Scripted> {
        Arc::new(Scripted {
            answer: answer.into(),
            seen: Mutex::new(None),
        })
    }

    #[tokio::test]
    async fn maps_star_answers() {
        for (answer, expected) in [
            ("1 star", EmotionLabel::SuperNegative),
            ("Rating: 2 Stars.", EmotionLabel::Negative),
            ("3", EmotionLabel::Neutral),
            ("4 stars", EmotionLabel::Positive),
            ("5 stars!", EmotionLabel::SuperPositive),
        ] {
            let classifier = LlmEmotionClassifier::new(scripted(answer));
            assert_eq!(classifier.classify("text").await.unwrap(), expected, "{answer}");
        }
    }

    #[tokio::test]
    async fn unexpected_answer_is_neutral() {
        let classifier = LlmEmotionClassifier::new(scripted("I cannot rate that."));
        assert_eq!(
            classifier.classify("text").await.unwrap(),
            EmotionLabel::Neutral
        );
    }

    #[tokio::test]
    async fn sends_rating_instructions() {
        let llm = scripted("4 stars");
        let classifier = LlmEmotionClassifier::new(llm.clone());
        classifier.classify("I got the job!").await.unwrap();

        let seen = llm.seen.lock().take().unwrap();
        assert!(seen.system_prompt.unwrap().contains("1 star"));
        assert_eq!(seen.messages[0].content, "I got the job!");
        assert_eq!(seen.temperature, Some(0.0));
    }
}
