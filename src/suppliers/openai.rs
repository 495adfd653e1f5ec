//! OpenAI-backed question and review generation
//!
//! One chat-completions client in JSON mode serves both suppliers; the
//! structured payloads below are the contract with the model.

use super::{
    QuestionRequest, QuestionSupplier, ReviewBatch, ReviewSupplier, SupplierError,
};
use crate::survey::{AnswerRecord, Artifact, Question, SentimentBand, UpstreamContext};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const QUESTION_SYSTEM_PROMPT: &str = "You are an expert survey designer conducting an adaptive product survey. \
Generate engaging multiple-choice questions that build on the user's previous answers and the supplied \
product and customer context. Each question needs 4-6 options covering diverse perspectives. \
Set allow_multiple=true only where several options can logically be selected together. \
Never repeat a question that was already asked. \
Respond with a JSON object: {\"questions\": [{\"question_text\": str, \"options\": [str], \
\"allow_multiple\": bool, \"reasoning\": str}]}";

const REVIEW_SYSTEM_PROMPT: &str = "You are an expert at writing authentic product reviews. \
First classify the overall sentiment of the survey responses as one of good, okay or bad. \
Then write review options that reflect the answers: for good, a 5-star and a 4-star review; \
for okay, a 4-star, a 3-star and a 2-star review; for bad, a 2-star and a 1-star review. \
Vary tone and length, include concrete details from the answers, and write like a real \
customer, not an AI. \
Respond with a JSON object: {\"sentiment_band\": \"good\"|\"okay\"|\"bad\", \
\"reviews\": [{\"review_text\": str, \"review_stars\": 1-5, \"tone\": str, \"highlights\": [str]}]}";

/// OpenAI chat-completions supplier
pub struct OpenAiSupplier {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiSupplier {
    pub fn new(api_key: String, model: impl Into<String>, base_url: Option<&str>) -> Self {
        let base_url = base_url.map_or_else(
            || "https://api.openai.com/v1/chat/completions".to_string(),
            |base| format!("{}/chat/completions", base.trim_end_matches('/')),
        );

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            model: model.into(),
            base_url,
        }
    }

    /// One JSON-mode completion round-trip, returning the parsed object.
    pub(super) async fn complete_json(
        &self,
        system: &str,
        user: &str,
    ) -> Result<Value, SupplierError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.7,
            response_format: ResponseFormat {
                r#type: "json_object",
            },
        };

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SupplierError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    SupplierError::network(format!("Connection failed: {e}"))
                } else {
                    SupplierError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SupplierError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            SupplierError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| SupplierError::unusable_content("Completion had no choices"))?;

        serde_json::from_str(&content).map_err(|e| {
            SupplierError::unusable_content(format!("Generator returned non-JSON content: {e}"))
        })
    }
}

fn classify_error(status: reqwest::StatusCode, body: &str) -> SupplierError {
    match status.as_u16() {
        401 | 403 => SupplierError::auth(format!("Authentication failed: {body}")),
        429 => SupplierError::rate_limit(format!("Rate limited: {body}")),
        400 => SupplierError::invalid_request(format!("Invalid request: {body}")),
        500..=599 => SupplierError::server_error(format!("Server error: {body}")),
        _ => SupplierError::unknown(format!("HTTP {status}: {body}")),
    }
}

// ============================================================================
// Question generation
// ============================================================================

#[async_trait]
impl QuestionSupplier for OpenAiSupplier {
    async fn generate_questions(
        &self,
        request: QuestionRequest<'_>,
    ) -> Result<Vec<Question>, SupplierError> {
        let user = render_question_prompt(&request);
        let payload = self.complete_json(QUESTION_SYSTEM_PROMPT, &user).await?;
        let questionnaire: QuestionnairePayload =
            serde_json::from_value(payload).map_err(|e| {
                SupplierError::unusable_content(format!("Malformed questionnaire payload: {e}"))
            })?;

        Ok(questionnaire
            .questions
            .into_iter()
            .map(Question::from)
            .collect())
    }
}

fn render_question_prompt(request: &QuestionRequest<'_>) -> String {
    let mut prompt = format!(
        "Product Context:\n{}\n\nCustomer Context:\n{}\n\n",
        pretty(&request.upstream_context.product),
        pretty(&request.upstream_context.customer),
    );

    if request.answered.is_empty() {
        prompt.push_str("This is the start of the survey.\n\n");
    } else {
        prompt.push_str("Previous Q&A:\n");
        for (i, record) in request.answered.iter().enumerate() {
            let _ = write!(
                prompt,
                "Q{}: {}\nA: {}\n",
                i + 1,
                record.question_text,
                record.value.as_text()
            );
        }
        prompt.push('\n');
    }

    if request.skipped_count > 0 {
        let _ = write!(
            prompt,
            "The user skipped {} question(s) so far; prefer questions they are likely to engage with.\n\n",
            request.skipped_count
        );
    }

    if !request.already_asked.is_empty() {
        prompt.push_str("Already asked (do not repeat):\n");
        for text in request.already_asked {
            let _ = writeln!(prompt, "- {text}");
        }
        prompt.push('\n');
    }

    let _ = write!(
        prompt,
        "Generate {} follow-up question(s) that build on the conversation. Each question should have 4-6 options.",
        request.count
    );
    prompt
}

#[derive(Debug, Deserialize)]
struct QuestionnairePayload {
    questions: Vec<QuestionPayload>,
}

#[derive(Debug, Deserialize)]
struct QuestionPayload {
    question_text: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    allow_multiple: bool,
    #[serde(default)]
    reasoning: String,
}

impl From<QuestionPayload> for Question {
    fn from(payload: QuestionPayload) -> Self {
        Question {
            text: payload.question_text,
            options: payload.options,
            allow_multiple: payload.allow_multiple,
            rationale: payload.reasoning,
        }
    }
}

// ============================================================================
// Review generation
// ============================================================================

#[async_trait]
impl ReviewSupplier for OpenAiSupplier {
    async fn generate_reviews(
        &self,
        answers: &[AnswerRecord],
        context: &UpstreamContext,
    ) -> Result<ReviewBatch, SupplierError> {
        let user = render_review_prompt(answers, context);
        let payload = self.complete_json(REVIEW_SYSTEM_PROMPT, &user).await?;
        let reviews: ReviewsPayload = serde_json::from_value(payload).map_err(|e| {
            SupplierError::unusable_content(format!("Malformed reviews payload: {e}"))
        })?;

        let artifacts: Vec<Artifact> = reviews
            .reviews
            .into_iter()
            .filter(|review| (1..=5).contains(&review.review_stars))
            .map(|review| Artifact {
                text: review.review_text,
                rating: review.review_stars,
                tone: review.tone,
                highlights: review.highlights,
            })
            .collect();

        if artifacts.is_empty() {
            return Err(SupplierError::unusable_content(
                "Generator produced no usable review artifacts",
            ));
        }

        Ok(ReviewBatch {
            artifacts,
            sentiment_band: reviews.sentiment_band,
        })
    }
}

fn render_review_prompt(answers: &[AnswerRecord], context: &UpstreamContext) -> String {
    let mut prompt = String::from("Survey Responses:\n");
    for record in answers {
        let _ = write!(
            prompt,
            "Q: {}\nA: {}\n\n",
            record.question_text,
            record.value.as_text()
        );
    }
    let _ = write!(
        prompt,
        "Product Context:\n{}\n\nCustomer Profile:\n{}\n\nGenerate authentic review options that reflect the survey responses.",
        pretty(&context.product),
        pretty(&context.customer),
    );
    prompt
}

#[derive(Debug, Deserialize)]
struct ReviewsPayload {
    reviews: Vec<ReviewPayload>,
    sentiment_band: SentimentBand,
}

#[derive(Debug, Deserialize)]
struct ReviewPayload {
    review_text: String,
    review_stars: u8,
    #[serde(default)]
    tone: String,
    #[serde(default)]
    highlights: Vec<String>,
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

// OpenAI wire types

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::AnswerValue;
    use chrono::DateTime;
    use serde_json::json;
    use std::collections::BTreeSet;

    #[test]
    fn questionnaire_payload_maps_to_questions() {
        let payload = json!({
            "questions": [
                {
                    "question_text": "Which features do you use?",
                    "options": ["Battery", "Display", "Camera", "Audio"],
                    "allow_multiple": true,
                    "reasoning": "Feature usage drives the review angle"
                },
                {
                    "question_text": "Would you recommend it?",
                    "options": ["Yes", "No"]
                }
            ]
        });

        let parsed: QuestionnairePayload = serde_json::from_value(payload).unwrap();
        let questions: Vec<Question> = parsed.questions.into_iter().map(Question::from).collect();

        assert_eq!(questions.len(), 2);
        assert!(questions[0].allow_multiple);
        assert_eq!(questions[0].options.len(), 4);
        assert!(!questions[1].allow_multiple);
        assert!(questions[1].rationale.is_empty());
    }

    #[test]
    fn reviews_payload_parses_band_and_stars() {
        let payload = json!({
            "sentiment_band": "okay",
            "reviews": [
                {"review_text": "Decent but flawed", "review_stars": 3, "tone": "balanced", "highlights": ["value"]},
                {"review_text": "Impossible rating", "review_stars": 9}
            ]
        });

        let parsed: ReviewsPayload = serde_json::from_value(payload).unwrap();
        assert_eq!(parsed.sentiment_band, SentimentBand::Okay);

        let usable: Vec<_> = parsed
            .reviews
            .into_iter()
            .filter(|r| (1..=5).contains(&r.review_stars))
            .collect();
        assert_eq!(usable.len(), 1);
    }

    #[test]
    fn unknown_band_is_rejected() {
        let payload = json!({
            "sentiment_band": "stellar",
            "reviews": []
        });
        assert!(serde_json::from_value::<ReviewsPayload>(payload).is_err());
    }

    #[test]
    fn question_prompt_carries_history_and_dedup_list() {
        let context = UpstreamContext::default();
        let answered = vec![AnswerRecord {
            question_index: 0,
            question_text: "How satisfied are you?".to_string(),
            value: AnswerValue::Multiple(vec!["Price".to_string(), "Quality".to_string()]),
            answered_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }];
        let asked: BTreeSet<String> = ["How satisfied are you?".to_string()].into();

        let prompt = render_question_prompt(&QuestionRequest {
            upstream_context: &context,
            answered: &answered,
            already_asked: &asked,
            skipped_count: 2,
            count: 2,
        });

        assert!(prompt.contains("Q1: How satisfied are you?"));
        assert!(prompt.contains("A: Price, Quality"));
        assert!(prompt.contains("skipped 2 question(s)"));
        assert!(prompt.contains("do not repeat"));
        assert!(prompt.contains("Generate 2 follow-up question(s)"));
    }
}
