use super::{HandlerResult, Marker, StateHandler};
use crate::db::FeedbackRecord;
use crate::flow::StateId;
use crate::services::{PromptKey, ServiceBundle};
use crate::session::{FactChange, SessionContext};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

/// Collects one answer per turn and hands the full set to the feedback sink
pub struct FeedbackHandler;

#[async_trait]
impl StateHandler for FeedbackHandler {
    fn state(&self) -> StateId {
        StateId::Feedback
    }

    async fn handle(
        &self,
        ctx: &SessionContext,
        input: Option<&str>,
        services: &ServiceBundle,
    ) -> HandlerResult {
        let mut answers: Vec<String> = ctx
            .fact("feedback")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        answers.push(input.unwrap_or_default().trim().to_string());

        let questions = services.feedback_questions();
        let recorded = FactChange::set("feedback", answers.clone());

        if let Some(next_question) = questions.get(answers.len()) {
            return HandlerResult::new(StateId::Feedback)
                .with_message(next_question.clone())
                .with_fact(recorded);
        }

        let record = FeedbackRecord {
            session_id: ctx.session_id.clone(),
            symptom: ctx.fact_str("symptom").map(ToString::to_string),
            answers,
            recorded_at: Utc::now(),
        };
        let result = HandlerResult::new(StateId::Ended).with_fact(recorded);
        match services.record_feedback(&record).await {
            Ok(()) => result
                .with_message(services.prompt(PromptKey::FeedbackComplete, &[]))
                .with_marker(Marker::FeedbackSaved),
            Err(e) => result
                .with_message(services.prompt(PromptKey::FeedbackCompleteNoSave, &[]))
                .with_marker(Marker::FeedbackSaveFailed {
                    detail: e.to_string(),
                }),
        }
    }
}
