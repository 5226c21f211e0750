use super::input::{mentions_dog, visible_len};
use super::{unavailable, HandlerResult, Marker, StateHandler};
use crate::flow::StateId;
use crate::services::{PromptKey, ServiceBundle};
use crate::session::{FactChange, SessionContext};
use async_trait::async_trait;

/// Validates the behavior description: length first, then the keyword
/// pre-filter, then the model as the last word.
pub struct SymptomHandler;

impl SymptomHandler {
    fn accept(text: &str, services: &ServiceBundle) -> HandlerResult {
        HandlerResult::new(StateId::WaitForContext)
            .with_message(services.prompt(PromptKey::ContextQuestion, &[]))
            .with_fact(FactChange::set("symptom", text))
            .with_fact(FactChange::remove("context"))
    }

    fn reject(key: PromptKey, reason: &'static str, services: &ServiceBundle) -> HandlerResult {
        HandlerResult::new(StateId::WaitForSymptom)
            .with_message(services.prompt(key, &[]))
            .with_marker(Marker::InputRejected { reason })
    }
}

#[async_trait]
impl StateHandler for SymptomHandler {
    fn state(&self) -> StateId {
        StateId::WaitForSymptom
    }

    async fn handle(
        &self,
        _ctx: &SessionContext,
        input: Option<&str>,
        services: &ServiceBundle,
    ) -> HandlerResult {
        let text = input.unwrap_or_default().trim();

        if visible_len(text) < services.settings.min_symptom_chars {
            return Self::reject(PromptKey::SymptomTooShort, "too_short", services);
        }

        if mentions_dog(text) {
            return Self::accept(text, services);
        }

        let criteria = services.prompt(PromptKey::DomainCriteria, &[]);
        match services.classify(text, &criteria).await {
            Ok(verdict) if verdict.matches => Self::accept(text, services),
            Ok(_) => Self::reject(PromptKey::OffTopic, "off_topic", services),
            Err(e) => unavailable(StateId::WaitForSymptom, services, "classification", &e),
        }
    }
}
