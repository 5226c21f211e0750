use super::input::{classify_yes_no, YesNo};
use super::{ask_yes_no_again, begin_feedback, HandlerResult, Marker, StateHandler};
use crate::flow::StateId;
use crate::services::{PromptKey, ServiceBundle};
use crate::session::{FactChange, SessionContext};
use async_trait::async_trait;

/// Offers a training exercise for the diagnosed behavior
pub struct ExerciseOfferHandler;

impl ExerciseOfferHandler {
    async fn exercise(ctx: &SessionContext, services: &ServiceBundle) -> HandlerResult {
        let symptom = ctx.fact_str("symptom").unwrap_or_default();
        let found = services
            .search(&services.settings.collections.exercises, symptom, 1)
            .await;

        let (text, marker) = match found {
            Ok(hits) => match hits.iter().find_map(|hit| hit.property("anleitung")) {
                Some(steps) => (
                    services.prompt(PromptKey::Exercise, &[("exercise", steps)]),
                    None,
                ),
                None => (services.prompt(PromptKey::ExerciseFallback, &[]), None),
            },
            Err(e) => (
                services.prompt(PromptKey::ExerciseFallback, &[]),
                Some(Marker::collaborator("vector_search", &e)),
            ),
        };

        let mut result = HandlerResult::new(StateId::EndOrRestart)
            .with_message(text.clone())
            .with_message(services.prompt(PromptKey::ContinueOrRestart, &[]))
            .with_fact(FactChange::set("exercise", text));
        if let Some(marker) = marker {
            result = result.with_marker(marker);
        }
        result
    }
}

#[async_trait]
impl StateHandler for ExerciseOfferHandler {
    fn state(&self) -> StateId {
        StateId::AskForExercise
    }

    async fn handle(
        &self,
        ctx: &SessionContext,
        input: Option<&str>,
        services: &ServiceBundle,
    ) -> HandlerResult {
        match classify_yes_no(input.unwrap_or_default()) {
            YesNo::Yes => Self::exercise(ctx, services).await,
            YesNo::No => begin_feedback(services),
            YesNo::Unclear => ask_yes_no_again(StateId::AskForExercise, services),
        }
    }
}
