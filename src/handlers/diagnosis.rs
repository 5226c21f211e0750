use super::{match_text, unavailable, HandlerResult, Marker, StateHandler};
use crate::flow::StateId;
use crate::services::{CompletionRequest, PromptKey, SearchHit, ServiceBundle};
use crate::session::{FactChange, SessionContext};
use async_trait::async_trait;

/// Persona-voiced explanation, synthesised from the match and the instinct
/// notes that fit the situation.
pub struct DiagnosisHandler;

fn instinct_notes(hits: &[SearchHit]) -> String {
    hits.iter()
        .filter_map(|hit| {
            let text = hit.property("hundesperspektive")?;
            Some(match hit.property("instinkt") {
                Some(name) => format!("- {name}: {text}"),
                None => format!("- {text}"),
            })
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl StateHandler for DiagnosisHandler {
    fn state(&self) -> StateId {
        StateId::Diagnosis
    }

    async fn handle(
        &self,
        ctx: &SessionContext,
        _input: Option<&str>,
        services: &ServiceBundle,
    ) -> HandlerResult {
        let settings = &services.settings;
        let symptom = ctx.fact_str("symptom").unwrap_or_default();
        let context = ctx.fact_str("context").unwrap_or_default();
        let matched = match_text(ctx);

        // Instinct notes improve the answer but are not required for one
        let mut degraded = None;
        let instincts = match services
            .search(
                &settings.collections.instincts,
                &format!("{symptom} {context}"),
                settings.search_limit,
            )
            .await
        {
            Ok(hits) => instinct_notes(&hits),
            Err(e) => {
                degraded = Some(Marker::collaborator("vector_search", &e));
                String::new()
            }
        };

        let vars = [
            ("symptom", symptom),
            ("context", context),
            ("match", matched.as_str()),
            ("instincts", instincts.as_str()),
        ];
        let request = CompletionRequest::new(services.prompt(PromptKey::DiagnosisPrompt, &vars))
            .with_system_prompt(services.prompt(PromptKey::DiagnosisSystem, &[]))
            .with_params(settings.generation);

        let mut result = match services.complete(&request).await {
            Ok(explanation) => HandlerResult::new(StateId::AskForExercise)
                .with_message(explanation.clone())
                .with_message(services.prompt(PromptKey::ExerciseQuestion, &[]))
                .with_fact(FactChange::set("diagnosis", explanation)),
            Err(e) => unavailable(StateId::Diagnosis, services, "text_generation", &e),
        };
        if let Some(marker) = degraded {
            result = result.with_marker(marker);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceError;
    use crate::testing::{hit, test_context, TestServices};
    use serde_json::json;

    fn ctx() -> SessionContext {
        let mut ctx = test_context(StateId::Diagnosis);
        ctx.apply_fact(FactChange::set("symptom", "Mein Hund jagt Enten"));
        ctx.apply_fact(FactChange::set("context", "am See, ohne Leine"));
        ctx.apply_fact(FactChange::set(
            "match",
            json!({"symptom_name": "Jagen", "schnelldiagnose": "Ich folge meinem Jagdtrieb"}),
        ));
        ctx
    }

    #[tokio::test]
    async fn test_synthesis_uses_match_and_instincts() {
        let services = TestServices::new();
        services.search.queue(
            "Instinkte",
            Ok(vec![hit(
                json!({"instinkt": "Jagd", "hundesperspektive": "Bewegung zieht mich magisch an"}),
                0.2,
            )]),
        );
        services
            .text
            .queue_completion(Ok("Wenn ich Enten sehe, kribbelt alles in mir.".into()));
        let bundle = services.build();

        let result = DiagnosisHandler.handle(&ctx(), None, &bundle).await;
        assert_eq!(result.next, StateId::AskForExercise);
        assert_eq!(
            result.messages,
            vec![
                "Wenn ich Enten sehe, kribbelt alles in mir.".to_string(),
                bundle.prompt(PromptKey::ExerciseQuestion, &[])
            ]
        );

        let requests = services.text.completion_requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].prompt.contains("Mein Hund jagt Enten"));
        assert!(requests[0].prompt.contains("Ich folge meinem Jagdtrieb"));
        assert!(requests[0].prompt.contains("- Jagd: Bewegung zieht mich magisch an"));
        assert_eq!(
            requests[0].system_prompt.as_deref(),
            Some(bundle.prompt(PromptKey::DiagnosisSystem, &[]).as_str())
        );
    }

    #[tokio::test]
    async fn test_instinct_outage_degrades() {
        let services = TestServices::new();
        services
            .search
            .queue("Instinkte", Err(ServiceError::network("down")));
        services.text.queue_completion(Ok("Erklärung".into()));

        let result = DiagnosisHandler.handle(&ctx(), None, &services.build()).await;
        assert_eq!(result.next, StateId::AskForExercise);
        assert!(result
            .markers
            .iter()
            .any(|m| matches!(m, Marker::CollaboratorFailed { service: "vector_search", .. })));
    }

    #[tokio::test]
    async fn test_generation_outage_retries_next_turn() {
        let services = TestServices::new();
        services
            .text
            .queue_completion(Err(ServiceError::timeout("slow")));
        let bundle = services.build();

        let result = DiagnosisHandler.handle(&ctx(), None, &bundle).await;
        assert_eq!(result.next, StateId::Diagnosis);
        assert_eq!(result.messages, vec![bundle.prompt(PromptKey::Unavailable, &[])]);
        assert!(result.facts.is_empty());
    }
}
