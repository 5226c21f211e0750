use super::{unavailable, HandlerResult, StateHandler};
use crate::flow::StateId;
use crate::services::{Collections, PromptKey, SearchHit, ServiceBundle};
use crate::session::{FactChange, SessionContext};
use async_trait::async_trait;
use serde_json::Value;

/// Looks the described behavior up in the knowledge base
pub struct RetrievalHandler;

fn summary_text(hit: &SearchHit) -> String {
    Collections::SYMPTOM_TEXT_PROPERTIES
        .iter()
        .find_map(|name| hit.property(name))
        .map_or_else(|| Value::Object(hit.properties.clone()).to_string(), ToString::to_string)
}

#[async_trait]
impl StateHandler for RetrievalHandler {
    fn state(&self) -> StateId {
        StateId::RetrieveMatch
    }

    async fn handle(
        &self,
        ctx: &SessionContext,
        _input: Option<&str>,
        services: &ServiceBundle,
    ) -> HandlerResult {
        let settings = &services.settings;
        let query = format!(
            "{} {}",
            ctx.fact_str("symptom").unwrap_or_default(),
            ctx.fact_str("context").unwrap_or_default()
        );

        let hits = match services
            .search(&settings.collections.symptoms, query.trim(), settings.search_limit)
            .await
        {
            Ok(hits) => hits,
            Err(e) => return unavailable(StateId::RetrieveMatch, services, "vector_search", &e),
        };

        let best = hits
            .into_iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
            .filter(|hit| hit.distance < settings.max_match_distance);

        let Some(best) = best else {
            tracing::info!(limit = settings.max_match_distance, "No confident match");
            return HandlerResult::new(StateId::WaitForContext)
                .with_message(services.prompt(PromptKey::NoMatch, &[]));
        };

        let summary = summary_text(&best);
        HandlerResult::new(StateId::WaitForConfirmation)
            .with_message(services.prompt(PromptKey::MatchSummary, &[("match", &summary)]))
            .with_message(services.prompt(PromptKey::AskForMore, &[]))
            .with_fact(FactChange::set("match", Value::Object(best.properties)))
            .with_fact(FactChange::set("match_distance", f64::from(best.distance)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceError;
    use crate::testing::{hit, test_context, TestServices};
    use serde_json::json;

    fn ctx() -> SessionContext {
        let mut ctx = test_context(StateId::RetrieveMatch);
        ctx.apply_fact(FactChange::set("symptom", "Mein Hund bellt an der Tür"));
        ctx.apply_fact(FactChange::set("context", "wenn es klingelt, abends"));
        ctx
    }

    #[tokio::test]
    async fn test_confident_match_advances() {
        let services = TestServices::new();
        services.search.queue(
            "Symptome",
            Ok(vec![
                hit(json!({"symptom_name": "Jagen", "schnelldiagnose": "Ich jage"}), 0.55),
                hit(json!({"symptom_name": "Bellen", "schnelldiagnose": "Ich melde Besuch"}), 0.3),
            ]),
        );
        let bundle = services.build();
        let result = RetrievalHandler.handle(&ctx(), None, &bundle).await;

        assert_eq!(result.next, StateId::WaitForConfirmation);
        assert_eq!(
            result.messages[0],
            bundle.prompt(PromptKey::MatchSummary, &[("match", "Ich melde Besuch")])
        );
        assert_eq!(result.messages[1], bundle.prompt(PromptKey::AskForMore, &[]));
        assert!(result
            .facts
            .iter()
            .any(|f| matches!(f, FactChange::Set { key, value } if key == "match" && value["symptom_name"] == "Bellen")));

        let calls = services.search.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "Symptome");
        assert_eq!(calls[0].1, "Mein Hund bellt an der Tür wenn es klingelt, abends");
        assert_eq!(calls[0].2, 3);
    }

    #[tokio::test]
    async fn test_weak_match_asks_for_more_detail() {
        let services = TestServices::new();
        services
            .search
            .queue("Symptome", Ok(vec![hit(json!({"symptom_name": "Bellen"}), 0.6)]));
        let bundle = services.build();
        let result = RetrievalHandler.handle(&ctx(), None, &bundle).await;

        assert_eq!(result.next, StateId::WaitForContext);
        assert_eq!(result.messages, vec![bundle.prompt(PromptKey::NoMatch, &[])]);
        assert!(result.facts.is_empty());
    }

    #[tokio::test]
    async fn test_empty_result_asks_for_more_detail() {
        let services = TestServices::new();
        let result = RetrievalHandler.handle(&ctx(), None, &services.build()).await;
        assert_eq!(result.next, StateId::WaitForContext);
    }

    #[tokio::test]
    async fn test_search_outage_stays_put() {
        let services = TestServices::new();
        services
            .search
            .queue("Symptome", Err(ServiceError::timeout("slow")));
        let bundle = services.build();
        let result = RetrievalHandler.handle(&ctx(), None, &bundle).await;

        assert_eq!(result.next, StateId::RetrieveMatch);
        assert_eq!(result.messages, vec![bundle.prompt(PromptKey::Unavailable, &[])]);
        assert!(result.facts.is_empty());
    }
}
