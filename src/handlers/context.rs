use super::input::visible_len;
use super::{HandlerResult, StateHandler};
use crate::flow::StateId;
use crate::services::{PromptKey, ServiceBundle};
use crate::session::{FactChange, SessionContext};
use async_trait::async_trait;

/// Gathers situational context until there is enough to search with
pub struct ContextHandler;

#[async_trait]
impl StateHandler for ContextHandler {
    fn state(&self) -> StateId {
        StateId::WaitForContext
    }

    async fn handle(
        &self,
        ctx: &SessionContext,
        input: Option<&str>,
        services: &ServiceBundle,
    ) -> HandlerResult {
        let addition = input.unwrap_or_default().trim();
        let context = match (ctx.fact_str("context").unwrap_or_default(), addition) {
            (earlier, "") => earlier.to_string(),
            ("", added) => added.to_string(),
            (earlier, added) => format!("{earlier} {added}"),
        };

        let complete = visible_len(&context) >= services.settings.min_context_chars;
        let mut result = if complete {
            HandlerResult::new(StateId::RetrieveMatch)
        } else {
            HandlerResult::new(StateId::WaitForContext)
                .with_message(services.prompt(PromptKey::NeedMoreContext, &[]))
        };
        if !addition.is_empty() {
            result = result.with_fact(FactChange::set("context", context));
        }
        result
    }
}
