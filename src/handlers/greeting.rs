use super::{HandlerResult, StateHandler};
use crate::flow::StateId;
use crate::services::{PromptKey, ServiceBundle};
use crate::session::SessionContext;
use async_trait::async_trait;

/// Entry point: introduces the persona and asks for a behavior
pub struct GreetingHandler;

#[async_trait]
impl StateHandler for GreetingHandler {
    fn state(&self) -> StateId {
        StateId::Greeting
    }

    async fn handle(
        &self,
        _ctx: &SessionContext,
        _input: Option<&str>,
        services: &ServiceBundle,
    ) -> HandlerResult {
        HandlerResult::new(StateId::WaitForSymptom)
            .with_message(services.prompt(PromptKey::Greeting, &[]))
            .with_message(services.prompt(PromptKey::InviteSymptom, &[]))
    }
}
