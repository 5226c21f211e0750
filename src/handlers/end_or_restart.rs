use super::input::{classify_yes_no, YesNo};
use super::{ask_yes_no_again, begin_feedback, HandlerResult, StateHandler};
use crate::flow::StateId;
use crate::services::{PromptKey, ServiceBundle};
use crate::session::{FactChange, SessionContext};
use async_trait::async_trait;

/// "Another behavior?" Yes starts over, no moves on to feedback.
pub struct EndOrRestartHandler;

#[async_trait]
impl StateHandler for EndOrRestartHandler {
    fn state(&self) -> StateId {
        StateId::EndOrRestart
    }

    async fn handle(
        &self,
        _ctx: &SessionContext,
        input: Option<&str>,
        services: &ServiceBundle,
    ) -> HandlerResult {
        match classify_yes_no(input.unwrap_or_default()) {
            YesNo::Yes => HandlerResult::new(StateId::WaitForSymptom)
                .with_message(services.prompt(PromptKey::DescribeAnother, &[]))
                .with_fact(FactChange::Clear),
            YesNo::No => begin_feedback(services),
            YesNo::Unclear => ask_yes_no_again(StateId::EndOrRestart, services),
        }
    }
}
