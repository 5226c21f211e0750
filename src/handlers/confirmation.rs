use super::input::{classify_yes_no, YesNo};
use super::{ask_yes_no_again, HandlerResult, StateHandler};
use crate::flow::StateId;
use crate::services::{PromptKey, ServiceBundle};
use crate::session::{FactChange, SessionContext};
use async_trait::async_trait;

/// "Do you want to know more?" after a match was shown
pub struct ConfirmationHandler;

#[async_trait]
impl StateHandler for ConfirmationHandler {
    fn state(&self) -> StateId {
        StateId::WaitForConfirmation
    }

    async fn handle(
        &self,
        _ctx: &SessionContext,
        input: Option<&str>,
        services: &ServiceBundle,
    ) -> HandlerResult {
        match classify_yes_no(input.unwrap_or_default()) {
            YesNo::Yes => HandlerResult::new(StateId::Diagnosis),
            YesNo::No => HandlerResult::new(StateId::WaitForSymptom)
                .with_message(services.prompt(PromptKey::DescribeAnother, &[]))
                .with_fact(FactChange::Clear),
            YesNo::Unclear => ask_yes_no_again(StateId::WaitForConfirmation, services),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_context, TestServices};

    #[tokio::test]
    async fn test_yes_goes_to_diagnosis() {
        let services = TestServices::new().build();
        let result = ConfirmationHandler
            .handle(&test_context(StateId::WaitForConfirmation), Some("Ja, gerne"), &services)
            .await;
        assert_eq!(result.next, StateId::Diagnosis);
        assert!(result.messages.is_empty());
    }

    #[tokio::test]
    async fn test_no_starts_over_with_clean_facts() {
        let services = TestServices::new().build();
        let result = ConfirmationHandler
            .handle(&test_context(StateId::WaitForConfirmation), Some("nein"), &services)
            .await;
        assert_eq!(result.next, StateId::WaitForSymptom);
        assert_eq!(result.facts, vec![FactChange::Clear]);
        assert_eq!(
            result.messages,
            vec![services.prompt(PromptKey::DescribeAnother, &[])]
        );
    }

    #[tokio::test]
    async fn test_unclear_answer_repeats_question() {
        let services = TestServices::new().build();
        let result = ConfirmationHandler
            .handle(&test_context(StateId::WaitForConfirmation), Some("hmm"), &services)
            .await;
        assert_eq!(result.next, StateId::WaitForConfirmation);
        assert_eq!(
            result.messages,
            vec![services.prompt(PromptKey::RequestYesNo, &[])]
        );
    }
}
