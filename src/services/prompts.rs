//! Prompt provisioning
//!
//! All user-visible copy and every model prompt comes from a
//! [`PromptProvider`]. Handlers only name the [`PromptKey`] they need.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt catalog is missing key: {0}")]
    Missing(PromptKey),
    #[error("Prompt catalog declares no feedback questions")]
    NoFeedbackQuestions,
    #[error("Failed to read prompt catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid prompt catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Every piece of copy the engine asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKey {
    Greeting,
    InviteSymptom,
    SymptomTooShort,
    OffTopic,
    /// Classification criteria for the domain check
    DomainCriteria,
    ContextQuestion,
    NeedMoreContext,
    NoMatch,
    /// Vars: `match`
    MatchSummary,
    AskForMore,
    RequestYesNo,
    DescribeAnother,
    /// Vars: `symptom`, `context`, `match`, `instincts`
    DiagnosisPrompt,
    DiagnosisSystem,
    ExerciseQuestion,
    /// Vars: `exercise`
    Exercise,
    ExerciseFallback,
    ContinueOrRestart,
    FeedbackIntro,
    FeedbackComplete,
    FeedbackCompleteNoSave,
    RestartConfirmed,
    Unavailable,
    Apology,
    GenericFailure,
    ConversationEnded,
    TurnInProgress,
}

impl PromptKey {
    pub const ALL: [PromptKey; 27] = [
        PromptKey::Greeting,
        PromptKey::InviteSymptom,
        PromptKey::SymptomTooShort,
        PromptKey::OffTopic,
        PromptKey::DomainCriteria,
        PromptKey::ContextQuestion,
        PromptKey::NeedMoreContext,
        PromptKey::NoMatch,
        PromptKey::MatchSummary,
        PromptKey::AskForMore,
        PromptKey::RequestYesNo,
        PromptKey::DescribeAnother,
        PromptKey::DiagnosisPrompt,
        PromptKey::DiagnosisSystem,
        PromptKey::ExerciseQuestion,
        PromptKey::Exercise,
        PromptKey::ExerciseFallback,
        PromptKey::ContinueOrRestart,
        PromptKey::FeedbackIntro,
        PromptKey::FeedbackComplete,
        PromptKey::FeedbackCompleteNoSave,
        PromptKey::RestartConfirmed,
        PromptKey::Unavailable,
        PromptKey::Apology,
        PromptKey::GenericFailure,
        PromptKey::ConversationEnded,
        PromptKey::TurnInProgress,
    ];
}

impl std::fmt::Display for PromptKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // serde name doubles as the display form
        match serde_json::to_value(self) {
            Ok(serde_json::Value::String(name)) => f.write_str(&name),
            _ => write!(f, "{self:?}"),
        }
    }
}

/// Source of prompts and copy
pub trait PromptProvider: Send + Sync {
    /// Render `key`, substituting `{name}` placeholders from `vars`
    fn render(&self, key: PromptKey, vars: &[(&str, &str)]) -> Option<String>;

    /// Feedback questionnaire, asked in order
    fn feedback_questions(&self) -> Vec<String>;
}

impl<T: PromptProvider + ?Sized> PromptProvider for Arc<T> {
    fn render(&self, key: PromptKey, vars: &[(&str, &str)]) -> Option<String> {
        (**self).render(key, vars)
    }

    fn feedback_questions(&self) -> Vec<String> {
        (**self).feedback_questions()
    }
}

/// Check that `provider` can serve everything the handlers ask for
pub fn validate_prompts(provider: &dyn PromptProvider) -> Result<(), PromptError> {
    for key in PromptKey::ALL {
        if provider.render(key, &[]).is_none() {
            return Err(PromptError::Missing(key));
        }
    }
    if provider.feedback_questions().is_empty() {
        return Err(PromptError::NoFeedbackQuestions);
    }
    Ok(())
}

/// Single pass over `template`: each `{name}` found in `vars` is replaced,
/// everything else (including substituted values) is copied through as is.
fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    let lookup = |name: &str| {
        vars.iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
    };
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some((before, after)) = rest.split_once('{') {
        out.push_str(before);
        match after
            .split_once('}')
            .and_then(|(name, tail)| Some((lookup(name)?, tail)))
        {
            Some((value, tail)) => {
                out.push_str(value);
                rest = tail;
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Prompt catalog loaded from a JSON document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptCatalog {
    pub prompts: HashMap<PromptKey, String>,
    #[serde(default)]
    pub feedback_questions: Vec<String>,
}

impl PromptCatalog {
    pub fn from_json(document: &str) -> Result<Self, PromptError> {
        Ok(serde_json::from_str(document)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PromptError> {
        let document = std::fs::read_to_string(path)?;
        Self::from_json(&document)
    }

    #[must_use]
    pub fn with_prompt(mut self, key: PromptKey, text: impl Into<String>) -> Self {
        self.prompts.insert(key, text.into());
        self
    }
}

impl PromptProvider for PromptCatalog {
    fn render(&self, key: PromptKey, vars: &[(&str, &str)]) -> Option<String> {
        self.prompts
            .get(&key)
            .map(|template| substitute(template, vars))
    }

    fn feedback_questions(&self) -> Vec<String> {
        self.feedback_questions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHIPPED: &str = include_str!("../../config/prompts.json");

    #[test]
    fn test_shipped_catalog_is_complete() {
        let catalog = PromptCatalog::from_json(SHIPPED).unwrap();
        validate_prompts(&catalog).unwrap();
        assert_eq!(catalog.feedback_questions().len(), 5);
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let catalog = PromptCatalog::default()
            .with_prompt(PromptKey::MatchSummary, "Aus meiner Sicht: {match} ({match})");
        assert_eq!(
            catalog
                .render(PromptKey::MatchSummary, &[("match", "ich bewache")])
                .unwrap(),
            "Aus meiner Sicht: ich bewache (ich bewache)"
        );
        assert!(catalog.render(PromptKey::Greeting, &[]).is_none());
    }

    #[test]
    fn test_substituted_values_are_not_rewritten() {
        let catalog = PromptCatalog::default()
            .with_prompt(PromptKey::DiagnosisPrompt, "S: {symptom} I: {instincts} {unknown}");
        let rendered = catalog
            .render(
                PromptKey::DiagnosisPrompt,
                &[("symptom", "bellt {instincts}"), ("instincts", "JAGD")],
            )
            .unwrap();
        assert_eq!(rendered, "S: bellt {instincts} I: JAGD {unknown}");
    }

    #[test]
    fn test_validation_reports_missing_key() {
        let catalog = PromptCatalog::default().with_prompt(PromptKey::Greeting, "Hallo");
        assert!(matches!(
            validate_prompts(&catalog),
            Err(PromptError::Missing(PromptKey::InviteSymptom))
        ));
    }

    #[test]
    fn test_validation_requires_feedback_questions() {
        let mut catalog = PromptCatalog::from_json(SHIPPED).unwrap();
        catalog.feedback_questions.clear();
        assert!(matches!(
            validate_prompts(&catalog),
            Err(PromptError::NoFeedbackQuestions)
        ));
    }

    #[test]
    fn test_key_display_uses_catalog_name() {
        assert_eq!(PromptKey::FeedbackCompleteNoSave.to_string(), "feedback_complete_no_save");
    }
}
