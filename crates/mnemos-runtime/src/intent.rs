//! Utterance intent classification.
//!
//! [`IntentClassifier`] asks a [`Completion`] model to tag an utterance with
//! one of three [`Intent`]s. Model failures surface as
//! [`ClassificationError`]; callers that prefer to keep talking degrade with
//! [`Intent::or_general_talk`].

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm_driver::{Completion, LlmError};

/// Instruction sent as the system message of every classification.
pub const CLASSIFIER_PROMPT: &str = "\
### Task: Classify the user's intent into exactly one of these tags.
### Rules:
1. [SAVE_SPEC]: the user asks to remember or record a new spec, rule or piece of information
   (e.g. '이거 기억해둬', '사양 등록해줘', 'remember this', 'save this spec')
2. [SEARCH_MEMORY]: the user asks about or searches for something stored earlier
   (e.g. '아까 그게 뭐야?', '저번에 말한 사양 알려줘', 'what was that button?', 'find the spec')
3. [GENERAL_TALK]: greetings, small talk, usage questions and anything else
   (e.g. '안녕', '너는 누구니?', 'hello', 'show me the help')

### Constraint: Respond with ONLY the tag name in brackets (e.g., [SAVE_SPEC]).";

/// What the user wants from an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    /// Record a new spec, rule or fact.
    SaveSpec,
    /// Recall something stored earlier.
    SearchMemory,
    GeneralTalk,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::SaveSpec => "SAVE_SPEC",
            Intent::SearchMemory => "SEARCH_MEMORY",
            Intent::GeneralTalk => "GENERAL_TALK",
        }
    }

    /// Map a raw model reply to a tag.
    ///
    /// The reply is trimmed and upper-cased; the first tag it contains wins,
    /// `SAVE_SPEC` before `SEARCH_MEMORY`. Anything else is general talk.
    pub fn from_reply(reply: &str) -> Self {
        let normalized = reply.trim().to_uppercase();
        if normalized.contains("SAVE_SPEC") {
            Intent::SaveSpec
        } else if normalized.contains("SEARCH_MEMORY") {
            Intent::SearchMemory
        } else {
            Intent::GeneralTalk
        }
    }

    /// JSON Schema of the tag, for constraining model output.
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(Intent)).unwrap_or(serde_json::Value::Null)
    }

    /// Degrade a failed classification to [`Intent::GeneralTalk`].
    pub fn or_general_talk(result: Result<Intent, ClassificationError>) -> Intent {
        result.unwrap_or_else(|e| {
            warn!(error = %e, "intent classification failed; treating as general talk");
            Intent::GeneralTalk
        })
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can arise while classifying an utterance.
#[derive(Error, Debug)]
pub enum ClassificationError {
    /// The model could not be reached or returned an unusable response.
    #[error("classifier model failed: {0}")]
    Model(#[from] LlmError),
}

/// Tags utterances through a [`Completion`] model.
pub struct IntentClassifier<C> {
    model: C,
}

impl<C: Completion> IntentClassifier<C> {
    pub fn new(model: C) -> Self {
        Self { model }
    }

    /// Classify `utterance`.
    ///
    /// Blank input is [`Intent::GeneralTalk`] without a model call.
    pub fn classify(&self, utterance: &str) -> Result<Intent, ClassificationError> {
        if utterance.trim().is_empty() {
            return Ok(Intent::GeneralTalk);
        }

        let user = format!("User Input: \"{utterance}\"\nResult (Tag Only):");
        let reply = self.model.complete(CLASSIFIER_PROMPT, &user)?;
        let intent = Intent::from_reply(&reply);
        debug!(%intent, reply = reply.trim(), "utterance classified");
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Canned model that records the prompts it receives.
    struct Canned {
        reply: Option<&'static str>,
        calls: Cell<usize>,
        last_user: RefCell<String>,
    }

    impl Canned {
        fn replying(reply: &'static str) -> Self {
            Self {
                reply: Some(reply),
                calls: Cell::new(0),
                last_user: RefCell::new(String::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                calls: Cell::new(0),
                last_user: RefCell::new(String::new()),
            }
        }
    }

    impl Completion for &Canned {
        fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
            assert_eq!(system, CLASSIFIER_PROMPT);
            self.calls.set(self.calls.get() + 1);
            *self.last_user.borrow_mut() = user.to_string();
            self.reply
                .map(str::to_string)
                .ok_or_else(|| LlmError::BadResponse("model offline".into()))
        }
    }

    #[test]
    fn from_reply_matches_tags_loosely() {
        assert_eq!(Intent::from_reply(" [save_spec] "), Intent::SaveSpec);
        assert_eq!(Intent::from_reply("[SEARCH_MEMORY]입니다"), Intent::SearchMemory);
        assert_eq!(Intent::from_reply("\"GENERAL_TALK\""), Intent::GeneralTalk);
        assert_eq!(Intent::from_reply("no idea"), Intent::GeneralTalk);
        assert_eq!(Intent::from_reply("SEARCH_MEMORY or SAVE_SPEC"), Intent::SaveSpec);
    }

    #[test]
    fn classify_routes_model_reply() {
        let model = Canned::replying("[SEARCH_MEMORY]");
        let classifier = IntentClassifier::new(&model);
        assert_eq!(classifier.classify("아까 그 버튼 뭐였지?").unwrap(), Intent::SearchMemory);
        assert_eq!(model.calls.get(), 1);
        assert!(model.last_user.borrow().contains("아까 그 버튼 뭐였지?"));
    }

    #[test]
    fn blank_input_skips_the_model() {
        let model = Canned::replying("[SAVE_SPEC]");
        let classifier = IntentClassifier::new(&model);
        assert_eq!(classifier.classify("   \n").unwrap(), Intent::GeneralTalk);
        assert_eq!(classifier.classify("").unwrap(), Intent::GeneralTalk);
        assert_eq!(model.calls.get(), 0);
    }

    #[test]
    fn model_failure_is_an_error_and_degrades_on_request() {
        let model = Canned::failing();
        let classifier = IntentClassifier::new(&model);
        let result = classifier.classify("remember this");
        assert!(matches!(result, Err(ClassificationError::Model(_))));
        assert_eq!(Intent::or_general_talk(result), Intent::GeneralTalk);
        assert_eq!(Intent::or_general_talk(Ok(Intent::SaveSpec)), Intent::SaveSpec);
    }

    #[test]
    fn intent_serializes_as_tag() {
        assert_eq!(serde_json::to_string(&Intent::SaveSpec).unwrap(), "\"SAVE_SPEC\"");
        let back: Intent = serde_json::from_str("\"SEARCH_MEMORY\"").unwrap();
        assert_eq!(back, Intent::SearchMemory);
        assert_eq!(Intent::GeneralTalk.to_string(), "GENERAL_TALK");
    }

    #[test]
    fn json_schema_lists_every_tag() {
        let schema = Intent::json_schema().to_string();
        for tag in ["SAVE_SPEC", "SEARCH_MEMORY", "GENERAL_TALK"] {
            assert!(schema.contains(tag), "schema missing {tag}");
        }
    }
}
