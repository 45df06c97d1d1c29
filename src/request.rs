//! Generation request/result types and the prompt-building seam

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::quiz::QuizItem;

/// Quiz item formats a caller may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizType
{   Mcq
  , Sata
  , Tf
  , Fitb
  , Essay
}

impl QuizType
{   pub fn as_str(&self) -> &'static str
    {   match self
        {   QuizType::Mcq => "mcq"
          , QuizType::Sata => "sata"
          , QuizType::Tf => "tf"
          , QuizType::Fitb => "fitb"
          , QuizType::Essay => "essay"
        }
    }

    pub fn parse(tag: &str) -> Option<QuizType>
    {   match tag
        {   "mcq" => Some(QuizType::Mcq)
          , "sata" => Some(QuizType::Sata)
          , "tf" => Some(QuizType::Tf)
          , "fitb" => Some(QuizType::Fitb)
          , "essay" => Some(QuizType::Essay)
          , _ => None
        }
    }
}

/// What an uploaded source document is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileIntent
{   /// Notes to generate new questions from
    StudyMaterial
  , /// A quiz to clean up and convert, not extend
    ExistingQuiz
}

/// Caller input for one generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest
{   pub topic: Option<String>
  , #[serde(default, alias = "quiz_type")]
    pub quiz_types: Option<Vec<QuizType>>
  , /// Advisory target; recorded, never enforced on the result
    pub num_questions: Option<usize>
  , pub options_per_question: Option<usize>
  , pub answer_required: bool
  , pub explanation_required: bool
  , pub source_material: Option<String>
  , pub file_intent: Option<FileIntent>
  , #[serde(default, alias = "user_additional_instructions")]
    pub instructions: Option<String>
  , /// Correlation id carried through every log line
    #[serde(default)]
    pub request_id: String
}

impl GenerationRequest
{   pub fn new(request_id: impl Into<String>) -> Self
    {   GenerationRequest
        {   topic: None
          , quiz_types: None
          , num_questions: None
          , options_per_question: None
          , answer_required: true
          , explanation_required: true
          , source_material: None
          , file_intent: None
          , instructions: None
          , request_id: request_id.into()
        }
    }
}

/// Rendered prompt: fixed system instructions plus the per-request task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPair
{   pub system: String
  , pub task: String
}

/// Template collaborator. Must embed the output schema description and
/// be deterministic for identical input.
pub trait PromptBuilder: Send + Sync
{   fn build(&self, request: &GenerationRequest) -> PromptPair;
}

impl<F> PromptBuilder for F
where
  F: Fn(&GenerationRequest) -> PromptPair + Send + Sync
{   fn build(&self, request: &GenerationRequest) -> PromptPair
    {   self(request)
    }
}

/// Validated output of a successful generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult
{   /// Backend that produced the accepted output
    pub backend_used: String
  , /// Wall time of the successful dispatch
    pub elapsed: Duration
  , /// 1-based regeneration attempt that succeeded
    pub attempt_number: usize
  , /// Rotations this call triggered or observed
    pub rotation_count: usize
  , pub token_usage: Option<serde_json::Map<String, serde_json::Value>>
  , pub items: Vec<QuizItem>
}

impl GenerationResult
{   pub fn question_count(&self) -> usize
    {   self.items.len()
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn request_accepts_legacy_field_names()
    {   let req: GenerationRequest = serde_json::from_str(r#"{
          "topic": "Photosynthesis",
          "quiz_type": ["mcq", "tf"],
          "num_questions": 5,
          "answer_required": true,
          "explanation_required": false,
          "file_intent": "existing_quiz",
          "user_additional_instructions": "Focus on light reactions"
        }"#).unwrap();
        assert_eq!(req.quiz_types, Some(vec![QuizType::Mcq, QuizType::Tf]));
        assert_eq!(req.file_intent, Some(FileIntent::ExistingQuiz));
        assert_eq!(req.instructions.as_deref(), Some("Focus on light reactions"));
        assert!(req.request_id.is_empty());
    }

    #[test]
    fn closures_are_prompt_builders()
    {   let builder = |r: &GenerationRequest| PromptPair
        {   system: "schema".to_string()
          , task: r.topic.clone().unwrap_or_default()
        };
        let mut req = GenerationRequest::new("r1");
        req.topic = Some("Cells".to_string());
        assert_eq!(builder.build(&req).task, "Cells");
    }
}
