//! Quiz item variants. Every constructor enforces its variant's
//! invariant, so a `QuizItem` value is always schema-valid.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::request::QuizType;

/// Invariant broken while constructing a variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemError
{   /// mcq answer is not one of the choices
    AnswerNotInChoices
    {   answer: String
      , choices: Vec<String>
    }
  , /// sata answers that are not among the choices
    AnswersNotInChoices
    {   invalid: Vec<String>
    }
  , /// fitb carries both an answer and keywords
    FitbAnswerWithKeywords
}

impl fmt::Display for ItemError
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   match self
        {   ItemError::AnswerNotInChoices { answer, choices } => {
              write!(f, "answer '{}' is not in choices {:?}", answer, choices)
            }
          , ItemError::AnswersNotInChoices { invalid } => {
              write!(f, "answers not in choices: {:?}", invalid)
            }
          , ItemError::FitbAnswerWithKeywords => {
              write!(f, "fitb item must carry either `answer` or `keywords`, not both")
            }
        }
    }
}

impl std::error::Error for ItemError {}

/// Multiple choice, single answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mcq
{   question: String
  , #[serde(skip_serializing_if = "Option::is_none")]
    explanation: Option<String>
  , choices: Vec<String>
  , #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<String>
}

impl Mcq
{   pub fn new(
      question: String
    , explanation: Option<String>
    , choices: Vec<String>
    , answer: Option<String>
    ) -> Result<Self, ItemError>
    {   if let Some(a) = &answer
        {   if !choices.contains(a)
            {   return Err(ItemError::AnswerNotInChoices
                {   answer: a.clone()
                  , choices
                });
            }
        }
        Ok(Mcq { question, explanation, choices, answer })
    }

    pub fn choices(&self) -> &[String]
    {   &self.choices
    }

    pub fn answer(&self) -> Option<&str>
    {   self.answer.as_deref()
    }
}

/// Select all that apply
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sata
{   question: String
  , #[serde(skip_serializing_if = "Option::is_none")]
    explanation: Option<String>
  , choices: Vec<String>
  , #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<Vec<String>>
}

impl Sata
{   pub fn new(
      question: String
    , explanation: Option<String>
    , choices: Vec<String>
    , answer: Option<Vec<String>>
    ) -> Result<Self, ItemError>
    {   if let Some(answers) = &answer
        {   let invalid: Vec<String> = answers
              .iter()
              .filter(|a| !choices.contains(a))
              .cloned()
              .collect();
            if !invalid.is_empty()
            {   return Err(ItemError::AnswersNotInChoices { invalid });
            }
        }
        Ok(Sata { question, explanation, choices, answer })
    }

    pub fn choices(&self) -> &[String]
    {   &self.choices
    }

    pub fn answer(&self) -> Option<&[String]>
    {   self.answer.as_deref()
    }
}

/// True / false
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrueFalse
{   question: String
  , #[serde(skip_serializing_if = "Option::is_none")]
    explanation: Option<String>
  , #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<bool>
}

impl TrueFalse
{   pub fn new(
      question: String
    , explanation: Option<String>
    , answer: Option<bool>
    ) -> Self
    {   TrueFalse { question, explanation, answer }
    }

    pub fn answer(&self) -> Option<bool>
    {   self.answer
    }
}

/// Fill in the blank. Objective items carry an exact answer,
/// subjective ones carry grading keywords.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FillInBlank
{   question: String
  , #[serde(skip_serializing_if = "Option::is_none")]
    explanation: Option<String>
  , #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<String>
  , #[serde(skip_serializing_if = "Option::is_none")]
    keywords: Option<Vec<String>>
}

impl FillInBlank
{   pub fn objective(
      question: String
    , explanation: Option<String>
    , answer: Option<String>
    ) -> Self
    {   FillInBlank { question, explanation, answer, keywords: None }
    }

    pub fn subjective(
      question: String
    , explanation: Option<String>
    , keywords: Option<Vec<String>>
    ) -> Self
    {   FillInBlank { question, explanation, answer: None, keywords }
    }

    /// Picks the objective or subjective shape from whichever field is set.
    pub fn new(
      question: String
    , explanation: Option<String>
    , answer: Option<String>
    , keywords: Option<Vec<String>>
    ) -> Result<Self, ItemError>
    {   match (answer, keywords)
        {   (Some(_), Some(_)) => Err(ItemError::FitbAnswerWithKeywords)
          , (answer @ Some(_), None) => {
              Ok(FillInBlank::objective(question, explanation, answer))
            }
          , (None, keywords) => {
              Ok(FillInBlank::subjective(question, explanation, keywords))
            }
        }
    }

    pub fn is_subjective(&self) -> bool
    {   self.answer.is_none()
    }

    pub fn answer(&self) -> Option<&str>
    {   self.answer.as_deref()
    }

    pub fn keywords(&self) -> Option<&[String]>
    {   self.keywords.as_deref()
    }
}

/// Free-text essay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Essay
{   question: String
  , #[serde(skip_serializing_if = "Option::is_none")]
    explanation: Option<String>
  , #[serde(skip_serializing_if = "Option::is_none")]
    keywords: Option<Vec<String>>
}

impl Essay
{   pub fn new(
      question: String
    , explanation: Option<String>
    , keywords: Option<Vec<String>>
    ) -> Self
    {   Essay { question, explanation, keywords }
    }

    pub fn keywords(&self) -> Option<&[String]>
    {   self.keywords.as_deref()
    }
}

/// One generated question, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum QuizItem
{   #[serde(rename = "mcq")]
    Mcq(Mcq)
  , #[serde(rename = "sata")]
    Sata(Sata)
  , #[serde(rename = "tf")]
    TrueFalse(TrueFalse)
  , #[serde(rename = "fitb")]
    FillInBlank(FillInBlank)
  , #[serde(rename = "essay")]
    Essay(Essay)
}

impl QuizItem
{   pub fn quiz_type(&self) -> QuizType
    {   match self
        {   QuizItem::Mcq(_) => QuizType::Mcq
          , QuizItem::Sata(_) => QuizType::Sata
          , QuizItem::TrueFalse(_) => QuizType::Tf
          , QuizItem::FillInBlank(_) => QuizType::Fitb
          , QuizItem::Essay(_) => QuizType::Essay
        }
    }

    pub fn question(&self) -> &str
    {   match self
        {   QuizItem::Mcq(q) => &q.question
          , QuizItem::Sata(q) => &q.question
          , QuizItem::TrueFalse(q) => &q.question
          , QuizItem::FillInBlank(q) => &q.question
          , QuizItem::Essay(q) => &q.question
        }
    }

    pub fn explanation(&self) -> Option<&str>
    {   match self
        {   QuizItem::Mcq(q) => q.explanation.as_deref()
          , QuizItem::Sata(q) => q.explanation.as_deref()
          , QuizItem::TrueFalse(q) => q.explanation.as_deref()
          , QuizItem::FillInBlank(q) => q.explanation.as_deref()
          , QuizItem::Essay(q) => q.explanation.as_deref()
        }
    }
}

// Deserializing goes through the validator so stored items keep their invariants.
impl<'de> Deserialize<'de> for QuizItem
{   fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
      D: Deserializer<'de>
    {   let value = serde_json::Value::deserialize(deserializer)?;
        crate::validate::item_from_value(&value).map_err(|problems| {
          let joined: Vec<String>
            = problems.iter().map(|p| p.to_string()).collect();
          serde::de::Error::custom(joined.join("; "))
        })
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    fn s(v: &str) -> String
    {   v.to_string()
    }

    #[test]
    fn mcq_rejects_answer_outside_choices()
    {   let err = Mcq::new(
          s("2+2?"), None, vec![s("3"), s("4")], Some(s("5"))
        ).unwrap_err();
        assert!(matches!(err, ItemError::AnswerNotInChoices { .. }));
        assert!(Mcq::new(s("2+2?"), None, vec![s("4")], None).is_ok());
    }

    #[test]
    fn sata_lists_every_invalid_answer()
    {   let err = Sata::new(
          s("Primes?"),
          None,
          vec![s("2"), s("3"), s("4")],
          Some(vec![s("2"), s("9"), s("15")])
        ).unwrap_err();
        assert_eq!(
          err,
          ItemError::AnswersNotInChoices { invalid: vec![s("9"), s("15")] }
        );
    }

    #[test]
    fn fitb_shape_follows_fields()
    {   let objective = FillInBlank::new(
          s("Capital of France is ___"), None, Some(s("Paris")), None
        ).unwrap();
        assert!(!objective.is_subjective());

        let subjective = FillInBlank::new(
          s("Plants make ___"), None, None, Some(vec![s("glucose")])
        ).unwrap();
        assert!(subjective.is_subjective());

        assert_eq!(
          FillInBlank::new(s("q"), None, Some(s("a")), Some(vec![s("k")])),
          Err(ItemError::FitbAnswerWithKeywords)
        );
    }

    #[test]
    fn serializes_with_type_tag()
    {   let item = QuizItem::TrueFalse(
          TrueFalse::new(s("Sky is blue"), None, Some(true))
        );
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(
          json,
          serde_json::json!({"type": "tf", "question": "Sky is blue", "answer": true})
        );
    }

    #[test]
    fn deserialize_enforces_invariants()
    {   let ok: QuizItem = serde_json::from_str(
          r#"{"type":"mcq","question":"q","choices":["a","b"],"answer":"b"}"#
        ).unwrap();
        assert_eq!(ok.quiz_type(), QuizType::Mcq);

        let bad = serde_json::from_str::<QuizItem>(
          r#"{"type":"mcq","question":"q","choices":["a","b"],"answer":"c"}"#
        );
        assert!(bad.is_err());
    }
}
