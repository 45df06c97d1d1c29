//! Schema validation: loosely typed JSON payload -> quiz items.
//!
//! Every item is checked and every problem is reported, so a failed
//! generation carries the full picture rather than the first error.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::quiz::{Essay, FillInBlank, ItemError, Mcq, QuizItem, Sata, TrueFalse};

/// What is wrong with a payload or one of its items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Problem
{   /// Top level is not an object with a `quizzes` list
    MissingQuizzes
  , /// Item is not a JSON object
    NotAnObject
  , /// Required field absent or null
    MissingField(String)
  , /// Field present with the wrong JSON type
    WrongType
    {   field: String
      , expected: String
    }
  , /// Discriminant outside mcq/sata/tf/fitb/essay
    UnknownType(String)
  , /// Variant invariant broken (answer vs choices, fitb shape)
    Invariant(String)
}

impl fmt::Display for Problem
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   match self
        {   Problem::MissingQuizzes => {
              write!(f, "payload must be an object with a `quizzes` list")
            }
          , Problem::NotAnObject => write!(f, "item is not an object")
          , Problem::MissingField(field) => {
              write!(f, "missing field `{}`", field)
            }
          , Problem::WrongType { field, expected } => {
              write!(f, "field `{}` must be {}", field, expected)
            }
          , Problem::UnknownType(tag) => {
              write!(f, "unknown quiz type '{}'", tag)
            }
          , Problem::Invariant(msg) => write!(f, "{}", msg)
        }
    }
}

impl From<ItemError> for Problem
{   fn from(e: ItemError) -> Self
    {   Problem::Invariant(e.to_string())
    }
}

/// A problem located in the payload. `index` names the offending item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation
{   pub index: Option<usize>
  , pub problem: Problem
}

impl fmt::Display for Violation
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   match self.index
        {   Some(i) => write!(f, "quizzes[{}]: {}", i, self.problem)
          , None => write!(f, "{}", self.problem)
        }
    }
}

/// Validate a normalized `{"quizzes": [...]}` payload.
pub fn validate(payload: &Value) -> Result<Vec<QuizItem>, Vec<Violation>>
{   let quizzes = match payload.get("quizzes").and_then(Value::as_array)
    {   Some(list) => list
      , None => {
          return Err(vec![Violation
          {   index: None
            , problem: Problem::MissingQuizzes
          }]);
        }
    };

    let mut items = Vec::with_capacity(quizzes.len());
    let mut violations = Vec::new();
    for (index, raw) in quizzes.iter().enumerate()
    {   match item_from_value(raw)
        {   Ok(item) => items.push(item)
          , Err(problems) => {
              violations.extend(problems.into_iter().map(|problem| {
                Violation { index: Some(index), problem }
              }));
            }
        }
    }

    if violations.is_empty()
    {   Ok(items)
    } else
    {   Err(violations)
    }
}

/// Build one item, collecting every shape problem before checking invariants.
pub fn item_from_value(raw: &Value) -> Result<QuizItem, Vec<Problem>>
{   let obj = match raw.as_object()
    {   Some(obj) => obj
      , None => return Err(vec![Problem::NotAnObject])
    };

    let mut problems = Vec::new();
    let tag = match obj.get("type")
    {   Some(Value::String(tag)) => tag.as_str()
      , Some(Value::Null) | None => {
          return Err(vec![Problem::MissingField("type".to_string())]);
        }
      , Some(_) => {
          return Err(vec![wrong_type("type", "a string")]);
        }
    };

    let question = required_string(obj, "question", &mut problems);
    let explanation = optional_string(obj, "explanation", &mut problems);

    match tag
    {   "mcq" => {
          let choices = required_list(obj, "choices", &mut problems);
          let answer = optional_string(obj, "answer", &mut problems);
          finish(problems, question, choices, |q, choices| {
            Mcq::new(q, explanation, choices, answer).map(QuizItem::Mcq)
          })
        }
      , "sata" => {
          let choices = required_list(obj, "choices", &mut problems);
          let answer = optional_list(obj, "answer", &mut problems);
          finish(problems, question, choices, |q, choices| {
            Sata::new(q, explanation, choices, answer).map(QuizItem::Sata)
          })
        }
      , "tf" => {
          let answer = optional_bool(obj, "answer", &mut problems);
          finish(problems, question, Some(()), |q, _| {
            Ok(QuizItem::TrueFalse(TrueFalse::new(q, explanation, answer)))
          })
        }
      , "fitb" => {
          let answer = optional_string(obj, "answer", &mut problems);
          let keywords = optional_list(obj, "keywords", &mut problems);
          finish(problems, question, Some(()), |q, _| {
            FillInBlank::new(q, explanation, answer, keywords)
              .map(QuizItem::FillInBlank)
          })
        }
      , "essay" => {
          let keywords = optional_list(obj, "keywords", &mut problems);
          finish(problems, question, Some(()), |q, _| {
            Ok(QuizItem::Essay(Essay::new(q, explanation, keywords)))
          })
        }
      , other => Err(vec![Problem::UnknownType(other.to_string())])
    }
}

fn finish<T, F>(
  problems: Vec<Problem>
, question: Option<String>
, extra: Option<T>
, build: F
) -> Result<QuizItem, Vec<Problem>>
where
  F: FnOnce(String, T) -> Result<QuizItem, ItemError>
{   match (question, extra)
    {   (Some(q), Some(extra)) if problems.is_empty() => {
          build(q, extra).map_err(|e| vec![Problem::from(e)])
        }
      , _ => Err(problems)
    }
}

fn wrong_type(field: &str, expected: &str) -> Problem
{   Problem::WrongType
    {   field: field.to_string()
      , expected: expected.to_string()
    }
}

fn required_string(
  obj: &Map<String, Value>
, field: &str
, problems: &mut Vec<Problem>
) -> Option<String>
{   match obj.get(field)
    {   Some(Value::String(s)) => Some(s.clone())
      , Some(Value::Null) | None => {
          problems.push(Problem::MissingField(field.to_string()));
          None
        }
      , Some(_) => {
          problems.push(wrong_type(field, "a string"));
          None
        }
    }
}

fn optional_string(
  obj: &Map<String, Value>
, field: &str
, problems: &mut Vec<Problem>
) -> Option<String>
{   match obj.get(field)
    {   Some(Value::String(s)) => Some(s.clone())
      , Some(Value::Null) | None => None
      , Some(_) => {
          problems.push(wrong_type(field, "a string"));
          None
        }
    }
}

fn optional_bool(
  obj: &Map<String, Value>
, field: &str
, problems: &mut Vec<Problem>
) -> Option<bool>
{   match obj.get(field)
    {   Some(Value::Bool(b)) => Some(*b)
      , Some(Value::Null) | None => None
      , Some(_) => {
          problems.push(wrong_type(field, "a boolean"));
          None
        }
    }
}

fn string_list(value: &Value) -> Option<Vec<String>>
{   value.as_array()?
      .iter()
      .map(|v| v.as_str().map(str::to_string))
      .collect()
}

fn required_list(
  obj: &Map<String, Value>
, field: &str
, problems: &mut Vec<Problem>
) -> Option<Vec<String>>
{   match obj.get(field)
    {   Some(Value::Null) | None => {
          problems.push(Problem::MissingField(field.to_string()));
          None
        }
      , Some(value) => {
          let list = string_list(value);
          if list.is_none()
          {   problems.push(wrong_type(field, "a list of strings"));
          }
          list
        }
    }
}

fn optional_list(
  obj: &Map<String, Value>
, field: &str
, problems: &mut Vec<Problem>
) -> Option<Vec<String>>
{   match obj.get(field)
    {   Some(Value::Null) | None => None
      , Some(value) => {
          let list = string_list(value);
          if list.is_none()
          {   problems.push(wrong_type(field, "a list of strings"));
          }
          list
        }
    }
}
