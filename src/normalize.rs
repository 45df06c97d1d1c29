//! Raw model text -> JSON payload.
//!
//! Order: drop `<think>` reasoning blocks, unwrap a fenced code block,
//! parse. On failure the repair passes run in order of invasiveness,
//! each on the previous pass's output, stopping at the first text that
//! parses. Finally scalar sata answers become one-element lists.

use std::sync::OnceLock;

use log::{debug, trace};
use regex::Regex;
use serde_json::Value;

use crate::error::NormalizationError;

const REASONING_PATTERN: &str = r"(?s)<think>.*?</think>";
const FENCE_PATTERN: &str = r"(?s)```(?:json)?\s*(.*?)```";
const TRAILING_COMMA_PATTERN: &str = r",\s*([}\]])";

static REASONING: OnceLock<Regex> = OnceLock::new();
static FENCE: OnceLock<Regex> = OnceLock::new();
static TRAILING_COMMA: OnceLock<Regex> = OnceLock::new();

fn pattern(cell: &'static OnceLock<Regex>, src: &str) -> &'static Regex
{   cell.get_or_init(|| Regex::new(src).expect("static pattern compiles"))
}

/// One independent, idempotent text repair.
#[derive(Debug, Clone, Copy)]
pub struct RepairPass
{   pub name: &'static str
  , pub apply: fn(&str) -> String
}

/// Repairs in increasing order of invasiveness.
pub const REPAIR_PASSES: [RepairPass; 2] = [
    RepairPass { name: "trailing_commas", apply: strip_trailing_commas }
  , RepairPass { name: "balance_brackets", apply: balance_brackets }
];

/// Parsed model output
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized
{   pub payload: Value
  , /// Text that was handed to the JSON parser first
    pub cleaned: String
  , /// Last repair pass applied, if the direct parse failed
    pub repaired_by: Option<&'static str>
}

/// Turn raw model output into a JSON payload.
pub fn normalize(raw: &str) -> Result<Normalized, NormalizationError>
{   let without_reasoning = strip_reasoning(raw);
    let cleaned = strip_code_fence(&without_reasoning).to_string();
    trace!("Normalizing {} chars of model output", cleaned.len());

    let (mut payload, repaired_by) = match serde_json::from_str(&cleaned)
    {   Ok(value) => (value, None)
      , Err(first) => {
          debug!("Direct parse failed ({}), trying repairs", first);
          match repair(&cleaned)
          {   Some((value, pass)) => (value, Some(pass))
            , None => {
                return Err(NormalizationError
                {   message: first.to_string()
                  , cleaned
                });
              }
          }
        }
    };

    coerce_sata_answers(&mut payload);
    Ok(Normalized { payload, cleaned, repaired_by })
}

fn repair(text: &str) -> Option<(Value, &'static str)>
{   let mut current = text.to_string();
    for pass in REPAIR_PASSES.iter()
    {   let next = (pass.apply)(&current);
        if next == current
        {   continue;
        }
        current = next;
        if let Ok(value) = serde_json::from_str(&current)
        {   debug!("Repair pass '{}' produced valid JSON", pass.name);
            return Some((value, pass.name));
        }
    }
    None
}

/// Remove every `<think>...</think>` block.
pub fn strip_reasoning(text: &str) -> String
{   pattern(&REASONING, REASONING_PATTERN)
      .replace_all(text, "")
      .into_owned()
}

/// Contents of the first fenced code block, or the whole text.
pub fn strip_code_fence(text: &str) -> &str
{   match pattern(&FENCE, FENCE_PATTERN)
      .captures(text)
      .and_then(|c| c.get(1))
    {   Some(body) => body.as_str().trim()
      , None => text.trim()
    }
}

/// Drop commas that sit right before a closing brace or bracket.
pub fn strip_trailing_commas(text: &str) -> String
{   pattern(&TRAILING_COMMA, TRAILING_COMMA_PATTERN)
      .replace_all(text, "$1")
      .into_owned()
}

/// Append the closers needed for every bracket still open at the end
/// of the text, innermost first. Brackets inside strings are ignored.
pub fn balance_brackets(text: &str) -> String
{   let mut open: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars()
    {   if in_string
        {   match ch
            {   _ if escaped => escaped = false
              , '\\' => escaped = true
              , '"' => in_string = false
              , _ => {}
            }
            continue;
        }
        match ch
        {   '"' => in_string = true
          , '{' => open.push('}')
          , '[' => open.push(']')
          , '}' | ']' => {
              if open.last() == Some(&ch)
              {   open.pop();
              }
            }
          , _ => {}
        }
    }

    let mut repaired = text.to_string();
    repaired.extend(open.iter().rev());
    repaired
}

/// sata items must carry a list answer; wrap a bare string.
pub fn coerce_sata_answers(payload: &mut Value)
{   let quizzes = match payload
      .get_mut("quizzes")
      .and_then(Value::as_array_mut)
    {   Some(list) => list
      , None => return
    };

    for item in quizzes.iter_mut()
    {   let is_sata = item.get("type").and_then(Value::as_str) == Some("sata");
        if !is_sata
        {   continue;
        }
        if let Some(answer) = item.get_mut("answer")
        {   if answer.is_string()
            {   let scalar = answer.take();
                *answer = Value::Array(vec![scalar]);
            }
        }
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use serde_json::json;

    #[test]
    fn trailing_comma_and_scalar_sata_answer()
    {   let raw = r#"{"quizzes":[{"type":"sata","answer":"X"}],}"#;
        let out = normalize(raw).unwrap();
        assert_eq!(out.payload["quizzes"][0]["answer"], json!(["X"]));
        assert_eq!(out.repaired_by, Some("trailing_commas"));
    }

    #[test]
    fn missing_closing_brace_gets_exactly_one()
    {   let raw = r#"{"quizzes":[{"type":"tf","answer":true}]"#;
        assert_eq!(balance_brackets(raw), format!("{}}}", raw));

        let out = normalize(raw).unwrap();
        assert_eq!(out.payload["quizzes"][0]["answer"], json!(true));
        assert_eq!(out.repaired_by, Some("balance_brackets"));
    }

    #[test]
    fn strips_reasoning_and_fences()
    {   let raw = "<think>\nlet me plan {[\n</think>\nHere you go:\n```json\n{\"quizzes\": []}\n```\nbye";
        let out = normalize(raw).unwrap();
        assert_eq!(out.payload, json!({"quizzes": []}));
        assert_eq!(out.cleaned, "{\"quizzes\": []}");
        assert_eq!(out.repaired_by, None);
    }

    #[test]
    fn unfenced_text_is_used_verbatim()
    {   assert_eq!(strip_code_fence("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn brackets_inside_strings_are_not_counted()
    {   let raw = r#"{"q": "use [ and { freely", "list": [1, 2"#;
        assert_eq!(balance_brackets(raw), format!("{}]}}", raw));
    }

    #[test]
    fn passes_are_idempotent()
    {   for pass in REPAIR_PASSES.iter()
        {   let once = (pass.apply)(r#"{"a":[1,2,],"#);
            assert_eq!((pass.apply)(&once), once, "pass {}", pass.name);
        }
    }

    #[test]
    fn garbage_is_a_normalization_error()
    {   let err = normalize("I cannot help with that.").unwrap_err();
        assert_eq!(err.cleaned, "I cannot help with that.");
    }

    #[test]
    fn sata_list_answers_are_left_alone()
    {   let mut payload = json!({"quizzes": [
          {"type": "sata", "answer": ["A", "B"]},
          {"type": "mcq", "answer": "A"}
        ]});
        coerce_sata_answers(&mut payload);
        assert_eq!(payload["quizzes"][0]["answer"], json!(["A", "B"]));
        assert_eq!(payload["quizzes"][1]["answer"], json!("A"));
    }
}
