//! Subjective answer scoring.
//!
//! Four sub-scores on a 0-10 scale: keyword coverage, similarity to the
//! reference explanation, structure and readability. Fill-in-the-blank
//! answers are graded on the first two only.

use std::time::{Duration, Instant};

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EvaluationError;
use crate::quiz::QuizItem;

pub mod fuzzy;
pub mod readability;
pub mod text;

/// Token-to-keyword partial match needed to count a keyword as covered
const KEYWORD_MATCH_THRESHOLD: f64 = 80.0;
const MAX_SCORE: f64 = 10.0;

/// Question kinds that take free-text answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectiveKind
{   Essay
  , Fitb
}

impl SubjectiveKind
{   pub fn parse(tag: &str) -> Result<Self, EvaluationError>
    {   match tag
        {   "essay" => Ok(SubjectiveKind::Essay)
          , "fitb" => Ok(SubjectiveKind::Fitb)
          , other => Err(EvaluationError::UnsupportedType(other.to_string()))
        }
    }
}

/// A question ready for grading; text is already cleaned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectiveQuestion
{   kind: SubjectiveKind
  , question: String
  , explanation: Option<String>
  , keywords: Vec<String>
}

impl SubjectiveQuestion
{   pub fn new(
      kind: SubjectiveKind
    , question: &str
    , explanation: Option<&str>
    , keywords: &[String]
    ) -> Result<Self, EvaluationError>
    {   let question = text::clean(question);
        if question.is_empty()
        {   return Err(EvaluationError::MissingQuestion);
        }
        let keywords = text::clean_keywords(keywords);
        if kind == SubjectiveKind::Fitb && keywords.is_empty()
        {   return Err(EvaluationError::MissingKeywords);
        }
        let explanation = explanation
          .map(text::clean)
          .filter(|e| !e.is_empty());
        Ok(SubjectiveQuestion { kind, question, explanation, keywords })
    }

    /// Grade a stored quiz item. Only essay and fitb items qualify.
    pub fn from_item(item: &QuizItem) -> Result<Self, EvaluationError>
    {   let (kind, keywords) = match item
        {   QuizItem::Essay(e) => (SubjectiveKind::Essay, e.keywords())
          , QuizItem::FillInBlank(f) => (SubjectiveKind::Fitb, f.keywords())
          , other => {
              return Err(EvaluationError::UnsupportedType(
                other.quiz_type().as_str().to_string()
              ));
            }
        };
        SubjectiveQuestion::new(
          kind,
          item.question(),
          item.explanation(),
          keywords.unwrap_or_default()
        )
    }

    /// Build from loosely typed JSON such as a stored question record.
    pub fn from_value(value: &Value) -> Result<Self, EvaluationError>
    {   let kind = match value.get("type")
        {   Some(Value::String(tag)) => SubjectiveKind::parse(tag)?
          , Some(other) => {
              return Err(EvaluationError::UnsupportedType(other.to_string()));
            }
          , None => {
              return Err(EvaluationError::UnsupportedType(String::new()));
            }
        };
        let question = optional_str(value, "question")?
          .ok_or(EvaluationError::MissingQuestion)?;
        let explanation = optional_str(value, "explanation")?;
        let keywords = match value.get("keywords")
        {   None | Some(Value::Null) => vec![]
          , Some(Value::Array(list)) => list.iter()
              .map(|k| k.as_str().map(str::to_string))
              .collect::<Option<Vec<_>>>()
              .ok_or(EvaluationError::KeywordsNotAList)?
          , Some(_) => return Err(EvaluationError::KeywordsNotAList)
        };
        SubjectiveQuestion::new(kind, question, explanation, &keywords)
    }

    pub fn kind(&self) -> SubjectiveKind
    {   self.kind
    }

    pub fn question(&self) -> &str
    {   &self.question
    }

    pub fn explanation(&self) -> Option<&str>
    {   self.explanation.as_deref()
    }

    pub fn keywords(&self) -> &[String]
    {   &self.keywords
    }
}

fn optional_str<'a>(
  value: &'a Value
, field: &str
) -> Result<Option<&'a str>, EvaluationError>
{   match value.get(field)
    {   None | Some(Value::Null) => Ok(None)
      , Some(Value::String(s)) => Ok(Some(s))
      , Some(_) => Err(EvaluationError::NotAString(field.to_string()))
    }
}

/// Scores for one answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult
{   pub keyword_score: f64
  , pub similarity_score: f64
  , pub structure_score: f64
  , pub readability_score: f64
  , pub final_score: f64
  , /// Whitespace-separated words in the answer as submitted
    pub word_count: usize
  , /// Characters in the answer with whitespace collapsed, case kept
    pub character_count: usize
  , pub elapsed: Duration
}

/// Score `answer` against `question`.
pub fn evaluate(
  question: &SubjectiveQuestion
, answer: &str
) -> Result<EvaluationResult, EvaluationError>
{   let started = Instant::now();
    let cleaned = text::clean(answer);

    let keyword = clamp(keyword_score(question.keywords(), &cleaned));
    let similarity = clamp(similarity_score(question.explanation(), &cleaned));
    let (structure, readability) = match question.kind()
    {   SubjectiveKind::Fitb => (MAX_SCORE, MAX_SCORE)
      , SubjectiveKind::Essay => (
          clamp(structure_score(answer.trim()))
        , clamp(readability_score(&cleaned))
        )
    };
    let final_score = composite(
      question.kind(), keyword, similarity, structure, readability
    );

    let result = EvaluationResult
    {   keyword_score: keyword
      , similarity_score: similarity
      , structure_score: structure
      , readability_score: readability
      , final_score
      , word_count: answer.split_whitespace().count()
      , character_count: text::collapse_whitespace(answer).chars().count()
      , elapsed: started.elapsed()
    };
    debug!(
      "Evaluated {:?} answer: final={} (k={} s={} st={} r={})",
      question.kind(), result.final_score, keyword, similarity,
      structure, readability
    );
    Ok(result)
}

/// `evaluate` over loosely typed input; the answer must be a string,
/// null counts as empty.
pub fn evaluate_json(
  question: &Value
, answer: &Value
) -> Result<EvaluationResult, EvaluationError>
{   let question = SubjectiveQuestion::from_value(question)?;
    let answer = match answer
    {   Value::String(s) => s.as_str()
      , Value::Null => ""
      , _ => return Err(EvaluationError::NotAString("answer".to_string()))
    };
    evaluate(&question, answer)
}

/// Share of keywords matched by at least one answer token, out of 10.
pub fn keyword_score(keywords: &[String], answer: &str) -> f64
{   if keywords.is_empty()
    {   return 0.0;
    }
    let tokens = text::content_tokens(answer);
    let matched = keywords.iter()
      .filter(|kw| {
        tokens.iter().any(|tok| {
          fuzzy::partial_ratio(kw, tok) > KEYWORD_MATCH_THRESHOLD
        })
      })
      .count();
    round2(matched as f64 / keywords.len() as f64 * MAX_SCORE)
}

/// Token-set similarity to the reference explanation, out of 10.
pub fn similarity_score(explanation: Option<&str>, answer: &str) -> f64
{   match explanation
    {   Some(expl) if !expl.is_empty() => {
          let ratio = fuzzy::token_set_ratio(&text::clean(expl), &text::clean(answer));
          round2(ratio / 100.0 * MAX_SCORE)
        }
      , _ => 0.0
    }
}

/// Sentence and paragraph heuristic. Expects newlines to be intact.
pub fn structure_score(answer: &str) -> f64
{   if answer.is_empty()
    {   return 0.0;
    }
    let sentences = answer.chars()
      .filter(|c| matches!(c, '.' | '!' | '?'))
      .count();
    let paragraphs = answer.matches('\n').count() + 1;
    match (sentences, paragraphs)
    {   (s, p) if s >= 5 && p >= 2 => 10.0
      , (s, _) if s >= 4 => 8.0
      , (s, _) if s >= 2 => 6.0
      , _ => 4.0
    }
}

/// Reading ease bucketed onto the 0-10 scale
pub fn readability_score(answer: &str) -> f64
{   let ease = readability::flesch_reading_ease(answer);
    if ease >= 90.0
    {   10.0
    } else if ease >= 60.0
    {   8.0
    } else if ease >= 30.0
    {   6.0
    } else
    {   4.0
    }
}

/// Weighted keyword/similarity for fitb, plain mean for essays.
pub fn composite(
  kind: SubjectiveKind
, keyword: f64
, similarity: f64
, structure: f64
, readability: f64
) -> f64
{   let raw = match kind
    {   SubjectiveKind::Fitb => 0.7 * keyword + 0.3 * similarity
      , SubjectiveKind::Essay => {
          (keyword + similarity + structure + readability) / 4.0
        }
    };
    clamp(round2(raw))
}

fn round2(x: f64) -> f64
{   (x * 100.0).round() / 100.0
}

fn clamp(x: f64) -> f64
{   x.clamp(0.0, MAX_SCORE)
}

#[cfg(test)]
mod tests
{   use super::*;
    use serde_json::json;

    fn essay(explanation: Option<&str>, keywords: &[&str]) -> SubjectiveQuestion
    {   let keywords: Vec<String> = keywords.iter().map(|k| k.to_string()).collect();
        SubjectiveQuestion::new(
          SubjectiveKind::Essay,
          "Describe the mitochondria.",
          explanation,
          &keywords
        ).unwrap()
    }

    #[test]
    fn one_of_two_keywords_scores_half()
    {   let keywords = vec!["mitochondria".to_string(), "energy".to_string()];
        assert_eq!(
          keyword_score(&keywords, "The powerhouse generates energy in cells"),
          5.0
        );
    }

    #[test]
    fn fitb_composite_weights_keywords()
    {   assert_eq!(composite(SubjectiveKind::Fitb, 8.0, 5.0, 10.0, 10.0), 7.1);
        assert_eq!(composite(SubjectiveKind::Essay, 8.0, 6.0, 10.0, 4.0), 7.0);
    }

    #[test]
    fn empty_answer_scores_nothing_structural()
    {   let q = essay(Some("Mitochondria make ATP."), &["atp"]);
        let result = evaluate(&q, "").unwrap();
        assert_eq!(result.word_count, 0);
        assert_eq!(result.character_count, 0);
        assert_eq!(result.structure_score, 0.0);
        assert_eq!(result.keyword_score, 0.0);
        assert_eq!(result.similarity_score, 0.0);
        assert_eq!(result.readability_score, 10.0);
        assert_eq!(result.final_score, 2.5);
    }

    #[test]
    fn character_count_keeps_original_case()
    {   let q = essay(None, &[]);
        // lower-casing 'İ' yields two chars
        let result = evaluate(&q, "  İzmir   is\nwarm ").unwrap();
        assert_eq!(result.character_count, "İzmir is warm".chars().count());
        assert_eq!(result.character_count, 13);
        assert_eq!(result.word_count, 3);
    }

    #[test]
    fn six_sentences_on_three_lines_is_well_structured()
    {   let answer = "One. Two.\nThree! Four?\nFive. Six.";
        assert_eq!(structure_score(answer), 10.0);
        assert_eq!(structure_score("One. Two. Three. Four."), 8.0);
        assert_eq!(structure_score("One. Two."), 6.0);
        assert_eq!(structure_score("no punctuation"), 4.0);
    }

    #[test]
    fn essay_structure_sees_paragraphs_in_the_raw_answer()
    {   let q = essay(None, &[]);
        let result = evaluate(
          &q,
          "  Cells need energy. Mitochondria help.\n\nThey make ATP. It powers work. Life goes on.  "
        ).unwrap();
        assert_eq!(result.structure_score, 10.0);
        assert_eq!(result.word_count, 14);
    }

    #[test]
    fn fitb_fixes_structure_and_readability()
    {   let q = SubjectiveQuestion::new(
          SubjectiveKind::Fitb,
          "The ____ is the powerhouse of the cell.",
          Some("Mitochondria produce energy"),
          &["Mitochondria".to_string()]
        ).unwrap();
        let result = evaluate(&q, "mitochondria").unwrap();
        assert_eq!(result.structure_score, 10.0);
        assert_eq!(result.readability_score, 10.0);
        assert_eq!(result.keyword_score, 10.0);
        assert!(result.final_score >= 7.0);
        assert!(result.final_score <= 10.0);
    }

    #[test]
    fn identical_explanation_is_fully_similar()
    {   assert_eq!(
          similarity_score(Some("plants make sugar"), "Plants  make SUGAR"),
          10.0
        );
        assert_eq!(similarity_score(None, "anything"), 0.0);
    }

    #[test]
    fn input_checks()
    {   assert_eq!(
          SubjectiveQuestion::new(SubjectiveKind::Fitb, "Q?", None, &[]),
          Err(EvaluationError::MissingKeywords)
        );
        assert_eq!(
          SubjectiveQuestion::new(SubjectiveKind::Essay, "   ", None, &[]),
          Err(EvaluationError::MissingQuestion)
        );
        assert_eq!(
          evaluate_json(&json!({"type": "mcq", "question": "Q?"}), &json!("a")),
          Err(EvaluationError::UnsupportedType("mcq".to_string()))
        );
        assert_eq!(
          evaluate_json(&json!({"type": "essay", "question": 3}), &json!("a")),
          Err(EvaluationError::NotAString("question".to_string()))
        );
        assert_eq!(
          evaluate_json(&json!({"type": "essay", "question": "Q?"}), &json!(42)),
          Err(EvaluationError::NotAString("answer".to_string()))
        );
        assert_eq!(
          evaluate_json(
            &json!({"type": "fitb", "question": "Q?", "keywords": "atp"}),
            &json!("a")
          ),
          Err(EvaluationError::KeywordsNotAList)
        );
    }

    #[test]
    fn stored_items_can_be_graded()
    {   let item: QuizItem = serde_json::from_value(json!({
          "type": "essay",
          "question": "Why do leaves look green?",
          "keywords": ["chlorophyll"]
        })).unwrap();
        let q = SubjectiveQuestion::from_item(&item).unwrap();
        assert_eq!(q.keywords(), ["chlorophyll".to_string()]);

        let tf: QuizItem = serde_json::from_value(json!({
          "type": "tf", "question": "Sky is blue.", "answer": true
        })).unwrap();
        assert_eq!(
          SubjectiveQuestion::from_item(&tf),
          Err(EvaluationError::UnsupportedType("tf".to_string()))
        );
    }
}
