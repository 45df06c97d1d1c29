//! Flesch reading ease.
//!
//! Sentence fragments of two words or fewer are not counted as
//! sentences; text without words has no penalty terms and scores 206.835.

fn is_vowel(c: char) -> bool
{   matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y')
}

/// Vowel-group syllable estimate, at least one per word.
pub fn syllables(word: &str) -> usize
{   let letters: Vec<char> = word
      .chars()
      .filter(|c| c.is_alphabetic())
      .flat_map(char::to_lowercase)
      .collect();
    if letters.is_empty()
    {   return 0;
    }

    let mut count = 0;
    let mut in_group = false;
    for &c in &letters
    {   let vowel = is_vowel(c);
        if vowel && !in_group
        {   count += 1;
        }
        in_group = vowel;
    }
    // silent trailing e, but not "-le" as in "table"
    let n = letters.len();
    if n > 2 && letters[n - 1] == 'e' && letters[n - 2] != 'l'
      && !is_vowel(letters[n - 2]) && count > 1
    {   count -= 1;
    }
    count.max(1)
}

const MAX_EASE: f64 = 206.835;

fn words(text: &str) -> Vec<&str>
{   text.split_whitespace()
      .filter(|w| w.chars().any(char::is_alphanumeric))
      .collect()
}

fn sentence_count(text: &str) -> usize
{   text.split(['.', '!', '?'])
      .filter(|s| words(s).len() > 2)
      .count()
      .max(1)
}

/// 206.835 - 1.015 (words / sentences) - 84.6 (syllables / words)
pub fn flesch_reading_ease(text: &str) -> f64
{   let words = words(text);
    if words.is_empty()
    {   return MAX_EASE;
    }
    let word_count = words.len() as f64;
    let syllable_count: usize = words.iter().map(|w| syllables(w)).sum();
    let sentences = sentence_count(text) as f64;
    MAX_EASE
      - 1.015 * (word_count / sentences)
      - 84.6 * (syllable_count as f64 / word_count)
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn syllable_heuristic()
    {   assert_eq!(syllables("cat"), 1);
        assert_eq!(syllables("water"), 2);
        assert_eq!(syllables("make"), 1);
        assert_eq!(syllables("table"), 2);
        assert_eq!(syllables("photosynthesis"), 5);
        assert_eq!(syllables("42"), 0);
    }

    #[test]
    fn short_plain_sentences_read_easily()
    {   let ease = flesch_reading_ease("The cat sat. The dog ran.");
        assert!(ease >= 90.0, "ease was {}", ease);
    }

    #[test]
    fn dense_text_reads_hard()
    {   let ease = flesch_reading_ease(
          "Photosynthetic organisms convert electromagnetic radiation \
           into biochemically utilizable chemical energy through \
           complicated enzymatic transformations"
        );
        assert!(ease < 30.0, "ease was {}", ease);
    }

    #[test]
    fn wordless_text_has_no_penalty()
    {   assert_eq!(flesch_reading_ease(""), MAX_EASE);
        assert_eq!(flesch_reading_ease(" ... "), MAX_EASE);
    }

    #[test]
    fn short_fragments_are_not_sentences()
    {   assert_eq!(sentence_count("Yes. No way. The cell divides quickly."), 1);
        assert_eq!(sentence_count("The cat sat. The dog ran."), 2);
        assert_eq!(sentence_count("Ok."), 1);
        // 8 words and 12 syllables over one counted sentence, not three
        let ease = flesch_reading_ease("Yes. No way. The cell divides quickly today.");
        let expected = MAX_EASE - 1.015 * 8.0 - 84.6 * (12.0 / 8.0);
        assert!((ease - expected).abs() < 1e-9, "ease was {}", ease);
    }
}
