//! Edit-distance similarity ratios on a 0-100 scale.

use std::collections::BTreeSet;

/// Longest common subsequence length
fn lcs_len(a: &[char], b: &[char]) -> usize
{   if a.is_empty() || b.is_empty()
    {   return 0;
    }
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a
    {   let mut diag = 0;
        for (j, &cb) in b.iter().enumerate()
        {   let above = row[j + 1];
            row[j + 1] = if ca == cb
            {   diag + 1
            } else
            {   above.max(row[j])
            };
            diag = above;
        }
    }
    row[b.len()]
}

fn ratio_chars(a: &[char], b: &[char]) -> f64
{   let total = a.len() + b.len();
    if total == 0
    {   return 100.0;
    }
    200.0 * lcs_len(a, b) as f64 / total as f64
}

/// Normalized indel similarity
pub fn ratio(a: &str, b: &str) -> f64
{   let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio_chars(&a, &b)
}

/// Best `ratio` of the shorter string against any same-length window of
/// the longer one. Windows overhanging either end are included.
pub fn partial_ratio(a: &str, b: &str) -> f64
{   let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty()
    {   return if long.is_empty() { 100.0 } else { 0.0 };
    }

    let n = short.len();
    let mut best: f64 = 0.0;
    for end in 1..(long.len() + n)
    {   let start = end.saturating_sub(n);
        let window = &long[start..end.min(long.len())];
        best = best.max(ratio_chars(&short, window));
        if best >= 100.0
        {   break;
        }
    }
    best
}

/// Ratio over sorted word sets, robust to order and repeats.
pub fn token_set_ratio(a: &str, b: &str) -> f64
{   let set_a: BTreeSet<&str> = a.split_whitespace().collect();
    let set_b: BTreeSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() || set_b.is_empty()
    {   return 0.0;
    }

    let common: Vec<&str> = set_a.intersection(&set_b).copied().collect();
    let only_a: Vec<&str> = set_a.difference(&set_b).copied().collect();
    let only_b: Vec<&str> = set_b.difference(&set_a).copied().collect();
    if !common.is_empty() && (only_a.is_empty() || only_b.is_empty())
    {   return 100.0;
    }

    let sect = common.join(" ");
    let with = |rest: &[&str]| -> String {
      if sect.is_empty()
      {   rest.join(" ")
      } else
      {   format!("{} {}", sect, rest.join(" "))
      }
    };
    let combined_a = with(&only_a);
    let combined_b = with(&only_b);

    let mut best = ratio(&combined_a, &combined_b);
    if !sect.is_empty()
    {   best = best
          .max(ratio(&sect, &combined_a))
          .max(ratio(&sect, &combined_b));
    }
    best
}
