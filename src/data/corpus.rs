use std::path::Path;

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use tracing::info;

use crate::error::{Result, TrainError};

/// A raw labelled example before encoding
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledText {
    pub label: u32,
    pub text: String,
    pub text_pair: Option<String>,
}

/// Reads `label<TAB>text[<TAB>text_pair]` lines. Blank lines and lines
/// starting with `#` are skipped.
pub fn load_tsv(path: &Path) -> Result<Vec<LabeledText>> {
    let content = std::fs::read_to_string(path).map_err(|e| TrainError::io(path, e))?;
    let texts = parse_tsv(&content)
        .map_err(|msg| TrainError::Dataset(format!("{}: {msg}", path.display())))?;
    info!("Loaded {} examples from {}", texts.len(), path.display());
    Ok(texts)
}

fn parse_tsv(content: &str) -> std::result::Result<Vec<LabeledText>, String> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|(i, line)| {
            let mut fields = line.split('\t');
            let label = fields
                .next()
                .and_then(|f| f.trim().parse::<u32>().ok())
                .ok_or_else(|| format!("line {}: label must be a non-negative integer", i + 1))?;
            let text = fields
                .next()
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| format!("line {}: missing text", i + 1))?;
            Ok(LabeledText {
                label,
                text: text.trim().to_string(),
                text_pair: fields.next().map(|t| t.trim().to_string()),
            })
        })
        .collect()
}

const POSITIVE: &[&str] = &["great", "wonderful", "excellent", "loved", "brilliant", "superb", "enjoyable"];
const NEGATIVE: &[&str] = &["terrible", "awful", "boring", "hated", "dull", "poor", "disappointing"];
const FILLER: &[&str] = &[
    "the", "movie", "plot", "acting", "was", "really", "quite", "and", "story", "cast", "film", "ending",
];

/// Deterministic two-class sentiment corpus for smoke runs: label 1 texts
/// contain a positive word, label 0 texts a negative one.
pub fn synthetic_sentiment(n: usize, seed: u64) -> Vec<LabeledText> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let label = (i % 2) as u32;
            let cue = if label == 1 { POSITIVE } else { NEGATIVE };
            let len = rng.gen_range(4..10);
            let mut words: Vec<&str> = (0..len)
                .map(|_| *FILLER.choose(&mut rng).unwrap_or(&"the"))
                .collect();
            let at = rng.gen_range(0..=words.len());
            words.insert(at, *cue.choose(&mut rng).unwrap_or(&cue[0]));
            LabeledText {
                label,
                text: words.join(" "),
                text_pair: None,
            }
        })
        .collect()
}
