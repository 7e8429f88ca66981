//! News sentiment scoring
//!
//! A small valence lexicon tuned for market headlines. Each article gets a
//! compound score in [-1, 1]; a set of articles is summarized with a
//! recency-weighted mean.

use serde::{Deserialize, Serialize};

use crate::market::NewsArticle;

/// Compound score at or beyond which an article is positive/negative
pub const ARTICLE_THRESHOLD: f64 = 0.05;
/// Weighted mean at or beyond which a set of articles is positive/negative
pub const OVERALL_THRESHOLD: f64 = 0.1;

// Normalization constant for the compound score
const ALPHA: f64 = 15.0;
// Valence multiplier applied after a negation
const NEGATION_SCALAR: f64 = -0.74;
const BOOST: f64 = 0.293;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    fn from_score(score: f64, threshold: f64) -> Self {
        if score >= threshold {
            SentimentLabel::Positive
        } else if score <= -threshold {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SentimentLabel::Positive => write!(f, "positive"),
            SentimentLabel::Negative => write!(f, "negative"),
            SentimentLabel::Neutral => write!(f, "neutral"),
        }
    }
}

/// Sentiment of a single text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    pub label: SentimentLabel,
    /// Normalized overall valence, -1.0 to 1.0
    pub compound: f64,
    /// Share of positive valence
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
}

/// An article with its sentiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredArticle {
    #[serde(flatten)]
    pub article: NewsArticle,
    pub sentiment: SentimentScore,
}

/// Sentiment across a set of articles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub label: SentimentLabel,
    /// Recency-weighted mean compound score
    pub score: f64,
    pub positive_count: usize,
    pub negative_count: usize,
    pub neutral_count: usize,
    /// Share of articles carrying the most common label, in percent
    pub confidence: f64,
}

/// Valence of a lowercase word, roughly -4 to 4
fn valence(word: &str) -> Option<f64> {
    let v = match word {
        "surge" | "surges" | "surged" | "soar" | "soars" | "soared" | "skyrocket" => 2.6,
        "record" | "rally" | "rallies" | "rallied" | "boom" | "outperform" | "outperforms" => 2.2,
        "profit" | "profits" | "profitable" | "beat" | "beats" | "upgrade" | "upgraded" => 2.0,
        "gain" | "gains" | "gained" | "growth" | "grow" | "grows" | "strong" | "stronger" => 1.8,
        "rise" | "rises" | "rose" | "jump" | "jumps" | "jumped" | "climb" | "climbs" => 1.6,
        "bullish" | "optimistic" | "robust" | "win" | "wins" | "won" | "positive" => 1.9,
        "up" | "higher" | "improve" | "improved" | "improves" | "recovery" | "recover" => 1.2,
        "dividend" | "buy" | "expansion" | "approval" | "approved" | "deal" => 1.0,
        "crash" | "crashes" | "crashed" | "plunge" | "plunges" | "plunged" | "collapse" => -2.8,
        "fraud" | "scam" | "default" | "defaults" | "bankruptcy" | "bankrupt" => -3.0,
        "loss" | "losses" | "miss" | "misses" | "missed" | "downgrade" | "downgraded" => -2.0,
        "fall" | "falls" | "fell" | "drop" | "drops" | "dropped" | "decline" | "declines" => -1.7,
        "slump" | "slumps" | "tumble" | "tumbles" | "tumbled" | "sink" | "sinks" | "sank" => -2.2,
        "weak" | "weaker" | "bearish" | "pessimistic" | "concern" | "concerns" | "fear" => -1.8,
        "down" | "lower" | "slow" | "slowdown" | "cut" | "cuts" | "risk" | "risks" => -1.1,
        "investigation" | "penalty" | "fine" | "lawsuit" | "selloff" | "sell-off" | "volatile" => -1.5,
        "negative" | "warning" | "warns" | "layoffs" | "debt" | "inflation" => -1.4,
        _ => return None,
    };
    Some(v)
}

fn is_negation(word: &str) -> bool {
    matches!(
        word,
        "not" | "no" | "never" | "without" | "isn't" | "doesn't" | "don't" | "didn't"
            | "won't" | "wasn't" | "aren't" | "cannot" | "can't" | "fails" | "failed"
    )
}

fn is_booster(word: &str) -> bool {
    matches!(
        word,
        "very" | "sharply" | "strongly" | "significantly" | "extremely" | "hugely" | "massively"
    )
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .map(|t| t.trim_matches(|c| c == '\'' || c == '-').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Score a piece of text.
pub fn score_text(text: &str) -> SentimentScore {
    let tokens = tokenize(text);
    let mut sum = 0.0;
    let mut pos = 0.0;
    let mut neg = 0.0;
    let mut neutral = 0usize;

    for (i, token) in tokens.iter().enumerate() {
        let Some(mut v) = valence(token) else {
            if !is_negation(token) && !is_booster(token) {
                neutral += 1;
            }
            continue;
        };

        if i > 0 && is_booster(&tokens[i - 1]) {
            v += BOOST * v.signum();
        }
        let window = &tokens[i.saturating_sub(3)..i];
        if window.iter().any(|w| is_negation(w)) {
            v *= NEGATION_SCALAR;
        }

        sum += v;
        if v > 0.0 {
            pos += v + 1.0;
        } else {
            neg += v.abs() + 1.0;
        }
    }

    let compound = if sum == 0.0 {
        0.0
    } else {
        sum / (sum * sum + ALPHA).sqrt()
    };
    let total = pos + neg + neutral as f64;
    let share = |x: f64| if total > 0.0 { round3(x / total) } else { 0.0 };

    SentimentScore {
        label: SentimentLabel::from_score(compound, ARTICLE_THRESHOLD),
        compound: round4(compound),
        positive: share(pos),
        negative: share(neg),
        neutral: if total > 0.0 { share(neutral as f64) } else { 1.0 },
    }
}

/// Score articles, newest first.
pub fn score_articles(mut articles: Vec<NewsArticle>) -> Vec<ScoredArticle> {
    // Undated articles sort last
    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    articles
        .into_iter()
        .map(|article| {
            let sentiment = score_text(&article.text());
            ScoredArticle { article, sentiment }
        })
        .collect()
}

/// Summarize articles ordered newest first; newer articles weigh more.
pub fn summarize(articles: &[ScoredArticle]) -> SentimentSummary {
    if articles.is_empty() {
        return SentimentSummary {
            label: SentimentLabel::Neutral,
            score: 0.0,
            positive_count: 0,
            negative_count: 0,
            neutral_count: 0,
            confidence: 0.0,
        };
    }

    let count = |label| {
        articles
            .iter()
            .filter(|a| a.sentiment.label == label)
            .count()
    };
    let positive_count = count(SentimentLabel::Positive);
    let negative_count = count(SentimentLabel::Negative);
    let neutral_count = count(SentimentLabel::Neutral);

    let n = articles.len();
    let (weighted, total_weight) = articles
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(score, weight), (i, a)| {
            let w = (n - i) as f64;
            (score + a.sentiment.compound * w, weight + w)
        });
    let score = weighted / total_weight;

    let dominant = positive_count.max(negative_count).max(neutral_count);

    SentimentSummary {
        label: SentimentLabel::from_score(score, OVERALL_THRESHOLD),
        score: round4(score),
        positive_count,
        negative_count,
        neutral_count,
        confidence: round2(dominant as f64 / n as f64 * 100.0),
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}
