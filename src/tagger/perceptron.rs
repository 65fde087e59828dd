//! Averaged-perceptron BIO sequence tagger.
//!
//! Greedy left-to-right decoding over the shared tokenizer. Features look at
//! the word, its affixes and shape, the neighbouring words and the previous
//! predicted tag.

use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::corpus::{align, AlignedExample, AlignmentStats, Bio, TrainingCorpus};
use super::{EntityTagger, TrainingError};
use crate::annotate::tokenize;
use crate::domain::{EntityLabel, Span};

/// feature → tag → weight
pub type Weights = BTreeMap<String, BTreeMap<String, f64>>;

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub iterations: usize,
    pub seed: u64,
    /// Share of examples held out for evaluation
    pub eval_fraction: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            iterations: 20,
            seed: 42,
            eval_fraction: 0.2,
        }
    }
}

/// Loss and accuracy after one pass over the training split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationStats {
    pub iteration: usize,
    /// Tag mistakes made while training
    pub loss: usize,
    /// Exact-match span recall on the evaluation split
    pub accuracy: f64,
}

/// Outcome of a training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub examples: usize,
    pub train_examples: usize,
    pub eval_examples: usize,
    pub skipped: AlignmentStats,
    pub iterations: Vec<IterationStats>,
    pub final_accuracy: f64,
}

/// Perceptron weights used at prediction time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceTagger {
    /// Tag names in scoring order; ties go to the earliest
    tags: Vec<String>,
    weights: Weights,
}

impl Default for SequenceTagger {
    fn default() -> Self {
        Self::empty()
    }
}

impl SequenceTagger {
    /// A model that predicts nothing
    pub fn empty() -> Self {
        Self {
            tags: vec![Bio::Outside.to_string()],
            weights: Weights::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Labels this model can emit
    pub fn labels(&self) -> Vec<EntityLabel> {
        let mut labels: Vec<EntityLabel> = self
            .tags
            .iter()
            .filter_map(|t| Bio::parse(t).and_then(|b| b.label()))
            .collect();
        labels.sort();
        labels.dedup();
        labels
    }

    pub(crate) fn from_parts(tags: Vec<String>, weights: Weights) -> Self {
        let tags = if tags.is_empty() {
            vec![Bio::Outside.to_string()]
        } else {
            tags
        };
        Self { tags, weights }
    }

    /// Train a fresh model; `self` is never touched
    pub fn train(corpus: &TrainingCorpus, config: &TrainingConfig) -> Result<(Self, TrainingReport), TrainingError> {
        if corpus.is_empty() {
            return Err(TrainingError::EmptyCorpus);
        }

        let mut skipped = AlignmentStats::default();
        let aligned: Vec<AlignedExample> = corpus
            .examples
            .iter()
            .map(|ex| align(ex, &mut skipped))
            .collect::<Result<_, _>>()?;
        let aligned: Vec<AlignedExample> = aligned.into_iter().filter(|a| !a.words.is_empty()).collect();
        if aligned.is_empty() {
            return Err(TrainingError::EmptyCorpus);
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut order: Vec<usize> = (0..aligned.len()).collect();
        order.shuffle(&mut rng);

        // Tiny corpora are evaluated on everything they were trained on
        let (train_idx, eval_idx) = if aligned.len() < 5 {
            (order.clone(), order)
        } else {
            let n_eval = ((aligned.len() as f64) * config.eval_fraction.clamp(0.0, 0.9)).round() as usize;
            let n_eval = n_eval.clamp(1, aligned.len() - 1);
            let eval = order[..n_eval].to_vec();
            let train = order[n_eval..].to_vec();
            (train, eval)
        };

        let tags = Bio::all();
        let mut trainer = Averager::default();
        let mut iterations = Vec::with_capacity(config.iterations);
        let mut epoch_order = train_idx.clone();

        for iteration in 1..=config.iterations.max(1) {
            epoch_order.shuffle(&mut rng);
            let mut loss = 0;
            for &i in &epoch_order {
                let example = &aligned[i];
                let mut prev = Bio::Outside;
                for pos in 0..example.words.len() {
                    let features = token_features(&example.words, pos, prev);
                    let guess = best_tag(&tags, &features, |f, t| trainer.weight(f, t));
                    let gold = example.tags[pos];
                    if guess != gold {
                        loss += 1;
                        trainer.update(&features, &gold.to_string(), &guess.to_string());
                    }
                    trainer.tick();
                    prev = guess;
                }
            }

            let accuracy = span_accuracy(&aligned, &eval_idx, |words| {
                decode(words, &tags, |f, t| trainer.weight(f, t))
            });
            info!(iteration, loss, accuracy, "training iteration");
            iterations.push(IterationStats {
                iteration,
                loss,
                accuracy,
            });
        }

        let model = Self {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            weights: trainer.average(),
        };
        let final_accuracy = span_accuracy(&aligned, &eval_idx, |words| model.decode_words(words));
        debug!(features = model.weights.len(), final_accuracy, "training finished");

        Ok((
            model,
            TrainingReport {
                examples: corpus.len(),
                train_examples: train_idx.len(),
                eval_examples: eval_idx.len(),
                skipped,
                iterations,
                final_accuracy,
            },
        ))
    }

    fn decode_words(&self, words: &[String]) -> Vec<Bio> {
        let tags: Vec<Bio> = self.tags.iter().filter_map(|t| Bio::parse(t)).collect();
        decode(words, &tags, |f, t| {
            self.weights
                .get(f)
                .and_then(|per_tag| per_tag.get(t))
                .copied()
                .unwrap_or(0.0)
        })
    }
}

impl EntityTagger for SequenceTagger {
    fn predict(&self, text: &str) -> Vec<Span> {
        if self.is_empty() {
            return Vec::new();
        }
        let tokens = tokenize(text);
        let words: Vec<String> = tokens.iter().map(|t| t.text.to_string()).collect();
        let tags = self.decode_words(&words);

        let mut spans = Vec::new();
        let mut open: Option<(usize, usize, EntityLabel)> = None;
        for (token, tag) in tokens.iter().zip(tags) {
            match tag {
                Bio::Inside(label) if open.is_some_and(|(_, _, l)| l == label) => {
                    if let Some(span) = open.as_mut() {
                        span.1 = token.end;
                    }
                }
                Bio::Begin(label) | Bio::Inside(label) => {
                    if let Some((s, e, l)) = open.take() {
                        spans.push(Span::from_chars(text, s, e, l));
                    }
                    open = Some((token.start, token.end, label));
                }
                Bio::Outside => {
                    if let Some((s, e, l)) = open.take() {
                        spans.push(Span::from_chars(text, s, e, l));
                    }
                }
            }
        }
        if let Some((s, e, l)) = open {
            spans.push(Span::from_chars(text, s, e, l));
        }
        spans
    }
}

// ============================================================================
// Features and decoding
// ============================================================================

fn shape(word: &str) -> String {
    let mut out = String::new();
    for c in word.chars() {
        let class = if c.is_uppercase() {
            'X'
        } else if c.is_lowercase() {
            'x'
        } else if c.is_ascii_digit() {
            'd'
        } else {
            c
        };
        if !out.ends_with(class) {
            out.push(class);
        }
    }
    out
}

fn affix(word: &str, n: usize, suffix: bool) -> String {
    let chars: Vec<char> = word.chars().collect();
    if chars.len() <= n {
        return word.to_string();
    }
    if suffix {
        chars[chars.len() - n..].iter().collect()
    } else {
        chars[..n].iter().collect()
    }
}

fn token_features(words: &[String], i: usize, prev: Bio) -> Vec<String> {
    let word = words[i].to_lowercase();
    let prev_word = if i > 0 { words[i - 1].to_lowercase() } else { "<s>".to_string() };
    let next_word = words.get(i + 1).map(|w| w.to_lowercase()).unwrap_or_else(|| "</s>".to_string());

    vec![
        "bias".to_string(),
        format!("w={word}"),
        format!("s2={}", affix(&word, 2, true)),
        format!("s3={}", affix(&word, 3, true)),
        format!("p3={}", affix(&word, 3, false)),
        format!("p4={}", affix(&word, 4, false)),
        format!("shape={}", shape(&words[i])),
        format!("w-1={prev_word}"),
        format!("s3-1={}", affix(&prev_word, 3, true)),
        format!("w+1={next_word}"),
        format!("s3+1={}", affix(&next_word, 3, true)),
        format!("t-1={prev}"),
        format!("t-1+w={prev}|{word}"),
    ]
}

fn best_tag(tags: &[Bio], features: &[String], weight: impl Fn(&str, &str) -> f64) -> Bio {
    let mut best = tags[0];
    let mut best_score = f64::NEG_INFINITY;
    for tag in tags {
        let name = tag.to_string();
        let score: f64 = features.iter().map(|f| weight(f, &name)).sum();
        if score > best_score {
            best = *tag;
            best_score = score;
        }
    }
    best
}

/// Greedy decoding; an `I-` that does not continue its label becomes `B-`
fn decode(words: &[String], tags: &[Bio], weight: impl Fn(&str, &str) -> f64) -> Vec<Bio> {
    if tags.is_empty() {
        return vec![Bio::Outside; words.len()];
    }
    let mut out = Vec::with_capacity(words.len());
    let mut prev = Bio::Outside;
    for i in 0..words.len() {
        let features = token_features(words, i, prev);
        let mut tag = best_tag(tags, &features, &weight);
        if let Bio::Inside(label) = tag {
            if prev.label() != Some(label) {
                tag = Bio::Begin(label);
            }
        }
        out.push(tag);
        prev = tag;
    }
    out
}

fn spans_of(tags: &[Bio]) -> Vec<(usize, usize, EntityLabel)> {
    let mut spans = Vec::new();
    let mut open: Option<(usize, EntityLabel)> = None;
    for (i, tag) in tags.iter().enumerate() {
        match tag {
            Bio::Inside(l) if open.is_some_and(|(_, ol)| ol == *l) => {}
            _ => {
                if let Some((s, l)) = open.take() {
                    spans.push((s, i, l));
                }
                if let Some(l) = tag.label() {
                    open = Some((i, l));
                }
            }
        }
    }
    if let Some((s, l)) = open {
        spans.push((s, tags.len(), l));
    }
    spans
}

fn span_accuracy(
    aligned: &[AlignedExample],
    indices: &[usize],
    predict: impl Fn(&[String]) -> Vec<Bio>,
) -> f64 {
    let mut gold_total = 0;
    let mut correct = 0;
    let mut spurious = 0;
    for &i in indices {
        let example = &aligned[i];
        let gold = spans_of(&example.tags);
        let predicted = spans_of(&predict(&example.words));
        gold_total += gold.len();
        correct += predicted.iter().filter(|p| gold.contains(p)).count();
        spurious += predicted.iter().filter(|p| !gold.contains(p)).count();
    }
    if gold_total == 0 {
        return if spurious == 0 { 1.0 } else { 0.0 };
    }
    correct as f64 / gold_total as f64
}

// ============================================================================
// Weight averaging
// ============================================================================

#[derive(Debug, Default)]
struct Averager {
    weights: HashMap<(String, String), f64>,
    totals: HashMap<(String, String), f64>,
    stamps: HashMap<(String, String), u64>,
    clock: u64,
}

impl Averager {
    fn weight(&self, feature: &str, tag: &str) -> f64 {
        self.weights
            .get(&(feature.to_string(), tag.to_string()))
            .copied()
            .unwrap_or(0.0)
    }

    fn tick(&mut self) {
        self.clock += 1;
    }

    fn update(&mut self, features: &[String], gold: &str, guess: &str) {
        for feature in features {
            self.bump(feature, gold, 1.0);
            self.bump(feature, guess, -1.0);
        }
    }

    fn bump(&mut self, feature: &str, tag: &str, delta: f64) {
        let key = (feature.to_string(), tag.to_string());
        let current = self.weights.get(&key).copied().unwrap_or(0.0);
        let since = self.clock - self.stamps.get(&key).copied().unwrap_or(0);
        *self.totals.entry(key.clone()).or_insert(0.0) += since as f64 * current;
        self.stamps.insert(key.clone(), self.clock);
        self.weights.insert(key, current + delta);
    }

    fn average(self) -> Weights {
        let clock = self.clock.max(1);
        let mut averaged = Weights::new();
        for (key, weight) in &self.weights {
            let since = clock - self.stamps.get(key).copied().unwrap_or(0);
            let total = self.totals.get(key).copied().unwrap_or(0.0) + since as f64 * weight;
            let value = (total / clock as f64 * 1000.0).round() / 1000.0;
            if value != 0.0 {
                averaged
                    .entry(key.0.clone())
                    .or_default()
                    .insert(key.1.clone(), value);
            }
        }
        averaged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagger::corpus::TrainingExample;

    fn corpus() -> TrainingCorpus {
        let mut examples = Vec::new();
        for (equipment, id) in [("станок", "2"), ("пресс", "5"), ("робот", "7"), ("конвейер", "3")] {
            for component in ["шпиндель", "подшипник", "датчик"] {
                let text = format!("{component} {equipment} {id} вибрирует");
                let c_end = component.chars().count();
                let e_start = c_end + 1;
                let e_end = e_start + equipment.chars().count();
                let id_start = e_end + 1;
                let id_end = id_start + id.chars().count();
                examples.push(TrainingExample::new(
                    text,
                    vec![
                        (0, c_end, "COMPONENT"),
                        (e_start, e_end, "EQUIPMENT"),
                        (id_start, id_end, "EQUIPMENT_ID"),
                        (id_end + 1, id_end + 1 + "вибрирует".chars().count(), "SYMPTOM"),
                    ],
                ));
            }
        }
        TrainingCorpus::new(examples)
    }

    #[test]
    fn test_empty_model_predicts_nothing() {
        assert!(SequenceTagger::empty().predict("шпиндель станок 2 вибрирует").is_empty());
    }

    #[test]
    fn test_empty_corpus_is_an_error() {
        let result = SequenceTagger::train(&TrainingCorpus::default(), &TrainingConfig::default());
        assert!(matches!(result, Err(TrainingError::EmptyCorpus)));
    }

    #[test]
    fn test_learns_separable_corpus() {
        let config = TrainingConfig {
            iterations: 10,
            ..Default::default()
        };
        let (model, report) = SequenceTagger::train(&corpus(), &config).unwrap();
        assert_eq!(report.examples, 12);
        assert_eq!(report.train_examples + report.eval_examples, 12);
        assert_eq!(report.iterations.len(), 10);
        assert!(report.final_accuracy > 0.9, "accuracy {}", report.final_accuracy);

        let spans = model.predict("датчик пресс 5 вибрирует");
        let labels: Vec<EntityLabel> = spans.iter().map(|s| s.label).collect();
        assert_eq!(
            labels,
            vec![
                EntityLabel::Component,
                EntityLabel::Equipment,
                EntityLabel::EquipmentId,
                EntityLabel::Symptom
            ]
        );
        assert_eq!(spans[1].text, "пресс");
        assert_eq!((spans[1].start, spans[1].end), (7, 12));
    }

    #[test]
    fn test_training_is_deterministic_for_a_seed() {
        let config = TrainingConfig {
            iterations: 3,
            ..Default::default()
        };
        let (a, _) = SequenceTagger::train(&corpus(), &config).unwrap();
        let (b, _) = SequenceTagger::train(&corpus(), &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_inside_repaired() {
        let words = vec!["станок".to_string()];
        let tags = [Bio::Inside(EntityLabel::Equipment)];
        assert_eq!(decode(&words, &tags, |_, _| 1.0), vec![Bio::Begin(EntityLabel::Equipment)]);
    }

    #[test]
    fn test_shape_and_affixes() {
        assert_eq!(shape("KUKA-5"), "X-d");
        assert_eq!(shape("Станок"), "Xx");
        assert_eq!(affix("станок", 3, true), "нок");
        assert_eq!(affix("до", 3, false), "до");
    }
}
