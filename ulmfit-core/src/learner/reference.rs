//! Reference learner: a hashed bag-of-words classifier with three layer
//! groups, trained with momentum SGD under a one-cycle schedule.
//!
//! Layer groups, in freeze order:
//! 0. token embeddings (`buckets × hidden`)
//! 1. tanh projection (`hidden × hidden` + bias)
//! 2. softmax head (`classes × hidden` + bias)
//!
//! Groups 0 and 1 form the encoder that [`Learner::load_encoder`] replaces.

use crate::config::ModelSettings;
use crate::data::{DataBunch, Split};
use crate::error::ScenarioError;
use crate::learner::{Learner, LearnerFactory, Predictions, frozen_prefix};
use crate::training::one_cycle::OneCyclePlan;
use crate::training::phase::OneCycle;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tracing::{debug, info};

const GROUPS: usize = 3;
const EMBEDDING_INIT: f64 = 0.1;

/// Architecture identifier served by [`BagOfWordsFactory`].
pub const ARCH: &str = "bag_of_words";
/// Recurrent architecture name that existing parameter sets carry; the
/// factory serves it with the same model.
pub const AWD_LSTM: &str = "awd_lstm";

/// How token embeddings are pooled into one document vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Mean,
    Max,
}

impl Aggregation {
    /// Accepts `"mean"` or `{"name": "mean", ...}`.
    pub fn from_config(config: &Value) -> Result<Self, ScenarioError> {
        let name = match config {
            Value::String(name) => name.as_str(),
            Value::Object(map) => map.get("name").and_then(Value::as_str).ok_or_else(|| {
                ScenarioError::config("aggregation configuration requires a `name`")
            })?,
            _ => {
                return Err(ScenarioError::config(
                    "aggregation must be a name or a mapping",
                ));
            }
        };
        match name {
            "mean" => Ok(Self::Mean),
            "max" => Ok(Self::Max),
            other => Err(ScenarioError::config(format!(
                "unsupported aggregation '{other}' (expected 'mean' or 'max')"
            ))),
        }
    }
}

/// FNV-1a, used for token buckets and encoder seeds.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

fn tokenize(text: &str, buckets: usize) -> Vec<usize> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| (fnv1a(t.to_lowercase().as_bytes()) % buckets as u64) as usize)
        .collect()
}

fn uniform(rng: &mut StdRng, len: usize, bound: f64) -> Vec<f64> {
    (0..len).map(|_| rng.gen_range(-bound..bound)).collect()
}

/// Intermediate values of one forward pass.
struct Activations {
    pooled: Vec<f64>,
    /// Winning token per hidden unit (max pooling only).
    winners: Vec<usize>,
    hidden: Vec<f64>,
    probs: Vec<f64>,
}

pub struct BagOfWordsLearner {
    data: DataBunch,
    train_tokens: Vec<Vec<usize>>,
    valid_tokens: Vec<Vec<usize>>,
    hidden: usize,
    buckets: usize,
    classes: usize,
    batch_size: usize,
    aggregation: Aggregation,
    params: [Vec<f64>; GROUPS],
    velocity: [Vec<f64>; GROUPS],
    frozen: usize,
    recorder: Vec<f64>,
    rng: StdRng,
    encoders: Vec<String>,
}

impl std::fmt::Debug for BagOfWordsLearner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BagOfWordsLearner")
            .field("hidden", &self.hidden)
            .field("buckets", &self.buckets)
            .field("classes", &self.classes)
            .field("aggregation", &self.aggregation)
            .field("frozen", &self.frozen)
            .finish()
    }
}

impl BagOfWordsLearner {
    pub fn new(
        data: DataBunch,
        settings: &ModelSettings,
        aggregation: Aggregation,
        mut rng: StdRng,
    ) -> Result<Self, ScenarioError> {
        if settings.hidden_size == 0 || settings.buckets == 0 || settings.batch_size == 0 {
            return Err(ScenarioError::model(
                "hidden_size, buckets and batch_size must be positive",
            ));
        }
        let classes = data.num_classes();
        if classes < 2 {
            return Err(ScenarioError::model(format!(
                "classification needs at least two classes, got {classes}"
            )));
        }

        let h = settings.hidden_size;
        let dense_bound = 1.0 / (h as f64).sqrt();
        let mut projection = uniform(&mut rng, h * h, dense_bound);
        projection.extend(std::iter::repeat_n(0.0, h));
        let mut head = uniform(&mut rng, classes * h, dense_bound);
        head.extend(std::iter::repeat_n(0.0, classes));
        let params = [
            uniform(&mut rng, settings.buckets * h, EMBEDDING_INIT),
            projection,
            head,
        ];
        let velocity = params.clone().map(|p| vec![0.0; p.len()]);

        let mut learner = Self {
            data: DataBunch {
                train: Vec::new(),
                valid: Vec::new(),
                classes: Vec::new(),
            },
            train_tokens: Vec::new(),
            valid_tokens: Vec::new(),
            hidden: h,
            buckets: settings.buckets,
            classes,
            batch_size: settings.batch_size,
            aggregation,
            params,
            velocity,
            frozen: 0,
            recorder: Vec::new(),
            rng,
            encoders: settings.encoders.clone(),
        };
        learner.set_data(data);
        Ok(learner)
    }

    fn encode(&self, split: Split) -> Vec<Vec<usize>> {
        self.data
            .split(split)
            .iter()
            .map(|e| tokenize(&e.text, self.buckets))
            .collect()
    }

    fn forward(&self, tokens: &[usize]) -> Activations {
        let h = self.hidden;
        let [embedding, projection, head] = &self.params;

        let mut pooled = vec![0.0; h];
        let mut winners = Vec::new();
        if !tokens.is_empty() {
            match self.aggregation {
                Aggregation::Mean => {
                    for &t in tokens {
                        for j in 0..h {
                            pooled[j] += embedding[t * h + j];
                        }
                    }
                    let n = tokens.len() as f64;
                    pooled.iter_mut().for_each(|v| *v /= n);
                }
                Aggregation::Max => {
                    winners = vec![tokens[0]; h];
                    for j in 0..h {
                        pooled[j] = embedding[tokens[0] * h + j];
                    }
                    for &t in &tokens[1..] {
                        for j in 0..h {
                            let v = embedding[t * h + j];
                            if v > pooled[j] {
                                pooled[j] = v;
                                winners[j] = t;
                            }
                        }
                    }
                }
            }
        }

        let hidden: Vec<f64> = (0..h)
            .map(|i| {
                let row = &projection[i * h..(i + 1) * h];
                let z: f64 = row.iter().zip(&pooled).map(|(w, x)| w * x).sum();
                (z + projection[h * h + i]).tanh()
            })
            .collect();

        let c = self.classes;
        let logits: Vec<f64> = (0..c)
            .map(|k| {
                let row = &head[k * h..(k + 1) * h];
                let z: f64 = row.iter().zip(&hidden).map(|(w, x)| w * x).sum();
                z + head[c * h + k]
            })
            .collect();
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|z| (z - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        let probs = exps.into_iter().map(|e| e / total).collect();

        Activations {
            pooled,
            winners,
            hidden,
            probs,
        }
    }

    /// Accumulate `scale ×` the cross-entropy gradient of one example.
    fn backward(
        &self,
        tokens: &[usize],
        act: &Activations,
        label: usize,
        scale: f64,
        grads: &mut [Vec<f64>; GROUPS],
    ) {
        let h = self.hidden;
        let c = self.classes;
        let [_, projection, head] = &self.params;
        let [g_embedding, g_projection, g_head] = grads;

        let d_logits: Vec<f64> = act
            .probs
            .iter()
            .enumerate()
            .map(|(k, p)| (p - if k == label { 1.0 } else { 0.0 }) * scale)
            .collect();

        let mut d_hidden = vec![0.0; h];
        for k in 0..c {
            for j in 0..h {
                g_head[k * h + j] += d_logits[k] * act.hidden[j];
                d_hidden[j] += head[k * h + j] * d_logits[k];
            }
            g_head[c * h + k] += d_logits[k];
        }

        let d_pre: Vec<f64> = d_hidden
            .iter()
            .zip(&act.hidden)
            .map(|(d, y)| d * (1.0 - y * y))
            .collect();
        let mut d_pooled = vec![0.0; h];
        for i in 0..h {
            for j in 0..h {
                g_projection[i * h + j] += d_pre[i] * act.pooled[j];
                d_pooled[j] += projection[i * h + j] * d_pre[i];
            }
            g_projection[h * h + i] += d_pre[i];
        }

        if tokens.is_empty() {
            return;
        }
        match self.aggregation {
            Aggregation::Mean => {
                let n = tokens.len() as f64;
                for &t in tokens {
                    for j in 0..h {
                        g_embedding[t * h + j] += d_pooled[j] / n;
                    }
                }
            }
            Aggregation::Max => {
                for (j, &t) in act.winners.iter().enumerate() {
                    g_embedding[t * h + j] += d_pooled[j];
                }
            }
        }
    }

    /// Mean loss and gradients of one mini-batch of training indices.
    fn batch_gradients(&self, batch: &[usize]) -> (f64, [Vec<f64>; GROUPS]) {
        let mut grads = self.params.clone().map(|p| vec![0.0; p.len()]);
        let scale = 1.0 / batch.len() as f64;
        let mut loss = 0.0;
        for &i in batch {
            let tokens = &self.train_tokens[i];
            let label = self.data.train[i].label;
            let act = self.forward(tokens);
            loss -= act.probs[label].max(f64::MIN_POSITIVE).ln();
            self.backward(tokens, &act, label, scale, &mut grads);
        }
        (loss * scale, grads)
    }

    fn apply(&mut self, grads: &[Vec<f64>; GROUPS], rates: &[f64], momentum: f64, wd: f64) {
        for g in self.frozen..GROUPS {
            let lr = rates[g];
            let params = &mut self.params[g];
            let velocity = &mut self.velocity[g];
            for ((p, v), grad) in params.iter_mut().zip(velocity.iter_mut()).zip(&grads[g]) {
                *v = momentum * *v + grad;
                *p -= lr * (*v + wd * *p);
            }
        }
    }
}

impl Learner for BagOfWordsLearner {
    fn load_encoder(&mut self, name: &str) -> Result<bool, ScenarioError> {
        if !self.encoders.iter().any(|e| e == name) {
            return Err(ScenarioError::encoder_load(
                name,
                format!("no pretrained encoder available (known: {:?})", self.encoders),
            ));
        }
        let h = self.hidden;
        let mut rng = StdRng::seed_from_u64(fnv1a(name.as_bytes()));
        self.params[0] = uniform(&mut rng, self.buckets * h, EMBEDDING_INIT);
        let mut projection = uniform(&mut rng, h * h, 1.0 / (h as f64).sqrt());
        projection.extend(std::iter::repeat_n(0.0, h));
        self.params[1] = projection;
        info!(encoder = %name, "Loaded pretrained encoder");
        Ok(true)
    }

    fn layer_groups(&self) -> usize {
        GROUPS
    }

    fn freeze_to(&mut self, boundary: i64) {
        self.frozen = frozen_prefix(boundary, GROUPS);
        debug!(boundary, frozen_groups = self.frozen, "Set freeze boundary");
    }

    fn fit_one_cycle(&mut self, cycle: &OneCycle) -> Result<(), ScenarioError> {
        let n = self.data.train.len();
        if n == 0 {
            return Err(ScenarioError::training("no training examples"));
        }
        let steps_per_epoch = n.div_ceil(self.batch_size);
        let plan = OneCyclePlan::new(cycle, steps_per_epoch);
        let rates = cycle.lr.group_rates(GROUPS);
        self.recorder.clear();
        self.velocity.iter_mut().for_each(|v| v.fill(0.0));

        let mut order: Vec<usize> = (0..n).collect();
        let mut step = 0;
        for epoch in 0..cycle.epochs {
            order.shuffle(&mut self.rng);
            let mut epoch_loss = 0.0;
            for batch in order.chunks(self.batch_size) {
                let (scale, momentum) = plan.at(step);
                let (loss, grads) = self.batch_gradients(batch);
                if !loss.is_finite() {
                    return Err(ScenarioError::training(format!(
                        "non-finite loss {loss} at step {step}"
                    )));
                }
                let scaled: Vec<f64> = rates.iter().map(|r| r * scale).collect();
                self.apply(&grads, &scaled, momentum, cycle.wd);
                self.recorder.push(loss);
                epoch_loss += loss;
                step += 1;
            }
            debug!(
                epoch,
                mean_loss = epoch_loss / steps_per_epoch as f64,
                "Finished epoch"
            );
        }
        Ok(())
    }

    fn losses(&self) -> &[f64] {
        &self.recorder
    }

    fn set_data(&mut self, data: DataBunch) {
        self.data = data;
        self.train_tokens = self.encode(Split::Train);
        self.valid_tokens = self.encode(Split::Valid);
    }

    fn predict(&mut self, split: Split) -> Result<Predictions, ScenarioError> {
        if self.data.num_classes() != self.classes {
            return Err(ScenarioError::model(format!(
                "model has {} classes but data has {}",
                self.classes,
                self.data.num_classes()
            )));
        }
        let tokens = match split {
            Split::Train => &self.train_tokens,
            Split::Valid => &self.valid_tokens,
        };
        let scores = tokens.iter().map(|t| self.forward(t).probs).collect();
        Ok(Predictions {
            scores,
            labels: self.data.labels(split),
        })
    }
}

/// Builds [`BagOfWordsLearner`]s from model settings.
#[derive(Debug, Clone)]
pub struct BagOfWordsFactory {
    settings: ModelSettings,
}

impl BagOfWordsFactory {
    pub fn new(settings: ModelSettings) -> Self {
        Self { settings }
    }
}

impl LearnerFactory for BagOfWordsFactory {
    fn build(
        &self,
        data: DataBunch,
        arch: &str,
        aggregation: &Value,
        rng: StdRng,
    ) -> Result<Box<dyn Learner>, ScenarioError> {
        if arch != ARCH && arch != AWD_LSTM {
            return Err(ScenarioError::model(format!(
                "unsupported architecture '{arch}' (expected '{ARCH}' or '{AWD_LSTM}')"
            )));
        }
        let aggregation = Aggregation::from_config(aggregation)?;
        Ok(Box::new(BagOfWordsLearner::new(
            data,
            &self.settings,
            aggregation,
            rng,
        )?))
    }
}
