//! End-to-end scenario runs against the reference learner.

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use ulmfit_core::config::{ModelSettings, Settings};
use rand::rngs::StdRng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use ulmfit_core::data::{DataBunch, DataProvider, Split};
use ulmfit_core::learner::{Learner, LearnerFactory, Predictions};
use ulmfit_core::training::phase::OneCycle;
use ulmfit_core::registry::no_defaults;
use ulmfit_core::scenario::{Scenario, ScenarioContext, SmallTrainSample};
use ulmfit_core::training::{ExperimentReport, ExperimentRunner, TrialStatus};
use ulmfit_core::{ScenarioError, load_params};

const POSITIVE: [&str; 5] = ["great", "wonderful", "loved", "excellent", "delightful"];
const NEGATIVE: [&str; 5] = ["awful", "boring", "hated", "terrible", "dreadful"];

fn examples(count: usize, offset: usize) -> Value {
    let rows: Vec<Value> = (0..count)
        .map(|i| {
            let (words, label) = if i % 2 == 0 {
                (&POSITIVE, "pos")
            } else {
                (&NEGATIVE, "neg")
            };
            let word = words[(i / 2 + offset) % words.len()];
            json!({"text": format!("the film was {word} number {i}"), "label": label})
        })
        .collect();
    Value::Array(rows)
}

fn params(seed: u64) -> Value {
    json!({
        "seed": seed,
        "aggregation": {"name": "mean"},
        "scenario": {
            "name": "small_train_sample",
            "dataset": {
                "name": "inline",
                "train": {"type": "inline", "examples": examples(40, 0)},
                "test": {"type": "inline", "examples": examples(10, 2)},
                "sample_size": 16,
                "valid_fraction": 0.25
            }
        },
        "training_schedule": {"name": "gradual_unfreeze", "epochs": [1, 2, 1]}
    })
}

fn small_settings() -> Settings {
    let mut settings = Settings::default();
    settings.model = ModelSettings {
        hidden_size: 8,
        buckets: 128,
        batch_size: 4,
        ..ModelSettings::default()
    };
    settings
}

fn context() -> ScenarioContext {
    ScenarioContext::with_reference_learner(&small_settings()).unwrap()
}

#[test]
fn test_same_seed_is_reproducible() {
    let ctx = context();
    let first = ctx.run(&params(7)).unwrap();
    let second = ctx.run(&params(7)).unwrap();
    assert_eq!(first.metric, second.metric);
    assert_eq!(first.stats, second.stats);
}

#[test]
fn test_three_phase_schedule_records_three_loss_lists() {
    let result = context().run(&params(1)).unwrap();
    assert_eq!(result.stats.train_losses.len(), 3);
    // 12 training examples, batch size 4 → 3 steps per epoch
    let steps: Vec<usize> = result.stats.train_losses.iter().map(Vec::len).collect();
    assert_eq!(steps, vec![3, 6, 3]);
    assert!(
        result
            .stats
            .train_losses
            .iter()
            .flatten()
            .all(|l| l.is_finite())
    );
    assert!((0.0..=1.0).contains(&result.metric));
    assert!(result.model.is_some());
}

#[test]
fn test_empty_schedule_yields_no_losses() {
    let mut p = params(3);
    p["training_schedule"] = json!({"name": "custom", "phases": []});
    let result = context().run(&p).unwrap();
    assert!(result.stats.train_losses.is_empty());
    assert!((0.0..=1.0).contains(&result.metric));
}

#[test]
fn test_different_seeds_draw_different_samples() {
    let ctx = context();
    let p = params(0);
    let provider = ctx
        .datasets()
        .create_from_config(&p["scenario"]["dataset"])
        .unwrap();
    let texts = |seed| -> Vec<String> {
        provider
            .get_training_sample(seed)
            .unwrap()
            .train
            .into_iter()
            .map(|e| e.text)
            .collect()
    };
    assert_eq!(texts(5), texts(5));
    assert_ne!(texts(5), texts(6));
}

#[test]
fn test_missing_key_fails_before_running() {
    for key in ["seed", "aggregation", "training_schedule"] {
        let mut p = params(0);
        p.as_object_mut().unwrap().remove(key);
        match context().run(&p) {
            Err(ScenarioError::Configuration(msg)) => assert!(msg.contains(key), "{msg}"),
            other => panic!("Expected Configuration error for {key}, got: {other:?}"),
        }
    }
}

#[test]
fn test_unknown_variants() {
    let ctx = context();

    let mut p = params(0);
    p["training_schedule"]["name"] = json!("cosine_restarts");
    match ctx.run(&p) {
        Err(ScenarioError::UnknownVariant { kind, name }) => {
            assert_eq!(kind, "training_schedule");
            assert_eq!(name, "cosine_restarts");
        }
        other => panic!("Expected UnknownVariant error, got: {other:?}"),
    }

    let mut p = params(0);
    p["scenario"]["dataset"]["name"] = json!("parquet");
    assert!(matches!(
        ctx.run(&p),
        Err(ScenarioError::UnknownVariant { .. })
    ));

    let mut p = params(0);
    p["scenario"]["name"] = json!("few_shot");
    assert!(matches!(
        ctx.run(&p),
        Err(ScenarioError::UnknownVariant { .. })
    ));
}

#[test]
fn test_unknown_encoder_fails() {
    let mut settings = small_settings();
    settings.model.encoder = "bwd_enc".to_string();
    let ctx = ScenarioContext::with_reference_learner(&settings).unwrap();
    match ctx.run(&params(0)) {
        Err(ScenarioError::EncoderLoad { name, .. }) => assert_eq!(name, "bwd_enc"),
        other => panic!("Expected EncoderLoad error, got: {other:?}"),
    }
}

#[test]
fn test_full_train_set_uses_every_example() {
    let mut p = params(2);
    p["scenario"]["name"] = json!("full_train_set");
    p["training_schedule"] = json!({"name": "single_phase", "epochs": 1});
    let result = context().run(&p).unwrap();
    // 30 training examples after the 25% validation split, batch size 4
    assert_eq!(result.stats.train_losses.len(), 1);
    assert_eq!(result.stats.train_losses[0].len(), 8);
}

#[test]
fn test_metric_selection() {
    let mut p = params(4);
    p["metric"] = json!("error_rate");
    let error_rate = context().run(&p).unwrap().metric;
    let accuracy = context().run(&params(4)).unwrap().metric;
    assert!((error_rate + accuracy - 1.0).abs() < 1e-12);

    p["metric"] = json!("auc");
    assert!(matches!(
        context().run(&p),
        Err(ScenarioError::Configuration(_))
    ));
}

#[test]
fn test_single_run_on_variant_directly() {
    let ctx = context();
    let scenario = SmallTrainSample;
    let direct = scenario.single_run(&ctx, &params(9)).unwrap();
    let routed = ctx.run(&params(9)).unwrap();
    assert_eq!(direct.summary(), routed.summary());
}

#[derive(Debug)]
struct FirstHalf;

impl Scenario for FirstHalf {
    fn name(&self) -> &'static str {
        "first_half"
    }

    fn training_data(
        &self,
        provider: &dyn DataProvider,
        seed: u64,
    ) -> Result<ulmfit_core::data::DataBunch, ScenarioError> {
        let mut data = provider.get_full_training(seed)?;
        let half = data.train.len() / 2;
        data.train.truncate(half);
        Ok(data)
    }
}

fn first_half(_config: &Value) -> Result<Box<dyn Scenario>, ScenarioError> {
    Ok(Box::new(FirstHalf))
}

#[test]
fn test_custom_scenario_registration() {
    let settings = small_settings();
    let factory = std::sync::Arc::new(ulmfit_core::learner::BagOfWordsFactory::new(
        settings.model.clone(),
    ));
    let mut builder = ScenarioContext::builder(factory).unwrap();
    builder
        .scenarios_mut()
        .register("first_half", "Half of the training set", no_defaults(), first_half)
        .unwrap();
    let ctx = builder.model(settings.model).build();

    let mut p = params(0);
    p["scenario"]["name"] = json!("first_half");
    p["training_schedule"] = json!({"name": "single_phase"});
    let result = ctx.run(&p).unwrap();
    // 15 of 30 training examples, batch size 4
    assert_eq!(result.stats.train_losses[0].len(), 4);

    let again = builder_duplicate_fails();
    assert!(matches!(again, Err(ScenarioError::DuplicateName { .. })));
}

fn builder_duplicate_fails() -> Result<(), ScenarioError> {
    let factory = std::sync::Arc::new(ulmfit_core::learner::BagOfWordsFactory::new(
        ModelSettings::default(),
    ));
    let mut builder = ScenarioContext::builder(factory)?;
    builder.scenarios_mut().register(
        "small_train_sample",
        "",
        no_defaults(),
        first_half,
    )
}

#[test]
fn test_experiment_over_seeds() {
    let ctx = context();
    let report = ExperimentRunner::new(&ctx)
        .run(Some("sweep"), &params(0), &[0, 1, 2])
        .unwrap();
    assert_eq!(report.trials.len(), 3);
    assert_eq!(report.completed(), 3);
    let seeds: Vec<u64> = report.trials.iter().map(|t| t.seed).collect();
    assert_eq!(seeds, vec![0, 1, 2]);
    let summary = report.summary.clone().unwrap();
    assert_eq!(summary.count, 3);
    assert!(summary.min <= summary.mean && summary.mean <= summary.max);
    assert!(report.params.get("seed").is_none());

    // the fingerprint ignores the seed
    let other = ExperimentRunner::new(&ctx)
        .run(None, &params(42), &[3])
        .unwrap();
    assert_eq!(report.params_fingerprint, other.params_fingerprint);
    assert_eq!(other.name, "small_train_sample");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports").join(report.file_name());
    report.save(&path).unwrap();
    let loaded = ExperimentReport::load(&path).unwrap();
    assert_eq!(loaded.id, report.id);
    assert_eq!(loaded.completed(), 3);
    let loaded_seeds: Vec<u64> = loaded.trials.iter().map(|t| t.seed).collect();
    assert_eq!(loaded_seeds, seeds);
}

#[test]
fn test_experiment_records_failed_trials() {
    let mut settings = small_settings();
    settings.model.encoder = "bwd_enc".to_string();
    let ctx = ScenarioContext::with_reference_learner(&settings).unwrap();
    let report = ExperimentRunner::new(&ctx)
        .run(None, &params(0), &[0, 1])
        .unwrap();
    assert_eq!(report.failed(), 2);
    assert!(report.summary.is_none());
    assert!(
        report
            .trials
            .iter()
            .all(|t| t.status == TrialStatus::Failed && t.error.is_some())
    );
}

#[test]
fn test_experiment_rejects_invalid_params_up_front() {
    let ctx = context();
    let mut p = params(0);
    p.as_object_mut().unwrap().remove("aggregation");
    assert!(ExperimentRunner::new(&ctx).run(None, &p, &[0, 1]).is_err());
}

#[test]
fn test_params_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("params.json");
    std::fs::write(&path, serde_json::to_string_pretty(&params(11)).unwrap()).unwrap();
    let loaded = load_params(&path).unwrap();
    let result = context().run(&loaded).unwrap();
    assert_eq!(result.stats.train_losses.len(), 3);
}

// ---------------------------------------------------------------------------
// Stand-in learner that records how the run drives it
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Calls {
    fits: AtomicUsize,
    layer_group_queries: AtomicUsize,
    freezes: Mutex<Vec<i64>>,
}

struct CountingFactory {
    calls: Arc<Calls>,
    encoder_applies: bool,
    fail_on_fit: Option<usize>,
}

impl CountingFactory {
    fn new(calls: &Arc<Calls>) -> Self {
        Self {
            calls: Arc::clone(calls),
            encoder_applies: true,
            fail_on_fit: None,
        }
    }
}

impl LearnerFactory for CountingFactory {
    fn build(
        &self,
        data: DataBunch,
        _arch: &str,
        _aggregation: &Value,
        _rng: StdRng,
    ) -> Result<Box<dyn Learner>, ScenarioError> {
        Ok(Box::new(CountingLearner {
            calls: Arc::clone(&self.calls),
            encoder_applies: self.encoder_applies,
            fail_on_fit: self.fail_on_fit,
            losses: Vec::new(),
            data,
        }))
    }
}

struct CountingLearner {
    calls: Arc<Calls>,
    encoder_applies: bool,
    fail_on_fit: Option<usize>,
    losses: Vec<f64>,
    data: DataBunch,
}

impl Learner for CountingLearner {
    fn load_encoder(&mut self, _name: &str) -> Result<bool, ScenarioError> {
        Ok(self.encoder_applies)
    }

    fn layer_groups(&self) -> usize {
        self.calls.layer_group_queries.fetch_add(1, Ordering::SeqCst);
        3
    }

    fn freeze_to(&mut self, boundary: i64) {
        self.calls.freezes.lock().unwrap().push(boundary);
    }

    fn fit_one_cycle(&mut self, cycle: &OneCycle) -> Result<(), ScenarioError> {
        let fit = self.calls.fits.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_fit == Some(fit) {
            return Err(ScenarioError::training("loss diverged"));
        }
        self.losses = vec![0.5; cycle.epochs as usize];
        Ok(())
    }

    fn losses(&self) -> &[f64] {
        &self.losses
    }

    fn set_data(&mut self, data: DataBunch) {
        self.data = data;
    }

    fn predict(&mut self, split: Split) -> Result<Predictions, ScenarioError> {
        let classes = self.data.num_classes();
        let labels = self.data.labels(split);
        let scores = labels
            .iter()
            .map(|&label| {
                let mut row = vec![0.0; classes];
                row[label] = 1.0;
                row
            })
            .collect();
        Ok(Predictions { scores, labels })
    }
}

fn counting_context(factory: CountingFactory) -> ScenarioContext {
    ScenarioContext::builder(Arc::new(factory))
        .unwrap()
        .model(small_settings().model)
        .build()
}

#[test]
fn test_drives_learner_phase_by_phase() {
    let calls = Arc::new(Calls::default());
    let ctx = counting_context(CountingFactory::new(&calls));
    let result = ctx.run(&params(0)).unwrap();

    assert_eq!(calls.fits.load(Ordering::SeqCst), 3);
    assert_eq!(*calls.freezes.lock().unwrap(), vec![-1, -2, -3]);
    assert!(calls.layer_group_queries.load(Ordering::SeqCst) >= 1);
    assert_eq!(result.stats.train_losses, vec![vec![0.5], vec![0.5, 0.5], vec![0.5]]);
    assert_eq!(result.metric, 1.0);
}

#[test]
fn test_failed_phase_aborts_run() {
    let calls = Arc::new(Calls::default());
    let ctx = counting_context(CountingFactory {
        fail_on_fit: Some(2),
        ..CountingFactory::new(&calls)
    });
    match ctx.run(&params(0)) {
        Err(ScenarioError::Training(msg)) => assert_eq!(msg, "loss diverged"),
        other => panic!("Expected Training error, got: {other:?}"),
    }
    // the third phase never starts
    assert_eq!(calls.fits.load(Ordering::SeqCst), 2);
    assert_eq!(calls.freezes.lock().unwrap().len(), 2);
}

#[test]
fn test_empty_schedule_never_fits() {
    let calls = Arc::new(Calls::default());
    let ctx = counting_context(CountingFactory::new(&calls));
    let mut p = params(0);
    p["training_schedule"] = json!({"name": "custom", "phases": []});
    let result = ctx.run(&p).unwrap();

    assert_eq!(calls.fits.load(Ordering::SeqCst), 0);
    assert!(calls.freezes.lock().unwrap().is_empty());
    assert!(result.stats.train_losses.is_empty());
    assert_eq!(result.metric, 1.0);
}

#[test]
fn test_encoder_not_applied_fails_before_training() {
    let calls = Arc::new(Calls::default());
    let ctx = counting_context(CountingFactory {
        encoder_applies: false,
        ..CountingFactory::new(&calls)
    });
    let expected = ctx.model().encoder.clone();
    match ctx.run(&params(0)) {
        Err(ScenarioError::EncoderLoad { name, .. }) => assert_eq!(name, expected),
        other => panic!("Expected EncoderLoad error, got: {other:?}"),
    }
    assert_eq!(calls.fits.load(Ordering::SeqCst), 0);
}
