//! Runs the standard-normal scenario from the engine's test suite as a
//! standalone binary: samples `N(0, 1)` via `loglike`, with a broad
//! `N(0, 5)` prior, and reports the post-burnin mean/variance.

use clap::Parser;
use demcmc::{Component, GammaPolicy, Model, RunResult, Sampler, SamplerConfig, Theta, UpdateRule};
use rand::distributions::Distribution;
use rand::RngCore;
use serde::Deserialize;
use statrs::distribution::Normal;
use std::path::PathBuf;

/// Mirrors the run-sizing fields a consumer would hand-edit between runs.
#[derive(Debug, Deserialize)]
struct DemoConfig {
    particles_per_group: usize,
    n_groups: usize,
    n_iter: usize,
    burnin: usize,
    seed: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        DemoConfig { particles_per_group: 8, n_groups: 3, n_iter: 10_000, burnin: 2_000, seed: 42 }
    }
}

#[derive(Parser, Debug)]
struct Args {
    /// Optional JSON config file overriding the run sizes below.
    #[clap(long)]
    config: Option<PathBuf>,
}

struct StandardNormal;

fn sample_normal(rng: &mut dyn RngCore, mean: f64, sd: f64) -> f64 {
    Normal::new(mean, sd).unwrap().sample(rng)
}

impl Model for StandardNormal {
    fn sample_prior(&self, rng: &mut dyn RngCore) -> Theta {
        Theta::new(vec![Component::scalar_real(sample_normal(rng, 0.0, 5.0))])
    }

    fn prior_loglike(&self, theta: &Theta) -> f64 {
        let x = theta.flatten()[0];
        let sd = 5.0;
        -0.5 * (x / sd).powi(2) - (sd * (2.0 * std::f64::consts::PI).sqrt()).ln()
    }

    fn loglike(&self, theta: &Theta) -> f64 {
        let x = theta.flatten()[0];
        -0.5 * x * x - (2.0 * std::f64::consts::PI).sqrt().ln()
    }

    fn names(&self) -> Vec<String> {
        vec!["x".to_string()]
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    let cfg: DemoConfig = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path).expect("read config")).expect("parse config"),
        None => DemoConfig::default(),
    };

    let config = SamplerConfig {
        n_groups: cfg.n_groups,
        particles_per_group: cfg.particles_per_group,
        n_iter: cfg.n_iter,
        n_initial: 1,
        burnin: cfg.burnin,
        bounds: vec![(-20.0, 20.0)],
        gamma_policy: GammaPolicy::Fixed,
        crossover_prob: 0.1,
        migration_prob: 0.1,
        migration_interval: 10,
        snooker_prob: 0.1,
        blocking: None,
        update_rule: UpdateRule::Mh,
        jitter_bound: 1e-3,
    };

    let model = StandardNormal;
    let sampler = Sampler::new(&model, config).expect("valid configuration");
    let cancel = demcmc::CancelToken::new();

    let result = sampler
        .run(cfg.seed, &cancel, |p| {
            if p.iteration % 2_000 == 0 {
                log::info!("iter {} acceptance_rate={:.3} best_weight={:.3}", p.iteration, p.acceptance_rate, p.best_weight);
            }
        })
        .expect("run should not error on a valid model");

    match result {
        RunResult::Sampled(sampled) => {
            let post = sampled.post_burnin();
            let x_index = sampled.names.iter().position(|n| n == "x").unwrap();
            let values: Vec<f64> = post.slice(ndarray::s![.., x_index, ..]).iter().copied().collect();
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
            println!("post-burnin mean = {mean:.4}, variance = {var:.4}");
        }
        RunResult::Optimized(_) => unreachable!("demo is configured for MH sampling"),
    }
}
