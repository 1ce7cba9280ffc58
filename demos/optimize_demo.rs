//! Runs the maximize scenario from the engine's test suite as a standalone
//! binary: maximizes `-(x-1)^2 - (y+2)^2` over `[-10, 10]^2`, expecting the
//! incumbent to land near `(1, -2)`.

use clap::Parser;
use demcmc::{CancelToken, Component, GammaPolicy, Model, RunResult, Sampler, SamplerConfig, Theta, UpdateRule};
use rand::{Rng, RngCore};

#[derive(Parser, Debug)]
struct Args {
    #[clap(long, default_value_t = 42)]
    seed: u64,
    #[clap(long, default_value_t = 4_000)]
    n_iter: usize,
}

struct Paraboloid;

impl Model for Paraboloid {
    fn sample_prior(&self, rng: &mut dyn RngCore) -> Theta {
        let x = rng.gen_range(-10.0..10.0);
        let y = rng.gen_range(-10.0..10.0);
        Theta::new(vec![Component::scalar_real(x), Component::scalar_real(y)])
    }

    fn prior_loglike(&self, _theta: &Theta) -> f64 {
        -(20.0f64).ln() * 2.0
    }

    fn loglike(&self, theta: &Theta) -> f64 {
        let flat = theta.flatten();
        let (x, y) = (flat[0], flat[1]);
        -(x - 1.0).powi(2) - (y + 2.0).powi(2)
    }

    fn names(&self) -> Vec<String> {
        vec!["x".to_string(), "y".to_string()]
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = SamplerConfig {
        n_groups: 2,
        particles_per_group: 6,
        n_iter: args.n_iter,
        n_initial: 1,
        burnin: 0,
        bounds: vec![(-10.0, 10.0), (-10.0, 10.0)],
        gamma_policy: GammaPolicy::Fixed,
        crossover_prob: 0.1,
        migration_prob: 0.1,
        migration_interval: 20,
        snooker_prob: 0.1,
        blocking: None,
        update_rule: UpdateRule::Maximize,
        jitter_bound: 1e-3,
    };

    let model = Paraboloid;
    let sampler = Sampler::new(&model, config).expect("valid configuration");
    let cancel = CancelToken::new();

    let result = sampler
        .run(args.seed, &cancel, |p| {
            if p.iteration % 1_000 == 0 {
                log::info!("iter {} best_weight={:.5}", p.iteration, p.best_weight);
            }
        })
        .expect("run should not error on a valid model");

    match result {
        RunResult::Optimized(opt) => {
            let flat = opt.theta.flatten();
            println!("incumbent x={:.4} y={:.4} weight={:.6}", flat[0], flat[1], opt.weight);
        }
        RunResult::Sampled(_) => unreachable!("demo is configured for maximize"),
    }
}
