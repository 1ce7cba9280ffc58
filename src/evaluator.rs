//! Scores a proposed `theta` into a particle weight, respecting bounds and
//! the configured update rule.
//!
//! Every call into user-supplied model code goes through [`call_callback`]
//! or [`call_sample_prior`], which catch a panicking callback and turn it
//! into a [`DeMcmcError::UserCallback`] instead of taking the process down
//! (spec.md §7's `UserCallbackError`: "engine does not swallow").

use crate::bounds::Bounds;
use crate::error::DeMcmcError;
use crate::model::{Model, UpdateRule};
use crate::particle::Theta;
use rand::RngCore;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Suppresses the default panic hook's stderr write for the lifetime of the
/// guard, restoring the previous hook on drop. Installed once per
/// [`crate::Sampler::run`] call rather than per callback invocation -- a
/// user callback may panic millions of times across a run, and
/// `std::panic::set_hook`/`take_hook` both take a global lock, so swapping
/// hooks per-call would dominate the hot path. `catch_unwind` already turns
/// the panic into a [`DeMcmcError::UserCallback`] carrying the message, so
/// nothing is lost by not also printing it.
type PanicHook = Box<dyn Fn(&std::panic::PanicHookInfo<'_>) + Sync + Send + 'static>;

pub(crate) struct SilentPanicGuard {
    previous: Option<PanicHook>,
}

impl SilentPanicGuard {
    pub(crate) fn install() -> Self {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));
        SilentPanicGuard { previous: Some(previous) }
    }
}

impl Drop for SilentPanicGuard {
    fn drop(&mut self) {
        if let Some(hook) = self.previous.take() {
            std::panic::set_hook(hook);
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "user callback panicked with a non-string payload".to_string()
    }
}

fn call_callback(theta: &Theta, f: impl FnOnce() -> f64) -> Result<f64, DeMcmcError> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| DeMcmcError::UserCallback {
        theta: Some(theta.clone()),
        message: panic_message(payload),
    })
}

/// Wraps `Model::sample_prior`, the one callback invoked before any `theta`
/// exists to attach to an error.
pub fn call_sample_prior(model: &dyn Model, rng: &mut dyn RngCore) -> Result<Theta, DeMcmcError> {
    catch_unwind(AssertUnwindSafe(|| model.sample_prior(rng))).map_err(|payload| DeMcmcError::UserCallback {
        theta: None,
        message: panic_message(payload),
    })
}

/// Sampling-mode weight: `logprior + loglike` in bounds, `-inf` outside.
pub fn compute_posterior(model: &dyn Model, bounds: &Bounds, theta: &Theta) -> Result<f64, DeMcmcError> {
    if bounds.in_bounds(theta) {
        let prior = call_callback(theta, || model.prior_loglike(theta))?;
        let like = call_callback(theta, || model.loglike(theta))?;
        Ok(prior + like)
    } else {
        Ok(f64::NEG_INFINITY)
    }
}

/// Optimization-mode weight: `loglike` alone in bounds, `-inf`/`+inf`
/// outside depending on whether we are maximizing or minimizing.
pub fn evaluate_fun(model: &dyn Model, bounds: &Bounds, theta: &Theta, rule: UpdateRule) -> Result<f64, DeMcmcError> {
    if bounds.in_bounds(theta) {
        call_callback(theta, || model.loglike(theta))
    } else {
        Ok(match rule {
            UpdateRule::Maximize => f64::NEG_INFINITY,
            UpdateRule::Minimize => f64::INFINITY,
            UpdateRule::Mh => f64::NEG_INFINITY,
        })
    }
}

/// Scores a proposal the way the configured update rule expects: the full
/// posterior under MH, the bare objective under maximize/minimize.
pub fn score(model: &dyn Model, bounds: &Bounds, theta: &Theta, rule: UpdateRule) -> Result<f64, DeMcmcError> {
    match rule {
        UpdateRule::Mh => compute_posterior(model, bounds, theta),
        UpdateRule::Maximize | UpdateRule::Minimize => evaluate_fun(model, bounds, theta, rule),
    }
}
