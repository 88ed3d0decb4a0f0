#![forbid(unsafe_code)]

//! Viewport scaling resolver.
//!
//! The engine can only reject a viewport after trying to lay the document
//! out in it, so picking a viewport is a retry loop: build a transform over
//! the remaining candidates, attempt, and on failure drop the candidate that
//! transform chose. Every failed attempt removes exactly one candidate, so
//! the loop runs at most `candidates.len()` times.
//!
//! # Outcomes
//!
//! | Situation                                   | Result                               |
//! |---------------------------------------------|--------------------------------------|
//! | Autosizing metrics, or no candidates        | one unscaled attempt                 |
//! | Attempt succeeds                            | `Ok`, chosen candidate removed       |
//! | Attempt fails, chosen candidate in list     | candidate removed, next attempt      |
//! | Attempt fails, chosen candidate not in list | `Err(ChosenSpecificationMissing)`    |
//! | Attempt fails, list now empty               | `Err(Exhausted)`                     |

use vhb_core::{Metrics, MetricsTransform, ScalingOptions, ViewportSpecification};

use crate::error::ResolveError;

/// Builds the transform for one attempt.
pub type TransformBuilder = Box<dyn Fn(&Metrics, &ScalingOptions) -> MetricsTransform>;

/// Successful resolution.
#[derive(Debug)]
pub struct Resolved<R> {
    pub value: R,
    /// Transform the successful attempt ran under.
    pub transform: MetricsTransform,
    pub attempts: usize,
    /// Candidates never tried.
    pub remaining: Vec<ViewportSpecification>,
}

/// Runs the candidate retry loop.
pub struct ViewportResolver {
    builder: TransformBuilder,
}

impl Default for ViewportResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewportResolver {
    pub fn new() -> Self {
        Self {
            builder: Box::new(MetricsTransform::with_scaling),
        }
    }

    /// Replace the transform builder.
    #[must_use]
    pub fn with_transform_builder(
        mut self,
        builder: impl Fn(&Metrics, &ScalingOptions) -> MetricsTransform + 'static,
    ) -> Self {
        self.builder = Box::new(builder);
        self
    }

    /// Resolve a viewport for `metrics`.
    ///
    /// `attempt` is called with each candidate transform and returns `None`
    /// to reject it.
    pub fn resolve<R>(
        &self,
        metrics: &Metrics,
        options: Option<ScalingOptions>,
        mut attempt: impl FnMut(&MetricsTransform) -> Option<R>,
    ) -> Result<Resolved<R>, ResolveError> {
        let mut options = match options {
            Some(options) if !metrics.is_autosizing() && !options.is_empty() => options,
            _ => {
                let transform = MetricsTransform::new(metrics);
                return match attempt(&transform) {
                    Some(value) => Ok(Resolved {
                        value,
                        transform,
                        attempts: 1,
                        remaining: Vec::new(),
                    }),
                    None => {
                        tracing::warn!(
                            target: "vhb.viewport",
                            autosizing = metrics.is_autosizing(),
                            "unscaled viewport rejected"
                        );
                        Err(ResolveError::Exhausted { attempts: 1 })
                    }
                };
            }
        };

        let mut attempts = 0;
        loop {
            let transform = (self.builder)(metrics, &options);
            attempts += 1;
            let chosen = transform.chosen_specification().cloned();

            if let Some(value) = attempt(&transform) {
                if let Some(spec) = &chosen {
                    options.remove(spec);
                }
                tracing::debug!(
                    target: "vhb.viewport",
                    attempts,
                    remaining = options.specifications.len(),
                    "viewport resolved"
                );
                return Ok(Resolved {
                    value,
                    transform,
                    attempts,
                    remaining: options.specifications,
                });
            }

            let Some(spec) = chosen else {
                tracing::warn!(
                    target: "vhb.viewport",
                    attempts,
                    "rejected transform chose no specification"
                );
                return Err(ResolveError::ChosenSpecificationMissing {
                    spec: None,
                    attempts,
                });
            };
            if !options.remove(&spec) {
                tracing::warn!(
                    target: "vhb.viewport",
                    spec = %spec,
                    attempts,
                    "chosen specification not among remaining candidates"
                );
                return Err(ResolveError::ChosenSpecificationMissing {
                    spec: Some(spec),
                    attempts,
                });
            }
            tracing::warn!(
                target: "vhb.viewport",
                spec = %spec,
                attempts,
                remaining = options.specifications.len(),
                "viewport specification rejected, retrying"
            );
            if options.is_empty() {
                return Err(ResolveError::Exhausted { attempts });
            }
        }
    }
}

impl core::fmt::Debug for ViewportResolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ViewportResolver").finish_non_exhaustive()
    }
}
