//! Closed-world dispatch of `$function` directives.
//!
//! A [`Registry`] maps allow-listed names to plain function pointers. The name
//! is looked up before anything else happens, so an unknown function fails
//! without resolving arguments or calling into the solver.

use crate::error::{JobError, Result};
use crate::kwargs::{Directive, Interpolation, Kwargs};
use nalgebra::Vector3;
use std::collections::BTreeMap;
use tracing::debug;

/// A registered routine. `C` is the implicit first argument, `O` the result.
pub type Handler<C, O> = fn(&C, Kwargs) -> Result<O>;

pub struct Registry<C, O> {
    context: &'static str,
    handlers: BTreeMap<&'static str, Handler<C, O>>,
}

impl<C, O> Registry<C, O> {
    /// `context` names the namespace in error messages, e.g. `"postscf"`.
    pub fn new(context: &'static str) -> Self {
        Registry {
            context,
            handlers: BTreeMap::new(),
        }
    }

    pub fn register(mut self, name: &'static str, handler: Handler<C, O>) -> Self {
        self.handlers.insert(name, handler);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    pub fn lookup(&self, name: &str) -> Result<Handler<C, O>> {
        self.handlers
            .get(name)
            .copied()
            .ok_or_else(|| JobError::unknown_function(self.context, name))
    }

    /// Looks up `directive.function`, resolves its `$kwargs` and calls the handler.
    pub fn dispatch(
        &self,
        target: &C,
        directive: &Directive,
        interpolation: &Interpolation,
    ) -> Result<O> {
        let handler = self.lookup(&directive.function)?;
        directive.ensure_no_options()?;
        let kwargs = directive.resolve_kwargs(interpolation)?;
        debug!(
            "Dispatching {} function '{}' with arguments {:?}",
            self.context,
            directive.function,
            kwargs.keys().collect::<Vec<_>>()
        );
        handler(target, kwargs)
    }
}

/// Explicit sequence of k-points (fractional reciprocal coordinates).
#[derive(Debug, Clone, PartialEq)]
pub struct KPath {
    points: Vec<Vector3<f64>>,
}

impl KPath {
    pub fn new(path: &str, points: Vec<Vector3<f64>>) -> Result<Self> {
        if points.is_empty() {
            return Err(JobError::config(path, "kpath needs at least one k-point"));
        }
        Ok(KPath { points })
    }

    /// Removes the mandatory `kpath` argument from `kwargs` and wraps it.
    pub fn take_from(kwargs: &mut Kwargs) -> Result<Self> {
        let path = kwargs.key_path("kpath");
        let points: Vec<Vector3<f64>> = kwargs
            .take_as("kpath")?
            .ok_or_else(|| JobError::config(&path, "kpath is not provided"))?;
        KPath::new(&path, points)
    }

    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn coordinates(&self) -> Vec<[f64; 3]> {
        self.points.iter().map(|k| [k.x, k.y, k.z]).collect()
    }
}
