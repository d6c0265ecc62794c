//! `_search` grids: fan a module out over the Cartesian product of candidate values.

use super::{Parser, cartesian};
use crate::error::{ConfigError, Result};
use crate::syntax::LAMBDA_MARKER;
use crate::trace::{Trace, canonicalize, set};
use serde_json::{Map, Value};
use tracing::debug;

impl Parser<'_> {
    /// Expand one combined module over its search grid.
    ///
    /// Keys are canonicalized against `combined` and sorted, so the first canonical trace
    /// varies slowest. Every grid point is written into a copy of the module, which is then
    /// resolved again so that searched slot values expand like written ones.
    pub(super) fn expand_search(
        &self,
        combined: Map<String, Value>,
        search: &Map<String, Value>,
        type_name: &str,
        depth: usize,
    ) -> Result<Vec<Value>> {
        let tree = Value::Object(combined);
        let mut axes: Vec<(Trace, Vec<Value>)> = Vec::with_capacity(search.len());
        for (key, candidates) in search {
            let trace = canonicalize(&Trace::parse(key), &tree)?;
            axes.push((trace, self.search_values(key, candidates)?));
        }
        axes.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(pair) = axes.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(ConfigError::invalid(format!(
                "'{}' is searched more than once",
                pair[0].0
            )));
        }

        let points = cartesian(&axes);
        debug!(module = type_name, axes = axes.len(), points = points.len(), "expanding search");

        let mut results = Vec::new();
        for point in points {
            let mut candidate = tree.clone();
            for (trace, value) in point {
                set(&mut candidate, &trace, value)?;
            }
            results.extend(self.resolve_module(&candidate, type_name, depth + 1, false)?);
        }
        Ok(results)
    }

    /// Candidate values of one search key: a list, or a generator producing a list.
    fn search_values(&self, key: &str, candidates: &Value) -> Result<Vec<Value>> {
        match candidates {
            Value::Array(items) => items.iter().map(|item| self.generate(item)).collect(),
            Value::String(text) if generator_expression(text).is_some() => {
                match self.generate(candidates)? {
                    Value::Array(items) => Ok(items),
                    other => Err(ConfigError::invalid(format!(
                        "the search generator of '{}' must produce a list, got {}",
                        key, other
                    ))),
                }
            }
            other => Err(ConfigError::invalid(format!(
                "the search candidates of '{}' must be a list or a '{}' generator, got {}",
                key, LAMBDA_MARKER, other
            ))),
        }
    }

    /// Evaluate every generator string in a candidate value.
    fn generate(&self, value: &Value) -> Result<Value> {
        match value {
            Value::String(text) => match generator_expression(text) {
                Some(expr) => self.evaluator.evaluate(&expr, &[Value::Null]),
                None => Ok(value.clone()),
            },
            Value::Array(items) => items
                .iter()
                .map(|item| self.generate(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), self.generate(v)?)))
                .collect::<Result<Map<_, _>>>()
                .map(Value::Object),
            other => Ok(other.clone()),
        }
    }
}

/// `@lambda <params>: body` becomes `lambda _: body`; generators take no input.
fn generator_expression(text: &str) -> Option<String> {
    let rest = text.trim().strip_prefix(LAMBDA_MARKER)?;
    let (_, body) = rest.split_once(':')?;
    Some(format!("lambda _:{}", body))
}
