//! Transform expressions used by references and search generators.
//!
//! The resolver only sees the [`Evaluator`] trait: it hands over the expression text
//! (`lambda x, y: x + y`) and the resolved inputs in declared order. [`LambdaEvaluator`] is the
//! default implementation, a small pure expression language with Python-flavoured syntax:
//!
//! ```
//! use config_graph::expr::{Evaluator, LambdaEvaluator};
//! use serde_json::json;
//!
//! let evaluator = LambdaEvaluator::new();
//! let value = evaluator
//!     .evaluate("lambda x, y: [x * i for i in range(y)]", &[json!(2), json!(3)])
//!     .unwrap();
//! assert_eq!(value, json!([0, 2, 4]));
//! ```

mod eval;
mod lexer;
mod parser;

use crate::error::{ConfigError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A host function callable from expressions by name.
pub type NativeFunction = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Evaluates transform expressions. Evaluation must be synchronous and pure.
pub trait Evaluator: Send + Sync {
    /// Apply `expr` (a `lambda params: body` text) to positional `args`.
    fn evaluate(&self, expr: &str, args: &[Value]) -> Result<Value>;
}

/// The built-in expression language, optionally extended with native functions.
#[derive(Clone, Default)]
pub struct LambdaEvaluator {
    functions: HashMap<String, NativeFunction>,
}

impl fmt::Debug for LambdaEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("LambdaEvaluator")
            .field("functions", &names)
            .finish()
    }
}

impl LambdaEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native function. It shadows a builtin of the same name.
    pub fn with_function(
        mut self,
        name: impl Into<String>,
        function: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }
}

impl Evaluator for LambdaEvaluator {
    fn evaluate(&self, expr: &str, args: &[Value]) -> Result<Value> {
        let lambda = parser::parse_lambda(expr.trim())?;
        if lambda.params.len() != args.len() {
            return Err(ConfigError::expression(format!(
                "'{}' takes {} argument(s) but {} were given",
                expr,
                lambda.params.len(),
                args.len()
            )));
        }
        let mut scope = eval::Scope::new(&self.functions);
        for (param, arg) in lambda.params.iter().zip(args) {
            scope.bind(param, arg.clone());
        }
        eval::eval(&lambda.body, &mut scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_evaluate_lambda() {
        let evaluator = LambdaEvaluator::new();
        assert_eq!(
            evaluator.evaluate("lambda x: x+1", &[json!(5)]).unwrap(),
            json!(6)
        );
        assert_eq!(
            evaluator
                .evaluate("lambda _: list(range(4))", &[Value::Null])
                .unwrap(),
            json!([0, 1, 2, 3])
        );
        assert_eq!(
            evaluator
                .evaluate("lambda a, b: a + '_' + b", &[json!("bert"), json!("base")])
                .unwrap(),
            json!("bert_base")
        );
    }

    #[test]
    fn test_arity_mismatch() {
        let evaluator = LambdaEvaluator::new();
        let err = evaluator
            .evaluate("lambda x, y: x", &[json!(1)])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Expression(_)));
    }

    #[test]
    fn test_deep_nesting_is_an_error() {
        let evaluator = LambdaEvaluator::new();
        for depth in [2_000, 10_000] {
            let expr = format!("lambda _: {}1{}", "(".repeat(depth), ")".repeat(depth));
            let err = evaluator.evaluate(&expr, &[Value::Null]).unwrap_err();
            assert!(matches!(err, ConfigError::Expression(_)));
        }
        let sum = format!("lambda x: x{}", " + x".repeat(2_000));
        assert!(evaluator.evaluate(&sum, &[json!(1)]).is_err());
    }

    #[test]
    fn test_native_function() {
        let evaluator = LambdaEvaluator::new().with_function("double", |args: &[Value]| {
            let n = args.first().and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(n * 2))
        });
        assert_eq!(
            evaluator.evaluate("lambda x: double(x) + 1", &[json!(4)]).unwrap(),
            json!(9)
        );
        assert!(format!("{:?}", evaluator).contains("double"));
    }
}
