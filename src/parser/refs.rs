//! Anchors and references over one fully expanded tree.
//!
//! Every module boundary (the root and each slot map) carries an `_anchor`. `$` names the
//! innermost enclosing boundary, `$$` its parent and so on; any other anchor name is visible
//! across the whole tree. A reference is a string value naming one or more anchored paths,
//! optionally followed by a transform:
//!
//! - `@anchor.path` copies the value at the path
//! - `@a.x, @b.y @lambda x, y: x + y` applies the transform to the inputs
//! - `@lambda _: 3` evaluates a transform with no input
//!
//! References are evaluated as a dependency graph: a reference waits while any unresolved
//! reference targets one of its inputs, or something above or below it.

use crate::error::{ConfigError, Result};
use crate::expr::Evaluator;
use crate::syntax::{
    ANCHOR_KEY, GLOBAL_ANCHOR, GLOBAL_KEY, LAMBDA_MARKER, NAME_KEY, NO_INPUT, SELF_ANCHOR,
    SUBMODULE_SIGIL, is_bare_reference, is_slot_key,
};
use crate::trace::{Trace, canonicalize, get, set};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
struct Reference {
    target: Trace,
    inputs: Vec<Option<Trace>>,
    /// `lambda params: body`, or `None` to copy the single input.
    transform: Option<String>,
}

/// What a reference may name from where it is written.
struct Scope<'a> {
    named: &'a BTreeMap<String, Trace>,
    /// Boundaries from the root down to the current value.
    boundaries: Vec<Trace>,
    global: bool,
}

impl Scope<'_> {
    fn anchor(&self, name: &str) -> Option<Trace> {
        if !name.is_empty() && name.chars().all(|c| c == '$') {
            let index = self.boundaries.len().checked_sub(name.len())?;
            return self.boundaries.get(index).cloned();
        }
        if self.global && (name == GLOBAL_ANCHOR || name == GLOBAL_KEY) {
            return Some(Trace::root().child(GLOBAL_KEY));
        }
        self.named.get(name).cloned()
    }
}

/// Resolve every reference in `tree` and strip the anchors.
///
/// `global` makes `~` and `_G` name the top-level `_G` map.
pub(super) fn resolve(mut tree: Value, global: bool, evaluator: &dyn Evaluator) -> Result<Value> {
    let mut named = BTreeMap::new();
    collect_anchors(&tree, &Trace::root(), true, &mut named)?;

    let mut scope = Scope {
        named: &named,
        boundaries: vec![Trace::root()],
        global,
    };
    let mut references = Vec::new();
    collect_references(&tree, &tree, &Trace::root(), &mut scope, &mut references)?;
    if !references.is_empty() {
        debug!(references = references.len(), anchors = named.len(), "resolving references");
    }

    evaluate(&mut tree, references, evaluator)?;
    strip_anchors(&mut tree);
    Ok(tree)
}

fn collect_anchors(
    value: &Value,
    trace: &Trace,
    boundary: bool,
    named: &mut BTreeMap<String, Trace>,
) -> Result<()> {
    match value {
        Value::Object(map) => {
            if let Some(anchor) = map.get(ANCHOR_KEY) {
                if !boundary {
                    return Err(ConfigError::invalid(format!(
                        "'{}' is only allowed on a module, found at '{}'",
                        ANCHOR_KEY, trace
                    )));
                }
                let Some(name) = anchor.as_str() else {
                    return Err(ConfigError::invalid(format!(
                        "'{}' must be a string, got {}",
                        ANCHOR_KEY, anchor
                    )));
                };
                if name != SELF_ANCHOR {
                    if let Some(previous) = named.insert(name.to_string(), trace.clone()) {
                        return Err(ConfigError::invalid(format!(
                            "the anchor '{}' is declared at both '{}' and '{}'",
                            name, previous, trace
                        )));
                    }
                }
            }
            for (key, child) in map {
                if key != ANCHOR_KEY {
                    collect_anchors(child, &trace.child(key.as_str()), is_slot_key(key), named)?;
                }
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                collect_anchors(child, &trace.child(i.to_string()), false, named)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn collect_references(
    root: &Value,
    value: &Value,
    trace: &Trace,
    scope: &mut Scope<'_>,
    references: &mut Vec<Reference>,
) -> Result<()> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key == ANCHOR_KEY || key == NAME_KEY {
                    continue;
                }
                let child_trace = trace.child(key.as_str());
                let boundary = is_slot_key(key) && child.is_object();
                if boundary {
                    scope.boundaries.push(child_trace.clone());
                }
                let collected = collect_references(root, child, &child_trace, scope, references);
                if boundary {
                    scope.boundaries.pop();
                }
                collected?;
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                collect_references(root, child, &trace.child(i.to_string()), scope, references)?;
            }
        }
        Value::String(text) => {
            if let Some(reference) = parse_reference(text, trace, scope, root)? {
                references.push(reference);
            }
        }
        _ => {}
    }
    Ok(())
}

/// Recognize a reference string. Strings that merely start with `@` are left alone.
fn parse_reference(
    text: &str,
    target: &Trace,
    scope: &Scope<'_>,
    root: &Value,
) -> Result<Option<Reference>> {
    let text = text.trim();
    if !text.starts_with(SUBMODULE_SIGIL) {
        return Ok(None);
    }
    let reference = |inputs, transform| {
        Ok(Some(Reference {
            target: target.clone(),
            inputs,
            transform,
        }))
    };

    if let Some((head, tail)) = text.split_once(LAMBDA_MARKER) {
        let head = head.trim();
        let tail = tail.trim();
        if head.is_empty() {
            // `@lambda @anchor.path` is a plain copy
            if tail.starts_with(SUBMODULE_SIGIL) {
                let input = resolve_input(tail, scope, root)?;
                return reference(vec![Some(input)], None);
            }
            return reference(vec![None], Some(format!("lambda {}", tail)));
        }
        let inputs = head
            .split(',')
            .map(|input| {
                let input = input.trim();
                if input == NO_INPUT {
                    Ok(None)
                } else {
                    resolve_input(input, scope, root).map(Some)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        return reference(inputs, Some(format!("lambda {}", tail)));
    }

    if !is_bare_reference(text) {
        return Ok(None);
    }
    let anchor = text[1..].split('.').next().unwrap_or_default();
    if scope.anchor(anchor).is_none() {
        return Ok(None);
    }
    let input = resolve_input(text, scope, root)?;
    reference(vec![Some(input)], None)
}

/// Turn `@anchor.path` into a canonical trace from the root.
fn resolve_input(text: &str, scope: &Scope<'_>, root: &Value) -> Result<Trace> {
    let Some(body) = text.strip_prefix(SUBMODULE_SIGIL) else {
        return Err(ConfigError::invalid(format!(
            "the reference input '{}' must start with '{}'",
            text, SUBMODULE_SIGIL
        )));
    };
    let path = Trace::parse(body);
    let Some((anchor, rest)) = path.segments().split_first() else {
        return Err(ConfigError::invalid(format!("the reference '{}' is empty", text)));
    };
    if rest.is_empty() {
        return Err(ConfigError::invalid(format!(
            "the reference '{}' must name an anchor and a path below it",
            text
        )));
    }
    let base = scope.anchor(anchor).ok_or_else(|| {
        ConfigError::key_not_found(format!(
            "the anchor '{}' of reference '{}' is not declared or not in scope",
            anchor, text
        ))
    })?;
    canonicalize(&base.join(&Trace::from_segments(rest.iter().cloned())), root)
}

fn overlaps(a: &Trace, b: &Trace) -> bool {
    a == b || a.is_ancestor_of(b) || b.is_ancestor_of(a)
}

fn evaluate(tree: &mut Value, references: Vec<Reference>, evaluator: &dyn Evaluator) -> Result<()> {
    let mut pending = references;
    while !pending.is_empty() {
        let ready: Vec<bool> = pending
            .iter()
            .map(|reference| {
                reference
                    .inputs
                    .iter()
                    .flatten()
                    .all(|input| !pending.iter().any(|p| overlaps(&p.target, input)))
            })
            .collect();
        if !ready.contains(&true) {
            let targets: Vec<String> = pending.iter().map(|r| r.target.to_string()).collect();
            return Err(ConfigError::CircularReference(targets.join(", ")));
        }

        let mut waiting = Vec::new();
        for (reference, ready) in pending.into_iter().zip(ready) {
            if !ready {
                waiting.push(reference);
                continue;
            }
            let args = reference
                .inputs
                .iter()
                .map(|input| match input {
                    Some(trace) => get(tree, trace).cloned(),
                    None => Ok(Value::Null),
                })
                .collect::<Result<Vec<_>>>()?;
            let value = match reference.transform {
                Some(ref expr) => evaluator
                    .evaluate(expr, &args)
                    .map_err(|e| e.within(&reference.target.to_string()))?,
                None => args.into_iter().next().unwrap_or(Value::Null),
            };
            set(tree, &reference.target, value)?;
        }
        pending = waiting;
    }
    Ok(())
}

fn strip_anchors(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove(ANCHOR_KEY);
            map.values_mut().for_each(strip_anchors);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_anchors),
        _ => {}
    }
}
