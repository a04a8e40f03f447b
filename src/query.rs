//! Query Engine.
//!
//! Evaluates equality/object-shape predicates and structured query options
//! (sort, skip, limit, projection) against arrays (spec.md §4.10).

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::document::deep_equal;

/// A predicate form. Host languages with first-class closures pass an
/// opaque callable straight through (spec.md §9); this crate accepts a
/// structured equality predicate directly and an opaque Rust closure for
/// everything else.
pub enum Predicate<'a> {
    Shape(Value),
    Callable(Box<dyn Fn(&Value) -> bool + 'a>),
}

impl<'a> Predicate<'a> {
    pub fn shape(value: Value) -> Self {
        Predicate::Shape(value)
    }

    pub fn callable<F: Fn(&Value) -> bool + 'a>(f: F) -> Self {
        Predicate::Callable(Box::new(f))
    }

    pub fn matches(&self, element: &Value) -> bool {
        match self {
            Predicate::Shape(shape) => matches_shape(shape, element),
            Predicate::Callable(f) => f(element),
        }
    }
}

/// A mapping predicate matches when every field of the predicate
/// deep-equals the corresponding field of the element. Nested keys inside
/// the predicate are literal object traversal, not dot-path expansion.
fn matches_shape(shape: &Value, element: &Value) -> bool {
    let (Value::Object(shape_fields), Value::Object(element_fields)) = (shape, element) else {
        return deep_equal(shape, element);
    };
    shape_fields.iter().all(|(key, expected)| {
        element_fields
            .get(key)
            .is_some_and(|actual| deep_equal(expected, actual))
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

pub enum Sort<'a> {
    /// `{field: 1 | -1}` applied in insertion order of keys, stable
    /// multi-field sort.
    Fields(Vec<(String, SortDirection)>),
    Comparator(Box<dyn Fn(&Value, &Value) -> Ordering + 'a>),
}

#[derive(Default)]
pub struct QueryOptions<'a> {
    pub sort: Option<Sort<'a>>,
    pub skip: usize,
    pub limit: Option<usize>,
    pub select: Option<Vec<String>>,
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or(0.0)
            .partial_cmp(&y.as_f64().unwrap_or(0.0))
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn sort_elements(elements: &mut [Value], sort: &Sort) {
    match sort {
        Sort::Comparator(cmp) => elements.sort_by(|a, b| cmp(a, b)),
        Sort::Fields(fields) => {
            elements.sort_by(|a, b| {
                for (field, direction) in fields {
                    let av = a.get(field).cloned().unwrap_or(Value::Null);
                    let bv = b.get(field).cloned().unwrap_or(Value::Null);
                    let ord = compare_values(&av, &bv);
                    let ord = match direction {
                        SortDirection::Ascending => ord,
                        SortDirection::Descending => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }
    }
}

fn project(element: &Value, select: &[String]) -> Value {
    let Value::Object(fields) = element else {
        return element.clone();
    };
    let mut projected = Map::new();
    for key in select {
        if let Some(v) = fields.get(key) {
            projected.insert(key.clone(), v.clone());
        }
    }
    Value::Object(projected)
}

/// Returns the first matching element, in iteration order.
pub fn find_one<'a>(array: &'a [Value], predicate: &Predicate) -> Option<&'a Value> {
    array.iter().find(|elem| predicate.matches(elem))
}

/// Filters `array` by `predicate`, then applies sort, skip, limit, select
/// in that order (spec.md §4.10).
pub fn find(array: &[Value], predicate: &Predicate, opts: &QueryOptions) -> Vec<Value> {
    let mut matched: Vec<Value> = array
        .iter()
        .filter(|elem| predicate.matches(elem))
        .cloned()
        .collect();

    if let Some(sort) = &opts.sort {
        sort_elements(&mut matched, sort);
    }

    let skipped: Vec<Value> = matched.into_iter().skip(opts.skip).collect();
    let limited: Vec<Value> = match opts.limit {
        Some(n) => skipped.into_iter().take(n).collect(),
        None => skipped,
    };

    match &opts.select {
        Some(fields) => limited.iter().map(|e| project(e, fields)).collect(),
        None => limited,
    }
}
