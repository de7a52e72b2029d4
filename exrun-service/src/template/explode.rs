// Template Explosion
// Expands `%explode` markers into the cartesian product of concrete documents

use crate::document::names;
use crate::document::Document;
use crate::error::{ServiceError, ServiceResult};

use serde_json::{Map, Value};

/// Result of exploding one node
#[derive(Debug)]
enum Expansion {
    /// No marker below this node
    Single(Document),
    /// The node expanded into these variants
    Variants(Vec<Document>),
}

/// Expand a template into every concrete document it describes.
///
/// The first exploding key varies slowest. Every returned document is an
/// independent copy.
pub fn explode(template: &Document) -> ServiceResult<Vec<Document>> {
    match explode_node(template)? {
        Expansion::Single(document) => Ok(vec![document]),
        Expansion::Variants(variants) => Ok(variants),
    }
}

fn explode_node(node: &Document) -> ServiceResult<Expansion> {
    match node {
        Value::Object(map) => match map.get(names::EXPLODE) {
            Some(Value::Array(variants)) => {
                let mut exploded = Vec::with_capacity(variants.len());
                for variant in variants {
                    match explode_node(variant)? {
                        Expansion::Single(document) => exploded.push(document),
                        Expansion::Variants(more) => exploded.extend(more),
                    }
                }
                Ok(Expansion::Variants(exploded))
            }
            Some(other) => Err(ServiceError::ConfigShape(format!(
                "'{}' expects a sequence, found {}",
                names::EXPLODE,
                other
            ))),
            None => explode_mapping(map),
        },
        Value::Array(items) => explode_sequence(items),
        scalar => Ok(Expansion::Single(scalar.clone())),
    }
}

fn explode_mapping(map: &Map<String, Value>) -> ServiceResult<Expansion> {
    let mut base = Map::with_capacity(map.len());
    let mut axes: Vec<(String, Vec<Document>)> = Vec::new();

    for (key, value) in map {
        match explode_node(value)? {
            Expansion::Single(document) => {
                base.insert(key.clone(), document);
            }
            Expansion::Variants(variants) => {
                // placeholder keeps the key in its original position
                base.insert(key.clone(), Value::Null);
                axes.push((key.clone(), variants));
            }
        }
    }

    if axes.is_empty() {
        return Ok(Expansion::Single(Value::Object(base)));
    }

    let mut combinations = vec![base];
    for (key, variants) in &axes {
        combinations = combinations
            .iter()
            .flat_map(|partial| {
                variants.iter().map(move |variant| {
                    let mut next = partial.clone();
                    next.insert(key.clone(), variant.clone());
                    next
                })
            })
            .collect();
    }

    Ok(Expansion::Variants(
        combinations.into_iter().map(Value::Object).collect(),
    ))
}

fn explode_sequence(items: &[Value]) -> ServiceResult<Expansion> {
    let mut base = Vec::with_capacity(items.len());
    let mut axes: Vec<(usize, Vec<Document>)> = Vec::new();

    for (index, item) in items.iter().enumerate() {
        match explode_node(item)? {
            Expansion::Single(document) => base.push(document),
            Expansion::Variants(variants) => {
                base.push(Value::Null);
                axes.push((index, variants));
            }
        }
    }

    if axes.is_empty() {
        return Ok(Expansion::Single(Value::Array(base)));
    }

    let mut combinations = vec![base];
    for (index, variants) in &axes {
        let index = *index;
        combinations = combinations
            .iter()
            .flat_map(|partial| {
                variants.iter().map(move |variant| {
                    let mut next = partial.clone();
                    next[index] = variant.clone();
                    next
                })
            })
            .collect();
    }

    Ok(Expansion::Variants(
        combinations.into_iter().map(Value::Array).collect(),
    ))
}
