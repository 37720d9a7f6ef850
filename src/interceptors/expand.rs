use crate::error::DispatchError;
use crate::message::Body;
use crate::providers::{StorageProvider, ID_FIELD, RESULTS_FIELD};
use crate::registry::{Interception, Interceptor, InterceptorInput};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

/// Query parameter listing the fields to expand.
pub const EXPAND_PARAMETER: &str = "expand";
/// Field naming the class a reference points into.
pub const CLASS_FIELD: &str = "_class";
/// Field marking an object as a reference (`"_type": "reference"`).
pub const TYPE_FIELD: &str = "_type";
pub const REFERENCE_TYPE: &str = "reference";

/// Replaces references named in the `expand` parameter with the objects they
/// point to.
///
/// A reference is an object holding exactly `_type: "reference"`, `_class` and
/// `_id`. `expand=author,publisher(owner)` expands `author` and `publisher`,
/// then `owner` inside whatever `publisher` turned into. Objects that are not
/// references are kept as they are, though nested fields inside them are still
/// expanded.
///
/// Query replies are expanded element by element inside `results`; an element
/// whose reference cannot be fetched is replaced by that error's
/// `{code, message}` body. On a single item the error fails the request.
#[derive(Debug, Default, Clone, Copy)]
pub struct Expander;

impl Expander {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Interceptor for Expander {
    async fn intercept(&self, input: InterceptorInput) -> Result<Interception, DispatchError> {
        let Some(config) = input.request.parameter(EXPAND_PARAMETER) else {
            return Ok(Interception::pass());
        };
        let fields = parse_fields(config)?;
        let storage = input.storage.as_ref();

        let mut response = input.response;
        if let Some(Value::Array(results)) = response.body.get_mut(RESULTS_FIELD) {
            for element in results.iter_mut() {
                let outcome = match element {
                    Value::Object(item) => expand_item(storage, item, &fields).await,
                    _ => continue,
                };
                if let Err(e) = outcome {
                    debug!(error = %e, "Reference not expanded");
                    *element = Value::Object(e.to_body());
                }
            }
        } else {
            expand_item(storage, &mut response.body, &fields).await?;
        }
        Ok(Interception::pass().with_response(response))
    }

    fn name(&self) -> &str {
        "Expander"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ExpandField {
    name: String,
    children: Vec<ExpandField>,
}

/// Parses `a,b(c,d(e))` into a field tree.
fn parse_fields(config: &str) -> Result<Vec<ExpandField>, DispatchError> {
    let invalid = || DispatchError::BadRequest("Expand config is not valid.".into());

    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in config.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or_else(invalid)?,
            ',' if depth == 0 => {
                pieces.push(&config[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(invalid());
    }
    pieces.push(&config[start..]);

    let mut fields = Vec::new();
    for piece in pieces.into_iter().map(str::trim).filter(|p| !p.is_empty()) {
        let field = match (piece.find('('), piece.rfind(')')) {
            (Some(open), Some(close)) if close == piece.len() - 1 => ExpandField {
                name: piece[..open].trim().to_string(),
                children: parse_fields(&piece[open + 1..close])?,
            },
            (None, None) => ExpandField {
                name: piece.to_string(),
                children: Vec::new(),
            },
            _ => return Err(invalid()),
        };
        fields.push(field);
    }
    Ok(fields)
}

/// `(class, id)` when `object` is a reference.
fn reference_target(object: &Body) -> Option<(&str, &str)> {
    if object.len() != 3 || object.get(TYPE_FIELD).and_then(Value::as_str) != Some(REFERENCE_TYPE) {
        return None;
    }
    let class = object.get(CLASS_FIELD).and_then(Value::as_str)?;
    let id = object.get(ID_FIELD).and_then(Value::as_str)?;
    Some((class, id))
}

type ExpandFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send + 'a>>;

fn expand_item<'a>(
    storage: &'a dyn StorageProvider,
    item: &'a mut Body,
    fields: &'a [ExpandField],
) -> ExpandFuture<'a> {
    Box::pin(async move {
        for field in fields {
            let Some(Value::Object(object)) = item.get(&field.name) else {
                continue;
            };
            let mut expanded = match reference_target(object) {
                Some((class, id)) => storage.get(class, id).await?,
                None => object.clone(),
            };
            if !field.children.is_empty() {
                expand_item(storage, &mut expanded, &field.children).await?;
            }
            item.insert(field.name.clone(), Value::Object(expanded));
        }
        Ok(())
    })
}
