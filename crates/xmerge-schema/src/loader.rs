//! Decoding merge schemas from TOML and JSON documents.
//!
//! Field names follow the merge-schema vocabulary: a handling's target is
//! `for`, nested handlings are `handling`, criteria are `criterion` with an
//! `xpath` (or `query`) and an `ordered` flag.
//!
//! ```toml
//! namespace = "urn:example:app"
//!
//! [[handling]]
//! for = "bean"
//! unique = false
//!
//! [[handling.criterion]]
//! xpath = "@id"
//! ordered = true
//! ```

use xmerge_path::Query;
use xmerge_types::{Handling, Schema};

use crate::error::{SchemaError, SchemaResult};

/// Decode a schema from a TOML document.
pub fn schema_from_toml(text: &str) -> SchemaResult<Schema> {
    toml::from_str(text).map_err(|e| SchemaError::Toml(e.to_string()))
}

/// Decode a schema from a JSON document.
pub fn schema_from_json(text: &str) -> SchemaResult<Schema> {
    serde_json::from_str(text).map_err(|e| SchemaError::Json(e.to_string()))
}

/// Check that every guard and criterion query in `schema` compiles.
pub fn validate(schema: &Schema) -> SchemaResult<()> {
    if let Some(criterion) = &schema.default_criterion {
        check_query("", &criterion.query)?;
    }
    schema.handlings.iter().try_for_each(|h| validate_handling(h))
}

fn validate_handling(handling: &Handling) -> SchemaResult<()> {
    check_query(&handling.target, &handling.guard)?;
    for criterion in &handling.criteria {
        check_query(&handling.target, &criterion.query)?;
    }
    handling.children.iter().try_for_each(|h| validate_handling(h))
}

fn check_query(target: &str, query: &str) -> SchemaResult<()> {
    Query::compile(query)
        .map(|_| ())
        .map_err(|e| SchemaError::InvalidQuery {
            target: target.to_string(),
            query: query.to_string(),
            message: e.to_string(),
        })
}
