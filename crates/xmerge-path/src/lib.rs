//! # xmerge-path
//!
//! The path-query language used by merge criteria and handling guards.
//!
//! Queries are a relative XPath 1.0 subset evaluated against a single
//! element: child, attribute, self and descendant axes, name and node-type
//! tests, predicates, unions, comparisons, arithmetic, and the core string,
//! number and boolean functions. Results are returned as [`Item`]s whose
//! [`canonical`](Item::canonical) form is what value comparison uses.
//!
//! ```
//! use xmerge_dom::parse_str;
//! use xmerge_path::{select, test};
//!
//! let b = parse_str(r#"<B id="1"><C/></B>"#).unwrap();
//! assert_eq!(select("@id", &b).unwrap()[0].canonical(), "id=\"1\"");
//! assert!(test("count(C) = 1", &b).unwrap());
//! ```

pub mod error;
pub mod eval;
mod lexer;
mod parser;

pub use error::{PathError, PathResult};
pub use eval::{format_number, select, test, Item, Query};
