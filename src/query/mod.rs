//! Query translator: parse the query language, compile it into engine
//! primitives, execute, and stream decoded payloads back.

mod dates;
mod errors;
mod parser;
mod translate;

pub use dates::parse_date_expr;
pub use errors::{QueryError, QueryResult};
pub use parser::{BoolField, QueryAtom, parse_query};
pub use translate::{SearchMeta, SearchRequest, SearchResponse, SortOrder, compile, search};
