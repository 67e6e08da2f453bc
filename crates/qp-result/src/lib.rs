//! Result-set construction (§4.5) and the sensitive-value token store it
//! substitutes through (§4.6).

mod result;
mod token;

pub use result::{BuildPolicy, CellValue, ColumnMeta, QueryResult, RawCell, ResultBuilder, ValueType};
pub use token::{parse_token, DbTokenStore, ParsedToken, TokenInput};
