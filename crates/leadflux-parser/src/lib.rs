pub mod errors;
pub mod model;
pub mod reader;
pub mod record;
pub mod timestamp;

pub use errors::ParserError;
pub use model::{PurchaseDetails, PurchaseEvent, PurchaseKind, User, USER_TIMESTAMP_COLUMNS};
pub use reader::{parse_table, read_table, HeaderMode, ReadOptions, DETAILS_SUFFIX};
pub use record::{FieldValue, Record};
pub use timestamp::{format_timestamp, normalize_timestamp, Timestamp};
