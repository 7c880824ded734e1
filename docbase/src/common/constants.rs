// document constants
pub const DOC_ID: &str = "_id";
pub const FIELD_SEPARATOR: &str = ".";
pub const CREATED_FIELD: &str = "created";
pub const SOFT_DELETE_FIELD: &str = "is_deleted";

// update operators
pub const SET_OPERATOR: &str = "$set";

// index constants
pub const ID_INDEX_NAME: &str = "_id_";
pub const INDEX_NAME_SEPARATOR: &str = "_";

// allocator constants
pub const DEFAULT_ID_KEY_PREFIX: &str = "auto_id:";

// connection defaults
pub const DEFAULT_DATABASE: &str = "test";
pub const DEFAULT_MAX_POOL_SIZE: u32 = 20;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_COUNTER_ADDRESS: &str = "127.0.0.1:6379";

pub const DOCBASE_VERSION: &str = env!("CARGO_PKG_VERSION");
