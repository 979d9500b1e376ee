pub mod lint;
pub mod logging;
pub mod replay;
pub mod schema;
