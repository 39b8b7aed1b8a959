pub mod db;
pub mod roster_http;

pub use db::DbAdapter;
pub use roster_http::HttpRosterAdapter;
