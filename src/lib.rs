pub mod config;
pub mod db;
pub mod diagnosis;
pub mod environment;
pub mod errors;
pub mod evidence;
pub mod external;
pub mod io;
pub mod log;
pub mod routes;
pub mod store;
