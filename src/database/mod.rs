pub mod db_structs;
pub mod in_memory;
pub mod store;
