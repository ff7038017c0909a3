pub mod bounded_wait;
pub mod core_utils;

pub use self::core_utils::parse_csv_list;
