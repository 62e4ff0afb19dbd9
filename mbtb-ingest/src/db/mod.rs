//! Specimen persistence

pub mod specimens;

pub use specimens::{
    delete_specimen, exists, fetch_by_code, fetch_by_id, find_guid_by_code, list_specimens,
    write_pair, WriteTarget,
};
