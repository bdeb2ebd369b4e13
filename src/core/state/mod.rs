pub mod app_state;

pub use app_state::{copy_dir_recursive, default_data_dir, AppState, DATA_DIR_ENV};
