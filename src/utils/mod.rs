//! Utility functions and types

pub mod data_loader;
pub mod stats;

pub use data_loader::{
    array_to_frame, column_to_f64, column_values, frame_to_array, is_numeric_dtype,
    records_to_frame, save_csv, split_labelled, DataLoader,
};
pub use stats::StatsSummary;

use std::path::Path;

/// Write pretty JSON, creating parent directories
pub fn save_json<T: serde::Serialize>(path: impl AsRef<Path>, value: &T) -> crate::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), value)?;
    Ok(())
}

/// Write raw bytes, creating parent directories
pub fn save_bytes(path: impl AsRef<Path>, bytes: &[u8]) -> crate::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}
