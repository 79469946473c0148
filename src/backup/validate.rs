// querytree/src/backup/validate.rs
use crate::backup::source::ResultShape;
use crate::errors::{BackupError, Result};
use crate::utils::declension::{COLUMN, decline};

/// Number of columns a row must have: folder, file name, content.
pub const EXPECTED_COLUMNS: usize = 3;

/// Decides whether a result of the given shape may be materialized.
///
/// The column count is checked before the row count, so a wrong-shaped empty
/// result reports the column problem.
pub fn validate_shape(shape: &ResultShape) -> Result<()> {
    if shape.column_count != EXPECTED_COLUMNS {
        let count = shape.column_count;
        let noun = decline(COLUMN, i64::try_from(count).unwrap_or(i64::MAX))?;
        return Err(BackupError::ColumnCount { count, noun });
    }
    if shape.row_count == 0 {
        return Err(BackupError::EmptyResult);
    }
    Ok(())
}
