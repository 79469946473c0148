// querytree/src/utils/declension.rs
use crate::errors::{BackupError, Result};

/// Noun used when reporting the column count of a query result.
pub const COLUMN: &str = "столбец";

/// One row of a noun's table: the form applies when the count's decimal text ends
/// with `suffix` and does not end with `unless`.
struct Form {
    suffix: &'static str,
    unless: Option<&'static str>,
    form: &'static str,
}

/// Genitive forms after a numeral, looked up by the trailing digits of the count.
/// Entries are checked in order; the last entry of each noun must have an empty suffix.
const DECLENSIONS: &[(&str, &[Form])] = &[(
    COLUMN,
    &[
        Form { suffix: "1", unless: Some("11"), form: "столбца" },
        Form { suffix: "", unless: None, form: "столбцов" },
    ],
)];

/// Returns the form of `word` that agrees with `count`.
///
/// Only nouns listed in the table are supported; anything else is an
/// `UnknownWord` error rather than a guess.
pub fn decline(word: &str, count: i64) -> Result<&'static str> {
    let forms = DECLENSIONS
        .iter()
        .find(|(noun, _)| *noun == word)
        .map(|(_, forms)| *forms)
        .ok_or_else(|| BackupError::UnknownWord { word: word.to_string() })?;

    let digits = count.to_string();
    forms
        .iter()
        .find(|f| digits.ends_with(f.suffix) && !f.unless.is_some_and(|u| digits.ends_with(u)))
        .map(|f| f.form)
        .ok_or_else(|| BackupError::UnknownWord { word: word.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_singular_genitive() -> anyhow::Result<()> {
        for count in [1, 21, 31, 101, 1001] {
            assert_eq!(decline(COLUMN, count)?, "столбца", "count {}", count);
        }
        Ok(())
    }

    #[test]
    fn test_column_plural_genitive() -> anyhow::Result<()> {
        for count in [0, 2, 4, 5, 11, 12, 111, 211, 1000] {
            assert_eq!(decline(COLUMN, count)?, "столбцов", "count {}", count);
        }
        Ok(())
    }

    #[test]
    fn test_unknown_word_is_rejected() {
        match decline("строка", 3) {
            Err(BackupError::UnknownWord { word }) => assert_eq!(word, "строка"),
            other => panic!("expected UnknownWord, got {:?}", other),
        }
    }
}
