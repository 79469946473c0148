// querytree/src/errors.rs
use std::fmt;
use thiserror::Error;

/// Why a folder or file path derived from a row could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathIssue {
    /// The fragment normalizes to nothing.
    Empty,
    /// The fragment is absolute or climbs above the storage root.
    Escapes,
    /// A path component holds a character the file system does not accept.
    Reserved(char),
    /// A directory already occupies the target file path.
    IsDirectory,
    /// The folder hierarchy could not be created.
    CreateDir,
    /// Part of the folder path is an existing file.
    NotADirectory,
}

impl fmt::Display for PathIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathIssue::Empty => write!(f, "пустой путь"),
            PathIssue::Escapes => write!(f, "путь выходит за пределы каталога хранения"),
            PathIssue::Reserved(c) => write!(f, "недопустимый символ {:?}", c),
            PathIssue::IsDirectory => write!(f, "по этому пути находится папка"),
            PathIssue::CreateDir => write!(f, "не удалось создать папку"),
            PathIssue::NotADirectory => write!(f, "часть пути не является папкой"),
        }
    }
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("В папке проекта не найден файл \"{name}\"")]
    MissingArtifact { name: String },

    #[error("Не удалось прочитать файл \"{name}\"")]
    UnreadableArtifact {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Ошибка чтения \"{name}\". Пожалуйста, убедитесь, что в файле \"{name}\" содержится действительный JSON-объект")]
    MalformedSettings {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Ошибка чтения \"{name}\". JSON-объект должен содержать поле \"{field}\"")]
    MissingSettingsField { name: String, field: String },

    #[error("Ошибка чтения \"{name}\". Поле \"{field}\" {reason}")]
    InvalidSettingsField {
        name: String,
        field: String,
        reason: String,
    },

    #[error("Вероятно, произошла ошибка подключения к базе данных. Пожалуйста, убедитесь, что в файле {name} содержатся корректные данные")]
    Connection {
        name: String,
        #[source]
        source: postgres::Error,
    },

    #[error("Сервер не принял запрос из файла {name}. Файл должен содержать ровно одну команду SQL")]
    Query {
        name: String,
        #[source]
        source: postgres::Error,
    },

    #[error("Результирующая таблица должна состоять из трех столбцов. Данный запрос возвращает таблицу из {count} {noun}")]
    ColumnCount { count: usize, noun: &'static str },

    #[error("Результирующая таблица не содержит значений")]
    EmptyResult,

    #[error("Указан некорректный путь ({path}: {issue}). Файл не был создан")]
    InvalidPath { path: String, issue: PathIssue },

    #[error("Файл {path} уже существует. Перезапись по умолчанию отключена")]
    FileExists { path: String },

    #[error("Ошибка обращения к базе данных")]
    Database {
        #[source]
        source: postgres::Error,
    },

    #[error("Не удалось записать файл {path}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Отсутствует информация о правилах склонения слова \"{word}\"")]
    UnknownWord { word: String },
}

impl From<postgres::Error> for BackupError {
    fn from(source: postgres::Error) -> Self {
        BackupError::Database { source }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
