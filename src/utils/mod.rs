pub mod declension;
pub mod paths;
