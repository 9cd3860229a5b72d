use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u32);

/// Expression text handed to the compiler, either read from a file or given inline.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub id: SourceId,
    pub origin: Option<PathBuf>,
    pub contents: String,
}

impl SourceFile {
    pub fn new(id: SourceId, origin: PathBuf, contents: String) -> Self {
        Self {
            id,
            origin: Some(origin),
            contents,
        }
    }

    pub fn inline<S: Into<String>>(contents: S) -> Self {
        Self {
            id: SourceId(0),
            origin: None,
            contents: contents.into(),
        }
    }

    pub fn display_name(&self) -> String {
        match &self.origin {
            Some(path) => path.display().to_string(),
            None => "<inline>".to_string(),
        }
    }
}
