use serde::Serialize;

const UPLOAD_SEPARATOR: &str = "=>";
const DOWNLOAD_SEPARATOR: &str = "<=";

/// Which way the bytes flow. Uploads and downloads live in separate token
/// namespaces and separate registry pools.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Upload => "upload",
            Direction::Download => "download",
        }
    }

    fn separator(self) -> &'static str {
        match self {
            Direction::Upload => UPLOAD_SEPARATOR,
            Direction::Download => DOWNLOAD_SEPARATOR,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one transfer: `local=>remote` for uploads, `local<=remote` for
/// downloads. Pure function of its inputs, so callers can build a token for a
/// transfer before (or without) starting it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(local_path: &str, remote_path: &str, direction: Direction) -> Self {
        Token(format!("{}{}{}", local_path, direction.separator(), remote_path))
    }

    pub fn upload(local_path: &str, remote_path: &str) -> Self {
        Self::new(local_path, remote_path, Direction::Upload)
    }

    pub fn download(local_path: &str, remote_path: &str) -> Self {
        Self::new(local_path, remote_path, Direction::Download)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Token(s)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token(s.to_string())
    }
}
