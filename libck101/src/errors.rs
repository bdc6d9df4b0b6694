use std::fmt::Formatter;

#[derive(Debug, PartialEq)]
pub enum Ck101Error {
    /// Missing or malformed thread url
    InvalidInput(String),
    /// Login exchange failed. Callers fall back to anonymous browsing.
    Auth(String),
    Fetch {
        url: String,
        message: String,
    },
    ErrorStatusCode {
        status_code: String,
        url: String,
    },
    NoImages,
    ErrorCreatingDestinationDirectory(String),
    Cancelled,
    UnknownError(String),
}

impl std::fmt::Display for Ck101Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let str = match self {
            Ck101Error::InvalidInput(input) => {
                format!("supplied url is empty or invalid : {input}")
            }
            Ck101Error::Auth(err) => format!("login failed. {err}"),
            Ck101Error::Fetch { url, message } => {
                format!("could not fetch content, check your network connection. {url} ({message})")
            }
            Ck101Error::ErrorStatusCode { status_code, url } => {
                format!("server returned an error response. {url} => {status_code}")
            }
            Ck101Error::NoImages => "no images to fetch".to_string(),
            Ck101Error::ErrorCreatingDestinationDirectory(err) => {
                format!("error creating destination directory. {err}")
            }
            Ck101Error::Cancelled => "operation cancelled".to_string(),
            Ck101Error::UnknownError(err) => format!("an unknown error occurred. {err}"),
        };
        write!(f, "{str}")
    }
}

impl std::error::Error for Ck101Error {}

#[derive(Debug, PartialEq)]
pub enum ImageError {
    /// Decoded image is below the minimum dimensions. Expected for thumbnails and icons.
    TooSmall {
        width: u32,
        height: u32,
    },
    NetworkError(String),
    ErrorStatusCode {
        status_code: String,
        url: String,
    },
    Decode(String),
    Encode(String),
    /// parameters are file path, additional error message
    FileOperationError {
        file_name: String,
        message: String,
    },
    Cancelled,
}

impl ImageError {
    pub fn is_skip(&self) -> bool {
        matches!(self, ImageError::TooSmall { .. })
    }
}

impl std::fmt::Display for ImageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let str = match self {
            ImageError::TooSmall { width, height } => {
                format!("image too small ({width}x{height})")
            }
            ImageError::NetworkError(err) => format!("error connecting to internet. {err}"),
            ImageError::ErrorStatusCode { status_code, url } => {
                format!("server returned an error response. {url} => {status_code}")
            }
            ImageError::Decode(err) => format!("unable to decode image. {err}"),
            ImageError::Encode(err) => format!("unable to encode image as jpeg. {err}"),
            ImageError::FileOperationError { file_name, message } => {
                format!("{message} : {file_name}")
            }
            ImageError::Cancelled => "download cancelled".to_string(),
        };
        write!(f, "{str}")
    }
}

impl std::error::Error for ImageError {}
