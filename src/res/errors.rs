use std::path::PathBuf;

#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "Attempted to load empty path.")]
    EmptyPath,
    #[fail(display = "No loader accepts extension '{}' of {:?}.", _0, _1)]
    NoLoaderFound(String, PathBuf),
    #[fail(
        display = "Loader of extension '{}' requires path semantics and does not accept in-memory buffers.",
        _0
    )]
    UnsupportedBuffer(String),
    #[fail(display = "{}", _0)]
    Io(::std::io::Error),
    #[fail(display = "Failed to decode {:?}: {}", _0, _1)]
    Decode(PathBuf, ::failure::Error),
    #[fail(display = "Failed to upload {:?}: {}", _0, _1)]
    Upload(PathBuf, ::failure::Error),
    #[fail(display = "Resource {:?} is not loaded.", _0)]
    NotLoaded(PathBuf),
    #[fail(display = "Resource {:?} is not of the requested type.", _0)]
    TypeMismatch(PathBuf),
}

pub type Result<T> = ::std::result::Result<T, Error>;

impl From<::std::io::Error> for Error {
    fn from(err: ::std::io::Error) -> Self {
        Error::Io(err)
    }
}
