use thiserror::Error;

/// Errors raised while parsing or producing protocol text.
#[derive(Error, Debug)]
pub enum RfcError {
    #[error("XML error: {0}")]
    Xml(String),

    #[error("missing element: {0}")]
    MissingElement(&'static str),

    #[error("unsupported report: {0}")]
    UnsupportedReport(String),

    #[error("invalid iCalendar data: {0}")]
    InvalidCalendarData(String),

    #[error("invalid vCard data: {0}")]
    InvalidCardData(String),
}

impl From<quick_xml::Error> for RfcError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Xml(e.to_string())
    }
}

impl From<std::io::Error> for RfcError {
    fn from(e: std::io::Error) -> Self {
        Self::Xml(e.to_string())
    }
}

impl From<std::str::Utf8Error> for RfcError {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::Xml(e.to_string())
    }
}

pub type RfcResult<T> = std::result::Result<T, RfcError>;
