use thiserror::Error;

pub type FoResult<T> = Result<T, FoError>;

#[derive(Debug, Error)]
pub enum FoError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("json failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed bitstream at byte {offset}: {detail}")]
    MalformedBitstream { offset: usize, detail: String },

    #[error("malformed reference stream: {0}")]
    MalformedReference(String),

    #[error("no decoder backend available: {0}")]
    DecoderUnavailable(String),

    #[error("decoder configuration rejected: {0}")]
    DecoderConfig(String),

    #[error("conformance failure: {0}")]
    Conformance(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_bitstream_reports_offset() {
        let error = FoError::MalformedBitstream {
            offset: 42,
            detail: "truncated record header".to_owned(),
        };
        let rendered = error.to_string();
        assert!(rendered.contains("byte 42"), "unexpected message: {rendered}");
        assert!(rendered.contains("truncated record header"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error = FoError::from(io);
        assert!(matches!(error, FoError::Io(_)));
    }
}
