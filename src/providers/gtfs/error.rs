use thiserror::Error;

#[derive(Debug, Error)]
pub enum GtfsError {
    #[error("GTFS parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_parse_error() {
        let err = GtfsError::ParseError("stops.txt missing stop_id".into());
        assert_eq!(err.to_string(), "GTFS parse error: stops.txt missing stop_id");
    }

    #[test]
    fn error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GtfsError = io_err.into();
        assert!(err.to_string().contains("file not found"));
        assert!(matches!(err, GtfsError::IoError(_)));
    }

    #[test]
    fn error_from_csv_error() {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(b"not,enough" as &[u8]);
        #[derive(serde::Deserialize)]
        struct ThreeFields {
            _a: String,
            _b: String,
            _c: String,
        }
        let result = rdr.deserialize::<ThreeFields>().next().unwrap();
        if let Err(csv_err) = result {
            let err: GtfsError = csv_err.into();
            assert!(matches!(err, GtfsError::CsvError(_)));
        }
    }
}
