use thiserror::Error;

/// Why a sheet's OCR text could not be turned into records. Any of these
/// rejects the whole sheet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data")]
    InsufficientData,

    #[error("invalid grade '{grade}' for {name}")]
    InvalidGrade { grade: String, name: String },
}

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("OCR failed: {0}")]
    Recognition(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("no result found for index number {0}")]
    NotFound(String),

    #[error("semester {semester} of year {year} is out of range")]
    InvalidTerm { semester: u8, year: u8 },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_errors_render_operator_messages() {
        assert_eq!(ParseError::InsufficientData.to_string(), "insufficient data");
        let err = ParseError::InvalidGrade {
            grade: "D".to_string(),
            name: "Jane Doe".to_string(),
        };
        assert_eq!(err.to_string(), "invalid grade 'D' for Jane Doe");
    }

    #[test]
    fn sheet_error_is_transparent_over_parse_errors() {
        let err = SheetError::from(ParseError::InsufficientData);
        assert_eq!(err.to_string(), "insufficient data");
    }
}
