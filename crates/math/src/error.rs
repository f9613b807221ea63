use thiserror::Error;

/// Errors raised by fixed-point parsing and conversion
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    /// Input is not a decimal number
    #[error("Invalid decimal '{input}': {reason}")]
    InvalidDecimal { input: String, reason: String },

    /// Input carries more fractional digits than the target scale
    #[error("Precision loss parsing '{input}': {digits} fractional digits exceed scale {scale}")]
    PrecisionLoss { input: String, digits: usize, scale: u32 },
}

impl MathError {
    /// Create an invalid decimal error
    pub fn invalid_decimal(input: &str, reason: &str) -> Self {
        Self::InvalidDecimal {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a precision loss error
    pub fn precision_loss(input: &str, digits: usize, scale: u32) -> Self {
        Self::PrecisionLoss {
            input: input.to_string(),
            digits,
            scale,
        }
    }
}

/// Result type alias using the math error type
pub type MathResult<T> = std::result::Result<T, MathError>;
