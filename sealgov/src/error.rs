use thiserror::Error;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("sealgov: malformed request: {0}")]
    MalformedRequest(String),

    #[error("sealgov: choice {0:?} is not in the declared choice set")]
    UnknownChoice(String),

    #[error("sealgov: choice value {value} is outside the domain 0..={max}")]
    InvalidChoiceValue { value: u64, max: u64 },

    #[error("sealgov: encryption randomness must be non-zero and coprime with the modulus")]
    InvalidRandomness,

    #[error("sealgov: parameter mismatch: {0}")]
    ParameterMismatch(String),

    #[error("sealgov: malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("sealgov: no private key registered for parameter epoch {0}")]
    KeyNotFound(u32),

    #[error("sealgov: insecure parameters: {0}")]
    InsecureParameters(String),

    #[error("sealgov: decrypted count out of bounds: {0}")]
    DecryptedCountOutOfBounds(String),

    #[error("sealgov: invalid bid amount from bidder {0}")]
    InvalidBidAmount(String),

    #[error("sealgov: sealed bid from bidder {0} could not be opened")]
    BidDecryption(String),

    #[error("sealgov: certification input invalid: {0}")]
    CertificationInputInvalid(String),

    #[error("sealgov: certificate verification failed: {0}")]
    VerificationFailed(String),

    #[error("sealgov: JSON error: {0}")]
    JSON(#[from] serde_json::Error),

    #[error("sealgov: CBOR error: {0}")]
    CBOR(#[from] serde_cbor::Error),

    #[error("sealgov: request body is neither JSON nor CBOR")]
    UnknownFormat,
}

/// Caller-facing classification of an error
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedRequest,
    UnknownChoice,
    InvalidChoiceValue,
    InvalidRandomness,
    ParameterMismatch,
    MalformedCiphertext,
    KeyNotFound,
    InsecureParameters,
    DecryptedCountOutOfBounds,
    InvalidBidAmount,
    BidDecryption,
    CertificationInputInvalid,
    VerificationFailed,
}

/// Whether the caller or the engine is at fault
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// The request itself is wrong; resubmitting it unchanged will fail again.
    BadRequest,

    /// Undersized parameters or a logic defect. Needs an operator, not a retry.
    Internal,
}

impl Status {
    /// HTTP-equivalent status code
    pub fn code(self) -> u16 {
        match self {
            Status::BadRequest => 400,
            Status::Internal => 500,
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedRequest(_)
            | Error::JSON(_)
            | Error::CBOR(_)
            | Error::UnknownFormat => ErrorKind::MalformedRequest,
            Error::UnknownChoice(_) => ErrorKind::UnknownChoice,
            Error::InvalidChoiceValue { .. } => ErrorKind::InvalidChoiceValue,
            Error::InvalidRandomness => ErrorKind::InvalidRandomness,
            Error::ParameterMismatch(_) => ErrorKind::ParameterMismatch,
            Error::MalformedCiphertext(_) => ErrorKind::MalformedCiphertext,
            Error::KeyNotFound(_) => ErrorKind::KeyNotFound,
            Error::InsecureParameters(_) => ErrorKind::InsecureParameters,
            Error::DecryptedCountOutOfBounds(_) => ErrorKind::DecryptedCountOutOfBounds,
            Error::InvalidBidAmount(_) => ErrorKind::InvalidBidAmount,
            Error::BidDecryption(_) => ErrorKind::BidDecryption,
            Error::CertificationInputInvalid(_) => ErrorKind::CertificationInputInvalid,
            Error::VerificationFailed(_) => ErrorKind::VerificationFailed,
        }
    }

    pub fn status(&self) -> Status {
        self.kind().status()
    }
}

impl ErrorKind {
    pub fn status(self) -> Status {
        match self {
            ErrorKind::DecryptedCountOutOfBounds
            | ErrorKind::CertificationInputInvalid
            | ErrorKind::InsecureParameters => Status::Internal,
            _ => Status::BadRequest,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::MalformedRequest => "MalformedRequest",
            ErrorKind::UnknownChoice => "UnknownChoice",
            ErrorKind::InvalidChoiceValue => "InvalidChoiceValue",
            ErrorKind::InvalidRandomness => "InvalidRandomness",
            ErrorKind::ParameterMismatch => "ParameterMismatch",
            ErrorKind::MalformedCiphertext => "MalformedCiphertext",
            ErrorKind::KeyNotFound => "KeyNotFound",
            ErrorKind::InsecureParameters => "InsecureParameters",
            ErrorKind::DecryptedCountOutOfBounds => "DecryptedCountOutOfBounds",
            ErrorKind::InvalidBidAmount => "InvalidBidAmount",
            ErrorKind::BidDecryption => "BidDecryption",
            ErrorKind::CertificationInputInvalid => "CertificationInputInvalid",
            ErrorKind::VerificationFailed => "VerificationFailed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            Error::UnknownChoice("maybe".into()).status(),
            Status::BadRequest
        );
        assert_eq!(
            Error::ParameterMismatch("epoch 1 vs 2".into()).status(),
            Status::BadRequest
        );
        assert_eq!(
            Error::DecryptedCountOutOfBounds("inFavor".into()).status(),
            Status::Internal
        );
        assert_eq!(
            Error::CertificationInputInvalid("empty id".into()).status(),
            Status::Internal
        );
        assert_eq!(Status::Internal.code(), 500);

        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert_eq!(Error::from(json_err).kind(), ErrorKind::MalformedRequest);
        assert_eq!(ErrorKind::UnknownChoice.to_string(), "UnknownChoice");
    }
}
