//! Cryptographic backend initialisation.

use tracing::info;

use crate::hash::sha256;
use crate::signature::SignatureError;

const SHA256_ABC: [u8; 4] = [0xba, 0x78, 0x16, 0xbf];

/// Handle proving the crypto backends were initialised.
///
/// Obtain one from [`SecurityEngine::init`] at startup and pass it to the
/// components that sign or verify. Initialising more than once is harmless.
#[derive(Debug, Clone, Copy)]
pub struct SecurityEngine {
    _initialised: (),
}

impl SecurityEngine {
    /// Initialises OpenSSL and runs a digest self-test.
    ///
    /// ## Errors
    ///
    /// Returns an error if the self-test produces a wrong answer.
    pub fn init() -> Result<Self, SignatureError> {
        openssl::init();

        if sha256(b"abc")[..4] != SHA256_ABC {
            return Err(SignatureError::Signing(
                "SHA-256 self-test failed".to_string(),
            ));
        }

        info!(openssl = openssl::version::version(), "Security engine initialised");
        Ok(Self { _initialised: () })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        assert!(SecurityEngine::init().is_ok());
        assert!(SecurityEngine::init().is_ok());
    }
}
