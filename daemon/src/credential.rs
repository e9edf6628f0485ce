//! Reversible protection of saved account passwords.
//!
//! Secrets are stored in the config as base64-wrapped DPAPI ciphertext,
//! scoped to the current Windows user. The daemon only ever decrypts; the
//! GUI owns the encrypt side.
//!
//! On non-Windows platforms the base64 layer still round-trips (so the
//! decision logic stays testable everywhere) but no OS protection exists.
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    /// The stored blob is not valid base64 — the profile needs its password
    /// re-entered, not a retry.
    #[error("saved password is not valid base64: {0}")]
    Format(#[source] base64::DecodeError),
    #[error("decrypted password is not valid UTF-8")]
    Utf8(#[source] std::string::FromUtf8Error),
    /// DPAPI refused the blob (wrong user, corrupted ciphertext).
    #[error("credential unprotection failed: {0}")]
    Unprotect(String),
}

pub trait CredentialService {
    /// Recovers the plaintext password from its protected form.
    fn decrypt(&self, protected_secret: &str) -> Result<String, CredentialError>;
}

/// Production credential service: base64 + DPAPI (current-user scope).
pub struct ProtectedCredentials;

impl CredentialService for ProtectedCredentials {
    fn decrypt(&self, protected_secret: &str) -> Result<String, CredentialError> {
        let bytes = BASE64
            .decode(protected_secret.trim())
            .map_err(CredentialError::Format)?;
        let plain = imp::unprotect(&bytes)?;
        String::from_utf8(plain).map_err(CredentialError::Utf8)
    }
}

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use windows::Win32::Foundation::HLOCAL;
    use windows::Win32::Security::Cryptography::{CryptUnprotectData, CRYPT_INTEGER_BLOB};
    use windows::Win32::System::Memory::LocalFree;

    use super::CredentialError;

    pub fn unprotect(data: &[u8]) -> Result<Vec<u8>, CredentialError> {
        let input = CRYPT_INTEGER_BLOB {
            cbData: data.len() as u32,
            pbData: data.as_ptr() as *mut u8,
        };
        let mut output = CRYPT_INTEGER_BLOB::default();
        unsafe {
            CryptUnprotectData(&input, None, None, None, None, 0, &mut output)
                .map_err(|e| CredentialError::Unprotect(e.to_string()))?;
            let plain =
                std::slice::from_raw_parts(output.pbData, output.cbData as usize).to_vec();
            let _ = LocalFree(HLOCAL(output.pbData as _));
            Ok(plain)
        }
    }
}

#[cfg(not(windows))]
mod imp {
    use super::CredentialError;

    pub fn unprotect(data: &[u8]) -> Result<Vec<u8>, CredentialError> {
        Ok(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrypt_rejects_invalid_base64() {
        let result = ProtectedCredentials.decrypt("not base64 !!!");
        assert!(matches!(result, Err(CredentialError::Format(_))));
    }

    #[test]
    fn decrypt_trims_surrounding_whitespace() {
        // Whitespace around the blob must not turn into a format error.
        let blob = format!("  {}\n", BASE64.encode(b"x"));
        match ProtectedCredentials.decrypt(&blob) {
            Err(CredentialError::Format(_)) => panic!("whitespace caused a format error"),
            _ => {}
        }
    }

    #[cfg(not(windows))]
    #[test]
    fn decrypt_round_trips_base64_off_windows() {
        let blob = BASE64.encode(b"hunter2");
        assert_eq!(ProtectedCredentials.decrypt(&blob).unwrap(), "hunter2");
    }

    #[cfg(not(windows))]
    #[test]
    fn decrypt_rejects_non_utf8_plaintext() {
        let blob = BASE64.encode([0xff, 0xfe, 0xfd]);
        let result = ProtectedCredentials.decrypt(&blob);
        assert!(matches!(result, Err(CredentialError::Utf8(_))));
    }
}
