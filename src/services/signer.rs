use std::sync::Arc;

/// Token kind used for local upload credentials.
pub const UPLOAD_KIND: &str = "upload";

/// Signs local anti-link and upload URLs with the application key.
///
/// A token is `md5(app_key + subject + expires + kind)` rendered as lowercase hex,
/// where `subject` is the fid for downloads and the object path for uploads.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Arc<str>,
}

impl TokenSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Arc::from(secret.into()),
        }
    }

    pub fn sign(&self, subject: &str, expires: i64, kind: &str) -> String {
        let digest = md5::compute(format!("{}{}{}{}", self.secret, subject, expires, kind));
        format!("{:x}", digest)
    }

    /// Checks the token and that `expires` has not passed at `now`.
    pub fn verify(&self, subject: &str, expires: i64, kind: &str, token: &str, now: i64) -> bool {
        if expires < now {
            return false;
        }
        let expected = self.sign(subject, expires, kind);
        constant_time_eq(expected.as_bytes(), token.as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
