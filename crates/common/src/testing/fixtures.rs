//! Token fixtures

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Unsigned, structurally valid JWT whose `exp` claim is `exp` (unix seconds)
///
/// # Examples
///
/// ```
/// use pawlink_common::auth::token::is_well_formed;
/// use pawlink_common::testing::fake_jwt;
///
/// assert!(is_well_formed(&fake_jwt(1_900_000_000)));
/// ```
#[must_use]
pub fn fake_jwt(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD
        .encode(serde_json::json!({ "sub": "user-1", "exp": exp }).to_string().as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(b"signature");
    format!("{header}.{payload}.{signature}")
}
