use chrono::Duration as ChronoDuration;
use chrono::Utc;
use jsonwebtoken::Algorithm;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use serde::Deserialize;
use serde::Serialize;

const SERVICE_TOKEN_TTL_SECONDS: i64 = 60;
const SERVICE_SUBJECT: &str = "transaction-service";
const SERVICE_AUDIENCE: &str = "account-service";
const SERVICE_ROLE: &str = "ROLE_INTERNAL_SERVICE";

#[derive(Debug, Serialize, Deserialize)]
struct ServiceClaims {
    sub: String,
    aud: String,
    role: String,
    iat: i64,
    exp: i64,
}

/// Issues the short-lived, HMAC-signed service token used for internal balance-op
/// calls. Distinct from the user-bearing token, which this client only ever
/// forwards verbatim and never mints.
pub struct ServiceTokenIssuer {
    encoding_key: EncodingKey,
}

impl ServiceTokenIssuer {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = ServiceClaims {
            sub: SERVICE_SUBJECT.to_string(),
            aud: SERVICE_AUDIENCE.to_string(),
            role: SERVICE_ROLE.to_string(),
            iat: now.timestamp(),
            exp: (now + ChronoDuration::seconds(SERVICE_TOKEN_TTL_SECONDS)).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }
}
