use crate::application_port::{IssuedToken, TokenClaims, TokenCodec, TokenError};
use crate::domain_model::{FamilyId, Role, UserId};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub signing_key: Vec<u8>,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("issuer", &self.issuer)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: String,
    fid: String,
    iss: String,
    iat: i64,
    exp: i64,
}

pub struct JwtHs256Codec {
    issuer: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtHs256Codec {
    /// Fails on an empty signing key; a process must not start without one.
    pub fn new(cfg: JwtConfig) -> anyhow::Result<Self> {
        if cfg.signing_key.is_empty() {
            return Err(anyhow::anyhow!("JWT signing key must not be empty"));
        }

        // Only HS256 is accepted; any other `alg` header, including `none`,
        // is rejected before the signature is checked.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_issuer(&[cfg.issuer.clone()]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        Ok(JwtHs256Codec {
            issuer: cfg.issuer,
            encoding_key: EncodingKey::from_secret(&cfg.signing_key),
            decoding_key: DecodingKey::from_secret(&cfg.signing_key),
            validation,
        })
    }

    pub(crate) fn mint_at(
        &self,
        claims: &TokenClaims,
        ttl: Duration,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| TokenError::Signing(e.to_string()))?;
        let expires_at = issued_at + ttl;
        let body = Claims {
            sub: claims.user_id.to_string(),
            role: claims.role.0.clone(),
            fid: claims.family_id.to_string(),
            iss: self.issuer.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &body, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        Ok(IssuedToken { token, expires_at })
    }
}

impl TokenCodec for JwtHs256Codec {
    fn mint(&self, claims: &TokenClaims, ttl: Duration) -> Result<IssuedToken, TokenError> {
        self.mint_at(claims, ttl, Utc::now())
    }

    fn parse(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::BadSignature,
                _ => TokenError::Malformed,
            }
        })?;

        let claims = data.claims;
        Ok(TokenClaims {
            user_id: claims.sub.parse::<UserId>().map_err(|_| TokenError::Malformed)?,
            role: Role(claims.role),
            family_id: claims.fid.parse::<FamilyId>().map_err(|_| TokenError::Malformed)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE_HEADER: &str = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0";

    fn codec(key: &[u8]) -> JwtHs256Codec {
        JwtHs256Codec::new(JwtConfig {
            issuer: "turnstile.test".to_string(),
            signing_key: key.to_vec(),
        })
        .unwrap()
    }

    fn claims() -> TokenClaims {
        TokenClaims {
            user_id: UserId::generate(),
            role: Role::new("admin"),
            family_id: FamilyId::generate(),
        }
    }

    #[test]
    fn parse_returns_minted_claims() {
        let codec = codec(b"0123456789abcdef0123456789abcdef");
        let claims = claims();
        for secs in [1, 60, 3600, 30 * 24 * 3600] {
            let issued = codec.mint(&claims, Duration::from_secs(secs)).unwrap();
            assert_eq!(codec.parse(&issued.token).unwrap(), claims);
        }
    }

    #[test]
    fn expiry_matches_ttl() {
        let codec = codec(b"k-k-k-k-k-k-k-k-");
        let now = Utc::now();
        let issued = codec.mint_at(&claims(), Duration::from_secs(900), now).unwrap();
        assert_eq!(issued.expires_at, now + chrono::Duration::seconds(900));
    }

    #[test]
    fn elapsed_token_is_expired() {
        let codec = codec(b"k-k-k-k-k-k-k-k-");
        let issued_at = Utc::now() - chrono::Duration::seconds(120);
        let issued = codec.mint_at(&claims(), Duration::from_secs(60), issued_at).unwrap();
        assert_eq!(codec.parse(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn other_key_is_a_bad_signature() {
        let issued = codec(b"first-key-first-key").mint(&claims(), Duration::from_secs(60)).unwrap();
        assert_eq!(
            codec(b"second-key-second-key").parse(&issued.token),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn empty_key_is_refused_at_construction() {
        let result = JwtHs256Codec::new(JwtConfig {
            issuer: "turnstile.test".to_string(),
            signing_key: Vec::new(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn token_signed_with_empty_key_never_validates() {
        let body = Claims {
            sub: UserId::generate().to_string(),
            role: "admin".to_string(),
            fid: FamilyId::generate().to_string(),
            iss: "turnstile.test".to_string(),
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 600,
        };
        let forged = encode(&Header::new(Algorithm::HS256), &body, &EncodingKey::from_secret(&[]))
            .unwrap();
        assert_eq!(
            codec(b"real-key-real-key").parse(&forged),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn other_mac_algorithm_is_rejected() {
        let key = b"shared-key-shared-key";
        let body = Claims {
            sub: UserId::generate().to_string(),
            role: "admin".to_string(),
            fid: FamilyId::generate().to_string(),
            iss: "turnstile.test".to_string(),
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 600,
        };
        let hs384 = encode(&Header::new(Algorithm::HS384), &body, &EncodingKey::from_secret(key))
            .unwrap();
        assert_eq!(codec(key).parse(&hs384), Err(TokenError::BadSignature));
    }

    #[test]
    fn unsigned_token_is_rejected() {
        let codec = codec(b"k-k-k-k-k-k-k-k-");
        let issued = codec.mint(&claims(), Duration::from_secs(60)).unwrap();
        let payload = issued.token.split('.').nth(1).unwrap();
        let unsigned = format!("{}.{}.", NONE_HEADER, payload);
        assert!(codec.parse(&unsigned).is_err());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let codec = codec(b"k-k-k-k-k-k-k-k-");
        let a = codec.mint(&claims(), Duration::from_secs(60)).unwrap();
        let b = codec.mint(&claims(), Duration::from_secs(60)).unwrap();
        let a_parts: Vec<&str> = a.token.split('.').collect();
        let b_parts: Vec<&str> = b.token.split('.').collect();
        let spliced = format!("{}.{}.{}", a_parts[0], b_parts[1], a_parts[2]);
        assert_eq!(codec.parse(&spliced), Err(TokenError::BadSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = codec(b"k-k-k-k-k-k-k-k-");
        assert_eq!(codec.parse("not.a.jwt"), Err(TokenError::Malformed));
        assert_eq!(codec.parse(""), Err(TokenError::Malformed));
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let key = b"shared-key-shared-key";
        let other = JwtHs256Codec::new(JwtConfig {
            issuer: "someone.else".to_string(),
            signing_key: key.to_vec(),
        })
        .unwrap();
        let issued = other.mint(&claims(), Duration::from_secs(60)).unwrap();
        assert!(codec(key).parse(&issued.token).is_err());
    }
}
