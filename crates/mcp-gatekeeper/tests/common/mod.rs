//! Shared helpers for integration tests: RS256 token minting and a mock JWKS.

#![allow(dead_code)]

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode, get_current_timestamp};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const KID: &str = "test-key-1";
pub const REALM_PATH: &str = "/realms/test";
pub const JWKS_PATH: &str = "/realms/test/protocol/openid-connect/certs";

const PRIVATE_KEY_PEM: &[u8] = include_bytes!("../fixtures/test_rsa.pem");
const MODULUS: &str = include_str!("../fixtures/test_rsa.n");

/// JWKS document publishing the test key under `kid`.
pub fn jwks(kid: &str) -> Value {
    json!({
        "keys": [{
            "kty": "RSA",
            "kid": kid,
            "use": "sig",
            "alg": "RS256",
            "n": MODULUS.trim(),
            "e": "AQAB"
        }]
    })
}

/// Issuer for a mock identity provider at `base`.
pub fn issuer(base: &str) -> String {
    format!("{base}{REALM_PATH}")
}

/// Claims valid for five minutes.
pub fn claims(issuer: &str, sub: &str) -> Value {
    let now = get_current_timestamp();
    json!({
        "iss": issuer,
        "sub": sub,
        "iat": now,
        "exp": now + 300,
        "email": format!("{sub}@example.com"),
        "preferred_username": sub,
        "name": "Test User"
    })
}

/// Sign `claims` with the test key.
pub fn mint(claims: &Value, kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_owned);
    let key = EncodingKey::from_rsa_pem(PRIVATE_KEY_PEM).unwrap();
    encode(&header, claims, &key).unwrap()
}

/// Mount the JWKS endpoint, expecting exactly `expected` fetches.
pub async fn mount_jwks(server: &MockServer, expected: u64) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(KID)))
        .expect(expected)
        .mount(server)
        .await;
}
