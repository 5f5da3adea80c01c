//! Password credentials and session tokens.

use anyhow::{bail, Result};
use rand::Rng;
use rand_distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

const AUTH_TOKEN_LENGTH: usize = 64;

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct AuthTokenValue(pub String);

impl AuthTokenValue {
    pub fn generate() -> AuthTokenValue {
        let rng = rand::rng();
        let value: String = rng
            .sample_iter(&Alphanumeric)
            .take(AUTH_TOKEN_LENGTH)
            .map(char::from)
            .collect();
        AuthTokenValue(value)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct AuthToken {
    pub user_id: usize,
    pub created: SystemTime,
    pub last_used: Option<SystemTime>,
    pub value: AuthTokenValue,
}

mod humanizer_argon2 {
    use anyhow::{anyhow, Result};
    use argon2::{
        password_hash::{
            rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        },
        Argon2,
    };

    #[cfg(not(feature = "test-fast-hasher"))]
    fn argon2() -> Argon2<'static> {
        Argon2::default()
    }

    /// Minimum-cost parameters, only for test builds.
    #[cfg(feature = "test-fast-hasher")]
    fn argon2() -> Argon2<'static> {
        let params = argon2::Params::new(8, 1, 1, None).unwrap_or_default();
        Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params)
    }

    pub fn generate_b64_salt() -> String {
        SaltString::generate(&mut OsRng).to_string()
    }

    pub fn hash(plain: &[u8], b64_salt: &str) -> Result<String> {
        let salt = SaltString::from_b64(b64_salt).map_err(|err| anyhow!("{}", err))?;
        let hash = argon2()
            .hash_password(plain, &salt)
            .map_err(|err| anyhow!("{}", err))?
            .to_string();
        Ok(hash)
    }

    pub fn verify(plain: &[u8], target_hash: &str) -> Result<bool> {
        let password_hash = PasswordHash::new(target_hash).map_err(|err| anyhow!("{}", err))?;
        Ok(argon2().verify_password(plain, &password_hash).is_ok())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub enum CredentialsHasher {
    Argon2,
}

impl FromStr for CredentialsHasher {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "argon2" => Ok(CredentialsHasher::Argon2),
            _ => bail!("Unknown hasher {}", s),
        }
    }
}

impl fmt::Display for CredentialsHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsHasher::Argon2 => f.write_str("argon2"),
        }
    }
}

impl CredentialsHasher {
    pub fn generate_b64_salt(&self) -> String {
        match self {
            CredentialsHasher::Argon2 => humanizer_argon2::generate_b64_salt(),
        }
    }

    pub fn hash(&self, plain: &[u8], b64_salt: &str) -> Result<String> {
        match self {
            CredentialsHasher::Argon2 => humanizer_argon2::hash(plain, b64_salt),
        }
    }

    pub fn verify(&self, plain: &str, target_hash: &str) -> Result<bool> {
        match self {
            CredentialsHasher::Argon2 => humanizer_argon2::verify(plain.as_bytes(), target_hash),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct UsernamePasswordCredentials {
    pub user_id: usize,
    pub salt: String,
    pub hash: String,
    pub hasher: CredentialsHasher,
    pub created: SystemTime,
}

impl UsernamePasswordCredentials {
    /// Hashes `password` with a fresh salt.
    pub fn create(user_id: usize, password: &str) -> Result<Self> {
        let hasher = CredentialsHasher::Argon2;
        let salt = hasher.generate_b64_salt();
        let hash = hasher.hash(password.as_bytes(), &salt)?;
        Ok(Self {
            user_id,
            salt,
            hash,
            hasher,
            created: SystemTime::now(),
        })
    }

    pub fn verify(&self, password: &str) -> Result<bool> {
        self.hasher.verify(password, &self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argon2_hash_is_stable_for_a_salt() {
        let salt = CredentialsHasher::Argon2.generate_b64_salt();

        let first = CredentialsHasher::Argon2.hash(b"123mypw", &salt).unwrap();
        let second = CredentialsHasher::Argon2.hash(b"123mypw", &salt).unwrap();
        assert_eq!(first, second);

        assert!(CredentialsHasher::Argon2.verify("123mypw", &first).unwrap());
        assert!(!CredentialsHasher::Argon2.verify("not the pw", &first).unwrap());
    }

    #[test]
    fn credentials_verify_their_password() {
        let credentials = UsernamePasswordCredentials::create(7, "hunter22").unwrap();
        assert_eq!(credentials.user_id, 7);
        assert!(credentials.verify("hunter22").unwrap());
        assert!(!credentials.verify("hunter23").unwrap());
    }

    #[test]
    fn hasher_names_round_trip() {
        let hasher = CredentialsHasher::Argon2;
        assert_eq!(hasher.to_string().parse::<CredentialsHasher>().unwrap(), hasher);
        assert!("bcrypt".parse::<CredentialsHasher>().is_err());
    }

    #[test]
    fn generated_tokens_are_alphanumeric() {
        let token = AuthTokenValue::generate();
        assert_eq!(token.0.len(), AUTH_TOKEN_LENGTH);
        assert!(token.0.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, AuthTokenValue::generate());
    }
}
