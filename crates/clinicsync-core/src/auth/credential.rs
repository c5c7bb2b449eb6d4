use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a credential is attached to a request's `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// `Authorization: Token <token>`
    Token,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown credential scheme: {0}")]
pub struct ParseSchemeError(pub String);

impl Scheme {
    pub fn keyword(&self) -> &'static str {
        match self {
            Scheme::Bearer => "Bearer",
            Scheme::Token => "Token",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for Scheme {
    type Err = ParseSchemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bearer" | "jwt" => Ok(Scheme::Bearer),
            "token" => Ok(Scheme::Token),
            _ => Err(ParseSchemeError(s.to_string())),
        }
    }
}

fn default_schemes() -> Vec<Scheme> {
    vec![Scheme::Bearer, Scheme::Token]
}

/// An opaque token plus the ordered schemes the backend may accept it under.
///
/// Immutable once built; the credential store replaces it wholesale.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    token: String,
    #[serde(default = "default_schemes")]
    schemes: Vec<Scheme>,
}

impl Credential {
    /// A credential tried as `Bearer` first, then `Token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            schemes: default_schemes(),
        }
    }

    /// A credential with an explicit scheme order. Duplicates are dropped;
    /// an empty list falls back to the default order.
    pub fn with_schemes(token: impl Into<String>, schemes: Vec<Scheme>) -> Self {
        let mut ordered: Vec<Scheme> = Vec::with_capacity(schemes.len());
        for scheme in schemes {
            if !ordered.contains(&scheme) {
                ordered.push(scheme);
            }
        }
        if ordered.is_empty() {
            ordered = default_schemes();
        }
        Self {
            token: token.into(),
            schemes: ordered,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn schemes(&self) -> &[Scheme] {
        &self.schemes
    }

    pub fn primary(&self) -> Scheme {
        self.schemes.first().copied().unwrap_or(Scheme::Bearer)
    }

    pub fn secondary(&self) -> Option<Scheme> {
        self.schemes.get(1).copied()
    }

    /// Value of the `Authorization` header under `scheme`.
    pub fn authorization(&self, scheme: Scheme) -> String {
        format!("{} {}", scheme.keyword(), self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("schemes", &self.schemes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scheme_order() {
        let cred = Credential::new("abc");
        assert_eq!(cred.primary(), Scheme::Bearer);
        assert_eq!(cred.secondary(), Some(Scheme::Token));
        assert_eq!(cred.authorization(Scheme::Token), "Token abc");
    }

    #[test]
    fn test_with_schemes_dedups_and_defaults() {
        let cred = Credential::with_schemes("abc", vec![Scheme::Token, Scheme::Token]);
        assert_eq!(cred.schemes(), &[Scheme::Token]);
        assert_eq!(cred.secondary(), None);

        let cred = Credential::with_schemes("abc", vec![]);
        assert_eq!(cred.schemes(), &[Scheme::Bearer, Scheme::Token]);
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", Credential::new("secret-token"));
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn test_deserialize_without_schemes() {
        let cred: Credential = serde_json::from_str(r#"{"token":"t"}"#).unwrap();
        assert_eq!(cred.schemes(), &[Scheme::Bearer, Scheme::Token]);
    }

    #[test]
    fn test_scheme_from_str() {
        assert_eq!("BEARER".parse(), Ok(Scheme::Bearer));
        assert_eq!("token".parse(), Ok(Scheme::Token));
        assert!("basic".parse::<Scheme>().is_err());
    }
}
