//! Principal (authenticated user) claims and capabilities

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Named permission grants checked by the access policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Renew loans, return copies on behalf of borrowers, see every loan
    CanMarkReturned,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::CanMarkReturned => "can_mark_returned",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// JWT Claims for authenticated users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    /// Username
    pub sub: String,
    pub user_id: i32,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub permissions: Vec<Capability>,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Claims valid for `hours` from now
    pub fn new(user_id: i32, username: &str, is_staff: bool, permissions: Vec<Capability>, hours: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: username.to_string(),
            user_id,
            is_staff,
            permissions,
            exp: now + hours * 3600,
            iat: now,
        }
    }

    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn username(&self) -> &str {
        &self.sub
    }

    /// Staff implicitly hold every capability
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.is_staff || self.permissions.contains(&capability)
    }

    // Authorization checks
    pub fn require_capability(&self, capability: Capability) -> Result<(), AppError> {
        if self.has_capability(capability) {
            Ok(())
        } else {
            Err(AppError::Authorization(format!("Missing capability {}", capability)))
        }
    }

    pub fn require_mark_returned(&self) -> Result<(), AppError> {
        self.require_capability(Capability::CanMarkReturned)
    }

    /// Catalog create/update/delete is reserved to staff
    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.is_staff {
            Ok(())
        } else {
            Err(AppError::Authorization("Staff privileges required".to_string()))
        }
    }
}
