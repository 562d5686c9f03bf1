use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

/// The actor's type, decoded verbatim from the `actorType` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    Web,
    Mobile,
}

/// A role name plus its ordered, normalized list of permission strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleClaim {
    pub name: String,
    pub authorizations: Vec<String>,
}

/// Application-focused representation of a verified access token.
///
/// Claim names on the wire are (`sub`, `username`,
/// `actorType`, `companyId`, `branchId`, `driverId`, `role`,
/// `isSuperAdmin`) — this scheme carries no `iss`/`aud`/JWKS machinery.
#[derive(Debug, Clone, Serialize)]
pub struct Claims {
    pub subject: Uuid,
    pub username: String,
    pub actor_type: ActorType,
    pub company_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub role: Option<RoleClaim>,
    pub is_super_admin: bool,
    pub expires_at: DateTime<Utc>,
}

impl Claims {
    /// Ordered permission strings carried by the role claim, or empty when
    /// no role is attached. Mobile actors layer their own `permissions`
    /// column in on top of this after the DB refresh (§4.5); the token
    /// itself only ever carries the role-derived set.
    pub fn permissions(&self) -> &[String] {
        self.role
            .as_ref()
            .map(|r| r.authorizations.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Deserialize)]
struct RoleRepr {
    name: String,
    #[serde(default, deserialize_with = "deserialize_authorizations")]
    authorizations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClaimsRepr {
    sub: String,
    username: String,
    #[serde(rename = "actorType")]
    actor_type: ActorType,
    #[serde(rename = "companyId", default)]
    company_id: Option<String>,
    #[serde(rename = "branchId", default)]
    branch_id: Option<String>,
    #[serde(rename = "driverId", default)]
    driver_id: Option<String>,
    #[serde(default)]
    role: Option<RoleRepr>,
    #[serde(rename = "isSuperAdmin", default)]
    is_super_admin: bool,
    exp: i64,
}

/// `authorizations` may arrive as a comma-joined string or a JSON array;
/// normalize both to a trimmed, non-empty, order-preserving sequence.
fn deserialize_authorizations<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Csv(String),
        List(Vec<String>),
    }

    let repr = Option::<Repr>::deserialize(deserializer)?;
    Ok(match repr {
        None => Vec::new(),
        Some(Repr::Csv(csv)) => normalize_authorizations(csv.split(',')),
        Some(Repr::List(items)) => normalize_authorizations(items.iter().map(String::as_str)),
    })
}

pub fn normalize_authorizations<'a, I: Iterator<Item = &'a str>>(items: I) -> Vec<String> {
    items
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_uuid(field: &'static str, value: &str) -> AuthResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| AuthError::InvalidClaim(field, value.to_string()))
}

fn parse_uuid_opt(field: &'static str, value: Option<String>) -> AuthResult<Option<Uuid>> {
    value.map(|v| parse_uuid(field, &v)).transpose()
}

impl TryFrom<ClaimsRepr> for Claims {
    type Error = AuthError;

    fn try_from(value: ClaimsRepr) -> AuthResult<Self> {
        let subject = parse_uuid("sub", &value.sub)?;
        let company_id = parse_uuid_opt("companyId", value.company_id)?;
        let branch_id = parse_uuid_opt("branchId", value.branch_id)?;
        let driver_id = parse_uuid_opt("driverId", value.driver_id)?;

        let expires_at = Utc
            .timestamp_opt(value.exp, 0)
            .single()
            .ok_or_else(|| AuthError::InvalidClaim("exp", value.exp.to_string()))?;

        let role = value.role.map(|r| RoleClaim {
            name: r.name,
            authorizations: r.authorizations,
        });

        Ok(Self {
            subject,
            username: value.username,
            actor_type: value.actor_type,
            company_id,
            branch_id,
            driver_id,
            role,
            is_super_admin: value.is_super_admin,
            expires_at,
        })
    }
}

impl TryFrom<serde_json::Value> for Claims {
    type Error = AuthError;

    fn try_from(value: serde_json::Value) -> AuthResult<Self> {
        let repr: ClaimsRepr = serde_json::from_value(value)
            .map_err(|err| AuthError::InvalidJson(err.to_string()))?;
        Claims::try_from(repr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_value(authorizations: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "sub": "11111111-1111-1111-1111-111111111111",
            "username": "alice",
            "actorType": "web",
            "companyId": "22222222-2222-2222-2222-222222222222",
            "branchId": "33333333-3333-3333-3333-333333333333",
            "role": { "name": "dispatcher", "authorizations": authorizations },
            "isSuperAdmin": false,
            "exp": 9_999_999_999i64,
        })
    }

    #[test]
    fn normalizes_csv_authorizations() {
        let claims =
            Claims::try_from(sample_value(serde_json::json!(" a, b ,,c"))).expect("decode");
        assert_eq!(claims.permissions(), &["a", "b", "c"]);
    }

    #[test]
    fn normalizes_list_authorizations() {
        let claims =
            Claims::try_from(sample_value(serde_json::json!(["a", " b ", ""]))).expect("decode");
        assert_eq!(claims.permissions(), &["a", "b"]);
    }

    #[test]
    fn missing_role_yields_empty_permissions() {
        let mut value = sample_value(serde_json::json!([]));
        value.as_object_mut().unwrap().remove("role");
        let claims = Claims::try_from(value).expect("decode");
        assert!(claims.permissions().is_empty());
    }

    #[test]
    fn rejects_invalid_subject_uuid() {
        let mut value = sample_value(serde_json::json!([]));
        value["sub"] = serde_json::json!("not-a-uuid");
        let err = Claims::try_from(value).unwrap_err();
        assert!(matches!(err, AuthError::InvalidClaim("sub", _)));
    }
}
