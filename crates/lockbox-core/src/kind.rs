//! Per-kind payload descriptors.
//!
//! Each secret kind carries a static [`KindSpec`]: which payload fields
//! are allowed, which must be present on create, which are sensitive
//! (encrypted at rest, stripped from audit snapshots), and which are
//! searchable. Validation is strict — one unknown field rejects the whole
//! request, nothing is silently dropped.

use lockbox_storage::models::SecretKind;
use serde_json::Value;

use crate::crypto::{self, EncryptionKey};
use crate::error::VaultError;

/// Static field descriptor for one secret kind.
#[derive(Debug)]
pub struct KindSpec {
    /// Every field a payload of this kind may contain.
    pub allowed: &'static [&'static str],
    /// Fields that must be present and non-empty on create.
    pub required: &'static [&'static str],
    /// Fields encrypted at rest and stripped from audit snapshots.
    pub sensitive: &'static [&'static str],
    /// Fields the list-endpoint substring search covers.
    pub searchable: &'static [&'static str],
    /// The one sensitive field a redeemed share link reveals.
    pub primary_sensitive: &'static str,
}

const PASSWORD: KindSpec = KindSpec {
    allowed: &[
        "name",
        "website",
        "username",
        "password",
        "totp",
        "description",
    ],
    required: &["website", "username", "password"],
    sensitive: &["password"],
    searchable: &["name", "website", "username", "description"],
    primary_sensitive: "password",
};

const CARD: KindSpec = KindSpec {
    allowed: &["cardType", "cardNumber", "cardHolderName", "expiryDate", "CVV"],
    required: &["cardNumber", "cardHolderName", "expiryDate", "CVV"],
    sensitive: &["cardNumber", "CVV"],
    searchable: &["cardType", "cardHolderName"],
    primary_sensitive: "cardNumber",
};

const NOTE: KindSpec = KindSpec {
    allowed: &["title", "content"],
    required: &["title", "content"],
    sensitive: &["content"],
    searchable: &["title"],
    primary_sensitive: "content",
};

const FILE: KindSpec = KindSpec {
    allowed: &["name", "filename", "originalName", "notes", "location"],
    required: &["name", "location"],
    sensitive: &["location"],
    searchable: &["name", "filename", "originalName"],
    primary_sensitive: "location",
};

const IDENTITY: KindSpec = KindSpec {
    allowed: &["idType", "idNumber", "issuedBy", "issueDate", "expiryDate"],
    required: &["idType", "idNumber"],
    sensitive: &["idNumber"],
    searchable: &["idType", "issuedBy"],
    primary_sensitive: "idNumber",
};

const ADDRESS: KindSpec = KindSpec {
    allowed: &[
        "name",
        "title",
        "firstName",
        "middleName",
        "lastName",
        "address1",
        "address2",
        "city",
        "county",
        "state",
        "zipCode",
        "country",
        "email",
        "phone",
    ],
    required: &["name", "address1"],
    sensitive: &["address1"],
    searchable: &["name", "city", "state", "country"],
    primary_sensitive: "address1",
};

/// The descriptor for a kind.
#[must_use]
pub const fn spec(kind: SecretKind) -> &'static KindSpec {
    match kind {
        SecretKind::Password => &PASSWORD,
        SecretKind::Card => &CARD,
        SecretKind::Note => &NOTE,
        SecretKind::File => &FILE,
        SecretKind::Identity => &IDENTITY,
        SecretKind::Address => &ADDRESS,
    }
}

fn as_object<'a>(
    payload: &'a Value,
    kind: SecretKind,
) -> Result<&'a serde_json::Map<String, Value>, VaultError> {
    payload
        .as_object()
        .ok_or_else(|| VaultError::validation(format!("{kind} payload must be a JSON object")))
}

fn check_fields(
    fields: &serde_json::Map<String, Value>,
    kind: SecretKind,
) -> Result<(), VaultError> {
    let spec = spec(kind);
    for (name, value) in fields {
        if !spec.allowed.contains(&name.as_str()) {
            return Err(VaultError::validation(format!(
                "field '{name}' is not valid for {kind}"
            )));
        }
        if !value.is_string() {
            return Err(VaultError::validation(format!(
                "field '{name}' must be a string"
            )));
        }
    }
    Ok(())
}

fn non_empty(fields: &serde_json::Map<String, Value>, name: &str) -> bool {
    fields
        .get(name)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty())
}

/// Validate a create payload: allowed fields only, strings only, every
/// required field present and non-empty.
///
/// # Errors
///
/// Returns [`VaultError::Validation`] describing the first offending
/// field. One bad field rejects the whole request.
pub fn validate_create(kind: SecretKind, payload: &Value) -> Result<(), VaultError> {
    let fields = as_object(payload, kind)?;
    check_fields(fields, kind)?;
    for required in spec(kind).required {
        if !non_empty(fields, required) {
            return Err(VaultError::validation(format!(
                "field '{required}' is required for {kind}"
            )));
        }
    }
    Ok(())
}

/// Validate an update payload: a non-empty subset of allowed fields, and
/// no required field blanked out.
///
/// # Errors
///
/// Returns [`VaultError::Validation`] if the payload is empty, names an
/// unknown field, or clears a required field.
pub fn validate_update(kind: SecretKind, payload: &Value) -> Result<(), VaultError> {
    let fields = as_object(payload, kind)?;
    if fields.is_empty() {
        return Err(VaultError::validation("update payload is empty"));
    }
    check_fields(fields, kind)?;
    for required in spec(kind).required {
        if fields.contains_key(*required) && !non_empty(fields, required) {
            return Err(VaultError::validation(format!(
                "field '{required}' cannot be cleared"
            )));
        }
    }
    Ok(())
}

/// Encrypt the sensitive fields of a validated payload in place of their
/// plaintext, returning the document as persisted.
///
/// # Errors
///
/// Returns [`VaultError::Crypto`] if encryption fails.
pub fn encrypt_payload(
    kind: SecretKind,
    key: &EncryptionKey,
    payload: &Value,
) -> Result<Value, VaultError> {
    let mut fields = as_object(payload, kind)?.clone();
    for name in spec(kind).sensitive {
        if let Some(Value::String(plaintext)) = fields.get(*name) {
            let ciphertext = crypto::encrypt_field(key, plaintext)?;
            fields.insert((*name).to_owned(), Value::String(ciphertext));
        }
    }
    Ok(Value::Object(fields))
}

/// Decrypt the sensitive fields of a stored payload back to plaintext.
///
/// # Errors
///
/// Returns [`VaultError::Crypto`] if any field fails authentication.
pub fn decrypt_payload(
    kind: SecretKind,
    key: &EncryptionKey,
    payload: &Value,
) -> Result<Value, VaultError> {
    let mut fields = as_object(payload, kind)?.clone();
    for name in spec(kind).sensitive {
        if let Some(Value::String(ciphertext)) = fields.get(*name) {
            let plaintext = crypto::decrypt_field(key, ciphertext)?;
            fields.insert((*name).to_owned(), Value::String(plaintext));
        }
    }
    Ok(Value::Object(fields))
}

/// Strip sensitive fields from a payload for audit snapshots and list
/// views that must not carry plaintext or ciphertext.
#[must_use]
pub fn redact_payload(kind: SecretKind, payload: &Value) -> Value {
    let Some(fields) = payload.as_object() else {
        return payload.clone();
    };
    let mut redacted = fields.clone();
    for name in spec(kind).sensitive {
        if redacted.contains_key(*name) {
            redacted.insert((*name).to_owned(), Value::String("[REDACTED]".to_owned()));
        }
    }
    Value::Object(redacted)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn create_accepts_full_password_payload() {
        let payload = json!({
            "name": "GitHub",
            "website": "github.com",
            "username": "octocat",
            "password": "hunter2",
        });
        validate_create(SecretKind::Password, &payload).unwrap();
    }

    #[test]
    fn create_rejects_unknown_field_wholesale() {
        let payload = json!({
            "cardNumber": "4111111111111111",
            "cardHolderName": "A B",
            "expiryDate": "12/29",
            "CVV": "123",
            "nickname": "main card",
        });
        let err = validate_create(SecretKind::Card, &payload).unwrap_err();
        assert!(matches!(err, VaultError::Validation { .. }));
    }

    #[test]
    fn create_rejects_missing_required_field() {
        let payload = json!({ "website": "github.com", "username": "octocat" });
        let err = validate_create(SecretKind::Password, &payload).unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn create_rejects_non_string_value() {
        let payload = json!({ "title": "pin", "content": 1234 });
        assert!(validate_create(SecretKind::Note, &payload).is_err());
    }

    #[test]
    fn update_rejects_empty_payload() {
        assert!(validate_update(SecretKind::Note, &json!({})).is_err());
    }

    #[test]
    fn update_allows_partial_payload() {
        validate_update(SecretKind::Password, &json!({ "name": "renamed" })).unwrap();
    }

    #[test]
    fn update_rejects_clearing_required_field() {
        let err = validate_update(SecretKind::Password, &json!({ "password": "" })).unwrap_err();
        assert!(err.to_string().contains("cannot be cleared"));
    }

    #[test]
    fn encrypt_payload_leaves_plain_fields_readable() {
        let key = EncryptionKey::generate();
        let payload = json!({
            "name": "GitHub",
            "website": "github.com",
            "username": "octocat",
            "password": "hunter2",
        });
        let stored = encrypt_payload(SecretKind::Password, &key, &payload).unwrap();
        assert_eq!(stored["name"], "GitHub");
        assert_ne!(stored["password"], "hunter2");

        let restored = decrypt_payload(SecretKind::Password, &key, &stored).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn redact_strips_every_sensitive_field() {
        let payload = json!({
            "cardType": "visa",
            "cardNumber": "4111111111111111",
            "cardHolderName": "A B",
            "expiryDate": "12/29",
            "CVV": "123",
        });
        let redacted = redact_payload(SecretKind::Card, &payload);
        assert_eq!(redacted["cardNumber"], "[REDACTED]");
        assert_eq!(redacted["CVV"], "[REDACTED]");
        assert_eq!(redacted["cardType"], "visa");
    }

    #[test]
    fn every_kind_has_consistent_descriptor() {
        for kind in SecretKind::ALL {
            let spec = spec(kind);
            for name in spec.required {
                assert!(spec.allowed.contains(name), "{kind}: required {name}");
            }
            for name in spec.sensitive {
                assert!(spec.allowed.contains(name), "{kind}: sensitive {name}");
            }
            for name in spec.searchable {
                assert!(spec.allowed.contains(name), "{kind}: searchable {name}");
                assert!(
                    !spec.sensitive.contains(name),
                    "{kind}: search over ciphertext {name}"
                );
            }
            assert!(spec.sensitive.contains(&spec.primary_sensitive));
        }
    }
}
