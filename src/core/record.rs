//! Purpose: Customer record shapes shared by the relay, its clients, and the console.
//! Exports: `Record`, `RecordFields`, `RecordPage`, `DeleteAck`, `NewRecord`, `FieldPatch`.
//! Role: Owns the write-path validation and field whitelisting rules.
//! Invariants: Writes only ever carry the `nome`, `email`, `telefone` keys.
//! Invariants: `NewRecord` always has non-empty `nome` and `email`.
use super::error::{ApiResult, Error, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub const FIELD_NAME: &str = "nome";
pub const FIELD_EMAIL: &str = "email";
pub const FIELD_PHONE: &str = "telefone";

/// Keys accepted on write paths, in wire order.
pub const WRITABLE_FIELDS: [&str; 3] = [FIELD_NAME, FIELD_EMAIL, FIELD_PHONE];

pub const MISSING_REQUIRED_MESSAGE: &str = "Required fields: nome and email.";
pub const NOTHING_TO_UPDATE_MESSAGE: &str = "Nothing to update.";
pub const PHONE_NOT_TEXT_MESSAGE: &str = "telefone must be a string.";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
    #[serde(default)]
    pub nome: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telefone: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub fields: RecordFields,
    #[serde(rename = "createdTime", default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPage {
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
}

impl RecordPage {
    /// Cursor for the following page; empty strings count as absent.
    pub fn next_cursor(&self) -> Option<&str> {
        self.offset.as_deref().filter(|offset| !offset.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAck {
    #[serde(default)]
    pub deleted: bool,
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRecord {
    nome: String,
    email: String,
    telefone: Option<String>,
}

impl NewRecord {
    pub fn new(
        nome: impl Into<String>,
        email: impl Into<String>,
        telefone: Option<String>,
    ) -> ApiResult<Self> {
        let nome = nome.into();
        let email = email.into();
        if nome.is_empty() || email.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message(MISSING_REQUIRED_MESSAGE));
        }
        Ok(Self {
            nome,
            email,
            telefone,
        })
    }

    /// Reads a create request body. `telefone` may be absent or null, but any
    /// other non-string value is rejected rather than silently dropped.
    pub fn from_body(body: &Map<String, Value>) -> ApiResult<Self> {
        let required = |key: &str| body.get(key).and_then(Value::as_str).unwrap_or_default();
        let mut record = Self::new(required(FIELD_NAME), required(FIELD_EMAIL), None)?;
        record.telefone = match body.get(FIELD_PHONE) {
            None | Some(Value::Null) => None,
            Some(Value::String(telefone)) => Some(telefone.clone()),
            Some(_) => {
                return Err(Error::new(ErrorKind::Usage).with_message(PHONE_NOT_TEXT_MESSAGE));
            }
        };
        Ok(record)
    }

    pub fn nome(&self) -> &str {
        &self.nome
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn telefone(&self) -> Option<&str> {
        self.telefone.as_deref()
    }

    /// Body accepted by the relay's create endpoint.
    pub fn to_request_json(&self) -> Value {
        let mut body = Map::new();
        body.insert(FIELD_NAME.to_string(), json!(self.nome));
        body.insert(FIELD_EMAIL.to_string(), json!(self.email));
        if let Some(telefone) = &self.telefone {
            body.insert(FIELD_PHONE.to_string(), json!(telefone));
        }
        Value::Object(body)
    }

    /// `{ "fields": { ... } }` envelope sent upstream.
    pub fn to_fields_envelope(&self) -> Value {
        json!({ "fields": self.to_request_json() })
    }
}

/// Partial update restricted to the writable keys.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldPatch {
    fields: Map<String, Value>,
}

impl FieldPatch {
    /// Keeps only writable keys; `null` counts as present.
    pub fn whitelist(body: &Map<String, Value>) -> ApiResult<Self> {
        let mut fields = Map::new();
        for key in WRITABLE_FIELDS {
            if let Some(value) = body.get(key) {
                fields.insert(key.to_string(), value.clone());
            }
        }
        if fields.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message(NOTHING_TO_UPDATE_MESSAGE));
        }
        Ok(Self { fields })
    }

    /// Patch carrying all three fields, as sent by the console's inline editor.
    pub fn full(fields: &RecordFields) -> Self {
        let mut map = Map::new();
        map.insert(FIELD_NAME.to_string(), json!(fields.nome));
        map.insert(FIELD_EMAIL.to_string(), json!(fields.email));
        map.insert(
            FIELD_PHONE.to_string(),
            json!(fields.telefone.clone().unwrap_or_default()),
        );
        Self { fields: map }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn to_request_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn to_fields_envelope(&self) -> Value {
        json!({ "fields": self.fields })
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldPatch, NewRecord, RecordFields, RecordPage};
    use crate::core::error::ErrorKind;
    use serde_json::{Map, Value, json};

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn new_record_requires_name_and_email() {
        let err = NewRecord::from_body(&object(json!({"email": "a@b.c"}))).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.message(), Some("Required fields: nome and email."));

        let err = NewRecord::from_body(&object(json!({"nome": "Ana", "email": ""})))
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn new_record_rejects_non_string_name() {
        let err = NewRecord::from_body(&object(json!({"nome": 7, "email": "a@b.c"})))
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn new_record_rejects_non_string_phone() {
        for telefone in [json!(5511999), json!(true), json!(["11"]), json!({"n": "11"})] {
            let err = NewRecord::from_body(&object(
                json!({"nome": "Ana", "email": "a@b.c", "telefone": telefone}),
            ))
            .expect_err("err");
            assert_eq!(err.kind(), ErrorKind::Usage);
            assert_eq!(err.message(), Some("telefone must be a string."));
        }
    }

    #[test]
    fn new_record_treats_null_phone_as_absent() {
        let record = NewRecord::from_body(&object(
            json!({"nome": "Ana", "email": "a@b.c", "telefone": null}),
        ))
        .expect("record");
        assert_eq!(record.telefone(), None);

        let record = NewRecord::from_body(&object(
            json!({"nome": "Ana", "email": "a@b.c", "telefone": "11 9999"}),
        ))
        .expect("record");
        assert_eq!(record.telefone(), Some("11 9999"));
    }

    #[test]
    fn new_record_envelope_omits_missing_phone() {
        let record =
            NewRecord::from_body(&object(json!({"nome": "Ana", "email": "ana@example.com"})))
                .expect("record");
        assert_eq!(
            record.to_fields_envelope(),
            json!({"fields": {"nome": "Ana", "email": "ana@example.com"}})
        );
    }

    #[test]
    fn patch_whitelists_known_keys() {
        let patch = FieldPatch::whitelist(&object(json!({
            "telefone": "123",
            "id": "rec1",
            "admin": true
        })))
        .expect("patch");
        assert_eq!(
            patch.to_fields_envelope(),
            json!({"fields": {"telefone": "123"}})
        );
    }

    #[test]
    fn patch_keeps_explicit_null() {
        let patch = FieldPatch::whitelist(&object(json!({"telefone": null}))).expect("patch");
        assert_eq!(patch.fields().get("telefone"), Some(&Value::Null));
    }

    #[test]
    fn patch_without_known_keys_is_rejected() {
        let err = FieldPatch::whitelist(&object(json!({"name": "x", "mail": "y"})))
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.message(), Some("Nothing to update."));
    }

    #[test]
    fn full_patch_sends_all_three_fields() {
        let fields = RecordFields {
            nome: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            telefone: None,
        };
        let patch = FieldPatch::full(&fields);
        assert_eq!(
            patch.to_request_json(),
            json!({"nome": "Ana", "email": "ana@example.com", "telefone": ""})
        );
    }

    #[test]
    fn page_treats_empty_offset_as_last_page() {
        let page: RecordPage = serde_json::from_value(json!({
            "records": [{"id": "rec1", "fields": {"nome": "Ana"}}],
            "offset": ""
        }))
        .expect("page");
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].fields.email, "");
        assert_eq!(page.next_cursor(), None);
    }
}
