use serde_json::Value;

use super::client::RawCustomField;

/// Typed destinations for tracker custom fields. Mapping is an explicit
/// closed synonym table validated at the ingestion boundary; a field name
/// that matches nothing is skipped, never guessed into a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    MonthlyValue,
    SetupValue,
    Erp,
    Cnpj,
    Crm,
    /// Human-facing store code (e.g. "F0H-533").
    StoreId,
    /// Reference a step task carries back to its parent store.
    ParentRef,
}

// Checked in order, first match wins. The generic "id" needle stays last so
// specific names like "cnpj" or "_father_task_id" claim their fields first.
const FIELD_SYNONYMS: &[(&str, FieldKind)] = &[
    ("mensalidade", FieldKind::MonthlyValue),
    ("mrr", FieldKind::MonthlyValue),
    ("implantação", FieldKind::SetupValue),
    ("implantacao", FieldKind::SetupValue),
    ("_father_task_id", FieldKind::ParentRef),
    ("father", FieldKind::ParentRef),
    ("erp", FieldKind::Erp),
    ("cnpj", FieldKind::Cnpj),
    ("crm", FieldKind::Crm),
    ("código", FieldKind::StoreId),
    ("codigo", FieldKind::StoreId),
    ("id", FieldKind::StoreId),
];

pub fn classify_field(name: &str) -> Option<FieldKind> {
    let name = name.trim().to_lowercase();
    FIELD_SYNONYMS
        .iter()
        .find(|(needle, _)| name.contains(needle))
        .map(|(_, kind)| *kind)
}

/// Values extracted from one task's custom fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedFields {
    pub monthly_value: Option<f64>,
    pub setup_value: Option<f64>,
    pub erp: Option<String>,
    pub cnpj: Option<String>,
    pub crm: Option<String>,
    pub store_id: Option<String>,
    pub parent_ref: Option<String>,
}

pub fn map_custom_fields(fields: &[RawCustomField]) -> MappedFields {
    let mut mapped = MappedFields::default();

    for field in fields {
        let Some(value) = field.value.as_ref() else {
            continue;
        };
        let Some(kind) = classify_field(&field.name) else {
            log::debug!("unmapped custom field skipped: {}", field.name);
            continue;
        };

        match kind {
            FieldKind::MonthlyValue => {
                if let Some(amount) = numeric_value(value) {
                    mapped.monthly_value.get_or_insert(amount);
                }
            }
            FieldKind::SetupValue => {
                if let Some(amount) = numeric_value(value) {
                    mapped.setup_value.get_or_insert(amount);
                }
            }
            FieldKind::Erp => assign_text(&mut mapped.erp, value, 1),
            FieldKind::Cnpj => assign_text(&mut mapped.cnpj, value, 1),
            FieldKind::Crm => assign_text(&mut mapped.crm, value, 1),
            // Store codes shorter than 3 characters are tracker noise.
            FieldKind::StoreId => assign_text(&mut mapped.store_id, value, 3),
            FieldKind::ParentRef => assign_text(&mut mapped.parent_ref, value, 1),
        }
    }

    mapped
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    }
}

fn assign_text(slot: &mut Option<String>, value: &Value, min_len: usize) {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return,
    };
    if text.len() >= min_len && slot.is_none() {
        *slot = Some(text);
    }
}
