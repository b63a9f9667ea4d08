use serde::{Deserialize, Deserializer, Serialize};

use crate::ledger::OverrideLedger;
use crate::pow::{self, PowItem};
use crate::storage::{KeyValueStore, PROJECT_META_KEY, UPDATE_OVERRIDES_KEY};

/// Column order used when the registry is rendered back out as a workbook.
/// These are the literal spreadsheet header strings; lookups against them
/// must go through the same names, not positional indexes.
pub const HEADERS: [&str; 21] = [
    "CONTRACT ID",
    "CONTRACT NAME/LOCATION",
    "LOCATION",
    "TYPE OF PROJECT",
    "APPROPRIATION",
    "APPROVED BUDGET COST (ABC)",
    "CONTRACT AMOUNT",
    "CONTRACTOR",
    "START DATE",
    "EXPIRATION DATE",
    "LIMITS",
    "LATEST DATE UPDATED",
    "STATUS OF PROJECT",
    "SWA (%) 1ST BILLING",
    "INPUT 1ST BILLING",
    "PROJECT ENGINEER",
    "MATERIALS ENGINEER",
    "PROJECT INSPECTOR",
    "QUALITY ASSURANCE IN-CHARGE",
    "RESIDENT ENGINEER",
    "CONTRACTORS MATERIALS ENGINEER",
];

/// Canonical contract record as the system of record stores it.
///
/// Field names serialize to the literal spreadsheet headers so a row object
/// from the API and a workbook row stay interchangeable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Project {
    #[serde(rename = "CONTRACT ID")]
    pub contract_id: String,
    #[serde(rename = "CONTRACT NAME/LOCATION")]
    pub description: String,
    #[serde(rename = "LOCATION")]
    pub location: String,
    #[serde(rename = "TYPE OF PROJECT")]
    pub category: String,
    #[serde(rename = "APPROPRIATION")]
    pub appropriation: String,
    #[serde(rename = "APPROVED BUDGET COST (ABC)")]
    pub approved_budget_cost: String,
    #[serde(rename = "CONTRACT AMOUNT")]
    pub contract_cost: String,
    #[serde(rename = "CONTRACTOR")]
    pub contractor: String,
    #[serde(rename = "START DATE")]
    pub start_date: String,
    #[serde(rename = "EXPIRATION DATE")]
    pub expiration_date: String,
    #[serde(rename = "LIMITS")]
    pub limits: String,
    #[serde(rename = "LATEST DATE UPDATED")]
    pub completion_date: String,
    #[serde(rename = "STATUS OF PROJECT")]
    pub status: String,
    #[serde(rename = "SWA (%) 1ST BILLING")]
    pub accomplishment: String,
    #[serde(rename = "INPUT 1ST BILLING")]
    pub remarks: String,
    #[serde(rename = "PROJECT ENGINEER")]
    pub project_engineer: String,
    #[serde(rename = "MATERIALS ENGINEER")]
    pub materials_engineer: String,
    #[serde(rename = "PROJECT INSPECTOR")]
    pub project_inspector: String,
    #[serde(rename = "QUALITY ASSURANCE IN-CHARGE")]
    pub qa_in_charge: String,
    #[serde(rename = "RESIDENT ENGINEER")]
    pub resident_engineer: String,
    #[serde(rename = "CONTRACTORS MATERIALS ENGINEER")]
    pub contractor_materials_engineer: String,
}

impl Project {
    /// The in-charge assignments for this contract, one field per role.
    pub fn in_charge(&self) -> InCharge {
        InCharge {
            project_engineer: self.project_engineer.clone(),
            materials_engineer: self.materials_engineer.clone(),
            project_inspector: self.project_inspector.clone(),
            resident_engineer: self.resident_engineer.clone(),
            qa_in_charge: self.qa_in_charge.clone(),
            contractor_materials_engineer: self.contractor_materials_engineer.clone(),
        }
    }

    /// Column values in [`HEADERS`] order, for workbook export.
    pub fn header_values(&self) -> [&str; 21] {
        [
            &self.contract_id,
            &self.description,
            &self.location,
            &self.category,
            &self.appropriation,
            &self.approved_budget_cost,
            &self.contract_cost,
            &self.contractor,
            &self.start_date,
            &self.expiration_date,
            &self.limits,
            &self.completion_date,
            &self.status,
            &self.accomplishment,
            &self.remarks,
            &self.project_engineer,
            &self.materials_engineer,
            &self.project_inspector,
            &self.qa_in_charge,
            &self.resident_engineer,
            &self.contractor_materials_engineer,
        ]
    }
}

/// Personnel assigned to a contract, keyed by role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct InCharge {
    pub project_engineer: String,
    pub materials_engineer: String,
    pub project_inspector: String,
    pub resident_engineer: String,
    pub qa_in_charge: String,
    pub contractor_materials_engineer: String,
}

impl InCharge {
    pub fn values(&self) -> [&str; 6] {
        [
            &self.project_engineer,
            &self.materials_engineer,
            &self.project_inspector,
            &self.resident_engineer,
            &self.qa_in_charge,
            &self.contractor_materials_engineer,
        ]
    }
}

/// Partial update applied to a canonical record. Absent fields keep the
/// existing value; present fields replace it, empty strings included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectPatch {
    pub contract_id: Option<String>,
    pub contract_description: Option<String>,
    pub category: Option<String>,
    pub appropriation: Option<String>,
    pub approved_budget_cost: Option<String>,
    pub contract_cost: Option<String>,
    pub location: Option<String>,
    pub contractor: Option<String>,
    pub start_date: Option<String>,
    pub expiration_date: Option<String>,
    pub completion_date: Option<String>,
    pub status: Option<String>,
    pub accomplishment: Option<String>,
    pub remarks: Option<String>,
    pub project_engineer: Option<String>,
    pub materials_engineer: Option<String>,
    pub project_inspector: Option<String>,
    pub qa_in_charge: Option<String>,
    pub resident_engineer: Option<String>,
    pub contractor_materials_engineer: Option<String>,
}

impl ProjectPatch {
    /// Build a fresh record from the patch, defaulting absent fields to
    /// empty strings.
    pub fn into_project(self) -> Project {
        let mut project = Project::default();
        apply_patch(&mut project, &self);
        project
    }
}

/// Field-wise pick: a present patch value wins, an absent one keeps the
/// existing field.
pub fn apply_patch(project: &mut Project, patch: &ProjectPatch) {
    let pick = |field: &mut String, value: &Option<String>| {
        if let Some(value) = value {
            *field = value.clone();
        }
    };
    pick(&mut project.contract_id, &patch.contract_id);
    pick(&mut project.description, &patch.contract_description);
    pick(&mut project.category, &patch.category);
    pick(&mut project.appropriation, &patch.appropriation);
    pick(&mut project.approved_budget_cost, &patch.approved_budget_cost);
    pick(&mut project.contract_cost, &patch.contract_cost);
    pick(&mut project.location, &patch.location);
    pick(&mut project.contractor, &patch.contractor);
    pick(&mut project.start_date, &patch.start_date);
    pick(&mut project.expiration_date, &patch.expiration_date);
    pick(&mut project.completion_date, &patch.completion_date);
    pick(&mut project.status, &patch.status);
    pick(&mut project.accomplishment, &patch.accomplishment);
    pick(&mut project.remarks, &patch.remarks);
    pick(&mut project.project_engineer, &patch.project_engineer);
    pick(&mut project.materials_engineer, &patch.materials_engineer);
    pick(&mut project.project_inspector, &patch.project_inspector);
    pick(&mut project.qa_in_charge, &patch.qa_in_charge);
    pick(&mut project.resident_engineer, &patch.resident_engineer);
    pick(
        &mut project.contractor_materials_engineer,
        &patch.contractor_materials_engineer,
    );
}

/// Trim and uppercase a contract id.
///
/// Applied at every read/write boundary; lookups against an unnormalized
/// id silently miss, so nothing in this crate touches a raw one.
pub fn normalize_contract_id(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Clamp a free-form percent value ("55", "55%", 54.6) to a whole number
/// between 0 and 100. Unparseable input counts as zero.
pub fn parse_percent(value: &str) -> f64 {
    let cleaned = value.replace('%', "");
    let cleaned = cleaned.trim();
    let num: f64 = match cleaned.parse() {
        Ok(num) => num,
        Err(_) => return 0.0,
    };
    if num.is_nan() {
        return 0.0;
    }
    num.round().clamp(0.0, 100.0)
}

fn lenient_percent<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(num) => {
            parse_percent(&num.to_string())
        }
        serde_json::Value::String(text) => parse_percent(&text),
        _ => 0.0,
    })
}

/// Fields a non-admin "Update" action may change, layered over the base
/// record at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateOverride {
    pub status: String,
    #[serde(deserialize_with = "lenient_percent")]
    pub accomplishment: f64,
    pub completion_date: String,
    pub remarks: String,
    pub revised_contract_amount: String,
    pub revised_program_works: Vec<PowItem>,
    pub revised_expiration_dates: Vec<String>,
}

impl UpdateOverride {
    fn normalized(mut self) -> Self {
        self.accomplishment = parse_percent(&self.accomplishment.to_string());
        self.revised_program_works = pow::sanitize_items(self.revised_program_works);
        self
    }
}

/// Per-contract metadata captured outside the spreadsheet columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectMeta {
    pub location: String,
    pub coordinates: String,
}

fn overrides_ledger() -> OverrideLedger<UpdateOverride> {
    OverrideLedger::new(UPDATE_OVERRIDES_KEY)
}

fn meta_ledger() -> OverrideLedger<ProjectMeta> {
    OverrideLedger::new(PROJECT_META_KEY)
}

pub fn update_override(store: &dyn KeyValueStore, contract_id: &str) -> Option<UpdateOverride> {
    overrides_ledger().get(store, &normalize_contract_id(contract_id))
}

pub fn set_update_override(
    store: &mut dyn KeyValueStore,
    contract_id: &str,
    override_record: UpdateOverride,
) {
    overrides_ledger().set(
        store,
        &normalize_contract_id(contract_id),
        override_record.normalized(),
    );
}

pub fn remove_update_override(store: &mut dyn KeyValueStore, contract_id: &str) {
    overrides_ledger().remove(store, &normalize_contract_id(contract_id));
}

pub fn project_meta(store: &dyn KeyValueStore, contract_id: &str) -> Option<ProjectMeta> {
    meta_ledger().get(store, &normalize_contract_id(contract_id))
}

pub fn set_project_meta(store: &mut dyn KeyValueStore, contract_id: &str, meta: ProjectMeta) {
    meta_ledger().set(store, &normalize_contract_id(contract_id), meta);
}

/// One contract as the dashboard renders it: the base record with any
/// layered state merged in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectView {
    pub contract_id: String,
    pub contract_description: String,
    pub contractor: String,
    pub category: String,
    pub appropriation: String,
    pub approved_budget_cost: String,
    pub contract_cost: String,
    pub start_date: String,
    pub expiration_date: String,
    pub location: String,
    pub limits: String,
    pub coordinates: String,
    pub completion_date: String,
    pub accomplishment: f64,
    pub status: String,
    pub remarks: String,
    pub revised_contract_amount: String,
    pub revised_expiration_dates: Vec<String>,
    pub program_works: Vec<PowItem>,
    pub project_engineer: String,
    pub materials_engineer: String,
    pub project_inspector: String,
    pub qa_in_charge: String,
    pub resident_engineer: String,
    pub contractor_materials_engineer: String,
}

/// Merge a base record with its layered state into the rendered view.
///
/// This is the only merge path; list rows and detail panels must both go
/// through it so the two can never drift. Non-empty override fields win,
/// empty ones fall back to the base; the accomplishment figure always
/// comes from the override when one exists.
pub fn merge_with_base(
    base: &Project,
    override_record: Option<&UpdateOverride>,
    meta: Option<&ProjectMeta>,
) -> ProjectView {
    let mut view = ProjectView {
        contract_id: base.contract_id.clone(),
        contract_description: base.description.clone(),
        contractor: base.contractor.clone(),
        category: base.category.clone(),
        appropriation: base.appropriation.clone(),
        approved_budget_cost: base.approved_budget_cost.clone(),
        contract_cost: base.contract_cost.clone(),
        start_date: base.start_date.clone(),
        expiration_date: base.expiration_date.clone(),
        location: base.location.clone(),
        limits: base.limits.clone(),
        coordinates: String::new(),
        completion_date: base.completion_date.clone(),
        accomplishment: parse_percent(&base.accomplishment),
        status: base.status.clone(),
        remarks: base.remarks.clone(),
        revised_contract_amount: String::new(),
        revised_expiration_dates: Vec::new(),
        program_works: Vec::new(),
        project_engineer: base.project_engineer.clone(),
        materials_engineer: base.materials_engineer.clone(),
        project_inspector: base.project_inspector.clone(),
        qa_in_charge: base.qa_in_charge.clone(),
        resident_engineer: base.resident_engineer.clone(),
        contractor_materials_engineer: base.contractor_materials_engineer.clone(),
    };

    if let Some(meta) = meta {
        if view.location.is_empty() {
            view.location = meta.location.clone();
        }
        if view.coordinates.is_empty() {
            view.coordinates = meta.coordinates.clone();
        }
    }

    if let Some(o) = override_record {
        if !o.status.is_empty() {
            view.status = o.status.clone();
        }
        view.accomplishment = parse_percent(&o.accomplishment.to_string());
        if !o.completion_date.is_empty() {
            view.completion_date = o.completion_date.clone();
        }
        if !o.revised_contract_amount.is_empty() {
            view.revised_contract_amount = o.revised_contract_amount.clone();
        }
        if !o.revised_expiration_dates.is_empty() {
            view.revised_expiration_dates = o.revised_expiration_dates.clone();
        }
    }

    view
}

/// Merge one contract straight out of a store: override and meta are
/// looked up under the normalized id, POW items attached when present.
pub fn project_view(store: &dyn KeyValueStore, base: &Project) -> ProjectView {
    let override_record = update_override(store, &base.contract_id);
    let meta = project_meta(store, &base.contract_id);
    let mut view = merge_with_base(base, override_record.as_ref(), meta.as_ref());
    view.program_works = pow::project_pow(store, &base.contract_id);
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn base() -> Project {
        Project {
            contract_id: "AB-1".into(),
            description: "Road widening".into(),
            status: "Ongoing".into(),
            accomplishment: "10".into(),
            completion_date: "2025-01-15".into(),
            ..Project::default()
        }
    }

    #[test]
    fn contract_id_normalization_is_idempotent() {
        assert_eq!(normalize_contract_id(" ab-1 "), "AB-1");
        let once = normalize_contract_id(" ab-1 ");
        assert_eq!(normalize_contract_id(&once), once);
        assert_eq!(normalize_contract_id(""), "");
    }

    #[test]
    fn percent_parsing_clamps_and_rounds() {
        assert_eq!(parse_percent("55"), 55.0);
        assert_eq!(parse_percent(" 55% "), 55.0);
        assert_eq!(parse_percent("54.6"), 55.0);
        assert_eq!(parse_percent("150"), 100.0);
        assert_eq!(parse_percent("-3"), 0.0);
        assert_eq!(parse_percent("n/a"), 0.0);
        assert_eq!(parse_percent(""), 0.0);
    }

    #[test]
    fn override_fields_take_precedence() {
        let override_record = UpdateOverride {
            accomplishment: 55.0,
            ..UpdateOverride::default()
        };
        let view = merge_with_base(&base(), Some(&override_record), None);
        assert_eq!(view.status, "Ongoing");
        assert_eq!(view.accomplishment, 55.0);
        assert_eq!(view.completion_date, "2025-01-15");
    }

    #[test]
    fn removing_override_reverts_to_base() {
        let mut store = MemoryStore::new();
        let pristine = project_view(&store, &base());

        set_update_override(
            &mut store,
            "ab-1",
            UpdateOverride {
                status: "Completed".into(),
                accomplishment: 100.0,
                ..UpdateOverride::default()
            },
        );
        assert_eq!(project_view(&store, &base()).status, "Completed");

        remove_update_override(&mut store, " AB-1 ");
        assert_eq!(project_view(&store, &base()), pristine);
    }

    #[test]
    fn override_lookup_normalizes_the_id() {
        let mut store = MemoryStore::new();
        set_update_override(
            &mut store,
            " ab-1 ",
            UpdateOverride {
                status: "Suspended".into(),
                ..UpdateOverride::default()
            },
        );
        assert_eq!(
            update_override(&store, "AB-1").map(|o| o.status),
            Some("Suspended".into())
        );
    }

    #[test]
    fn override_write_normalizes_percent_and_part_rows() {
        let mut store = MemoryStore::new();
        set_update_override(
            &mut store,
            "AB-1",
            UpdateOverride {
                accomplishment: 154.4,
                revised_program_works: vec![PowItem {
                    item_no: "part i".into(),
                    description: "Facilities".into(),
                    quantity: "3".into(),
                    unit: "lot".into(),
                }],
                ..UpdateOverride::default()
            },
        );
        let stored = update_override(&store, "AB-1").unwrap();
        assert_eq!(stored.accomplishment, 100.0);
        assert_eq!(stored.revised_program_works[0].quantity, "");
        assert_eq!(stored.revised_program_works[0].unit, "");
    }

    #[test]
    fn meta_only_fills_missing_base_fields() {
        let meta = ProjectMeta {
            location: "Quezon City".into(),
            coordinates: "14.6,121.0".into(),
        };
        let mut with_location = base();
        with_location.location = "Manila".into();
        let view = merge_with_base(&with_location, None, Some(&meta));
        assert_eq!(view.location, "Manila");
        assert_eq!(view.coordinates, "14.6,121.0");
    }

    #[test]
    fn patch_pick_keeps_absent_fields() {
        let mut project = base();
        let patch = ProjectPatch {
            status: Some("Completed".into()),
            remarks: Some(String::new()),
            ..ProjectPatch::default()
        };
        apply_patch(&mut project, &patch);
        assert_eq!(project.status, "Completed");
        assert_eq!(project.remarks, "");
        assert_eq!(project.description, "Road widening");
    }
}
