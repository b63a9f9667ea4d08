use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ledger::OverrideLedger;
use crate::permissions::compute_permissions;
use crate::projects::{InCharge, normalize_contract_id};
use crate::storage::{
    COMPILED_DOCS_KEY, CONTRACT_FILES_DATA_KEY, CONTRACT_FILES_KEY, KeyValueStore,
};
use crate::users::ActiveUser;

pub const DEFAULT_DOC_STATUS: &str = "Not compiled yet.";

/// Who marked a document compiled, and when. Exists independently of any
/// uploaded file for the same document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CompiledEntry {
    pub by: String,
    pub checked_at: String,
}

/// Upload metadata for one compliance document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FileEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub mime: String,
    pub data_url: String,
}

/// Combined read of both independent markers for one document slot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentStatus {
    pub file: Option<FileEntry>,
    pub compiled: Option<CompiledEntry>,
}

impl DocumentStatus {
    /// The status line the dashboard shows. A stored file wins over a
    /// bare compiled marker.
    pub fn status_line(&self) -> String {
        if let Some(file) = &self.file {
            return format!("File: {}", file.name);
        }
        if let Some(entry) = &self.compiled {
            let by = entry.by.trim();
            let by = if by.is_empty() { "assigned user" } else { by };
            return format!("Compiled. Ask {} for the file.", by);
        }
        DEFAULT_DOC_STATUS.to_string()
    }
}

// Document slots are addressed by section, document name, and contract;
// only the contract id gets uppercased.
fn slot_key(section: &str, doc_name: &str, contract_id: &str) -> String {
    format!(
        "{}:{}:{}",
        section.trim(),
        doc_name.trim(),
        normalize_contract_id(contract_id)
    )
}

fn compiled_ledger() -> OverrideLedger<CompiledEntry> {
    OverrideLedger::new(COMPILED_DOCS_KEY)
}

fn file_name_ledger() -> OverrideLedger<String> {
    OverrideLedger::new(CONTRACT_FILES_KEY)
}

fn file_data_ledger() -> OverrideLedger<FileEntry> {
    OverrideLedger::new(CONTRACT_FILES_DATA_KEY)
}

pub fn compiled_entry(
    store: &dyn KeyValueStore,
    section: &str,
    doc_name: &str,
    contract_id: &str,
) -> Option<CompiledEntry> {
    compiled_ledger().get(store, &slot_key(section, doc_name, contract_id))
}

fn require_update_permission(
    user: Option<&ActiveUser>,
    in_charge: &InCharge,
    action: &str,
) -> Result<(), String> {
    if compute_permissions(user, in_charge).can_update {
        Ok(())
    } else {
        Err(format!(
            "You don't have permission to {} for this project.",
            action
        ))
    }
}

fn marker_name(user: Option<&ActiveUser>) -> String {
    let name = user.map(|u| u.name.trim()).unwrap_or("");
    if name.is_empty() {
        "this user".to_string()
    } else {
        name.to_string()
    }
}

/// Mark a document compiled by the current user. Fails before any write
/// when the contract id is missing or the user lacks update rights.
pub fn mark_compiled(
    store: &mut dyn KeyValueStore,
    user: Option<&ActiveUser>,
    in_charge: &InCharge,
    section: &str,
    doc_name: &str,
    contract_id: &str,
) -> Result<CompiledEntry, String> {
    if normalize_contract_id(contract_id).is_empty() {
        return Err("Missing contract ID.".to_string());
    }
    require_update_permission(user, in_charge, "update documents")?;
    let entry = CompiledEntry {
        by: marker_name(user),
        checked_at: Utc::now().to_rfc3339(),
    };
    compiled_ledger().set(store, &slot_key(section, doc_name, contract_id), entry.clone());
    Ok(entry)
}

pub fn unmark_compiled(
    store: &mut dyn KeyValueStore,
    section: &str,
    doc_name: &str,
    contract_id: &str,
) {
    compiled_ledger().remove(store, &slot_key(section, doc_name, contract_id));
}

/// Attach an uploaded file to a document slot. Uploading also marks the
/// slot compiled by the uploader.
pub fn attach_file(
    store: &mut dyn KeyValueStore,
    user: Option<&ActiveUser>,
    in_charge: &InCharge,
    section: &str,
    doc_name: &str,
    contract_id: &str,
    file: FileEntry,
) -> Result<(), String> {
    if normalize_contract_id(contract_id).is_empty() {
        return Err("Missing contract ID.".to_string());
    }
    require_update_permission(user, in_charge, "upload documents")?;
    let key = slot_key(section, doc_name, contract_id);
    file_name_ledger().set(store, &key, file.name.clone());
    file_data_ledger().set(store, &key, file);
    mark_compiled(store, user, in_charge, section, doc_name, contract_id)?;
    Ok(())
}

pub fn remove_file(
    store: &mut dyn KeyValueStore,
    section: &str,
    doc_name: &str,
    contract_id: &str,
) {
    let key = slot_key(section, doc_name, contract_id);
    file_name_ledger().remove(store, &key);
    file_data_ledger().remove(store, &key);
}

/// Read both markers for a slot. Upload and compiled state live in
/// separate families and can disagree, so callers always get both.
pub fn document_status(
    store: &dyn KeyValueStore,
    section: &str,
    doc_name: &str,
    contract_id: &str,
) -> DocumentStatus {
    let key = slot_key(section, doc_name, contract_id);
    DocumentStatus {
        file: file_data_ledger().get(store, &key),
        compiled: compiled_ledger().get(store, &key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn assigned_user() -> ActiveUser {
        ActiveUser {
            name: "Juan Dela Cruz".into(),
            ..ActiveUser::default()
        }
    }

    fn in_charge() -> InCharge {
        InCharge {
            project_engineer: "Dela Cruz, Juan".into(),
            ..InCharge::default()
        }
    }

    #[test]
    fn compiled_marker_lifecycle() {
        let mut store = MemoryStore::new();
        let user = assigned_user();

        let entry = mark_compiled(
            &mut store,
            Some(&user),
            &in_charge(),
            "Quality Control",
            "QCA-01",
            " ab-1 ",
        )
        .unwrap();
        assert_eq!(entry.by, "Juan Dela Cruz");

        // lookup normalizes the contract id the same way the write did
        let stored = compiled_entry(&store, "Quality Control", "QCA-01", "AB-1").unwrap();
        assert_eq!(stored.by, "Juan Dela Cruz");
        assert!(!stored.checked_at.is_empty());

        unmark_compiled(&mut store, "Quality Control", "QCA-01", "AB-1");
        assert_eq!(compiled_entry(&store, "Quality Control", "QCA-01", "AB-1"), None);
    }

    #[test]
    fn unassigned_user_cannot_mark_compiled() {
        let mut store = MemoryStore::new();
        let outsider = ActiveUser {
            name: "Pedro Santos".into(),
            ..ActiveUser::default()
        };
        let result = mark_compiled(
            &mut store,
            Some(&outsider),
            &in_charge(),
            "Quality Control",
            "QCA-01",
            "AB-1",
        );
        assert!(result.is_err());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn missing_contract_id_aborts_before_writing() {
        let mut store = MemoryStore::new();
        let result = mark_compiled(
            &mut store,
            Some(&assigned_user()),
            &in_charge(),
            "Quality Control",
            "QCA-01",
            "   ",
        );
        assert_eq!(result, Err("Missing contract ID.".to_string()));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn upload_marks_compiled_and_both_markers_are_independent() {
        let mut store = MemoryStore::new();
        let user = assigned_user();
        attach_file(
            &mut store,
            Some(&user),
            &in_charge(),
            "Plans",
            "AS-BUILT PLAN",
            "AB-1",
            FileEntry {
                name: "as-built.pdf".into(),
                mime: "application/pdf".into(),
                data_url: "data:application/pdf;base64,AA==".into(),
            },
        )
        .unwrap();

        let status = document_status(&store, "Plans", "AS-BUILT PLAN", "AB-1");
        assert_eq!(status.status_line(), "File: as-built.pdf");
        assert!(status.compiled.is_some());

        // deleting the file leaves the compiled marker behind
        remove_file(&mut store, "Plans", "AS-BUILT PLAN", "AB-1");
        let status = document_status(&store, "Plans", "AS-BUILT PLAN", "AB-1");
        assert!(status.file.is_none());
        assert!(status.compiled.is_some());
        assert!(status.status_line().starts_with("Compiled. Ask"));
    }

    #[test]
    fn empty_slot_reads_as_not_compiled() {
        let store = MemoryStore::new();
        let status = document_status(&store, "Plans", "ORIGINAL PLAN", "AB-1");
        assert_eq!(status.status_line(), DEFAULT_DOC_STATUS);
    }
}
