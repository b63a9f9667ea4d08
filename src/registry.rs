use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;

use crate::engineers::{self, Engineer};
use crate::pow::PowRecord;
use crate::projects::{Project, ProjectPatch, apply_patch, normalize_contract_id};

/// The canonical dashboard data: base contract records, per-contract
/// Program of Works, the personnel directory, and the remote
/// client-storage namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Registry {
    pub projects: Vec<Project>,
    pub pow: BTreeMap<String, PowRecord>,
    pub engineers: Vec<Engineer>,
    pub client_storage: BTreeMap<String, String>,
}

pub fn save_registry(registry: &Registry, filename: &str) -> std::io::Result<()> {
    if let Some(parent) = std::path::Path::new(filename).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(filename)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut writer = std::io::BufWriter::new(encoder);

    serialize_into(&mut writer, registry)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    Ok(())
}

pub fn load_registry(filename: &str) -> std::io::Result<Registry> {
    let file = File::open(filename)?;
    let decoder = GzDecoder::new(file);
    let mut reader = std::io::BufReader::new(decoder);

    let registry: Registry = deserialize_from(&mut reader)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    Ok(registry)
}

impl Registry {
    fn find_project(&self, contract_id: &str) -> Option<usize> {
        let target = normalize_contract_id(contract_id);
        if target.is_empty() {
            return None;
        }
        self.projects
            .iter()
            .position(|project| normalize_contract_id(&project.contract_id) == target)
    }

    pub fn project(&self, contract_id: &str) -> Option<&Project> {
        self.find_project(contract_id).map(|i| &self.projects[i])
    }

    /// Append a new base record.
    pub fn save_project(&mut self, project: Project) -> Result<(), String> {
        if normalize_contract_id(&project.contract_id).is_empty() {
            return Err("Missing contractId".to_string());
        }
        self.projects.push(project);
        Ok(())
    }

    /// Apply a field-wise partial update to the base record. Editing the
    /// base clears the contract's layered Program of Works record rather
    /// than stacking on top of it.
    pub fn update_project(
        &mut self,
        contract_id: &str,
        patch: &ProjectPatch,
    ) -> Result<(), String> {
        let index = match self.find_project(contract_id) {
            Some(index) => index,
            None => return Err("Project not found".to_string()),
        };
        apply_patch(&mut self.projects[index], patch);
        self.delete_pow_record(contract_id);
        Ok(())
    }

    /// Remove the base record and the layered state owned here.
    pub fn delete_project(&mut self, contract_id: &str) -> bool {
        match self.find_project(contract_id) {
            Some(index) => {
                self.projects.remove(index);
                self.delete_pow_record(contract_id);
                true
            }
            None => false,
        }
    }

    /// The Program of Works for a contract; contracts without one read
    /// as an empty record, not an error.
    pub fn pow_record(&self, contract_id: &str) -> PowRecord {
        let key = normalize_contract_id(contract_id);
        self.pow.get(&key).cloned().unwrap_or_default()
    }

    pub fn set_pow_record(&mut self, contract_id: &str, payload: &Value) -> Option<PowRecord> {
        let key = normalize_contract_id(contract_id);
        if key.is_empty() {
            return None;
        }
        let record = PowRecord::from_payload(payload);
        self.pow.insert(key, record.clone());
        Some(record)
    }

    pub fn delete_pow_record(&mut self, contract_id: &str) -> bool {
        let key = normalize_contract_id(contract_id);
        self.pow.remove(&key).is_some()
    }

    pub fn upsert_engineer(&mut self, incoming: Engineer) -> Result<(), String> {
        if incoming.name.trim().is_empty() {
            return Err("Engineer name is required.".to_string());
        }
        engineers::upsert_engineer(&mut self.engineers, incoming);
        Ok(())
    }

    pub fn remove_engineer(&mut self, name: &str, role: Option<&str>) -> bool {
        engineers::remove_engineer(&mut self.engineers, name, role)
    }

    // remote client-storage namespace, one flat string map per deployment

    pub fn storage_snapshot(&self) -> &BTreeMap<String, String> {
        &self.client_storage
    }

    pub fn set_storage_item(&mut self, key: &str, value: &str) -> bool {
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        self.client_storage.insert(key.to_string(), value.to_string());
        true
    }

    pub fn remove_storage_item(&mut self, key: &str) -> bool {
        self.client_storage.remove(key.trim()).is_some()
    }

    pub fn clear_storage(&mut self) {
        self.client_storage.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project(contract_id: &str) -> Project {
        Project {
            contract_id: contract_id.into(),
            description: "Road widening".into(),
            status: "Ongoing".into(),
            ..Project::default()
        }
    }

    #[test]
    fn save_rejects_missing_contract_id() {
        let mut registry = Registry::default();
        assert!(registry.save_project(project("  ")).is_err());
        assert!(registry.save_project(project("AB-1")).is_ok());
        assert_eq!(registry.projects.len(), 1);
    }

    #[test]
    fn lookup_normalizes_contract_ids() {
        let mut registry = Registry::default();
        registry.save_project(project("AB-1")).unwrap();
        assert!(registry.project(" ab-1 ").is_some());
        assert!(registry.project("AB-2").is_none());
    }

    #[test]
    fn update_picks_present_fields_and_clears_pow() {
        let mut registry = Registry::default();
        registry.save_project(project("AB-1")).unwrap();
        registry.set_pow_record("AB-1", &json!({"programWorks": [{"itemNo": "100"}]}));

        let patch = ProjectPatch {
            status: Some("Completed".into()),
            contractor: Some(String::new()),
            ..ProjectPatch::default()
        };
        registry.update_project("ab-1", &patch).unwrap();

        let updated = registry.project("AB-1").unwrap();
        assert_eq!(updated.status, "Completed");
        assert_eq!(updated.contractor, "");
        assert_eq!(updated.description, "Road widening");
        // the base edit replaced layered state instead of stacking on it
        assert!(registry.pow_record("AB-1").program_works.is_empty());

        assert_eq!(
            registry.update_project("ZZ-9", &ProjectPatch::default()),
            Err("Project not found".to_string())
        );
    }

    #[test]
    fn delete_removes_row_and_pow() {
        let mut registry = Registry::default();
        registry.save_project(project("AB-1")).unwrap();
        registry.set_pow_record("AB-1", &json!({"programWorks": [{"itemNo": "100"}]}));

        assert!(registry.delete_project("ab-1"));
        assert!(registry.project("AB-1").is_none());
        assert!(registry.pow_record("AB-1").program_works.is_empty());
        assert!(!registry.delete_project("AB-1"));
    }

    #[test]
    fn pow_records_are_stamped_and_keyed_normalized() {
        let mut registry = Registry::default();
        let record = registry
            .set_pow_record(" ab-1 ", &json!({"programWorks": [{"itemNo": "100"}]}))
            .unwrap();
        assert!(!record.updated_at.is_empty());
        assert_eq!(registry.pow_record("AB-1").program_works.len(), 1);
        assert!(registry.set_pow_record("  ", &json!({})).is_none());
    }

    #[test]
    fn storage_namespace_round_trip() {
        let mut registry = Registry::default();
        assert!(registry.set_storage_item("projectUpdates", "{}"));
        assert!(!registry.set_storage_item("  ", "x"));
        assert!(registry.remove_storage_item("projectUpdates"));
        assert!(!registry.remove_storage_item("projectUpdates"));

        registry.set_storage_item("a", "1");
        registry.clear_storage();
        assert!(registry.storage_snapshot().is_empty());
    }

    #[test]
    fn registry_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.bin.gz");
        let path = path.to_str().unwrap();

        let mut registry = Registry::default();
        registry.save_project(project("AB-1")).unwrap();
        registry.set_pow_record("AB-1", &json!({"programWorks": [{"itemNo": "100"}]}));
        registry.set_storage_item("projectUpdates", "{}");

        save_registry(&registry, path).unwrap();
        let loaded = load_registry(path).unwrap();
        assert_eq!(loaded, registry);

        assert!(load_registry(dir.path().join("missing.bin.gz").to_str().unwrap()).is_err());
    }
}
