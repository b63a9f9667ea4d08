use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::storage::{ENGINEERS_KEY, KeyValueStore};

lazy_static! {
    static ref ACCREDITATION_CODE: Regex = Regex::new(r"^(?i)#?[A-Z0-9-]{4,}$").unwrap();
}

/// One entry in the field-personnel directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Engineer {
    pub name: String,
    pub role: String,
    pub designation: String,
    pub accreditation: String,
    pub phone: String,
    pub facebook: String,
}

fn normalize_name_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Collapse the role spellings seen in the spreadsheet into the canonical
/// role titles.
pub fn normalize_role(role: &str) -> String {
    let value = role.trim();
    if value.is_empty() {
        return String::new();
    }
    match value.to_lowercase().as_str() {
        "project engineer" | "project engineers" => "Project Engineer".to_string(),
        "materials engineer" | "materials engineers" => "Materials Engineer".to_string(),
        "provisional engineer" | "provisional engineers" | "project inspector"
        | "project inspectors" => "Project Inspector".to_string(),
        "resident engineer" | "resident engineers" => "Resident Engineer".to_string(),
        "qa in-charge" | "qa in charge" | "qa in-charges" => "QA In-Charge".to_string(),
        "contractor materials engineer"
        | "contractors materials engineer"
        | "contractor's materials engineer"
        | "contractors materials engineers" => "Contractor Materials Engineer".to_string(),
        _ => value.to_string(),
    }
}

/// Directory rows sometimes carry the accreditation code in the
/// designation column; split the two apart.
pub fn split_designation_accreditation(designation: &str, accreditation: &str) -> (String, String) {
    let raw_designation = designation.trim();
    let raw_accreditation = accreditation.trim();
    if !raw_designation.is_empty() {
        return (raw_designation.to_string(), raw_accreditation.to_string());
    }
    if ACCREDITATION_CODE.is_match(raw_accreditation) {
        (String::new(), raw_accreditation.to_string())
    } else {
        (raw_accreditation.to_string(), String::new())
    }
}

/// Find a directory entry by name, preferring a role match when several
/// entries share the name.
pub fn find_engineer<'a>(
    engineers: &'a [Engineer],
    name: &str,
    preferred_role: &str,
) -> Option<&'a Engineer> {
    let key = normalize_name_key(name);
    if key.is_empty() {
        return None;
    }
    let matches: Vec<&Engineer> = engineers
        .iter()
        .filter(|engineer| normalize_name_key(&engineer.name) == key)
        .collect();
    if matches.is_empty() {
        return None;
    }
    let target_role = normalize_name_key(preferred_role);
    if !target_role.is_empty() {
        if let Some(by_role) = matches
            .iter()
            .find(|engineer| normalize_name_key(&engineer.role) == target_role)
        {
            return Some(by_role);
        }
    }
    Some(matches[0])
}

/// Insert or replace by (name, role). A replacement keeps the original
/// spelling of the name.
pub fn upsert_engineer(engineers: &mut Vec<Engineer>, incoming: Engineer) {
    let mut incoming = incoming;
    incoming.role = normalize_role(&incoming.role);
    let (designation, accreditation) =
        split_designation_accreditation(&incoming.designation, &incoming.accreditation);
    incoming.designation = designation;
    incoming.accreditation = accreditation;

    let name_key = normalize_name_key(&incoming.name);
    let role_key = normalize_name_key(&incoming.role);
    if let Some(existing) = engineers.iter_mut().find(|engineer| {
        normalize_name_key(&engineer.name) == name_key
            && normalize_name_key(&engineer.role) == role_key
    }) {
        incoming.name = existing.name.clone();
        *existing = incoming;
    } else {
        engineers.push(incoming);
    }
}

/// Remove by name; a role narrows the match to that one assignment.
pub fn remove_engineer(engineers: &mut Vec<Engineer>, name: &str, role: Option<&str>) -> bool {
    let name_key = normalize_name_key(name);
    let before = engineers.len();
    match role {
        Some(role) => {
            let role_key = normalize_name_key(role);
            engineers.retain(|engineer| {
                !(normalize_name_key(&engineer.name) == name_key
                    && normalize_name_key(&engineer.role) == role_key)
            });
        }
        None => engineers.retain(|engineer| normalize_name_key(&engineer.name) != name_key),
    }
    engineers.len() != before
}

pub fn load_directory(store: &dyn KeyValueStore) -> Vec<Engineer> {
    let raw = match store.get(ENGINEERS_KEY) {
        Some(raw) => raw,
        None => return Vec::new(),
    };
    serde_json::from_str(&raw).unwrap_or_default()
}

pub fn save_directory(store: &mut dyn KeyValueStore, engineers: &[Engineer]) {
    if let Ok(json) = serde_json::to_string(engineers) {
        store.set(ENGINEERS_KEY, &json);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn engineer(name: &str, role: &str) -> Engineer {
        Engineer {
            name: name.into(),
            role: role.into(),
            ..Engineer::default()
        }
    }

    #[test]
    fn role_spellings_collapse() {
        assert_eq!(normalize_role("project engineers"), "Project Engineer");
        assert_eq!(normalize_role("Provisional Engineer"), "Project Inspector");
        assert_eq!(normalize_role("qa in charge"), "QA In-Charge");
        assert_eq!(normalize_role("Chief Clerk"), "Chief Clerk");
        assert_eq!(normalize_role("  "), "");
    }

    #[test]
    fn accreditation_codes_are_pulled_out_of_designation() {
        assert_eq!(
            split_designation_accreditation("", "#ME-1234"),
            (String::new(), "#ME-1234".to_string())
        );
        assert_eq!(
            split_designation_accreditation("", "Engineer II"),
            ("Engineer II".to_string(), String::new())
        );
        assert_eq!(
            split_designation_accreditation("Engineer III", "1234-A"),
            ("Engineer III".to_string(), "1234-A".to_string())
        );
    }

    #[test]
    fn upsert_replaces_same_name_and_role() {
        let mut list = Vec::new();
        upsert_engineer(&mut list, engineer("Juan Dela Cruz", "Project Engineer"));
        let mut updated = engineer("JUAN DELA CRUZ", "project engineers");
        updated.phone = "0917".into();
        upsert_engineer(&mut list, updated);

        assert_eq!(list.len(), 1);
        // original spelling wins, new details land
        assert_eq!(list[0].name, "Juan Dela Cruz");
        assert_eq!(list[0].phone, "0917");

        upsert_engineer(&mut list, engineer("Juan Dela Cruz", "Materials Engineer"));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn lookup_prefers_matching_role() {
        let list = vec![
            engineer("Juan Dela Cruz", "Project Engineer"),
            engineer("Juan Dela Cruz", "Materials Engineer"),
        ];
        let hit = find_engineer(&list, "juan dela cruz", "materials engineer").unwrap();
        assert_eq!(hit.role, "Materials Engineer");
        let fallback = find_engineer(&list, "Juan Dela Cruz", "Resident Engineer").unwrap();
        assert_eq!(fallback.role, "Project Engineer");
        assert!(find_engineer(&list, "Nobody", "").is_none());
    }

    #[test]
    fn removal_with_and_without_role() {
        let mut list = vec![
            engineer("A", "Project Engineer"),
            engineer("A", "Materials Engineer"),
            engineer("B", "Project Engineer"),
        ];
        assert!(remove_engineer(&mut list, "a", Some("project engineer")));
        assert_eq!(list.len(), 2);
        assert!(remove_engineer(&mut list, "A", None));
        assert_eq!(list.len(), 1);
        assert!(!remove_engineer(&mut list, "missing", None));
    }

    #[test]
    fn directory_round_trips_through_storage() {
        let mut store = MemoryStore::new();
        let mut list = Vec::new();
        upsert_engineer(&mut list, engineer("Juan Dela Cruz", "Project Engineer"));
        save_directory(&mut store, &list);
        assert_eq!(load_directory(&store), list);

        store.set(ENGINEERS_KEY, "broken");
        assert!(load_directory(&store).is_empty());
    }
}
