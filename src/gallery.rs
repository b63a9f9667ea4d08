use serde::{Deserialize, Serialize};

use crate::ledger::OverrideLedger;
use crate::permissions::compute_permissions;
use crate::projects::{InCharge, normalize_contract_id};
use crate::storage::{GALLERY_PHOTOS_KEY, KeyValueStore};
use crate::users::ActiveUser;

/// One geotagged site photo stored against a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GalleryPhoto {
    pub name: String,
    pub date: String,
    pub data_url: String,
}

fn photos_ledger() -> OverrideLedger<Vec<GalleryPhoto>> {
    OverrideLedger::new(GALLERY_PHOTOS_KEY)
}

pub fn photos_for(store: &dyn KeyValueStore, contract_id: &str) -> Vec<GalleryPhoto> {
    photos_ledger()
        .get(store, &normalize_contract_id(contract_id))
        .unwrap_or_default()
}

/// Append photos to a contract's album, gated on update permission.
pub fn add_photos(
    store: &mut dyn KeyValueStore,
    user: Option<&ActiveUser>,
    in_charge: &InCharge,
    contract_id: &str,
    photos: Vec<GalleryPhoto>,
) -> Result<usize, String> {
    let key = normalize_contract_id(contract_id);
    if key.is_empty() || photos.is_empty() {
        return Ok(0);
    }
    if !compute_permissions(user, in_charge).can_update {
        return Err("You don't have permission to upload photos for this project.".to_string());
    }
    let mut album = photos_for(store, &key);
    let added = photos.len();
    album.extend(photos);
    photos_ledger().set(store, &key, album);
    Ok(added)
}

pub fn remove_photo(store: &mut dyn KeyValueStore, contract_id: &str, index: usize) -> bool {
    let key = normalize_contract_id(contract_id);
    let mut album = photos_for(store, &key);
    if index >= album.len() {
        return false;
    }
    album.remove(index);
    photos_ledger().set(store, &key, album);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn photo(name: &str) -> GalleryPhoto {
        GalleryPhoto {
            name: name.into(),
            date: "2025-06-01T00:00:00Z".into(),
            data_url: "data:image/jpeg;base64,AA==".into(),
        }
    }

    fn admin() -> ActiveUser {
        ActiveUser {
            name: "Admin".into(),
            is_admin: true,
            ..ActiveUser::default()
        }
    }

    #[test]
    fn album_appends_and_removes() {
        let mut store = MemoryStore::new();
        let user = admin();
        add_photos(&mut store, Some(&user), &InCharge::default(), "ab-1", vec![photo("a.jpg")])
            .unwrap();
        add_photos(&mut store, Some(&user), &InCharge::default(), "AB-1", vec![photo("b.jpg")])
            .unwrap();
        assert_eq!(photos_for(&store, "AB-1").len(), 2);

        assert!(remove_photo(&mut store, "AB-1", 0));
        assert_eq!(photos_for(&store, "AB-1")[0].name, "b.jpg");
        assert!(!remove_photo(&mut store, "AB-1", 5));
    }

    #[test]
    fn outsider_cannot_add_photos() {
        let mut store = MemoryStore::new();
        let outsider = ActiveUser {
            name: "Pedro Santos".into(),
            ..ActiveUser::default()
        };
        let result = add_photos(
            &mut store,
            Some(&outsider),
            &InCharge::default(),
            "AB-1",
            vec![photo("a.jpg")],
        );
        assert!(result.is_err());
        assert!(photos_for(&store, "AB-1").is_empty());
    }
}
