use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::projects::InCharge;
use crate::users::ActiveUser;

lazy_static! {
    static ref NAME_DELIMITERS: Regex = Regex::new(r"(?i)[,/;&]+|\band\b").unwrap();
}

/// What the current user may do with one contract
///
/// Derived, never stored: recomputed from the session user and the
/// contract's in-charge assignments at every decision point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub can_view: bool,
    pub can_update: bool,
    pub can_edit: bool,
    pub can_delete: bool,
}

impl Permissions {
    pub fn none() -> Self {
        Permissions {
            can_view: false,
            can_update: false,
            can_edit: false,
            can_delete: false,
        }
    }

    pub fn all() -> Self {
        Permissions {
            can_view: true,
            can_update: true,
            can_edit: true,
            can_delete: true,
        }
    }
}

pub fn normalize_person_name(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Split a free-text personnel field into candidate names.
///
/// Official fields routinely pack several assignees into one cell joined
/// by `,`, `/`, `;`, `&` or the word "and".
pub fn split_names(value: &str) -> Vec<String> {
    NAME_DELIMITERS
        .split(value)
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

// NFD-decompose, drop combining diacritics, map everything that is not
// ASCII alphanumeric to a space, lowercase, collapse runs of whitespace.
fn normalize_for_match(name: &str) -> String {
    let stripped: String = name
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .collect();
    let cleaned: String = stripped
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c.is_whitespace() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn match_tokens(name: &str) -> Vec<String> {
    normalize_for_match(name)
        .split(' ')
        .filter(|token| token.len() > 1)
        .map(|token| token.to_string())
        .collect()
}

/// Whether `current_user_name` matches any name packed into `field`.
///
/// Matching is deliberately fuzzy because personnel fields are
/// inconsistently formatted: a candidate matches on normalized equality,
/// substring containment in either direction, or when the multi-character
/// tokens of one side form a subset of the other's (both directions, so
/// "Dela Cruz, Juan" and "Juan Dela Cruz" agree).
pub fn user_matches_name(current_user_name: &str, field: &str) -> bool {
    if current_user_name.is_empty() {
        return false;
    }
    let target = normalize_for_match(current_user_name);
    let target_tokens = match_tokens(current_user_name);

    split_names(field).iter().any(|name| {
        let candidate = normalize_for_match(name);
        if candidate.is_empty() {
            return false;
        }
        if candidate == target {
            return true;
        }
        if candidate.contains(&target) || target.contains(&candidate) {
            return true;
        }

        let candidate_tokens = match_tokens(name);
        if target_tokens.is_empty() || candidate_tokens.is_empty() {
            return false;
        }
        target_tokens
            .iter()
            .all(|token| candidate_tokens.contains(token))
            || candidate_tokens
                .iter()
                .all(|token| target_tokens.contains(token))
    })
}

/// Whether the user is assigned to the contract in any in-charge role.
/// Admins are always treated as in charge.
pub fn is_user_in_charge(user: Option<&ActiveUser>, in_charge: &InCharge) -> bool {
    let user = match user {
        Some(user) => user,
        None => return false,
    };
    if user.is_admin_user() {
        return true;
    }
    if user.name.is_empty() {
        return false;
    }
    in_charge
        .values()
        .iter()
        .any(|field| user_matches_name(&user.name, field))
}

/// Map the session user and a contract's assignments to concrete rights.
///
/// Admin and superadmin get everything. Anyone else can view and update a
/// contract only when their display name matches one of its in-charge
/// fields, and can never edit or delete the base record.
pub fn compute_permissions(user: Option<&ActiveUser>, in_charge: &InCharge) -> Permissions {
    let admin = user.map(ActiveUser::is_admin_user).unwrap_or(false);
    let assigned = is_user_in_charge(user, in_charge);
    Permissions {
        can_view: admin || assigned,
        can_update: admin || assigned,
        can_edit: admin,
        can_delete: admin,
    }
}
