use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Utc;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::storage::{KeyValueStore, SESSION_KEY, USERS_KEY};

/// Emails that are always treated as administrators.
pub const ADMIN_EMAILS: [&str; 3] = [
    "krong0814@gmail.com",
    "lemuel.malinao@gmail.com",
    "alanpancitojr@gmail.com",
];

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_APPROVED: &str = "approved";
pub const STATUS_BLOCKED: &str = "blocked";

const SESSION_DURATION: u64 = 24 * 60 * 60; // 24 hours in seconds
const MIN_PASSWORD_LEN: usize = 6;

/// Registered account
///
/// Accounts live as one JSON array under the `dpwh_users` storage key.
/// A pre-approved account (created by an administrator ahead of signup)
/// carries an empty password hash until its owner completes signup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Account {
    /// Display name, matched against contract in-charge fields
    pub name: String,

    /// Email address (unique, normalized lowercase)
    pub email: String,

    /// Office section the user belongs to
    pub section: String,

    /// Argon2 hash of the password; empty for pre-approved accounts
    pub password_hash: String,

    /// Approval lifecycle: "pending", "approved" or "blocked"
    pub status: String,

    /// Creation timestamp (RFC 3339)
    pub created_at: String,

    /// Last modification timestamp (RFC 3339)
    pub updated_at: String,
}

impl Account {
    /// Whether this account was created by an admin and is still waiting
    /// for its owner to pick a password.
    pub fn is_pre_approved(&self) -> bool {
        self.password_hash.is_empty()
    }
}

/// The signed-in user as the rest of the dashboard sees it
///
/// Persisted under `dpwh_current_user` so every page reads the same
/// session payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ActiveUser {
    pub email: String,
    pub name: String,
    pub section: String,
    pub is_admin: bool,
    pub role: String,
    pub login_at: String,
}

impl ActiveUser {
    pub fn is_admin_user(&self) -> bool {
        self.is_admin || self.role == "admin" || self.role == "superadmin"
    }
}

/// Server-side session handle for one signed-in user.
#[derive(Debug, Clone)]
pub struct Session {
    pub email: String,
    pub expires_at: SystemTime,
}

lazy_static! {
    static ref SESSIONS: RwLock<HashMap<String, Session>> = RwLock::new(HashMap::new());
}

pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn is_admin_email(email: &str) -> bool {
    let normalized = normalize_email(email);
    ADMIN_EMAILS
        .iter()
        .any(|admin| normalize_email(admin) == normalized)
}

/// Read every registered account. Missing or unreadable data degrades to
/// an empty list.
pub fn load_accounts(store: &dyn KeyValueStore) -> Vec<Account> {
    let raw = match store.get(USERS_KEY) {
        Some(raw) => raw,
        None => return Vec::new(),
    };
    serde_json::from_str(&raw).unwrap_or_default()
}

pub fn save_accounts(store: &mut dyn KeyValueStore, accounts: &[Account]) {
    if let Ok(json) = serde_json::to_string(accounts) {
        store.set(USERS_KEY, &json);
    }
}

/// Hash a password with Argon2id and a fresh salt.
///
/// # Errors
/// * Returns an error if the password hashing fails
fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    match argon2.hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(_) => Err("Password hashing failed".to_string()),
    }
}

/// Verify a password against a stored hash. An empty stored hash (a
/// pre-approved account that never finished signup) never matches.
fn verify_password(password: &str, hash: &str) -> Result<bool, String> {
    if hash.is_empty() {
        return Ok(false);
    }
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(hash) => hash,
        Err(_) => return Err("Invalid password hash format".to_string()),
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false), // Password didn't match
    }
}

/// Register a new account
///
/// Creates a pending account, or completes a pre-approved one when the
/// email already exists with no password set. Administrator emails come
/// out approved immediately.
///
/// # Arguments
/// * `name` - Display name, matched later against in-charge fields
/// * `email` - Unique email address
/// * `section` - Office section
/// * `password` / `confirm` - Chosen password, entered twice
///
/// # Errors
/// * Returns an error when a required field is missing, the password is
///   too short or mismatched, or the email is already taken by a
///   completed account
pub fn signup(
    store: &mut dyn KeyValueStore,
    name: &str,
    email: &str,
    section: &str,
    password: &str,
    confirm: &str,
) -> Result<Account, String> {
    let name = name.trim();
    let email = normalize_email(email);
    let section = section.trim();

    if name.is_empty() || email.is_empty() || section.is_empty() || password.is_empty() {
        return Err("Please complete all required fields.".to_string());
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err("Password must be at least 6 characters.".to_string());
    }
    if password != confirm {
        return Err("Passwords do not match.".to_string());
    }

    let mut accounts = load_accounts(store);
    let now = Utc::now().to_rfc3339();

    if let Some(existing) = accounts
        .iter_mut()
        .find(|account| normalize_email(&account.email) == email)
    {
        if !existing.is_pre_approved() {
            return Err("An account with this email already exists.".to_string());
        }
        // complete the admin-created account in place; its approval stands
        existing.name = name.to_string();
        existing.section = section.to_string();
        existing.password_hash = hash_password(password)?;
        existing.updated_at = now;
        let completed = existing.clone();
        save_accounts(store, &accounts);
        return Ok(completed);
    }

    let status = if is_admin_email(&email) {
        STATUS_APPROVED
    } else {
        STATUS_PENDING
    };
    let account = Account {
        name: name.to_string(),
        email,
        section: section.to_string(),
        password_hash: hash_password(password)?,
        status: status.to_string(),
        created_at: now,
        updated_at: String::new(),
    };
    accounts.push(account.clone());
    save_accounts(store, &accounts);
    Ok(account)
}

/// Verify credentials and build the session payload
///
/// Administrator accounts are healed to "approved" on successful login;
/// everyone else must already be approved.
///
/// # Errors
/// * Returns a user-facing message for missing input, bad credentials,
///   and blocked or still-pending accounts
pub fn login(
    store: &mut dyn KeyValueStore,
    email: &str,
    password: &str,
) -> Result<ActiveUser, String> {
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
        return Err("Please enter your email and password.".to_string());
    }

    let mut accounts = load_accounts(store);
    let account = match accounts
        .iter_mut()
        .find(|account| normalize_email(&account.email) == email)
    {
        Some(account) => account,
        None => return Err("Invalid email or password.".to_string()),
    };
    if !verify_password(password, &account.password_hash)? {
        return Err("Invalid email or password.".to_string());
    }

    let is_admin = is_admin_email(&account.email);
    if !is_admin {
        let status = if account.status.is_empty() {
            STATUS_PENDING
        } else {
            account.status.as_str()
        };
        if status != STATUS_APPROVED {
            return Err(if status == STATUS_BLOCKED {
                "Your account was blocked. Please contact the admin.".to_string()
            } else {
                "Your account is pending approval. Please wait for admin approval.".to_string()
            });
        }
    } else if account.status != STATUS_APPROVED {
        account.status = STATUS_APPROVED.to_string();
        let healed = accounts.clone();
        save_accounts(store, &healed);
        return finish_login(store, &healed, &email, is_admin);
    }

    let snapshot = accounts.clone();
    finish_login(store, &snapshot, &email, is_admin)
}

fn finish_login(
    store: &mut dyn KeyValueStore,
    accounts: &[Account],
    email: &str,
    is_admin: bool,
) -> Result<ActiveUser, String> {
    let account = accounts
        .iter()
        .find(|account| normalize_email(&account.email) == email)
        .ok_or_else(|| "Invalid email or password.".to_string())?;
    let user = ActiveUser {
        email: account.email.clone(),
        name: account.name.clone(),
        section: account.section.clone(),
        is_admin,
        role: String::new(),
        login_at: Utc::now().to_rfc3339(),
    };
    store_session(store, &user);
    Ok(user)
}

/// Persist the session payload under `dpwh_current_user`.
pub fn store_session(store: &mut dyn KeyValueStore, user: &ActiveUser) {
    if let Ok(json) = serde_json::to_string(user) {
        store.set(SESSION_KEY, &json);
    }
}

/// The signed-in user, if any. Unreadable session payloads read as
/// signed out.
pub fn current_user(store: &dyn KeyValueStore) -> Option<ActiveUser> {
    let raw = store.get(SESSION_KEY)?;
    serde_json::from_str(&raw).ok()
}

pub fn clear_session(store: &mut dyn KeyValueStore) {
    store.remove(SESSION_KEY);
}

/// Create an account ahead of signup
///
/// The account starts approved with no password; its owner later
/// completes it through the normal signup form. Pre-approving an email
/// that already finished signup is rejected; repeating a pre-approval
/// just refreshes the name and section.
pub fn pre_approve(
    store: &mut dyn KeyValueStore,
    name: &str,
    email: &str,
    section: &str,
) -> Result<Account, String> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err("Please enter an email address.".to_string());
    }
    let mut accounts = load_accounts(store);
    let now = Utc::now().to_rfc3339();

    if let Some(existing) = accounts
        .iter_mut()
        .find(|account| normalize_email(&account.email) == email)
    {
        if !existing.is_pre_approved() {
            return Err("An account with this email already exists.".to_string());
        }
        existing.name = name.trim().to_string();
        existing.section = section.trim().to_string();
        existing.updated_at = now;
        let refreshed = existing.clone();
        save_accounts(store, &accounts);
        return Ok(refreshed);
    }

    let account = Account {
        name: name.trim().to_string(),
        email,
        section: section.trim().to_string(),
        password_hash: String::new(),
        status: STATUS_APPROVED.to_string(),
        created_at: now,
        updated_at: String::new(),
    };
    accounts.push(account.clone());
    save_accounts(store, &accounts);
    Ok(account)
}

/// Move an account through the approval lifecycle.
///
/// # Errors
/// * Returns an error when no account exists for the email
pub fn set_status(store: &mut dyn KeyValueStore, email: &str, status: &str) -> Result<(), String> {
    let email = normalize_email(email);
    let mut accounts = load_accounts(store);
    let account = accounts
        .iter_mut()
        .find(|account| normalize_email(&account.email) == email)
        .ok_or_else(|| "No account found for that email.".to_string())?;
    account.status = status.to_string();
    account.updated_at = Utc::now().to_rfc3339();
    save_accounts(store, &accounts);
    Ok(())
}

pub fn delete_account(store: &mut dyn KeyValueStore, email: &str) -> bool {
    let email = normalize_email(email);
    let mut accounts = load_accounts(store);
    let before = accounts.len();
    accounts.retain(|account| normalize_email(&account.email) != email);
    if accounts.len() == before {
        return false;
    }
    save_accounts(store, &accounts);
    true
}

/// Replace a forgotten password directly.
///
/// # Errors
/// * Returns an error for short or mismatched passwords, or when no
///   account exists for the email
pub fn reset_password(
    store: &mut dyn KeyValueStore,
    email: &str,
    password: &str,
    confirm: &str,
) -> Result<(), String> {
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() || confirm.is_empty() {
        return Err("Please fill in all fields.".to_string());
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err("Password must be at least 6 characters.".to_string());
    }
    if password != confirm {
        return Err("Passwords do not match.".to_string());
    }
    let mut accounts = load_accounts(store);
    let account = accounts
        .iter_mut()
        .find(|account| normalize_email(&account.email) == email)
        .ok_or_else(|| "No account found for that email.".to_string())?;
    account.password_hash = hash_password(password)?;
    account.updated_at = Utc::now().to_rfc3339();
    save_accounts(store, &accounts);
    Ok(())
}

/// Create a new server-side session token for an authenticated user.
pub fn create_session(email: &str) -> String {
    let session_id = Uuid::new_v4().to_string();
    let expires_at = SystemTime::now() + Duration::from_secs(SESSION_DURATION);

    let session = Session {
        email: normalize_email(email),
        expires_at,
    };

    let mut sessions = SESSIONS.write().unwrap();
    sessions.insert(session_id.clone(), session);

    session_id
}

/// Resolve a session token to its email if the session has not expired.
pub fn validate_session(session_id: &str) -> Option<String> {
    let sessions = SESSIONS.read().unwrap();

    if let Some(session) = sessions.get(session_id) {
        if session.expires_at > SystemTime::now() {
            return Some(session.email.clone());
        }
    }

    None
}

pub fn end_session(session_id: &str) {
    let mut sessions = SESSIONS.write().unwrap();
    sessions.remove(session_id);
}
