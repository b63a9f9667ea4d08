/*!
# Project Monitoring Dashboard Core

The data backbone of a construction-contract monitoring dashboard for a
government engineering office, built in Rust.

## Overview

The dashboard tracks construction contracts, their progress, assigned
field personnel, required compliance documents, and geotagged site
photos. The canonical contract records live in a server-side registry
(rendered out to the office's Excel workbook layout on demand); everything
a user changes from the dashboard is layered on top of those records as
per-contract overrides and merged back in at read time.

## Architecture

Two storage tiers cooperate:

### Remote tier
- **Technologies**: Rust, axum
- **Key Components**:
  - Project Registry - owns the canonical contract rows, Program of
    Works records and the personnel directory
  - Client-Storage Namespace - one flat string map per deployment,
    mirrored by every dashboard client
  - Workbook Export - renders the registry in the office's sheet layout

### Client tier
- **Technologies**: Rust, synchronous key/value storage
- **Core Components**:
  - RemoteBackedStore - blocking initial load, in-memory mirror,
    fire-and-forget background writes with observable per-key sync state
  - Override Ledgers - sparse per-contract patches (status updates,
    Program of Works, variation orders, compiled-document flags, photo
    albums) merged over base records at render time
  - Permission Gate - maps the signed-in user and a contract's
    in-charge assignments to view/update/edit/delete rights

## Key Features

- Contract-id normalization applied at every read/write boundary
- One generic override ledger shared by every override family
- Fuzzy personnel-name matching (diacritic-insensitive, token-based)
- Program of Works with PART section headers and append-only variation
  order snapshots
- Account approval lifecycle with pre-approved accounts
- Never-crash failure policy: transport and parse failures degrade to
  safe defaults and stay observable through typed states

## Modules

- **storage**: the synchronous key/value contract and in-memory store
- **online**: the remote-backed store and its background writer
- **ledger**: the generic override ledger
- **permissions**: name matching and the permission gate
- **projects**: contract records, update overrides, the merge function
- **pow**: Program of Works items and variation orders
- **documents**: compliance-document files and compiled markers
- **gallery**: per-contract photo albums
- **engineers**: the field-personnel directory
- **users**: accounts, approval lifecycle and sessions
- **registry**: the server-side system of record
- **workbook**: Excel export of the registry
- **app**: routing and handlers

## REST API Endpoints

- `/api/get-projects` - base contract records
- `/api/save-project`, `/api/update-project/{id}`,
  `/api/delete-project/{id}` - registry mutations
- `/api/pow/{id}` - Program of Works and variation orders
- `/api/engineers` - personnel directory
- `/api/client-storage` - the remote namespace behind RemoteBackedStore
*/

pub mod documents;
pub mod engineers;
pub mod gallery;
pub mod ledger;
pub mod online;
pub mod permissions;
pub mod pow;
pub mod projects;
pub mod registry;
pub mod storage;
pub mod users;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod workbook;

/// Re-export everything from these modules to make it easier to use
pub use documents::*;
pub use engineers::*;
pub use gallery::*;
pub use ledger::*;
pub use online::*;
pub use permissions::*;
pub use pow::*;
pub use projects::*;
pub use registry::*;
pub use storage::*;
pub use users::*;
