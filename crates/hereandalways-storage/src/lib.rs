//! HereAndAlways Storage - the two remote collaborators of the vault
//!
//! - Object storage (Supabase Storage) holds ciphertext blobs
//! - The REST backend holds credential records and trustee links
//!
//! Both sit behind traits so the orchestrator gets them injected; the
//! in-memory implementations back the tests.

mod http;

pub mod api;
pub mod memory;
pub mod model;
pub mod object_store;
pub mod supabase;

pub use api::{ApiError, CredentialApi, HttpCredentialApi};
pub use memory::{InMemoryCredentialApi, InMemoryObjectStore};
pub use model::{BlobLocation, BlobName, Category, CredentialPayload, CredentialRecord, TrusteeSummary};
pub use object_store::{ObjectStore, ObjectStoreError};
pub use supabase::SupabaseStorage;
