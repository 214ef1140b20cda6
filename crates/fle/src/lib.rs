//! Transparent field-level encryption for JSON documents.
//!
//! Selected string fields are encrypted before a document reaches its store
//! and decrypted after it is read back. All cryptography is delegated to a
//! remote transit key service ([`VaultTransit`], or [`MemoryTransit`] for
//! tests); this crate only decides which fields, under which key name, and
//! keeps batch results aligned with the fields they belong to.
//!
//! ```ignore
//! let schema = Schema::from_definition(&definition)?;
//! let encryptor = EncryptionPolicy::new(&schema, options)?.bind(transit, "identities");
//! let people = EncryptedCollection::new(store, encryptor, "identities");
//! people.create(document).await?;
//! ```

pub mod codec;
pub mod error;
pub mod lifecycle;
pub mod path;
pub mod policy;
pub mod query;
pub mod schema;
pub mod transformer;
pub mod transit;

pub use codec::Direction;
pub use error::{ConfigurationError, FleError, Result};
pub use lifecycle::{DocumentStore, EncryptedCollection, MemoryStore, StoreError};
pub use policy::{EncryptionPolicy, KeyNameError, KeyNameStrategy, PolicyOptions};
pub use schema::{FieldType, Schema, SchemaPath};
pub use transformer::FieldEncryptor;
pub use transit::{KeyService, KeyServiceError, MemoryTransit, VaultTransit};
